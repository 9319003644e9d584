#[tokio::main]
async fn main() -> anyhow::Result<()> {
    inspection_station_lib::run().await
}
