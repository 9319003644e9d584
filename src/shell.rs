//! Line-oriented operator console.

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{self, AsyncBufReadExt, BufReader};

use crate::{
    operator::{OperatorContext, OperatorRole},
    scan::ScanPhase,
    station::Station,
};

const DEFAULT_HISTORY: usize = 10;

const HELP: &str = "\
commands:
  connect                       connect PLC and camera, start polling
  disconnect                    stop polling and release devices
  status                        show device and sequencer status
  scan <user> [role]            start a scan (role: admin|operator|viewer)
  lights on|off <user> [role]   switch all calibration lights
  history [n]                   show the last n scan records
  endpoint <address> <port>     set the PLC endpoint
  reload                        re-read the settings file
  quit                          disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Status,
    Scan(OperatorContext),
    Lights { on: bool, operator: OperatorContext },
    History(usize),
    Endpoint { address: String, port: u16 },
    Reload,
    Help,
    Quit,
}

fn parse_operator<'a>(mut args: impl Iterator<Item = &'a str>) -> Result<OperatorContext> {
    let identity = args.next().ok_or_else(|| anyhow!("missing operator name"))?;
    let role = match args.next() {
        Some(raw) => OperatorRole::parse(raw).ok_or_else(|| anyhow!("unknown role '{raw}'"))?,
        None => OperatorRole::Operator,
    };
    Ok(OperatorContext::new(identity, role))
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "status" => Command::Status,
        "scan" => Command::Scan(parse_operator(words)?),
        "lights" => {
            let on = match words.next() {
                Some("on") => true,
                Some("off") => false,
                _ => bail!("usage: lights on|off <user> [role]"),
            };
            Command::Lights {
                on,
                operator: parse_operator(words)?,
            }
        }
        "history" => match words.next() {
            Some(raw) => Command::History(
                raw.parse()
                    .with_context(|| format!("invalid history length '{raw}'"))?,
            ),
            None => Command::History(DEFAULT_HISTORY),
        },
        "endpoint" => {
            let address = words
                .next()
                .ok_or_else(|| anyhow!("usage: endpoint <address> <port>"))?;
            let port = words
                .next()
                .ok_or_else(|| anyhow!("usage: endpoint <address> <port>"))?
                .parse()
                .context("port must be a number between 1 and 65535")?;
            Command::Endpoint {
                address: address.to_string(),
                port,
            }
        }
        "reload" => Command::Reload,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}' (try 'help')"),
    };

    Ok(Some(command))
}

/// Runs one command. Returns `false` once the operator asked to quit.
pub async fn execute(station: &Station, command: Command) -> Result<bool> {
    match command {
        Command::Connect => station.connect().await?,
        Command::Disconnect => station.disconnect().await?,
        Command::Status => {
            let status = station.status();
            let sequencer = station.sequencer().await;
            let endpoint = station.plc_endpoint();
            let display = status.display();
            println!(
                "{} [{:?}] (plc {}:{}: {}, camera: {}, machine: {:?})",
                display.label(),
                display.severity(),
                endpoint.address,
                endpoint.port,
                status.plc_connected,
                status.camera_connected,
                status.machine_code
            );
            match sequencer.state.phase {
                ScanPhase::Idle => println!("sequencer idle"),
                ScanPhase::Running { step } => println!("scanning, step {}", step + 1),
                ScanPhase::Finalizing => println!("scan finalizing"),
                ScanPhase::Cleanup => println!("scan cleaning up after a fault"),
            }
            if let Some(summary) = sequencer.state.last_summary {
                println!(
                    "last scan by {}: {:?}, {}/{} captured",
                    summary.started_by,
                    summary.status,
                    summary.captured_count(),
                    summary.steps.len()
                );
            }
        }
        Command::Scan(operator) => {
            // Rejections already reach the operator as a warning event.
            if station.start_scan(&operator).await.is_ok() {
                println!("scan started for {}", operator.identity);
            }
        }
        Command::Lights { on, operator } => {
            station.set_calibration_lights(&operator, on).await?;
        }
        Command::History(limit) => {
            let records = station.scan_history(limit).await?;
            if records.is_empty() {
                println!("no scans recorded");
            }
            for record in records {
                println!(
                    "#{:<5} {}  {:<12} {:<10} {}",
                    record.id,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.initiated_by,
                    record.status.as_str(),
                    record.result_code.as_str()
                );
            }
        }
        Command::Endpoint { address, port } => station.update_plc_endpoint(&address, port)?,
        Command::Reload => station.reload_settings()?,
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
    }

    Ok(true)
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run_console(station: &Station) -> Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    println!("{HELP}");

    while let Some(line) = lines.next_line().await.context("failed to read console input")? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        match execute(station, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => println!("error: {err:#}"),
        }
    }

    Ok(())
}
