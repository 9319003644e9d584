use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=STATION_NATIVE_LIB_DIR");
    println!("cargo:rerun-if-env-changed=STATION_NATIVE_LIB_NAME");

    if env::var_os("CARGO_FEATURE_NATIVE").is_some() {
        link_native_gateway();
    }
}

fn link_native_gateway() {
    let lib_dir = PathBuf::from(
        env::var("STATION_NATIVE_LIB_DIR")
            .expect("STATION_NATIVE_LIB_DIR must point at the native gateway library"),
    );
    let lib_name = env::var("STATION_NATIVE_LIB_NAME").unwrap_or_else(|_| "station_native".into());
    let lib_dir = lib_dir.to_str().expect("link path invalid UTF-8");

    println!("cargo:rustc-link-search=native={lib_dir}");
    println!("cargo:rustc-link-lib=dylib={lib_name}");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        println!("cargo:rustc-link-arg=-Wl,-rpath,{lib_dir}");
    }
}
