fn main() {
    // Host builds (unit + integration tests) have no ESP-IDF environment to emit.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    for var in [
        "COMPASS_WIFI_NETWORKS",
        "COMPASS_RELAY_MODE",
        "COMPASS_CLOUD_API_KEY",
        "COMPASS_DEVICE_IDS",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }
}
