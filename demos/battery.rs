//! Battery level example
//!
//! Connects to the first SensorTag found and prints the remaining battery.
//!
//! Run with: cargo run --example battery

use cc2650_rust_ble::{
    ConnectionOrchestrator, OrchestratorConfig, PlatformTransport, Result, SENSOR_TAG_NAME,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,cc2650_rust_ble=info")
        .init();

    println!("Looking for {}...\n", SENSOR_TAG_NAME);

    let orchestrator =
        ConnectionOrchestrator::new(PlatformTransport::new(), OrchestratorConfig::default());
    let connection = orchestrator.connect_default().await?;

    match connection.battery() {
        Some(battery) => println!("Battery remaining: {}%", battery.remaining().await?),
        None => println!("{} has no battery service", connection.identifier()),
    }

    connection.disconnect().await?;
    Ok(())
}
