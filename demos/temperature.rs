//! IR temperature example
//!
//! Takes one point reading, then streams readings until Ctrl+C.
//!
//! Run with: cargo run --example temperature

use cc2650_rust_ble::{
    ConnectionOrchestrator, OrchestratorConfig, PlatformTransport, Result, StreamingSensor,
    SENSOR_TAG_NAME,
};
use std::time::Duration;

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

    let Some(temperature) = connection.temperature() else {
        println!("{} has no IR temperature service", connection.identifier());
        connection.disconnect().await?;
        return Ok(());
    };

    temperature.enable(true).await?;

    // Wait for the sensor to take a reading
    println!("Waiting 2 seconds while the sensor takes some readings...");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let reading = temperature.temperatures().await?;
    println!(
        "Ambient: {:.2}°C, IR: {:.2}°C\n",
        reading.ambient.celsius(),
        reading.ir.celsius()
    );

    let mut stream = temperature.subscribe().await?;
    println!("Streaming readings. Press Ctrl+C to exit.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            reading = stream.recv() => match reading {
                Some(reading) => println!(
                    "{}) Ambient: {:.2}°C ({:.2}°F), IR: {:.2}°C",
                    reading.timestamp,
                    reading.ambient.celsius(),
                    reading.ambient.fahrenheit(),
                    reading.ir.celsius()
                ),
                None => {
                    println!("\nStream ended");
                    break;
                }
            },
        }
    }

    connection.disconnect().await?;
    Ok(())
}
