mod buffer;
mod config;
mod error;
mod models;
mod monitor;
mod mqtt;
mod output;
mod utils;

use log::{error, info, warn};
use std::path::Path;
use time::OffsetDateTime;

use config::MonitorConfig;
use monitor::Monitor;
use mqtt::Subscriber;
use output::{open_viewer, render_chart, save_data};
use utils::{datetime_from_secs, format_datetime, local_offset};

/// Run the shutdown outputs once the subscriber has been stopped
fn present(config: &MonitorConfig, monitor: &Monitor) {
    let snapshot = monitor.snapshot();
    info!(
        "Collected {} samples, {:.2} Wh, peak {:.1} W",
        snapshot.samples.len(),
        snapshot.total_energy_wh,
        snapshot.max_power_w
    );

    if config.render_chart {
        match render_chart(
            &snapshot,
            &config.device,
            monitor.price_per_kwh(),
            Path::new("."),
        ) {
            Ok(Some(path)) => {
                println!("✓ Graph saved as {}", path.display());
                if config.show_chart {
                    open_viewer(&path);
                }
            }
            Ok(None) => {}
            Err(e) => error!("Failed to render chart: {}", e),
        }
    }

    if config.save {
        match save_data(&snapshot, &config.device, config.output.as_deref()) {
            Ok(path) => println!("✓ Data saved to {}", path.display()),
            Err(e) => error!("Failed to save data: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match MonitorConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let monitor = Monitor::new(config.capacity, config.price_per_kwh);
    let mut subscriber = Subscriber::new(&config);

    let started = datetime_from_secs(monitor.start_time())
        .unwrap_or_else(|| OffsetDateTime::now_utc().to_offset(local_offset()));
    info!(
        "Starting power monitor for {} on {}:{} at {}",
        config.device,
        config.host,
        config.port,
        format_datetime(&started)
    );
    info!("Listening on {}", subscriber.topic());
    println!("Press Ctrl+C to stop and show graphs");
    println!("{}", "-".repeat(80));

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        let _ = tx.send(());
    });

    // Dropping the subscriber future stops all further accumulator updates
    tokio::select! {
        _ = subscriber.run(&monitor) => {
            warn!("Subscriber stopped unexpectedly");
        }
        _ = &mut rx => {
            println!();
            info!("Stopping monitor...");
        }
    }

    subscriber.close().await;
    present(&config, &monitor);

    info!("Program terminated by user. Exiting gracefully.");
    Ok(())
}
