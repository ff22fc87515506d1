use clap::Parser;
use std::path::PathBuf;

/// Live power monitor for a Zigbee2MQTT radiator
#[derive(Parser, Debug, Clone)]
#[command(name = "thermor-power-monitor")]
#[command(about = "Monitors and logs power consumption published through Zigbee2MQTT", long_about = None)]
pub struct Args {
    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST", default_value = "localhost")]
    pub host: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub port: u16,

    /// Device name in Zigbee2MQTT
    #[arg(long, env = "MONITOR_DEVICE", default_value = "thermor_salon")]
    pub device: String,

    /// Save data to file on exit
    #[arg(long, env = "MONITOR_SAVE")]
    pub save: bool,

    /// Export file name, overriding the generated one
    #[arg(long, env = "MONITOR_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Number of samples kept for the chart and export
    #[arg(long, env = "MONITOR_CAPACITY", default_value_t = 3600)]
    pub capacity: usize,

    /// Electricity price in € per kWh
    #[arg(long, env = "MONITOR_PRICE", default_value_t = 0.15)]
    pub price: f64,

    /// Save the chart without opening an image viewer
    #[arg(long, env = "MONITOR_NO_SHOW")]
    pub no_show: bool,

    /// Skip chart rendering at shutdown
    #[arg(long, env = "MONITOR_NO_CHART")]
    pub no_chart: bool,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub host: String,
    pub port: u16,
    pub device: String,
    pub save: bool,
    pub output: Option<PathBuf>,
    pub capacity: usize,
    pub price_per_kwh: f64,
    pub show_chart: bool,
    pub render_chart: bool,
}

impl MonitorConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables so clap can pick them up as fallbacks
        dotenv::dotenv().ok();

        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self, Box<dyn std::error::Error>> {
        let device = args.device.trim().to_string();
        if device.is_empty() {
            return Err("Device name must not be empty".into());
        }
        if device.contains(['#', '+']) {
            return Err(format!("Device name '{}' must not contain MQTT wildcards", device).into());
        }
        if args.port == 0 {
            return Err("MQTT port must be greater than zero".into());
        }
        if args.capacity == 0 {
            return Err("Sample capacity must be greater than zero".into());
        }
        if !args.price.is_finite() || args.price < 0.0 {
            return Err(format!("Invalid electricity price: {}", args.price).into());
        }

        Ok(MonitorConfig {
            host: args.host,
            port: args.port,
            device,
            save: args.save,
            output: args.output,
            capacity: args.capacity,
            price_per_kwh: args.price,
            show_chart: !args.no_show,
            render_chart: !args.no_chart,
        })
    }
}
