/// A single accepted telemetry message.
///
/// Every message yields one timestamped record; power and temperature stay
/// optional so the three series never drift out of alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Watts
    pub power: Option<f64>,
    /// Degrees Celsius
    pub temperature: Option<f64>,
}

/// Fields extracted from one decoded payload.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub power: Option<f64>,
    pub temperature: Option<f64>,
}

/// Consistent copy of the accumulator state, taken under its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub start_time: f64,
    pub total_energy_wh: f64,
    pub max_power_w: f64,
    pub samples: Vec<Sample>,
}

impl Snapshot {
    pub fn timestamps(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }

    pub fn power(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.power).collect()
    }

    pub fn temperature(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.temperature).collect()
    }

    /// Span between the first and last buffered sample, in seconds.
    pub fn duration_secs(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }
}
