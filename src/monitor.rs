/// Telemetry accumulator: decodes payloads and keeps running statistics
use log::{debug, error};
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use crate::buffer::RingBuffer;
use crate::error::{MonitorError, MonitorResult};
use crate::models::{Reading, Sample, Snapshot};
use crate::utils::{format_clock, now_secs};

// Zigbee2MQTT field names
const POWER_FIELD: &str = "power";
const TEMPERATURE_FIELD: &str = "local_temperature";

// Each power sample is assumed to cover one second
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Decode a raw payload into the fields the monitor cares about
///
/// The payload must be a JSON object. `power` and `local_temperature` are
/// optional and may be numbers or numeric strings; any other field is ignored.
/// The whole payload is rejected if either field holds a non-numeric or
/// non-finite value.
pub fn decode_reading(payload: &[u8]) -> MonitorResult<Reading> {
    let value: Value = serde_json::from_slice(payload).map_err(MonitorError::InvalidJson)?;
    let object = value.as_object().ok_or(MonitorError::NotAnObject)?;

    Ok(Reading {
        power: numeric_field(object, POWER_FIELD)?,
        temperature: numeric_field(object, TEMPERATURE_FIELD)?,
    })
}

fn numeric_field(object: &Map<String, Value>, field: &'static str) -> MonitorResult<Option<f64>> {
    let value = match object.get(field) {
        Some(value) => value,
        None => return Ok(None),
    };

    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(MonitorError::InvalidField {
            field,
            value: value.to_string(),
        }),
    }
}

/// One rendering of the live status line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    pub time: f64,
    pub power: f64,
    pub max_power: f64,
    pub energy_wh: f64,
    pub average_power: f64,
    pub cost: f64,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Power: {:6.1}W | Max: {:6.1}W | Energy: {:7.2}Wh | Avg: {:6.1}W | Cost: {:5.2}€",
            format_clock(self.time),
            self.power,
            self.max_power,
            self.energy_wh,
            self.average_power,
            self.cost
        )
    }
}

#[derive(Debug)]
struct State {
    samples: RingBuffer<Sample>,
    total_energy_wh: f64,
    max_power_w: Option<f64>,
    power_samples_seen: u64,
}

/// Shared accumulator fed by the MQTT subscriber and read at shutdown.
///
/// All buffer and statistic updates for one message happen under a single
/// lock. Peak power and energy are running totals, so they keep counting
/// samples that have already been evicted from the buffer.
#[derive(Debug)]
pub struct Monitor {
    state: Mutex<State>,
    start_time: f64,
    price_per_kwh: f64,
}

impl Monitor {
    pub fn new(capacity: usize, price_per_kwh: f64) -> Self {
        Self::with_start_time(capacity, price_per_kwh, now_secs())
    }

    pub fn with_start_time(capacity: usize, price_per_kwh: f64, start_time: f64) -> Self {
        Self {
            state: Mutex::new(State {
                samples: RingBuffer::new(capacity),
                total_energy_wh: 0.0,
                max_power_w: None,
                power_samples_seen: 0,
            }),
            start_time,
            price_per_kwh,
        }
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn price_per_kwh(&self) -> f64 {
        self.price_per_kwh
    }

    /// Process one inbound payload and print the status line.
    ///
    /// Bad payloads are logged and dropped; they never reach the buffers.
    pub fn handle_message(&self, payload: &[u8]) -> Option<Status> {
        match self.ingest(payload, now_secs()) {
            Ok(status) => {
                print!("\r{}", status);
                let _ = std::io::stdout().flush();
                Some(status)
            }
            Err(MonitorError::InvalidJson(e)) => {
                error!("Invalid JSON ({}): {}", e, String::from_utf8_lossy(payload));
                None
            }
            Err(e) => {
                error!(
                    "Error processing message: {} ({})",
                    e,
                    String::from_utf8_lossy(payload)
                );
                None
            }
        }
    }

    /// Decode and apply a payload received at `now` (epoch seconds).
    pub fn ingest(&self, payload: &[u8], now: f64) -> MonitorResult<Status> {
        let reading = decode_reading(payload)?;
        debug!("Decoded reading: {:?}", reading);
        Ok(self.apply(reading, now))
    }

    /// Apply an already decoded reading.
    pub fn apply(&self, reading: Reading, now: f64) -> Status {
        let mut state = self.lock();

        if let Some(power) = reading.power {
            state.max_power_w = Some(state.max_power_w.map_or(power, |max| max.max(power)));
            if state.power_samples_seen > 0 {
                state.total_energy_wh += power / SECONDS_PER_HOUR;
            }
            state.power_samples_seen += 1;
        }

        state.samples.push(Sample {
            timestamp: now,
            power: reading.power,
            temperature: reading.temperature,
        });

        debug!("Buffered {} samples", state.samples.len());

        let hours = (now - self.start_time) / SECONDS_PER_HOUR;
        let energy_wh = state.total_energy_wh;

        Status {
            time: now,
            power: reading.power.unwrap_or(0.0),
            max_power: state.max_power_w.unwrap_or(0.0),
            energy_wh,
            average_power: if hours > 0.0 { energy_wh / hours } else { 0.0 },
            cost: estimate_cost(energy_wh, self.price_per_kwh),
        }
    }

    /// Copy buffers and statistics under the lock.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            start_time: self.start_time,
            total_energy_wh: state.total_energy_wh,
            max_power_w: state.max_power_w.unwrap_or(0.0),
            samples: state.samples.iter().copied().collect(),
        }
    }

    // Shutdown output must still run after a panicked delivery
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cost of `energy_wh` at a price per kWh
pub fn estimate_cost(energy_wh: f64, price_per_kwh: f64) -> f64 {
    energy_wh * price_per_kwh / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: f64 = 1_700_000_000.0;

    fn monitor(capacity: usize) -> Monitor {
        Monitor::with_start_time(capacity, 0.15, START)
    }

    fn feed(monitor: &Monitor, payloads: &[&str]) {
        for (i, payload) in payloads.iter().enumerate() {
            monitor
                .ingest(payload.as_bytes(), START + i as f64 + 1.0)
                .unwrap();
        }
    }

    #[test]
    fn buffer_keeps_last_values_but_peak_sees_everything() {
        let monitor = monitor(3);
        feed(
            &monitor,
            &[
                r#"{"power": 500}"#,
                r#"{"power": 900}"#,
                r#"{"power": 100}"#,
                r#"{"power": 200}"#,
                r#"{"power": 300}"#,
            ],
        );

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.power(), vec![100.0, 200.0, 300.0]);
        assert_eq!(snapshot.max_power_w, 900.0);
        // Energy also counts evicted samples: (900 + 100 + 200 + 300) / 3600
        assert!((snapshot.total_energy_wh - 1500.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn first_power_sample_adds_no_energy() {
        let monitor = monitor(10);
        feed(&monitor, &[r#"{"power": 1200}"#]);
        assert_eq!(monitor.snapshot().total_energy_wh, 0.0);

        feed(&monitor, &[r#"{"power": 600}"#, r#"{"power": 1800}"#]);
        let energy = monitor.snapshot().total_energy_wh;
        assert!((energy - (600.0 + 1800.0) / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn energy_baseline_ignores_temperature_only_messages() {
        let monitor = monitor(10);
        feed(
            &monitor,
            &[r#"{"local_temperature": 19.5}"#, r#"{"power": 360}"#],
        );
        assert_eq!(monitor.snapshot().total_energy_wh, 0.0);
    }

    #[test]
    fn message_without_fields_only_records_timestamp() {
        let monitor = monitor(10);
        feed(&monitor, &[r#"{"power": 100, "local_temperature": 20.0}"#]);
        let before = monitor.snapshot();

        feed(&monitor, &[r#"{"linkquality": 120, "state": "ON"}"#]);
        let after = monitor.snapshot();

        assert_eq!(after.timestamps().len(), before.timestamps().len() + 1);
        assert_eq!(after.power(), before.power());
        assert_eq!(after.temperature(), before.temperature());
        assert_eq!(after.max_power_w, before.max_power_w);
        assert_eq!(after.total_energy_wh, before.total_energy_wh);
    }

    #[test]
    fn malformed_payload_changes_nothing() {
        let monitor = monitor(10);
        feed(&monitor, &[r#"{"power": 100}"#]);
        let before = monitor.snapshot();

        assert!(monitor.handle_message(b"{not json").is_none());
        assert!(monitor.handle_message(b"[1, 2, 3]").is_none());
        assert!(monitor.handle_message(&[0xff, 0xfe]).is_none());

        assert_eq!(monitor.snapshot(), before);
    }

    #[test]
    fn undecodable_payload_is_reported_as_invalid_json() {
        assert!(matches!(
            decode_reading(b"{\"power\": "),
            Err(MonitorError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_reading(b"42"),
            Err(MonitorError::NotAnObject)
        ));
    }

    #[test]
    fn invalid_field_rejects_whole_message() {
        let monitor = monitor(10);
        let result = monitor.ingest(
            br#"{"power": 100, "local_temperature": null}"#,
            START + 1.0,
        );

        assert!(matches!(
            result,
            Err(MonitorError::InvalidField {
                field: "local_temperature",
                ..
            })
        ));
        assert!(monitor.snapshot().samples.is_empty());
        assert_eq!(monitor.snapshot().max_power_w, 0.0);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let monitor = monitor(10);
        feed(&monitor, &[r#"{"power": 100}"#]);
        let before = monitor.snapshot();

        for payload in [
            r#"{"power": "NaN"}"#,
            r#"{"power": "inf"}"#,
            r#"{"power": "-infinity"}"#,
            r#"{"local_temperature": "nan"}"#,
        ] {
            let result = monitor.ingest(payload.as_bytes(), START + 5.0);
            assert!(
                matches!(result, Err(MonitorError::InvalidField { .. })),
                "{} was accepted",
                payload
            );
        }
        assert_eq!(monitor.snapshot(), before);

        feed(&monitor, &[r#"{"power": 200}"#]);
        let energy = monitor.snapshot().total_energy_wh;
        assert!((energy - 200.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let reading = decode_reading(br#"{"power": "42.5", "local_temperature": 21}"#).unwrap();
        assert_eq!(reading.power, Some(42.5));
        assert_eq!(reading.temperature, Some(21.0));
    }

    #[test]
    fn status_reports_average_and_cost() {
        let monitor = monitor(10);
        monitor.ingest(br#"{"power": 1000}"#, START).unwrap();
        let status = monitor.ingest(br#"{"power": 3600}"#, START + 1800.0).unwrap();

        assert_eq!(status.power, 3600.0);
        assert_eq!(status.max_power, 3600.0);
        assert!((status.energy_wh - 1.0).abs() < 1e-12);
        // 1 Wh over half an hour
        assert!((status.average_power - 2.0).abs() < 1e-9);
        assert!((status.cost - 0.00015).abs() < 1e-12);
    }

    #[test]
    fn status_average_is_zero_without_elapsed_time() {
        let monitor = monitor(10);
        let status = monitor.ingest(br#"{"power": 50}"#, START).unwrap();
        assert_eq!(status.average_power, 0.0);
    }

    #[test]
    fn status_line_shows_absent_power_as_zero() {
        let monitor = monitor(10);
        let status = monitor
            .ingest(br#"{"local_temperature": 20.5}"#, START + 1.0)
            .unwrap();
        let line = status.to_string();
        assert!(line.contains("Power:    0.0W"), "{}", line);
        assert!(line.ends_with("Cost:  0.00€"), "{}", line);
    }

    #[test]
    fn temperature_and_power_stay_aligned_with_timestamps() {
        let monitor = monitor(10);
        feed(
            &monitor,
            &[
                r#"{"local_temperature": 19.0}"#,
                r#"{"power": 250}"#,
                r#"{"power": 260, "local_temperature": 19.5}"#,
            ],
        );
        let samples = monitor.snapshot().samples;
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].power, None);
        assert_eq!(samples[0].temperature, Some(19.0));
        assert_eq!(samples[1].power, Some(250.0));
        assert_eq!(samples[2].temperature, Some(19.5));
    }
}
