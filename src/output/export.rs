/// JSON export of buffered samples and summary statistics
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::error::MonitorResult;
use crate::models::Snapshot;
use crate::utils::{file_stamp, format_rfc3339, local_offset, now_secs};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSamples {
    pub timestamps: Vec<f64>,
    pub power: Vec<f64>,
    pub temperature: Vec<f64>,
}

/// On-disk layout of a saved monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportData {
    pub device: String,
    pub start_time: String,
    pub end_time: String,
    pub total_energy_wh: f64,
    pub max_power_w: f64,
    pub samples: ExportSamples,
}

impl ExportData {
    pub fn from_snapshot(snapshot: &Snapshot, device: &str, end_time: f64) -> Self {
        ExportData {
            device: device.to_string(),
            start_time: format_rfc3339(snapshot.start_time),
            end_time: format_rfc3339(end_time),
            total_energy_wh: snapshot.total_energy_wh,
            max_power_w: snapshot.max_power_w,
            samples: ExportSamples {
                timestamps: snapshot.timestamps(),
                power: snapshot.power(),
                temperature: snapshot.temperature(),
            },
        }
    }
}

/// Default export name: `power_data_<device>_<YYYYMMDD_HHMMSS>.json`
pub fn data_file_name(device: &str, at: &OffsetDateTime) -> String {
    format!("power_data_{}_{}.json", device, file_stamp(at))
}

/// Write the snapshot to `path`, or to a generated name in the working directory.
///
/// # Returns
/// The path actually written
pub fn save_data(
    snapshot: &Snapshot,
    device: &str,
    path: Option<&Path>,
) -> MonitorResult<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let now = OffsetDateTime::now_utc().to_offset(local_offset());
            PathBuf::from(data_file_name(device, &now))
        }
    };

    let data = ExportData::from_snapshot(snapshot, device, now_secs());
    write_data(&data, &path)?;
    info!(
        "Saved {} samples for {} to {}",
        data.samples.timestamps.len(),
        device,
        path.display()
    );
    Ok(path)
}

pub fn write_data(data: &ExportData, path: &Path) -> MonitorResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, data)?;
    writer.flush()?;
    Ok(())
}

/// Read back a file produced by [`save_data`]
#[cfg(test)]
pub fn load_data(path: &Path) -> MonitorResult<ExportData> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
