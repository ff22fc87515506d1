/// Two-panel PNG chart of the buffered power and temperature series
use log::{info, warn};
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use time::OffsetDateTime;

use crate::error::{MonitorError, MonitorResult};
use crate::models::{Sample, Snapshot};
use crate::monitor::estimate_cost;
use crate::utils::{file_stamp, local_offset, mean};

const CHART_SIZE: (u32, u32) = (1800, 1200);
const FOOTER_HEIGHT: i32 = 150;
const FONT: &str = "sans-serif";
// Keeps the x axis non-degenerate when all samples share a timestamp
const MIN_SPAN_MINUTES: f64 = 1.0 / 60.0;
const STATS_BOX_COLOR: RGBColor = RGBColor(245, 222, 179);

/// Default chart name: `power_log_<device>_<YYYYMMDD_HHMMSS>.png`
pub fn chart_file_name(device: &str, at: &OffsetDateTime) -> String {
    format!("power_log_{}_{}.png", device, file_stamp(at))
}

/// Minutes elapsed since the first sample, one entry per sample
pub fn elapsed_minutes(samples: &[Sample]) -> Vec<f64> {
    let start = match samples.first() {
        Some(first) => first.timestamp,
        None => return Vec::new(),
    };
    samples
        .iter()
        .map(|s| (s.timestamp - start) / 60.0)
        .collect()
}

/// Text shown in the statistics box under the panels
pub fn stats_lines(snapshot: &Snapshot, price_per_kwh: f64) -> Vec<String> {
    vec![
        format!("Total Energy: {:.2} Wh", snapshot.total_energy_wh),
        format!("Max Power: {:.1} W", snapshot.max_power_w),
        format!("Duration: {:.2} hours", snapshot.duration_secs() / 3600.0),
        format!(
            "Est. Cost: {:.3} €",
            estimate_cost(snapshot.total_energy_wh, price_per_kwh)
        ),
    ]
}

/// Render the chart into `dir`.
///
/// # Returns
/// `Ok(None)` without touching the filesystem when fewer than two samples
/// were recorded, otherwise the path of the written PNG
pub fn render_chart(
    snapshot: &Snapshot,
    device: &str,
    price_per_kwh: f64,
    dir: &Path,
) -> MonitorResult<Option<PathBuf>> {
    if snapshot.samples.len() < 2 {
        info!("Not enough data to display graphs");
        return Ok(None);
    }

    let now = OffsetDateTime::now_utc().to_offset(local_offset());
    let path = dir.join(chart_file_name(device, &now));

    draw(snapshot, device, price_per_kwh, &path)
        .map_err(|e| MonitorError::Chart(e.to_string()))?;

    Ok(Some(path))
}

fn draw(
    snapshot: &Snapshot,
    device: &str,
    price_per_kwh: f64,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let minutes = elapsed_minutes(&snapshot.samples);
    let x_max = minutes
        .last()
        .copied()
        .unwrap_or(0.0)
        .max(MIN_SPAN_MINUTES);

    let power: Vec<(f64, f64)> = snapshot
        .samples
        .iter()
        .zip(&minutes)
        .filter_map(|(s, &m)| s.power.map(|p| (m, p)))
        .collect();
    let temperature: Vec<(f64, f64)> = snapshot
        .samples
        .iter()
        .zip(&minutes)
        .filter_map(|(s, &m)| s.temperature.map(|t| (m, t)))
        .collect();

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&format!("Power Monitor - {}", device), (FONT, 40))?;

    let (_, height) = root.dim_in_pixel();
    let (panels, footer) = root.split_vertically(height as i32 - FOOTER_HEIGHT);
    let (_, panel_height) = panels.dim_in_pixel();
    let (upper, lower) = panels.split_vertically(panel_height as i32 / 2);

    // Power panel
    let (power_lo, power_hi) = padded_range(power.iter().map(|&(_, p)| p), Some(0.0));
    let mut power_chart = ChartBuilder::on(&upper)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..x_max, power_lo..power_hi)?;
    power_chart
        .configure_mesh()
        .y_desc("Power (W)")
        .draw()?;
    if !power.is_empty() {
        power_chart.draw_series(
            AreaSeries::new(power.iter().copied(), 0.0, BLUE.mix(0.3)).border_style(BLUE),
        )?;
    }

    let power_values: Vec<f64> = power.iter().map(|&(_, p)| p).collect();
    if let Some(average) = mean(&power_values) {
        power_chart
            .draw_series(LineSeries::new(
                vec![(0.0, average), (x_max, average)],
                RED.stroke_width(2),
            ))?
            .label(format!("Average: {:.1}W", average))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
        power_chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    // Temperature panel shares the time axis
    let (temp_lo, temp_hi) = padded_range(temperature.iter().map(|&(_, t)| t), None);
    let mut temp_chart = ChartBuilder::on(&lower)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..x_max, temp_lo..temp_hi)?;
    let mut mesh = temp_chart.configure_mesh();
    mesh.x_desc("Time (minutes)");
    if !temperature.is_empty() {
        mesh.y_desc("Temperature (°C)");
    }
    mesh.draw()?;
    if !temperature.is_empty() {
        temp_chart.draw_series(LineSeries::new(
            temperature.iter().copied(),
            RED.stroke_width(2),
        ))?;
    }

    // Statistics box
    footer.draw(&Rectangle::new(
        [(20, 10), (460, FOOTER_HEIGHT - 10)],
        STATS_BOX_COLOR.mix(0.5).filled(),
    ))?;
    for (i, line) in stats_lines(snapshot, price_per_kwh).into_iter().enumerate() {
        footer.draw(&Text::new(line, (35, 20 + i as i32 * 30), (FONT, 24)))?;
    }

    root.present()?;
    Ok(())
}

/// Axis range covering `values` with 10% headroom, optionally anchored at `floor`.
fn padded_range(values: impl Iterator<Item = f64>, floor: Option<f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (floor.unwrap_or(0.0), floor.unwrap_or(0.0) + 1.0);
    }

    let low = floor.map_or(min, |f| f.min(min));
    let pad = ((max - low) * 0.1).max(0.5);
    let low = if floor.map_or(false, |f| low >= f) {
        low
    } else {
        low - pad
    };
    (low, max + pad)
}

/// Open the chart in the platform image viewer without waiting for it.
pub fn open_viewer(path: &Path) {
    let viewer = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };

    if let Err(e) = Command::new(viewer).arg(path).spawn() {
        warn!("Could not open {} with {}: {}", path.display(), viewer, e);
    }
}
