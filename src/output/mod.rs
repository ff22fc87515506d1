pub mod chart;
pub mod export;

pub use chart::{open_viewer, render_chart};
pub use export::save_data;
