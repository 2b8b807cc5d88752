//! Utilities module for logging, charts, and error handling
//!
//! This module provides:
//! - Structured logging with tracing
//! - SVG bar charts for probability distributions
//! - Error handling types
//! - Small formatting helpers shared by the CLI and reports

pub mod charts;
pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{PlantVillageError, Result};
pub use logging::init_logging;

/// Round a probability to a percentage with two decimals, e.g. `0.123456 -> 12.35`
pub fn to_percent(probability: f32) -> f64 {
    (probability as f64 * 100.0 * 100.0).round() / 100.0
}

/// Format a duration in milliseconds in a human-readable way
pub fn format_millis(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0}us", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

/// Format a percentage with a progress bar
pub fn format_progress_bar(progress: f64, width: usize) -> String {
    let filled = (progress.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);

    format!(
        "[{}{}] {:.2}%",
        "█".repeat(filled),
        "░".repeat(empty),
        progress * 100.0
    )
}
