//! SVG Chart Generator for Prediction Reports
//!
//! Renders the per-class probability distribution of a prediction as a
//! standalone SVG bar chart.

use std::fs;
use std::path::Path;

/// Chart styling constants
const CHART_WIDTH: f64 = 1200.0;
const CHART_HEIGHT: f64 = 640.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 260.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// One color per bar, cycled when there are more bars than colors
pub const PALETTE: [&str; 10] = [
    "#636efa", "#ef553b", "#00cc96", "#ab63fa", "#ffa15a", "#19d3f3", "#ff6692", "#b6e880",
    "#ff97ff", "#fecb52",
];

/// Bar chart data
#[derive(Debug, Clone)]
pub struct BarData {
    pub label: String,
    pub value: f64,
    pub color: String,
}

impl BarData {
    /// Create a bar colored by its position in the chart
    pub fn indexed(index: usize, label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            color: PALETTE[index % PALETTE.len()].to_string(),
        }
    }
}

/// Render a bar chart with percentage values (0-100) to an SVG string
///
/// Bar labels are rotated so that long class names stay readable.
pub fn render_bar_chart(title: &str, x_label: &str, y_label: &str, bars: &[BarData]) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let baseline = MARGIN_TOP + plot_height;

    let y_max = bars.iter().map(|b| b.value).fold(0.0f64, f64::max).max(100.0);

    let slot = plot_width / bars.len().max(1) as f64;
    let bar_width = slot * 0.7;
    let bar_gap = slot * 0.3;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));

    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));

    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    // Grid lines
    for i in 0..=5 {
        let y = baseline - (i as f64 / 5.0) * plot_height;
        let value = (i as f64 / 5.0) * y_max;

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));

        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.0}%</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, value
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, baseline, MARGIN_LEFT + plot_width, baseline, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, baseline, COLOR_AXIS
    ));

    // Axis labels
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 15.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        MARGIN_TOP + plot_height / 2.0, COLOR_TEXT, MARGIN_TOP + plot_height / 2.0, escape_xml(y_label)
    ));

    for (i, bar) in bars.iter().enumerate() {
        let x = MARGIN_LEFT + i as f64 * slot + bar_gap / 2.0;
        let bar_height = (bar.value.max(0.0) / y_max) * plot_height;
        let y = baseline - bar_height;
        let center = x + bar_width / 2.0;

        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" rx="2"/>"#,
            x, y, bar_width, bar_height, bar.color
        ));

        // Value label on top
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="9" fill="{}">{:.2}</text>"#,
            center, y - 4.0, COLOR_TEXT, bar.value
        ));

        let label_y = baseline + 12.0;
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="10" fill="{}" transform="rotate(-60 {} {})">{}</text>"#,
            center, label_y, COLOR_TEXT, center, label_y, escape_xml(&bar.label)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Generate a bar chart SVG file
pub fn generate_bar_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    bars: &[BarData],
    output_path: &Path,
) -> std::io::Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output_path, render_bar_chart(title, x_label, y_label, bars))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&'\""), "a&lt;b&gt;&amp;&apos;&quot;");
    }

    #[test]
    fn test_render_bar_chart_contains_every_bar() {
        let bars = vec![
            BarData::indexed(0, "Apple___apple_scab", 12.5),
            BarData::indexed(1, "Apple___black_rot", 87.5),
        ];
        let svg = render_bar_chart("Probability Distribution", "Disease", "Probability(%)", &bars);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("rx=\"2\"").count(), 2);
        assert!(svg.contains("87.50"));
        assert!(svg.contains("Apple___black_rot"));
    }

    #[test]
    fn test_palette_cycles() {
        let first = BarData::indexed(0, "a", 1.0);
        let wrapped = BarData::indexed(PALETTE.len(), "b", 1.0);
        assert_eq!(first.color, wrapped.color);
    }

    #[test]
    fn test_generate_bar_chart_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charts").join("probabilities.svg");
        let bars = vec![BarData::indexed(0, "Tomato___healthy", 100.0)];

        generate_bar_chart("Test", "Disease", "Probability(%)", &bars, &path).unwrap();
        assert!(path.exists());
    }
}
