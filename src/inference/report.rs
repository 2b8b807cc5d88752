//! Prediction reports: verdict sentence, per-class chart and JSON export

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::pipeline::{ClassPrediction, PredictionResult};
use crate::labels::LabelTable;
use crate::utils::charts::{generate_bar_chart, BarData};
use crate::utils::error::{PlantVillageError, Result};
use crate::utils::to_percent;

pub const CHART_TITLE: &str = "Probability Distribution";
pub const CHART_X_LABEL: &str = "Class";
pub const CHART_Y_LABEL: &str = "Probability(%)";

/// One bar of the probability chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    pub index: usize,
    pub label: String,
    /// Probability as a percentage rounded to two decimals
    pub percent: f64,
}

/// Human-facing summary of a prediction
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub predicted_label: String,
    pub predicted_percent: f64,
    pub inference_time_ms: f64,
    pub top_k: Vec<ClassPrediction>,
    pub rows: Vec<ChartRow>,
}

impl PredictionReport {
    /// Build the report for `result`, with `top_k` best classes listed separately
    pub fn new(result: &PredictionResult, labels: &LabelTable, top_k: usize) -> Result<Self> {
        let rows = result
            .probabilities
            .iter()
            .enumerate()
            .map(|(index, probability)| {
                Ok(ChartRow {
                    index,
                    label: labels.display_name(index)?,
                    percent: to_percent(probability),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let predicted_percent = rows
            .iter()
            .map(|row| row.percent)
            .fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            generated_at: Utc::now(),
            image: result
                .image_path
                .as_ref()
                .map(|path| path.display().to_string()),
            predicted_label: labels.display_name(result.predicted_index)?,
            predicted_percent,
            inference_time_ms: result.inference_time_ms,
            top_k: result.top_k(top_k, labels)?,
            rows,
        })
    }

    /// One-sentence verdict shown under the chart
    ///
    /// The percentage keeps at least one decimal, so 80 reads `80.0%`.
    pub fn verdict(&self) -> String {
        format!(
            "The image is classified as `{}` with a probability of `{:?}%`",
            self.predicted_label, self.predicted_percent
        )
    }

    pub fn bars(&self) -> Vec<BarData> {
        self.rows
            .iter()
            .map(|row| BarData::indexed(row.index, row.label.clone(), row.percent))
            .collect()
    }

    /// Write the probability chart as SVG
    pub fn render_svg(&self, path: &Path) -> Result<()> {
        generate_bar_chart(CHART_TITLE, CHART_X_LABEL, CHART_Y_LABEL, &self.bars(), path)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PlantVillageError::Serialization(e.to_string()))
    }

    /// Write the JSON report, creating parent directories as needed
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
