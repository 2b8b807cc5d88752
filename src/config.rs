//! Classifier configuration
//!
//! Settings the CLI reads from a JSON file; command-line flags and
//! environment variables override individual fields.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::model::ModelVariant;
use crate::utils::error::{PlantVillageError, Result};
use crate::utils::logging::LogLevel;

/// Environment variable naming the model manifest
pub const MODEL_ENV: &str = "PLANTVILLAGE_MODEL";

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "PLANTVILLAGE_CONFIG";

/// Configuration for classifying leaf images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Path to the model manifest (JSON)
    pub model_path: PathBuf,

    /// Model family, decides which extension ops are registered
    pub variant: ModelVariant,

    /// Image formats accepted for classification, by extension name
    pub accepted_formats: Vec<String>,

    /// Number of ranked classes to report
    pub top_k: usize,

    /// Where to write the probability chart, if anywhere
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_output: Option<PathBuf>,

    /// Log level used when no CLI flag overrides it
    pub log_level: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("Model").join(ModelVariant::Compact.artifact_name()),
            variant: ModelVariant::Compact,
            accepted_formats: vec!["jpeg".to_string()],
            top_k: 5,
            chart_output: None,
            log_level: "info".to_string(),
        }
    }
}

impl ClassifierConfig {
    /// Defaults for the given model family
    pub fn for_variant(variant: ModelVariant) -> Self {
        Self {
            model_path: PathBuf::from("Model").join(variant.artifact_name()),
            variant,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(PlantVillageError::Config(
                "top_k must be greater than 0".to_string(),
            ));
        }
        if self.accepted_formats.is_empty() {
            return Err(PlantVillageError::Config(
                "accepted_formats must name at least one image format".to_string(),
            ));
        }
        self.image_formats()?;
        self.log_level()?;
        Ok(())
    }

    /// Accepted formats resolved to `image` formats
    ///
    /// Accepts extension-style names such as "jpeg", "jpg", "png" or "webp".
    pub fn image_formats(&self) -> Result<Vec<ImageFormat>> {
        let mut formats = Vec::with_capacity(self.accepted_formats.len());
        for name in &self.accepted_formats {
            let format = ImageFormat::from_extension(name.trim().to_lowercase()).ok_or_else(|| {
                PlantVillageError::Config(format!("unknown image format '{}'", name))
            })?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        Ok(formats)
    }

    /// Configured log level
    pub fn log_level(&self) -> Result<LogLevel> {
        self.log_level.parse().map_err(PlantVillageError::Config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PlantVillageError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| PlantVillageError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}
