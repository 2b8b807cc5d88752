//! Model artifact manifest
//!
//! A model artifact is a JSON manifest describing the network architecture,
//! plus a Burn weights record next to it. The manifest names every layer and
//! operation the network uses, so the loader can refuse artifacts that
//! reference operations it does not know.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ops::OpParams;
use crate::utils::error::{PlantVillageError, Result};

/// Shape of a single input image the network was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    #[serde(default = "default_channels")]
    pub channels: usize,
}

fn default_channels() -> usize {
    3
}

impl InputShape {
    /// Square RGB input
    pub fn square(size: usize) -> Self {
        Self {
            height: size,
            width: size,
            channels: 3,
        }
    }

    /// Expected batch shape `[1, H, W, C]`
    pub fn batch_shape(&self) -> [usize; 4] {
        [1, self.height, self.width, self.channels]
    }
}

/// Convolution padding mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    #[default]
    Same,
    Valid,
}

fn default_stride() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_epsilon() -> f64 {
    1e-3
}

/// One layer of the network, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    /// 2D convolution over the channel axis
    Conv2d {
        filters: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        strides: usize,
        #[serde(default)]
        padding: Padding,
        #[serde(default = "default_true")]
        use_bias: bool,
    },
    /// Batch normalization with running statistics
    BatchNorm {
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    /// Max pooling without padding
    MaxPool2d {
        pool_size: usize,
        #[serde(default)]
        strides: Option<usize>,
    },
    /// Average over the spatial axes, producing a flat feature vector
    GlobalAvgPool2d,
    /// Collapse channels and spatial axes into one feature vector
    Flatten,
    /// Fully connected layer on a flat feature vector
    Dense {
        units: usize,
        #[serde(default = "default_true")]
        use_bias: bool,
    },
    /// Training-time regularization; identity at inference
    Dropout { rate: f64 },
    /// Named activation, built in or registered
    Activation {
        name: String,
        #[serde(default, skip_serializing_if = "OpParams::is_empty")]
        params: OpParams,
    },
    /// Named custom layer without weights, must be registered
    Custom {
        name: String,
        #[serde(default, skip_serializing_if = "OpParams::is_empty")]
        params: OpParams,
    },
}

impl LayerSpec {
    /// Short human-readable description, used by `inspect`
    pub fn describe(&self) -> String {
        match self {
            LayerSpec::Conv2d {
                filters,
                kernel_size,
                strides,
                padding,
                ..
            } => format!(
                "conv2d {}x{} -> {} (stride {}, {:?})",
                kernel_size, kernel_size, filters, strides, padding
            ),
            LayerSpec::BatchNorm { epsilon } => format!("batch_norm (eps {})", epsilon),
            LayerSpec::MaxPool2d { pool_size, strides } => format!(
                "max_pool2d {}x{} (stride {})",
                pool_size,
                pool_size,
                strides.unwrap_or(*pool_size)
            ),
            LayerSpec::GlobalAvgPool2d => "global_avg_pool2d".to_string(),
            LayerSpec::Flatten => "flatten".to_string(),
            LayerSpec::Dense { units, .. } => format!("dense -> {}", units),
            LayerSpec::Dropout { rate } => format!("dropout ({})", rate),
            LayerSpec::Activation { name, .. } => format!("activation {}", name),
            LayerSpec::Custom { name, .. } => format!("custom {}", name),
        }
    }

    /// Name of the op this layer resolves through the registry, if any
    pub fn op_name(&self) -> Option<&str> {
        match self {
            LayerSpec::Activation { name, .. } | LayerSpec::Custom { name, .. } => {
                Some(name.as_str())
            }
            _ => None,
        }
    }
}

/// On-disk format of the weights record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFormat {
    /// Half-precision named MessagePack (`.mpk`)
    Compact,
    /// Full-precision binary record (`.bin`)
    Binary,
}

impl WeightFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            WeightFormat::Compact => "mpk",
            WeightFormat::Binary => "bin",
        }
    }
}

/// Location and format of the weights record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightsSpec {
    /// Path relative to the manifest file
    pub path: PathBuf,
    pub format: WeightFormat,
}

/// Architecture description of a pretrained classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub input: InputShape,
    pub num_classes: usize,
    pub layers: Vec<LayerSpec>,
    /// Absent for freshly initialised networks that were never saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightsSpec>,
}

impl ModelManifest {
    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PlantVillageError::ArtifactNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse a manifest from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PlantVillageError::Deserialization(format!("invalid manifest: {}", e)))
    }

    /// Write the manifest as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PlantVillageError::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the weights path against the directory holding the manifest
    pub fn weights_path(&self, manifest_path: &Path) -> Option<PathBuf> {
        self.weights.as_ref().map(|weights| {
            let base = manifest_path.parent().unwrap_or_else(|| Path::new(""));
            base.join(&weights.path)
        })
    }

    /// Names of every op the manifest resolves through the registry
    pub fn op_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.layers.iter().filter_map(LayerSpec::op_name).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
