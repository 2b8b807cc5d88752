//! # PlantVillage Inference
//!
//! Plant leaf disease classification from a single photograph, running a
//! pretrained model through the Burn framework on the CPU.
//!
//! ## Features
//!
//! - **38 PlantVillage classes** across 14 plant species
//! - **Model artifacts** described by a JSON manifest plus a Burn weights record
//! - **Extension ops** (`FixedDropout`, `swish`, `leaky_relu`) registered by name at load time
//! - **Reports** with a verdict sentence, ranked classes and an SVG probability chart
//!
//! ## Modules
//!
//! - `labels`: The class index -> disease label table
//! - `model`: Manifest, op registry, network assembly and the loaded model handle
//! - `inference`: Preprocessing, the classification pipeline and reports
//! - `config`: JSON configuration for the CLI
//! - `utils`: Logging, charts, and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plantvillage_infer::backend::{default_device, DefaultBackend};
//! use plantvillage_infer::model::{Model, ModelVariant};
//! use plantvillage_infer::Classifier;
//!
//! let variant = ModelVariant::Efficient;
//! let model: Model<DefaultBackend> = Model::load(
//!     "Model/pd_model_efficient.json".as_ref(),
//!     &variant.custom_ops(),
//!     &default_device(),
//! )?;
//! let classifier = Classifier::plantvillage(model)?;
//! let result = classifier.classify_file("leaf.jpg".as_ref())?;
//! println!("{} ({:.2}%)", result.predicted_label, result.confidence * 100.0);
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod labels;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::ClassifierConfig;
pub use inference::{Classifier, PredictionReport, PredictionResult};
pub use labels::{LabelTable, CLASS_NAMES, NUM_CLASSES};
pub use model::{Model, ModelVariant, OpRegistry, ProbabilityVector};
pub use utils::error::{PlantVillageError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
