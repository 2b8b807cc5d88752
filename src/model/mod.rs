//! Model module
//!
//! Loading pretrained classifiers from an artifact (JSON manifest plus Burn
//! weights record) and running them:
//! - `manifest`: the artifact's architecture description
//! - `ops`: named activations and the registry of extension ops
//! - `network`: Burn modules assembled from a manifest
//! - `adapter`: the loaded [`Model`] handle
//! - `variant`: the compact and efficient model families

pub mod adapter;
pub mod manifest;
pub mod network;
pub mod ops;
pub mod probabilities;
pub mod variant;

pub use adapter::Model;
pub use manifest::{InputShape, LayerSpec, ModelManifest, Padding, WeightFormat, WeightsSpec};
pub use ops::{Activation, CustomOp, FixedDropout, LeakyRelu, OpParams, OpRegistry, Swish};
pub use probabilities::ProbabilityVector;
pub use variant::ModelVariant;
