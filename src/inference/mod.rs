//! Inference module for leaf disease classification
//!
//! This module provides:
//! - Image preprocessing (decode, resize, scale)
//! - The classification pipeline
//! - Prediction reports (verdict, chart, JSON)

pub mod pipeline;
pub mod preprocess;
pub mod report;

pub use pipeline::{ClassPrediction, Classifier, PredictionResult};
pub use preprocess::{preprocess, sniff_format, ImageTensor};
pub use report::PredictionReport;
