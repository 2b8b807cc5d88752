//! Backend abstraction - CPU only
//!
//! Inference always runs on Burn's NdArray backend. No GPU device is ever
//! selected, so the classifier behaves identically on machines with and
//! without CUDA.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;

/// The backend used for inference
pub type DefaultBackend = NdArray<f32>;

/// Get the default device (CPU)
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}
