//! Named element-wise operations resolved while loading a model artifact
//!
//! A manifest refers to activations and parameter-free custom layers by name.
//! Common activations are built in; everything else has to be registered in
//! an [`OpRegistry`] before the artifact is loaded, otherwise loading fails
//! with a deserialization error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::utils::error::{PlantVillageError, Result};

/// Numeric parameters attached to an operation in the manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpParams(BTreeMap<String, f64>);

impl OpParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An operation applied between the parameterised layers of a network
///
/// Inputs are `[batch, channels, height, width]`. Flat activations (after
/// `flatten`, `global_avg_pool2d` or `dense`) arrive as `[batch, features, 1, 1]`,
/// so an op never needs to care which part of the network it sits in.
pub trait CustomOp<B: Backend>: Send + Sync + fmt::Debug {
    /// Name the op was registered under
    fn name(&self) -> &str;

    /// Apply the op in inference mode
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Builds an op instance from the parameters stored in the manifest
pub type OpConstructor<B> =
    Arc<dyn Fn(&OpParams) -> Result<Box<dyn CustomOp<B>>> + Send + Sync>;

/// Activations every artifact may use without registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Gelu,
}

impl Activation {
    pub const ALL: [Activation; 6] = [
        Activation::Linear,
        Activation::Relu,
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Softmax,
        Activation::Gelu,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|activation| activation.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Activation::Linear => "linear",
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Softmax => "softmax",
            Activation::Gelu => "gelu",
        }
    }
}

impl<B: Backend> CustomOp<B> for Activation {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Activation::Linear => x,
            Activation::Relu => activation::relu(x),
            Activation::Sigmoid => activation::sigmoid(x),
            Activation::Tanh => x.tanh(),
            // Channel axis; for flat activations this is the class axis
            Activation::Softmax => activation::softmax(x, 1),
            Activation::Gelu => activation::gelu(x),
        }
    }
}

/// Dropout variant whose noise shape is fixed at graph construction time
///
/// Only ever used for inference here, where it passes its input through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDropout {
    pub rate: f64,
}

impl FixedDropout {
    pub const NAME: &'static str = "FixedDropout";

    pub fn from_params(params: &OpParams) -> Result<Self> {
        let rate = params.get_or("rate", 0.0);
        if !(0.0..1.0).contains(&rate) {
            return Err(PlantVillageError::Deserialization(format!(
                "{}: rate must be in [0, 1), got {}",
                Self::NAME,
                rate
            )));
        }
        Ok(Self { rate })
    }
}

impl<B: Backend> CustomOp<B> for FixedDropout {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        x
    }
}

/// Smooth self-gated activation: `x * sigmoid(x)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Swish;

impl Swish {
    pub const NAME: &'static str = "swish";
}

impl<B: Backend> CustomOp<B> for Swish {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        activation::silu(x)
    }
}

/// Leaky rectifier: `x` for positive inputs, `alpha * x` otherwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyRelu {
    pub alpha: f64,
}

impl LeakyRelu {
    pub const NAME: &'static str = "leaky_relu";

    /// Same default slope as the Keras layer the artifacts were exported from
    pub const DEFAULT_ALPHA: f64 = 0.3;

    pub fn from_params(params: &OpParams) -> Result<Self> {
        let alpha = params.get_or("alpha", Self::DEFAULT_ALPHA);
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(PlantVillageError::Deserialization(format!(
                "{}: alpha must be a non-negative number, got {}",
                Self::NAME,
                alpha
            )));
        }
        Ok(Self { alpha })
    }
}

impl<B: Backend> CustomOp<B> for LeakyRelu {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        activation::leaky_relu(x, self.alpha)
    }
}

/// Registry of extension ops, consulted by name while a manifest is turned into a network
///
/// Registered names shadow the built-in activations.
pub struct OpRegistry<B: Backend> {
    constructors: HashMap<String, OpConstructor<B>>,
}

impl<B: Backend> OpRegistry<B> {
    /// An empty registry: only built-in activations resolve
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// The extension ops needed by the `efficient` model family
    pub fn extensions() -> Self {
        Self::new()
            .with(FixedDropout::NAME, |params| {
                Ok(Box::new(FixedDropout::from_params(params)?) as Box<dyn CustomOp<B>>)
            })
            .with(Swish::NAME, |_| Ok(Box::new(Swish) as Box<dyn CustomOp<B>>))
            .with(LeakyRelu::NAME, |params| {
                Ok(Box::new(LeakyRelu::from_params(params)?) as Box<dyn CustomOp<B>>)
            })
    }

    /// Register an op constructor under `name`, replacing any previous entry
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&OpParams) -> Result<Box<dyn CustomOp<B>>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&OpParams) -> Result<Box<dyn CustomOp<B>>> + Send + Sync + 'static,
    {
        self.register(name, constructor);
        self
    }

    /// Merge another registry into this one; entries of `other` win
    pub fn extend(&mut self, other: &OpRegistry<B>) {
        for (name, constructor) in &other.constructors {
            self.constructors.insert(name.clone(), Arc::clone(constructor));
        }
    }

    /// Whether `name` has been registered (built-ins are not reported)
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Whether `name` resolves, either as a registered op or a built-in
    pub fn resolves(&self, name: &str) -> bool {
        self.contains(name) || Activation::from_name(name).is_some()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the op called `name` with the given parameters
    pub fn resolve(&self, name: &str, params: &OpParams) -> Result<Box<dyn CustomOp<B>>> {
        if let Some(constructor) = self.constructors.get(name) {
            return constructor(params);
        }

        match Activation::from_name(name) {
            Some(builtin) => Ok(Box::new(builtin)),
            None => Err(PlantVillageError::Deserialization(format!(
                "unknown operation '{}'; register it before loading the artifact (registered: [{}])",
                name,
                self.names().join(", ")
            ))),
        }
    }
}

impl<B: Backend> Default for OpRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Clone for OpRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            constructors: self.constructors.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for OpRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    use crate::backend::{default_device, DefaultBackend};

    type TestBackend = DefaultBackend;

    fn input(values: [f32; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_floats(TensorData::new(values.to_vec(), [1, 4, 1, 1]), &default_device())
    }

    fn values(x: Tensor<TestBackend, 4>) -> Vec<f32> {
        x.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_builtins_resolve_without_registration() {
        let registry = OpRegistry::<TestBackend>::new();
        for activation in Activation::ALL {
            assert!(registry.resolves(activation.as_str()));
            let op = registry.resolve(activation.as_str(), &OpParams::new()).unwrap();
            assert_eq!(op.name(), activation.as_str());
        }
    }

    #[test]
    fn test_unknown_op_is_deserialization_error() {
        let registry = OpRegistry::<TestBackend>::new();
        let err = registry.resolve("swish", &OpParams::new()).unwrap_err();
        assert!(matches!(err, PlantVillageError::Deserialization(_)));
        assert!(err.to_string().contains("swish"));
    }

    #[test]
    fn test_extensions_registry() {
        let registry = OpRegistry::<TestBackend>::extensions();
        assert_eq!(registry.names(), vec!["FixedDropout", "leaky_relu", "swish"]);
        assert!(registry.resolve("FixedDropout", &OpParams::new().with("rate", 0.2)).is_ok());
        assert!(registry.resolve("FixedDropout", &OpParams::new().with("rate", 1.5)).is_err());
    }

    #[test]
    fn test_relu_and_leaky_relu() {
        let relu = Activation::Relu;
        let out = values(CustomOp::<TestBackend>::forward(&relu, input([-2.0, -1.0, 0.0, 3.0])));
        assert_eq!(out, vec![0.0, 0.0, 0.0, 3.0]);

        let leaky = LeakyRelu::from_params(&OpParams::new().with("alpha", 0.5)).unwrap();
        let out = values(CustomOp::<TestBackend>::forward(&leaky, input([-2.0, -1.0, 0.0, 3.0])));
        assert_eq!(out, vec![-1.0, -0.5, 0.0, 3.0]);
    }

    #[test]
    fn test_leaky_relu_default_alpha() {
        let leaky = LeakyRelu::from_params(&OpParams::new()).unwrap();
        assert_eq!(leaky.alpha, LeakyRelu::DEFAULT_ALPHA);
        assert!(LeakyRelu::from_params(&OpParams::new().with("alpha", -1.0)).is_err());
    }

    #[test]
    fn test_fixed_dropout_is_identity() {
        let dropout = FixedDropout { rate: 0.4 };
        let out = values(CustomOp::<TestBackend>::forward(&dropout, input([1.0, 2.0, 3.0, 4.0])));
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_swish_matches_definition() {
        let out = values(CustomOp::<TestBackend>::forward(&Swish, input([-1.0, 0.0, 1.0, 2.0])));
        for (x, y) in [-1.0f32, 0.0, 1.0, 2.0].iter().zip(out) {
            let expected = x / (1.0 + (-x).exp());
            assert!((y - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_softmax_sums_to_one_over_channels() {
        let out = values(CustomOp::<TestBackend>::forward(
            &Activation::Softmax,
            input([1.0, 2.0, 3.0, 4.0]),
        ));
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_registered_op_shadows_builtin() {
        let registry = OpRegistry::<TestBackend>::new()
            .with("relu", |_| Ok(Box::new(Activation::Linear) as Box<dyn CustomOp<TestBackend>>));
        let op = registry.resolve("relu", &OpParams::new()).unwrap();
        assert_eq!(values(op.forward(input([-1.0, 0.0, 1.0, 2.0]))), vec![-1.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_extend_merges_entries() {
        let mut registry = OpRegistry::<TestBackend>::new();
        registry.extend(&OpRegistry::extensions());
        assert!(registry.contains("swish"));
        assert!(!registry.contains("relu"));
        assert!(registry.resolves("relu"));
    }
}
