//! Network assembly from a manifest
//!
//! Walks the manifest's layer list, tracking the activation shape, and turns
//! it into Burn modules plus an execution plan. All parameterised layers live
//! in [`LeafNet`] so the whole network can be saved and loaded as a single
//! Burn record; parameter-free steps stay in the plan.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

use super::manifest::{LayerSpec, ModelManifest, Padding};
use super::ops::{CustomOp, OpRegistry};
use crate::utils::error::{PlantVillageError, Result};

/// Parameterised layers of a network, in the order they appear in the manifest
#[derive(Module, Debug)]
pub struct LeafNet<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub norms: Vec<BatchNorm<B>>,
    pub dense: Vec<Linear<B>>,
}

/// Kind of parameterised layer held in a [`LeafNet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Conv2d,
    BatchNorm,
    Dense,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Conv2d => write!(f, "conv2d"),
            ParamKind::BatchNorm => write!(f, "batch_norm"),
            ParamKind::Dense => write!(f, "dense"),
        }
    }
}

/// Stored structure of one parameterised layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLayout {
    pub kind: ParamKind,
    pub weight: Vec<usize>,
    pub bias: bool,
}

impl std::fmt::Display for ParamLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bias = if self.bias { "with bias" } else { "without bias" };
        write!(f, "{} {:?} {}", self.kind, self.weight, bias)
    }
}

impl<B: Backend> LeafNetRecord<B> {
    /// Layer layout of the record, convolutions first, then norms, then dense layers
    pub fn layout(&self) -> Vec<ParamLayout> {
        let convs = self.convs.iter().map(|conv| ParamLayout {
            kind: ParamKind::Conv2d,
            weight: conv.weight.val().dims().to_vec(),
            bias: conv.bias.is_some(),
        });
        // beta is always present
        let norms = self.norms.iter().map(|norm| ParamLayout {
            kind: ParamKind::BatchNorm,
            weight: norm.gamma.val().dims().to_vec(),
            bias: true,
        });
        let dense = self.dense.iter().map(|linear| ParamLayout {
            kind: ParamKind::Dense,
            weight: linear.weight.val().dims().to_vec(),
            bias: linear.bias.is_some(),
        });
        convs.chain(norms).chain(dense).collect()
    }
}

/// Check a record's layout against the layout a manifest builds
///
/// Layer counts are compared first, so a record for a deeper or shallower
/// network is reported as such rather than by its first differing tensor.
fn check_layout(expected: &[ParamLayout], actual: &[ParamLayout]) -> Result<()> {
    for kind in [ParamKind::Conv2d, ParamKind::BatchNorm, ParamKind::Dense] {
        let wanted = expected.iter().filter(|layer| layer.kind == kind).count();
        let found = actual.iter().filter(|layer| layer.kind == kind).count();
        if wanted != found {
            return Err(PlantVillageError::Deserialization(format!(
                "weights record has {} {} layers, the manifest describes {}",
                found, kind, wanted
            )));
        }
    }

    for (wanted, found) in expected.iter().zip(actual) {
        if wanted != found {
            return Err(PlantVillageError::Deserialization(format!(
                "weights record does not match the architecture: expected {}, got {}",
                wanted, found
            )));
        }
    }
    Ok(())
}

/// Activation shape between layers, batch axis excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureShape {
    Spatial {
        channels: usize,
        height: usize,
        width: usize,
    },
    Flat(usize),
}

#[derive(Debug)]
enum Step<B: Backend> {
    Conv(usize),
    Norm(usize),
    Dense(usize),
    MaxPool(MaxPool2d),
    GlobalAvgPool(AdaptiveAvgPool2d),
    Flatten,
    Identity,
    Op(Box<dyn CustomOp<B>>),
}

/// A manifest turned into runnable modules
#[derive(Debug)]
pub struct Network<B: Backend> {
    weights: LeafNet<B>,
    steps: Vec<Step<B>>,
    output: FeatureShape,
}

fn conv_output(input: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = input + 2 * padding;
    (padded >= kernel).then(|| (padded - kernel) / stride + 1)
}

impl<B: Backend> Network<B> {
    /// Build a freshly initialised network for `manifest`
    ///
    /// Every activation and custom layer is resolved through `registry`;
    /// shape errors are reported with the offending layer's position.
    pub fn build(
        manifest: &ModelManifest,
        registry: &OpRegistry<B>,
        device: &B::Device,
    ) -> Result<Self> {
        let input = manifest.input;
        if input.height == 0 || input.width == 0 || input.channels == 0 {
            return Err(PlantVillageError::Deserialization(format!(
                "input shape {:?} has an empty dimension",
                input
            )));
        }
        if manifest.num_classes == 0 {
            return Err(PlantVillageError::Deserialization(
                "num_classes must be greater than 0".to_string(),
            ));
        }

        let mut shape = FeatureShape::Spatial {
            channels: input.channels,
            height: input.height,
            width: input.width,
        };
        let mut weights = LeafNet {
            convs: Vec::new(),
            norms: Vec::new(),
            dense: Vec::new(),
        };
        let mut steps = Vec::with_capacity(manifest.layers.len());

        for (position, layer) in manifest.layers.iter().enumerate() {
            let invalid = |reason: &str| {
                PlantVillageError::Deserialization(format!(
                    "layer {} ({}): {}",
                    position,
                    layer.describe(),
                    reason
                ))
            };

            match layer {
                LayerSpec::Conv2d {
                    filters,
                    kernel_size,
                    strides,
                    padding,
                    use_bias,
                } => {
                    let FeatureShape::Spatial {
                        channels,
                        height,
                        width,
                    } = shape
                    else {
                        return Err(invalid("expects spatial input"));
                    };
                    if *filters == 0 || *kernel_size == 0 || *strides == 0 {
                        return Err(invalid("filters, kernel_size and strides must be positive"));
                    }

                    let (pad, padding_config) = match padding {
                        Padding::Same if kernel_size % 2 == 0 => {
                            return Err(invalid("same padding needs an odd kernel size"));
                        }
                        Padding::Same => {
                            let pad = (kernel_size - 1) / 2;
                            (pad, PaddingConfig2d::Explicit(pad, pad))
                        }
                        Padding::Valid => (0, PaddingConfig2d::Valid),
                    };

                    let out_height = conv_output(height, *kernel_size, *strides, pad)
                        .ok_or_else(|| invalid("kernel larger than input"))?;
                    let out_width = conv_output(width, *kernel_size, *strides, pad)
                        .ok_or_else(|| invalid("kernel larger than input"))?;

                    let conv = Conv2dConfig::new([channels, *filters], [*kernel_size, *kernel_size])
                        .with_stride([*strides, *strides])
                        .with_padding(padding_config)
                        .with_bias(*use_bias)
                        .init(device);

                    steps.push(Step::Conv(weights.convs.len()));
                    weights.convs.push(conv);
                    shape = FeatureShape::Spatial {
                        channels: *filters,
                        height: out_height,
                        width: out_width,
                    };
                }

                LayerSpec::BatchNorm { epsilon } => {
                    let features = match shape {
                        FeatureShape::Spatial { channels, .. } => channels,
                        FeatureShape::Flat(features) => features,
                    };
                    let norm = BatchNormConfig::new(features)
                        .with_epsilon(*epsilon)
                        .init(device);

                    steps.push(Step::Norm(weights.norms.len()));
                    weights.norms.push(norm);
                }

                LayerSpec::MaxPool2d { pool_size, strides } => {
                    let FeatureShape::Spatial {
                        channels,
                        height,
                        width,
                    } = shape
                    else {
                        return Err(invalid("expects spatial input"));
                    };
                    let stride = strides.unwrap_or(*pool_size);
                    if *pool_size == 0 || stride == 0 {
                        return Err(invalid("pool_size and strides must be positive"));
                    }

                    let out_height = conv_output(height, *pool_size, stride, 0)
                        .ok_or_else(|| invalid("pool larger than input"))?;
                    let out_width = conv_output(width, *pool_size, stride, 0)
                        .ok_or_else(|| invalid("pool larger than input"))?;

                    let pool = MaxPool2dConfig::new([*pool_size, *pool_size])
                        .with_strides([stride, stride])
                        .init();

                    steps.push(Step::MaxPool(pool));
                    shape = FeatureShape::Spatial {
                        channels,
                        height: out_height,
                        width: out_width,
                    };
                }

                LayerSpec::GlobalAvgPool2d => {
                    let FeatureShape::Spatial { channels, .. } = shape else {
                        return Err(invalid("expects spatial input"));
                    };
                    steps.push(Step::GlobalAvgPool(
                        AdaptiveAvgPool2dConfig::new([1, 1]).init(),
                    ));
                    shape = FeatureShape::Flat(channels);
                }

                LayerSpec::Flatten => {
                    if let FeatureShape::Spatial {
                        channels,
                        height,
                        width,
                    } = shape
                    {
                        steps.push(Step::Flatten);
                        shape = FeatureShape::Flat(channels * height * width);
                    }
                }

                LayerSpec::Dense { units, use_bias } => {
                    let FeatureShape::Flat(features) = shape else {
                        return Err(invalid(
                            "expects flat input; add flatten or global_avg_pool2d first",
                        ));
                    };
                    if *units == 0 {
                        return Err(invalid("units must be positive"));
                    }
                    let linear = LinearConfig::new(features, *units)
                        .with_bias(*use_bias)
                        .init(device);

                    steps.push(Step::Dense(weights.dense.len()));
                    weights.dense.push(linear);
                    shape = FeatureShape::Flat(*units);
                }

                LayerSpec::Dropout { rate } => {
                    if !(0.0..1.0).contains(rate) {
                        return Err(invalid("rate must be in [0, 1)"));
                    }
                    steps.push(Step::Identity);
                }

                LayerSpec::Activation { name, params } | LayerSpec::Custom { name, params } => {
                    steps.push(Step::Op(registry.resolve(name, params)?));
                }
            }
        }

        if shape != FeatureShape::Flat(manifest.num_classes) {
            return Err(PlantVillageError::Deserialization(format!(
                "network output is {:?}, expected {} class scores",
                shape, manifest.num_classes
            )));
        }

        Ok(Self {
            weights,
            steps,
            output: shape,
        })
    }

    pub fn weights(&self) -> &LeafNet<B> {
        &self.weights
    }

    /// Swap in a loaded weights record, refusing records that do not fit the manifest
    ///
    /// The record is checked before Burn sees it: layer counts, weight
    /// dimensions and bias presence must all match what the manifest built.
    pub fn load_record(&mut self, record: LeafNetRecord<B>) -> Result<()> {
        let expected = self.weights.clone().into_record().layout();
        check_layout(&expected, &record.layout())?;
        self.weights = self.weights.clone().load_record(record);
        Ok(())
    }

    pub fn output_shape(&self) -> FeatureShape {
        self.output
    }

    pub fn num_params(&self) -> usize {
        self.weights.num_params()
    }

    /// Forward pass in inference mode
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Tensor of shape [batch_size, num_classes, 1, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.steps.iter().fold(x, |x, step| match step {
            Step::Conv(index) => self.weights.convs[*index].forward(x),
            Step::Norm(index) => self.weights.norms[*index].forward(x),
            Step::Dense(index) => {
                let [batch_size, features, _, _] = x.dims();
                let out = self.weights.dense[*index].forward(x.reshape([batch_size, features]));
                let [_, units] = out.dims();
                out.reshape([batch_size, units, 1, 1])
            }
            Step::MaxPool(pool) => pool.forward(x),
            Step::GlobalAvgPool(pool) => pool.forward(x),
            Step::Flatten => {
                let [batch_size, channels, height, width] = x.dims();
                x.reshape([batch_size, channels * height * width, 1, 1])
            }
            Step::Identity => x,
            Step::Op(op) => op.forward(x),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, DefaultBackend};
    use crate::model::manifest::InputShape;
    use crate::model::ops::OpParams;

    type TestBackend = DefaultBackend;

    fn manifest(layers: Vec<LayerSpec>, num_classes: usize) -> ModelManifest {
        ModelManifest {
            name: "test".to_string(),
            input: InputShape::square(16),
            num_classes,
            layers,
            weights: None,
        }
    }

    fn conv(filters: usize, kernel_size: usize, strides: usize) -> LayerSpec {
        LayerSpec::Conv2d {
            filters,
            kernel_size,
            strides,
            padding: Padding::Same,
            use_bias: true,
        }
    }

    fn activation(name: &str) -> LayerSpec {
        LayerSpec::Activation {
            name: name.to_string(),
            params: OpParams::new(),
        }
    }

    #[test]
    fn test_conv_output_size() {
        assert_eq!(conv_output(224, 3, 2, 1), Some(112));
        assert_eq!(conv_output(256, 2, 2, 0), Some(128));
        assert_eq!(conv_output(2, 3, 1, 0), None);
    }

    #[test]
    fn test_build_tracks_shapes_and_runs_forward() {
        let layers = vec![
            conv(4, 3, 1),
            LayerSpec::BatchNorm { epsilon: 1e-3 },
            activation("relu"),
            LayerSpec::MaxPool2d {
                pool_size: 2,
                strides: None,
            },
            conv(8, 3, 2),
            LayerSpec::Flatten,
            LayerSpec::Dropout { rate: 0.5 },
            LayerSpec::Dense {
                units: 5,
                use_bias: true,
            },
            activation("softmax"),
        ];
        let device = default_device();
        let network =
            Network::<TestBackend>::build(&manifest(layers, 5), &OpRegistry::new(), &device)
                .unwrap();

        assert_eq!(network.output_shape(), FeatureShape::Flat(5));
        assert_eq!(network.weights().convs.len(), 2);
        // 16 -> pool 8 -> stride 2 conv 4, flattened 8 * 4 * 4
        assert_eq!(network.weights().dense[0].weight.val().dims(), [128, 5]);

        let output = network.forward(Tensor::zeros([1, 3, 16, 16], &device));
        assert_eq!(output.dims(), [1, 5, 1, 1]);
    }

    #[test]
    fn test_dense_before_flatten_is_rejected() {
        let layers = vec![LayerSpec::Dense {
            units: 2,
            use_bias: true,
        }];
        let err = Network::<TestBackend>::build(
            &manifest(layers, 2),
            &OpRegistry::new(),
            &default_device(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("flat input"));
    }

    #[test]
    fn test_even_kernel_with_same_padding_is_rejected() {
        let layers = vec![conv(4, 2, 1), LayerSpec::GlobalAvgPool2d];
        let result =
            Network::<TestBackend>::build(&manifest(layers, 4), &OpRegistry::new(), &default_device());
        assert!(matches!(result, Err(PlantVillageError::Deserialization(_))));
    }

    #[test]
    fn test_output_width_must_match_num_classes() {
        let layers = vec![
            LayerSpec::GlobalAvgPool2d,
            LayerSpec::Dense {
                units: 3,
                use_bias: true,
            },
        ];
        let err = Network::<TestBackend>::build(
            &manifest(layers, 38),
            &OpRegistry::new(),
            &default_device(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("38 class scores"));
    }

    #[test]
    fn test_unregistered_custom_layer_is_rejected() {
        let layers = vec![
            LayerSpec::GlobalAvgPool2d,
            LayerSpec::Custom {
                name: "FixedDropout".to_string(),
                params: OpParams::new().with("rate", 0.2),
            },
        ];
        let err = Network::<TestBackend>::build(
            &manifest(layers.clone(), 3),
            &OpRegistry::new(),
            &default_device(),
        )
        .unwrap_err();
        assert!(matches!(err, PlantVillageError::Deserialization(_)));

        assert!(Network::<TestBackend>::build(
            &manifest(layers, 3),
            &OpRegistry::extensions(),
            &default_device(),
        )
        .is_ok());
    }

    fn dense_head(use_bias: bool) -> Vec<LayerSpec> {
        vec![
            LayerSpec::GlobalAvgPool2d,
            LayerSpec::Dense { units: 2, use_bias },
        ]
    }

    #[test]
    fn test_load_record_checks_layer_counts() {
        let device = default_device();
        let small = manifest(dense_head(true), 2);
        let mut large_layers = vec![conv(6, 3, 1)];
        large_layers.extend(dense_head(true));
        let large = manifest(large_layers, 2);

        let mut network = Network::<TestBackend>::build(&small, &OpRegistry::new(), &device).unwrap();
        let deeper = Network::<TestBackend>::build(&large, &OpRegistry::new(), &device).unwrap();
        let err = network
            .load_record(deeper.weights().clone().into_record())
            .unwrap_err();
        assert!(err.to_string().contains("1 conv2d layers, the manifest describes 0"));

        let mut deeper = deeper;
        let err = deeper
            .load_record(network.weights().clone().into_record())
            .unwrap_err();
        assert!(matches!(err, PlantVillageError::Deserialization(_)));

        let same = Network::<TestBackend>::build(&small, &OpRegistry::new(), &device).unwrap();
        assert!(network
            .load_record(same.weights().clone().into_record())
            .is_ok());
    }

    #[test]
    fn test_load_record_checks_bias_presence() {
        let device = default_device();
        let mut with_bias =
            Network::<TestBackend>::build(&manifest(dense_head(true), 2), &OpRegistry::new(), &device)
                .unwrap();
        let without_bias =
            Network::<TestBackend>::build(&manifest(dense_head(false), 2), &OpRegistry::new(), &device)
                .unwrap();

        let err = with_bias
            .load_record(without_bias.weights().clone().into_record())
            .unwrap_err();
        assert!(err.to_string().contains("without bias"));
    }

    #[test]
    fn test_param_layout_display() {
        let layout = ParamLayout {
            kind: ParamKind::Conv2d,
            weight: vec![4, 3, 3, 3],
            bias: false,
        };
        assert_eq!(layout.to_string(), "conv2d [4, 3, 3, 3] without bias");
    }
}
