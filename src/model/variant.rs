//! The two shipped model families

use std::fmt;
use std::str::FromStr;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use super::manifest::{InputShape, LayerSpec, ModelManifest, Padding, WeightFormat};
use super::ops::{FixedDropout, LeakyRelu, OpParams, OpRegistry, Swish};

/// Model family an artifact belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Plain CNN, 256x256 input, half-precision record
    #[default]
    Compact,
    /// EfficientNet-style network, 224x224 input, needs the extension ops
    Efficient,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Compact, ModelVariant::Efficient];

    /// Side length of the square input image
    pub fn image_size(&self) -> usize {
        match self {
            ModelVariant::Compact => 256,
            ModelVariant::Efficient => 224,
        }
    }

    pub fn weight_format(&self) -> WeightFormat {
        match self {
            ModelVariant::Compact => WeightFormat::Compact,
            ModelVariant::Efficient => WeightFormat::Binary,
        }
    }

    /// Ops that must be registered before an artifact of this family can be loaded
    pub fn custom_ops<B: Backend>(&self) -> OpRegistry<B> {
        match self {
            ModelVariant::Compact => OpRegistry::new(),
            ModelVariant::Efficient => OpRegistry::extensions(),
        }
    }

    /// Conventional artifact file name
    pub fn artifact_name(&self) -> &'static str {
        match self {
            ModelVariant::Compact => "pd_model.json",
            ModelVariant::Efficient => "pd_model_efficient.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Compact => "compact",
            ModelVariant::Efficient => "efficient",
        }
    }

    /// Reference architecture of this family, used to scaffold fresh artifacts
    pub fn reference_manifest(&self, num_classes: usize) -> ModelManifest {
        let layers = match self {
            ModelVariant::Compact => compact_layers(num_classes),
            ModelVariant::Efficient => efficient_layers(num_classes),
        };
        ModelManifest {
            name: format!("plantvillage_{}", self.as_str()),
            input: InputShape::square(self.image_size()),
            num_classes,
            layers,
            weights: None,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(ModelVariant::Compact),
            "efficient" => Ok(ModelVariant::Efficient),
            other => Err(format!(
                "unknown model variant '{}' (expected compact or efficient)",
                other
            )),
        }
    }
}

fn conv(filters: usize, kernel_size: usize, strides: usize) -> LayerSpec {
    LayerSpec::Conv2d {
        filters,
        kernel_size,
        strides,
        padding: Padding::Same,
        use_bias: false,
    }
}

fn activation(name: &str) -> LayerSpec {
    LayerSpec::Activation {
        name: name.to_string(),
        params: OpParams::new(),
    }
}

fn dense(units: usize) -> LayerSpec {
    LayerSpec::Dense {
        units,
        use_bias: true,
    }
}

/// Four conv blocks (conv -> batch norm -> relu -> 2x2 max pool), filters doubling
fn compact_layers(num_classes: usize) -> Vec<LayerSpec> {
    let mut layers = Vec::new();
    for filters in [32, 64, 128, 256] {
        layers.push(conv(filters, 3, 1));
        layers.push(LayerSpec::BatchNorm { epsilon: 1e-3 });
        layers.push(activation("relu"));
        layers.push(LayerSpec::MaxPool2d {
            pool_size: 2,
            strides: None,
        });
    }
    layers.extend([
        LayerSpec::GlobalAvgPool2d,
        dense(256),
        activation("relu"),
        LayerSpec::Dropout { rate: 0.3 },
        dense(num_classes),
        activation("softmax"),
    ]);
    layers
}

/// Strided swish stem and stages, then a leaky-relu classification head
fn efficient_layers(num_classes: usize) -> Vec<LayerSpec> {
    let mut layers = Vec::new();
    for (filters, kernel_size, strides) in [(32, 3, 2), (64, 3, 2), (128, 3, 2), (256, 1, 1)] {
        layers.push(conv(filters, kernel_size, strides));
        layers.push(LayerSpec::BatchNorm { epsilon: 1e-3 });
        layers.push(activation(Swish::NAME));
    }
    layers.extend([
        LayerSpec::GlobalAvgPool2d,
        LayerSpec::Custom {
            name: FixedDropout::NAME.to_string(),
            params: OpParams::new().with("rate", 0.2),
        },
        dense(128),
        LayerSpec::Activation {
            name: LeakyRelu::NAME.to_string(),
            params: OpParams::new().with("alpha", LeakyRelu::DEFAULT_ALPHA),
        },
        dense(num_classes),
        activation("softmax"),
    ]);
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, DefaultBackend};
    use crate::model::network::{FeatureShape, Network};

    type TestBackend = DefaultBackend;

    #[test]
    fn test_variant_properties() {
        assert_eq!(ModelVariant::Compact.image_size(), 256);
        assert_eq!(ModelVariant::Efficient.image_size(), 224);
        assert_eq!(ModelVariant::Compact.weight_format(), WeightFormat::Compact);
        assert_eq!(ModelVariant::Efficient.weight_format(), WeightFormat::Binary);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Efficient".parse::<ModelVariant>().unwrap(), ModelVariant::Efficient);
        assert!("resnet".parse::<ModelVariant>().is_err());
        for variant in ModelVariant::ALL {
            assert_eq!(variant.to_string().parse::<ModelVariant>().unwrap(), variant);
        }
    }

    #[test]
    fn test_efficient_manifest_needs_its_ops() {
        let manifest = ModelVariant::Efficient.reference_manifest(38);
        let registry = ModelVariant::Efficient.custom_ops::<TestBackend>();
        for name in manifest.op_names() {
            assert!(registry.resolves(name), "{} does not resolve", name);
        }
        assert!(!ModelVariant::Compact
            .custom_ops::<TestBackend>()
            .resolves(Swish::NAME));
    }

    #[test]
    fn test_reference_manifests_build() {
        let device = default_device();
        for variant in ModelVariant::ALL {
            let manifest = variant.reference_manifest(38);
            assert_eq!(manifest.input, InputShape::square(variant.image_size()));

            let network =
                Network::<TestBackend>::build(&manifest, &variant.custom_ops(), &device).unwrap();
            assert_eq!(network.output_shape(), FeatureShape::Flat(38));
        }
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ModelVariant::Efficient).unwrap(),
            "\"efficient\""
        );
    }
}
