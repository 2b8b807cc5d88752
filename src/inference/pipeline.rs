//! Inference pipeline
//!
//! Preprocessor -> model -> argmax -> label lookup, one image at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::preprocess::{preprocess, sniff_format};
use crate::labels::LabelTable;
use crate::model::{Model, ProbabilityVector};
use crate::utils::error::{PlantVillageError, Result};

/// One ranked class of a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    pub class_id: usize,
    pub class_name: String,
    pub probability: f32,
}

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Path to the input image (if applicable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    /// Full probability distribution over all classes
    pub probabilities: ProbabilityVector,

    /// Argmax of `probabilities`, first index on ties
    pub predicted_index: usize,

    /// Label table entry at `predicted_index`
    pub predicted_label: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Preprocessing plus forward pass, in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    /// Resolve the winning class of `probabilities` against `labels`
    pub fn new(
        probabilities: ProbabilityVector,
        labels: &LabelTable,
        inference_time: Duration,
    ) -> Result<Self> {
        let predicted_index = probabilities.argmax().ok_or_else(|| {
            PlantVillageError::Inference("model produced no finite probabilities".to_string())
        })?;
        let predicted_label = labels.lookup(predicted_index)?.to_string();
        let confidence = probabilities.get(predicted_index).unwrap_or_default();

        Ok(Self {
            image_path: None,
            probabilities,
            predicted_index,
            predicted_label,
            confidence,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        })
    }

    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// The `k` most probable classes, best first; ties keep index order
    pub fn top_k(&self, k: usize, labels: &LabelTable) -> Result<Vec<ClassPrediction>> {
        self.probabilities
            .ranked()
            .into_iter()
            .take(k)
            .map(|(class_id, probability)| {
                Ok(ClassPrediction {
                    class_id,
                    class_name: labels.lookup(class_id)?.to_string(),
                    probability,
                })
            })
            .collect()
    }

    /// Get the margin between top-1 and top-2 predictions
    pub fn margin(&self) -> f32 {
        let ranked = self.probabilities.ranked();
        match ranked.as_slice() {
            [(_, first), (_, second), ..] => first - second,
            _ => self.confidence,
        }
    }
}

/// Classifies leaf images with a loaded model and a label table
#[derive(Debug)]
pub struct Classifier<B: Backend> {
    model: Model<B>,
    labels: LabelTable,
    accepted_formats: Option<Vec<ImageFormat>>,
}

impl<B: Backend> Classifier<B> {
    /// Pair a model with a label table of the same width
    pub fn new(model: Model<B>, labels: LabelTable) -> Result<Self> {
        if model.num_classes() != labels.len() {
            return Err(PlantVillageError::ShapeMismatch {
                expected: vec![labels.len()],
                actual: vec![model.num_classes()],
            });
        }
        Ok(Self {
            model,
            labels,
            accepted_formats: None,
        })
    }

    /// Pair a model with the PlantVillage label table
    pub fn plantvillage(model: Model<B>) -> Result<Self> {
        Self::new(model, LabelTable::plantvillage().clone())
    }

    /// Only accept images encoded in one of `formats`; all decodable formats are accepted otherwise
    pub fn with_accepted_formats(mut self, formats: Vec<ImageFormat>) -> Self {
        self.accepted_formats = Some(formats);
        self
    }

    /// Classify one encoded image
    pub fn classify(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let start = Instant::now();

        if let Some(accepted) = &self.accepted_formats {
            let format = sniff_format(bytes)?;
            if !accepted.contains(&format) {
                return Err(PlantVillageError::Decode(format!(
                    "{:?} images are not accepted (accepted: {:?})",
                    format, accepted
                )));
            }
        }

        let tensor = preprocess(bytes, self.model.expected_size())?;
        debug!("Preprocessed image to {:?}", tensor.shape());

        let probabilities = self.model.infer(&tensor)?;
        let result = PredictionResult::new(probabilities, &self.labels, start.elapsed())?;

        info!(
            "Predicted {} (class {}) with {:.2}% confidence in {:.1}ms",
            result.predicted_label,
            result.predicted_index,
            result.confidence * 100.0,
            result.inference_time_ms
        );
        Ok(result)
    }

    /// Read and classify an image file
    pub fn classify_file(&self, path: &Path) -> Result<PredictionResult> {
        let bytes = fs::read(path)?;
        Ok(self.classify(&bytes)?.with_image_path(path))
    }

    pub fn model(&self) -> &Model<B> {
        &self.model
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn accepted_formats(&self) -> Option<&[ImageFormat]> {
        self.accepted_formats.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, DefaultBackend};
    use crate::labels::NUM_CLASSES;
    use crate::model::{
        InputShape, LayerSpec, ModelManifest, ModelVariant, OpParams, OpRegistry, Padding,
    };
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    type TestBackend = DefaultBackend;

    fn small_manifest(num_classes: usize) -> ModelManifest {
        ModelManifest {
            name: "small".to_string(),
            input: InputShape::square(32),
            num_classes,
            layers: vec![
                LayerSpec::Conv2d {
                    filters: 8,
                    kernel_size: 3,
                    strides: 2,
                    padding: Padding::Same,
                    use_bias: true,
                },
                LayerSpec::Activation {
                    name: "relu".to_string(),
                    params: OpParams::new(),
                },
                LayerSpec::GlobalAvgPool2d,
                LayerSpec::Dense {
                    units: num_classes,
                    use_bias: true,
                },
                LayerSpec::Activation {
                    name: "softmax".to_string(),
                    params: OpParams::new(),
                },
            ],
            weights: None,
        }
    }

    fn classifier() -> Classifier<TestBackend> {
        let model = Model::from_manifest(
            small_manifest(NUM_CLASSES),
            &OpRegistry::new(),
            &default_device(),
        )
        .unwrap();
        Classifier::plantvillage(model).unwrap()
    }

    fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    fn leaf_jpeg(size: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(size, size, |x, y| {
            Rgb([(x * 3) as u8, 120 + (y % 100) as u8, ((x + y) % 256) as u8])
        });
        encode(image, ImageFormat::Jpeg)
    }

    #[test]
    fn test_classify_is_deterministic() {
        let classifier = classifier();
        let bytes = leaf_jpeg(64);

        let first = classifier.classify(&bytes).unwrap();
        let second = classifier.classify(&bytes).unwrap();
        assert_eq!(first.probabilities, second.probabilities);
        assert_eq!(first.predicted_index, second.predicted_index);
        assert_eq!(first.predicted_label, second.predicted_label);
    }

    #[test]
    fn test_result_is_consistent_with_label_table() {
        let classifier = classifier();
        let result = classifier.classify(&leaf_jpeg(40)).unwrap();

        assert_eq!(result.probabilities.len(), NUM_CLASSES);
        assert!(result.predicted_index < NUM_CLASSES);
        assert_eq!(
            classifier.labels().lookup(result.predicted_index).unwrap(),
            result.predicted_label
        );
        assert_eq!(result.confidence, result.probabilities.max().unwrap());
        assert!((result.probabilities.sum() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_bytes_fail_with_decode() {
        let classifier = classifier();
        let err = classifier.classify(b"GIF89a but not really").unwrap_err();
        assert!(matches!(err, PlantVillageError::Decode(_)));
    }

    #[test]
    fn test_accepted_formats_are_enforced() {
        let classifier = classifier().with_accepted_formats(vec![ImageFormat::Jpeg]);
        assert!(classifier.classify(&leaf_jpeg(32)).is_ok());

        let png = encode(RgbImage::new(32, 32), ImageFormat::Png);
        let err = classifier.classify(&png).unwrap_err();
        assert!(matches!(err, PlantVillageError::Decode(_)));
    }

    #[test]
    fn test_label_table_width_must_match_model() {
        let model = Model::<TestBackend>::from_manifest(
            small_manifest(5),
            &OpRegistry::new(),
            &default_device(),
        )
        .unwrap();
        match Classifier::plantvillage(model) {
            Err(PlantVillageError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![NUM_CLASSES]);
                assert_eq!(actual, vec![5]);
            }
            other => panic!("expected shape mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_classify_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.jpg");
        fs::write(&path, leaf_jpeg(48)).unwrap();

        let classifier = classifier();
        let result = classifier.classify_file(&path).unwrap();
        assert_eq!(result.image_path.as_deref(), Some(path.as_path()));

        let missing = classifier.classify_file(&dir.path().join("missing.jpg"));
        assert!(matches!(missing, Err(PlantVillageError::Io(_))));
    }

    #[test]
    fn test_black_image_through_efficient_model() {
        let variant = ModelVariant::Efficient;
        let model = Model::<TestBackend>::from_manifest(
            variant.reference_manifest(NUM_CLASSES),
            &variant.custom_ops(),
            &default_device(),
        )
        .unwrap();
        let classifier = Classifier::plantvillage(model).unwrap();

        let black = encode(RgbImage::new(224, 224), ImageFormat::Jpeg);
        let result = classifier.classify(&black).unwrap();

        assert_eq!(result.probabilities.len(), 38);
        assert!((result.probabilities.sum() - 1.0).abs() < 1e-3);
        assert!(LabelTable::plantvillage()
            .index_of(&result.predicted_label)
            .is_some());
    }

    #[test]
    fn test_top_k_and_margin() {
        let labels = LabelTable::from_names(["a", "b", "c", "d"]).unwrap();
        let probabilities = ProbabilityVector::new(vec![0.1, 0.5, 0.1, 0.3]);
        let result =
            PredictionResult::new(probabilities, &labels, Duration::from_millis(3)).unwrap();

        assert_eq!(result.predicted_label, "b");
        assert!((result.inference_time_ms - 3.0).abs() < 1e-9);
        assert!((result.margin() - 0.2).abs() < 1e-6);

        let top = result.top_k(3, &labels).unwrap();
        let names: Vec<&str> = top.iter().map(|p| p.class_name.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "a"]);
        assert_eq!(result.top_k(10, &labels).unwrap().len(), 4);
    }

    #[test]
    fn test_top_k_agrees_with_prediction_when_output_has_nan() {
        let labels = LabelTable::from_names(["a", "b", "c"]).unwrap();
        let probabilities = ProbabilityVector::new(vec![f32::NAN, 0.3, 0.7]);
        let result =
            PredictionResult::new(probabilities, &labels, Duration::ZERO).unwrap();

        let top = result.top_k(3, &labels).unwrap();
        assert_eq!(top[0].class_name, result.predicted_label);
        assert_eq!(top.len(), 2);
        assert!((result.margin() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_prediction_from_nan_output_fails() {
        let labels = LabelTable::from_names(["a", "b"]).unwrap();
        let probabilities = ProbabilityVector::new(vec![f32::NAN, f32::NAN]);
        let result = PredictionResult::new(probabilities, &labels, Duration::ZERO);
        assert!(matches!(result, Err(PlantVillageError::Inference(_))));
    }
}
