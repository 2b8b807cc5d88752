//! Model adapter
//!
//! Owns a loaded network and turns a preprocessed image into a probability
//! vector. Loading resolves the manifest's operations through an
//! [`OpRegistry`], then reads the weights record with the recorder the
//! manifest names.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{
    module::Module,
    record::{BinFileRecorder, CompactRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};
use tracing::{debug, info};

use super::manifest::{InputShape, ModelManifest, WeightFormat, WeightsSpec};
use super::network::{LeafNetRecord, Network};
use super::ops::OpRegistry;
use super::probabilities::ProbabilityVector;
use crate::inference::preprocess::ImageTensor;
use crate::utils::error::{PlantVillageError, Result};

/// A pretrained classifier ready for inference
#[derive(Debug)]
pub struct Model<B: Backend> {
    manifest: ModelManifest,
    network: Network<B>,
    device: B::Device,
}

/// Read a weights record without applying it to a module
fn read_record<B: Backend>(
    path: &Path,
    format: WeightFormat,
    device: &B::Device,
) -> Result<LeafNetRecord<B>> {
    let args = path.to_path_buf();
    let loaded = match format {
        WeightFormat::Compact => {
            <CompactRecorder as Recorder<B>>::load(&CompactRecorder::new(), args, device)
        }
        WeightFormat::Binary => <BinFileRecorder<FullPrecisionSettings> as Recorder<B>>::load(
            &BinFileRecorder::new(),
            args,
            device,
        ),
    };
    loaded.map_err(|e| {
        PlantVillageError::Deserialization(format!("failed to read weights {:?}: {:?}", path, e))
    })
}

impl<B: Backend> Model<B> {
    /// Load a model artifact (manifest plus weights record)
    ///
    /// # Arguments
    /// * `path` - Path to the JSON manifest
    /// * `custom_ops` - Extension ops the artifact may reference
    /// * `device` - Device to place the weights on
    pub fn load(path: &Path, custom_ops: &OpRegistry<B>, device: &B::Device) -> Result<Self> {
        let start = Instant::now();
        let manifest = ModelManifest::load(path)?;
        let Some(weights) = manifest.weights.clone() else {
            return Err(PlantVillageError::Deserialization(format!(
                "manifest {:?} does not reference a weights record",
                path
            )));
        };

        let mut network = Network::build(&manifest, custom_ops, device)?;

        // The recorders take care of the extension themselves
        let weights_path = manifest
            .weights_path(path)
            .unwrap_or_else(|| weights.path.clone())
            .with_extension(weights.format.extension());
        if !weights_path.is_file() {
            return Err(PlantVillageError::ArtifactNotFound(weights_path));
        }
        let record = read_record::<B>(&weights_path, weights.format, device)?;
        network.load_record(record)?;

        info!(
            "Loaded model '{}' ({} layers, {} parameters) in {:.1}ms",
            manifest.name,
            manifest.layers.len(),
            network.num_params(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            manifest,
            network,
            device: device.clone(),
        })
    }

    /// Build a freshly initialised model; any weights reference in the manifest is ignored
    pub fn from_manifest(
        manifest: ModelManifest,
        custom_ops: &OpRegistry<B>,
        device: &B::Device,
    ) -> Result<Self> {
        let network = Network::build(&manifest, custom_ops, device)?;
        debug!(
            "Initialised model '{}' with {} parameters",
            manifest.name,
            network.num_params()
        );
        Ok(Self {
            manifest,
            network,
            device: device.clone(),
        })
    }

    /// Save the model as an artifact in the weights format the manifest already names
    ///
    /// Models that were never saved default to the compact format.
    pub fn save(&mut self, manifest_path: &Path) -> Result<PathBuf> {
        let format = self
            .manifest
            .weights
            .as_ref()
            .map(|weights| weights.format)
            .unwrap_or(WeightFormat::Compact);
        self.save_as(manifest_path, format)
    }

    /// Save the model as an artifact: weights record next to the manifest, then the manifest
    ///
    /// Returns the path of the weights record.
    pub fn save_as(&mut self, manifest_path: &Path, format: WeightFormat) -> Result<PathBuf> {
        if let Some(parent) = manifest_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file_name = manifest_path
            .file_stem()
            .map(PathBuf::from)
            .ok_or_else(|| {
                PlantVillageError::Config(format!("invalid manifest path {:?}", manifest_path))
            })?
            .with_extension(format.extension());
        let weights_path = manifest_path.with_file_name(&file_name);

        let weights = self.network.weights().clone();
        let saved = match format {
            WeightFormat::Compact => weights.save_file(&weights_path, &CompactRecorder::new()),
            WeightFormat::Binary => weights.save_file(
                &weights_path,
                &BinFileRecorder::<FullPrecisionSettings>::new(),
            ),
        };
        saved.map_err(|e| PlantVillageError::Serialization(format!("{:?}", e)))?;

        self.manifest.weights = Some(WeightsSpec {
            path: file_name,
            format,
        });
        self.manifest.save(manifest_path)?;

        info!("Saved model '{}' to {:?}", self.manifest.name, manifest_path);
        Ok(weights_path)
    }

    /// Run one image through the network
    ///
    /// The image must have exactly the shape the model was trained on,
    /// `[1, H, W, 3]`; anything else is a shape mismatch.
    pub fn infer(&self, image: &ImageTensor) -> Result<ProbabilityVector> {
        let expected = self.manifest.input.batch_shape();
        let actual = image.shape();
        if actual != expected {
            return Err(PlantVillageError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }

        // NHWC -> NCHW
        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(image.data().to_vec(), actual),
            &self.device,
        )
        .permute([0, 3, 1, 2]);

        let output = self.network.forward(input);
        let [_, classes, _, _] = output.dims();
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PlantVillageError::Inference(format!("{:?}", e)))?;

        if values.len() != classes || classes != self.manifest.num_classes {
            return Err(PlantVillageError::ShapeMismatch {
                expected: vec![1, self.manifest.num_classes],
                actual: vec![values.len() / classes.max(1), classes],
            });
        }

        Ok(ProbabilityVector::new(values))
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    pub fn input_shape(&self) -> InputShape {
        self.manifest.input
    }

    /// `(height, width)` the preprocessor has to produce
    pub fn expected_size(&self) -> (usize, usize) {
        (self.manifest.input.height, self.manifest.input.width)
    }

    pub fn num_classes(&self) -> usize {
        self.manifest.num_classes
    }

    pub fn num_params(&self) -> usize {
        self.network.num_params()
    }
}
