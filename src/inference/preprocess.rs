//! Image preprocessing
//!
//! Turns encoded image bytes into the `[1, H, W, 3]` tensor a model expects:
//! decode, force RGB, resize exactly (aspect ratio is not preserved), scale
//! to [0, 1].

use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbImage};

use crate::utils::error::{PlantVillageError, Result};

/// Number of colour channels every model consumes
pub const CHANNELS: usize = 3;

/// Normalized pixels in NHWC order with a leading batch dimension of 1
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Wrap raw NHWC values; `data` must hold exactly `height * width * 3` floats
    pub fn new(height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let expected = height * width * CHANNELS;
        if data.len() != expected {
            return Err(PlantVillageError::ShapeMismatch {
                expected: vec![expected],
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Scale an RGB image into [0, 1]
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let data = image
            .as_raw()
            .iter()
            .map(|&value| value as f32 / 255.0)
            .collect();
        Self {
            height: height as usize,
            width: width as usize,
            data,
        }
    }

    /// Logical shape `[1, H, W, 3]`
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, CHANNELS]
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// RGB values of one pixel, if inside the image
    pub fn pixel(&self, y: usize, x: usize) -> Option<[f32; 3]> {
        if y >= self.height || x >= self.width {
            return None;
        }
        let offset = (y * self.width + x) * CHANNELS;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }
}

/// Identify the encoded format from the leading bytes
pub fn sniff_format(bytes: &[u8]) -> Result<ImageFormat> {
    if bytes.is_empty() {
        return Err(PlantVillageError::Decode("no image data".to_string()));
    }
    image::guess_format(bytes).map_err(|e| PlantVillageError::Decode(e.to_string()))
}

/// Decode image bytes, the format is detected from the content
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(PlantVillageError::Decode("no image data".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| PlantVillageError::Decode(e.to_string()))
}

/// Resize an image to the target dimensions
pub fn resize_image(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    image.resize_exact(width, height, FilterType::Triangle)
}

/// Preprocess an already decoded image to `target = (height, width)`
pub fn preprocess_image(image: &DynamicImage, target: (usize, usize)) -> Result<ImageTensor> {
    let (height, width) = target;
    if height == 0 || width == 0 {
        return Err(PlantVillageError::Config(format!(
            "target size must be non-zero, got {}x{}",
            height, width
        )));
    }
    let (height, width) = match (u32::try_from(height), u32::try_from(width)) {
        (Ok(height), Ok(width)) => (height, width),
        _ => {
            return Err(PlantVillageError::Config(format!(
                "target size {}x{} is too large",
                height, width
            )))
        }
    };

    let rgb = if image.width() == width && image.height() == height {
        image.to_rgb8()
    } else {
        resize_image(image, width, height).to_rgb8()
    };
    Ok(ImageTensor::from_rgb(&rgb))
}

/// Decode and preprocess encoded image bytes to `target = (height, width)`
///
/// # Returns
/// * Tensor of shape [1, height, width, 3] with values in [0, 1]
pub fn preprocess(bytes: &[u8], target: (usize, usize)) -> Result<ImageTensor> {
    let image = decode(bytes)?;
    preprocess_image(&image, target)
}
