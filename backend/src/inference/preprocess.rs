use std::io::Cursor;

use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use ndarray::Array4;

use super::InferenceError;
use crate::sample::{ImageSample, MediaType};

pub const INPUT_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;
pub const IMAGENET_MEAN: [f32; CHANNELS] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; CHANNELS] = [0.229, 0.224, 0.225];

const DEFAULT_MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// NCHW input with a batch dimension of one.
pub type InputTensor = Array4<f32>;

#[derive(Debug, Clone)]
pub struct Preprocessor {
    max_image_bytes: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGE_BYTES)
    }
}

impl Preprocessor {
    pub fn new(max_image_bytes: usize) -> Self {
        Self { max_image_bytes }
    }

    pub fn process(&self, sample: &ImageSample) -> Result<InputTensor, InferenceError> {
        if sample.declared_media_type().is_none() {
            return Err(InferenceError::UnsupportedMediaType(format!(
                "{} ({})",
                sample.file_name(),
                sample.mime_type()
            )));
        }
        if sample.len() > self.max_image_bytes {
            return Err(InferenceError::ImageTooLarge {
                size: sample.len(),
                limit: self.max_image_bytes,
            });
        }
        if sample.is_empty() {
            return Err(InferenceError::ImageDecode("empty upload".to_string()));
        }

        let image = decode_rgb(sample.bytes())?;
        Ok(to_tensor(&image))
    }
}

fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, InferenceError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| InferenceError::ImageDecode(e.to_string()))?;

    match reader.format() {
        Some(format) if MediaType::from_format(format).is_some() => {}
        Some(format) => {
            return Err(InferenceError::UnsupportedMediaType(format!(
                "decoded content is {:?}",
                format
            )));
        }
        None => {
            return Err(InferenceError::ImageDecode(
                "unrecognized image data".to_string(),
            ));
        }
    }

    let image = reader
        .decode()
        .map_err(|e| InferenceError::ImageDecode(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Stretches to 224x224, scales to [0, 1] and applies ImageNet statistics.
fn to_tensor(image: &RgbImage) -> InputTensor {
    let resized = image::imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let side = INPUT_SIZE as usize;

    Array4::from_shape_fn((1, CHANNELS, side, side), |(_, c, y, x)| {
        let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    })
}
