//! Image preprocessing for the tagger model.
//!
//! Defines the `ImageProcessor` trait and `ImagePreprocessor`, which fits an
//! image into a square canvas, normalizes it with ImageNet statistics and lays
//! it out as an NCHW tensor.

use anyhow::{ensure, Context, Result};
use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use ndarray::{Array, Axis, Ix4};
use rayon::prelude::*;

/// Side length of the model input.
pub const INPUT_SIZE: u32 = 448;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A trait for processing images into tensors suitable for model input.
pub trait ImageProcessor {
    /// Processes a single image into a 4D tensor.
    fn process(&self, image: &DynamicImage) -> Result<Array<f32, Ix4>>;

    /// Processes a batch of images into a single 4D tensor.
    fn process_batch(&self, images: Vec<&DynamicImage>) -> Result<Array<f32, Ix4>>
    where
        Self: Sync,
    {
        ensure!(!images.is_empty(), "Cannot preprocess an empty batch");

        let tensors: Result<Vec<_>> =
            images.into_par_iter().map(|img| self.process(img)).collect();
        let tensors = tensors?;

        ndarray::concatenate(
            Axis(0),
            &tensors.iter().map(|t| t.view()).collect::<Vec<_>>(),
        )
        .context("Failed to concatenate tensors")
    }
}

/// Resizes, pads and normalizes images.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    pub size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(INPUT_SIZE, IMAGENET_MEAN, IMAGENET_STD)
    }
}

impl ImagePreprocessor {
    pub fn new(size: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { size, mean, std }
    }

    /// Dimensions of `width` x `height` scaled to fit the canvas.
    ///
    /// Both sides are truncated and never drop below one pixel.
    pub fn fit_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let size = self.size as f64;
        let ratio = (size / width.max(1) as f64).min(size / height.max(1) as f64);
        let new_width = ((width as f64 * ratio) as u32).clamp(1, self.size);
        let new_height = ((height as f64 * ratio) as u32).clamp(1, self.size);
        (new_width, new_height)
    }

    /// Fits the image onto a black square canvas, centered.
    pub fn letterbox(&self, image: &DynamicImage) -> RgbImage {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let (new_width, new_height) = self.fit_dimensions(width, height);

        let resized = image::imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3);

        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([0, 0, 0]));
        let pad_left = (self.size - new_width) / 2;
        let pad_top = (self.size - new_height) / 2;
        image::imageops::overlay(&mut canvas, &resized, pad_left as i64, pad_top as i64);
        canvas
    }

    /// Normalizes the pixel values into a `[1, 3, S, S]` tensor.
    fn normalize_and_to_tensor(&self, image: &RgbImage) -> Array<f32, Ix4> {
        let size = self.size as usize;
        let mut tensor = Array::zeros((3, size, size));

        for (x, y, pixel) in image.enumerate_pixels() {
            for (c, &value) in pixel.0.iter().enumerate() {
                tensor[[c, y as usize, x as usize]] =
                    (value as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }

        tensor.insert_axis(Axis(0))
    }
}

impl ImageProcessor for ImagePreprocessor {
    fn process(&self, image: &DynamicImage) -> Result<Array<f32, Ix4>> {
        ensure!(
            image.width() > 0 && image.height() > 0,
            "Image has no pixels"
        );
        let canvas = self.letterbox(image);
        Ok(self.normalize_and_to_tensor(&canvas))
    }
}
