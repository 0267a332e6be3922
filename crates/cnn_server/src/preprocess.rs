//! JPEG body to model input tensor.

use std::io::Cursor;

use clap::ValueEnum;
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::ImageError;
use ndarray::{Array4, ArrayD};
use thiserror::Error;

/// Order of the color channels in the last tensor dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelOrder {
    /// Blue, green, red. The layout the classifier was trained on.
    Bgr,
    /// Red, green, blue.
    Rgb,
}

/// How a decoded image is turned into a `[1, height, width, 3]` batch.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub height: u32,
    pub width: u32,
    pub channel_order: ChannelOrder,
    /// Multiplier applied to the raw 0-255 pixel values.
    pub pixel_scale: f32,
    /// Resize images of the wrong size instead of rejecting them.
    pub resize: bool,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            height: 150,
            width: 150,
            channel_order: ChannelOrder::Bgr,
            pixel_scale: 1.0,
            resize: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] ImageError),

    #[error("image is {width}x{height}, expected {expected_width}x{expected_height}")]
    Dimensions {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

/// Decodes an encoded image and lays it out as a batch of one.
///
/// The image is forced to three color channels, whatever it was encoded with.
pub fn decode_batch(bytes: &[u8], spec: &ImageSpec) -> Result<ArrayD<f32>, PreprocessError> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .decode()?;

    let image = if image.width() == spec.width && image.height() == spec.height {
        image
    } else if spec.resize {
        image.resize_exact(spec.width, spec.height, FilterType::Triangle)
    } else {
        return Err(PreprocessError::Dimensions {
            width: image.width(),
            height: image.height(),
            expected_width: spec.width,
            expected_height: spec.height,
        });
    };

    let rgb = image.to_rgb8();
    let mut batch = Array4::<f32>::zeros((1, spec.height as usize, spec.width as usize, 3));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let ordered = match spec.channel_order {
            ChannelOrder::Bgr => [b, g, r],
            ChannelOrder::Rgb => [r, g, b],
        };
        for (c, value) in ordered.into_iter().enumerate() {
            batch[[0, y as usize, x as usize, c]] = f32::from(value) * spec.pixel_scale;
        }
    }

    Ok(batch.into_dyn())
}
