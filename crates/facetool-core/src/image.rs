//! Image buffer descriptor: raw interleaved pixels plus dimensions.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("image of {width}x{height} is too large to address")]
    TooLarge { width: u32, height: u32 },
}

/// Channel layout of an 8-bit interleaved pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Gray8,
    GrayAlpha8,
    Rgb8,
    Rgba8,
    /// Blue-green-red, the native order of the engine boundary.
    Bgr8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::GrayAlpha8 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A decoded image handed across the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl ImageBuffer {
    /// Wrap an already-decoded BGR8 buffer.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self::with_format(pixels, width, height, PixelFormat::Bgr8)
    }

    pub fn with_format(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
        }
    }

    /// Read and decode an image file.
    ///
    /// The raster is stored as the decoder reports it; only non-8-bit
    /// rasters are narrowed to 8 bits per channel.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let image = Self::from_bytes(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            width = image.width,
            height = image.height,
            format = ?image.format,
            "decoded image"
        );
        Ok(image)
    }

    /// Decode an in-memory encoded image (JPEG, PNG, ...).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::from_dynamic(decoded))
    }

    fn from_dynamic(decoded: DynamicImage) -> Self {
        let (width, height) = (decoded.width(), decoded.height());
        let (pixels, format) = match decoded {
            DynamicImage::ImageLuma8(buf) => (buf.into_raw(), PixelFormat::Gray8),
            DynamicImage::ImageLumaA8(buf) => (buf.into_raw(), PixelFormat::GrayAlpha8),
            DynamicImage::ImageRgb8(buf) => (buf.into_raw(), PixelFormat::Rgb8),
            DynamicImage::ImageRgba8(buf) => (buf.into_raw(), PixelFormat::Rgba8),
            other if other.color().has_alpha() => (other.into_rgba8().into_raw(), PixelFormat::Rgba8),
            other => (other.into_rgb8().into_raw(), PixelFormat::Rgb8),
        };
        Self {
            pixels,
            width,
            height,
            format,
        }
    }

    /// Expected byte length for the declared dimensions and format, or
    /// `None` if it does not fit in `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.format.channels())
    }

    /// Check that the buffer is non-empty and matches its declared size.
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageError::ZeroDimensions);
        }
        let expected = self.expected_len().ok_or(ImageError::TooLarge {
            width: self.width,
            height: self.height,
        })?;
        if self.pixels.len() != expected {
            return Err(ImageError::BufferSize {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Pixel at `(x, y)` as RGB, whatever the stored channel order.
    ///
    /// Gray is replicated, alpha is dropped. Caller must have validated the
    /// buffer and keep `(x, y)` in bounds.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let ch = self.format.channels();
        let i = (y as usize * self.width as usize + x as usize) * ch;
        let p = &self.pixels[i..i + ch];
        match self.format {
            PixelFormat::Gray8 | PixelFormat::GrayAlpha8 => [p[0], p[0], p[0]],
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => [p[0], p[1], p[2]],
            PixelFormat::Bgr8 => [p[2], p[1], p[0]],
        }
    }
}
