//! RGB working frame: the engine's normalized view of an input image.

use facetool_core::{ImageBuffer, ImageError, PixelFormat};

/// Interleaved 8-bit RGB pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize * 3],
            width,
            height,
        }
    }

    /// Convert any supported buffer layout to RGB.
    ///
    /// Gray is replicated into all three channels, alpha is dropped and BGR
    /// is swapped.
    pub fn from_image(image: &ImageBuffer) -> Result<Self, ImageError> {
        image.validate()?;
        let mut data = Vec::with_capacity(image.pixels.len() / image.format.channels() * 3);
        for y in 0..image.height {
            for x in 0..image.width {
                data.extend_from_slice(&image.rgb_at(x, y));
            }
        }
        Ok(Self {
            data,
            width: image.width,
            height: image.height,
        })
    }

    /// Hand the pixels back as an RGB [`ImageBuffer`].
    pub fn into_image(self) -> ImageBuffer {
        ImageBuffer::with_format(self.data, self.width, self.height, PixelFormat::Rgb8)
    }

    /// Channel value at `(x, y, c)`, or 0 outside the frame.
    #[inline]
    pub fn sample(&self, x: i32, y: i32, c: usize) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.data[(y as usize * self.width as usize + x as usize) * 3 + c]
    }

    /// Mirror the frame left-to-right.
    pub fn flip_horizontal(&self) -> Self {
        let w = self.width as usize;
        let mut out = Self::new(self.width, self.height);
        for y in 0..self.height as usize {
            for x in 0..w {
                let src = (y * w + x) * 3;
                let dst = (y * w + (w - 1 - x)) * 3;
                out.data[dst..dst + 3].copy_from_slice(&self.data[src..src + 3]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bgr_swaps_channels() {
        let img = ImageBuffer::new(vec![1, 2, 3, 4, 5, 6], 2, 1);
        let frame = RgbFrame::from_image(&img).unwrap();
        assert_eq!(frame.data, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_from_gray_replicates() {
        let img = ImageBuffer::with_format(vec![10, 200], 2, 1, PixelFormat::Gray8);
        let frame = RgbFrame::from_image(&img).unwrap();
        assert_eq!(frame.data, vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_from_rgba_drops_alpha() {
        let img = ImageBuffer::with_format(vec![1, 2, 3, 255], 1, 1, PixelFormat::Rgba8);
        let frame = RgbFrame::from_image(&img).unwrap();
        assert_eq!(frame.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_from_image_rejects_bad_size() {
        let img = ImageBuffer::new(vec![0; 5], 2, 1);
        assert!(RgbFrame::from_image(&img).is_err());
    }

    #[test]
    fn test_from_image_rejects_overflowing_dimensions() {
        let img = ImageBuffer::with_format(Vec::new(), 1 << 31, 1 << 31, PixelFormat::Rgba8);
        assert!(matches!(RgbFrame::from_image(&img), Err(ImageError::TooLarge { .. })));
    }

    #[test]
    fn test_into_image_roundtrip() {
        let frame = RgbFrame { data: vec![1, 2, 3, 4, 5, 6], width: 2, height: 1 };
        let image = frame.clone().into_image();
        assert_eq!(image.format, PixelFormat::Rgb8);
        assert_eq!(RgbFrame::from_image(&image).unwrap(), frame);
    }

    #[test]
    fn test_flip_horizontal() {
        let frame = RgbFrame {
            data: vec![1, 1, 1, 2, 2, 2, 3, 3, 3],
            width: 3,
            height: 1,
        };
        assert_eq!(frame.flip_horizontal().data, vec![3, 3, 3, 2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_sample_out_of_bounds_is_black() {
        let frame = RgbFrame { data: vec![9; 12], width: 2, height: 2 };
        assert_eq!(frame.sample(1, 1, 2), 9);
        assert_eq!(frame.sample(-1, 0, 0), 0);
        assert_eq!(frame.sample(2, 0, 0), 0);
    }
}
