//! Frame buffers and intensity conversion

use crate::infra::error::SensingError;
use image::{DynamicImage, RgbImage, RgbaImage};

/// Raw interleaved frame as delivered by a frame source
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an interleaved buffer of `width * height * channels` bytes
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, SensingError> {
        let expected = width * height * channels;
        if channels == 0 || data.len() != expected {
            return Err(SensingError::BadBuffer { len: data.len(), expected });
        }
        Ok(Self { width, height, channels, data })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Collapse to a single intensity channel
    ///
    /// RGB and RGBA frames go through `image`'s luma conversion (alpha
    /// ignored). Any other channel count is averaged.
    pub fn to_gray(&self) -> GrayFrame {
        let data = match self.channels {
            1 => self.data.clone(),
            _ => self.image_luma().unwrap_or_else(|| self.average_channels()),
        };
        GrayFrame { width: self.width, height: self.height, data }
    }

    fn image_luma(&self) -> Option<Vec<u8>> {
        let width = u32::try_from(self.width).ok()?;
        let height = u32::try_from(self.height).ok()?;
        let image = match self.channels {
            3 => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, self.data.clone())?),
            4 => DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, self.data.clone())?),
            _ => return None,
        };
        Some(image.to_luma8().into_raw())
    }

    fn average_channels(&self) -> Vec<u8> {
        let n = self.channels;
        self.data
            .chunks_exact(n)
            .map(|px| (px.iter().map(|&v| v as u32).sum::<u32>() / n as u32) as u8)
            .collect()
    }
}

/// Single-channel intensity grid, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}
