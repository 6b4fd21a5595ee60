//! Frames flowing through the detection pipeline.
//!
//! - `Frame`: an RGB image plus the sequence number assigned by its source.
//! - `Resolution`: a `WxH` override applied to every frame before detection.

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// One decoded frame. Pixels are RGB, row-major.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// 1-based position of this frame within its source.
    pub index: u64,
    /// File the frame was read from, for image sources.
    origin: Option<PathBuf>,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Build a frame from a packed RGB24 buffer.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, index))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Resize to the requested resolution. Frames already at that size are returned as-is.
    pub fn resized(self, resolution: Resolution) -> Self {
        if self.width() == resolution.width && self.height() == resolution.height {
            return self;
        }
        let image = image::imageops::resize(
            &self.image,
            resolution.width,
            resolution.height,
            FilterType::Triangle,
        );
        Self {
            image,
            index: self.index,
            origin: self.origin,
        }
    }
}

/// Frame size override given as `WxH` (e.g. `640x480`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("resolution must be non-zero, got {}x{}", width, height));
        }
        Ok(Self { width, height })
    }

    pub fn parse(value: &str) -> Result<Self> {
        static RESOLUTION_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = RESOLUTION_RE.get_or_init(|| {
            regex::Regex::new(r"^\s*(\d{1,5})\s*[xX]\s*(\d{1,5})\s*$").expect("valid regex")
        });
        let caps = re
            .captures(value)
            .ok_or_else(|| anyhow!("invalid resolution '{}': expected \"WxH\"", value))?;
        let width: u32 = caps[1]
            .parse()
            .map_err(|_| anyhow!("invalid resolution width in '{}'", value))?;
        let height: u32 = caps[2]
            .parse()
            .map_err(|_| anyhow!("invalid resolution height in '{}'", value))?;
        Self::new(width, height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses_wxh() {
        let res = Resolution::parse("640x480").unwrap();
        assert_eq!(res, Resolution { width: 640, height: 480 });
        assert_eq!(res.to_string(), "640x480");
        assert_eq!(Resolution::parse(" 800X600 ").unwrap().width, 800);
    }

    #[test]
    fn resolution_rejects_malformed_input() {
        for bad in ["", "640", "640x", "x480", "640*480", "-1x2", "0x480", "abcxdef"] {
            assert!(Resolution::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn frame_from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 1).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
    }

    #[test]
    fn resized_frame_keeps_index() -> Result<()> {
        let frame = Frame::from_rgb(vec![10u8; 4 * 4 * 3], 4, 4, 7)?;
        let resized = frame.resized(Resolution::new(2, 3)?);
        assert_eq!((resized.width(), resized.height()), (2, 3));
        assert_eq!(resized.index, 7);
        Ok(())
    }
}
