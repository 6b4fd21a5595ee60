//! Frame sources.
//!
//! This module provides the four input origins of a detection run:
//! - Single image files and folders of images (finite)
//! - Local video files (finite; feature: ingest-file-ffmpeg)
//! - USB cameras through V4L2 (unbounded; feature: ingest-v4l2)
//! - `stub://video` and `stub://camera` synthetic sources (testing)
//!
//! The origin is decided once at startup by `SourceKind::resolve` and every
//! source is driven through the `FrameSource` trait.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod images;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::frame::{Frame, Resolution};

pub use file::{VideoConfig, VideoFileSource};
pub use images::ImageListSource;
pub use v4l2::{CameraConfig, CameraSource};

/// File extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
/// File extensions treated as video files.
pub const VIDEO_EXTENSIONS: &[&str] = &["avi", "mov", "mp4", "mkv", "wmv"];

const STUB_VIDEO: &str = "stub://video";
const STUB_CAMERA: &str = "stub://camera";

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Image(PathBuf),
    Folder(PathBuf),
    Video(PathBuf),
    Camera { index: u32, device: String },
}

impl SourceKind {
    /// Decide the source kind for a `--source` argument.
    pub fn resolve(source: &str) -> Result<Self> {
        if source == STUB_VIDEO || source.starts_with("stub://video/") {
            return Ok(Self::Video(PathBuf::from(source)));
        }
        if source == STUB_CAMERA {
            return Ok(Self::Camera {
                index: 0,
                device: STUB_CAMERA.to_string(),
            });
        }

        let path = Path::new(source);
        if path.is_dir() {
            return Ok(Self::Folder(path.to_path_buf()));
        }
        if path.is_file() {
            let ext = lowercase_extension(path).unwrap_or_default();
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                return Ok(Self::Image(path.to_path_buf()));
            }
            if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                return Ok(Self::Video(path.to_path_buf()));
            }
            return Err(anyhow!("unsupported file extension: .{}", ext));
        }
        if source.starts_with("usb") {
            let index = parse_usb_index(source)?;
            return Ok(Self::Camera {
                index,
                device: format!("/dev/video{}", index),
            });
        }
        Err(anyhow!("invalid source: {}", source))
    }

    /// Image and folder sources end; video and camera sources stream.
    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Image(_) | Self::Folder(_))
    }

    pub fn is_streaming(&self) -> bool {
        !self.is_finite()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(path) => write!(f, "image {}", path.display()),
            Self::Folder(path) => write!(f, "folder {}", path.display()),
            Self::Video(path) => write!(f, "video {}", path.display()),
            Self::Camera { index, device } => write!(f, "usb{} ({})", index, device),
        }
    }
}

fn parse_usb_index(source: &str) -> Result<u32> {
    static USB_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = USB_RE.get_or_init(|| regex::Regex::new(r"^usb(\d{1,3})$").expect("valid regex"));
    let caps = re
        .captures(source)
        .ok_or_else(|| anyhow!("invalid USB source '{}': expected \"usbX\"", source))?;
    caps[1]
        .parse()
        .map_err(|_| anyhow!("invalid USB index in '{}'", source))
}

pub(crate) fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Counters reported by every source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub origin: String,
}

/// Sequential frame producer.
pub trait FrameSource {
    /// Next frame.
    ///
    /// `Ok(None)` means end-of-stream. `Err` is a per-frame failure: the caller
    /// reports it and asks again; the source has already moved past the bad frame.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Open the source for `kind`. Cameras are asked for `resolution` when given.
pub fn open_source(kind: &SourceKind, resolution: Option<Resolution>) -> Result<Box<dyn FrameSource>> {
    match kind {
        SourceKind::Image(path) => Ok(Box::new(ImageListSource::from_image(path))),
        SourceKind::Folder(dir) => Ok(Box::new(ImageListSource::from_folder(dir)?)),
        SourceKind::Video(path) => {
            let mut source = VideoFileSource::new(VideoConfig {
                path: path.to_string_lossy().into_owned(),
                ..VideoConfig::default()
            })?;
            source.connect()?;
            Ok(Box::new(source))
        }
        SourceKind::Camera { device, .. } => {
            let defaults = CameraConfig::default();
            let mut source = CameraSource::new(CameraConfig {
                device: device.clone(),
                width: resolution.map(|r| r.width).unwrap_or(defaults.width),
                height: resolution.map(|r| r.height).unwrap_or(defaults.height),
                ..defaults
            })?;
            source.connect()?;
            Ok(Box::new(source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_files_by_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("a.JPG");
        let video = dir.path().join("clip.mp4");
        let other = dir.path().join("notes.txt");
        for path in [&image, &video, &other] {
            std::fs::write(path, b"x")?;
        }

        assert_eq!(
            SourceKind::resolve(image.to_str().unwrap())?,
            SourceKind::Image(image.clone())
        );
        assert_eq!(
            SourceKind::resolve(video.to_str().unwrap())?,
            SourceKind::Video(video.clone())
        );
        let err = SourceKind::resolve(other.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("unsupported file extension"));
        assert_eq!(
            SourceKind::resolve(dir.path().to_str().unwrap())?,
            SourceKind::Folder(dir.path().to_path_buf())
        );
        Ok(())
    }

    #[test]
    fn resolves_usb_cameras() -> Result<()> {
        assert_eq!(
            SourceKind::resolve("usb1")?,
            SourceKind::Camera {
                index: 1,
                device: "/dev/video1".to_string()
            }
        );
        assert!(SourceKind::resolve("usbX").is_err());
        assert!(SourceKind::resolve("usb").is_err());
        Ok(())
    }

    #[test]
    fn rejects_unknown_sources() {
        let err = SourceKind::resolve("/definitely/not/here").unwrap_err();
        assert!(err.to_string().contains("invalid source"));
    }

    #[test]
    fn finite_and_streaming_kinds() -> Result<()> {
        assert!(SourceKind::Image(PathBuf::from("a.png")).is_finite());
        assert!(SourceKind::Folder(PathBuf::from("imgs")).is_finite());
        assert!(SourceKind::resolve("stub://video")?.is_streaming());
        assert!(SourceKind::resolve("stub://camera")?.is_streaming());
        Ok(())
    }
}
