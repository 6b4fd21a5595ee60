//! Local video file frame source.
//!
//! This module provides `VideoFileSource` for reading frames from local video files.
//! The video source is responsible for:
//! - Reading frames sequentially from a local file (no network access)
//! - Decoding video frames in-memory to RGB
//! - Reporting end-of-stream once the file is exhausted or a read fails

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a local video source.
#[derive(Clone, Debug)]
pub struct VideoConfig {
    /// Local file path (e.g., "clips/conveyor.mp4") or `stub://video[/N]`.
    pub path: String,
    /// Frames produced by a synthetic source before it ends.
    pub synthetic_frames: u64,
    pub synthetic_width: u32,
    pub synthetic_height: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic_frames: 30,
            synthetic_width: 320,
            synthetic_height: 240,
        }
    }
}

/// Local video file source.
pub struct VideoFileSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticVideoSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl VideoFileSource {
    pub fn new(mut config: VideoConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "video input only supports local paths (no URL schemes)"
            ));
        }
        if let Some(rest) = config.path.strip_prefix("stub://video") {
            if let Some(count) = rest.strip_prefix('/') {
                config.synthetic_frames = count
                    .parse()
                    .map_err(|_| anyhow!("invalid synthetic frame count in '{}'", config.path))?;
            }
            Ok(Self {
                backend: VideoBackend::Synthetic(SyntheticVideoSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: VideoBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "video input requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }

    /// Open the video for reading.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            VideoBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.connect(),
        }
    }
}

impl FrameSource for VideoFileSource {
    /// Read failures end the stream; they are logged, not returned.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let result = match &mut self.backend {
            VideoBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.next_frame(),
        };
        match result {
            Ok(frame) => Ok(frame),
            Err(err) => {
                log::warn!("VideoFileSource: read failed, ending stream: {:#}", err);
                Ok(None)
            }
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            VideoBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://video) for tests
// ----------------------------------------------------------------------------

struct SyntheticVideoSource {
    config: VideoConfig,
    frame_count: u64,
}

impl SyntheticVideoSource {
    fn new(config: VideoConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "VideoFileSource: opened {} (synthetic, {} frames)",
            self.config.path,
            self.config.synthetic_frames
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.config.synthetic_frames {
            log::info!("VideoFileSource: end of video {}", self.config.path);
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = synthetic_pixels(
            self.config.synthetic_width,
            self.config.synthetic_height,
            self.frame_count,
        );
        Frame::from_rgb(
            pixels,
            self.config.synthetic_width,
            self.config.synthetic_height,
            self.frame_count,
        )
        .map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: self.config.path.clone(),
        }
    }
}

/// Moving gradient used by synthetic sources.
pub(crate) fn synthetic_pixels(width: u32, height: u32, frame_count: u64) -> Vec<u8> {
    let pixel_count = (width as usize) * (height as usize) * 3;
    let mut pixels = vec![0u8; pixel_count];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + frame_count) % 256) as u8;
    }
    pixels
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_video_ends_after_configured_frames() -> Result<()> {
        let mut source = VideoFileSource::new(VideoConfig {
            path: "stub://video/3".to_string(),
            ..VideoConfig::default()
        })?;
        source.connect()?;

        let mut frames = 0;
        while let Some(frame) = source.next_frame()? {
            frames += 1;
            assert_eq!(frame.index, frames);
            assert_eq!((frame.width(), frame.height()), (320, 240));
        }
        assert_eq!(frames, 3);
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn rejects_remote_urls() {
        let result = VideoFileSource::new(VideoConfig {
            path: "rtsp://camera/stream".to_string(),
            ..VideoConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_bad_synthetic_frame_count() {
        let result = VideoFileSource::new(VideoConfig {
            path: "stub://video/many".to_string(),
            ..VideoConfig::default()
        });
        assert!(result.is_err());
    }
}
