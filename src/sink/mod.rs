//! Presentation and recording sinks.
//!
//! - `Viewer`: shows annotated frames and reports keys pressed during the wait.
//! - `VideoSink`: appends annotated frames to an output video.
//! - `RecordingPlan`: decides once, up front, whether recording can happen.
//!
//! The default viewer is headless; a window-backed viewer and the video writer
//! live behind the `viewer-opencv` feature.

#[cfg(feature = "viewer-opencv")]
mod window;

use anyhow::{Context, Result};
use image::RgbImage;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "viewer-opencv")]
pub use self::window::{OpenCvRecorder, OpenCvViewer};
use crate::frame::Resolution;
use crate::ingest::SourceKind;

/// Title of the display window.
pub const WINDOW_TITLE: &str = "YOLO Detection";

/// What a key pressed during the display wait asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    /// Hold the current frame until any key is pressed.
    Pause,
    /// Save the current annotated frame.
    Snapshot,
}

impl KeyAction {
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'q' => Some(Self::Quit),
            's' => Some(Self::Pause),
            'p' => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// Interactive display.
pub trait Viewer {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Wait up to `delay` for a key; `None` waits until one is pressed.
    fn wait_key(&mut self, delay: Option<Duration>) -> Result<Option<char>>;
}

/// Viewer without a window.
///
/// Reports `q` once the shutdown flag is raised (Ctrl-C), otherwise replays any
/// scripted keys, one per wait.
pub struct HeadlessViewer {
    shutdown: Arc<AtomicBool>,
    keys: VecDeque<Option<char>>,
    frames_shown: u64,
}

impl HeadlessViewer {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self {
            shutdown,
            keys: VecDeque::new(),
            frames_shown: 0,
        }
    }

    /// Keys returned by successive waits; `None` entries are waits with no key.
    pub fn with_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = Option<char>>,
    {
        self.keys.extend(keys);
        self
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl Viewer for HeadlessViewer {
    fn show(&mut self, _frame: &RgbImage) -> Result<()> {
        self.frames_shown += 1;
        Ok(())
    }

    fn wait_key(&mut self, _delay: Option<Duration>) -> Result<Option<char>> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(Some('q'));
        }
        Ok(self.keys.pop_front().flatten())
    }
}

/// Output video.
pub trait VideoSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Whether annotated frames get recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordingPlan {
    /// Recording was not requested.
    Off,
    /// Recording was requested but cannot happen for this run.
    Disabled { reason: String },
    Enabled { resolution: Resolution },
}

impl RecordingPlan {
    /// Recording needs a video or camera source and an explicit resolution.
    pub fn decide(record: bool, source: &SourceKind, resolution: Option<Resolution>) -> Self {
        if !record {
            return Self::Off;
        }
        if source.is_finite() {
            return Self::Disabled {
                reason: "recording is only supported for video and USB camera sources".to_string(),
            };
        }
        match resolution {
            Some(resolution) => Self::Enabled { resolution },
            None => Self::Disabled {
                reason: "recording requires --resolution".to_string(),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// Open the configured video writer.
#[cfg(feature = "viewer-opencv")]
pub fn open_recorder(path: &Path, fps: f64, resolution: Resolution) -> Result<Box<dyn VideoSink>> {
    Ok(Box::new(OpenCvRecorder::open(path, fps, resolution)?))
}

/// Open the configured video writer.
#[cfg(not(feature = "viewer-opencv"))]
pub fn open_recorder(path: &Path, _fps: f64, _resolution: Resolution) -> Result<Box<dyn VideoSink>> {
    Err(anyhow::anyhow!(
        "cannot open video writer for {}: built without the viewer-opencv feature",
        path.display()
    ))
}

/// Resolve a plan into a writer. Open failures are reported and disable recording.
pub fn recorder_for_plan(
    plan: &RecordingPlan,
    path: &Path,
    fps: f64,
) -> Option<Box<dyn VideoSink>> {
    match plan {
        RecordingPlan::Off => None,
        RecordingPlan::Disabled { reason } => {
            log::warn!("recording disabled: {}", reason);
            None
        }
        RecordingPlan::Enabled { resolution } => match open_recorder(path, fps, *resolution) {
            Ok(sink) => {
                log::info!("recording {} at {} fps to {}", resolution, fps, path.display());
                Some(sink)
            }
            Err(err) => {
                log::warn!("recording disabled: {:#}", err);
                None
            }
        },
    }
}

/// Open a window when built with `viewer-opencv`, otherwise run headless.
pub fn open_viewer(shutdown: Arc<AtomicBool>) -> Box<dyn Viewer> {
    #[cfg(feature = "viewer-opencv")]
    {
        match OpenCvViewer::new(WINDOW_TITLE) {
            Ok(viewer) => return Box::new(viewer),
            Err(err) => log::warn!("display unavailable, running headless: {:#}", err),
        }
    }
    Box::new(HeadlessViewer::new(shutdown))
}

/// Write one annotated frame to disk.
pub fn save_snapshot(path: &Path, frame: &RgbImage) -> Result<()> {
    frame
        .save(path)
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}
