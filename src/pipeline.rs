//! Detection run loop.
//!
//! `DetectionRun` owns every resource of one `detect` invocation: source,
//! detector, viewer, optional recorder, annotator and FPS window. `run` drives
//! frames through detect, tally, annotate, show and record until the source
//! ends or the viewer reports quit.

use anyhow::Result;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::annotate::Annotator;
use crate::detect::DetectorBackend;
use crate::fps::{FpsWindow, DEFAULT_FPS_WINDOW};
use crate::frame::{Frame, Resolution};
use crate::ingest::{FrameSource, SourceKind};
use crate::sink::{save_snapshot, KeyAction, VideoSink, Viewer};
use crate::tally::{filter_and_tally, FrameStats, RunSummary, TrackedLabels};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_SNAPSHOT_PATH: &str = "capture.png";
pub const DEFAULT_RECORD_PATH: &str = "demo1.avi";
pub const DEFAULT_RECORD_FPS: f64 = 30.0;
const IMAGE_KEY_DELAY: Duration = Duration::from_millis(10);
const STREAM_KEY_DELAY: Duration = Duration::from_millis(5);

#[derive(Clone, Debug)]
pub struct RunSettings {
    pub threshold: f32,
    pub resolution: Option<Resolution>,
    pub tracked: TrackedLabels,
    /// Images and folders: per-image console results and a run summary.
    pub finite: bool,
    /// How long the viewer waits for a key after each frame.
    pub key_delay: Duration,
    pub snapshot_path: PathBuf,
    pub fps_window: usize,
}

impl RunSettings {
    pub fn for_source(source: &SourceKind) -> Self {
        let finite = source.is_finite();
        Self {
            threshold: DEFAULT_THRESHOLD,
            resolution: None,
            tracked: TrackedLabels::default(),
            finite,
            key_delay: if finite {
                IMAGE_KEY_DELAY
            } else {
                STREAM_KEY_DELAY
            },
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            fps_window: DEFAULT_FPS_WINDOW,
        }
    }
}

/// Outcome of a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub frames: u64,
    pub skipped: u64,
    pub avg_fps: f64,
    pub quit_requested: bool,
    /// Present for image and folder sources only.
    pub summary: Option<RunSummary>,
}

impl RunReport {
    /// Console lines printed when the run ends.
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![
            "--- Detection summary ---".to_string(),
            format!("Average FPS: {:.2}", self.avg_fps),
        ];
        if let Some(summary) = &self.summary {
            lines.push("Total objects detected:".to_string());
            for (label, count) in summary.per_class() {
                lines.push(format!("  {}: {}", label, count));
            }
        }
        lines
    }
}

/// Console lines for one image of a finite source.
pub fn image_results(origin: &str, stats: &FrameStats) -> Vec<String> {
    let mut lines = vec![
        format!("--- Results for {}: ---", origin),
        format!("Total Objects in frame: {}", stats.total_objects()),
    ];
    for (label, count) in stats.nonzero() {
        lines.push(format!("  {}: {}", label, count));
    }
    lines
}

/// Receives the origin and counts of each image of a finite source.
pub type ImageCallback = Box<dyn FnMut(&str, &FrameStats)>;

pub struct DetectionRun {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    viewer: Box<dyn Viewer>,
    recorder: Option<Box<dyn VideoSink>>,
    annotator: Annotator,
    fps: FpsWindow,
    summary: Option<RunSummary>,
    on_image: Option<ImageCallback>,
    settings: RunSettings,
}

impl DetectionRun {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        viewer: Box<dyn Viewer>,
        settings: RunSettings,
    ) -> Self {
        let summary = settings
            .finite
            .then(|| RunSummary::new(&settings.tracked));
        Self {
            source,
            detector,
            viewer,
            recorder: None,
            annotator: Annotator::boxes_only(),
            fps: FpsWindow::new(settings.fps_window),
            summary,
            on_image: None,
            settings,
        }
    }

    pub fn with_recorder(mut self, recorder: Option<Box<dyn VideoSink>>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Called once per processed image of a finite source.
    pub fn on_image<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, &FrameStats) + 'static,
    {
        self.on_image = Some(Box::new(callback));
        self
    }

    pub fn run(mut self) -> Result<RunReport> {
        let mut frames = 0u64;
        let mut skipped = 0u64;
        let mut quit_requested = false;

        loop {
            let started = Instant::now();
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    if self.settings.finite {
                        log::info!("all images processed");
                    } else {
                        log::info!("end of video or camera disconnected");
                    }
                    break;
                }
                Err(err) => {
                    log::warn!("{:#}; skipping", err);
                    skipped += 1;
                    if self.quit_pressed()? {
                        quit_requested = true;
                        break;
                    }
                    continue;
                }
            };
            let frame = match self.settings.resolution {
                Some(resolution) => frame.resized(resolution),
                None => frame,
            };

            let Some(annotated) = self.process(&frame, started) else {
                skipped += 1;
                if self.quit_pressed()? {
                    quit_requested = true;
                    break;
                }
                continue;
            };
            frames += 1;

            self.viewer.show(&annotated)?;
            self.record(&annotated);

            let key = self.viewer.wait_key(Some(self.settings.key_delay))?;
            match key.and_then(KeyAction::from_key) {
                Some(KeyAction::Quit) => {
                    quit_requested = true;
                    break;
                }
                Some(KeyAction::Pause) => {
                    self.viewer.wait_key(None)?;
                }
                Some(KeyAction::Snapshot) => {
                    match save_snapshot(&self.settings.snapshot_path, &annotated) {
                        Ok(()) => log::info!(
                            "saved frame to {}",
                            self.settings.snapshot_path.display()
                        ),
                        Err(err) => log::warn!("{:#}", err),
                    }
                }
                None => {}
            }
        }

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(err) = recorder.finish() {
                log::warn!("failed to finalize recording: {:#}", err);
            }
        }

        Ok(RunReport {
            frames,
            skipped,
            avg_fps: self.fps.average(),
            quit_requested,
            summary: self.summary,
        })
    }

    /// Key check for frames that were skipped before reaching the viewer.
    fn quit_pressed(&mut self) -> Result<bool> {
        let key = self.viewer.wait_key(Some(self.settings.key_delay))?;
        Ok(matches!(key.and_then(KeyAction::from_key), Some(KeyAction::Quit)))
    }

    /// Detect, tally and annotate one frame. `None` when detection failed.
    fn process(&mut self, frame: &Frame, started: Instant) -> Option<image::RgbImage> {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("detection failed on frame {}: {:#}", frame.index, err);
                return None;
            }
        };
        let tally = filter_and_tally(
            &detections,
            self.settings.threshold,
            self.detector.labels(),
            &self.settings.tracked,
        );

        self.fps.push_elapsed(started.elapsed());

        if self.settings.finite {
            let origin = frame
                .origin()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| format!("frame {}", frame.index));
            if let Some(callback) = self.on_image.as_mut() {
                callback(&origin, &tally.stats);
            }
            self.summary = self
                .summary
                .take()
                .map(|summary| summary.fold(&tally.stats));
        }

        let overlay_fps = (!self.settings.finite).then(|| self.fps.average());
        Some(
            self.annotator
                .annotate(frame.image(), &tally.kept, &tally.stats, overlay_fps),
        )
    }

    fn record(&mut self, annotated: &image::RgbImage) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if let Err(err) = recorder.write(annotated) {
            log::warn!("recording stopped: {:#}", err);
            self.recorder = None;
        }
    }
}
