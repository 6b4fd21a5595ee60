//! Sortwatch
//!
//! Runs a pretrained object detector over images, image folders, video files or a
//! USB camera, counts what it finds per class and draws the results. A second
//! entry point bridges a microcontroller on a serial line to the detector so a
//! sorting rig can ask "is this a plastic bottle?".
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (images, folders, video files, USB cameras)
//! - `detect`: detector backends and YOLO output decoding
//! - `tally`: threshold filtering, per-frame counts and run summaries
//! - `fps`: rolling frame rate average
//! - `annotate`: boxes, captions and the statistics overlay
//! - `sink`: display, key handling, recording and snapshots
//! - `pipeline`: the `detect` run loop
//! - `bridge`: the serial trigger bridge
//! - `config`: file and environment configuration

pub mod annotate;
pub mod bridge;
pub mod config;
pub mod detect;
pub mod fps;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod sink;
pub mod tally;
pub mod ui;

pub use annotate::Annotator;
pub use bridge::{BridgeOutcome, BridgeSettings, BridgeState, SerialLink, SignalBridge};
pub use detect::{
    load_detector, BoundingBox, Detection, DetectorBackend, LabelTable, ScriptedBackend,
};
pub use fps::FpsWindow;
pub use frame::{Frame, Resolution};
pub use ingest::{open_source, FrameSource, SourceKind};
pub use pipeline::{DetectionRun, RunReport, RunSettings};
pub use sink::{HeadlessViewer, KeyAction, RecordingPlan, VideoSink, Viewer};
pub use tally::{filter_and_tally, FrameStats, RunSummary, Tally, TrackedLabels};
