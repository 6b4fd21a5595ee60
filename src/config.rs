use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::{
    BridgeSettings, DEFAULT_BRIDGE_THRESHOLD, DEFAULT_TARGET_CLASS, REPLY_TOKEN, TRIGGER_TOKEN,
};
use crate::detect::{LabelTable, DEFAULT_CLASS_NAMES};
use crate::fps::DEFAULT_FPS_WINDOW;
use crate::pipeline::{
    DEFAULT_RECORD_FPS, DEFAULT_RECORD_PATH, DEFAULT_SNAPSHOT_PATH, DEFAULT_THRESHOLD,
};
use crate::tally::TrackedLabels;

const DEFAULT_SERIAL_PORT: &str = "COM3";
const DEFAULT_BAUD: u32 = 9600;
const DEFAULT_CAMERA: &str = "0";
const DEFAULT_SETTLE_SECS: u64 = 2;

#[derive(Debug, Deserialize, Default)]
struct SortwatchConfigFile {
    detect: Option<DetectConfigFile>,
    bridge: Option<BridgeConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    threshold: Option<f32>,
    class_labels: Option<Vec<String>>,
    labels_path: Option<PathBuf>,
    tracked_labels: Option<Vec<String>>,
    font_path: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
    record_path: Option<PathBuf>,
    record_fps: Option<f64>,
    fps_window: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct BridgeConfigFile {
    port: Option<String>,
    baud: Option<u32>,
    camera: Option<String>,
    threshold: Option<f32>,
    target_class: Option<String>,
    settle_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SortwatchConfig {
    pub detect: DetectSettings,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone)]
pub struct DetectSettings {
    pub threshold: f32,
    pub class_labels: Vec<String>,
    pub labels_path: Option<PathBuf>,
    pub tracked_labels: Vec<String>,
    pub font_path: Option<PathBuf>,
    pub snapshot_path: PathBuf,
    pub record_path: PathBuf,
    pub record_fps: f64,
    pub fps_window: usize,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port: String,
    pub baud: u32,
    /// Camera index or device path.
    pub camera: String,
    pub threshold: f32,
    pub target_class: String,
    pub settle: Duration,
}

impl SortwatchConfig {
    /// Defaults, then the file named by `SORTWATCH_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SORTWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SortwatchConfigFile) -> Self {
        let detect = file.detect.unwrap_or_default();
        let bridge = file.bridge.unwrap_or_default();
        let default_names = || -> Vec<String> {
            DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
        };
        Self {
            detect: DetectSettings {
                threshold: detect.threshold.unwrap_or(DEFAULT_THRESHOLD),
                class_labels: detect.class_labels.unwrap_or_else(default_names),
                labels_path: detect.labels_path,
                tracked_labels: detect.tracked_labels.unwrap_or_else(default_names),
                font_path: detect.font_path,
                snapshot_path: detect
                    .snapshot_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
                record_path: detect
                    .record_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORD_PATH)),
                record_fps: detect.record_fps.unwrap_or(DEFAULT_RECORD_FPS),
                fps_window: detect.fps_window.unwrap_or(DEFAULT_FPS_WINDOW),
            },
            bridge: BridgeConfig {
                port: bridge
                    .port
                    .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_string()),
                baud: bridge.baud.unwrap_or(DEFAULT_BAUD),
                camera: bridge.camera.unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
                threshold: bridge.threshold.unwrap_or(DEFAULT_BRIDGE_THRESHOLD),
                target_class: bridge
                    .target_class
                    .unwrap_or_else(|| DEFAULT_TARGET_CLASS.to_string()),
                settle: Duration::from_secs(bridge.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS)),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("SORTWATCH_SERIAL_PORT") {
            if !port.trim().is_empty() {
                self.bridge.port = port;
            }
        }
        if let Ok(baud) = std::env::var("SORTWATCH_BAUD") {
            self.bridge.baud = baud
                .trim()
                .parse()
                .map_err(|_| anyhow!("SORTWATCH_BAUD must be an integer baud rate"))?;
        }
        if let Ok(target) = std::env::var("SORTWATCH_TARGET_CLASS") {
            if !target.trim().is_empty() {
                self.bridge.target_class = target.trim().to_string();
            }
        }
        if let Ok(labels) = std::env::var("SORTWATCH_TRACKED_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.detect.tracked_labels = parsed;
            }
        }
        if let Ok(font) = std::env::var("SORTWATCH_FONT") {
            if !font.trim().is_empty() {
                self.detect.font_path = Some(PathBuf::from(font));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_threshold("detect.threshold", self.detect.threshold)?;
        validate_threshold("bridge.threshold", self.bridge.threshold)?;
        if self.detect.tracked_labels.is_empty() {
            return Err(anyhow!("tracked_labels must name at least one class"));
        }
        if self.detect.labels_path.is_none() && self.detect.class_labels.is_empty() {
            return Err(anyhow!("class_labels must not be empty"));
        }
        if !(self.detect.record_fps > 0.0) {
            return Err(anyhow!("record_fps must be greater than zero"));
        }
        if self.detect.fps_window == 0 {
            return Err(anyhow!("fps_window must be greater than zero"));
        }
        if self.bridge.baud == 0 {
            return Err(anyhow!("baud must be greater than zero"));
        }
        if self.bridge.target_class.trim().is_empty() {
            return Err(anyhow!("target_class must not be empty"));
        }
        Ok(())
    }
}

impl DetectSettings {
    /// Class names from `labels_path` when set, else the configured list.
    pub fn label_table(&self) -> Result<LabelTable> {
        match &self.labels_path {
            Some(path) => LabelTable::load(path),
            None => Ok(LabelTable::new(self.class_labels.iter().cloned())),
        }
    }

    pub fn tracked(&self) -> TrackedLabels {
        TrackedLabels::new(self.tracked_labels.iter().cloned())
    }
}

impl BridgeConfig {
    pub fn settings(&self, tracked: TrackedLabels) -> BridgeSettings {
        BridgeSettings {
            trigger: TRIGGER_TOKEN.to_string(),
            reply: REPLY_TOKEN.to_string(),
            target_class: self.target_class.clone(),
            threshold: self.threshold,
            tracked,
            settle: self.settle,
        }
    }
}

fn validate_threshold(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

/// TOML by default; `.json` files are parsed as JSON.
fn read_config_file(path: &Path) -> Result<SortwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
