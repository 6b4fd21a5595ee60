//! sorter_bridge - answer a sorting controller's serial trigger with a classification.
//!
//! The controller writes `DETECTED` when an item is in front of the camera. The
//! bridge captures one frame, runs the detector and writes `BOTTLE` back when the
//! target class was found.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(not(feature = "serial"))]
use std::{fs::File, io::BufReader};

#[cfg(not(feature = "serial"))]
use sortwatch::bridge::LineLink;
use sortwatch::bridge::{BridgeReport, SerialLink};
use sortwatch::config::SortwatchConfig;
use sortwatch::ui::{Ui, UiMode};
use sortwatch::{
    load_detector, open_source, BridgeSettings, DetectorBackend, FrameSource, SignalBridge,
    SourceKind,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serial trigger bridge for a bottle sorting rig")]
struct Args {
    /// Path to the detector model.
    #[arg(long)]
    model: String,

    /// Serial port of the controller (e.g. "COM3" or "/dev/ttyUSB0").
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Camera index, or a device path such as "stub://camera".
    #[arg(long)]
    camera: Option<String>,

    /// Minimum confidence for a detection to be kept.
    #[arg(long)]
    thresh: Option<f32>,

    /// Class that triggers the reply.
    #[arg(long)]
    target_class: Option<String>,

    /// Stage output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let cfg = match SortwatchConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            return Ok(());
        }
    };
    let port = args.port.clone().unwrap_or_else(|| cfg.bridge.port.clone());
    let baud = args.baud.unwrap_or(cfg.bridge.baud);

    let mut settings = cfg.bridge.settings(cfg.detect.tracked());
    if let Some(threshold) = args.thresh {
        if !(0.0..=1.0).contains(&threshold) {
            eprintln!("ERROR: --thresh must be within [0, 1], got {}", threshold);
            return Ok(());
        }
        settings.threshold = threshold;
    }
    if let Some(target) = &args.target_class {
        settings.target_class = target.clone();
    }

    let (detector, camera) = match open_devices(&args, &cfg, &ui) {
        Ok(opened) => opened,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            return Ok(());
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let opened = {
        let _stage = ui.stage(&format!("open serial port {} at {} baud", port, baud));
        open_link(&port, baud)
    };
    let link = match opened {
        Ok(link) => link,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            return Ok(());
        }
    };

    log::info!(
        "bridge ready: target class {} at threshold {:.2}",
        settings.target_class,
        settings.threshold
    );
    let report = run_bridge(link, camera, detector, settings, &shutdown)?;
    log::info!(
        "bridge stopped: {} trigger(s), {} reply(ies), {} capture failure(s)",
        report.triggers,
        report.replies,
        report.capture_failures
    );
    Ok(())
}

fn open_devices(
    args: &Args,
    cfg: &SortwatchConfig,
    ui: &Ui,
) -> Result<(Box<dyn DetectorBackend>, Box<dyn FrameSource>)> {
    let labels = cfg.detect.label_table()?;
    let detector = {
        let _stage = ui.stage("load model");
        load_detector(&args.model, labels)?
    };

    let camera = args.camera.clone().unwrap_or_else(|| cfg.bridge.camera.clone());
    let camera_kind = camera_source(&camera)?;
    let camera = {
        let _stage = ui.stage("open camera");
        open_source(&camera_kind, None).with_context(|| format!("unable to open {}", camera_kind))?
    };
    Ok((detector, camera))
}

/// A bare index names a USB camera; anything else is resolved as a source.
fn camera_source(camera: &str) -> Result<SourceKind> {
    let source = if camera.chars().all(|c| c.is_ascii_digit()) {
        format!("usb{}", camera)
    } else {
        camera.to_string()
    };
    let kind = SourceKind::resolve(&source)?;
    if kind.is_finite() {
        return Err(anyhow!("camera must be a USB index or camera device, got {}", camera));
    }
    Ok(kind)
}

fn run_bridge<L: SerialLink>(
    link: L,
    camera: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    settings: BridgeSettings,
    shutdown: &AtomicBool,
) -> Result<BridgeReport> {
    SignalBridge::new(link, camera, detector, settings).run(shutdown)
}

#[cfg(feature = "serial")]
fn open_link(port: &str, baud: u32) -> Result<sortwatch::bridge::SerialPortLink> {
    sortwatch::bridge::SerialPortLink::open(port, baud)
}

#[cfg(not(feature = "serial"))]
fn open_link(port: &str, _baud: u32) -> Result<LineLink<BufReader<File>, File>> {
    log::info!("serial feature disabled; opening {} as a preconfigured device file", port);
    sortwatch::bridge::open_device_link(port)
}
