//! detect - run a YOLO detector over images, folders, videos or a USB camera.
//!
//! Shows annotated frames (or runs headless), optionally records video sources,
//! and prints per-image counts plus a run summary for image sources.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sortwatch::config::SortwatchConfig;
use sortwatch::pipeline::image_results;
use sortwatch::sink::{open_viewer, recorder_for_plan};
use sortwatch::ui::{Ui, UiMode};
use sortwatch::{
    load_detector, open_source, Annotator, DetectionRun, LabelTable, RecordingPlan, Resolution,
    RunSettings, SourceKind,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a YOLO object detector and count bottles per class")]
struct Args {
    /// Path to the detector model (e.g. "runs/detect/train/weights/best.onnx").
    #[arg(long)]
    model: String,

    /// Image file, image folder, video file, or USB camera ("usb0").
    #[arg(long)]
    source: String,

    /// Minimum confidence for a detection to be kept.
    #[arg(long)]
    thresh: Option<f32>,

    /// Resize frames to WxH (e.g. "640x480"). Required for --record.
    #[arg(long)]
    resolution: Option<String>,

    /// Record annotated video to demo1.avi (video and USB sources only).
    #[arg(long)]
    record: bool,

    /// Class names file, one per line, in model class order.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// TrueType font used for captions and the statistics overlay.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Stage output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

struct Prepared {
    run: DetectionRun,
    source: SourceKind,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let prepared = match prepare(&args, &ui) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            return Ok(());
        }
    };

    log::info!("running detection on {}", prepared.source);
    let report = prepared.run.run()?;
    for line in report.render() {
        println!("{}", line);
    }
    if report.skipped > 0 {
        log::warn!("{} frame(s) skipped", report.skipped);
    }
    Ok(())
}

fn prepare(args: &Args, ui: &Ui) -> Result<Prepared> {
    let cfg = SortwatchConfig::load()?;

    let threshold = args.thresh.unwrap_or(cfg.detect.threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!("--thresh must be within [0, 1], got {}", threshold));
    }
    let resolution = args
        .resolution
        .as_deref()
        .map(Resolution::parse)
        .transpose()?;

    let labels = match &args.labels {
        Some(path) => LabelTable::load(path)?,
        None => cfg.detect.label_table()?,
    };
    let detector = {
        let _stage = ui.stage("load model");
        load_detector(&args.model, labels)?
    };

    let source_kind = SourceKind::resolve(&args.source)?;
    let plan = RecordingPlan::decide(args.record, &source_kind, resolution);
    let source = {
        let _stage = ui.stage("open source");
        open_source(&source_kind, resolution)
            .with_context(|| format!("unable to open {}", source_kind))?
    };
    let recorder = recorder_for_plan(&plan, &cfg.detect.record_path, cfg.detect.record_fps);

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;
    let viewer = open_viewer(shutdown);

    let font = args.font.as_deref().or(cfg.detect.font_path.as_deref());
    let annotator = Annotator::from_optional_font(font);

    let mut settings = RunSettings::for_source(&source_kind);
    settings.threshold = threshold;
    settings.resolution = resolution;
    settings.tracked = cfg.detect.tracked();
    settings.snapshot_path = cfg.detect.snapshot_path.clone();
    settings.fps_window = cfg.detect.fps_window;

    let run = DetectionRun::new(source, detector, viewer, settings)
        .with_recorder(recorder)
        .with_annotator(annotator)
        .on_image(|origin, stats| {
            for line in image_results(origin, stats) {
                println!("{}", line);
            }
        });
    Ok(Prepared {
        run,
        source: source_kind,
    })
}
