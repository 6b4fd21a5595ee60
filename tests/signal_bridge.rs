use std::io::{self, BufReader, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use sortwatch::bridge::{BridgeOutcome, BridgeSettings, BridgeState, LineLink, SignalBridge};
use sortwatch::ingest::{CameraConfig, CameraSource, SourceStats};
use sortwatch::{BoundingBox, Detection, Frame, FrameSource, ScriptedBackend};

type MemoryLink = LineLink<Cursor<Vec<u8>>, Vec<u8>>;

fn link(input: &str) -> MemoryLink {
    LineLink::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

fn camera() -> Box<dyn FrameSource> {
    let mut camera = CameraSource::new(CameraConfig {
        device: "stub://camera".to_string(),
        width: 64,
        height: 48,
        ..CameraConfig::default()
    })
    .expect("stub camera");
    camera.connect().expect("connect stub camera");
    Box::new(camera)
}

fn settings() -> BridgeSettings {
    BridgeSettings {
        settle: Duration::ZERO,
        ..BridgeSettings::default()
    }
}

fn det(class_id: usize, confidence: f32) -> Detection {
    Detection::new(class_id, confidence, BoundingBox::new(4, 4, 30, 30))
}

fn bridge(input: &str, script: Vec<Vec<Detection>>) -> SignalBridge<MemoryLink> {
    SignalBridge::new(
        link(input),
        camera(),
        Box::new(ScriptedBackend::default().with_script(script)),
        settings(),
    )
}

fn written(bridge: &SignalBridge<MemoryLink>) -> String {
    String::from_utf8_lossy(bridge.link().writer()).into_owned()
}

/// Camera that never yields a frame.
struct DeadCamera {
    fail_with_error: bool,
}

impl FrameSource for DeadCamera {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_with_error {
            Err(anyhow!("device unplugged"))
        } else {
            Ok(None)
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: 0,
            origin: "dead".to_string(),
        }
    }
}

#[test]
fn trigger_with_target_sends_reply() -> Result<()> {
    let mut bridge = bridge("DETECTED\n", vec![vec![det(3, 0.8), det(2, 0.9)]]);
    assert_eq!(bridge.poll_once()?, BridgeOutcome::Sent);
    assert_eq!(written(&bridge), "BOTTLE\n");
    assert_eq!(bridge.state(), BridgeState::Idle);
    Ok(())
}

#[test]
fn trigger_without_target_sends_nothing() -> Result<()> {
    let mut bridge = bridge("DETECTED\r\n", vec![vec![det(3, 0.8)]]);
    assert_eq!(
        bridge.poll_once()?,
        BridgeOutcome::NotTarget {
            labels: vec!["cap".to_string()]
        }
    );
    assert!(written(&bridge).is_empty());
    assert_eq!(bridge.state(), BridgeState::Idle);
    Ok(())
}

#[test]
fn target_below_threshold_is_not_reported() -> Result<()> {
    let mut bridge = bridge("DETECTED\n", vec![vec![det(2, 0.2)]]);
    assert_eq!(
        bridge.poll_once()?,
        BridgeOutcome::NotTarget { labels: Vec::new() }
    );
    assert!(written(&bridge).is_empty());
    Ok(())
}

#[test]
fn other_lines_are_ignored() -> Result<()> {
    let mut bridge = bridge(
        "hello\ndetected\n DETECTED?\n",
        vec![vec![det(2, 0.9)], vec![det(2, 0.9)], vec![det(2, 0.9)]],
    );
    for _ in 0..3 {
        assert_eq!(bridge.poll_once()?, BridgeOutcome::Ignored);
        assert_eq!(bridge.state(), BridgeState::Idle);
    }
    assert_eq!(bridge.poll_once()?, BridgeOutcome::Closed);
    assert!(written(&bridge).is_empty());
    Ok(())
}

#[test]
fn camera_failure_returns_to_idle() -> Result<()> {
    for fail_with_error in [false, true] {
        let mut bridge = SignalBridge::new(
            link("DETECTED\n"),
            Box::new(DeadCamera { fail_with_error }),
            Box::new(ScriptedBackend::default().with_script([vec![det(2, 0.9)]])),
            settings(),
        );
        assert_eq!(bridge.poll_once()?, BridgeOutcome::CaptureFailed);
        assert_eq!(bridge.state(), BridgeState::Idle);
        assert!(written(&bridge).is_empty());
    }
    Ok(())
}

#[test]
fn run_answers_each_trigger_until_link_closes() -> Result<()> {
    let mut bridge = bridge(
        "DETECTED\nnoise\nDETECTED\nDETECTED\n",
        vec![vec![det(2, 0.9)], vec![det(0, 0.9)], vec![det(2, 0.6)]],
    );
    let report = bridge.run(&AtomicBool::new(false))?;
    assert_eq!(report.triggers, 3);
    assert_eq!(report.replies, 2);
    assert_eq!(report.capture_failures, 0);
    assert_eq!(written(&bridge), "BOTTLE\nBOTTLE\n");
    Ok(())
}

#[test]
fn run_stops_when_shutdown_is_raised() -> Result<()> {
    let mut bridge = bridge("DETECTED\n", vec![vec![det(2, 0.9)]]);
    let report = bridge.run(&AtomicBool::new(true))?;
    assert_eq!(report.triggers, 0);
    assert!(written(&bridge).is_empty());
    Ok(())
}

/// Controller that is connected but never sends anything.
struct SilentController;

impl Read for SilentController {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"))
    }
}

#[test]
fn idle_run_stops_when_shutdown_is_raised() -> Result<()> {
    let mut bridge = SignalBridge::new(
        LineLink::new(BufReader::new(SilentController), Vec::new()),
        camera(),
        Box::new(ScriptedBackend::default()),
        settings(),
    );
    let shutdown = Arc::new(AtomicBool::new(false));
    let raiser = {
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            shutdown.store(true, Ordering::SeqCst);
        })
    };

    let started = Instant::now();
    let report = bridge.run(&shutdown)?;
    raiser.join().expect("shutdown thread");
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.triggers, 0);
    assert!(bridge.link().writer().is_empty());
    Ok(())
}

#[test]
fn custom_target_class() -> Result<()> {
    let mut bridge = SignalBridge::new(
        link("DETECTED\n"),
        camera(),
        Box::new(ScriptedBackend::default().with_script([vec![det(1, 0.9)]])),
        BridgeSettings {
            target_class: "bottle-glass".to_string(),
            ..settings()
        },
    );
    assert_eq!(bridge.poll_once()?, BridgeOutcome::Sent);
    assert_eq!(written(&bridge), "BOTTLE\n");
    Ok(())
}
