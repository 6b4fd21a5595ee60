//! Serial trigger bridge.
//!
//! A microcontroller writes `DETECTED` when an item reaches the camera. The
//! bridge captures one frame, runs the detector and answers `BOTTLE` when the
//! target class is among the kept detections. Every other line is ignored.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::detect::DetectorBackend;
use crate::ingest::FrameSource;
use crate::tally::{filter_and_tally, TrackedLabels};

pub const TRIGGER_TOKEN: &str = "DETECTED";
pub const REPLY_TOKEN: &str = "BOTTLE";
pub const DEFAULT_TARGET_CLASS: &str = "bottle-plastic";
/// Confidence floor used when none is configured.
pub const DEFAULT_BRIDGE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);
/// Pause after a read that returned nothing.
const IDLE_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Classifying,
}

/// Result of one read attempt on a link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    /// Nothing complete arrived before the read timeout.
    Timeout,
    /// The peer closed the link.
    Closed,
}

/// Line-oriented serial connection.
pub trait SerialLink {
    fn read_line(&mut self) -> Result<Inbound>;

    /// Write `token` followed by a newline and flush.
    fn write_token(&mut self, token: &str) -> Result<()>;
}

/// Append bytes up to the next newline into `pending`.
///
/// Bytes read before a timeout stay in `pending` so a line split across reads
/// is still delivered whole.
fn read_pending<R: BufRead>(reader: &mut R, pending: &mut Vec<u8>) -> Result<Inbound> {
    match reader.read_until(b'\n', pending) {
        Ok(0) if pending.is_empty() => Ok(Inbound::Closed),
        Ok(_) => Ok(Inbound::Line(take_line(pending))),
        Err(err) if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
            Ok(Inbound::Timeout)
        }
        Err(err) => Err(err).context("serial read failed"),
    }
}

fn take_line(pending: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}

/// Link over any reader/writer pair.
pub struct LineLink<R, W> {
    reader: R,
    writer: W,
    pending: Vec<u8>,
}

impl<R: BufRead, W: Write> LineLink<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: Vec::new(),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<R: BufRead, W: Write> SerialLink for LineLink<R, W> {
    fn read_line(&mut self) -> Result<Inbound> {
        read_pending(&mut self.reader, &mut self.pending)
    }

    fn write_token(&mut self, token: &str) -> Result<()> {
        self.writer
            .write_all(format!("{}\n", token).as_bytes())
            .context("serial write failed")?;
        self.writer.flush().context("serial flush failed")?;
        Ok(())
    }
}

/// Open a device node (e.g. `/dev/ttyUSB0`) as a plain file.
///
/// The port must already be configured (baud, raw mode), e.g. with `stty`.
/// On Unix the node is opened non-blocking, so an idle line reads as
/// `Inbound::Timeout` instead of parking the caller.
pub fn open_device_link<P: AsRef<Path>>(path: P) -> Result<LineLink<BufReader<File>, File>> {
    let path = path.as_ref();
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NONBLOCK);
    }
    let file = options
        .open(path)
        .with_context(|| format!("failed to open serial device {}", path.display()))?;
    let writer = file
        .try_clone()
        .with_context(|| format!("failed to clone serial device {}", path.display()))?;
    Ok(LineLink::new(BufReader::new(file), writer))
}

#[cfg(feature = "serial")]
pub use self::port::SerialPortLink;

#[cfg(feature = "serial")]
mod port {
    use anyhow::{Context, Result};
    use std::io::{BufReader, Write};
    use std::time::Duration;

    use super::{read_pending, Inbound, SerialLink};

    const READ_TIMEOUT: Duration = Duration::from_secs(1);

    /// Link over a native serial port.
    pub struct SerialPortLink {
        reader: BufReader<Box<dyn serialport::SerialPort>>,
        writer: Box<dyn serialport::SerialPort>,
        pending: Vec<u8>,
    }

    impl SerialPortLink {
        pub fn open(port: &str, baud: u32) -> Result<Self> {
            let reader = serialport::new(port, baud)
                .timeout(READ_TIMEOUT)
                .open()
                .with_context(|| format!("failed to open serial port {} at {} baud", port, baud))?;
            let writer = reader
                .try_clone()
                .with_context(|| format!("failed to clone serial port {}", port))?;
            Ok(Self {
                reader: BufReader::new(reader),
                writer,
                pending: Vec::new(),
            })
        }
    }

    impl SerialLink for SerialPortLink {
        fn read_line(&mut self) -> Result<Inbound> {
            read_pending(&mut self.reader, &mut self.pending)
        }

        fn write_token(&mut self, token: &str) -> Result<()> {
            self.writer
                .write_all(format!("{}\n", token).as_bytes())
                .context("serial write failed")?;
            self.writer.flush().context("serial flush failed")?;
            Ok(())
        }
    }
}

#[derive(Clone, Debug)]
pub struct BridgeSettings {
    pub trigger: String,
    pub reply: String,
    pub target_class: String,
    pub threshold: f32,
    pub tracked: TrackedLabels,
    /// Wait after opening the link before reading, while the controller resets.
    pub settle: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            trigger: TRIGGER_TOKEN.to_string(),
            reply: REPLY_TOKEN.to_string(),
            target_class: DEFAULT_TARGET_CLASS.to_string(),
            threshold: DEFAULT_BRIDGE_THRESHOLD,
            tracked: TrackedLabels::default(),
            settle: DEFAULT_SETTLE,
        }
    }
}

/// What one `poll_once` call did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeOutcome {
    NoInput,
    Closed,
    /// A line arrived that was not the trigger.
    Ignored,
    /// Triggered, but no frame could be captured.
    CaptureFailed,
    /// Triggered, but the detector failed on the captured frame.
    DetectFailed,
    /// Triggered and classified; the target was absent.
    NotTarget { labels: Vec<String> },
    Sent,
}

/// Counters for a finished bridge session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeReport {
    pub triggers: u64,
    pub replies: u64,
    pub capture_failures: u64,
}

/// Owns the link, camera and detector for a bridge session.
pub struct SignalBridge<L> {
    link: L,
    camera: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    settings: BridgeSettings,
    state: BridgeState,
}

impl<L: SerialLink> SignalBridge<L> {
    pub fn new(
        link: L,
        camera: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            link,
            camera,
            detector,
            settings,
            state: BridgeState::Idle,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Handle at most one inbound line.
    pub fn poll_once(&mut self) -> Result<BridgeOutcome> {
        let line = match self.link.read_line()? {
            Inbound::Line(line) => line,
            Inbound::Timeout => return Ok(BridgeOutcome::NoInput),
            Inbound::Closed => return Ok(BridgeOutcome::Closed),
        };
        if line.trim() != self.settings.trigger {
            log::debug!("ignoring serial line {:?}", line.trim());
            return Ok(BridgeOutcome::Ignored);
        }

        self.state = BridgeState::Classifying;
        log::info!("{} signal received, classifying", self.settings.trigger);
        let outcome = self.classify();
        self.state = BridgeState::Idle;
        outcome
    }

    fn classify(&mut self) -> Result<BridgeOutcome> {
        let frame = match self.camera.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::warn!("camera returned no frame");
                return Ok(BridgeOutcome::CaptureFailed);
            }
            Err(err) => {
                log::warn!("camera capture failed: {:#}", err);
                return Ok(BridgeOutcome::CaptureFailed);
            }
        };

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("detection failed: {:#}", err);
                return Ok(BridgeOutcome::DetectFailed);
            }
        };
        let tally = filter_and_tally(
            &detections,
            self.settings.threshold,
            self.detector.labels(),
            &self.settings.tracked,
        );
        let labels: Vec<String> = tally.kept.into_iter().map(|det| det.label).collect();
        log::info!("detected classes: {:?}", labels);

        if labels.iter().any(|label| *label == self.settings.target_class) {
            self.link.write_token(&self.settings.reply)?;
            log::info!("sent {}", self.settings.reply);
            Ok(BridgeOutcome::Sent)
        } else {
            Ok(BridgeOutcome::NotTarget { labels })
        }
    }

    /// Poll until `shutdown` is raised or the link closes.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<BridgeReport> {
        if !self.settings.settle.is_zero() {
            log::info!("waiting {:?} for the controller to settle", self.settings.settle);
            std::thread::sleep(self.settings.settle);
        }
        log::info!("listening for {} signals", self.settings.trigger);

        let mut report = BridgeReport::default();
        while !shutdown.load(Ordering::SeqCst) {
            match self.poll_once()? {
                BridgeOutcome::Closed => {
                    log::warn!("serial link closed");
                    break;
                }
                BridgeOutcome::NoInput => std::thread::sleep(IDLE_POLL),
                BridgeOutcome::Ignored => {}
                BridgeOutcome::Sent => {
                    report.triggers += 1;
                    report.replies += 1;
                }
                BridgeOutcome::CaptureFailed => {
                    report.triggers += 1;
                    report.capture_failures += 1;
                }
                BridgeOutcome::DetectFailed | BridgeOutcome::NotTarget { .. } => {
                    report.triggers += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct TimeoutThenLine {
        chunks: Vec<io::Result<&'static [u8]>>,
    }

    impl io::Read for TimeoutThenLine {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            match self.chunks.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                Err(err) => Err(err),
            }
        }
    }

    #[test]
    fn lines_are_delivered_whole() -> Result<()> {
        let mut link = LineLink::new(Cursor::new(b"DETECTED\r\nnoise".to_vec()), Vec::new());
        assert_eq!(link.read_line()?, Inbound::Line("DETECTED\r\n".to_string()));
        assert_eq!(link.read_line()?, Inbound::Line("noise".to_string()));
        assert_eq!(link.read_line()?, Inbound::Closed);
        Ok(())
    }

    #[test]
    fn timeout_keeps_partial_line() -> Result<()> {
        let reader = TimeoutThenLine {
            chunks: vec![
                Ok(&b"DETE"[..]),
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
                Ok(&b"CTED\n"[..]),
            ],
        };
        let mut link = LineLink::new(BufReader::new(reader), Vec::new());
        assert_eq!(link.read_line()?, Inbound::Timeout);
        assert_eq!(link.read_line()?, Inbound::Line("DETECTED\n".to_string()));
        Ok(())
    }

    #[test]
    fn write_token_appends_newline() -> Result<()> {
        let mut link = LineLink::new(Cursor::new(Vec::new()), Vec::new());
        link.write_token(REPLY_TOKEN)?;
        assert_eq!(link.writer().as_slice(), b"BOTTLE\n");
        Ok(())
    }

    #[test]
    fn device_link_reads_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tty");
        std::fs::write(&path, "DETECTED\n")?;
        let mut link = open_device_link(&path)?;
        assert_eq!(link.read_line()?, Inbound::Line("DETECTED\n".to_string()));
        assert!(open_device_link(dir.path().join("missing")).is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn idle_device_reads_as_timeout() -> Result<()> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("controller");
        let c_path = CString::new(path.as_os_str().as_bytes())?;
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo failed: {}", io::Error::last_os_error());

        let mut link = open_device_link(&path)?;
        assert_eq!(link.read_line()?, Inbound::Timeout);
        Ok(())
    }
}
