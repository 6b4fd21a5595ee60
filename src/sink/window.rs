//! Window and video writer backed by OpenCV highgui/videoio.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use opencv::core::{Mat, Scalar, Size, CV_8UC3};
use opencv::prelude::*;
use opencv::{highgui, videoio};
use std::path::Path;
use std::time::Duration;

use super::{Viewer, VideoSink};
use crate::frame::Resolution;

/// Copy an RGB image into a BGR `Mat`.
fn to_bgr_mat(frame: &RgbImage) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )
    .context("allocate frame Mat")?;
    let dst = mat.data_bytes_mut().context("borrow Mat pixels")?;
    for (out, px) in dst.chunks_exact_mut(3).zip(frame.pixels()) {
        out[0] = px[2];
        out[1] = px[1];
        out[2] = px[0];
    }
    Ok(mat)
}

pub struct OpenCvViewer {
    window: String,
}

impl OpenCvViewer {
    pub fn new(window: &str) -> Result<Self> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("open window '{}'", window))?;
        Ok(Self {
            window: window.to_string(),
        })
    }
}

impl Viewer for OpenCvViewer {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let mat = to_bgr_mat(frame)?;
        highgui::imshow(&self.window, &mat).context("show frame")?;
        Ok(())
    }

    fn wait_key(&mut self, delay: Option<Duration>) -> Result<Option<char>> {
        let delay_ms = delay.map(|d| (d.as_millis() as i32).max(1)).unwrap_or(0);
        let key = highgui::wait_key(delay_ms).context("wait for key")?;
        if key < 0 {
            return Ok(None);
        }
        Ok(char::from_u32((key & 0xFF) as u32))
    }
}

impl Drop for OpenCvViewer {
    fn drop(&mut self) {
        if let Err(err) = highgui::destroy_all_windows() {
            log::debug!("destroy windows: {}", err);
        }
    }
}

/// MJPG writer at a fixed frame rate and size.
pub struct OpenCvRecorder {
    writer: videoio::VideoWriter,
    resolution: Resolution,
}

impl OpenCvRecorder {
    pub fn open(path: &Path, fps: f64, resolution: Resolution) -> Result<Self> {
        let fourcc = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G').context("MJPG fourcc")?;
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("output path {} is not UTF-8", path.display()))?;
        let writer = videoio::VideoWriter::new(
            path_str,
            fourcc,
            fps,
            Size::new(resolution.width as i32, resolution.height as i32),
            true,
        )
        .with_context(|| format!("create video writer {}", path.display()))?;
        if !writer.is_opened().context("query video writer")? {
            return Err(anyhow!("could not open video writer {}", path.display()));
        }
        Ok(Self { writer, resolution })
    }
}

impl VideoSink for OpenCvRecorder {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.width() != self.resolution.width || frame.height() != self.resolution.height {
            return Err(anyhow!(
                "frame {}x{} does not match recording size {}",
                frame.width(),
                frame.height(),
                self.resolution
            ));
        }
        let mat = to_bgr_mat(frame)?;
        self.writer.write(&mat).context("write video frame")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release().context("release video writer")?;
        Ok(())
    }
}
