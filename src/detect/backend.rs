use anyhow::Result;

use crate::detect::labels::LabelTable;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend wraps a pretrained model and its runtime. The pipeline only consumes
/// its output: class ids, confidences and pixel boxes on the frame it was given.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names of the loaded model.
    fn labels(&self) -> &LabelTable;

    /// Run detection on a frame. Boxes are in the frame's pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn labels(&self) -> &LabelTable {
        (**self).labels()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
