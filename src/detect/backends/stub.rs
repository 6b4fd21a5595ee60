use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::LabelTable;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted backend for tests and `stub://` models.
///
/// Each call to `detect` pops the next scripted frame result. Once the script is
/// exhausted every further frame yields no detections.
pub struct ScriptedBackend {
    labels: LabelTable,
    script: VecDeque<Vec<Detection>>,
    frames_seen: u64,
}

impl ScriptedBackend {
    pub fn new(labels: LabelTable) -> Self {
        Self {
            labels,
            script: VecDeque::new(),
            frames_seen: 0,
        }
    }

    /// Append per-frame results, in order.
    pub fn with_script<I>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = Vec<Detection>>,
    {
        self.script.extend(frames);
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(LabelTable::default())
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.frames_seen += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn scripted_backend_replays_then_goes_quiet() -> Result<()> {
        let det = Detection::new(2, 0.9, BoundingBox::new(1, 1, 5, 5));
        let mut backend = ScriptedBackend::default().with_script([vec![det], vec![]]);
        let frame = Frame::from_rgb(vec![0u8; 12], 2, 2, 1)?;

        assert_eq!(backend.detect(&frame)?, vec![det]);
        assert!(backend.detect(&frame)?.is_empty());
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.frames_seen(), 3);
        Ok(())
    }
}
