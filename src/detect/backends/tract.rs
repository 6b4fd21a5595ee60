#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::decode::{decode_yolo, DecodeParams};
use crate::detect::labels::LabelTable;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Square input edge used by exported YOLOv8 detect models.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Tract-based backend for YOLOv8 ONNX detect models.
///
/// This backend loads a local model file and runs inference on RGB frames. Frames
/// are stretched to the model input and boxes are scaled back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: LabelTable,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, labels: LabelTable) -> Result<Self> {
        Self::with_input_size(model_path, labels, DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }

    pub fn with_input_size<P: AsRef<Path>>(
        model_path: P,
        labels: LabelTable,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("tract backend needs at least one class label"));
        }
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let resized = image::imageops::resize(
            frame.image(),
            self.width,
            self.height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected detect output shape {:?}", shape));
        }
        let num_classes = shape[1] - 4;
        if num_classes != self.labels.len() {
            log::debug!(
                "model reports {} classes, label table has {}",
                num_classes,
                self.labels.len()
            );
        }
        let scores: Vec<f32> = view.iter().copied().collect();
        let params = DecodeParams::for_frame(
            (self.width, self.height),
            (frame.width(), frame.height()),
        );
        decode_yolo(&scores, num_classes, &params)
    }
}
