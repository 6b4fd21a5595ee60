//! YOLOv8-style output decoding.
//!
//! The detect head emits one tensor of shape `[1, 4 + num_classes, num_anchors]`:
//! rows 0..4 are `cx, cy, w, h` in model-input pixels, the remaining rows are
//! per-class scores. Decoding picks the best class per anchor, drops anchors below
//! the candidate floor, maps boxes back to frame pixels and runs greedy NMS.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

/// Decoding parameters.
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    /// Candidate floor applied before NMS. Display thresholds are applied later.
    pub candidate_floor: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Frame pixels per model-input pixel, horizontally.
    pub scale_x: f32,
    /// Frame pixels per model-input pixel, vertically.
    pub scale_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl DecodeParams {
    pub fn for_frame(input: (u32, u32), frame: (u32, u32)) -> Self {
        Self {
            candidate_floor: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            scale_x: frame.0 as f32 / input.0.max(1) as f32,
            scale_y: frame.1 as f32 / input.1.max(1) as f32,
            frame_width: frame.0,
            frame_height: frame.1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class_id: usize,
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= f32::EPSILON {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode a `[4 + num_classes, num_anchors]` channel-major score tensor.
pub fn decode_yolo(
    output: &[f32],
    num_classes: usize,
    params: &DecodeParams,
) -> Result<Vec<Detection>> {
    if num_classes == 0 {
        return Err(anyhow!("model reports zero classes"));
    }
    let rows = 4 + num_classes;
    if output.is_empty() || output.len() % rows != 0 {
        return Err(anyhow!(
            "output length {} is not a multiple of {} rows",
            output.len(),
            rows
        ));
    }
    let anchors = output.len() / rows;
    let at = |row: usize, anchor: usize| output[row * anchors + anchor];

    let max_x = params.frame_width as f32;
    let max_y = params.frame_height as f32;
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (0..num_classes)
            .map(|class| (class, at(4 + class, anchor)))
            .fold((0usize, f32::NEG_INFINITY), |best, (class, score)| {
                if score > best.1 {
                    (class, score)
                } else {
                    best
                }
            });
        if !score.is_finite() || score < params.candidate_floor {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        if !cx.is_finite() || !cy.is_finite() || !w.is_finite() || !h.is_finite() {
            continue;
        }
        if w <= 0.0 || h <= 0.0 {
            continue;
        }

        candidates.push(Candidate {
            class_id,
            score: score.min(1.0),
            x1: ((cx - w / 2.0) * params.scale_x).clamp(0.0, max_x),
            y1: ((cy - h / 2.0) * params.scale_y).clamp(0.0, max_y),
            x2: ((cx + w / 2.0) * params.scale_x).clamp(0.0, max_x),
            y2: ((cy + h / 2.0) * params.scale_y).clamp(0.0, max_y),
        });
    }

    let kept = nms(candidates, params.iou_threshold, params.max_detections);
    Ok(kept
        .into_iter()
        .map(|c| {
            Detection::new(
                c.class_id,
                c.score,
                BoundingBox::new(c.x1 as i32, c.y1 as i32, c.x2 as i32, c.y2 as i32),
            )
        })
        .collect())
}

/// Greedy per-class NMS: highest score first, suppress same-class overlaps.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, limit: usize) -> Vec<Candidate> {
    candidates.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        if kept.len() >= limit {
            break;
        }
        for j in (i + 1)..candidates.len() {
            if candidates[j].class_id == candidates[i].class_id
                && candidates[i].iou(&candidates[j]) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay anchors out channel-major the way the detect head does.
    fn tensor(anchors: &[[f32; 6]]) -> Vec<f32> {
        let mut out = vec![0.0; anchors.len() * 6];
        for (a, values) in anchors.iter().enumerate() {
            for (row, value) in values.iter().enumerate() {
                out[row * anchors.len() + a] = *value;
            }
        }
        out
    }

    fn params() -> DecodeParams {
        DecodeParams::for_frame((640, 640), (1280, 640))
    }

    #[test]
    fn decodes_best_class_and_scales_boxes() -> Result<()> {
        let output = tensor(&[[100.0, 100.0, 20.0, 40.0, 0.1, 0.9]]);
        let dets = decode_yolo(&output, 2, &params())?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(dets[0].bbox, BoundingBox::new(180, 80, 220, 120));
        Ok(())
    }

    #[test]
    fn drops_candidates_below_floor() -> Result<()> {
        let output = tensor(&[[100.0, 100.0, 20.0, 20.0, 0.2, 0.1]]);
        assert!(decode_yolo(&output, 2, &params())?.is_empty());
        Ok(())
    }

    #[test]
    fn suppresses_overlapping_boxes_of_same_class() -> Result<()> {
        let output = tensor(&[
            [100.0, 100.0, 50.0, 50.0, 0.8, 0.0],
            [102.0, 101.0, 50.0, 50.0, 0.6, 0.0],
            [102.0, 101.0, 50.0, 50.0, 0.0, 0.7],
        ]);
        let dets = decode_yolo(&output, 2, &params())?;
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[1].class_id, 1);
        Ok(())
    }

    #[test]
    fn rejects_misshapen_output() {
        assert!(decode_yolo(&[0.0; 7], 2, &params()).is_err());
        assert!(decode_yolo(&[0.0; 6], 0, &params()).is_err());
    }
}
