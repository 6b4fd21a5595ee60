//! Frame annotation: detection boxes, captions and the statistics overlay.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

use crate::tally::{FrameStats, KeptDetection};

/// Box colors, indexed by `class_id % PALETTE.len()`.
pub const PALETTE: [Rgb<u8>; 10] = [
    Rgb([87, 120, 164]),
    Rgb([228, 148, 68]),
    Rgb([209, 97, 93]),
    Rgb([133, 182, 178]),
    Rgb([106, 159, 88]),
    Rgb([231, 202, 96]),
    Rgb([168, 124, 159]),
    Rgb([241, 162, 169]),
    Rgb([150, 118, 98]),
    Rgb([184, 176, 172]),
];

/// Color of overlay statistics text.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const BOX_THICKNESS: i32 = 2;
const CAPTION_SCALE: f32 = 16.0;
const OVERLAY_SCALE: f32 = 22.0;
const OVERLAY_X: i32 = 10;
const OVERLAY_FIRST_Y: i32 = 20;
const OVERLAY_STEP: i32 = 25;

pub fn color_for_class(class_id: usize) -> Rgb<u8> {
    PALETTE[class_id % PALETTE.len()]
}

/// One line of overlay text; `y` is the baseline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayLine {
    pub x: i32,
    pub y: i32,
    pub text: String,
}

/// Overlay layout at fixed offsets: FPS (streaming sources only), total objects,
/// then one line per tracked label seen this frame.
pub fn overlay_lines(stats: &FrameStats, avg_fps: Option<f64>) -> Vec<OverlayLine> {
    let mut lines = Vec::new();
    if let Some(fps) = avg_fps {
        lines.push(OverlayLine {
            x: OVERLAY_X,
            y: OVERLAY_FIRST_Y,
            text: format!("FPS: {:.2}", fps),
        });
    }
    let mut y = OVERLAY_FIRST_Y + OVERLAY_STEP;
    lines.push(OverlayLine {
        x: OVERLAY_X,
        y,
        text: format!("Total Objects: {}", stats.total_objects()),
    });
    for (label, count) in stats.nonzero() {
        y += OVERLAY_STEP;
        lines.push(OverlayLine {
            x: OVERLAY_X,
            y,
            text: format!("{}: {}", label, count),
        });
    }
    lines
}

/// Draws detections and statistics onto copies of frames.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Annotator without text rendering: boxes only.
    pub fn boxes_only() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontVec) -> Self {
        Self { font: Some(font) }
    }

    /// Load a TrueType/OpenType font for captions and overlay text.
    pub fn from_font_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        Ok(Self::with_font(font))
    }

    /// Use the font at `path` when given; otherwise fall back to boxes only.
    pub fn from_optional_font(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::from_font_file(path) {
                Ok(annotator) => annotator,
                Err(err) => {
                    log::warn!("{:#}; captions disabled", err);
                    Self::boxes_only()
                }
            },
            None => {
                log::info!("no font configured; captions and overlay text disabled");
                Self::boxes_only()
            }
        }
    }

    /// Return an annotated copy of `frame`.
    pub fn annotate(
        &self,
        frame: &RgbImage,
        kept: &[KeptDetection],
        stats: &FrameStats,
        avg_fps: Option<f64>,
    ) -> RgbImage {
        let mut canvas = frame.clone();

        for det in kept {
            let color = color_for_class(det.class_id);
            for inset in 0..BOX_THICKNESS {
                let width = det.bbox.width() as i32 - 2 * inset;
                let height = det.bbox.height() as i32 - 2 * inset;
                if width <= 0 || height <= 0 {
                    break;
                }
                let rect = Rect::at(det.bbox.x_min + inset, det.bbox.y_min + inset)
                    .of_size(width as u32, height as u32);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
            if let Some(font) = &self.font {
                let top = (det.bbox.y_min - 10 - CAPTION_SCALE as i32).max(0);
                draw_text_mut(
                    &mut canvas,
                    color,
                    det.bbox.x_min,
                    top,
                    PxScale::from(CAPTION_SCALE),
                    font,
                    &det.caption(),
                );
            }
        }

        if let Some(font) = &self.font {
            for line in overlay_lines(stats, avg_fps) {
                draw_text_mut(
                    &mut canvas,
                    OVERLAY_COLOR,
                    line.x,
                    (line.y - OVERLAY_SCALE as i32).max(0),
                    PxScale::from(OVERLAY_SCALE),
                    font,
                    &line.text,
                );
            }
        }

        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, LabelTable};
    use crate::tally::{filter_and_tally, TrackedLabels};

    fn kept(class_id: usize, bbox: BoundingBox) -> (Vec<KeptDetection>, FrameStats) {
        let tally = filter_and_tally(
            &[Detection::new(class_id, 0.9, bbox)],
            0.5,
            &LabelTable::default(),
            &TrackedLabels::default(),
        );
        (tally.kept, tally.stats)
    }

    #[test]
    fn palette_index_wraps_by_class_id() {
        assert_eq!(color_for_class(2), PALETTE[2]);
        assert_eq!(color_for_class(12), PALETTE[2]);
        assert_eq!(color_for_class(3), color_for_class(3));
    }

    #[test]
    fn annotate_draws_on_a_copy() {
        let frame = RgbImage::new(40, 40);
        let (dets, stats) = kept(1, BoundingBox::new(5, 5, 25, 25));
        let out = Annotator::boxes_only().annotate(&frame, &dets, &stats, None);

        assert_eq!(*out.get_pixel(5, 5), PALETTE[1]);
        assert_eq!(*out.get_pixel(6, 6), PALETTE[1]);
        assert_eq!(*out.get_pixel(15, 15), Rgb([0, 0, 0]));
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn same_class_gets_same_color_across_frames() {
        let annotator = Annotator::boxes_only();
        let (first, stats) = kept(13, BoundingBox::new(0, 0, 10, 10));
        let (second, _) = kept(13, BoundingBox::new(10, 10, 20, 20));
        let a = annotator.annotate(&RgbImage::new(30, 30), &first, &stats, None);
        let b = annotator.annotate(&RgbImage::new(30, 30), &second, &stats, None);
        assert_eq!(a.get_pixel(0, 0), b.get_pixel(10, 10));
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let frame = RgbImage::new(10, 10);
        let (dets, stats) = kept(0, BoundingBox::new(4, 4, 4, 9));
        let out = Annotator::boxes_only().annotate(&frame, &dets, &stats, None);
        assert_eq!(out, frame);
    }

    #[test]
    fn overlay_layout_uses_fixed_offsets() {
        let tally = filter_and_tally(
            &[
                Detection::new(2, 0.9, BoundingBox::new(0, 0, 5, 5)),
                Detection::new(3, 0.9, BoundingBox::new(0, 0, 5, 5)),
            ],
            0.5,
            &LabelTable::default(),
            &TrackedLabels::default(),
        );

        let streaming = overlay_lines(&tally.stats, Some(29.5));
        let texts: Vec<_> = streaming.iter().map(|l| (l.y, l.text.as_str())).collect();
        assert_eq!(
            texts,
            vec![
                (20, "FPS: 29.50"),
                (45, "Total Objects: 2"),
                (70, "bottle-plastic: 1"),
                (95, "cap: 1"),
            ]
        );

        let finite = overlay_lines(&tally.stats, None);
        assert_eq!(finite[0].text, "Total Objects: 2");
        assert_eq!(finite[0].y, 45);
    }
}
