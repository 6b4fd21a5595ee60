/// Axis-aligned box in pixel coordinates of the frame it was detected on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> u32 {
        (self.x_max - self.x_min).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y_max - self.y_min).max(0) as u32
    }
}

/// One predicted object instance as reported by a detector backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    /// Score in `0.0..=1.0`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: usize, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_confidence_is_clamped() {
        let bbox = BoundingBox::new(0, 0, 10, 10);
        assert_eq!(Detection::new(0, 1.7, bbox).confidence, 1.0);
        assert_eq!(Detection::new(0, -0.2, bbox).confidence, 0.0);
    }

    #[test]
    fn inverted_box_has_zero_extent() {
        let bbox = BoundingBox::new(10, 10, 5, 20);
        assert_eq!(bbox.width(), 0);
        assert_eq!(bbox.height(), 10);
    }
}
