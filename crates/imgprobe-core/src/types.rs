use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel space, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Intersect with the `width` × `height` image area.
    ///
    /// A box lying entirely outside collapses to zero size at the border.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let w = self.w.min(width - x);
        let h = self.h.min(height - y);
        Self { x, y, w, h }
    }
}

/// Output of the face-box detector.
///
/// Field order matters: consumers read the keys `h`, `w`, `channels`, `boxes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub h: u32,
    pub w: u32,
    pub channels: u8,
    pub boxes: Vec<Rect>,
}

/// Image embedding vector (512-dimensional for ResNet-18).
///
/// Serializes as a bare JSON array in the model's native feature order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
