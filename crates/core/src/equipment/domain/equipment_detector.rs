use crate::shared::frame::Frame;
use crate::shared::inference::InferenceError;
use crate::shared::rect::Rect;

/// One labeled detector output, scoped to one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionBox {
    pub rect: Rect,
    pub label: String,
    pub confidence: f64,
}

impl DetectionBox {
    /// Case-insensitive substring match against an equipment class name.
    pub fn is_class(&self, class: &str) -> bool {
        self.label.to_lowercase().contains(&class.to_lowercase())
    }
}

/// Domain interface for safety equipment detection.
///
/// Implementations keep no state between frames and only return boxes at or
/// above their configured confidence floor.
pub trait EquipmentDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>, InferenceError>;
}
