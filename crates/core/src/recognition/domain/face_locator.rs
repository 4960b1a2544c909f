use crate::shared::frame::Frame;
use crate::shared::inference::InferenceError;
use crate::shared::rect::Rect;

/// Domain interface for finding face regions in a frame.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Rect>, InferenceError>;
}
