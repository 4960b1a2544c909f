use crate::shared::frame::Frame;
use crate::shared::inference::InferenceError;
use crate::shared::rect::Rect;

/// Domain interface for computing an identity embedding of one face region.
///
/// Embeddings from the same implementation are comparable by Euclidean
/// distance; smaller means more alike.
pub trait FaceEmbedder: Send {
    fn embed(&mut self, frame: &Frame, face: &Rect) -> Result<Vec<f32>, InferenceError>;
}
