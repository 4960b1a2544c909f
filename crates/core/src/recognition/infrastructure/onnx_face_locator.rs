/// YOLO face locator using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, and NMS post-processing.
/// Keypoints emitted by pose-style face models are ignored; only boxes are
/// needed for recognition and association.
use std::path::Path;

use crate::recognition::domain::face_locator::FaceLocator;
use crate::shared::frame::Frame;
use crate::shared::inference::{self, InferenceError};
use crate::shared::rect::Rect;
use crate::shared::yolo::{self, RawDetection};

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO face locator backed by an ONNX Runtime session.
pub struct OnnxFaceLocator {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceLocator {
    /// Load a YOLO face ONNX model and prepare for inference.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = inference::open_session(model_path)?;
        let input_size = inference::model_input_size(&session);
        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Rect>, InferenceError> {
        let (input_tensor, lb) = yolo::letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(InferenceError::Output(
                "face model produced no outputs".into(),
            ));
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor
            .as_slice()
            .ok_or_else(|| InferenceError::Output("cannot get tensor slice".into()))?;

        let rows = yolo::output_rows(data, tensor.shape())?;
        let mut raw_dets = parse_faces(&rows, &lb, self.confidence);
        let bounds = frame.bounds();

        Ok(yolo::nms(&mut raw_dets, NMS_IOU_THRESH)
            .into_iter()
            .filter_map(|d| d.rect.clamp_to(&bounds))
            .collect())
    }
}

/// Row format: `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
fn parse_faces(rows: &[Vec<f32>], lb: &yolo::Letterbox, confidence: f64) -> Vec<RawDetection> {
    rows.iter()
        .filter(|row| row.len() >= 5)
        .filter(|row| row[4] as f64 >= confidence)
        .map(|row| RawDetection {
            rect: lb.to_frame(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64),
            confidence: row[4] as f64,
            class_id: 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: yolo::Letterbox = yolo::Letterbox {
        scale: 1.0,
        pad_x: 0,
        pad_y: 0,
    };

    #[test]
    fn test_parse_faces_filters_by_confidence() {
        let rows = vec![
            vec![50.0, 50.0, 20.0, 20.0, 0.9],
            vec![80.0, 80.0, 20.0, 20.0, 0.3],
        ];
        let dets = parse_faces(&rows, &IDENTITY, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].rect, Rect::new(40.0, 40.0, 60.0, 60.0));
    }

    #[test]
    fn test_parse_faces_ignores_keypoints() {
        let mut row = vec![50.0, 50.0, 20.0, 20.0, 0.9];
        row.extend_from_slice(&[1.0; 15]);
        let dets = parse_faces(&[row], &IDENTITY, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
    }

    #[test]
    fn test_parse_faces_skips_short_rows() {
        let dets = parse_faces(&[vec![1.0, 2.0, 3.0]], &IDENTITY, 0.0);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_parse_faces_maps_letterbox_back() {
        let lb = yolo::Letterbox {
            scale: 2.0,
            pad_x: 10,
            pad_y: 0,
        };
        let dets = parse_faces(&[vec![30.0, 20.0, 20.0, 20.0, 0.8]], &lb, 0.5);
        assert_eq!(dets[0].rect, Rect::new(5.0, 5.0, 15.0, 15.0));
    }
}
