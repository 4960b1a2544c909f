/// ArcFace face embedder using ONNX Runtime.
///
/// Crops the face region, resizes it to the model's 112x112 input, and
/// returns an L2-normalized embedding. On normalized vectors the Euclidean
/// distance is `sqrt(2 - 2 * cosine)`, so gallery tolerances stay in `[0, 2]`.
use std::path::Path;

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::frame::Frame;
use crate::shared::inference::{self, InferenceError};
use crate::shared::rect::Rect;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxFaceEmbedder {
    session: ort::session::Session,
}

impl OnnxFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = inference::open_session(model_path)?;
        Ok(Self { session })
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn embed(&mut self, frame: &Frame, face: &Rect) -> Result<Vec<f32>, InferenceError> {
        let crop = frame
            .crop(face)
            .ok_or_else(|| InferenceError::Output("face region lies outside the frame".into()))?;

        let tensor = preprocess(crop.data(), crop.width(), crop.height());
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or_else(|| InferenceError::Output("cannot get embedding slice".into()))?;

        let mut embedding = embedding_slice.to_vec();
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::Output("embedding contains NaN".into()));
        }
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_preprocess_shape() {
        let data = vec![128u8; 50 * 50 * 3];
        let tensor = preprocess(&data, 50, 50);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_normalization_range() {
        let white = preprocess(&vec![255u8; 10 * 10 * 3], 10, 10);
        let black = preprocess(&vec![0u8; 10 * 10 * 3], 10, 10);
        assert!((white[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
        assert!((black[[0, 2, 111, 111]] + 1.0).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_non_square_crop() {
        // 20 wide, 10 tall: left half dark, right half bright
        let mut data = Vec::new();
        for _row in 0..10 {
            for col in 0..20 {
                let v = if col < 10 { 0u8 } else { 255u8 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let tensor = preprocess(&data, 20, 10);
        assert!(tensor[[0, 0, 50, 10]] < 0.0);
        assert!(tensor[[0, 0, 50, 100]] > 0.0);
    }
}
