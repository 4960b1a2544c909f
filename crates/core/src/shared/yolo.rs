//! Pre- and post-processing shared by the YOLO-family models (face locator
//! and equipment detector).

use crate::shared::frame::Frame;
use crate::shared::inference::InferenceError;
use crate::shared::rect::Rect;

/// Gray fill for letterbox padding (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Geometry of a letterbox transform, used to map boxes back to the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Map a center-format box in model input coordinates back to frame
    /// coordinates.
    pub fn to_frame(&self, cx: f64, cy: f64, w: f64, h: f64) -> Rect {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        Rect::new(
            ((cx - w / 2.0) - px) / self.scale,
            ((cy - h / 2.0) - py) / self.scale,
            ((cx + w / 2.0) - px) / self.scale,
            ((cy + h / 2.0) - py) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns the NCHW float32 tensor and the transform geometry.
pub fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize + copy into padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Split a `[1, F, N]` or `[1, N, F]` YOLO output into one row of `F`
/// features per candidate.
///
/// The smaller of the two trailing dimensions is taken as the feature axis.
pub fn output_rows(data: &[f32], shape: &[usize]) -> Result<Vec<Vec<f32>>, InferenceError> {
    if shape.len() != 3 {
        return Err(InferenceError::Output(format!(
            "unexpected YOLO output shape: {shape:?}"
        )));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err(InferenceError::Output(format!(
            "output holds {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        )));
    }

    let rows = (0..num_dets)
        .map(|i| {
            if transposed {
                (0..num_feats).map(|f| data[f * num_dets + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            }
        })
        .collect();
    Ok(rows)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub rect: Rect,
    pub confidence: f64,
    pub class_id: usize,
}

/// Greedy per-class NMS: sort by confidence descending, suppress boxes of
/// the same class that overlap a kept box by more than `iou_thresh`.
pub fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] || dets[j].class_id != dets[i].class_id {
                continue;
            }
            if dets[i].rect.iou(&dets[j].rect) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64, class_id: usize) -> RawDetection {
        RawDetection {
            rect: Rect::new(x1, y1, x2, y2),
            confidence,
            class_id,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → 640: scale 3.2, new 640x320, pad_y 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let (tensor, lb) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((lb.scale - 3.2).abs() < 0.01);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let (tensor, lb) = letterbox(&frame, 640);

        let y = lb.pad_y as usize + 1;
        let x = lb.pad_x as usize + 1;
        assert!((tensor[[0, 0, y, x]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - PAD_VALUE).abs() < 0.01);
    }

    #[test]
    fn test_letterbox_maps_back_to_frame() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 40,
        };
        // 20x10 box centered at (30, 60) in input space
        let r = lb.to_frame(30.0, 60.0, 20.0, 10.0);
        assert_eq!(r, Rect::new(10.0, 7.5, 20.0, 12.5));
    }

    #[test]
    fn test_output_rows_transposed() {
        // [1, 2 features, 3 detections]: feature-major
        let data = vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        let rows = output_rows(&data, &[1, 2, 3]).unwrap();
        assert_eq!(
            rows,
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]]
        );
    }

    #[test]
    fn test_output_rows_row_major() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let rows = output_rows(&data, &[1, 4, 2]).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], vec![3.0, 4.0]);
    }

    #[test]
    fn test_output_rows_rejects_bad_shape() {
        assert!(output_rows(&[0.0; 4], &[4]).is_err());
        assert!(output_rows(&[0.0; 4], &[1, 3, 5]).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlapping_same_class() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9, 0),
            det(5.0, 5.0, 105.0, 105.0, 0.8, 0),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_classes() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9, 0),
            det(5.0, 5.0, 105.0, 105.0, 0.8, 1),
        ];
        assert_eq!(nms(&mut dets, 0.3).len(), 2);
    }

    #[test]
    fn test_nms_confidence_ordering() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.5, 0),
            det(2.0, 2.0, 102.0, 102.0, 0.9, 0),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_empty_input() {
        let mut dets: Vec<RawDetection> = Vec::new();
        assert!(nms(&mut dets, 0.3).is_empty());
    }
}
