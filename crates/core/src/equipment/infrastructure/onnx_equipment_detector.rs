/// Multi-class YOLO equipment detector using ONNX Runtime via `ort`.
///
/// Expects an Ultralytics-style export whose output rows are
/// `[cx, cy, w, h, score_0, ..., score_{n-1}]`. Class names come from an
/// explicit label list, or else from the model's `names` metadata.
use std::fs;
use std::path::Path;

use crate::equipment::domain::equipment_detector::{DetectionBox, EquipmentDetector};
use crate::shared::frame::Frame;
use crate::shared::inference::{self, InferenceError};
use crate::shared::yolo::{self, RawDetection};

/// NMS IoU threshold (Ultralytics default).
const NMS_IOU_THRESH: f64 = 0.7;

pub struct OnnxEquipmentDetector {
    session: ort::session::Session,
    class_names: Vec<String>,
    confidence_floor: f64,
    input_size: u32,
}

impl OnnxEquipmentDetector {
    pub fn new(
        model_path: &Path,
        labels: Option<Vec<String>>,
        confidence_floor: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = inference::open_session(model_path)?;
        let input_size = inference::model_input_size(&session);

        let class_names = match labels {
            Some(names) => names,
            None => session
                .metadata()
                .ok()
                .and_then(|m| m.custom("names"))
                .map(|raw| parse_names_metadata(&raw))
                .unwrap_or_default(),
        };
        if class_names.is_empty() {
            log::warn!(
                "No class names for {}; labels will be numeric",
                model_path.display()
            );
        } else {
            log::info!("Equipment classes: {}", class_names.join(", "));
        }

        Ok(Self {
            session,
            class_names,
            confidence_floor,
            input_size,
        })
    }

    fn label(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{class_id}"))
    }
}

impl EquipmentDetector for OnnxEquipmentDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>, InferenceError> {
        let (input_tensor, lb) = yolo::letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err(InferenceError::Output(
                "equipment model produced no outputs".into(),
            ));
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor
            .as_slice()
            .ok_or_else(|| InferenceError::Output("cannot get tensor slice".into()))?;

        let rows = yolo::output_rows(data, tensor.shape())?;
        let mut raw_dets = parse_detections(&rows, &lb, self.confidence_floor);
        drop(outputs);
        let bounds = frame.bounds();

        Ok(yolo::nms(&mut raw_dets, NMS_IOU_THRESH)
            .into_iter()
            .filter_map(|d| {
                d.rect.clamp_to(&bounds).map(|rect| DetectionBox {
                    rect,
                    label: self.label(d.class_id),
                    confidence: d.confidence,
                })
            })
            .collect())
    }
}

/// Take the best-scoring class of each row and keep it if it reaches the floor.
fn parse_detections(
    rows: &[Vec<f32>],
    lb: &yolo::Letterbox,
    confidence_floor: f64,
) -> Vec<RawDetection> {
    rows.iter()
        .filter(|row| row.len() > 4)
        .filter_map(|row| {
            let (class_id, score) = row[4..]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
            let confidence = *score as f64;
            if confidence < confidence_floor {
                return None;
            }
            Some(RawDetection {
                rect: lb.to_frame(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64),
                confidence,
                class_id,
            })
        })
        .collect()
}

/// Read one class name per line, ignoring blank lines.
pub fn load_labels(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse Ultralytics `names` metadata, e.g. `{0: 'Hardhat', 1: 'Mask'}`,
/// into a list indexed by class id. Missing ids become `class<id>`.
fn parse_names_metadata(raw: &str) -> Vec<String> {
    let mut pairs: Vec<(usize, String)> = raw
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|pair| {
            let (id, name) = pair.split_once(':')?;
            let id = id.trim().parse::<usize>().ok()?;
            let name = name.trim().trim_matches(|c| c == '\'' || c == '"');
            Some((id, name.to_string()))
        })
        .collect();
    pairs.sort_by_key(|(id, _)| *id);

    let len = pairs.last().map_or(0, |(id, _)| id + 1);
    let mut names: Vec<String> = (0..len).map(|id| format!("class{id}")).collect();
    for (id, name) in pairs {
        names[id] = name;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::rect::Rect;

    const IDENTITY: yolo::Letterbox = yolo::Letterbox {
        scale: 1.0,
        pad_x: 0,
        pad_y: 0,
    };

    #[test]
    fn test_parse_detections_picks_best_class() {
        let rows = vec![vec![50.0, 50.0, 20.0, 20.0, 0.1, 0.7, 0.3]];
        let dets = parse_detections(&rows, &IDENTITY, 0.2);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].confidence - 0.7).abs() < 1e-6);
        assert_eq!(dets[0].rect, Rect::new(40.0, 40.0, 60.0, 60.0));
    }

    #[test]
    fn test_parse_detections_applies_floor() {
        let rows = vec![
            vec![50.0, 50.0, 20.0, 20.0, 0.19, 0.05],
            vec![80.0, 80.0, 20.0, 20.0, 0.2, 0.05],
        ];
        let dets = parse_detections(&rows, &IDENTITY, 0.2);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].rect.left, 70.0);
    }

    #[test]
    fn test_parse_detections_skips_rows_without_scores() {
        let rows = vec![vec![50.0, 50.0, 20.0, 20.0]];
        assert!(parse_detections(&rows, &IDENTITY, 0.0).is_empty());
    }

    #[test]
    fn test_parse_names_metadata() {
        let names = parse_names_metadata("{0: 'Hardhat', 1: 'Mask', 2: 'NO-Hardhat'}");
        assert_eq!(names, vec!["Hardhat", "Mask", "NO-Hardhat"]);
    }

    #[test]
    fn test_parse_names_metadata_fills_gaps() {
        let names = parse_names_metadata("{2: \"vest\", 0: \"helmet\"}");
        assert_eq!(names, vec!["helmet", "class1", "vest"]);
    }

    #[test]
    fn test_parse_names_metadata_garbage_is_empty() {
        assert!(parse_names_metadata("not a dict").is_empty());
    }

    #[test]
    fn test_load_labels_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        fs::write(&path, "Hardhat\n\n  Mask  \nPerson\n").unwrap();
        assert_eq!(load_labels(&path).unwrap(), vec!["Hardhat", "Mask", "Person"]);
    }
}
