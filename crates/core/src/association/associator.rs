use serde::{Deserialize, Serialize};

use crate::equipment::domain::equipment_detector::DetectionBox;
use crate::recognition::domain::identity_recognizer::RecognizedFace;
use crate::shared::rect::Rect;

/// How to choose among several equipment boxes overlapping one face.
///
/// The result for a face is the same boolean under either policy; the
/// policy decides which box is credited, which matters to annotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// First overlapping equipment-class box in detector order.
    #[default]
    FirstMatch,
    /// Overlapping equipment-class box with the largest intersection area,
    /// ties broken by higher confidence.
    LargestOverlap,
}

/// Per-identity association outcome for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Association {
    pub name: String,
    pub equipped: bool,
    /// Index into the frame's detections of the credited equipment box.
    pub equipment: Option<usize>,
}

/// Joins recognized faces with equipment detections from the same frame.
pub struct Associator {
    equipment_class: String,
    policy: MatchPolicy,
}

impl Associator {
    pub fn new(equipment_class: impl Into<String>, policy: MatchPolicy) -> Self {
        Self {
            equipment_class: equipment_class.into(),
            policy,
        }
    }

    /// One association per known face; unknown faces are left out.
    pub fn associate(
        &self,
        faces: &[RecognizedFace],
        detections: &[DetectionBox],
    ) -> Vec<Association> {
        faces
            .iter()
            .filter_map(|f| {
                let name = f.identity.name()?;
                let equipment = self.credited_equipment(&f.face.rect, detections);
                Some(Association {
                    name: name.to_string(),
                    equipped: equipment.is_some(),
                    equipment,
                })
            })
            .collect()
    }

    /// Index of the equipment box credited to `face`, if any overlaps it.
    ///
    /// Only boxes with a non-empty intersection count; boxes that merely
    /// touch the face edge do not.
    pub fn credited_equipment(&self, face: &Rect, detections: &[DetectionBox]) -> Option<usize> {
        let mut candidates = detections
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_class(&self.equipment_class))
            .filter_map(|(i, d)| {
                let area = face.intersection_area(&d.rect);
                (area > 0.0).then_some((i, area, d.confidence))
            });

        match self.policy {
            MatchPolicy::FirstMatch => candidates.next().map(|(i, _, _)| i),
            MatchPolicy::LargestOverlap => candidates
                .fold(None, |best: Option<(usize, f64, f64)>, c| match best {
                    Some(b) if (b.1, b.2) >= (c.1, c.2) => Some(b),
                    _ => Some(c),
                })
                .map(|(i, _, _)| i),
        }
    }
}
