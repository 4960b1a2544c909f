use std::sync::Arc;

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_locator::FaceLocator;
use crate::recognition::domain::gallery::Gallery;
use crate::shared::constants::UNKNOWN_IDENTITY;
use crate::shared::frame::Frame;
use crate::shared::inference::InferenceError;
use crate::shared::rect::Rect;

/// A located face and its embedding, scoped to one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceBox {
    pub rect: Rect,
    pub embedding: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Identity {
    Known { name: String, distance: f64 },
    Unknown,
}

impl Identity {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known { name, .. } => Some(name),
            Identity::Unknown => None,
        }
    }

    /// Display label: the identity name or `"Unknown"`.
    pub fn label(&self) -> &str {
        self.name().unwrap_or(UNKNOWN_IDENTITY)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecognizedFace {
    pub face: FaceBox,
    pub identity: Identity,
}

/// Locates faces, embeds them, and resolves each against the gallery.
///
/// A face resolves to the nearest gallery entry only when that entry's
/// distance is under `tolerance`; otherwise it is `Identity::Unknown`.
/// Faces whose embedding fails are skipped; a locator failure fails the
/// whole frame.
pub struct IdentityRecognizer {
    locator: Box<dyn FaceLocator>,
    embedder: Box<dyn FaceEmbedder>,
    gallery: Arc<Gallery>,
    tolerance: f64,
}

impl IdentityRecognizer {
    pub fn new(
        locator: Box<dyn FaceLocator>,
        embedder: Box<dyn FaceEmbedder>,
        gallery: Arc<Gallery>,
        tolerance: f64,
    ) -> Self {
        Self {
            locator,
            embedder,
            gallery,
            tolerance,
        }
    }

    pub fn recognize(&mut self, frame: &Frame) -> Result<Vec<RecognizedFace>, InferenceError> {
        let rects = self.locator.locate(frame)?;
        let mut faces = Vec::with_capacity(rects.len());

        for rect in rects {
            let embedding = match self.embedder.embed(frame, &rect) {
                Ok(embedding) => embedding,
                Err(e) => {
                    log::warn!(
                        "Skipping face at ({:.0}, {:.0}) in frame {}: {e}",
                        rect.left,
                        rect.top,
                        frame.index()
                    );
                    continue;
                }
            };

            let identity = match self.gallery.identify(&embedding, self.tolerance) {
                Some(m) => Identity::Known {
                    name: m.entry.name.clone(),
                    distance: m.distance,
                },
                None => Identity::Unknown,
            };

            faces.push(RecognizedFace {
                face: FaceBox { rect, embedding },
                identity,
            });
        }

        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::domain::gallery::GalleryEntry;

    // --- Stubs ---

    struct StubLocator {
        faces: Result<Vec<Rect>, String>,
    }

    impl FaceLocator for StubLocator {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<Rect>, InferenceError> {
            self.faces.clone().map_err(InferenceError::Output)
        }
    }

    /// Embeds a face as `[left, top]`; fails for faces at x >= 1000.
    struct PositionEmbedder;

    impl FaceEmbedder for PositionEmbedder {
        fn embed(&mut self, _frame: &Frame, face: &Rect) -> Result<Vec<f32>, InferenceError> {
            if face.left >= 1000.0 {
                return Err(InferenceError::Output("no encoding".into()));
            }
            Ok(vec![face.left as f32, face.top as f32])
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3, 0)
    }

    fn recognizer(faces: Result<Vec<Rect>, String>, gallery: Gallery) -> IdentityRecognizer {
        IdentityRecognizer::new(
            Box::new(StubLocator { faces }),
            Box::new(PositionEmbedder),
            Arc::new(gallery),
            0.6,
        )
    }

    fn entry(name: &str, embedding: &[f32]) -> GalleryEntry {
        GalleryEntry {
            name: name.to_string(),
            embedding: embedding.to_vec(),
        }
    }

    #[test]
    fn test_no_faces_yields_empty() {
        let mut r = recognizer(Ok(vec![]), Gallery::default());
        assert!(r.recognize(&frame()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_gallery_labels_everything_unknown() {
        let faces = vec![
            Rect::new(10.0, 10.0, 50.0, 50.0),
            Rect::new(100.0, 10.0, 150.0, 50.0),
        ];
        let mut r = recognizer(Ok(faces), Gallery::default());

        let result = r.recognize(&frame()).unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|f| f.identity == Identity::Unknown));
        assert!(result.iter().all(|f| f.identity.label() == "Unknown"));
    }

    #[test]
    fn test_match_within_tolerance_resolves_name() {
        let gallery = Gallery::new(vec![entry("bob", &[10.0, 10.0]), entry("eve", &[90.0, 90.0])]);
        let mut r = recognizer(Ok(vec![Rect::new(10.2, 10.0, 50.0, 50.0)]), gallery);

        let result = r.recognize(&frame()).unwrap();

        assert_eq!(result[0].identity.name(), Some("bob"));
        match &result[0].identity {
            Identity::Known { distance, .. } => assert!(*distance < 0.6),
            Identity::Unknown => panic!("expected a match"),
        }
    }

    #[test]
    fn test_nearest_beyond_tolerance_is_unknown() {
        let gallery = Gallery::new(vec![entry("bob", &[10.0, 10.0])]);
        let mut r = recognizer(Ok(vec![Rect::new(12.0, 10.0, 50.0, 50.0)]), gallery);

        let result = r.recognize(&frame()).unwrap();

        assert_eq!(result[0].identity, Identity::Unknown);
    }

    #[test]
    fn test_failed_embedding_skips_only_that_face() {
        let faces = vec![
            Rect::new(1000.0, 0.0, 1050.0, 50.0),
            Rect::new(10.0, 10.0, 50.0, 50.0),
        ];
        let gallery = Gallery::new(vec![entry("bob", &[10.0, 10.0])]);
        let mut r = recognizer(Ok(faces), gallery);

        let result = r.recognize(&frame()).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].identity.name(), Some("bob"));
        assert_eq!(result[0].face.embedding, vec![10.0, 10.0]);
    }

    #[test]
    fn test_locator_failure_fails_frame() {
        let mut r = recognizer(Err("model crashed".into()), Gallery::default());
        assert!(r.recognize(&frame()).is_err());
    }
}
