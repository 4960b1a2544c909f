/// One known identity and its reference embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Vec<f32>,
}

/// Fixed list of known identities, loaded once and read-only afterwards.
///
/// May be empty, in which case nothing ever matches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

/// Nearest gallery entry for a query embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct GalleryMatch<'a> {
    pub entry: &'a GalleryEntry,
    pub distance: f64,
}

impl Gallery {
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry with the smallest Euclidean distance to `embedding`.
    ///
    /// Entries whose embedding length differs from the query are ignored.
    /// Ties keep the earliest entry.
    pub fn nearest(&self, embedding: &[f32]) -> Option<GalleryMatch<'_>> {
        self.entries
            .iter()
            .filter(|e| e.embedding.len() == embedding.len())
            .map(|entry| GalleryMatch {
                entry,
                distance: euclidean_distance(&entry.embedding, embedding),
            })
            .fold(None, |best: Option<GalleryMatch<'_>>, candidate| match best {
                Some(b) if b.distance <= candidate.distance => Some(b),
                _ => Some(candidate),
            })
    }

    /// Nearest entry, accepted only when its distance is under `tolerance`.
    pub fn identify(&self, embedding: &[f32], tolerance: f64) -> Option<GalleryMatch<'_>> {
        self.nearest(embedding).filter(|m| m.distance < tolerance)
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
