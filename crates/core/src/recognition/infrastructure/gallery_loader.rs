use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_locator::FaceLocator;
use crate::recognition::domain::gallery::{Gallery, GalleryEntry};
use crate::shared::constants::GALLERY_EXTENSIONS;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to list gallery directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Builds the gallery from a directory of `<name>.jpg` / `<name>.png` images.
///
/// The identity name is the file stem and the first located face is used as
/// the reference. Images that fail to decode or contain no face are skipped
/// with a warning. A missing directory yields an empty gallery.
pub fn load_gallery(
    dir: &Path,
    locator: &mut dyn FaceLocator,
    embedder: &mut dyn FaceEmbedder,
) -> Result<Gallery, GalleryError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::error!("Gallery directory '{}' does not exist", dir.display());
            return Ok(Gallery::default());
        }
        Err(source) => {
            return Err(GalleryError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_gallery_image(p))
        .collect();
    paths.sort();

    let mut entries = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        log::info!("Loading image: {}", path.display());
        match encode_image(path, index, locator, embedder) {
            Ok(Some(embedding)) => entries.push(GalleryEntry {
                name: name.to_string(),
                embedding,
            }),
            Ok(None) => log::warn!("No face found in {}", path.display()),
            Err(e) => log::warn!("Skipping {}: {e}", path.display()),
        }
    }

    if entries.is_empty() {
        log::warn!("No known faces loaded");
    } else {
        log::info!("Loaded {} known faces", entries.len());
    }
    Ok(Gallery::new(entries))
}

fn encode_image(
    path: &Path,
    index: usize,
    locator: &mut dyn FaceLocator,
    embedder: &mut dyn FaceEmbedder,
) -> Result<Option<Vec<f32>>, Box<dyn std::error::Error>> {
    let image = image::open(path)?.to_rgb8();
    let frame = Frame::from_rgb_image(image, index);
    let Some(face) = locator.locate(&frame)?.into_iter().next() else {
        return Ok(None);
    };
    Ok(Some(embedder.embed(&frame, &face)?))
}

fn is_gallery_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| GALLERY_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
