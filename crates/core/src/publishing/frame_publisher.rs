use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::shared::frame::Frame;

/// An annotated frame as handed to viewers, with its JPEG encoding
/// computed on first request and shared by every later reader.
pub struct PublishedFrame {
    frame: Frame,
    quality: u8,
    jpeg: OnceLock<Option<Vec<u8>>>,
}

impl PublishedFrame {
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn jpeg(&self) -> Option<&[u8]> {
        self.jpeg
            .get_or_init(|| match encode_jpeg(&self.frame, self.quality) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!("Failed to encode frame {}: {e}", self.frame.index());
                    None
                }
            })
            .as_deref()
    }
}

/// Single-slot holder of the most recent annotated frame.
///
/// `publish` overwrites the slot and never waits on readers. Readers get
/// whatever is freshest at the time of the read; intermediate frames may
/// never be seen.
pub struct FramePublisher {
    latest: Mutex<Option<Arc<PublishedFrame>>>,
    quality: u8,
}

impl FramePublisher {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            latest: Mutex::new(None),
            quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn publish(&self, frame: Frame) {
        let published = Arc::new(PublishedFrame {
            frame,
            quality: self.quality,
            jpeg: OnceLock::new(),
        });
        *self.lock() = Some(published);
    }

    /// The latest frame, or `None` before the first publish.
    pub fn latest(&self) -> Option<Arc<PublishedFrame>> {
        self.lock().clone()
    }

    /// JPEG bytes of the latest frame. Encoding happens outside the lock.
    pub fn latest_jpeg(&self) -> Option<Vec<u8>> {
        self.latest()?.jpeg().map(<[u8]>::to_vec)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<PublishedFrame>>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let color = match frame.channels() {
        1 => ExtendedColorType::L8,
        4 => ExtendedColorType::Rgba8,
        _ => ExtendedColorType::Rgb8,
    };
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).write_image(
        frame.data(),
        frame.width(),
        frame.height(),
        color,
    )?;
    Ok(bytes)
}
