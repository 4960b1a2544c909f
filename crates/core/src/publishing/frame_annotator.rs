use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;
use thiserror::Error;

use crate::association::associator::Association;
use crate::equipment::domain::equipment_detector::DetectionBox;
use crate::recognition::domain::identity_recognizer::RecognizedFace;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

pub const EQUIPPED_COLOR: [u8; 3] = [0, 200, 0];
pub const UNEQUIPPED_COLOR: [u8; 3] = [220, 0, 0];
pub const UNKNOWN_COLOR: [u8; 3] = [230, 200, 0];
pub const EQUIPMENT_COLOR: [u8; 3] = [0, 90, 255];
/// Equipment box credited to a face by the associator.
pub const CREDITED_EQUIPMENT_COLOR: [u8; 3] = [0, 220, 255];
pub const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];

const DEFAULT_THICKNESS: u32 = 2;
const DEFAULT_LABEL_SCALE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;

const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a usable TrueType/OpenType font")]
    Invalid { path: PathBuf },
}

pub fn load_font(path: &Path) -> Result<FontArc, FontError> {
    let bytes = fs::read(path).map_err(|source| FontError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FontArc::try_from_vec(bytes).map_err(|_| FontError::Invalid {
        path: path.to_path_buf(),
    })
}

/// First loadable font among the usual system locations.
pub fn find_system_font() -> Option<FontArc> {
    SYSTEM_FONT_PATHS
        .iter()
        .map(Path::new)
        .filter(|path| path.is_file())
        .find_map(|path| match load_font(path) {
            Ok(font) => {
                log::debug!("Using label font {}", path.display());
                Some(font)
            }
            Err(e) => {
                log::debug!("Skipping font: {e}");
                None
            }
        })
}

/// Draws detections and identity labels onto frames for viewers.
///
/// Each face gets an outline in its status color with a label tab above
/// it. Without a font the tab is drawn but carries no text.
pub struct FrameAnnotator {
    thickness: u32,
    font: Option<FontArc>,
    label_scale: PxScale,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_THICKNESS)
    }
}

impl FrameAnnotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            thickness: thickness.max(1),
            font: None,
            label_scale: PxScale::from(DEFAULT_LABEL_SCALE),
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Outline equipment boxes, then every face with its label.
    ///
    /// `associations` must come from `faces` in order; unknown faces have no
    /// association and are drawn in the unknown color. Boxes credited by an
    /// association are drawn thicker and in their own color.
    pub fn annotate(
        &self,
        frame: &mut Frame,
        faces: &[RecognizedFace],
        associations: &[Association],
        detections: &[DetectionBox],
    ) {
        let credited: Vec<usize> = associations.iter().filter_map(|a| a.equipment).collect();
        let index = frame.index();

        let edited = frame.edit_rgb(|image| {
            let (credited_boxes, plain_boxes): (Vec<_>, Vec<_>) = detections
                .iter()
                .enumerate()
                .partition(|(i, _)| credited.contains(i));
            for (_, d) in plain_boxes {
                outline(image, &d.rect, EQUIPMENT_COLOR, 1);
            }
            for (_, d) in credited_boxes {
                outline(image, &d.rect, CREDITED_EQUIPMENT_COLOR, self.thickness);
            }

            let mut associations = associations.iter();
            for f in faces {
                let color = if f.identity.name().is_none() {
                    UNKNOWN_COLOR
                } else {
                    match associations.next() {
                        Some(a) if a.equipped => EQUIPPED_COLOR,
                        _ => UNEQUIPPED_COLOR,
                    }
                };
                outline(image, &f.face.rect, color, self.thickness);
                self.label(image, &f.face.rect, f.identity.label(), color);
            }
        });

        if !edited {
            log::debug!("Frame {index} is not RGB24, left unannotated");
        }
    }

    /// Filled tab above `face` (inside its top edge when there is no room),
    /// with `text` on it when a font is available.
    fn label(&self, image: &mut RgbImage, face: &Rect, text: &str, color: [u8; 3]) {
        let Some((x, y, _, _)) = pixel_span(image, face) else {
            return;
        };
        let (text_w, text_h) = self.text_extent(text);
        let tab_w = (text_w + 2 * LABEL_PADDING).min(image.width() - x);
        let tab_h = text_h + 2 * LABEL_PADDING;
        let tab_y = if y >= tab_h { y - tab_h } else { y };

        draw_filled_rect_mut(
            image,
            PixelRect::at(x as i32, tab_y as i32).of_size(tab_w.max(1), tab_h),
            Rgb(color),
        );
        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                Rgb(LABEL_TEXT_COLOR),
                (x + LABEL_PADDING) as i32,
                (tab_y + LABEL_PADDING) as i32,
                self.label_scale,
                font,
                text,
            );
        }
    }

    fn text_extent(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(self.label_scale, font, text),
            None => {
                // Average advance of a proportional sans face.
                let width = text.chars().count() as f32 * self.label_scale.x * 0.6;
                (width.ceil() as u32, self.label_scale.y.ceil() as u32)
            }
        }
    }
}

/// Rectangle outline `thickness` pixels wide, drawn inward and clipped to
/// the image.
fn outline(image: &mut RgbImage, rect: &Rect, color: [u8; 3], thickness: u32) {
    let Some((x, y, w, h)) = pixel_span(image, rect) else {
        return;
    };
    for i in 0..thickness {
        if w <= 2 * i || h <= 2 * i {
            break;
        }
        let ring = PixelRect::at((x + i) as i32, (y + i) as i32).of_size(w - 2 * i, h - 2 * i);
        draw_hollow_rect_mut(image, ring, Rgb(color));
    }
}

/// Pixel columns and rows covered by `rect` once clamped to the image, as
/// `(x, y, width, height)`.
fn pixel_span(image: &RgbImage, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = image.dimensions();
    let r = rect.clamp_to(&Rect::new(0.0, 0.0, width as f64, height as f64))?;
    let x0 = r.left.floor() as u32;
    let y0 = r.top.floor() as u32;
    let x1 = (r.right.ceil() as u32).min(width);
    let y1 = (r.bottom.ceil() as u32).min(height);
    (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
}
