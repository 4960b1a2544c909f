use ndarray::ArrayView3;

use crate::shared::rect::Rect;

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Produced once per acquisition cycle. Format conversion happens at the
/// capture boundary; everything downstream treats pixel data as RGB24.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Edit the pixels in place through an `RgbImage` view.
    ///
    /// Returns `false`, leaving the frame untouched, unless it is RGB24.
    pub fn edit_rgb(&mut self, edit: impl FnOnce(&mut image::RgbImage)) -> bool {
        if self.channels != 3 || self.data.len() != self.shape_len() {
            return false;
        }
        let data = std::mem::take(&mut self.data);
        match image::RgbImage::from_raw(self.width, self.height, data) {
            Some(mut image) => {
                edit(&mut image);
                self.data = image.into_raw();
                true
            }
            None => false,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Frame bounds as a rectangle anchored at the origin.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `rect` (clamped to the frame) into a new frame.
    ///
    /// Returns `None` when the clamped rectangle has no area.
    pub fn crop(&self, rect: &Rect) -> Option<Frame> {
        let clamped = rect.clamp_to(&self.bounds())?;
        let x1 = clamped.left as usize;
        let y1 = clamped.top as usize;
        let x2 = (clamped.right.ceil() as usize).min(self.width as usize);
        let y2 = (clamped.bottom.ceil() as usize).min(self.height as usize);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let channels = self.channels as usize;
        let row_len = (x2 - x1) * channels;
        let mut data = Vec::with_capacity(row_len * (y2 - y1));
        for row in y1..y2 {
            let start = (row * self.width as usize + x1) * channels;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Some(Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            self.index,
        ))
    }

    fn shape_len(&self) -> usize {
        let (h, w, c) = self.shape();
        h * w * c
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
