use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::frame::Frame;

/// Captures frames from a local device or stream URL via ffmpeg-next.
///
/// With an `input_format` (e.g. `v4l2`, `avfoundation`, `dshow`) the source
/// is opened through that capture-device demuxer; without one it is opened
/// like any file or URL. The device is opened lazily and dropped after a
/// failed read, so the next `read` reopens it.
pub struct FfmpegCamera {
    source: String,
    input_format: Option<String>,
    session: Option<CaptureSession>,
    frame_index: usize,
}

// Safety: FfmpegCamera is only used from the perception thread.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn new(source: impl Into<String>, input_format: Option<String>) -> Self {
        Self {
            source: source.into(),
            input_format,
            session: None,
            frame_index: 0,
        }
    }
}

impl FrameSource for FfmpegCamera {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.session.is_none() {
            let opened = CaptureSession::open(&self.source, self.input_format.as_deref())?;
            log::info!(
                "Opened capture source {} ({}x{})",
                self.source,
                opened.width,
                opened.height
            );
            self.session = Some(opened);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(CaptureError::Open(self.source.clone()));
        };

        match session.next_frame(self.frame_index) {
            Ok(frame) => {
                self.frame_index += 1;
                Ok(frame)
            }
            Err(e) => {
                self.session = None;
                Err(e)
            }
        }
    }
}

struct CaptureSession {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

impl CaptureSession {
    fn open(source: &str, input_format: Option<&str>) -> Result<Self, CaptureError> {
        let open_err = |e: ffmpeg_next::Error| CaptureError::Open(format!("{source}: {e}"));

        ffmpeg_next::init().map_err(open_err)?;
        ffmpeg_next::device::register_all();

        let ictx = match input_format {
            Some(name) => {
                let format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == name)
                    .ok_or_else(|| {
                        CaptureError::Open(format!("capture format '{name}' is not available"))
                    })?;
                ffmpeg_next::format::open_with(source, &format, ffmpeg_next::Dictionary::new())
                    .map_err(open_err)?
                    .input()
            }
            None => ffmpeg_next::format::input(&source).map_err(open_err)?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::Open(format!("{source}: no video stream found")))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err)?;
        let decoder = codec_ctx.decoder().video().map_err(open_err)?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        })
    }

    fn next_frame(&mut self, index: usize) -> Result<Frame, CaptureError> {
        loop {
            if let Some(frame) = self.try_receive(index)? {
                return Ok(frame);
            }

            let Some((stream, packet)) = self.ictx.packets().next() else {
                return Err(CaptureError::EndOfStream);
            };
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
        }
    }

    fn try_receive(&mut self, index: usize) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| CaptureError::Read(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        Ok(Some(Frame::new(pixels, self.width, self.height, 3, index)))
    }
}

/// Copy RGB24 rows out of a (possibly padded) ffmpeg frame.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
