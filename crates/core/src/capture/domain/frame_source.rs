use thiserror::Error;

use crate::shared::frame::Frame;

/// Camera acquisition failure.
///
/// Always recoverable from the loop's point of view: the caller backs off
/// and asks again.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open capture source: {0}")]
    Open(String),
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("capture source reached end of stream")]
    EndOfStream,
}

/// Produces frames sequentially from a camera or stream.
///
/// `read` may block waiting for hardware. Implementations are expected to
/// recover internally (e.g. reopen the device) on the call after a failure.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Frame, CaptureError>;
}
