use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::recognition::domain::identity_recognizer::{IdentityRecognizer, RecognizedFace};
use crate::shared::frame::Frame;
use crate::shared::inference::InferenceError;

type Recognition = Result<Vec<RecognizedFace>, InferenceError>;

/// Long-lived thread that owns the identity recognizer.
///
/// One frame in flight at a time: every `submit` must be followed by a
/// `collect` before the next `submit`. The worker drops its handle on the
/// frame before replying, so the caller gets sole ownership back.
pub struct RecognitionWorker {
    frames: Option<Sender<Arc<Frame>>>,
    results: Receiver<Recognition>,
    handle: Option<JoinHandle<()>>,
}

impl RecognitionWorker {
    pub fn spawn(mut recognizer: IdentityRecognizer) -> io::Result<Self> {
        let (frames, frame_rx) = crossbeam_channel::bounded::<Arc<Frame>>(1);
        let (result_tx, results) = crossbeam_channel::bounded::<Recognition>(1);
        let handle = thread::Builder::new()
            .name("recognition".into())
            .spawn(move || {
                for frame in frame_rx {
                    let result = recognizer.recognize(&frame);
                    drop(frame);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            frames: Some(frames),
            results,
            handle: Some(handle),
        })
    }

    /// Hand a frame to the worker. Fails if the worker has stopped.
    pub fn submit(&self, frame: Arc<Frame>) -> Result<(), InferenceError> {
        self.frames
            .as_ref()
            .ok_or_else(stopped)?
            .send(frame)
            .map_err(|_| stopped())
    }

    /// Wait for the result of the last submitted frame.
    pub fn collect(&self) -> Recognition {
        self.results.recv().map_err(|_| stopped())?
    }
}

impl Drop for RecognitionWorker {
    fn drop(&mut self) {
        self.frames.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Recognition worker panicked");
            }
        }
    }
}

fn stopped() -> InferenceError {
    InferenceError::Output("recognition worker stopped".into())
}
