use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use thiserror::Error;

use crate::association::associator::Associator;
use crate::capture::domain::frame_source::FrameSource;
use crate::equipment::domain::equipment_detector::{DetectionBox, EquipmentDetector};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::recognition_worker::RecognitionWorker;
use crate::publishing::frame_annotator::FrameAnnotator;
use crate::publishing::frame_publisher::FramePublisher;
use crate::recognition::domain::identity_recognizer::{IdentityRecognizer, RecognizedFace};
use crate::reporting::domain::change_event::ChangeEvent;
use crate::reporting::state_reporter::StateReporter;
use crate::shared::constants::{DEFAULT_RETRY_BACKOFF_MS, DEFAULT_STARTUP_ATTEMPTS};
use crate::shared::frame::Frame;
use crate::shared::inference::InferenceError;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StartupError {
    #[error("camera unavailable after {attempts} attempts")]
    CameraUnavailable { attempts: u32 },
}

#[derive(Clone, Copy, Debug)]
pub struct LoopConfig {
    /// Pause after a failed camera read.
    pub retry_backoff: Duration,
    /// Reads allowed before the first frame; exceeding it fails startup.
    pub startup_attempts: u32,
    /// Run recognition on its own worker thread, alongside equipment
    /// detection on the loop thread.
    pub parallel_inference: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            startup_attempts: DEFAULT_STARTUP_ATTEMPTS,
            parallel_inference: true,
        }
    }
}

/// Outcome of one loop iteration.
#[derive(Debug, PartialEq)]
pub enum StepOutcome {
    Processed {
        faces: usize,
        detections: usize,
        events: Vec<ChangeEvent>,
    },
    /// Inference failed; the frame was dropped.
    Skipped,
    /// The camera gave no frame; the loop backed off.
    NoFrame,
}

enum RecognitionStage {
    Inline(IdentityRecognizer),
    Worker(RecognitionWorker),
}

/// Acquire, infer, associate, report, annotate, publish.
///
/// Per-frame failures never end the loop. Only a camera that yields no
/// frame at all within `startup_attempts` reads is surfaced, as a
/// `StartupError`.
pub struct PerceptionLoop {
    source: Box<dyn FrameSource>,
    recognition: RecognitionStage,
    detector: Box<dyn EquipmentDetector>,
    associator: Associator,
    reporter: StateReporter,
    annotator: FrameAnnotator,
    publisher: Arc<FramePublisher>,
    logger: Box<dyn PipelineLogger>,
    config: LoopConfig,
    frames: usize,
    consecutive_failures: u32,
}

impl PerceptionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        recognizer: IdentityRecognizer,
        detector: Box<dyn EquipmentDetector>,
        associator: Associator,
        reporter: StateReporter,
        publisher: Arc<FramePublisher>,
        config: LoopConfig,
    ) -> io::Result<Self> {
        let recognition = if config.parallel_inference {
            RecognitionStage::Worker(RecognitionWorker::spawn(recognizer)?)
        } else {
            RecognitionStage::Inline(recognizer)
        };
        Ok(Self {
            source,
            recognition,
            detector,
            associator,
            reporter,
            annotator: FrameAnnotator::default(),
            publisher,
            logger: Box::new(NullPipelineLogger),
            config,
            frames: 0,
            consecutive_failures: 0,
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_annotator(mut self, annotator: FrameAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn reporter(&self) -> &StateReporter {
        &self.reporter
    }

    /// Run until `cancel` is set. Returns early only on startup failure.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<(), StartupError> {
        let Some(first) = self.wait_for_first_frame(cancel)? else {
            self.finish();
            return Ok(());
        };
        self.logger.info(&format!(
            "Camera ready ({}x{}), monitoring",
            first.width(),
            first.height()
        ));
        self.process(first);

        while !cancel.load(Ordering::Relaxed) {
            self.step();
        }
        self.finish();
        Ok(())
    }

    /// Read until a frame arrives, backing off between failures.
    ///
    /// `Ok(None)` means cancellation was requested while waiting.
    pub fn wait_for_first_frame(
        &mut self,
        cancel: &AtomicBool,
    ) -> Result<Option<Frame>, StartupError> {
        let attempts = self.config.startup_attempts.max(1);
        for attempt in 1..=attempts {
            if cancel.load(Ordering::Relaxed) {
                return Ok(None);
            }
            if let Some(frame) = self.acquire() {
                return Ok(Some(frame));
            }
            if attempt < attempts {
                thread::sleep(self.config.retry_backoff);
            }
        }
        log::error!("No frame from camera after {attempts} attempts");
        Err(StartupError::CameraUnavailable { attempts })
    }

    /// One iteration: acquire a frame and process it, or back off.
    pub fn step(&mut self) -> StepOutcome {
        match self.acquire() {
            Some(frame) => self.process(frame),
            None => {
                thread::sleep(self.config.retry_backoff);
                StepOutcome::NoFrame
            }
        }
    }

    /// Run everything after acquisition on one frame.
    pub fn process(&mut self, frame: Frame) -> StepOutcome {
        let t = Instant::now();
        let index = frame.index();
        let (mut annotated, inferred) = self.infer(frame);
        let (faces, detections) = match inferred {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Skipping frame {index}: {e}");
                return StepOutcome::Skipped;
            }
        };
        self.logger.timing("inference", elapsed_ms(t));
        self.logger.metric("faces", faces.len() as f64);
        self.logger.metric("detections", detections.len() as f64);

        let t = Instant::now();
        let associations = self.associator.associate(&faces, &detections);
        self.logger.timing("associate", elapsed_ms(t));

        let t = Instant::now();
        let events = self.reporter.report(&associations, SystemTime::now());
        self.logger.timing("report", elapsed_ms(t));

        let t = Instant::now();
        self.annotator
            .annotate(&mut annotated, &faces, &associations, &detections);
        self.publisher.publish(annotated);
        self.logger.timing("publish", elapsed_ms(t));

        self.frames += 1;
        self.logger.progress(self.frames);

        StepOutcome::Processed {
            faces: faces.len(),
            detections: detections.len(),
            events,
        }
    }

    fn acquire(&mut self) -> Option<Frame> {
        let t = Instant::now();
        match self.source.read() {
            Ok(frame) => {
                if self.consecutive_failures > 0 {
                    log::info!(
                        "Camera recovered after {} failed reads",
                        self.consecutive_failures
                    );
                    self.consecutive_failures = 0;
                }
                self.logger.timing("capture", elapsed_ms(t));
                Some(frame)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                log::warn!(
                    "Camera read failed ({} in a row): {e}",
                    self.consecutive_failures
                );
                None
            }
        }
    }

    /// Run both models on `frame` and hand the frame back for annotation.
    fn infer(&mut self, frame: Frame) -> (Frame, Result<Inferred, InferenceError>) {
        let worker = match &mut self.recognition {
            RecognitionStage::Inline(recognizer) => {
                let result = recognizer
                    .recognize(&frame)
                    .and_then(|faces| Ok((faces, self.detector.detect(&frame)?)));
                return (frame, result);
            }
            RecognitionStage::Worker(worker) => worker,
        };

        let shared = Arc::new(frame);
        if let Err(e) = worker.submit(Arc::clone(&shared)) {
            return (unshare(shared), Err(e));
        }
        let detections = self.detector.detect(&shared);
        let faces = worker.collect();
        let result = faces.and_then(|faces| Ok((faces, detections?)));
        (unshare(shared), result)
    }

    fn finish(&mut self) {
        self.logger.summary();
        self.reporter.shutdown();
    }
}

type Inferred = (Vec<RecognizedFace>, Vec<DetectionBox>);

/// The worker releases its handle before replying, so this rarely copies.
fn unshare(frame: Arc<Frame>) -> Frame {
    Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone())
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
