use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use siteguard_core::association::associator::{Associator, MatchPolicy};
use siteguard_core::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use siteguard_core::equipment::infrastructure::onnx_equipment_detector::{
    load_labels, OnnxEquipmentDetector,
};
use siteguard_core::pipeline::perception_loop::{LoopConfig, PerceptionLoop};
use siteguard_core::pipeline::pipeline_logger::LogPipelineLogger;
use siteguard_core::publishing::event_bus::EventBus;
use siteguard_core::publishing::frame_annotator::{find_system_font, load_font, FrameAnnotator};
use siteguard_core::publishing::frame_publisher::FramePublisher;
use siteguard_core::recognition::domain::identity_recognizer::IdentityRecognizer;
use siteguard_core::recognition::infrastructure::gallery_loader::load_gallery;
use siteguard_core::recognition::infrastructure::onnx_face_embedder::OnnxFaceEmbedder;
use siteguard_core::recognition::infrastructure::onnx_face_locator::OnnxFaceLocator;
use siteguard_core::reporting::infrastructure::directory_dispatcher::{
    DirectoryDispatcher, DispatchPolicy,
};
use siteguard_core::reporting::infrastructure::http_directory_client::HttpDirectoryClient;
use siteguard_core::reporting::state_reporter::StateReporter;
use siteguard_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, FACE_MODEL_NAME, FACE_MODEL_URL,
};
use siteguard_core::shared::model_resolver;
use siteguard_core::shared::monitor_config::MonitorConfig;

/// Watch a camera for known people and report whether they wear a hardhat.
#[derive(Parser, Debug)]
#[command(name = "siteguard")]
struct Cli {
    /// JSON config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera device, file, or stream URL.
    #[arg(long)]
    camera: Option<String>,

    /// ffmpeg input format for the camera (e.g. v4l2, avfoundation).
    #[arg(long)]
    input_format: Option<String>,

    /// Directory of reference images named after each person.
    #[arg(long)]
    gallery: Option<PathBuf>,

    /// Equipment detector ONNX model.
    #[arg(long)]
    equipment_model: Option<PathBuf>,

    /// Class names for the equipment model, one per line.
    #[arg(long)]
    equipment_labels: Option<PathBuf>,

    /// Face locator ONNX model (downloaded if omitted).
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// Face embedding ONNX model (downloaded if omitted).
    #[arg(long)]
    embedding_model: Option<PathBuf>,

    /// Directory searched for bundled models before downloading.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Minimum equipment detection confidence (0.0-1.0).
    #[arg(long)]
    confidence_floor: Option<f64>,

    /// Maximum embedding distance accepted as a match.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Equipment class that counts as equipped (substring, case-insensitive).
    #[arg(long)]
    equipment_class: Option<String>,

    /// How to pick among overlapping boxes: first-match or largest-overlap.
    #[arg(long, value_parser = parse_policy)]
    match_policy: Option<MatchPolicy>,

    /// Base URL of the personnel directory.
    #[arg(long)]
    directory_url: Option<String>,

    /// Run recognition and equipment detection one after the other.
    #[arg(long)]
    sequential: bool,

    /// Keep writing the latest annotated frame to this JPEG file.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// TrueType font for face labels.
    #[arg(long)]
    label_font: Option<PathBuf>,

    /// How often to refresh the snapshot.
    #[arg(long, default_value = "500")]
    snapshot_interval_ms: u64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let recognizer = build_recognizer(&cli, &config)?;
    let equipment_model = config
        .equipment_model
        .as_deref()
        .ok_or("An equipment model is required (--equipment-model)")?;
    let labels = config
        .equipment_labels
        .as_deref()
        .map(load_labels)
        .transpose()?;
    let detector = OnnxEquipmentDetector::new(equipment_model, labels, config.confidence_floor)?;

    let client = HttpDirectoryClient::new(&config.directory_url, config.directory_timeout())?;
    let dispatcher = DirectoryDispatcher::spawn(
        Arc::new(client),
        DispatchPolicy {
            capacity: config.directory_queue,
            attempts: config.directory_attempts,
            flush_timeout: config.directory_flush(),
            ..DispatchPolicy::default()
        },
    );

    let bus = EventBus::new();
    let events = bus.subscribe();
    let publisher = Arc::new(FramePublisher::new(config.jpeg_quality));

    let mut perception = PerceptionLoop::new(
        Box::new(FfmpegCamera::new(
            config.camera.clone(),
            config.input_format.clone(),
        )),
        recognizer,
        Box::new(detector),
        Associator::new(config.equipment_class.clone(), config.match_policy),
        StateReporter::new(bus, dispatcher),
        Arc::clone(&publisher),
        LoopConfig {
            retry_backoff: config.retry_backoff(),
            startup_attempts: config.startup_attempts,
            parallel_inference: config.parallel_inference,
        },
    )?
    .with_annotator(build_annotator(&config)?)
    .with_logger(Box::new(LogPipelineLogger::default()));

    log::info!("Watching {}", config.camera);
    let cancel = Arc::new(AtomicBool::new(false));
    let interrupt = Arc::clone(&cancel);
    ctrlc::set_handler(move || request_stop(&interrupt))?;
    let loop_cancel = Arc::clone(&cancel);
    let worker = thread::Builder::new()
        .name("perception".into())
        .spawn(move || perception.run(&loop_cancel))?;

    let interval = Duration::from_millis(cli.snapshot_interval_ms.max(10));
    let mut last_snapshot = Instant::now();
    loop {
        match events.recv_timeout(interval) {
            Ok(event) => log::info!("{} ({})", event.tag(), event.name()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if let Some(path) = &cli.snapshot {
            if last_snapshot.elapsed() >= interval {
                last_snapshot = Instant::now();
                if let Err(e) = write_snapshot(&publisher, path) {
                    log::warn!("Failed to write snapshot {}: {e}", path.display());
                }
            }
        }
        if worker.is_finished() {
            break;
        }
    }

    worker
        .join()
        .map_err(|_| "Perception loop panicked")??;
    Ok(())
}

/// Config file (or defaults), then command-line overrides.
fn build_config(cli: &Cli) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };

    if let Some(camera) = &cli.camera {
        config.camera = camera.clone();
        // An explicit file or URL should not be forced through a device demuxer.
        if cli.input_format.is_none() && !looks_like_device(camera) {
            config.input_format = None;
        }
    }
    if let Some(format) = &cli.input_format {
        config.input_format = Some(format.clone()).filter(|f| !f.is_empty());
    }
    if let Some(dir) = &cli.gallery {
        config.gallery_dir = dir.clone();
    }
    if let Some(path) = &cli.equipment_model {
        config.equipment_model = Some(path.clone());
    }
    if let Some(path) = &cli.equipment_labels {
        config.equipment_labels = Some(path.clone());
    }
    if let Some(path) = &cli.face_model {
        config.face_model = Some(path.clone());
    }
    if let Some(path) = &cli.embedding_model {
        config.embedding_model = Some(path.clone());
    }
    if let Some(floor) = cli.confidence_floor {
        config.confidence_floor = floor;
    }
    if let Some(tolerance) = cli.tolerance {
        config.match_tolerance = tolerance;
    }
    if let Some(class) = &cli.equipment_class {
        config.equipment_class = class.clone();
    }
    if let Some(policy) = cli.match_policy {
        config.match_policy = policy;
    }
    if let Some(url) = &cli.directory_url {
        config.directory_url = url.clone();
    }
    if cli.sequential {
        config.parallel_inference = false;
    }
    if let Some(path) = &cli.label_font {
        config.label_font = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

fn build_recognizer(
    cli: &Cli,
    config: &MonitorConfig,
) -> Result<IdentityRecognizer, Box<dyn std::error::Error>> {
    let bundled = cli.models_dir.as_deref();
    let face_model = match &config.face_model {
        Some(path) => path.clone(),
        None => model_resolver::resolve(FACE_MODEL_NAME, FACE_MODEL_URL, bundled)?,
    };
    let embedding_model = match &config.embedding_model {
        Some(path) => path.clone(),
        None => model_resolver::resolve(EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, bundled)?,
    };

    let mut locator = OnnxFaceLocator::new(&face_model, config.face_confidence)?;
    let mut embedder = OnnxFaceEmbedder::new(&embedding_model)?;
    let gallery = load_gallery(&config.gallery_dir, &mut locator, &mut embedder)?;

    Ok(IdentityRecognizer::new(
        Box::new(locator),
        Box::new(embedder),
        Arc::new(gallery),
        config.match_tolerance,
    ))
}

/// A configured font must load; otherwise fall back to a system font, or
/// to labels without text.
fn build_annotator(config: &MonitorConfig) -> Result<FrameAnnotator, Box<dyn std::error::Error>> {
    let font = match &config.label_font {
        Some(path) => Some(load_font(path)?),
        None => find_system_font(),
    };
    Ok(match font {
        Some(font) => FrameAnnotator::default().with_font(font),
        None => {
            log::warn!("No label font found, face labels will have no text (see --label-font)");
            FrameAnnotator::default()
        }
    })
}

/// First interrupt asks the loop to stop and flush; a second one exits at once.
fn request_stop(cancel: &AtomicBool) {
    if cancel.swap(true, Ordering::SeqCst) {
        log::warn!("Interrupted again, exiting without flushing");
        process::exit(130);
    }
    log::info!("Stopping, flushing pending directory updates");
}

/// Replace `path` with the latest frame. Returns `false` before the first frame.
fn write_snapshot(publisher: &FramePublisher, path: &Path) -> io::Result<bool> {
    let Some(jpeg) = publisher.latest_jpeg() else {
        return Ok(false);
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, jpeg)?;
    fs::rename(&tmp, path)?;
    Ok(true)
}

fn parse_policy(value: &str) -> Result<MatchPolicy, String> {
    match value.replace('_', "-").to_lowercase().as_str() {
        "first-match" => Ok(MatchPolicy::FirstMatch),
        "largest-overlap" => Ok(MatchPolicy::LargestOverlap),
        _ => Err(format!(
            "expected 'first-match' or 'largest-overlap', got '{value}'"
        )),
    }
}

fn looks_like_device(camera: &str) -> bool {
    camera.starts_with("/dev/") || camera.chars().all(|c| c.is_ascii_digit())
}
