pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Label given to faces that resolve to no gallery identity.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Equipment class substring that counts as "equipped".
pub const DEFAULT_EQUIPMENT_CLASS: &str = "hardhat";

/// Minimum detector confidence for an equipment box to be considered.
pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.2;

/// Minimum face locator confidence.
pub const DEFAULT_FACE_CONFIDENCE: f64 = 0.5;

/// Maximum Euclidean distance between L2-normalized embeddings for a match.
///
/// 1.0 corresponds to a cosine similarity of 0.5.
pub const DEFAULT_MATCH_TOLERANCE: f64 = 1.0;

/// Delay between camera reads after a failed acquisition.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Failed reads tolerated before the first frame arrives (~5 s at the default backoff).
pub const DEFAULT_STARTUP_ATTEMPTS: u32 = 50;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

pub const GALLERY_EXTENSIONS: &[&str] = &["jpg", "png"];
