use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("directory returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
}

/// External system of record for personnel and their equipped status.
///
/// Calls are best effort and may block on network I/O, so callers on the
/// perception path go through the directory dispatcher instead.
pub trait DirectoryClient: Send + Sync {
    fn register_identity(&self, name: &str) -> Result<(), DirectoryError>;

    fn set_equipped(&self, name: &str, equipped: bool) -> Result<(), DirectoryError>;
}
