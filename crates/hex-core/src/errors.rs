pub type OverlayResult<T> = Result<T, OverlayError>;

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("integer conversion failed: {0}")]
    Conversion(#[from] std::num::TryFromIntError),

    #[error("interchange document error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OverlayError {
    /// True for failures coming from the storage layer.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, OverlayError::Io(_))
    }
}
