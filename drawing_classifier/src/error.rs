use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for every fallible operation of the toolkit.
#[derive(Error, Debug)]
pub enum Error {
    /// The input table or one of its drawings does not have the expected shape.
    #[error("invalid drawing input: {0}")]
    InvalidDrawingInput(String),

    /// `evaluate` was asked for a metric it does not know.
    #[error("unsupported metric `{0}`; expected `auto`, `accuracy`, `auc`, `precision`, `recall`, `f1_score`, `confusion_matrix` or `roc_curve`")]
    UnsupportedMetric(String),

    /// A training or prediction option is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A saved or exported model cannot be used by this version.
    #[error("incompatible model: {0}")]
    IncompatibleModel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidDrawingInput(msg.into())
    }
}
