//! Error types for single-image inference runs

use crate::geometry::ClassificationError;
use thiserror::Error;

/// Result type alias for inference runs
pub type Result<T> = std::result::Result<T, InferError>;

/// Which side of the model a tensor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TensorRole {
    Input,
    Output,
}

impl std::fmt::Display for TensorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Every failure of a run is fatal; the variants mirror the stage that failed.
#[derive(Error, Debug)]
pub enum InferError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrong argument count or unparsable option
    #[error("Argument error: {0}")]
    Argument(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model file missing or unparsable
    #[error("Failed to load model '{path}': {message}")]
    ModelLoad { path: String, message: String },

    /// Hardware delegate unavailable or misconfigured
    #[error("Delegate error: {0}")]
    Delegate(String),

    /// Session creation, graph modification or tensor allocation failure
    #[error("Interpreter error: {0}")]
    Interpreter(String),

    /// The model does not expose exactly one tensor on one side
    #[error("expected only 1 {role} tensor, got {actual}")]
    TensorCount { role: TensorRole, actual: usize },

    /// A tensor shape could not be interpreted as an image
    #[error("failed to extract image dimensions of {role} tensor: {source}")]
    Classification {
        role: TensorRole,
        #[source]
        source: ClassificationError,
    },

    /// Any other shape problem (dynamic axes, produced shape disagreement)
    #[error("Shape error: {0}")]
    Shape(String),

    /// The input image could not be decoded
    #[error("failed to open image '{path}': {message}")]
    ImageDecode { path: String, message: String },

    /// The decoded image does not have the geometry the input tensor expects
    #[error(
        "input image {path} does not match dimension of input tensor: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}"
    )]
    DimensionMismatch {
        path: String,
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    /// A copy into or out of tensor storage had the wrong length
    #[error("byte size mismatch: tensor holds {expected} bytes, got {actual}")]
    ByteSizeMismatch { expected: usize, actual: usize },

    /// Pixel conversion is not defined for this tensor element type
    #[error("unsupported tensor element type for image data: {0}")]
    UnsupportedElementType(String),

    /// The output image could not be written
    #[error("Failed to write output to '{path}': {message}")]
    ImageEncode { path: String, message: String },

    /// Forward pass failure
    #[error("Inference error: {0}")]
    Inference(String),
}

impl InferError {
    /// Create a new argument error
    pub fn argument<S: Into<String>>(msg: S) -> Self {
        Self::Argument(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model load error
    pub fn model_load<P: AsRef<std::path::Path>, S: Into<String>>(path: P, msg: S) -> Self {
        Self::ModelLoad {
            path: path.as_ref().display().to_string(),
            message: msg.into(),
        }
    }

    /// Create a new delegate error
    pub fn delegate<S: Into<String>>(msg: S) -> Self {
        Self::Delegate(msg.into())
    }

    /// Create a new interpreter error
    pub fn interpreter<S: Into<String>>(msg: S) -> Self {
        Self::Interpreter(msg.into())
    }

    /// Create a new shape error
    pub fn shape<S: Into<String>>(msg: S) -> Self {
        Self::Shape(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create an image decode error for a path
    pub fn image_decode<P: AsRef<std::path::Path>, S: Into<String>>(path: P, msg: S) -> Self {
        Self::ImageDecode {
            path: path.as_ref().display().to_string(),
            message: msg.into(),
        }
    }

    /// Create an image encode error for a path
    pub fn image_encode<P: AsRef<std::path::Path>, S: Into<String>>(path: P, msg: S) -> Self {
        Self::ImageEncode {
            path: path.as_ref().display().to_string(),
            message: msg.into(),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Short name of the failing stage, used in diagnostics
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Argument(_) => "arguments",
            Self::InvalidConfig(_) => "configuration",
            Self::ModelLoad { .. } => "model-load",
            Self::Delegate(_) => "delegate",
            Self::Interpreter(_) => "interpreter",
            Self::TensorCount { .. } | Self::Classification { .. } | Self::Shape(_) => "shape",
            Self::ImageDecode { .. }
            | Self::DimensionMismatch { .. }
            | Self::ByteSizeMismatch { .. }
            | Self::UnsupportedElementType(_)
            | Self::ImageEncode { .. } => "image-io",
            Self::Inference(_) => "inference",
        }
    }
}
