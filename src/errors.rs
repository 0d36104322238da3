use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the raster segmentation toolkit.
///
/// # Why structured errors
///
/// Each variant captures context specific to its error domain (filesystem,
/// raster I/O, model inference, configuration), providing detailed diagnostic
/// information without requiring callers to parse error strings. The thiserror
/// crate generates Display implementations automatically from format strings,
/// reducing boilerplate while maintaining type safety.
#[derive(Error, Debug)]
pub enum GeoSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Raster error: {operation} failed (file: {path})")]
    Raster {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Ground truth and prediction rasters disagree on their pixel grid.
    /// Raised before any IoU is computed; raster/vector outputs already
    /// written stay on disk.
    #[error("Shape mismatch: ground truth {expected:?} and prediction {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("CSV error: {operation} failed (file: {path})")]
    Csv {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, GeoSegError>;

/// Convert I/O errors to filesystem errors.
///
/// # Why default values for context
///
/// Some I/O errors occur without specific path/operation context. Rather than
/// requiring all callsites to wrap errors manually, this conversion provides
/// a fallback. Code that has context should construct GeoSegError::FileSystem
/// directly with the specific path and operation.
impl From<std::io::Error> for GeoSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert TIFF codec errors to raster errors.
impl From<tiff::TiffError> for GeoSegError {
    fn from(err: tiff::TiffError) -> Self {
        Self::Raster {
            path: "unknown".to_string(),
            operation: "tiff codec".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to model errors.
///
/// # Why model error category
///
/// Shape errors occur during tensor operations which are part of model
/// inference, so they're categorized as model errors rather than a separate
/// tensor error type. This keeps the error hierarchy flat and focused on
/// user-facing error domains.
impl From<ndarray::ShapeError> for GeoSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for GeoSegError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}
