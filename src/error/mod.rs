//! # Error Module
//!
//! Typed errors for the orientation pipeline.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Contain per-image failures** - decode, detection and save errors stop
//!   at the task boundary; only detector initialization can fail a run

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum OrientError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Face detector could not be initialized: {0}")]
    DetectorInit(#[from] DetectorInitError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur while walking the photo directory
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Symlink loop detected at {path}")]
    SymlinkLoop { path: PathBuf },

    #[error("Failed to read entry {path}: {source}")]
    ReadEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The file could not be turned into a usable raster
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Image has zero width or height: {path}")]
    EmptyImage { path: PathBuf },
}

/// The face detection backend failed on a raster
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Face detection failed for {path}: {reason}")]
    Failed { path: PathBuf, reason: String },
}

/// Writing the rotated image failed. The original file is never touched
/// before the write succeeds.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Failed to move rotated image into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any failure that ends a single image's task
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("No detector available to process {path}: {reason}")]
    Unassigned { path: PathBuf, reason: String },

    #[error("Processing {path} panicked: {message}")]
    Panicked { path: PathBuf, message: String },
}

impl TaskError {
    /// Short label for the failure kind, used in logs and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Decode(_) => "decode",
            TaskError::Detection(_) => "detection",
            TaskError::Save(_) => "save",
            TaskError::Unassigned { .. } => "unassigned",
            TaskError::Panicked { .. } => "panic",
        }
    }
}

/// A worker could not build its face detector
#[derive(Error, Debug, Clone)]
pub enum DetectorInitError {
    #[error("Face model not found at {path}. Pass --model or set PHOTO_ORIENT_MODEL.")]
    ModelNotFound { path: PathBuf },

    #[error("Failed to load face model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, OrientError>;
