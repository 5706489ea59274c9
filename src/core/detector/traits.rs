//! Trait definitions for pluggable face detection.

use crate::error::{DetectionError, DetectorInitError};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Bounding box of a detected face within a raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    /// X coordinate of the top-left corner (pixels)
    pub x: i32,
    /// Y coordinate of the top-left corner (pixels)
    pub y: i32,
    /// Width of the bounding box (pixels)
    pub width: u32,
    /// Height of the bounding box (pixels)
    pub height: u32,
    /// Backend-specific confidence score
    pub score: f64,
}

/// A loaded face detection model.
///
/// Instances are stateful and are not required to be `Send` or `Sync`:
/// each worker builds its own through a [`DetectorFactory`] and keeps it
/// for the rest of its life.
pub trait FaceDetector {
    /// Detect faces in a grayscale raster without upscaling it.
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceRegion>, DetectionError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Builds detector handles. Shared by every worker of the pool.
pub trait DetectorFactory: Send + Sync {
    /// Construct a new detector. Called at most once per worker.
    fn create(&self) -> Result<Box<dyn FaceDetector>, DetectorInitError>;
}
