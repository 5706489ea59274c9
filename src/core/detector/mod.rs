//! # Detector Module
//!
//! Finds which way is up by asking a face detector.
//!
//! ## Orientation Search
//! 1. Convert the decoded image to grayscale once
//! 2. Run the face detector on the raster
//! 3. If no face was found, rotate the raster another 90° clockwise and retry
//! 4. Stop at the first orientation with a face, or after four attempts
//!
//! Rotations are cumulative: each attempt turns the previous attempt's raster,
//! never the original. A photo with no face at any orientation is reported as
//! `found == false` with no rotation and is never rewritten.
//!
//! ## Backends
//! - `RustfaceFactory` - SeetaFace frontal model via the `rustface` crate
//!
//! Any other backend plugs in through [`DetectorFactory`] and [`FaceDetector`].

mod rustface_backend;
mod traits;

pub use rustface_backend::{
    default_model_path, RustfaceDetector, RustfaceFactory, RustfaceSettings, MODEL_FILE_NAME,
};
pub use traits::{DetectorFactory, FaceDetector, FaceRegion};

use crate::core::transform::{FastDecoder, Rotation};
use crate::error::{DecodeError, DetectionError, TaskError};
use image::{imageops, DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the orientation search concluded for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionOutcome {
    /// The image that was searched
    pub path: PathBuf,
    /// Clockwise rotation that brings the first face upright
    pub rotation: Rotation,
    /// Whether any orientation produced a face
    pub found: bool,
}

impl DetectionOutcome {
    pub fn rotation_degrees(&self) -> u16 {
        self.rotation.degrees()
    }

    /// Rewrite only when a face was confirmed at a non-zero rotation
    pub fn needs_rewrite(&self) -> bool {
        self.found && !self.rotation.is_none()
    }
}

/// Runs the four-way orientation search with one detector handle
pub struct OrientationDetector {
    detector: Box<dyn FaceDetector>,
}

impl OrientationDetector {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    /// Decode `path` and search it
    pub fn detect(&mut self, path: &Path) -> Result<DetectionOutcome, TaskError> {
        let image = FastDecoder::decode(path)?;
        self.detect_image(path, &image)
    }

    /// Search an already decoded image
    pub fn detect_image(
        &mut self,
        path: &Path,
        image: &DynamicImage,
    ) -> Result<DetectionOutcome, TaskError> {
        let mut gray = image.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return Err(DecodeError::EmptyImage {
                path: path.to_path_buf(),
            }
            .into());
        }

        for (cycle, rotation) in Rotation::ALL.into_iter().enumerate() {
            if cycle > 0 {
                gray = imageops::rotate90(&gray);
            }

            let faces = self.detect_faces(path, &gray)?;
            debug!(
                path = %path.display(),
                backend = self.detector.name(),
                degrees = rotation.degrees(),
                faces,
                "Detection cycle"
            );

            if faces > 0 {
                return Ok(DetectionOutcome {
                    path: path.to_path_buf(),
                    rotation,
                    found: true,
                });
            }
        }

        Ok(DetectionOutcome {
            path: path.to_path_buf(),
            rotation: Rotation::None,
            found: false,
        })
    }

    fn detect_faces(&mut self, path: &Path, gray: &GrayImage) -> Result<usize, TaskError> {
        // Backends don't know which file they are looking at
        let faces = self.detector.detect(gray).map_err(|e| match e {
            DetectionError::Failed { reason, .. } => DetectionError::Failed {
                path: path.to_path_buf(),
                reason,
            },
        })?;
        Ok(faces.len())
    }
}
