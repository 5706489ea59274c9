//! Face detector backed by the `rustface` crate (SeetaFace engine).

use super::traits::{DetectorFactory, FaceDetector, FaceRegion};
use crate::error::{DetectionError, DetectorInitError};
use image::GrayImage;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the SeetaFace frontal model
pub const MODEL_FILE_NAME: &str = "seeta_fd_frontal_v1.0.bin";

/// Default model location: `<data dir>/photo-orient/seeta_fd_frontal_v1.0.bin`
pub fn default_model_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photo-orient")
        .join(MODEL_FILE_NAME)
}

/// Detector tuning. The image pyramid only ever scales down, so the
/// raster is searched at its native resolution and below.
#[derive(Debug, Clone, Copy)]
pub struct RustfaceSettings {
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub pyramid_scale_factor: f32,
    pub window_step: u32,
}

impl Default for RustfaceSettings {
    fn default() -> Self {
        Self {
            min_face_size: 20,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            window_step: 4,
        }
    }
}

/// Loads the SeetaFace model from disk for each worker
#[derive(Debug, Clone)]
pub struct RustfaceFactory {
    model_path: PathBuf,
    settings: RustfaceSettings,
}

impl RustfaceFactory {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            settings: RustfaceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RustfaceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Fail early, before any worker starts, when the model file is missing
    pub fn check_model(&self) -> Result<(), DetectorInitError> {
        if self.model_path.is_file() {
            Ok(())
        } else {
            Err(DetectorInitError::ModelNotFound {
                path: self.model_path.clone(),
            })
        }
    }
}

impl DetectorFactory for RustfaceFactory {
    fn create(&self) -> Result<Box<dyn FaceDetector>, DetectorInitError> {
        self.check_model()?;

        let file = File::open(&self.model_path).map_err(|e| DetectorInitError::ModelLoad {
            path: self.model_path.clone(),
            reason: e.to_string(),
        })?;

        let model = rustface::read_model(BufReader::new(file)).map_err(|e| {
            DetectorInitError::ModelLoad {
                path: self.model_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut detector = rustface::create_detector_with_model(model);
        detector.set_min_face_size(self.settings.min_face_size);
        detector.set_score_thresh(self.settings.score_threshold);
        detector.set_pyramid_scale_factor(self.settings.pyramid_scale_factor);
        detector.set_slide_window_step(self.settings.window_step, self.settings.window_step);

        debug!(model = %self.model_path.display(), "Loaded SeetaFace model");
        Ok(Box::new(RustfaceDetector { inner: detector }))
    }
}

/// A worker's private SeetaFace detector
pub struct RustfaceDetector {
    inner: Box<dyn rustface::Detector>,
}

impl FaceDetector for RustfaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceRegion>, DetectionError> {
        let (width, height) = gray.dimensions();
        let faces = self
            .inner
            .detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion {
                    x: bbox.x() as i32,
                    y: bbox.y() as i32,
                    width: bbox.width() as u32,
                    height: bbox.height() as u32,
                    score: face.score(),
                }
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "seetaface"
    }
}
