//! # Core Module
//!
//! The orientation engine, independent of any front end.
//!
//! ## Modules
//! - `scanner` - Discovers candidate images in a directory tree
//! - `transform` - Quarter-turn rotation, decoding and atomic saving
//! - `detector` - Face detection backends and the four-way orientation search
//! - `pool` - Bounded worker pool, one detector per worker
//! - `pipeline` - Orchestrates the full workflow

pub mod detector;
pub mod pipeline;
pub mod pool;
pub mod scanner;
pub mod transform;

// Re-export commonly used types
pub use detector::{DetectionOutcome, DetectorFactory, FaceDetector, OrientationDetector};
pub use pipeline::{Pipeline, PipelineResult};
pub use pool::{CancellationToken, TaskReport, TaskStatus};
pub use scanner::ImageFile;
pub use transform::Rotation;
