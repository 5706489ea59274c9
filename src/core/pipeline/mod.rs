//! # Pipeline Module
//!
//! Orchestrates a full orientation run.
//!
//! ## Pipeline Stages
//! 1. **Scan** - Discover candidate images under the root directory
//! 2. **Orient** - Search each image for a face at 0/90/180/270 degrees
//!    and rewrite the ones that need turning
//!
//! ## Parallelism
//! Stage 2 runs on a worker pool sized to the number of logical CPUs
//! unless `max_workers` says otherwise.

mod executor;

pub use executor::{Pipeline, PipelineBuilder, PipelineConfig, PipelineResult};
