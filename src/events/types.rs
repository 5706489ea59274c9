//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the orientation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Scanning phase events
    Scan(ScanEvent),
    /// Orientation search and rewrite events
    Orient(OrientEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
}

/// Events during the scanning phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { root: PathBuf },
    /// An image was found
    ImageFound { path: PathBuf },
    /// An entry was skipped but scanning continues
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed { total_images: usize },
}

/// Events emitted by the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrientEvent {
    /// The pool has started
    Started { total_images: usize, workers: usize },
    /// A worker built its face detector
    WorkerReady { worker: usize },
    /// A worker could not build its face detector and stopped
    WorkerFailed { worker: usize, message: String },
    /// An image was rotated and written
    Rewritten {
        path: PathBuf,
        destination: PathBuf,
        degrees: u16,
    },
    /// An image was left as is
    Unchanged { path: PathBuf, face_found: bool },
    /// An image failed but the pool continues
    Error { path: PathBuf, message: String },
    /// Progress update
    Progress(OrientProgress),
    /// All tasks reached a terminal state
    Completed { rewritten: usize, failed: usize },
}

/// Progress information during orientation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrientProgress {
    /// Number of images finished so far
    pub completed: usize,
    /// Total number of images queued
    pub total: usize,
    /// Image that just finished
    pub current_path: PathBuf,
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline has started
    Started,
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Pipeline completed
    Completed { summary: RunSummary },
    /// Pipeline was cancelled before every image was processed
    Cancelled,
}

/// Phases of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Scanning,
    Orienting,
}

/// Counts describing a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Images found by the scanner
    pub scanned: usize,
    /// Images rotated and written
    pub rewritten: usize,
    /// Images where a face was found upright
    pub unchanged: usize,
    /// Images with no face at any orientation
    pub no_face: usize,
    /// Images whose task failed
    pub failed: usize,
    /// Images abandoned because the run was cancelled
    pub cancelled: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Scanning => write!(f, "Scanning"),
            PipelinePhase::Orienting => write!(f, "Orienting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Orient(OrientEvent::Rewritten {
            path: PathBuf::from("/photos/b.jpg"),
            destination: PathBuf::from("/photos/b-rotated.jpg"),
            degrees: 180,
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Orient(OrientEvent::Rewritten { degrees, .. }) => assert_eq!(degrees, 180),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn run_summary_is_serializable() {
        let summary = RunSummary {
            scanned: 3,
            rewritten: 1,
            unchanged: 1,
            no_face: 1,
            failed: 0,
            cancelled: 0,
            duration_ms: 5000,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"rewritten\":1"));
    }

    #[test]
    fn phase_display() {
        assert_eq!(PipelinePhase::Orienting.to_string(), "Orienting");
    }
}
