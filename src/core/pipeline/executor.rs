//! Pipeline execution implementation.

use crate::core::detector::{default_model_path, DetectorFactory, RustfaceFactory};
use crate::core::pool::{CancellationToken, TaskReport, TaskStatus, WorkerPool};
use crate::core::scanner::{ImageScanner, ScanConfig, WalkDirScanner};
use crate::core::transform::{ImageCodec, SaveOptions, StandardCodec};
use crate::error::OrientError;
use crate::events::{null_sender, Event, EventSender, PipelineEvent, PipelinePhase, RunSummary};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Result of pipeline execution
#[derive(Debug)]
pub struct PipelineResult {
    /// One report per scanned image, sorted by path
    pub tasks: Vec<TaskReport>,
    /// Counts for the whole run
    pub summary: RunSummary,
    /// Entries the scanner skipped (non-fatal)
    pub scan_errors: Vec<String>,
    /// Worker threads used
    pub workers: usize,
}

impl PipelineResult {
    /// Reports for images that were rotated and saved
    pub fn rewritten(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Rewritten { .. }))
    }

    /// Reports for images whose task failed
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed { .. }))
    }
}

/// Configuration for the pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Directory to scan
    pub root: PathBuf,
    /// Scanner configuration
    pub scan_config: ScanConfig,
    /// Upper bound on workers (None = number of logical CPUs)
    pub max_workers: Option<usize>,
    /// Where and how rewritten images are saved
    pub save: SaveOptions,
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    factory: Option<Box<dyn DetectorFactory>>,
    codec: Option<Box<dyn ImageCodec>>,
    cancel: CancellationToken,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            factory: None,
            codec: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the directory to scan
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    /// Set scanner configuration
    pub fn scan_config(mut self, config: ScanConfig) -> Self {
        self.config.scan_config = config;
        self
    }

    /// Include (default) or skip hidden files and directories
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.config.scan_config.include_hidden = include;
        self
    }

    /// Follow symbolic links to directories
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.scan_config.follow_symlinks = follow;
        self
    }

    /// Replace the extension allow-list
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.scan_config.extensions = Some(extensions);
        self
    }

    /// Upper bound on concurrent workers
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = Some(workers);
        self
    }

    /// Replace originals instead of writing `-rotated` siblings
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.save.overwrite = overwrite;
        self
    }

    /// Set the face detector factory
    pub fn detector_factory(mut self, factory: Box<dyn DetectorFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set the image codec (default: [`StandardCodec`] at its default JPEG quality)
    pub fn codec(mut self, codec: Box<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Share a cancellation token with the caller
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Pipeline {
        Pipeline {
            config: self.config,
            factory: self
                .factory
                .unwrap_or_else(|| Box::new(RustfaceFactory::new(default_model_path()))),
            codec: self
                .codec
                .unwrap_or_else(|| Box::new(StandardCodec::default())),
            cancel: self.cancel,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The orientation pipeline: scan, then search and rewrite in parallel
pub struct Pipeline {
    config: PipelineConfig,
    factory: Box<dyn DetectorFactory>,
    codec: Box<dyn ImageCodec>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Run the pipeline without events
    pub fn run(&self) -> Result<PipelineResult, OrientError> {
        self.run_with_events(&null_sender())
    }

    /// Run the pipeline with event reporting
    pub fn run_with_events(&self, events: &EventSender) -> Result<PipelineResult, OrientError> {
        let start_time = Instant::now();

        events.send(Event::Pipeline(PipelineEvent::Started));

        // Phase 1: Scanning
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Scanning,
        }));

        let scanner = WalkDirScanner::new(self.config.scan_config.clone());
        let scan_result = scanner.scan_with_events(&self.config.root, events)?;

        let scan_errors: Vec<String> = scan_result.errors.iter().map(|e| e.to_string()).collect();
        let paths: Vec<PathBuf> = scan_result.images.into_iter().map(|i| i.path).collect();
        let scanned = paths.len();

        info!(
            root = %self.config.root.display(),
            images = scanned,
            skipped_entries = scan_errors.len(),
            "Scan complete"
        );

        // Phase 2: Orientation search and rewrite
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Orienting,
        }));

        let mut pool = WorkerPool::new(self.factory.as_ref(), self.codec.as_ref())
            .save_options(self.config.save)
            .cancellation(self.cancel.clone());
        if let Some(workers) = self.config.max_workers {
            pool = pool.max_workers(workers);
        }

        let report = pool.run(paths, events)?;

        let summary = RunSummary {
            scanned,
            rewritten: report.rewritten(),
            unchanged: report.unchanged(),
            no_face: report.no_face(),
            failed: report.failed(),
            cancelled: report.cancelled(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            scanned = summary.scanned,
            rewritten = summary.rewritten,
            unchanged = summary.unchanged,
            no_face = summary.no_face,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Run complete"
        );

        if summary.cancelled > 0 {
            events.send(Event::Pipeline(PipelineEvent::Cancelled));
        }
        events.send(Event::Pipeline(PipelineEvent::Completed {
            summary: summary.clone(),
        }));

        Ok(PipelineResult {
            tasks: report.tasks,
            summary,
            scan_errors,
            workers: report.workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detector::test_support::{marked_image, Corner, MarkerFactory};
    use crate::error::ScanError;
    use crate::events::{EventChannel, OrientEvent};
    use std::fs;
    use tempfile::TempDir;

    fn marker_pipeline(root: &std::path::Path) -> PipelineBuilder {
        Pipeline::builder()
            .root(root)
            .detector_factory(Box::new(MarkerFactory::default()))
    }

    #[test]
    fn pipeline_builder_sets_config() {
        let pipeline = Pipeline::builder()
            .root("/photos")
            .overwrite(true)
            .max_workers(3)
            .include_hidden(false)
            .build();

        assert_eq!(pipeline.config.root, PathBuf::from("/photos"));
        assert!(pipeline.config.save.overwrite);
        assert_eq!(pipeline.config.max_workers, Some(3));
        assert!(!pipeline.config.scan_config.include_hidden);
    }

    #[test]
    fn pipeline_handles_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let result = marker_pipeline(temp_dir.path()).build().run().unwrap();

        assert_eq!(result.summary.scanned, 0);
        assert!(result.tasks.is_empty());
    }

    #[test]
    fn missing_root_is_fatal() {
        let result = marker_pipeline(std::path::Path::new("/nonexistent/photos/123"))
            .build()
            .run();

        assert!(matches!(
            result,
            Err(OrientError::Scan(ScanError::DirectoryNotFound { .. }))
        ));
    }

    #[test]
    fn pipeline_reports_each_rewrite_as_an_event() {
        let temp_dir = TempDir::new().unwrap();
        marked_image(Some(Corner::BottomLeft))
            .save(temp_dir.path().join("left.png"))
            .unwrap();
        marked_image(Some(Corner::TopLeft))
            .save(temp_dir.path().join("up.png"))
            .unwrap();

        let (sender, receiver) = EventChannel::new();
        let result = marker_pipeline(temp_dir.path())
            .build()
            .run_with_events(&sender)
            .unwrap();

        let rewrites: Vec<_> = receiver
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                Event::Orient(OrientEvent::Rewritten { path, degrees, .. }) => Some((path, degrees)),
                _ => None,
            })
            .collect();

        assert_eq!(rewrites, vec![(temp_dir.path().join("left.png"), 90)]);
        assert_eq!(result.summary.rewritten, 1);
        assert_eq!(result.summary.unchanged, 1);
        assert!(temp_dir.path().join("left-rotated.png").exists());
    }

    #[test]
    fn overwrite_replaces_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("turned.png");
        marked_image(Some(Corner::TopRight)).save(&path).unwrap();

        let result = marker_pipeline(temp_dir.path())
            .overwrite(true)
            .build()
            .run()
            .unwrap();

        assert_eq!(result.summary.rewritten, 1);
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let fixed = image::open(&path).unwrap();
        let expected = crate::core::transform::rotate(
            &marked_image(Some(Corner::TopRight)),
            crate::core::transform::Rotation::Cw270,
        );
        assert_eq!(fixed.to_rgb8().as_raw(), expected.to_rgb8().as_raw());
    }

    #[test]
    fn photos_in_hidden_directories_are_processed() {
        let temp_dir = TempDir::new().unwrap();
        let album = temp_dir.path().join(".album");
        fs::create_dir(&album).unwrap();
        marked_image(Some(Corner::BottomRight))
            .save(album.join("b.png"))
            .unwrap();

        let result = marker_pipeline(temp_dir.path()).build().run().unwrap();

        assert_eq!(result.summary.scanned, 1);
        assert_eq!(result.summary.rewritten, 1);
        assert!(album.join("b-rotated.png").exists());

        let skipped = marker_pipeline(temp_dir.path())
            .include_hidden(false)
            .build()
            .run()
            .unwrap();
        assert_eq!(skipped.summary.scanned, 0);
    }

    #[test]
    fn second_run_does_not_reprocess_outputs() {
        let temp_dir = TempDir::new().unwrap();
        marked_image(Some(Corner::BottomRight))
            .save(temp_dir.path().join("b.png"))
            .unwrap();

        let pipeline = marker_pipeline(temp_dir.path()).build();
        let first = pipeline.run().unwrap();
        let second = pipeline.run().unwrap();

        assert_eq!(first.summary.scanned, 1);
        assert_eq!(second.summary.scanned, 1);
        assert_eq!(second.summary.rewritten, 1);
    }
}
