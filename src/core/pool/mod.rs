//! # Pool Module
//!
//! Runs the orientation search over many images in parallel.
//!
//! ## Scheduling
//! All paths go into one shared queue. `K` workers (one per rayon thread)
//! pull from it until every task is finished, so a slow image never holds up idle
//! workers. Each worker builds its own detector on its first task and keeps
//! it until it exits; detectors are never shared between threads.
//!
//! ## Failure Handling
//! - A failing image is logged and reported; the worker moves on.
//! - A worker that cannot build a detector hands its task back and exits.
//!   Workers with a detector keep waiting until every task is finished, so
//!   handed-back tasks are picked up. Anything left in the queue once every
//!   worker has stopped (no detector anywhere, or cancellation) is reported
//!   rather than dropped.
//! - If no worker could build a detector at all, the run fails.
//!
//! `run` returns only after every worker has finished.

mod cancel;
mod worker;

pub use cancel::CancellationToken;

use crate::core::detector::DetectorFactory;
use crate::core::transform::{ImageCodec, Rotation, SaveOptions};
use crate::error::{OrientError, TaskError};
use crate::events::{Event, EventSender, OrientEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use tracing::{info, warn};
use worker::{run_worker, SharedQueue};

/// Terminal state of one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Rotated and saved to `destination`
    Rewritten {
        destination: PathBuf,
        rotation: Rotation,
    },
    /// Left alone: upright (`face_found`) or no face at any orientation
    Unchanged { face_found: bool },
    /// The task failed; the original is untouched
    Failed { kind: String, message: String },
    /// Never started because the run was cancelled
    Cancelled,
}

impl TaskStatus {
    pub(crate) fn failed(error: &TaskError) -> Self {
        TaskStatus::Failed {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Report for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub path: PathBuf,
    /// Worker that processed the image, if any did
    pub worker: Option<usize>,
    #[serde(flatten)]
    pub status: TaskStatus,
}

/// Everything the pool did, sorted by path
#[derive(Debug, Default)]
pub struct PoolReport {
    pub tasks: Vec<TaskReport>,
    /// Worker threads started
    pub workers: usize,
    /// Detector handles successfully built
    pub detectors_built: usize,
}

impl PoolReport {
    fn count(&self, predicate: impl Fn(&TaskStatus) -> bool) -> usize {
        self.tasks.iter().filter(|t| predicate(&t.status)).count()
    }

    pub fn rewritten(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Rewritten { .. }))
    }

    /// Upright images (face found without rotating)
    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Unchanged { face_found: true }))
    }

    pub fn no_face(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Unchanged { face_found: false }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Cancelled))
    }
}

/// Worker pool coordinator
pub struct WorkerPool<'a> {
    factory: &'a dyn DetectorFactory,
    codec: &'a dyn ImageCodec,
    save: SaveOptions,
    max_workers: usize,
    cancel: CancellationToken,
}

impl<'a> WorkerPool<'a> {
    /// Create a pool with one worker per logical CPU
    pub fn new(factory: &'a dyn DetectorFactory, codec: &'a dyn ImageCodec) -> Self {
        Self {
            factory,
            codec,
            save: SaveOptions::default(),
            max_workers: num_cpus::get(),
            cancel: CancellationToken::new(),
        }
    }

    /// Upper bound on concurrent workers (at least 1)
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    pub fn save_options(mut self, save: SaveOptions) -> Self {
        self.save = save;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Process every path and wait for all workers to finish
    pub fn run(&self, paths: Vec<PathBuf>, events: &EventSender) -> Result<PoolReport, OrientError> {
        let total = paths.len();
        if total == 0 {
            return Ok(PoolReport::default());
        }

        let workers = self.max_workers.clamp(1, total);
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();
        for path in paths {
            // The receiver is alive for the whole run
            let _ = queue_tx.send(path);
        }

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("orient-worker-{}", i))
            .build()
            .map_err(|e| OrientError::Config(format!("Could not start worker threads: {}", e)))?;

        info!(images = total, workers, "Starting orientation workers");
        events.send(Event::Orient(OrientEvent::Started {
            total_images: total,
            workers,
        }));

        let completed = AtomicUsize::new(0);
        let outstanding = AtomicUsize::new(total);
        let shared = SharedQueue {
            queue: &queue_rx,
            requeue: &queue_tx,
            completed: &completed,
            outstanding: &outstanding,
            total,
            events,
        };

        // One call per pool thread; returns once every worker is done
        let worker_reports = thread_pool.broadcast(|ctx| run_worker(ctx.index(), self, &shared));

        let detectors_built = worker_reports.iter().filter(|w| w.detector_ready).count();
        let mut init_errors = Vec::new();
        let mut tasks = Vec::with_capacity(total);
        for report in worker_reports {
            init_errors.extend(report.init_error);
            tasks.extend(report.tasks);
        }

        if detectors_built == 0 {
            if let Some(error) = init_errors.first() {
                return Err(OrientError::DetectorInit(error.clone()));
            }
        }

        let cancelled = self.cancel.is_cancelled();
        for path in queue_rx.try_iter() {
            let status = if cancelled {
                TaskStatus::Cancelled
            } else {
                let reason = init_errors
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "every worker stopped".to_string());
                let error = TaskError::Unassigned {
                    path: path.clone(),
                    reason,
                };
                warn!(path = %path.display(), "{}", error);
                events.send(Event::Orient(OrientEvent::Error {
                    path: path.clone(),
                    message: error.to_string(),
                }));
                TaskStatus::failed(&error)
            };
            tasks.push(TaskReport {
                path,
                worker: None,
                status,
            });
        }

        tasks.sort_by(|a, b| a.path.cmp(&b.path));

        let report = PoolReport {
            tasks,
            workers,
            detectors_built,
        };

        events.send(Event::Orient(OrientEvent::Completed {
            rewritten: report.rewritten(),
            failed: report.failed(),
        }));

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detector::test_support::{marked_image, Corner, MarkerDetector, MarkerFactory};
    use crate::core::detector::FaceDetector;
    use crate::core::transform::StandardCodec;
    use crate::error::{DecodeError, DetectorInitError, SaveError};
    use crate::events::null_sender;
    use image::DynamicImage;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes `count` images cycling through every orientation
    fn fixture(dir: &Path, count: usize) -> Vec<PathBuf> {
        let corners = [
            Some(Corner::TopLeft),
            Some(Corner::BottomLeft),
            Some(Corner::BottomRight),
            Some(Corner::TopRight),
            None,
        ];
        (0..count)
            .map(|i| {
                let path = dir.join(format!("img{:03}.png", i));
                marked_image(corners[i % corners.len()]).save(&path).unwrap();
                path
            })
            .collect()
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| (p.file_name().unwrap().to_string_lossy().to_string(), fs::read(&p).unwrap()))
            .collect();
        files.sort();
        files
    }

    /// Fails for the first `failures` create calls, then succeeds.
    /// Each failure takes `delay` to surface.
    struct FlakyFactory {
        failures: usize,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FlakyFactory {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DetectorFactory for FlakyFactory {
        fn create(&self) -> Result<Box<dyn FaceDetector>, DetectorInitError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                thread::sleep(self.delay);
                Err(DetectorInitError::ModelLoad {
                    path: PathBuf::from("/models/seeta.bin"),
                    reason: "truncated".to_string(),
                })
            } else {
                Ok(Box::new(MarkerDetector))
            }
        }
    }

    /// Decodes normally but refuses to write
    struct ReadOnlyCodec;

    impl ImageCodec for ReadOnlyCodec {
        fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
            StandardCodec::default().decode(path)
        }

        fn save(&self, _image: &DynamicImage, _source: &Path, destination: &Path) -> Result<(), SaveError> {
            Err(SaveError::Io {
                path: destination.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    /// Panics while decoding one specific file
    struct PanickyCodec;

    impl ImageCodec for PanickyCodec {
        fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
            if path.ends_with("img000.png") {
                panic!("decoder bug");
            }
            StandardCodec::default().decode(path)
        }

        fn save(&self, image: &DynamicImage, source: &Path, destination: &Path) -> Result<(), SaveError> {
            StandardCodec::default().save(image, source, destination)
        }
    }

    #[test]
    fn every_task_reaches_a_terminal_state() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 10);
        let factory = MarkerFactory::default();
        let codec = StandardCodec::default();

        let report = WorkerPool::new(&factory, &codec)
            .max_workers(3)
            .run(paths.clone(), &null_sender())
            .unwrap();

        assert_eq!(report.tasks.len(), 10);
        let reported: Vec<_> = report.tasks.iter().map(|t| t.path.clone()).collect();
        assert_eq!(reported, paths);
        // img001/002/003 + img006/007/008 need rotating
        assert_eq!(report.rewritten(), 6);
        assert_eq!(report.unchanged(), 2);
        assert_eq!(report.no_face(), 2);
        assert_eq!(report.failed(), 0);
    }

    #[test]
    fn each_worker_builds_at_most_one_detector() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 20);
        let factory = MarkerFactory::default();
        let codec = StandardCodec::default();

        let report = WorkerPool::new(&factory, &codec)
            .max_workers(4)
            .run(paths, &null_sender())
            .unwrap();

        let created = factory.created.load(Ordering::SeqCst);
        assert!((1..=4).contains(&created), "created {}", created);
        assert_eq!(created, report.detectors_built);
    }

    #[test]
    fn worker_count_is_clamped_to_task_count() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 2);
        let factory = MarkerFactory::default();
        let codec = StandardCodec::default();

        let report = WorkerPool::new(&factory, &codec)
            .max_workers(16)
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(report.workers, 2);
    }

    #[test]
    fn parallel_run_matches_sequential_run() {
        let sequential_dir = TempDir::new().unwrap();
        let parallel_dir = TempDir::new().unwrap();
        let factory = MarkerFactory::default();
        let codec = StandardCodec::default();

        let paths = fixture(sequential_dir.path(), 12);
        WorkerPool::new(&factory, &codec)
            .max_workers(1)
            .run(paths, &null_sender())
            .unwrap();

        let paths = fixture(parallel_dir.path(), 12);
        WorkerPool::new(&factory, &codec)
            .max_workers(4)
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(snapshot(sequential_dir.path()), snapshot(parallel_dir.path()));
    }

    #[test]
    fn decode_failures_do_not_stop_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = fixture(temp_dir.path(), 4);
        let broken = temp_dir.path().join("broken.png");
        fs::write(&broken, b"not a png").unwrap();
        paths.push(broken.clone());

        let factory = MarkerFactory::default();
        let codec = StandardCodec::default();
        let report = WorkerPool::new(&factory, &codec)
            .max_workers(2)
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(report.tasks.len(), 5);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.rewritten(), 3);
        let failed = report.tasks.iter().find(|t| t.path == broken).unwrap();
        assert!(matches!(&failed.status, TaskStatus::Failed { kind, .. } if kind == "decode"));
    }

    #[test]
    fn save_failures_leave_originals_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 4);
        let before = snapshot(temp_dir.path());

        let factory = MarkerFactory::default();
        let report = WorkerPool::new(&factory, &ReadOnlyCodec)
            .save_options(SaveOptions { overwrite: true })
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(report.failed(), 3);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(snapshot(temp_dir.path()), before);
    }

    #[test]
    fn panicking_task_is_contained() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 3);

        let factory = MarkerFactory::default();
        let report = WorkerPool::new(&factory, &PanickyCodec)
            .max_workers(1)
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.rewritten(), 2);
    }

    #[test]
    fn failed_detector_init_hands_tasks_back() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 8);
        let factory = FlakyFactory::new(1);
        let codec = StandardCodec::default();

        let report = WorkerPool::new(&factory, &codec)
            .max_workers(2)
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(report.tasks.len(), 8);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.rewritten() + report.unchanged() + report.no_face(), 8);
        assert_eq!(report.detectors_built, 1);
    }

    #[test]
    fn slow_init_failure_hands_task_to_an_idle_healthy_worker() {
        let temp_dir = TempDir::new().unwrap();
        let paths: Vec<_> = ["a.png", "b.png"]
            .iter()
            .map(|name| {
                let path = temp_dir.path().join(name);
                marked_image(Some(Corner::BottomRight)).save(&path).unwrap();
                path
            })
            .collect();
        // The healthy worker finishes its own image long before this fails
        let factory = FlakyFactory {
            failures: 1,
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        };
        let codec = StandardCodec::default();

        let report = WorkerPool::new(&factory, &codec)
            .max_workers(2)
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(report.rewritten(), 2);
        assert_eq!(report.detectors_built, 1);
        assert!(temp_dir.path().join("a-rotated.png").exists());
        assert!(temp_dir.path().join("b-rotated.png").exists());
    }

    /// Cancels the run once `after` images have been decoded
    struct CancellingCodec {
        token: CancellationToken,
        after: usize,
        decoded: AtomicUsize,
    }

    impl ImageCodec for CancellingCodec {
        fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError> {
            if self.decoded.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.token.cancel();
            }
            StandardCodec::default().decode(path)
        }

        fn save(&self, image: &DynamicImage, source: &Path, destination: &Path) -> Result<(), SaveError> {
            StandardCodec::default().save(image, source, destination)
        }
    }

    #[test]
    fn cancelling_mid_run_keeps_finished_rewrites() {
        let temp_dir = TempDir::new().unwrap();
        let paths: Vec<_> = (0..6)
            .map(|i| {
                let path = temp_dir.path().join(format!("img{:03}.png", i));
                marked_image(Some(Corner::BottomRight)).save(&path).unwrap();
                path
            })
            .collect();
        let token = CancellationToken::new();
        let codec = CancellingCodec {
            token: token.clone(),
            after: 2,
            decoded: AtomicUsize::new(0),
        };

        let factory = MarkerFactory::default();
        let report = WorkerPool::new(&factory, &codec)
            .max_workers(1)
            .cancellation(token)
            .run(paths, &null_sender())
            .unwrap();

        // The task in flight when the token flips still completes
        assert_eq!(report.rewritten(), 2);
        assert_eq!(report.cancelled(), 4);
        let statuses: Vec<_> = report.tasks.iter().map(|t| &t.status).collect();
        assert!(matches!(statuses[1], TaskStatus::Rewritten { .. }));
        assert!(matches!(statuses[2], TaskStatus::Cancelled));

        let names: Vec<_> = snapshot(temp_dir.path()).into_iter().map(|(name, _)| name).collect();
        assert!(names.iter().all(|n| !n.starts_with(".photo-orient-")), "{:?}", names);
        assert_eq!(names.iter().filter(|n| n.contains("-rotated")).count(), 2);
        assert!(names.contains(&"img001-rotated.png".to_string()));
    }

    #[test]
    fn no_detector_anywhere_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 3);
        let factory = FlakyFactory::new(usize::MAX);
        let codec = StandardCodec::default();

        let result = WorkerPool::new(&factory, &codec)
            .max_workers(2)
            .run(paths, &null_sender());

        assert!(matches!(result, Err(OrientError::DetectorInit(_))));
    }

    #[test]
    fn cancelled_run_starts_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let paths = fixture(temp_dir.path(), 5);
        let before = snapshot(temp_dir.path());
        let token = CancellationToken::new();
        token.cancel();

        let factory = MarkerFactory::default();
        let codec = StandardCodec::default();
        let report = WorkerPool::new(&factory, &codec)
            .cancellation(token)
            .run(paths, &null_sender())
            .unwrap();

        assert_eq!(report.cancelled(), 5);
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
        assert_eq!(snapshot(temp_dir.path()), before);
    }

    #[test]
    fn empty_input_spawns_no_workers() {
        let factory = MarkerFactory {
            created: Arc::new(AtomicUsize::new(0)),
        };
        let codec = StandardCodec::default();

        let report = WorkerPool::new(&factory, &codec).run(Vec::new(), &null_sender()).unwrap();

        assert!(report.tasks.is_empty());
        assert_eq!(report.workers, 0);
    }
}
