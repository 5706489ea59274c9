//! A single worker: owns one detector handle and drains the shared queue.

use super::{TaskReport, TaskStatus, WorkerPool};
use crate::core::detector::OrientationDetector;
use crate::core::transform::{ImageCodec, SaveOptions};
use crate::error::{DetectorInitError, TaskError};
use crate::events::{Event, EventSender, OrientEvent, OrientProgress};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an idle worker waits before re-checking for handed-back tasks
const IDLE_POLL: Duration = Duration::from_millis(25);

/// State shared by every worker of one run
pub(super) struct SharedQueue<'a> {
    pub queue: &'a Receiver<PathBuf>,
    /// Lets a worker hand its task back when it cannot build a detector
    pub requeue: &'a Sender<PathBuf>,
    pub completed: &'a AtomicUsize,
    /// Tasks not yet in a terminal state, including ones in flight
    pub outstanding: &'a AtomicUsize,
    pub total: usize,
    pub events: &'a EventSender,
}

/// What one worker did during the run
#[derive(Debug, Default)]
pub(super) struct WorkerReport {
    pub detector_ready: bool,
    pub init_error: Option<DetectorInitError>,
    pub tasks: Vec<TaskReport>,
}

/// Pull tasks until every task is finished or the run is cancelled.
///
/// The detector is built lazily on the first task and reused for every
/// following one. If it cannot be built, the task goes back on the queue
/// for the remaining workers and this worker stops. A worker that finds
/// the queue empty keeps waiting while other tasks are still in flight,
/// since any of them may be handed back.
pub(super) fn run_worker(index: usize, pool: &WorkerPool<'_>, shared: &SharedQueue<'_>) -> WorkerReport {
    let mut report = WorkerReport::default();
    let mut handle: Option<OrientationDetector> = None;

    loop {
        if pool.cancel.is_cancelled() {
            debug!(worker = index, "Cancelled, not taking more tasks");
            break;
        }

        let path = match shared.queue.try_recv() {
            Ok(path) => path,
            Err(_) => {
                if shared.outstanding.load(Ordering::SeqCst) == 0 {
                    break;
                }
                match shared.queue.recv_timeout(IDLE_POLL) {
                    Ok(path) => path,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        };

        if handle.is_none() {
            match pool.factory.create() {
                Ok(detector) => {
                    debug!(worker = index, backend = detector.name(), "Detector ready");
                    shared
                        .events
                        .send(Event::Orient(OrientEvent::WorkerReady { worker: index }));
                    report.detector_ready = true;
                    handle = Some(OrientationDetector::new(detector));
                }
                Err(e) => {
                    warn!(worker = index, "Worker stopping, detector unavailable: {}", e);
                    shared.events.send(Event::Orient(OrientEvent::WorkerFailed {
                        worker: index,
                        message: e.to_string(),
                    }));
                    let _ = shared.requeue.send(path);
                    report.init_error = Some(e);
                    break;
                }
            }
        }

        let Some(detector) = handle.as_mut() else {
            break;
        };

        let status = match run_task(detector, pool.codec, &pool.save, &path) {
            Ok(status) => status,
            Err(e) => {
                warn!(worker = index, path = %path.display(), kind = e.kind(), "Skipping image: {}", e);
                shared.events.send(Event::Orient(OrientEvent::Error {
                    path: path.clone(),
                    message: e.to_string(),
                }));
                TaskStatus::failed(&e)
            }
        };

        match &status {
            TaskStatus::Rewritten {
                destination,
                rotation,
            } => {
                info!(path = %path.display(), destination = %destination.display(), "Rotated {} degrees", rotation.degrees());
                shared.events.send(Event::Orient(OrientEvent::Rewritten {
                    path: path.clone(),
                    destination: destination.clone(),
                    degrees: rotation.degrees(),
                }));
            }
            TaskStatus::Unchanged { face_found } => {
                debug!(path = %path.display(), face_found, "Left unchanged");
                shared.events.send(Event::Orient(OrientEvent::Unchanged {
                    path: path.clone(),
                    face_found: *face_found,
                }));
            }
            TaskStatus::Failed { .. } | TaskStatus::Cancelled => {}
        }

        let completed = shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        shared.events.send(Event::Orient(OrientEvent::Progress(OrientProgress {
            completed,
            total: shared.total,
            current_path: path.clone(),
        })));

        report.tasks.push(TaskReport {
            path,
            worker: Some(index),
            status,
        });
        shared.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    report
}

/// Run one task, turning a panic inside a codec or backend into a task error
fn run_task(
    detector: &mut OrientationDetector,
    codec: &dyn ImageCodec,
    save: &SaveOptions,
    path: &Path,
) -> Result<TaskStatus, TaskError> {
    panic::catch_unwind(AssertUnwindSafe(|| process_task(detector, codec, save, path)))
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskError::Panicked {
                path: path.to_path_buf(),
                message,
            })
        })
}

/// decode -> four-way search -> rotated rewrite through the codec
pub(super) fn process_task(
    detector: &mut OrientationDetector,
    codec: &dyn ImageCodec,
    save: &SaveOptions,
    path: &Path,
) -> Result<TaskStatus, TaskError> {
    let image = codec.decode(path)?;
    let outcome = detector.detect_image(path, &image)?;

    if !outcome.needs_rewrite() {
        return Ok(TaskStatus::Unchanged {
            face_found: outcome.found,
        });
    }

    let destination = save.destination(path);
    codec.rewrite(&image, outcome.rotation, path, &destination)?;

    Ok(TaskStatus::Rewritten {
        destination,
        rotation: outcome.rotation,
    })
}
