//! Background thread for saving and exporting.
//!
//! The UI thread hands the worker an owned snapshot of the project. Each
//! request is tagged with a generation; when several requests pile up while
//! a save is running, the worker skips straight to the newest one. Every file
//! is written atomically, so an older snapshot can never leave a half-written
//! file behind for a newer one.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::format::{self, ExportOptions, ExportSummary, FormatError, SaveReport};
use crate::model::Project;

/// A snapshot to persist.
#[derive(Debug, Clone)]
pub struct SaveJob {
    pub project: Project,
    pub project_path: PathBuf,
    /// Where to write the exports; `None` saves `project.json` only.
    pub exports_dir: Option<PathBuf>,
    pub options: ExportOptions,
    /// Caller's change counter at the time of the snapshot.
    pub revision: u64,
}

/// Result of one executed job.
#[derive(Debug)]
pub struct SaveOutcome {
    pub generation: u64,
    pub revision: u64,
    pub save: Result<SaveReport, FormatError>,
    /// Exports run only after a successful save.
    pub exports: Option<ExportSummary>,
    /// Generations that were dropped in favour of this one.
    pub superseded: Vec<u64>,
}

impl SaveOutcome {
    /// Whether both the project file and every export were written.
    pub fn is_complete(&self) -> bool {
        self.save.is_ok() && self.exports.as_ref().is_none_or(ExportSummary::is_complete)
    }
}

struct QueuedJob {
    generation: u64,
    job: SaveJob,
}

/// Message sent to the worker thread.
enum WorkerMessage {
    Save(QueuedJob),
    Shutdown,
}

/// Manages the background save thread.
pub struct SaveWorker {
    request_tx: Sender<WorkerMessage>,
    result_rx: Receiver<SaveOutcome>,
    thread_handle: Option<JoinHandle<()>>,
    next_generation: u64,
    /// Newest generation whose outcome has been received.
    completed_generation: u64,
}

impl SaveWorker {
    /// Spawn the worker thread.
    pub fn spawn() -> Result<Self, String> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerMessage>();
        let (result_tx, result_rx) = mpsc::channel::<SaveOutcome>();

        let thread_handle = thread::Builder::new()
            .name("save-worker".to_string())
            .spawn(move || {
                log::debug!("Save worker thread started");
                Self::thread_loop(request_rx, result_tx);
                log::debug!("Save worker thread exiting");
            })
            .map_err(|e| format!("Failed to spawn save worker: {}", e))?;

        Ok(Self {
            request_tx,
            result_rx,
            thread_handle: Some(thread_handle),
            next_generation: 1,
            completed_generation: 0,
        })
    }

    fn thread_loop(request_rx: Receiver<WorkerMessage>, result_tx: Sender<SaveOutcome>) {
        loop {
            let first = match request_rx.recv() {
                Ok(WorkerMessage::Save(job)) => job,
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            };

            let (latest, superseded, shutdown) = take_latest(first, &request_rx);
            if !superseded.is_empty() {
                log::debug!(
                    "Save generation {} supersedes {:?}",
                    latest.generation,
                    superseded
                );
            }

            let outcome = run_job(latest, superseded);
            if result_tx.send(outcome).is_err() {
                log::warn!("Result channel closed, save worker exiting");
                break;
            }
            if shutdown {
                break;
            }
        }
    }

    /// Queue a snapshot and return its generation.
    pub fn request(&mut self, job: SaveJob) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;

        if self
            .request_tx
            .send(WorkerMessage::Save(QueuedJob { generation, job }))
            .is_err()
        {
            log::error!("Failed to queue save {}: worker is gone", generation);
        } else {
            log::debug!("Queued save generation {}", generation);
        }
        generation
    }

    /// Collect every finished outcome without blocking.
    pub fn try_recv_results(&mut self) -> Vec<SaveOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.result_rx.try_recv() {
                Ok(outcome) => {
                    self.completed_generation = self.completed_generation.max(outcome.generation);
                    outcomes.push(outcome);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("Save worker disconnected");
                    break;
                }
            }
        }
        outcomes
    }

    /// Block until the next outcome arrives or `timeout` passes.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<SaveOutcome> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(outcome) => {
                self.completed_generation = self.completed_generation.max(outcome.generation);
                Some(outcome)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Save worker disconnected");
                None
            }
        }
    }

    /// Whether a requested save has not been reported back yet.
    pub fn is_busy(&self) -> bool {
        self.completed_generation + 1 < self.next_generation
    }

    /// Generation of the most recent request, if any.
    pub fn latest_generation(&self) -> Option<u64> {
        self.next_generation.checked_sub(1).filter(|g| *g > 0)
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        // Queued jobs ahead of the shutdown still run
        let _ = self.request_tx.send(WorkerMessage::Shutdown);
        if let Some(Err(_)) = self.thread_handle.take().map(JoinHandle::join) {
            log::error!("Save worker thread panicked");
        }
    }
}

/// Drain everything already queued behind `first` and keep the newest job.
///
/// Returns the job to run, the generations it replaces, and whether a
/// shutdown was requested in the meantime.
fn take_latest(first: QueuedJob, rx: &Receiver<WorkerMessage>) -> (QueuedJob, Vec<u64>, bool) {
    let mut latest = first;
    let mut superseded = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(WorkerMessage::Save(next)) => {
                superseded.push(latest.generation);
                latest = next;
            }
            Ok(WorkerMessage::Shutdown) => return (latest, superseded, true),
            Err(TryRecvError::Empty) => return (latest, superseded, false),
            Err(TryRecvError::Disconnected) => return (latest, superseded, true),
        }
    }
}

fn run_job(queued: QueuedJob, superseded: Vec<u64>) -> SaveOutcome {
    let QueuedJob { generation, job } = queued;
    let save = format::save(&job.project, &job.project_path);
    let exports = match (&save, &job.exports_dir) {
        (Ok(_), Some(dir)) => Some(format::export_all(&job.project, dir, &job.options)),
        _ => None,
    };
    if let Err(e) = &save {
        log::error!("Save generation {} failed: {}", generation, e);
    }

    SaveOutcome {
        generation,
        revision: job.revision,
        save,
        exports,
        superseded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageAnnotation, Rect};
    use std::path::Path;

    fn job(dir: &Path, boxes: usize, revision: u64) -> SaveJob {
        let mut project = Project::new(dir);
        project.insert_image(ImageAnnotation::new("a.jpg", 100, 100));
        for i in 0..boxes {
            let offset = i as f32;
            project
                .add_box(
                    "a.jpg",
                    Rect::new(offset, offset, offset + 10.0, offset + 10.0),
                    None,
                )
                .unwrap();
        }
        SaveJob {
            project,
            project_path: dir.join("project.json"),
            exports_dir: Some(dir.join("exports")),
            options: ExportOptions::default(),
            revision,
        }
    }

    #[test]
    fn test_take_latest_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        for generation in 2..=4 {
            tx.send(WorkerMessage::Save(QueuedJob {
                generation,
                job: job(dir.path(), 0, generation),
            }))
            .unwrap();
        }

        let first = QueuedJob {
            generation: 1,
            job: job(dir.path(), 0, 1),
        };
        let (latest, superseded, shutdown) = take_latest(first, &rx);
        assert_eq!(latest.generation, 4);
        assert_eq!(superseded, vec![1, 2, 3]);
        assert!(!shutdown);
    }

    #[test]
    fn test_take_latest_sees_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        tx.send(WorkerMessage::Shutdown).unwrap();

        let first = QueuedJob {
            generation: 1,
            job: job(dir.path(), 0, 1),
        };
        let (latest, superseded, shutdown) = take_latest(first, &rx);
        assert_eq!(latest.generation, 1);
        assert!(superseded.is_empty());
        assert!(shutdown);
    }

    #[test]
    fn test_newest_snapshot_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = SaveWorker::spawn().unwrap();

        let mut last = 0;
        for boxes in 1..=5 {
            last = worker.request(job(dir.path(), boxes, boxes as u64));
        }
        assert_eq!(worker.latest_generation(), Some(last));

        let mut handled = Vec::new();
        while handled.last() != Some(&last) {
            let outcome = worker
                .recv_timeout(Duration::from_secs(10))
                .expect("worker stalled");
            assert!(outcome.is_complete());
            handled.extend(outcome.superseded.iter().copied());
            handled.push(outcome.generation);
        }
        assert_eq!(handled, (1..=last).collect::<Vec<_>>());
        assert!(!worker.is_busy());

        let loaded = format::load(&dir.path().join("project.json")).unwrap();
        assert_eq!(loaded.project.total_boxes(), 5);
        let labels =
            std::fs::read_to_string(dir.path().join("exports/yolo/labels/a.txt")).unwrap();
        assert_eq!(labels, "");
    }

    #[test]
    fn test_failed_save_skips_exports() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = SaveWorker::spawn().unwrap();

        let mut bad = job(dir.path(), 1, 1);
        // A directory where the project file should go
        std::fs::create_dir(dir.path().join("project.json")).unwrap();
        bad.project_path = dir.path().join("project.json");
        worker.request(bad);

        let outcome = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(outcome.save.is_err());
        assert!(outcome.exports.is_none());
        assert!(!dir.path().join("exports").exists());
    }

    #[test]
    fn test_drop_flushes_queued_job() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut worker = SaveWorker::spawn().unwrap();
            worker.request(job(dir.path(), 2, 1));
        }
        let loaded = format::load(&dir.path().join("project.json")).unwrap();
        assert_eq!(loaded.project.total_boxes(), 2);
    }
}
