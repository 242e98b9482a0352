//! An open project and everything needed to edit it.
//!
//! [`Session`] bundles the project with its undo history, its file locations
//! and the auto-save scheduler. The UI owns one per open folder and routes
//! every edit through it. Navigation between images is an explicit event
//! ([`Session::on_navigate`]) that persists the current snapshot.

use std::path::{Path, PathBuf};

use thiserror::Error;
use web_time::Instant;

use crate::config::EditorConfig;
use crate::format::{
    self, ExportOptions, ExportSummary, FormatError, FormatWarning, ImportResult, SaveReport,
};
use crate::model::{ClassId, ModelError, Project};
use crate::scan::{self, ScanError, SyncReport};
use crate::undo::{Command, CommandStack, Created, HistoryError};
use crate::worker::{SaveJob, SaveOutcome, SaveWorker};

/// Errors from opening or creating a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// What happened while a session was being opened.
#[derive(Debug, Default)]
pub struct OpenReport {
    /// Repairs made while loading `project.json`.
    pub warnings: Vec<FormatWarning>,
    /// Whether `project.json` was unusable and the backup was read instead.
    pub recovered_from_backup: bool,
    /// Images added or removed because the folder changed.
    pub sync: Option<SyncReport>,
    /// Annotations recovered from an earlier session's exports.
    pub imported: Option<ImportResult>,
}

/// Result of a synchronous save.
#[derive(Debug)]
pub struct SaveSummary {
    pub save: SaveReport,
    pub exports: ExportSummary,
}

/// How a save request was handled.
#[derive(Debug)]
pub enum SaveDispatch {
    /// Written on the calling thread.
    Saved(SaveSummary),
    /// Handed to the background worker under this generation.
    Queued(u64),
}

/// An open project.
pub struct Session {
    project: Project,
    history: CommandStack,
    project_path: PathBuf,
    exports_dir: PathBuf,
    autosave: format::AutoSaveManager,
    config: EditorConfig,
    current_image: Option<String>,
    worker: Option<SaveWorker>,
    /// Revision of the newest snapshot handed to the worker and not yet
    /// reported back.
    pending_revision: Option<u64>,
}

impl Session {
    /// Wrap an existing project.
    pub fn new(project: Project, project_path: impl Into<PathBuf>, config: EditorConfig) -> Self {
        let project_path = project_path.into();
        let exports_dir = format::exports_dir_for(&project_path, &config.export.exports_dir_name);
        Self {
            project,
            history: CommandStack::with_config(config.undo_config()),
            project_path,
            exports_dir,
            autosave: config.auto_save_manager(),
            config,
            current_image: None,
            worker: None,
            pending_revision: None,
        }
    }

    /// Start a project for an image folder.
    ///
    /// The project file defaults to `project.json` next to the folder. An
    /// existing project file there is opened instead of being replaced.
    pub fn open_folder(
        folder: &Path,
        project_path: Option<PathBuf>,
        config: EditorConfig,
    ) -> Result<(Self, OpenReport), SessionError> {
        let project_path = project_path.unwrap_or_else(|| scan::default_project_path(folder));
        if project_path.is_file() {
            log::info!("Found existing project at {:?}", project_path);
            return Self::open(&project_path, config);
        }

        let (project, _) = scan::create_project(folder, &config.classes.defaults)?;
        let mut session = Self::new(project, project_path, config);
        let report = OpenReport {
            imported: session.import_existing(),
            ..OpenReport::default()
        };
        // Never saved, so the new project counts as unsaved
        session.autosave.mark_dirty();
        Ok((session, report))
    }

    /// Open a saved project, falling back to its backup if needed.
    ///
    /// The folder is re-synced and empty images are filled from existing
    /// exports.
    pub fn open(
        project_path: &Path,
        config: EditorConfig,
    ) -> Result<(Self, OpenReport), SessionError> {
        let loaded = format::load_or_backup(project_path)?;
        let mut session = Self::new(loaded.project, project_path, config);
        let mut report = OpenReport {
            warnings: loaded.warnings,
            recovered_from_backup: loaded.recovered_from_backup,
            ..OpenReport::default()
        };

        if session.project.root_folder().is_dir() {
            match scan::sync_images(&mut session.project) {
                Ok(sync) => {
                    if !sync.is_empty() {
                        session.autosave.mark_dirty();
                    }
                    report.sync = Some(sync);
                }
                Err(e) => log::warn!("Could not sync image folder: {}", e),
            }
        } else {
            log::warn!(
                "Image folder {:?} is missing; keeping the saved image list",
                session.project.root_folder()
            );
        }

        report.imported = session.import_existing();
        if report.recovered_from_backup {
            session.autosave.mark_dirty();
        }
        Ok((session, report))
    }

    fn import_existing(&mut self) -> Option<ImportResult> {
        let imported = format::import_existing(&mut self.project, &self.exports_dir);
        if imported.is_some() {
            self.autosave.mark_dirty();
        }
        imported
    }

    /// Save through a background worker from now on.
    pub fn attach_worker(&mut self, worker: SaveWorker) {
        self.worker = Some(worker);
    }

    /// Stop using the background worker, returning it.
    pub fn detach_worker(&mut self) -> Option<SaveWorker> {
        self.worker.take()
    }

    /// Whether the attached worker already holds a snapshot of the latest
    /// edits.
    pub fn save_pending(&self) -> bool {
        self.worker.is_some() && self.pending_revision == Some(self.autosave.revision())
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn history(&self) -> &CommandStack {
        &self.history
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    /// The image the user is looking at, as last reported by navigation.
    pub fn current_image(&self) -> Option<&str> {
        self.current_image.as_deref()
    }

    /// Whether there are edits not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    pub fn export_options(&self) -> ExportOptions {
        self.config.export_options()
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Apply an edit and record it for undo.
    pub fn execute(&mut self, command: Command) -> Result<Created, ModelError> {
        let created = self.history.execute(&mut self.project, command)?;
        self.autosave.mark_dirty();
        Ok(created)
    }

    pub fn undo(&mut self) -> Result<String, HistoryError> {
        let description = self.history.undo(&mut self.project)?;
        self.autosave.mark_dirty();
        Ok(description)
    }

    pub fn redo(&mut self) -> Result<String, HistoryError> {
        let description = self.history.redo(&mut self.project)?;
        self.autosave.mark_dirty();
        Ok(description)
    }

    /// Delete a class using the configured policy for classes in use.
    pub fn delete_class(&mut self, class_id: ClassId) -> Result<Created, ModelError> {
        self.execute(Command::DeleteClass {
            class_id,
            cascade: self.config.classes.cascade_on_delete,
        })
    }

    /// Re-scan the image folder.
    ///
    /// Removing images cannot be undone, so the history is cleared when the
    /// image list changes.
    pub fn sync(&mut self) -> Result<SyncReport, ScanError> {
        let report = scan::sync_images(&mut self.project)?;
        if !report.is_empty() {
            self.history.clear();
            self.autosave.mark_dirty();
            let vanished = self
                .current_image
                .as_deref()
                .is_some_and(|current| self.project.image(current).is_none());
            if vanished {
                self.current_image = None;
            }
        }
        Ok(report)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// The user moved to another image. The current snapshot is saved
    /// regardless of the auto-save timers.
    pub fn on_navigate(&mut self, image_path: &str) -> Result<SaveDispatch, FormatError> {
        if self.project.image(image_path).is_some() {
            self.current_image = Some(image_path.to_string());
        } else {
            log::warn!("Navigated to unknown image '{}'", image_path);
        }
        self.dispatch_save()
    }

    /// Whether the auto-save timers say it is time to save.
    pub fn should_autosave(&self) -> bool {
        self.autosave.should_save()
    }

    /// Periodic hook for the UI loop: saves when auto-save is due.
    pub fn tick(&mut self) -> Option<Result<SaveDispatch, FormatError>> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<Result<SaveDispatch, FormatError>> {
        if self.save_pending() || !self.autosave.should_save_at(now) {
            return None;
        }
        log::debug!("Auto-save triggered");
        Some(self.dispatch_save())
    }

    fn dispatch_save(&mut self) -> Result<SaveDispatch, FormatError> {
        if let Some(generation) = self.request_background_save() {
            return Ok(SaveDispatch::Queued(generation));
        }
        self.save_now().map(SaveDispatch::Saved)
    }

    /// Save `project.json` and regenerate the exports on this thread.
    pub fn save_now(&mut self) -> Result<SaveSummary, FormatError> {
        self.project.metadata.touch();
        let revision = self.autosave.revision();

        let save = match format::save(&self.project, &self.project_path) {
            Ok(report) => report,
            Err(e) => {
                self.autosave.mark_save_failed();
                return Err(e);
            }
        };
        self.autosave.mark_saved(revision);

        let exports = format::export_all(&self.project, &self.exports_dir, &self.export_options());
        for (id, e) in exports.failed() {
            log::warn!("Export '{}' failed after save: {}", id, e);
        }
        Ok(SaveSummary { save, exports })
    }

    fn request_background_save(&mut self) -> Option<u64> {
        self.worker.as_ref()?;
        self.project.metadata.touch();
        let revision = self.autosave.revision();
        let job = SaveJob {
            project: self.project.clone(),
            project_path: self.project_path.clone(),
            exports_dir: Some(self.exports_dir.clone()),
            options: self.export_options(),
            revision,
        };
        let generation = self.worker.as_mut().map(|worker| worker.request(job))?;
        self.pending_revision = Some(revision);
        Some(generation)
    }

    /// Collect finished background saves and update the dirty state.
    pub fn poll_worker(&mut self) -> Vec<SaveOutcome> {
        let Some(worker) = self.worker.as_mut() else {
            return Vec::new();
        };
        let outcomes = worker.try_recv_results();
        for outcome in &outcomes {
            self.apply_outcome(outcome);
        }
        outcomes
    }

    /// Record the result of a background save.
    pub fn apply_outcome(&mut self, outcome: &SaveOutcome) {
        if self
            .pending_revision
            .is_some_and(|pending| pending <= outcome.revision)
        {
            self.pending_revision = None;
        }
        match &outcome.save {
            Ok(_) => self.autosave.mark_saved(outcome.revision),
            Err(_) => self.autosave.mark_save_failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;
    use std::time::Duration;

    fn image_folder() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        for name in ["a.png", "b.png"] {
            image::RgbImage::new(40, 30).save(images.join(name)).unwrap();
        }
        dir
    }

    fn test_config() -> EditorConfig {
        let mut config = EditorConfig::default();
        config.autosave.debounce_ms = 1000;
        config.autosave.min_interval_ms = 5000;
        config
    }

    #[test]
    fn test_open_folder_creates_project_next_to_images() {
        let dir = image_folder();
        let (session, report) =
            Session::open_folder(&dir.path().join("images"), None, test_config()).unwrap();

        assert_eq!(session.project_path(), dir.path().join("project.json"));
        assert_eq!(session.exports_dir(), dir.path().join("exports"));
        assert_eq!(session.project().image_count(), 2);
        assert_eq!(session.project().classes()[0].name, "object");
        assert!(report.imported.is_none());
        assert!(session.is_dirty());
    }

    #[test]
    fn test_navigate_saves_and_exports() {
        let dir = image_folder();
        let (mut session, _) =
            Session::open_folder(&dir.path().join("images"), None, test_config()).unwrap();
        let class = session.project().classes()[0].id;
        session
            .execute(Command::AddBox {
                image: "a.png".into(),
                rect: Rect::new(1.0, 1.0, 20.0, 20.0),
                class_id: Some(class),
            })
            .unwrap();

        let dispatch = session.on_navigate("b.png").unwrap();
        assert!(matches!(dispatch, SaveDispatch::Saved(ref s) if s.exports.is_complete()));
        assert_eq!(session.current_image(), Some("b.png"));
        assert!(!session.is_dirty());
        assert!(dir.path().join("project.json").is_file());
        assert!(dir.path().join("exports/voc/Annotations/a.xml").is_file());

        // Saving again keeps the previous file as a backup
        session.on_navigate("a.png").unwrap();
        assert!(dir.path().join("project.json.bak").is_file());
    }

    #[test]
    fn test_reopen_restores_boxes() {
        let dir = image_folder();
        let folder = dir.path().join("images");
        let (mut session, _) = Session::open_folder(&folder, None, test_config()).unwrap();
        session
            .execute(Command::AddBox {
                image: "a.png".into(),
                rect: Rect::new(1.0, 1.0, 20.0, 20.0),
                class_id: None,
            })
            .unwrap();
        session.save_now().unwrap();
        drop(session);

        let (session, report) = Session::open_folder(&folder, None, test_config()).unwrap();
        assert_eq!(session.project().image("a.png").unwrap().len(), 1);
        assert_eq!(report.sync, Some(SyncReport::default()));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_new_project_imports_previous_exports() {
        let dir = image_folder();
        let folder = dir.path().join("images");
        let (mut session, _) = Session::open_folder(&folder, None, test_config()).unwrap();
        let class = session.project().classes()[0].id;
        session
            .execute(Command::AddBox {
                image: "b.png".into(),
                rect: Rect::new(5.0, 5.0, 25.0, 25.0),
                class_id: Some(class),
            })
            .unwrap();
        session.save_now().unwrap();
        drop(session);

        std::fs::remove_file(dir.path().join("project.json")).unwrap();
        std::fs::remove_file(dir.path().join("project.json.bak")).ok();

        let (session, report) = Session::open_folder(&folder, None, test_config()).unwrap();
        let imported = report.imported.unwrap();
        assert_eq!(imported.format, "coco");
        assert_eq!(session.project().image("b.png").unwrap().len(), 1);
    }

    #[test]
    fn test_undo_redo_mark_dirty() {
        let dir = image_folder();
        let (mut session, _) =
            Session::open_folder(&dir.path().join("images"), None, test_config()).unwrap();
        session.save_now().unwrap();
        assert!(!session.is_dirty());

        assert_eq!(session.undo(), Err(HistoryError::NothingToUndo));
        session
            .execute(Command::AddClass {
                name: "car".into(),
            })
            .unwrap();
        session.save_now().unwrap();

        session.undo().unwrap();
        assert!(session.is_dirty());
        assert!(session.project().class_by_name("car").is_none());
        session.redo().unwrap();
        assert!(session.project().class_by_name("car").is_some());
    }

    #[test]
    fn test_delete_class_follows_config() {
        let dir = image_folder();
        let folder = dir.path().join("images");

        let (mut blocking, _) = Session::open_folder(&folder, None, test_config()).unwrap();
        let class = blocking.project().classes()[0].id;
        blocking
            .execute(Command::AddBox {
                image: "a.png".into(),
                rect: Rect::new(1.0, 1.0, 20.0, 20.0),
                class_id: Some(class),
            })
            .unwrap();
        assert!(matches!(
            blocking.delete_class(class),
            Err(ModelError::ClassInUse { .. })
        ));

        let mut config = test_config();
        config.classes.cascade_on_delete = true;
        let (mut cascading, _) = Session::open_folder(&folder, None, config).unwrap();
        let class = cascading.project().classes()[0].id;
        cascading
            .execute(Command::AddBox {
                image: "a.png".into(),
                rect: Rect::new(1.0, 1.0, 20.0, 20.0),
                class_id: Some(class),
            })
            .unwrap();
        cascading.delete_class(class).unwrap();
        let image = cascading.project().image("a.png").unwrap();
        assert_eq!(image.boxes()[0].class_id, None);
    }

    #[test]
    fn test_tick_waits_for_debounce() {
        let dir = image_folder();
        let (mut session, _) =
            Session::open_folder(&dir.path().join("images"), None, test_config()).unwrap();
        let start = Instant::now();
        session
            .execute(Command::AddClass {
                name: "car".into(),
            })
            .unwrap();

        assert!(session.tick_at(start).is_none());
        let later = start + Duration::from_secs(2);
        assert!(matches!(session.tick_at(later), Some(Ok(SaveDispatch::Saved(_)))));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_sync_clears_history() {
        let dir = image_folder();
        let folder = dir.path().join("images");
        let (mut session, _) = Session::open_folder(&folder, None, test_config()).unwrap();
        session
            .execute(Command::AddClass {
                name: "car".into(),
            })
            .unwrap();
        assert!(session.history().can_undo());

        std::fs::remove_file(folder.join("b.png")).unwrap();
        let report = session.sync().unwrap();
        assert_eq!(report.removed, vec!["b.png".to_string()]);
        assert!(!session.history().can_undo());
    }

    #[test]
    fn test_background_save() {
        let dir = image_folder();
        let (mut session, _) =
            Session::open_folder(&dir.path().join("images"), None, test_config()).unwrap();
        session.attach_worker(SaveWorker::spawn().unwrap());

        let dispatch = session.on_navigate("a.png").unwrap();
        assert!(matches!(dispatch, SaveDispatch::Queued(1)));

        let mut worker = session.detach_worker().unwrap();
        let outcome = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        session.apply_outcome(&outcome);
        assert!(outcome.is_complete());
        assert!(!session.is_dirty());
        assert!(dir.path().join("exports/coco/annotations.json").is_file());
    }

    #[test]
    fn test_tick_queues_one_save_per_revision() {
        let dir = image_folder();
        let (mut session, _) =
            Session::open_folder(&dir.path().join("images"), None, test_config()).unwrap();
        session.attach_worker(SaveWorker::spawn().unwrap());
        let start = Instant::now();
        session
            .execute(Command::AddClass {
                name: "car".into(),
            })
            .unwrap();

        let later = start + Duration::from_secs(2);
        let mut queued = Vec::new();
        for tick in 0..5 {
            let now = later + Duration::from_millis(tick * 100);
            if let Some(Ok(SaveDispatch::Queued(generation))) = session.tick_at(now) {
                queued.push(generation);
            }
        }
        assert_eq!(queued, vec![1]);
        assert!(session.save_pending());

        let mut worker = session.detach_worker().unwrap();
        let outcome = worker.recv_timeout(Duration::from_secs(10)).unwrap();
        session.attach_worker(worker);
        session.apply_outcome(&outcome);
        assert!(!session.save_pending());
        assert!(!session.is_dirty());

        // A new edit is saved again once the timers allow it
        session
            .execute(Command::AddClass {
                name: "bus".into(),
            })
            .unwrap();
        assert!(!session.save_pending());
        let much_later = Instant::now() + Duration::from_secs(10);
        assert!(matches!(
            session.tick_at(much_later),
            Some(Ok(SaveDispatch::Queued(2)))
        ));
    }
}
