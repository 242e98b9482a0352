//! boxlabel - Bounding-box annotation core
//!
//! The data side of an image annotation editor with no UI dependency: the
//! annotation model, an undo/redo command stack, `project.json` persistence
//! with a `.bak` backup, and Pascal VOC, YOLO and COCO exports regenerated on
//! every save.

pub mod config;
pub mod format;
pub mod model;
pub mod scan;
pub mod session;
pub mod undo;
pub mod worker;

pub use config::{ConfigError, EditorConfig, LogLevel};
pub use format::{ExportOptions, FormatError, UnlabeledPolicy};
pub use model::{BoundingBox, ClassLabel, ImageAnnotation, ModelError, Project, Rect};
pub use session::{OpenReport, SaveDispatch, Session, SessionError};
pub use undo::{Command, CommandStack, HistoryError};
pub use worker::{SaveJob, SaveOutcome, SaveWorker};
