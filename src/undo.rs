//! Undo/Redo system for annotation operations.
//!
//! Callers describe an edit as a [`Command`] and hand it to
//! [`CommandStack::execute`]. Executing resolves the command against the
//! project, applies it and records a [`Change`] that captures every piece of
//! prior state needed to reverse it exactly (removed boxes keep their
//! position, deleted classes keep the boxes they were unassigned from).

use thiserror::Error;

use crate::model::{
    BoundingBox, BoxId, BoxRef, ClassId, ClassLabel, ModelError, Project, Rect, RemovedClass,
};

// ============================================================================
// Commands
// ============================================================================

/// An edit requested by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Draw a new box
    AddBox {
        image: String,
        rect: Rect,
        class_id: Option<ClassId>,
    },
    /// Delete one box
    DeleteBox { image: String, box_id: BoxId },
    /// Move or resize a box
    ModifyBox {
        image: String,
        box_id: BoxId,
        rect: Rect,
    },
    /// Assign (or clear) the class of one box
    ReassignClass {
        image: String,
        box_id: BoxId,
        class_id: Option<ClassId>,
    },
    /// Create a class
    AddClass { name: String },
    /// Rename a class
    RenameClass { class_id: ClassId, name: String },
    /// Delete a class, optionally unassigning the boxes that use it
    DeleteClass { class_id: ClassId, cascade: bool },
    /// Several commands applied, undone and redone as one step
    Batch {
        description: String,
        commands: Vec<Command>,
    },
}

impl Command {
    /// Assign a class to every box in a selection as one undo step.
    pub fn assign_class(boxes: &[BoxRef], class_id: Option<ClassId>) -> Self {
        Command::Batch {
            description: format!("Change class of {} boxes", boxes.len()),
            commands: boxes
                .iter()
                .map(|b| Command::ReassignClass {
                    image: b.image.clone(),
                    box_id: b.box_id,
                    class_id,
                })
                .collect(),
        }
    }

    /// Delete every box in a selection as one undo step.
    pub fn delete_boxes(boxes: &[BoxRef]) -> Self {
        Command::Batch {
            description: format!("Delete {} boxes", boxes.len()),
            commands: boxes
                .iter()
                .map(|b| Command::DeleteBox {
                    image: b.image.clone(),
                    box_id: b.box_id,
                })
                .collect(),
        }
    }

    /// Move every box in a selection by the same offset as one undo step.
    ///
    /// Offsets that push a box outside the image are clamped.
    pub fn move_boxes(project: &Project, boxes: &[BoxRef], dx: f32, dy: f32) -> Self {
        Command::Batch {
            description: format!("Move {} boxes", boxes.len()),
            commands: boxes
                .iter()
                .filter_map(|b| {
                    let bbox = project.image(&b.image)?.get(b.box_id)?;
                    Some(Command::ModifyBox {
                        image: b.image.clone(),
                        box_id: b.box_id,
                        rect: bbox.rect.translated(dx, dy),
                    })
                })
                .collect(),
        }
    }
}

/// What a command created, so the caller can select it.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    /// The command created nothing
    Nothing,
    /// A new box
    Box(BoxRef),
    /// A new class
    Class(ClassId),
    /// Results of each member of a batch, in order
    Batch(Vec<Created>),
}

impl Created {
    /// The created box, if this is a single-box result.
    pub fn box_ref(&self) -> Option<&BoxRef> {
        match self {
            Created::Box(b) => Some(b),
            _ => None,
        }
    }

    /// The created class id, if this is a single-class result.
    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            Created::Class(id) => Some(*id),
            _ => None,
        }
    }
}

// ============================================================================
// Recorded changes
// ============================================================================

/// A change that was applied, with enough captured state to reverse it.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A box was added at `position`
    AddBox {
        image: String,
        position: usize,
        bbox: BoundingBox,
    },
    /// A box was removed from `position`
    DeleteBox {
        image: String,
        position: usize,
        bbox: BoundingBox,
    },
    /// A box's rect and/or class changed
    ModifyBox {
        image: String,
        old: BoundingBox,
        new: BoundingBox,
    },
    /// A class was added at `position`
    AddClass { position: usize, class: ClassLabel },
    /// A class was renamed
    RenameClass {
        class_id: ClassId,
        old_name: String,
        new_name: String,
    },
    /// A class was removed
    DeleteClass { removed: RemovedClass },
    /// Several changes applied as one step
    Batch {
        description: String,
        changes: Vec<Change>,
    },
}

impl Change {
    /// Get a human-readable description of this change
    pub fn description(&self) -> String {
        match self {
            Change::AddBox { .. } => "Add box".to_string(),
            Change::DeleteBox { .. } => "Delete box".to_string(),
            Change::ModifyBox { old, new, .. } => {
                if old.rect == new.rect {
                    "Change class".to_string()
                } else {
                    "Move/resize box".to_string()
                }
            }
            Change::AddClass { class, .. } => format!("Add class '{}'", class.name),
            Change::RenameClass { new_name, .. } => format!("Rename class to '{}'", new_name),
            Change::DeleteClass { removed } => format!("Delete class '{}'", removed.class.name),
            Change::Batch { description, .. } => description.clone(),
        }
    }
}

// ============================================================================
// Command Stack
// ============================================================================

/// Errors from undo/redo requests.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    /// The undo stack is empty
    #[error("Nothing to undo")]
    NothingToUndo,

    /// The redo stack is empty
    #[error("Nothing to redo")]
    NothingToRedo,

    /// The project no longer matches the recorded change
    #[error("Failed to replay change: {0}")]
    Model(#[from] ModelError),
}

/// Configuration for the command stack
#[derive(Debug, Clone)]
pub struct UndoConfig {
    /// Maximum number of changes to keep in history
    pub max_history: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { max_history: 100 }
    }
}

/// The undo/redo history.
///
/// Maintains two stacks (most recent at the end). Executing a command pushes
/// its change onto `undo_stack` and clears `redo_stack`; undo and redo move
/// changes between the two.
#[derive(Debug, Clone, Default)]
pub struct CommandStack {
    undo_stack: Vec<Change>,
    redo_stack: Vec<Change>,
    config: UndoConfig,
}

impl CommandStack {
    /// Create a new empty command stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: UndoConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Apply a command to the project and record it for undo.
    ///
    /// On error nothing is recorded and the project is unchanged; a failing
    /// member of a batch rolls back the members applied before it.
    pub fn execute(
        &mut self,
        project: &mut Project,
        command: Command,
    ) -> Result<Created, ModelError> {
        let (change, created) = apply_command(project, command)?;
        self.push(change);
        Ok(created)
    }

    /// Revert the most recent change. Returns its description.
    pub fn undo(&mut self, project: &mut Project) -> Result<String, HistoryError> {
        let change = self.undo_stack.pop().ok_or(HistoryError::NothingToUndo)?;
        if let Err(e) = apply_undo(&change, project) {
            log::warn!("Undo of '{}' failed: {}", change.description(), e);
            self.undo_stack.push(change);
            return Err(e.into());
        }
        let description = change.description();
        log::debug!("⏪ Undo: '{}'", description);
        self.redo_stack.push(change);
        Ok(description)
    }

    /// Re-apply the most recently undone change. Returns its description.
    pub fn redo(&mut self, project: &mut Project) -> Result<String, HistoryError> {
        let change = self.redo_stack.pop().ok_or(HistoryError::NothingToRedo)?;
        if let Err(e) = apply_redo(&change, project) {
            log::warn!("Redo of '{}' failed: {}", change.description(), e);
            self.redo_stack.push(change);
            return Err(e.into());
        }
        let description = change.description();
        log::debug!("⏩ Redo: '{}'", description);
        self.undo_stack.push(change);
        Ok(description)
    }

    fn push(&mut self, change: Change) {
        log::debug!("📝 Undo: pushed '{}'", change.description());
        self.undo_stack.push(change);
        self.redo_stack.clear();

        // Limit history size
        if self.undo_stack.len() > self.config.max_history {
            let excess = self.undo_stack.len() - self.config.max_history;
            self.undo_stack.drain(..excess);
        }
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get the description of the change that would be undone
    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.last().map(|c| c.description())
    }

    /// Get the description of the change that would be redone
    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.last().map(|c| c.description())
    }

    /// Clear all history, e.g. when a different folder is opened
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        log::debug!("🗑️ Undo history cleared");
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

// ============================================================================
// Execution
// ============================================================================

fn apply_command(project: &mut Project, command: Command) -> Result<(Change, Created), ModelError> {
    match command {
        Command::AddBox {
            image,
            rect,
            class_id,
        } => {
            let id = project.add_box(&image, rect, class_id)?;
            let (position, bbox) = locate(project, &image, id)?;
            let created = Created::Box(BoxRef::new(image.clone(), id));
            Ok((
                Change::AddBox {
                    image,
                    position,
                    bbox,
                },
                created,
            ))
        }
        Command::DeleteBox { image, box_id } => {
            let removed = project.remove_box(&image, box_id)?;
            Ok((
                Change::DeleteBox {
                    image,
                    position: removed.position,
                    bbox: removed.bbox,
                },
                Created::Nothing,
            ))
        }
        Command::ModifyBox {
            image,
            box_id,
            rect,
        } => {
            let update = project.update_box(&image, box_id, Some(rect), None)?;
            Ok((
                Change::ModifyBox {
                    image,
                    old: update.old,
                    new: update.new,
                },
                Created::Nothing,
            ))
        }
        Command::ReassignClass {
            image,
            box_id,
            class_id,
        } => {
            let update = project.update_box(&image, box_id, None, Some(class_id))?;
            Ok((
                Change::ModifyBox {
                    image,
                    old: update.old,
                    new: update.new,
                },
                Created::Nothing,
            ))
        }
        Command::AddClass { name } => {
            let id = project.add_class(&name)?;
            let position = project
                .class_index(id)
                .ok_or(ModelError::UnknownClass { id })?;
            let class = project.classes()[position].clone();
            Ok((Change::AddClass { position, class }, Created::Class(id)))
        }
        Command::RenameClass { class_id, name } => {
            let old_name = project.rename_class(class_id, &name)?;
            let new_name = project
                .class(class_id)
                .map(|c| c.name.clone())
                .ok_or(ModelError::UnknownClass { id: class_id })?;
            Ok((
                Change::RenameClass {
                    class_id,
                    old_name,
                    new_name,
                },
                Created::Nothing,
            ))
        }
        Command::DeleteClass { class_id, cascade } => {
            let removed = project.remove_class(class_id, cascade)?;
            Ok((Change::DeleteClass { removed }, Created::Nothing))
        }
        Command::Batch {
            description,
            commands,
        } => {
            let mut changes = Vec::with_capacity(commands.len());
            let mut created = Vec::with_capacity(commands.len());
            for command in commands {
                match apply_command(project, command) {
                    Ok((change, c)) => {
                        changes.push(change);
                        created.push(c);
                    }
                    Err(e) => {
                        rollback(project, &changes);
                        return Err(e);
                    }
                }
            }
            Ok((
                Change::Batch {
                    description,
                    changes,
                },
                Created::Batch(created),
            ))
        }
    }
}

/// Revert already-applied members of a failed batch, newest first.
fn rollback(project: &mut Project, changes: &[Change]) {
    for change in changes.iter().rev() {
        if let Err(e) = apply_undo(change, project) {
            log::warn!("Rollback of '{}' failed: {}", change.description(), e);
        }
    }
}

/// Re-apply members of a batch whose undo failed partway, oldest first.
fn restore(project: &mut Project, changes: &[Change]) {
    for change in changes {
        if let Err(e) = apply_redo(change, project) {
            log::warn!("Restore of '{}' failed: {}", change.description(), e);
        }
    }
}

fn locate(project: &Project, image: &str, id: BoxId) -> Result<(usize, BoundingBox), ModelError> {
    let unknown = || ModelError::UnknownBox {
        image: image.to_string(),
        id,
    };
    let entry = project.image(image).ok_or_else(unknown)?;
    let position = entry.position(id).ok_or_else(unknown)?;
    Ok((position, entry.boxes()[position].clone()))
}

/// Apply the undo operation for a change
fn apply_undo(change: &Change, project: &mut Project) -> Result<(), ModelError> {
    match change {
        Change::AddBox { image, bbox, .. } => {
            project.remove_box(image, bbox.id)?;
        }
        Change::DeleteBox {
            image,
            position,
            bbox,
        } => {
            project.insert_box_at(image, *position, bbox.clone())?;
        }
        Change::ModifyBox { image, old, .. } => {
            project.set_box(image, old)?;
        }
        Change::AddClass { class, .. } => {
            project.remove_class(class.id, false)?;
        }
        Change::RenameClass {
            class_id, old_name, ..
        } => {
            project.rename_class(*class_id, old_name)?;
        }
        Change::DeleteClass { removed } => {
            project.insert_class_at(removed.position, removed.class.clone())?;
            for b in &removed.unassigned {
                project.update_box(&b.image, b.box_id, None, Some(Some(removed.class.id)))?;
            }
        }
        Change::Batch { changes, .. } => {
            // Undo batch in reverse order
            for (i, change) in changes.iter().enumerate().rev() {
                if let Err(e) = apply_undo(change, project) {
                    restore(project, &changes[i + 1..]);
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}

/// Apply the redo operation for a change
fn apply_redo(change: &Change, project: &mut Project) -> Result<(), ModelError> {
    match change {
        Change::AddBox {
            image,
            position,
            bbox,
        } => {
            project.insert_box_at(image, *position, bbox.clone())?;
        }
        Change::DeleteBox { image, bbox, .. } => {
            project.remove_box(image, bbox.id)?;
        }
        Change::ModifyBox { image, new, .. } => {
            project.set_box(image, new)?;
        }
        Change::AddClass { position, class } => {
            project.insert_class_at(*position, class.clone())?;
        }
        Change::RenameClass {
            class_id, new_name, ..
        } => {
            project.rename_class(*class_id, new_name)?;
        }
        Change::DeleteClass { removed } => {
            project.remove_class(removed.class.id, true)?;
        }
        Change::Batch { changes, .. } => {
            // Redo batch in forward order
            for (i, change) in changes.iter().enumerate() {
                if let Err(e) = apply_redo(change, project) {
                    rollback(project, &changes[..i]);
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
