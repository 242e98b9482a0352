//! Auto-save scheduling with debouncing.
//!
//! Edits mark the project dirty; the scheduler says when enough quiet time
//! has passed to save. Navigation saves bypass it entirely and only report
//! back through [`AutoSaveManager::mark_saved`].

use std::time::Duration;
use web_time::Instant;

/// Manages auto-save timing with debouncing.
///
/// Two mechanisms prevent excessive saves:
/// 1. **Debounce delay**: after a change, wait this long before saving so
///    rapid edits are batched together.
/// 2. **Minimum interval**: enforce a minimum time between saves even if
///    changes keep occurring.
///
/// Every change bumps a revision counter. A save reports the revision it
/// captured, so a slow save of an old snapshot never clears newer changes.
#[derive(Debug)]
pub struct AutoSaveManager {
    /// Minimum interval between saves.
    save_interval: Duration,

    /// Debounce delay (wait this long after last change before saving).
    debounce_delay: Duration,

    /// Time of last save attempt.
    last_save: Option<Instant>,

    /// Time of last change that needs saving.
    last_change: Option<Instant>,

    /// Revision of the latest change.
    revision: u64,

    /// Revision captured by the latest successful save.
    saved_revision: u64,

    /// Whether auto-save is enabled.
    enabled: bool,
}

impl AutoSaveManager {
    /// Default minimum interval between saves.
    pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(10);

    /// Default debounce delay.
    pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(2);

    /// Create a new auto-save manager with default settings.
    pub fn new() -> Self {
        Self {
            save_interval: Self::DEFAULT_SAVE_INTERVAL,
            debounce_delay: Self::DEFAULT_DEBOUNCE_DELAY,
            last_save: None,
            last_change: None,
            revision: 0,
            saved_revision: 0,
            enabled: true,
        }
    }

    /// Create a disabled auto-save manager.
    pub fn disabled() -> Self {
        let mut manager = Self::new();
        manager.enabled = false;
        manager
    }

    /// Set the minimum interval between saves.
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Set the debounce delay.
    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    /// Record a change and return its revision.
    pub fn mark_dirty(&mut self) -> u64 {
        self.mark_dirty_at(Instant::now())
    }

    pub fn mark_dirty_at(&mut self, now: Instant) -> u64 {
        self.revision += 1;
        self.last_change = Some(now);
        log::trace!("Auto-save: marked dirty (revision {})", self.revision);
        self.revision
    }

    /// Revision of the latest change; pass this to [`Self::mark_saved`]
    /// after saving a snapshot taken now.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Check if there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.saved_revision < self.revision
    }

    /// Check if we should save now.
    pub fn should_save(&self) -> bool {
        self.should_save_at(Instant::now())
    }

    /// Returns true if auto-save is enabled, there are unsaved changes, the
    /// debounce delay has passed since the last change and the minimum
    /// interval has passed since the last save.
    pub fn should_save_at(&self, now: Instant) -> bool {
        if !self.enabled || !self.is_dirty() {
            return false;
        }

        let Some(last_change) = self.last_change else {
            return false;
        };

        // Check debounce delay
        if now.saturating_duration_since(last_change) < self.debounce_delay {
            return false;
        }

        // Check minimum interval (if we've saved before)
        match self.last_save {
            Some(last_save) => now.saturating_duration_since(last_save) >= self.save_interval,
            None => true,
        }
    }

    /// Mark that a save of `revision` completed successfully.
    ///
    /// Changes made after that snapshot stay dirty.
    pub fn mark_saved(&mut self, revision: u64) {
        self.mark_saved_at(revision, Instant::now());
    }

    pub fn mark_saved_at(&mut self, revision: u64, now: Instant) {
        self.last_save = Some(now);
        self.saved_revision = self.saved_revision.max(revision.min(self.revision));
        log::trace!(
            "Auto-save: saved revision {} (latest {})",
            self.saved_revision,
            self.revision
        );
    }

    /// Mark that a save failed.
    ///
    /// The dirty state is kept so we'll try again after the interval.
    pub fn mark_save_failed(&mut self) {
        // Update last_save to prevent immediate retry
        self.last_save = Some(Instant::now());
        log::trace!("Auto-save: marked save failed");
    }

    /// Set whether auto-save is enabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        log::debug!("Auto-save: enabled = {}", enabled);
    }

    /// Check if auto-save is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reset all timing state, e.g. after opening a different project.
    pub fn reset(&mut self) {
        self.last_save = None;
        self.last_change = None;
        self.saved_revision = self.revision;
    }
}

impl Default for AutoSaveManager {
    fn default() -> Self {
        Self::new()
    }
}
