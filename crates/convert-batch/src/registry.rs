use crate::types::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Change notifications pushed to registry observers
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Added(BatchFile),
    Updated(BatchFile),
    Removed(PathBuf),
    Cleared,
}

/// Counts by status, for summary displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub errors: usize,
    pub cancelled: usize,
}

/// Ordered queue of files to convert.
///
/// Paths are unique; insertion order is processing order.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Vec<BatchFile>,
    run_active: bool,
    observers: Vec<mpsc::UnboundedSender<RegistryEvent>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append candidates whose path is not queued yet. Returns how many were added.
    pub fn add(&mut self, candidates: impl IntoIterator<Item = FileDescriptor>) -> usize {
        let mut added = 0;
        for candidate in candidates {
            if self.contains(&candidate.path) {
                log::debug!("Skipping duplicate {}", candidate.path.display());
                continue;
            }
            let file = BatchFile::new(candidate);
            self.files.push(file.clone());
            self.notify(RegistryEvent::Added(file));
            added += 1;
        }
        added
    }

    /// Returns false if the path was not queued or a run is active
    pub fn remove(&mut self, path: &Path) -> bool {
        if self.run_active {
            log::warn!("Cannot remove {} while a run is active", path.display());
            return false;
        }
        let Some(index) = self.index_of(path) else {
            return false;
        };
        let removed = self.files.remove(index);
        self.notify(RegistryEvent::Removed(removed.path));
        true
    }

    /// Returns false if a run is active
    pub fn clear(&mut self) -> bool {
        if self.run_active {
            log::warn!("Cannot clear the queue while a run is active");
            return false;
        }
        self.files.clear();
        self.notify(RegistryEvent::Cleared);
        true
    }

    /// Put every entry back to `pending` with no progress, error or destination
    pub fn reset_all(&mut self) {
        for index in 0..self.files.len() {
            let file = &mut self.files[index];
            file.status = FileStatus::Pending;
            file.progress_percent = 0;
            file.current_page = None;
            file.total_pages = None;
            file.converted_size_bytes = None;
            file.save_path = None;
            file.error_message = None;
            let snapshot = file.clone();
            self.notify(RegistryEvent::Updated(snapshot));
        }
    }

    /// Partial update of one entry. Fields not set in `update` are kept.
    ///
    /// Page counters only survive while converting and the error message only
    /// while in `error`. Returns false if the path is not queued.
    pub fn update_status(&mut self, path: &Path, status: FileStatus, update: FileUpdate) -> bool {
        let Some(index) = self.index_of(path) else {
            log::warn!("Status update for unknown file {}", path.display());
            return false;
        };

        if status.is_active() {
            if let Some(other) = self
                .files
                .iter()
                .find(|f| f.status.is_active() && f.path != path)
            {
                log::error!(
                    "{} marked {} while {} is still {}",
                    path.display(),
                    status.name(),
                    other.path.display(),
                    other.status.name()
                );
            }
        }

        let file = &mut self.files[index];

        if let Some(percent) = update.progress_percent {
            if status == FileStatus::Converting
                && file.status == FileStatus::Converting
                && percent < file.progress_percent
            {
                log::warn!(
                    "Progress for {} went backwards ({} -> {}), events may be leaking between jobs",
                    file.display_name,
                    file.progress_percent,
                    percent
                );
            }
            file.progress_percent = percent.min(100);
        }
        if let Some(size) = update.converted_size_bytes {
            file.converted_size_bytes = Some(size);
        }
        if let Some(save_path) = update.save_path {
            file.save_path = Some(save_path);
        }

        if status == FileStatus::Converting {
            if update.current_page.is_some() {
                file.current_page = update.current_page;
            }
            if update.total_pages.is_some() {
                file.total_pages = update.total_pages;
            }
        } else {
            file.current_page = None;
            file.total_pages = None;
        }

        if status == FileStatus::Error {
            if update.error_message.is_some() {
                file.error_message = update.error_message;
            }
        } else {
            file.error_message = None;
        }

        if status == FileStatus::Pending {
            file.progress_percent = 0;
        }

        file.status = status;
        let snapshot = file.clone();
        self.notify(RegistryEvent::Updated(snapshot));
        true
    }

    /// Mark the given entries cancelled if they are still pending. Other
    /// entries are left alone. Returns how many changed.
    pub fn cancel_pending(&mut self, paths: &[PathBuf]) -> usize {
        let mut cancelled = 0;
        for path in paths {
            let pending = self
                .get(path)
                .is_some_and(|f| f.status == FileStatus::Pending);
            if pending && self.update_status(path, FileStatus::Cancelled, FileUpdate::default()) {
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn get(&self, path: &Path) -> Option<&BatchFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index_of(path).is_some()
    }

    pub fn files(&self) -> &[BatchFile] {
        &self.files
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Entries currently analyzing or converting. Never more than one during a run.
    pub fn active_count(&self) -> usize {
        self.files.iter().filter(|f| f.status.is_active()).count()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.files.len(),
            ..Default::default()
        };
        for file in &self.files {
            match file.status {
                FileStatus::Pending => stats.pending += 1,
                FileStatus::Analyzing | FileStatus::Converting => stats.processing += 1,
                FileStatus::Completed => stats.completed += 1,
                FileStatus::Error => stats.errors += 1,
                FileStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Overall batch progress in 0.0..=1.0, counting the active file's percentage
    pub fn overall_progress(&self) -> f32 {
        if self.files.is_empty() {
            return 0.0;
        }
        let done: f32 = self
            .files
            .iter()
            .map(|f| match f.status {
                FileStatus::Completed | FileStatus::Error | FileStatus::Cancelled => 1.0,
                FileStatus::Converting => f32::from(f.progress_percent) / 100.0,
                FileStatus::Pending | FileStatus::Analyzing => 0.0,
            })
            .sum();
        done / self.files.len() as f32
    }

    pub fn is_run_active(&self) -> bool {
        self.run_active
    }

    pub(crate) fn set_run_active(&mut self, active: bool) {
        self.run_active = active;
    }

    /// Receive every subsequent change. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    fn index_of(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|f| f.path == path)
    }

    fn notify(&mut self, event: RegistryEvent) {
        self.observers
            .retain(|observer| observer.send(event.clone()).is_ok());
    }
}

/// Registry handle shared between the runner and the UI.
///
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<FileRegistry>>);

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, FileRegistry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Vec<BatchFile> {
        self.lock().files().to_vec()
    }

    pub fn get(&self, path: &Path) -> Option<BatchFile> {
        self.lock().get(path).cloned()
    }
}
