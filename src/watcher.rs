//! Debounced filesystem watcher feeding change batches to the service.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};

use crate::error::{Result, WiremapError};

pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<std::result::Result<Vec<DebouncedEvent>, notify::Error>>,
}

impl FileWatcher {
    pub fn new(path: &Path) -> Result<Self> {
        let (tx, rx) = channel();

        let mut debouncer = new_debouncer(Duration::from_millis(500), tx)
            .map_err(|e| WiremapError::Watcher(e.to_string()))?;

        debouncer
            .watcher()
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| WiremapError::Watcher(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
        })
    }

    /// Block until the next debounced batch; paths of files that changed
    /// or disappeared. `None` when the batch is empty or the channel closed.
    pub fn recv(&self) -> Option<Vec<PathBuf>> {
        match self.receiver.recv() {
            Ok(Ok(events)) => Self::collect_paths(events),
            _ => None,
        }
    }

    pub fn try_recv(&self) -> Option<Vec<PathBuf>> {
        match self.receiver.try_recv() {
            Ok(Ok(events)) => Self::collect_paths(events),
            _ => None,
        }
    }

    fn collect_paths(events: Vec<DebouncedEvent>) -> Option<Vec<PathBuf>> {
        let paths: Vec<PathBuf> = events
            .into_iter()
            .map(|e| e.path)
            .filter(|path| path.is_file() || !path.exists())
            .collect();

        if paths.is_empty() {
            None
        } else {
            Some(paths)
        }
    }
}
