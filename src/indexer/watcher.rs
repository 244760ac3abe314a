use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};

use crate::error::{IndexerError, Result};

type EventBatch = std::result::Result<Vec<DebouncedEvent>, notify::Error>;

/// Debounced file-change notifications for every project root.
pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<EventBatch>,
}

impl FileWatcher {
    pub fn new(roots: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = channel();

        let mut debouncer = new_debouncer(Duration::from_millis(500), tx)
            .map_err(|e| IndexerError::Watcher(e.to_string()))?;

        for root in roots {
            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| IndexerError::Watcher(format!("{}: {}", root.display(), e)))?;
        }

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
        })
    }

    /// Blocks until some files changed or were deleted. `None` once the
    /// watcher has shut down.
    pub fn recv(&self) -> Option<Vec<PathBuf>> {
        loop {
            match self.receiver.recv() {
                Ok(Ok(events)) => {
                    let changed = changed_paths(events);
                    if !changed.is_empty() {
                        return Some(changed);
                    }
                }
                Ok(Err(e)) => tracing::warn!("File watcher error: {}", e),
                Err(_) => return None,
            }
        }
    }
}

/// Regular files that exist plus paths that disappeared; directories dropped.
fn changed_paths(events: Vec<DebouncedEvent>) -> Vec<PathBuf> {
    events
        .into_iter()
        .map(|e| e.path)
        .filter(|path| path.is_file() || !path.exists())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
