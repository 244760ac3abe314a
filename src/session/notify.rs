use std::sync::{Arc, Mutex, PoisonError};

use crate::config::CONFIG_FILENAME;
use crate::error::IndexerError;

/// Who asked for a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The user ran a command and expects to hear about failures.
    Explicit,
    /// Triggered by a save or file watcher; failures are only logged.
    Incidental,
}

/// Collects user-facing failure messages for the foreground to display.
#[derive(Clone, Default)]
pub struct Notifier {
    pending: Arc<Mutex<Vec<String>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, trigger: Trigger, error: &IndexerError) {
        match trigger {
            Trigger::Explicit => {
                tracing::error!("{}", error);
                self.pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(user_message(error));
            }
            Trigger::Incidental => tracing::warn!("Background index update failed: {}", error),
        }
    }

    /// Drains pending messages, oldest first.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn user_message(error: &IndexerError) -> String {
    let setting = match error {
        IndexerError::ExtractorUnavailable(_) => "extractor_command",
        IndexerError::SearchToolUnavailable(_) => "search_command",
        _ => return error.to_string(),
    };
    format!("{} (configured by {} in {})", error, setting, CONFIG_FILENAME)
}
