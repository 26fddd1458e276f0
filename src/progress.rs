use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::warn;

/// Callback receiving human-readable progress lines
pub type ProgressListener = Box<dyn Fn(&str) + Send + Sync>;

/// Snapshot of an installation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallProgress {
    pub total_parts: usize,
    pub current_part_index: usize,
    pub current_part_name: String,
    pub current_part_total_bytes: u64,
    pub current_part_downloaded_bytes: u64,
}

/// Tracks parts and downloaded bytes across an installation run
#[derive(Default)]
pub struct ProgressTracker {
    state: InstallProgress,
    started: bool,
    listener: Option<ProgressListener>,
}

impl ProgressTracker {
    /// Create a tracker that records progress without notifying anyone
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that forwards every update to `listener`
    pub fn with_listener<F>(listener: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            listener: Some(Box::new(listener)),
            ..Self::default()
        }
    }

    /// Reset counters for a run of `total_parts` parts
    pub fn setup(&mut self, total_parts: usize) {
        self.state = InstallProgress {
            total_parts,
            ..InstallProgress::default()
        };
        self.started = false;
    }

    pub fn begin_part(&mut self, name: &str, total_bytes: u64) {
        self.state.current_part_index += 1;
        self.state.current_part_name = name.to_string();
        self.state.current_part_total_bytes = total_bytes;
        self.state.current_part_downloaded_bytes = 0;
        self.started = true;
        self.notify();
    }

    pub fn add_downloaded_bytes(&mut self, bytes: u64) {
        let downloaded = self.state.current_part_downloaded_bytes + bytes;
        self.set_downloaded_bytes(downloaded);
    }

    pub fn set_downloaded_bytes(&mut self, bytes: u64) {
        self.state.current_part_downloaded_bytes = bytes;
        self.notify();
    }

    pub fn snapshot(&self) -> InstallProgress {
        self.state.clone()
    }

    /// Current notification line, if a part has begun
    pub fn message(&self) -> Option<String> {
        if !self.started {
            return None;
        }

        let state = &self.state;
        Some(format!(
            "installing {}[{}/{}]: {} of {}kb",
            state.current_part_name,
            state.current_part_index,
            state.total_parts,
            state.current_part_downloaded_bytes / 1024,
            state.current_part_total_bytes / 1024
        ))
    }

    fn notify(&self) {
        let (Some(listener), Some(message)) = (&self.listener, self.message()) else {
            return;
        };

        // A broken listener must never abort synchronization
        if panic::catch_unwind(AssertUnwindSafe(|| listener(&message))).is_err() {
            warn!(message = %message, "Progress listener panicked");
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.state)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}
