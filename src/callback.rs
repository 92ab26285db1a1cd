//! Handles for callback registrations.

use tokio::task::JoinHandle;

/// Callback handle for unregistering callbacks.
///
/// The callback runs on a background task that stops when the handle is
/// unregistered or dropped.
pub struct CallbackHandle {
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, task: JoinHandle<()>) -> Self {
        Self {
            id,
            task: Some(task),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        self.stop();
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check if the callback task has finished (e.g. its stream ended).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}
