//! Registry of live process handles, keyed by run id.
//!
//! Ownership of a spawned child stays with its supervising task; the
//! registry only holds the two capabilities other components need: an
//! input channel for stdin and a cancellation token that asks the
//! supervising task to terminate the process. Entries are removed by the
//! supervising task itself when the process exits, so a lookup miss means
//! "already finished or never started".

use std::collections::HashMap;

use synchub_core::types::DbId;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Capabilities for one live process.
pub struct RunHandle {
    /// Lines queued here are written to the process's stdin.
    pub input_tx: mpsc::UnboundedSender<String>,
    /// Cancelling this token makes the supervising task kill the process.
    pub kill: CancellationToken,
}

/// Thread-safe map of run id to live process handle.
///
/// Designed to be wrapped in `Arc` and shared across the ledger, the
/// supervisor, and the session layer.
#[derive(Default)]
pub struct RunRegistry {
    inner: RwLock<HashMap<DbId, RunHandle>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle for a run, replacing any previous one.
    pub async fn insert(&self, run_id: DbId, handle: RunHandle) {
        self.inner.write().await.insert(run_id, handle);
    }

    /// Remove a run's handle. No-op if absent.
    pub async fn remove(&self, run_id: DbId) {
        self.inner.write().await.remove(&run_id);
    }

    /// Whether a live handle exists for the run.
    pub async fn is_registered(&self, run_id: DbId) -> bool {
        self.inner.read().await.contains_key(&run_id)
    }

    /// Queue a line of input for the run's stdin.
    ///
    /// Returns `false` if no live handle exists -- a finished or detached
    /// run silently drops late input.
    pub async fn send_input(&self, run_id: DbId, text: String) -> bool {
        match self.inner.read().await.get(&run_id) {
            Some(handle) => handle.input_tx.send(text).is_ok(),
            None => false,
        }
    }

    /// Ask the supervising task to terminate the run's process.
    ///
    /// Returns `false` if no live handle exists.
    pub async fn kill(&self, run_id: DbId) -> bool {
        match self.inner.read().await.get(&run_id) {
            Some(handle) => {
                handle.kill.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of live handles.
    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle() -> (RunHandle, mpsc::UnboundedReceiver<String>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();
        (
            RunHandle {
                input_tx: tx,
                kill: kill.clone(),
            },
            rx,
            kill,
        )
    }

    #[tokio::test]
    async fn input_reaches_registered_handle() {
        let registry = RunRegistry::new();
        let (handle, mut rx, _kill) = test_handle();
        registry.insert(1, handle).await;

        assert!(registry.send_input(1, "123456".to_string()).await);
        assert_eq!(rx.recv().await.unwrap(), "123456");
    }

    #[tokio::test]
    async fn input_to_unknown_run_is_dropped() {
        let registry = RunRegistry::new();
        assert!(!registry.send_input(99, "late".to_string()).await);
    }

    #[tokio::test]
    async fn kill_cancels_token() {
        let registry = RunRegistry::new();
        let (handle, _rx, kill) = test_handle();
        registry.insert(2, handle).await;

        assert!(registry.kill(2).await);
        assert!(kill.is_cancelled());
    }

    #[tokio::test]
    async fn kill_unknown_run_is_false() {
        let registry = RunRegistry::new();
        assert!(!registry.kill(7).await);
    }

    #[tokio::test]
    async fn remove_clears_handle() {
        let registry = RunRegistry::new();
        let (handle, _rx, _kill) = test_handle();
        registry.insert(3, handle).await;
        assert!(registry.is_registered(3).await);

        registry.remove(3).await;
        assert!(!registry.is_registered(3).await);
        assert!(!registry.send_input(3, "gone".to_string()).await);
    }
}
