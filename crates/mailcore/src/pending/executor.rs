//! Background drain of the pending-action queue

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::MailboxStore;

use super::RemoteBackend;

/// Retry behavior for failed remote executions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before an action is dead-lettered
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt
    pub base_backoff_ms: u64,
    /// Actions drained per storage read
    pub batch_size: usize,
    /// How often to re-check while backed-off actions are queued
    pub poll_interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 1_000,
            batch_size: 16,
            poll_interval_ms: 500,
        }
    }
}

enum Signal {
    Kick,
    Shutdown,
}

/// Worker that executes queued actions against the remote backend
///
/// Mutations enqueue locally and [`kick`] the executor; the worker thread
/// drains runnable actions in FIFO order. An action leaves the queue only
/// after the backend reports success (at-least-once), fails into exponential
/// backoff otherwise, and dead-letters once the attempt budget is spent.
///
/// [`kick`]: PendingExecutor::kick
pub struct PendingExecutor {
    store: Arc<dyn MailboxStore>,
    backend: Arc<dyn RemoteBackend>,
    policy: RetryPolicy,
    tx: Sender<Signal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PendingExecutor {
    /// Start the worker thread
    pub fn spawn(
        store: Arc<dyn MailboxStore>,
        backend: Arc<dyn RemoteBackend>,
        policy: RetryPolicy,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        let executor = Arc::new(Self {
            store,
            backend,
            policy,
            tx,
            worker: Mutex::new(None),
        });

        let worker_ref = Arc::clone(&executor);
        let handle = thread::spawn(move || worker_ref.run(rx));
        *executor.worker.lock().unwrap() = Some(handle);
        executor
    }

    /// Wake the worker; fire-and-forget
    pub fn kick(&self) {
        let _ = self.tx.send(Signal::Kick);
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Queued actions stay in storage and drain on the next spawn.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Signal::Shutdown);
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Drain everything runnable right now; returns how many actions ran
    ///
    /// Used by the worker loop and available for synchronous flushes.
    pub fn run_once(&self) -> usize {
        let mut processed = 0;
        loop {
            let now = Utc::now();
            let batch = match self.store.next_actions(now, self.policy.batch_size) {
                Ok(batch) => batch,
                Err(e) => {
                    log::error!("failed to read pending actions: {:#}", e);
                    return processed;
                }
            };
            if batch.is_empty() {
                return processed;
            }

            for action in batch {
                processed += 1;
                match self.backend.execute(&action) {
                    Ok(()) => {
                        if let Err(e) = self.store.complete_action(action.id) {
                            log::error!("failed to complete action {}: {:#}", action.id, e);
                        }
                    }
                    Err(e) => self.record_failure(action.id, action.attempts, &e),
                }
            }
        }
    }

    fn record_failure(&self, id: i64, prior_attempts: u32, error: &anyhow::Error) {
        // Doubling backoff, capped so the shift cannot overflow
        let backoff_ms = self
            .policy
            .base_backoff_ms
            .saturating_mul(1u64 << prior_attempts.min(16));
        let retry_at = Utc::now() + Duration::milliseconds(backoff_ms as i64);

        let attempts = match self.store.fail_action(id, &format!("{:#}", error), retry_at) {
            Ok(attempts) => attempts,
            Err(e) => {
                log::error!("failed to record failure for action {}: {:#}", id, e);
                return;
            }
        };
        log::info!(
            "remote execution of action {} failed (attempt {}): {:#}",
            id,
            attempts,
            error
        );

        if attempts >= self.policy.max_attempts {
            log::error!("action {} exhausted {} attempts; dead-lettering", id, attempts);
            if let Err(e) = self.store.dead_letter_action(id) {
                log::error!("failed to dead-letter action {}: {:#}", id, e);
            }
        }
    }

    fn run(&self, rx: Receiver<Signal>) {
        log::debug!("pending executor started");
        loop {
            self.run_once();

            // Backed-off actions need polling; otherwise sleep until kicked
            let backlog = self.store.count_pending_actions().unwrap_or(0);
            let signal = if backlog > 0 {
                match rx.recv_timeout(StdDuration::from_millis(self.policy.poll_interval_ms)) {
                    Ok(signal) => signal,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match rx.recv() {
                    Ok(signal) => signal,
                    Err(_) => break,
                }
            };

            match signal {
                Signal::Kick => continue,
                Signal::Shutdown => break,
            }
        }
        log::debug!("pending executor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabelId, LocalConversationId};
    use crate::pending::{ActionKind, NoopRemoteBackend, PendingAction};
    use crate::storage::InMemoryMailboxStore;
    use anyhow::bail;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` executions, then succeeds
    struct FlakyBackend {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl RemoteBackend for FlakyBackend {
        fn execute(&self, _action: &PendingAction) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                bail!("simulated outage");
            }
            Ok(())
        }
    }

    fn immediate_retries() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 0,
            batch_size: 16,
            poll_interval_ms: 10,
        }
    }

    fn enqueue_one(store: &InMemoryMailboxStore) -> i64 {
        store
            .enqueue_action(ActionKind::Star, &[LocalConversationId::new(1)])
            .unwrap()
            .id
    }

    #[test]
    fn test_successful_action_leaves_queue() {
        let store = Arc::new(InMemoryMailboxStore::new());
        enqueue_one(&store);
        let executor =
            PendingExecutor::spawn(store.clone(), Arc::new(NoopRemoteBackend), immediate_retries());

        executor.run_once();
        assert_eq!(store.count_pending_actions().unwrap(), 0);
        executor.shutdown();
    }

    #[test]
    fn test_failure_retries_then_succeeds() {
        let store = Arc::new(InMemoryMailboxStore::new());
        enqueue_one(&store);
        let backend = Arc::new(FlakyBackend::new(2));
        let executor =
            PendingExecutor::spawn(store.clone(), backend.clone(), immediate_retries());

        // Zero backoff makes each run_once retry immediately
        executor.run_once();
        executor.run_once();
        executor.run_once();

        assert_eq!(store.count_pending_actions().unwrap(), 0);
        assert!(store.list_dead_letters().unwrap().is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        executor.shutdown();
    }

    #[test]
    fn test_exhausted_action_dead_letters() {
        let store = Arc::new(InMemoryMailboxStore::new());
        let id = enqueue_one(&store);
        let backend = Arc::new(FlakyBackend::new(u32::MAX));
        let executor = PendingExecutor::spawn(store.clone(), backend, immediate_retries());

        for _ in 0..3 {
            executor.run_once();
        }

        assert_eq!(store.count_pending_actions().unwrap(), 0);
        let dead = store.list_dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
        assert_eq!(dead[0].attempts, 3);
        assert!(dead[0].last_error.as_deref().unwrap().contains("outage"));
        executor.shutdown();
    }

    #[test]
    fn test_kick_drains_in_background() {
        let store = Arc::new(InMemoryMailboxStore::new());
        let executor =
            PendingExecutor::spawn(store.clone(), Arc::new(NoopRemoteBackend), immediate_retries());

        store
            .enqueue_action(
                ActionKind::Move {
                    to: LabelId::new("ARCHIVE"),
                },
                &[LocalConversationId::new(1)],
            )
            .unwrap();
        executor.kick();

        let deadline = std::time::Instant::now() + StdDuration::from_secs(5);
        while store.count_pending_actions().unwrap() > 0 {
            assert!(std::time::Instant::now() < deadline, "queue never drained");
            thread::sleep(StdDuration::from_millis(5));
        }
        executor.shutdown();
    }
}
