//! # Supervisor
//!
//! Runs named background callers on the tokio runtime. Each caller repeatedly
//! invokes a job against the shared [`IsolationManager`], waiting `interval`
//! between cycles. A failing cycle is logged and followed by a fixed backoff
//! instead of the normal interval; the loop itself never stops on error.
//!
//! Jobs do blocking file I/O, so each cycle runs on the blocking thread pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::isolation::{IsolationError, IsolationManager};

/// Pause after a failed cycle.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

type Job = dyn Fn(&IsolationManager, &str) -> Result<(), IsolationError> + Send + Sync;

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    failures: AtomicU64,
}

struct CallerLoop {
    counters: Arc<Counters>,
    handle: JoinHandle<()>,
}

pub struct Supervisor {
    manager: Arc<IsolationManager>,
    token: CancellationToken,
    backoff: Duration,
    loops: BTreeMap<String, CallerLoop>,
}

impl Supervisor {
    pub fn new(manager: Arc<IsolationManager>) -> Self {
        Self {
            manager,
            token: CancellationToken::new(),
            backoff: DEFAULT_BACKOFF,
            loops: BTreeMap::new(),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn manager(&self) -> &Arc<IsolationManager> {
        &self.manager
    }

    /// Start a caller loop. The first cycle runs immediately.
    ///
    /// Spawning a second loop under an existing name replaces the first one.
    pub fn spawn<F>(&mut self, name: impl Into<String>, interval: Duration, job: F)
    where
        F: Fn(&IsolationManager, &str) -> Result<(), IsolationError> + Send + Sync + 'static,
    {
        let name = name.into();
        let counters = Arc::new(Counters::default());
        let job: Arc<Job> = Arc::new(job);

        let handle = tokio::spawn(run_loop(
            name.clone(),
            Arc::clone(&self.manager),
            job,
            interval,
            self.backoff,
            Arc::clone(&counters),
            self.token.child_token(),
        ));

        tracing::info!(caller = %name, interval_ms = interval.as_millis() as u64, "Started caller loop");
        if let Some(previous) = self.loops.insert(name, CallerLoop { counters, handle }) {
            previous.handle.abort();
        }
    }

    pub fn callers(&self) -> impl Iterator<Item = &str> {
        self.loops.keys().map(String::as_str)
    }

    /// Completed cycles for `caller`, successful or not.
    pub fn cycles(&self, caller: &str) -> Option<u64> {
        self.loops
            .get(caller)
            .map(|l| l.counters.cycles.load(Ordering::Relaxed))
    }

    pub fn failures(&self, caller: &str) -> Option<u64> {
        self.loops
            .get(caller)
            .map(|l| l.counters.failures.load(Ordering::Relaxed))
    }

    /// Token that stops every loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel every loop and wait for them to finish their current cycle.
    pub async fn shutdown(self) {
        self.token.cancel();
        let results = join_all(self.loops.into_values().map(|l| l.handle)).await;
        for result in results {
            if let Err(e) = result
                && !e.is_cancelled()
            {
                tracing::error!(error = %e, "Caller loop ended abnormally");
            }
        }
        tracing::info!("Supervisor stopped");
    }
}

async fn run_loop(
    name: String,
    manager: Arc<IsolationManager>,
    job: Arc<Job>,
    interval: Duration,
    backoff: Duration,
    counters: Arc<Counters>,
    token: CancellationToken,
) {
    let mut delay = Duration::ZERO;
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let cycle = {
            let manager = Arc::clone(&manager);
            let job = Arc::clone(&job);
            let name = name.clone();
            tokio::task::spawn_blocking(move || (*job)(&manager, &name)).await
        };
        counters.cycles.fetch_add(1, Ordering::Relaxed);

        delay = match cycle {
            Ok(Ok(())) => interval,
            Ok(Err(e)) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    caller = %name,
                    error = %e,
                    kind = ?e.kind(),
                    backoff_ms = backoff.as_millis() as u64,
                    "Caller cycle failed"
                );
                backoff
            }
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(caller = %name, error = %e, "Caller cycle panicked");
                backoff
            }
        };
    }
    tracing::debug!(caller = %name, "Caller loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsolationConfig;
    use crate::isolation::ProtectedPathRule;
    use std::time::Instant;
    use tempfile::tempdir;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn manager(root: &std::path::Path) -> Arc<IsolationManager> {
        let config = IsolationConfig::new(root)
            .with_protected_paths(vec![ProtectedPathRule::critical("secrets/")]);
        Arc::new(IsolationManager::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_loop_runs_job_repeatedly() {
        let temp = tempdir().unwrap();
        let manager = manager(temp.path());
        let mut supervisor = Supervisor::new(Arc::clone(&manager));

        supervisor.spawn("writer", Duration::from_millis(5), |m, caller| {
            m.safe_write(caller, "tick", "status.txt").map(|_| ())
        });

        wait_until(|| supervisor.cycles("writer").unwrap_or(0) >= 3).await;
        assert_eq!(supervisor.failures("writer"), Some(0));
        supervisor.shutdown().await;

        let record = manager.sandbox("writer").unwrap();
        assert!(record.operations_count >= 3);
        assert_eq!(manager.audit_len() as u64, record.operations_count);
    }

    #[tokio::test]
    async fn test_failing_job_backs_off_and_keeps_running() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("secrets")).unwrap();
        std::fs::write(temp.path().join("secrets/key.txt"), "k").unwrap();
        let manager = manager(temp.path());
        let mut supervisor =
            Supervisor::new(Arc::clone(&manager)).with_backoff(Duration::from_millis(5));

        supervisor.spawn("snoop", Duration::from_secs(3600), |m, caller| {
            m.safe_read(caller, "secrets/key.txt").map(|_| ())
        });

        wait_until(|| supervisor.failures("snoop").unwrap_or(0) >= 2).await;
        supervisor.shutdown().await;
        assert_eq!(manager.audit_len(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_long_sleeping_loops() {
        let temp = tempdir().unwrap();
        let mut supervisor = Supervisor::new(manager(temp.path()));
        supervisor.spawn("idle", Duration::from_secs(3600), |_, _| Ok(()));
        wait_until(|| supervisor.cycles("idle") == Some(1)).await;

        assert_eq!(supervisor.callers().collect::<Vec<_>>(), vec!["idle"]);
        tokio::time::timeout(Duration::from_secs(5), supervisor.shutdown())
            .await
            .unwrap();
    }
}
