//! Fixed-size pool of worker threads draining the scheduler.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::config::PacingConfig;
use crate::error::{SchedulerError, TaskError};
use crate::executor::CollectionExecutor;
use crate::scheduler::Scheduler;

/// Handles of the spawned worker threads.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` named threads. Each loops `get_task` -> pace -> run ->
    /// `finish_task` until the scheduler shuts down.
    pub fn spawn(
        workers: usize,
        pacing: PacingConfig,
        scheduler: Scheduler,
        executor: Arc<CollectionExecutor>,
    ) -> io::Result<Self> {
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let scheduler = scheduler.clone();
            let executor = Arc::clone(&executor);
            let pacing = pacing.clone();
            let handle = thread::Builder::new()
                .name(format!("harvest-worker-{id}"))
                .spawn(move || worker_loop(id, &scheduler, &executor, &pacing))?;
            handles.push(handle);
        }
        info!(workers, "worker pool started");
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Workers exit once the scheduler is shut
    /// down and their current task has finished.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                error!("worker thread terminated abnormally");
            }
        }
    }
}

/// Untracks the link when the worker is done with it, on every exit path.
struct FinishGuard<'a> {
    scheduler: &'a Scheduler,
    link: &'a str,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.finish_task(self.link);
    }
}

fn worker_loop(
    id: usize,
    scheduler: &Scheduler,
    executor: &CollectionExecutor,
    pacing: &PacingConfig,
) {
    let mut iteration: u64 = 0;
    loop {
        let link = match scheduler.get_task() {
            Ok(link) => link,
            Err(SchedulerError::Shutdown) => break,
        };
        let _finish = FinishGuard { scheduler, link: &link };

        let delay = pacing.delay_for(iteration);
        iteration += 1;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        match executor.run(&link) {
            Ok(report) => info!(
                worker = id,
                link = %link,
                elapsed_ms = report.elapsed.as_millis() as u64,
                parsed = report.metrics.is_some(),
                "task finished"
            ),
            Err(e @ TaskError::PathResolution(_)) => warn!(
                worker = id,
                link = %link,
                error.kind = e.kind(),
                error = %e,
                "dropping task without record"
            ),
            Err(TaskError::Panicked(msg)) => error!(
                worker = id,
                link = %link,
                error.kind = "panic",
                panic = %msg,
                "task panicked"
            ),
            Err(e) => error!(
                worker = id,
                link = %link,
                error.kind = e.kind(),
                error = %e,
                "task failed"
            ),
        }
    }
    info!(worker = id, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use harvest_core::{
        CloneOutcome, CloneRecord, CollectError, GitCollector, MetadataParser, OutcomeStore,
        ParseError, ProgressBuffer, RepoHandle, RepoMetrics, SourceError, StoreError, TaskContext,
        TaskSource,
    };

    use crate::config::{ExecutorConfig, SchedulerConfig};
    use crate::registry::RunningTasks;

    struct OnceSource {
        batches: Mutex<VecDeque<Vec<String>>>,
    }

    impl TaskSource for OnceSource {
        fn query(&self, _limit: usize) -> Result<Vec<String>, SourceError> {
            Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    /// Links ending in `/slow` block until `release` is set.
    #[derive(Default)]
    struct CountingCollector {
        calls: AtomicUsize,
        release: AtomicBool,
    }

    impl GitCollector for CountingCollector {
        fn collect_or_update(
            &self,
            link: &str,
            path: &Path,
            _progress: &ProgressBuffer,
            _ctx: &TaskContext,
        ) -> Result<RepoHandle, CollectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if link.ends_with("/boom") {
                panic!("bad repo");
            }
            while link.ends_with("/slow") && !self.release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(RepoHandle { link: link.to_string(), path: path.to_path_buf() })
        }
    }

    struct NoopParser;

    impl MetadataParser for NoopParser {
        fn parse(&self, repo: &RepoHandle, _ctx: &TaskContext) -> Result<RepoMetrics, ParseError> {
            Ok(RepoMetrics {
                link: repo.link.clone(),
                contributor_count: 1,
                commit_frequency: 0.0,
                org_count: 1,
                languages: vec![],
                created_since: Utc::now(),
                updated_since: Utc::now(),
            })
        }
    }

    #[derive(Default)]
    struct CountingStore {
        clones: AtomicUsize,
    }

    impl OutcomeStore for CountingStore {
        fn clone_record(&self, _link: &str) -> Result<Option<CloneRecord>, StoreError> {
            Ok(None)
        }
        fn record_clone(&self, _outcome: &CloneOutcome) -> Result<(), StoreError> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn record_metrics(&self, _metrics: &RepoMetrics) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    type Setup = (
        tempfile::TempDir,
        Scheduler,
        Arc<CollectionExecutor>,
        Arc<CountingCollector>,
        Arc<CountingStore>,
    );

    fn setup(batches: Vec<Vec<String>>) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(OnceSource { batches: Mutex::new(batches.into()) });
        let config = SchedulerConfig {
            fetch_size: 10,
            fetch_threshold: 2,
            idle_interval: Duration::from_millis(10),
        };
        let scheduler = Scheduler::new(config, source);
        let collector = Arc::new(CountingCollector::default());
        let store = Arc::new(CountingStore::default());
        let executor = Arc::new(CollectionExecutor::new(
            ExecutorConfig::new(dir.path()),
            store.clone(),
            collector.clone(),
            Arc::new(NoopParser),
            RunningTasks::new(),
        ));
        (dir, scheduler, executor, collector, store)
    }

    fn spawn_pool(
        workers: usize,
        scheduler: &Scheduler,
        executor: &Arc<CollectionExecutor>,
    ) -> WorkerPool {
        WorkerPool::spawn(workers, PacingConfig::none(), scheduler.clone(), Arc::clone(executor))
            .unwrap()
    }

    #[test]
    fn single_manual_task_runs_once_and_is_untracked() {
        let (_dir, scheduler, executor, collector, store) = setup(vec![]);
        let pool = spawn_pool(1, &scheduler, &executor);

        scheduler.add_manual_task("https://example.com/a/b");
        assert!(wait_for(|| store.clones.load(Ordering::SeqCst) == 1));
        assert!(wait_for(|| !scheduler.is_tracked("https://example.com/a/b")));
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
        assert!(executor.running().is_empty());

        scheduler.shutdown();
        pool.join();
        assert_eq!(collector.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pool_drains_fetched_work_and_survives_panics() {
        let batch = vec![
            "https://example.com/a/one".to_string(),
            "https://example.com/a/boom".to_string(),
            "https://example.com/a/two".to_string(),
            "not a link".to_string(),
        ];
        let (_dir, scheduler, executor, collector, store) = setup(vec![batch]);
        let pool = spawn_pool(2, &scheduler, &executor);
        assert_eq!(pool.len(), 2);

        assert!(wait_for(|| {
            scheduler.tracked_count() == 0 && collector.calls.load(Ordering::SeqCst) == 3
        }));
        assert_eq!(store.clones.load(Ordering::SeqCst), 2);

        scheduler.shutdown();
        pool.join();
    }

    #[test]
    fn tracked_links_are_exactly_pending_plus_running() {
        let slow = "https://example.com/a/slow";
        let batch = vec![
            slow.to_string(),
            "https://example.com/a/next".to_string(),
            "https://example.com/a/last".to_string(),
        ];
        let (_dir, scheduler, executor, collector, store) = setup(vec![batch]);
        let pool = spawn_pool(1, &scheduler, &executor);

        assert!(wait_for(|| executor.running().contains(slow)));
        scheduler.add_manual_task("https://example.com/b/manual");

        let pending: HashSet<String> = scheduler.pending_tasks().into_iter().collect();
        let running: HashSet<String> =
            executor.running().snapshot().into_iter().map(|t| t.link).collect();
        assert_eq!(pending.len(), 3);
        assert_eq!(running.len(), 1);
        assert!(pending.is_disjoint(&running));
        assert_eq!(scheduler.tracked_count(), pending.len() + running.len());
        assert!(scheduler.is_tracked(slow));

        collector.release.store(true, Ordering::SeqCst);
        assert!(wait_for(|| {
            scheduler.tracked_count() == 0 && store.clones.load(Ordering::SeqCst) == 4
        }));
        assert_eq!(collector.calls.load(Ordering::SeqCst), 4);

        scheduler.shutdown();
        pool.join();
    }
}
