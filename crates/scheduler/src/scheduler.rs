//! Pending-work queues with de-duplication and background replenishment.
//!
//! Two locks, never held together:
//!
//! - the queue lock guards the manual and fetched queues, the tracked set
//!   and the replenish-in-flight flag; `task_ready` is signalled whenever
//!   new work appears or a replenishment finishes.
//! - the run-state lock guards the paused and shut-down flags; `state_changed`
//!   is signalled on start, stop and shutdown.
//!
//! A link is tracked from the moment it enters a queue until
//! [`Scheduler::finish_task`] is called for it, so it is never queued twice
//! nor queued while a worker holds it.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use harvest_core::TaskSource;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

#[derive(Debug, Default)]
struct Queues {
    manual: VecDeque<String>,
    fetched: VecDeque<String>,
    tracked: HashSet<String>,
    fetch_in_progress: bool,
    closed: bool,
}

#[derive(Debug, Default)]
struct RunState {
    paused: bool,
    shutdown: bool,
}

struct Inner {
    config: SchedulerConfig,
    source: Arc<dyn TaskSource>,
    queues: Mutex<Queues>,
    task_ready: Condvar,
    state: Mutex<RunState>,
    state_changed: Condvar,
}

/// Shared handle to the scheduler. Cloning is cheap; all clones see the same
/// queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a running (not paused) scheduler over `source`.
    pub fn new(config: SchedulerConfig, source: Arc<dyn TaskSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                queues: Mutex::new(Queues::default()),
                task_ready: Condvar::new(),
                state: Mutex::new(RunState::default()),
                state_changed: Condvar::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    // ── Work intake ─────────────────────────────────────────────

    /// Queue an operator-submitted link ahead of fetched work.
    ///
    /// Returns `false` when the link is already tracked (queued or running),
    /// in which case nothing changes.
    pub fn add_manual_task(&self, link: &str) -> bool {
        let mut q = self.lock_queues();
        if !q.tracked.insert(link.to_string()) {
            debug!(link, "manual task already tracked, ignoring");
            return false;
        }
        q.manual.push_back(link.to_string());
        drop(q);
        self.inner.task_ready.notify_all();
        info!(link, "manual task queued");
        true
    }

    /// Block until a link is available and hand it to the caller.
    ///
    /// Waits while the scheduler is paused, then prefers manual links over
    /// fetched ones. Triggers a replenishment when the fetched queue runs low.
    /// The returned link stays tracked until [`finish_task`](Self::finish_task).
    pub fn get_task(&self) -> Result<String, SchedulerError> {
        self.wait_while_paused()?;

        let mut q = self.lock_queues();
        if let Some(link) = q.manual.pop_front() {
            return Ok(link);
        }
        if q.fetched.len() < self.inner.config.fetch_threshold {
            self.trigger_replenish(&mut q);
        }
        loop {
            if q.closed {
                return Err(SchedulerError::Shutdown);
            }
            if let Some(link) = q.manual.pop_front() {
                return Ok(link);
            }
            if let Some(link) = q.fetched.pop_front() {
                return Ok(link);
            }
            self.trigger_replenish(&mut q);
            q = self
                .inner
                .task_ready
                .wait(q)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Stop tracking `link` so it may be queued again. Idempotent.
    pub fn finish_task(&self, link: &str) {
        self.lock_queues().tracked.remove(link);
    }

    // ── Run state ───────────────────────────────────────────────

    /// Resume handing out tasks.
    pub fn start(&self) {
        self.set_paused(false);
        info!("collector started");
    }

    /// Pause: `get_task` blocks until [`start`](Self::start). Running tasks
    /// are not interrupted.
    pub fn stop(&self) {
        self.set_paused(true);
        info!("collector stopped");
    }

    pub fn is_running(&self) -> bool {
        let state = self.lock_state();
        !state.paused && !state.shutdown
    }

    /// Wake every waiter and make all further `get_task` calls fail.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            state.shutdown = true;
        }
        self.inner.state_changed.notify_all();
        {
            let mut q = self.lock_queues();
            q.closed = true;
        }
        self.inner.task_ready.notify_all();
        info!("scheduler shut down");
    }

    // ── Introspection ───────────────────────────────────────────

    /// Manual links first, then fetched links, each in queue order.
    pub fn pending_tasks(&self) -> Vec<String> {
        let q = self.lock_queues();
        q.manual.iter().chain(q.fetched.iter()).cloned().collect()
    }

    pub fn is_tracked(&self, link: &str) -> bool {
        self.lock_queues().tracked.contains(link)
    }

    pub fn tracked_count(&self) -> usize {
        self.lock_queues().tracked.len()
    }

    pub fn fetch_in_progress(&self) -> bool {
        self.lock_queues().fetch_in_progress
    }

    // ── Internals ───────────────────────────────────────────────

    fn lock_queues(&self) -> MutexGuard<'_, Queues> {
        self.inner.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_paused(&self, paused: bool) {
        self.lock_state().paused = paused;
        self.inner.state_changed.notify_all();
    }

    fn wait_while_paused(&self) -> Result<(), SchedulerError> {
        let state = self.lock_state();
        let state = self
            .inner
            .state_changed
            .wait_while(state, |s| s.paused && !s.shutdown)
            .unwrap_or_else(|e| e.into_inner());
        if state.shutdown {
            return Err(SchedulerError::Shutdown);
        }
        Ok(())
    }

    /// Start a background replenishment unless one is already running.
    /// Called with the queue lock held.
    fn trigger_replenish(&self, q: &mut Queues) {
        if q.fetch_in_progress || q.closed {
            return;
        }
        q.fetch_in_progress = true;

        let scheduler = self.clone();
        let spawned = thread::Builder::new()
            .name("harvest-replenish".to_string())
            .spawn(move || scheduler.replenish());
        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn replenishment thread");
            q.fetch_in_progress = false;
        }
    }

    /// Query the source until at least one new link is queued or the
    /// scheduler shuts down, then clear the in-flight flag and wake waiters.
    fn replenish(&self) {
        let config = &self.inner.config;
        debug!(
            threshold = config.fetch_threshold,
            fetch_size = config.fetch_size,
            "fetched queue below threshold, querying task source"
        );

        while !self.lock_state().shutdown {
            match self.inner.source.query(config.fetch_size) {
                Ok(batch) => {
                    let returned = batch.len();
                    let added = self.enqueue_fetched(batch);
                    if added > 0 {
                        info!(returned, added, "task source replenished queue");
                        self.inner.task_ready.notify_all();
                        break;
                    }
                    debug!(returned, "task source yielded no new links");
                }
                Err(e) => warn!(error = %e, "task source query failed"),
            }
            self.idle();
        }

        self.lock_queues().fetch_in_progress = false;
        self.inner.task_ready.notify_all();
    }

    fn enqueue_fetched(&self, batch: Vec<String>) -> usize {
        let mut q = self.lock_queues();
        let mut added = 0;
        for link in batch {
            if q.tracked.insert(link.clone()) {
                q.fetched.push_back(link);
                added += 1;
            }
        }
        added
    }

    /// Sleep for the idle interval, returning early on shutdown.
    fn idle(&self) {
        let state = self.lock_state();
        let _ = self
            .inner
            .state_changed
            .wait_timeout_while(state, self.inner.config.idle_interval, |s| !s.shutdown);
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}
