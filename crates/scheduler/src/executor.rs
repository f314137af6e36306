//! One clone/update + parse cycle for a single link.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use harvest_core::{
    repository_path, CloneOutcome, CloneRecord, CollectError, GitCollector, MetadataParser,
    OutcomeStore, ProgressBuffer, RepoHandle, RepoMetrics, TaskContext,
};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::ExecutorConfig;
use crate::error::TaskError;
use crate::registry::RunningTasks;

/// Summary of a completed task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub link: String,
    pub path: PathBuf,
    pub elapsed: Duration,
    /// `None` when parsing was skipped.
    pub metrics: Option<RepoMetrics>,
}

/// Runs collection tasks against the configured collaborators.
pub struct CollectionExecutor {
    config: ExecutorConfig,
    store: Arc<dyn OutcomeStore>,
    collector: Arc<dyn GitCollector>,
    parser: Arc<dyn MetadataParser>,
    running: RunningTasks,
}

impl CollectionExecutor {
    pub fn new(
        mut config: ExecutorConfig,
        store: Arc<dyn OutcomeStore>,
        collector: Arc<dyn GitCollector>,
        parser: Arc<dyn MetadataParser>,
        running: RunningTasks,
    ) -> Self {
        if let Ok(abs) = std::path::absolute(&config.storage_root) {
            config.storage_root = abs;
        }
        Self { config, store, collector, parser, running }
    }

    pub fn running(&self) -> &RunningTasks {
        &self.running
    }

    /// Execute the task for `link` inside a panic boundary.
    ///
    /// A panic in any collaborator is reported as [`TaskError::Panicked`];
    /// the running-registry entry is released either way.
    pub fn run(&self, link: &str) -> Result<TaskReport, TaskError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.execute(link))) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
        }
    }

    fn execute(&self, link: &str) -> Result<TaskReport, TaskError> {
        let started = Instant::now();
        let guard = self.running.register(link);
        let ctx = TaskContext::with_timeout(self.config.task_timeout);

        let file_path = self.resolve_path(link)?;
        let path = self.config.storage_root.join(&file_path);
        debug!(link, path = %path.display(), "collecting repository");

        let repo = match self.collector.collect_or_update(link, &path, guard.progress(), &ctx) {
            Ok(repo) => repo,
            Err(e) => {
                self.record_failure(link, &file_path, started, &e, guard.progress());
                return Err(TaskError::Clone(e));
            }
        };
        self.record_success(link, &file_path, started, &repo);

        if self.config.skip_parse {
            return Ok(TaskReport {
                link: link.to_string(),
                path,
                elapsed: started.elapsed(),
                metrics: None,
            });
        }

        let metrics = self.parser.parse(&repo, &ctx)?;
        if let Err(e) = self.store.record_metrics(&metrics) {
            error!(link, error = %e, "failed to store repository metrics");
        }
        Ok(TaskReport {
            link: link.to_string(),
            path,
            elapsed: started.elapsed(),
            metrics: Some(metrics),
        })
    }

    /// Storage path for `link`, relative to the storage root.
    ///
    /// A previously recorded path is kept while it still exists on disk, so
    /// mirrors created under an older layout keep being updated in place.
    fn resolve_path(&self, link: &str) -> Result<String, TaskError> {
        match self.store.clone_record(link) {
            Ok(Some(CloneRecord { file_path: Some(recorded), .. })) if !recorded.is_empty() => {
                if self.config.storage_root.join(&recorded).exists() {
                    return Ok(recorded);
                }
                warn!(
                    link,
                    path = %recorded,
                    "recorded repository path is missing, deriving a new one"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(link, error = %e, "failed to load clone record"),
        }
        let relative = repository_path(link)?;
        Ok(relative.to_string_lossy().into_owned())
    }

    fn record_success(&self, link: &str, file_path: &str, started: Instant, repo: &RepoHandle) {
        let size = directory_size(&repo.path);
        let outcome = CloneOutcome {
            link: link.to_string(),
            file_path: file_path.to_string(),
            success: true,
            message: None,
            update_time: Utc::now(),
            take_time_ms: elapsed_ms(started),
            take_storage: Some(size),
        };
        info!(
            link,
            take_time_ms = outcome.take_time_ms,
            take_storage = size,
            "repository collected"
        );
        self.store_outcome(&outcome);
    }

    fn record_failure(
        &self,
        link: &str,
        file_path: &str,
        started: Instant,
        err: &CollectError,
        progress: &ProgressBuffer,
    ) {
        let outcome = CloneOutcome {
            link: link.to_string(),
            file_path: file_path.to_string(),
            success: false,
            message: Some(format!("{err}\nOutput:\n{progress}")),
            update_time: Utc::now(),
            take_time_ms: elapsed_ms(started),
            take_storage: None,
        };
        warn!(link, error = %err, "repository collection failed");
        self.store_outcome(&outcome);
    }

    fn store_outcome(&self, outcome: &CloneOutcome) {
        if let Err(e) = self.store.record_clone(outcome) {
            error!(link = %outcome.link, error = %e, "failed to store clone outcome");
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

/// Total size of regular files under `path`, in bytes.
fn directory_size(path: &Path) -> i64 {
    let total: u64 = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    i64::try_from(total).unwrap_or(i64::MAX)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use harvest_core::{ParseError, StoreError};

    #[derive(Default)]
    struct RecordingStore {
        previous: Mutex<Option<CloneRecord>>,
        clones: Mutex<Vec<CloneOutcome>>,
        metrics: Mutex<Vec<RepoMetrics>>,
    }

    impl RecordingStore {
        fn remember_path(&self, link: &str, file_path: &str) {
            *self.previous.lock().unwrap() = Some(CloneRecord {
                link: link.to_string(),
                file_path: Some(file_path.to_string()),
                success: true,
                message: None,
                update_time: Some(Utc::now()),
                failed_times: 0,
                last_success: Some(Utc::now()),
                take_time_ms: Some(10),
                take_storage: Some(9),
            });
        }
    }

    impl OutcomeStore for RecordingStore {
        fn clone_record(&self, link: &str) -> Result<Option<CloneRecord>, StoreError> {
            let previous = self.previous.lock().unwrap();
            Ok(previous.as_ref().filter(|r| r.link == link).cloned())
        }

        fn record_clone(&self, outcome: &CloneOutcome) -> Result<(), StoreError> {
            self.clones.lock().unwrap().push(outcome.clone());
            Ok(())
        }

        fn record_metrics(&self, metrics: &RepoMetrics) -> Result<(), StoreError> {
            self.metrics.lock().unwrap().push(metrics.clone());
            Ok(())
        }
    }

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
    }

    struct MockCollector {
        behaviour: Behaviour,
        running: RunningTasks,
        calls: AtomicUsize,
        saw_registered: AtomicUsize,
        paths: Mutex<Vec<PathBuf>>,
    }

    impl MockCollector {
        fn new(behaviour: Behaviour, running: &RunningTasks) -> Self {
            Self {
                behaviour,
                running: running.clone(),
                calls: AtomicUsize::new(0),
                saw_registered: AtomicUsize::new(0),
                paths: Mutex::new(Vec::new()),
            }
        }
    }

    impl GitCollector for MockCollector {
        fn collect_or_update(
            &self,
            link: &str,
            path: &Path,
            progress: &ProgressBuffer,
            _ctx: &TaskContext,
        ) -> Result<RepoHandle, CollectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.paths.lock().unwrap().push(path.to_path_buf());
            if self.running.contains(link) {
                self.saw_registered.fetch_add(1, Ordering::SeqCst);
            }
            progress.write_bytes(b"Receiving objects: 50%\rReceiving objects: 100%\n");
            match self.behaviour {
                Behaviour::Succeed => {
                    std::fs::create_dir_all(path)?;
                    std::fs::write(path.join("HEAD"), b"ref: main")?;
                    Ok(RepoHandle { link: link.to_string(), path: path.to_path_buf() })
                }
                Behaviour::Fail => Err(CollectError::GitFailed {
                    status: "exit status: 128".into(),
                }),
                Behaviour::Panic => panic!("collector exploded"),
            }
        }
    }

    #[derive(Default)]
    struct MockParser {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl MetadataParser for MockParser {
        fn parse(&self, repo: &RepoHandle, _ctx: &TaskContext) -> Result<RepoMetrics, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ParseError::EmptyHistory);
            }
            Ok(RepoMetrics {
                link: repo.link.clone(),
                contributor_count: 3,
                commit_frequency: 1.5,
                org_count: 1,
                languages: vec!["Rust".into()],
                created_since: Utc::now(),
                updated_since: Utc::now(),
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        executor: CollectionExecutor,
        store: Arc<RecordingStore>,
        collector: Arc<MockCollector>,
        parser: Arc<MockParser>,
    }

    fn fixture(behaviour: Behaviour, skip_parse: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let running = RunningTasks::new();
        let store = Arc::new(RecordingStore::default());
        let collector = Arc::new(MockCollector::new(behaviour, &running));
        let parser = Arc::new(MockParser::default());
        let mut config = ExecutorConfig::new(dir.path());
        config.skip_parse = skip_parse;
        let executor = CollectionExecutor::new(
            config,
            store.clone(),
            collector.clone(),
            parser.clone(),
            running,
        );
        Fixture { dir, executor, store, collector, parser }
    }

    #[test]
    fn successful_task_records_clone_and_metrics() {
        let f = fixture(Behaviour::Succeed, false);
        let report = f.executor.run("https://github.com/rust-lang/cargo").unwrap();

        assert!(report.path.ends_with("github.com/ru/st/rust-lang/cargo"));
        assert!(report.path.is_absolute());
        assert!(report.metrics.is_some());
        assert_eq!(f.collector.saw_registered.load(Ordering::SeqCst), 1);
        assert!(f.executor.running().is_empty());

        let clones = f.store.clones.lock().unwrap();
        assert_eq!(clones.len(), 1);
        assert!(clones[0].success);
        assert_eq!(clones[0].file_path, "github.com/ru/st/rust-lang/cargo");
        assert_eq!(clones[0].take_storage, Some(9));
        assert_eq!(f.store.metrics.lock().unwrap().len(), 1);
    }

    #[test]
    fn clone_failure_records_error_with_progress() {
        let f = fixture(Behaviour::Fail, false);
        let err = f.executor.run("https://github.com/rust-lang/cargo").unwrap_err();
        assert!(matches!(err, TaskError::Clone(CollectError::GitFailed { .. })));
        assert_eq!(f.parser.calls.load(Ordering::SeqCst), 0);

        let clones = f.store.clones.lock().unwrap();
        assert_eq!(clones.len(), 1);
        assert!(!clones[0].success);
        assert_eq!(
            clones[0].message.as_deref(),
            Some("git exited with exit status: 128\nOutput:\nReceiving objects: 100%")
        );
        assert!(f.store.metrics.lock().unwrap().is_empty());
    }

    #[test]
    fn unresolvable_link_is_dropped_without_record() {
        let f = fixture(Behaviour::Succeed, false);
        let err = f.executor.run("not a link").unwrap_err();
        assert!(matches!(err, TaskError::PathResolution(_)));
        assert_eq!(err.kind(), "path_resolution");
        assert_eq!(f.collector.calls.load(Ordering::SeqCst), 0);
        assert!(f.store.clones.lock().unwrap().is_empty());
        assert!(f.executor.running().is_empty());
    }

    #[test]
    fn skip_parse_only_collects() {
        let f = fixture(Behaviour::Succeed, true);
        let report = f.executor.run("https://example.com/a/b").unwrap();
        assert!(report.metrics.is_none());
        assert_eq!(f.parser.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.clones.lock().unwrap().len(), 1);
    }

    #[test]
    fn collaborator_panic_is_contained() {
        let f = fixture(Behaviour::Panic, false);
        let err = f.executor.run("https://example.com/a/b").unwrap_err();
        match err {
            TaskError::Panicked(msg) => assert_eq!(msg, "collector exploded"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.executor.running().is_empty());
        assert!(f.store.clones.lock().unwrap().is_empty());
    }

    #[test]
    fn parse_failure_keeps_successful_clone_record() {
        let f = fixture(Behaviour::Succeed, false);
        f.parser.fail.store(true, Ordering::SeqCst);
        let err = f.executor.run("https://example.com/a/b").unwrap_err();
        assert!(matches!(err, TaskError::Parse(ParseError::EmptyHistory)));
        assert_eq!(err.kind(), "parse");

        let clones = f.store.clones.lock().unwrap();
        assert_eq!(clones.len(), 1);
        assert!(clones[0].success);
        assert!(f.store.metrics.lock().unwrap().is_empty());
        assert!(f.executor.running().is_empty());
    }

    #[test]
    fn existing_recorded_path_is_reused() {
        let f = fixture(Behaviour::Succeed, true);
        let link = "https://github.com/rust-lang/cargo";
        std::fs::create_dir_all(f.dir.path().join("legacy/layout/cargo")).unwrap();
        f.store.remember_path(link, "legacy/layout/cargo");

        let report = f.executor.run(link).unwrap();
        assert!(report.path.ends_with("legacy/layout/cargo"));
        let paths = f.collector.paths.lock().unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("legacy/layout/cargo"));
        assert_eq!(f.store.clones.lock().unwrap()[0].file_path, "legacy/layout/cargo");
    }

    #[test]
    fn missing_recorded_path_falls_back_to_derived_layout() {
        let f = fixture(Behaviour::Succeed, true);
        let link = "https://github.com/rust-lang/cargo";
        f.store.remember_path(link, "legacy/layout/cargo");

        let report = f.executor.run(link).unwrap();
        assert!(report.path.ends_with("github.com/ru/st/rust-lang/cargo"));
        assert!(!f.dir.path().join("legacy/layout/cargo").exists());
        assert_eq!(
            f.store.clones.lock().unwrap()[0].file_path,
            "github.com/ru/st/rust-lang/cargo"
        );
    }
}
