//! Registry of tasks currently executing, with live progress.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use harvest_core::ProgressBuffer;
use serde::Serialize;

#[derive(Debug)]
struct RunningTask {
    start: DateTime<Utc>,
    progress: Arc<ProgressBuffer>,
}

/// Point-in-time view of one running task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningTaskInfo {
    pub link: String,
    pub start: DateTime<Utc>,
    pub progress: String,
}

/// Shared map of link -> running task. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct RunningTasks {
    tasks: Arc<Mutex<HashMap<String, RunningTask>>>,
}

impl RunningTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `link` as running. The entry is removed when the returned
    /// guard is dropped, including during unwinding.
    pub fn register(&self, link: &str) -> RunningGuard {
        let progress = Arc::new(ProgressBuffer::new());
        self.lock().insert(
            link.to_string(),
            RunningTask { start: Utc::now(), progress: Arc::clone(&progress) },
        );
        RunningGuard { registry: self.clone(), link: link.to_string(), progress }
    }

    /// Render every running task, oldest first.
    pub fn snapshot(&self) -> Vec<RunningTaskInfo> {
        let tasks = self.lock();
        let mut out: Vec<RunningTaskInfo> = tasks
            .iter()
            .map(|(link, task)| RunningTaskInfo {
                link: link.clone(),
                start: task.start,
                progress: task.progress.to_string(),
            })
            .collect();
        out.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.link.cmp(&b.link)));
        out
    }

    pub fn contains(&self, link: &str) -> bool {
        self.lock().contains_key(link)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunningTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps a link registered as running for its lifetime.
#[derive(Debug)]
pub struct RunningGuard {
    registry: RunningTasks,
    link: String,
    progress: Arc<ProgressBuffer>,
}

impl RunningGuard {
    pub fn progress(&self) -> &ProgressBuffer {
        &self.progress
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.link);
    }
}
