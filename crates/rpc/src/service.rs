use async_trait::async_trait;
use harvest_scheduler::{RunningTasks, Scheduler};

use crate::error::RpcError;
use crate::proto::{CurrentTask, QueryCurrentReply};

/// Operations exposed by the control plane.
#[async_trait]
pub trait ControlService: Send + Sync {
    /// Resume handing out tasks.
    async fn start(&self) -> Result<(), RpcError>;

    /// Pause handing out tasks; running tasks continue.
    async fn stop(&self) -> Result<(), RpcError>;

    /// Queue a link ahead of fetched work. Already-tracked links are ignored.
    async fn add_manual_task(&self, link: &str) -> Result<(), RpcError>;

    /// Snapshot of running and pending work.
    async fn query_current(&self) -> Result<QueryCurrentReply, RpcError>;
}

/// [`ControlService`] backed by the live scheduler and running registry.
#[derive(Debug, Clone)]
pub struct SchedulerControl {
    scheduler: Scheduler,
    running: RunningTasks,
}

impl SchedulerControl {
    pub fn new(scheduler: Scheduler, running: RunningTasks) -> Self {
        Self { scheduler, running }
    }
}

#[async_trait]
impl ControlService for SchedulerControl {
    async fn start(&self) -> Result<(), RpcError> {
        self.scheduler.start();
        Ok(())
    }

    async fn stop(&self) -> Result<(), RpcError> {
        self.scheduler.stop();
        Ok(())
    }

    async fn add_manual_task(&self, link: &str) -> Result<(), RpcError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(RpcError::Remote("empty git link".into()));
        }
        self.scheduler.add_manual_task(link);
        Ok(())
    }

    async fn query_current(&self) -> Result<QueryCurrentReply, RpcError> {
        let current_tasks = self
            .running
            .snapshot()
            .into_iter()
            .map(|t| CurrentTask { link: t.link, start: t.start, progress: t.progress })
            .collect();
        Ok(QueryCurrentReply {
            current_tasks,
            pending_tasks: self.scheduler.pending_tasks(),
            is_running: self.scheduler.is_running(),
        })
    }
}
