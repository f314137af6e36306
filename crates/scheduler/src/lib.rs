//! Work scheduling and task execution for the git metadata harvester.
//!
//! [`Scheduler`] owns the pending queues and the in-flight dedup set,
//! [`WorkerPool`] drains it with a fixed number of OS threads, and
//! [`CollectionExecutor`] runs one clone/update/parse cycle per link while
//! publishing live progress through [`RunningTasks`].

pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod registry;
pub mod scheduler;

pub use config::{ExecutorConfig, PacingConfig, SchedulerConfig};
pub use error::{SchedulerError, TaskError};
pub use executor::{CollectionExecutor, TaskReport};
pub use pool::WorkerPool;
pub use registry::{RunningTaskInfo, RunningTasks};
pub use scheduler::Scheduler;
