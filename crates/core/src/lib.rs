pub mod config;
pub mod context;
pub mod error;
pub mod link;
pub mod model;
pub mod progress;
pub mod traits;

pub use config::Config;
pub use context::TaskContext;
pub use error::*;
pub use link::repository_path;
pub use model::*;
pub use progress::ProgressBuffer;
pub use traits::{GitCollector, MetadataParser, OutcomeStore, TaskSource};
