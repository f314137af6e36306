//! Git CLI collaborators: [`GitCommandCollector`] mirrors repositories onto
//! disk and [`GitLogParser`] extracts metadata from them.

mod command;
pub mod collector;
pub mod languages;
pub mod parser;

pub use collector::GitCommandCollector;
pub use command::Git;
pub use parser::{GitLogParser, LogSummary};
