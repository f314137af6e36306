//! Method names and argument/reply payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Calls understood by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Start,
    Stop,
    AddManualTask,
    QueryCurrent,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::Start,
        Method::Stop,
        Method::AddManualTask,
        Method::QueryCurrent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Start => "Collector.Start",
            Method::Stop => "Collector.Stop",
            Method::AddManualTask => "Collector.AddManualTask",
            Method::QueryCurrent => "Collector.QueryCurrent",
        }
    }

    pub fn parse(name: &str) -> Option<Method> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddManualTaskArgs {
    #[serde(rename = "GitLink")]
    pub git_link: String,
}

/// One running task as reported by `QueryCurrent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTask {
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(rename = "Start")]
    pub start: DateTime<Utc>,
    #[serde(rename = "Progress")]
    pub progress: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCurrentReply {
    #[serde(rename = "CurrentTasks")]
    pub current_tasks: Vec<CurrentTask>,
    #[serde(rename = "PendingTasks")]
    pub pending_tasks: Vec<String>,
    #[serde(rename = "IsRunning")]
    pub is_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip() {
        for m in Method::ALL {
            assert_eq!(Method::parse(m.as_str()), Some(m));
        }
        assert_eq!(Method::parse("Collector.Restart"), None);
        assert_eq!(Method::parse("start"), None);
    }
}
