//! Contributor, activity and language metadata from `git log` / `git ls-tree`.

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use harvest_core::{MetadataParser, ParseError, RepoHandle, RepoMetrics, TaskContext};
use tracing::debug;

use crate::command::Git;
use crate::languages::rank_languages;

/// Languages reported per repository.
pub const TOP_N_LANGUAGES: usize = 5;

const LOG_FORMAT: &str = "--format=%an%x09%ae%x09%at%x09%ct";

/// Aggregates over the full commit history.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    pub commit_count: usize,
    pub contributor_count: usize,
    pub org_count: usize,
    /// Commits authored in the 365 days before `now`, per week.
    pub commit_frequency: f64,
    pub created_since: DateTime<Utc>,
    pub updated_since: DateTime<Utc>,
}

/// [`MetadataParser`] that shells out to git.
#[derive(Debug, Clone)]
pub struct GitLogParser {
    git: Git,
    top_n: usize,
}

impl Default for GitLogParser {
    fn default() -> Self {
        Self { git: Git::default(), top_n: TOP_N_LANGUAGES }
    }
}

impl GitLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_git(mut self, git: Git) -> Self {
        self.git = git;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    fn git_stdout(
        &self,
        repo: &RepoHandle,
        args: &[&str],
        ctx: &TaskContext,
    ) -> Result<String, ParseError> {
        let out = self.git.run_captured(Some(repo.path.as_path()), args, ctx)?;
        if !out.status.success() {
            return Err(ParseError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl MetadataParser for GitLogParser {
    fn parse(&self, repo: &RepoHandle, ctx: &TaskContext) -> Result<RepoMetrics, ParseError> {
        let log = self.git_stdout(repo, &["log", "--all", LOG_FORMAT], ctx)?;
        let summary = summarize_log(&log, Utc::now())?;

        let tree = self.git_stdout(repo, &["ls-tree", "-r", "-l", "-z", "HEAD"], ctx)?;
        let languages = rank_languages(parse_ls_tree(&tree), self.top_n);
        debug!(
            link = %repo.link,
            commits = summary.commit_count,
            contributors = summary.contributor_count,
            languages = ?languages,
            "parsed repository"
        );

        Ok(RepoMetrics {
            link: repo.link.clone(),
            contributor_count: clamp_i32(summary.contributor_count),
            commit_frequency: summary.commit_frequency,
            org_count: clamp_i32(summary.org_count),
            languages,
            created_since: summary.created_since,
            updated_since: summary.updated_since,
        })
    }
}

fn clamp_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Fold `git log` output in [`LOG_FORMAT`] into a [`LogSummary`].
///
/// Contributors are distinct `name(email)` pairs; organisations are distinct
/// email domains (the whole address when it has no `@`).
pub fn summarize_log(output: &str, now: DateTime<Utc>) -> Result<LogSummary, ParseError> {
    let year_ago = now - Duration::days(365);
    let mut contributors = HashSet::new();
    let mut orgs = HashSet::new();
    let mut commit_count = 0usize;
    let mut last_year = 0usize;
    let mut created: Option<DateTime<Utc>> = None;
    let mut updated: Option<DateTime<Utc>> = None;

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.splitn(4, '\t');
        let (Some(name), Some(email), Some(authored), Some(committed)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseError::Malformed(line.to_string()));
        };
        let malformed = || ParseError::Malformed(line.to_string());
        let authored = parse_epoch(authored).ok_or_else(malformed)?;
        let committed = parse_epoch(committed).ok_or_else(malformed)?;

        contributors.insert(format!("{name}({email})"));
        orgs.insert(email.rsplit('@').next().unwrap_or(email).to_string());
        commit_count += 1;
        if authored > year_ago {
            last_year += 1;
        }
        created = Some(created.map_or(committed, |c| c.min(committed)));
        updated = Some(updated.map_or(committed, |u| u.max(committed)));
    }

    let (Some(created_since), Some(updated_since)) = (created, updated) else {
        return Err(ParseError::EmptyHistory);
    };
    Ok(LogSummary {
        commit_count,
        contributor_count: contributors.len(),
        org_count: orgs.len(),
        commit_frequency: last_year as f64 / 52.0,
        created_since,
        updated_since,
    })
}

fn parse_epoch(field: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = field.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// Blob paths and sizes from NUL-terminated `git ls-tree -r -l -z` output.
pub fn parse_ls_tree(output: &str) -> impl Iterator<Item = (&str, u64)> {
    output.split('\0').filter_map(|entry| {
        let (meta, path) = entry.split_once('\t')?;
        let mut parts = meta.split_whitespace();
        let _mode = parts.next()?;
        let kind = parts.next()?;
        let _object = parts.next()?;
        let size = parts.next()?.parse().ok()?;
        (kind == "blob").then_some((path, size))
    })
}
