//! Mapping from a repository link to its location under the storage root.
//!
//! Repositories are fanned out by host and by a two-level prefix derived from
//! the owner name so that no single directory grows unbounded:
//!
//! ```text
//! https://github.com/rust-lang/cargo  ->  github.com/ru/st/rust-lang/cargo
//! https://gitlab.com/gn/tool          ->  gitlab.com/2/g/gn/tool
//! ```

use std::path::PathBuf;

use url::Url;

use crate::error::LinkError;

/// Host and path of a repository link, normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub host: String,
    /// Path segments after the host, e.g. `["rust-lang", "cargo"]`.
    pub segments: Vec<String>,
}

impl RepoLocation {
    pub fn owner(&self) -> &str {
        &self.segments[0]
    }

    pub fn name(&self) -> &str {
        let last = &self.segments[self.segments.len() - 1];
        last.strip_suffix(".git").unwrap_or(last)
    }
}

/// Parse a link into host and path segments.
///
/// Accepts anything the `url` crate understands (`https://`, `git://`,
/// `ssh://`) plus scp-style `git@host:owner/repo`.
pub fn parse_link(link: &str) -> Result<RepoLocation, LinkError> {
    let trimmed = link.trim();
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => Url::parse(&scp_to_ssh(trimmed)?)
            .map_err(|_| LinkError::Unparseable(link.to_string()))?,
    };

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| LinkError::MissingHost(link.to_string()))?
        .to_ascii_lowercase();

    let segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if segments.len() < 2 || segments.iter().any(|s| s == "." || s == "..") {
        return Err(LinkError::BadPathname(url.path().to_string()));
    }

    Ok(RepoLocation { host, segments })
}

/// `git@github.com:owner/repo.git` -> `ssh://git@github.com/owner/repo.git`
fn scp_to_ssh(link: &str) -> Result<String, LinkError> {
    let (user_host, path) = link
        .split_once(':')
        .ok_or_else(|| LinkError::Unparseable(link.to_string()))?;
    if user_host.is_empty() || user_host.contains('/') || path.starts_with("//") {
        return Err(LinkError::Unparseable(link.to_string()));
    }
    Ok(format!("ssh://{}/{}", user_host, path.trim_start_matches('/')))
}

/// Relative storage path for `link`, deterministic for a given URL.
pub fn repository_path(link: &str) -> Result<PathBuf, LinkError> {
    let loc = parse_link(link)?;
    let owner: Vec<char> = loc.owner().chars().collect();

    let mut path = PathBuf::from(&loc.host);
    if owner.len() < 4 {
        path.push(owner.len().to_string());
        path.push(owner[0].to_string());
    } else {
        path.push(owner[0..2].iter().collect::<String>());
        path.push(owner[2..4].iter().collect::<String>());
    }
    for segment in &loc.segments {
        path.push(segment);
    }
    Ok(path)
}
