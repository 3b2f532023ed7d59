// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Build version lookup.
//!
//! The version of a bundle is the commit hash of HEAD, unless HEAD is
//! tagged exactly, in which case the tag name is used instead. The commit
//! time of HEAD serves as the release date, and as the timestamp of every
//! archive entry.

use chrono::{DateTime, Utc};
use git2::{DescribeFormatOptions, DescribeOptions, Repository};
use std::path::Path;
use tracing::{info, instrument};

/// Format of release date placeholder.
pub const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Resolved version of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVersion {
    /// Exact tag name, or commit hash of HEAD.
    pub version: String,

    /// Development branch alias, e.g., "1.x-dev".
    pub branch_alias: String,

    /// Commit time of HEAD.
    pub date: DateTime<Utc>,
}

impl BuildVersion {
    /// Resolve version from Git repository containing `path`.
    ///
    /// A missing exact tag is not an error. The commit hash is used instead.
    ///
    /// # Errors
    ///
    /// - Return [`VersionError::Git2`] if HEAD commit cannot be determined.
    /// - Return [`VersionError::CommitTime`] if commit time is out of range.
    #[instrument(skip(path, branch_alias), level = "debug")]
    pub fn from_repository(path: &Path, branch_alias: impl Into<String>) -> Result<Self> {
        let repository = Repository::discover(path)?;
        let commit = repository.head()?.peel_to_commit()?;
        let seconds = commit.time().seconds();
        let date = DateTime::<Utc>::from_timestamp(seconds, 0)
            .ok_or(VersionError::CommitTime(seconds))?;

        let version = match exact_tag(&repository) {
            Some(tag) => tag,
            None => {
                info!("no exact tag on HEAD, using commit hash");
                commit.id().to_string()
            }
        };

        Ok(Self {
            version,
            branch_alias: branch_alias.into(),
            date,
        })
    }

    /// Release date as it gets injected into the version file.
    pub fn release_date(&self) -> String {
        self.date.format(RELEASE_DATE_FORMAT).to_string()
    }

    /// Check if version is a raw commit hash rather than a tag.
    pub fn is_commit_hash(&self) -> bool {
        !self.version.is_empty()
            && self
                .version
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    /// Replace version placeholders of source text.
    pub fn inject(&self, source: &str) -> String {
        source
            .replace("@package_version@", self.version.as_str())
            .replace(
                "@package_branch_alias_version@",
                self.branch_alias.as_str(),
            )
            .replace("@release_date@", self.release_date().as_str())
    }
}

fn exact_tag(repository: &Repository) -> Option<String> {
    let mut options = DescribeOptions::new();
    options.describe_tags().max_candidates_tags(0);
    repository
        .describe(&options)
        .and_then(|describe| describe.format(Some(&DescribeFormatOptions::new())))
        .ok()
}

/// Version lookup error types.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// Git repository or HEAD commit is unavailable.
    #[error("cannot determine build version, make sure to package from a git clone")]
    Git2(#[from] git2::Error),

    /// Commit time cannot be represented.
    #[error("commit time {0} is out of range")]
    CommitTime(i64),
}

/// Friendly result alias :3
pub type Result<T, E = VersionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn version(version: &str) -> BuildVersion {
        BuildVersion {
            version: version.into(),
            branch_alias: "2.x-dev".into(),
            date: Utc.with_ymd_and_hms(2016, 3, 14, 15, 9, 26).unwrap(),
        }
    }

    #[test]
    fn commit_hash_detection() {
        assert!(version("3f2c9e1b0a").is_commit_hash());
        assert!(!version("v1.2.0").is_commit_hash());
        assert!(!version("").is_commit_hash());
    }

    #[test]
    fn placeholders_are_injected() {
        let source = "VERSION='@package_version@' ALIAS='@package_branch_alias_version@' DATE='@release_date@'";

        assert_eq!(
            version("v1.2.0").inject(source),
            "VERSION='v1.2.0' ALIAS='2.x-dev' DATE='2016-03-14 15:09:26'"
        );
    }

    #[test]
    fn missing_repository_is_fatal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let result = BuildVersion::from_repository(dir.path(), "");

        assert!(matches!(result, Err(VersionError::Git2(_))));

        Ok(())
    }
}
