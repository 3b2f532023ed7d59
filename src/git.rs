// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source control adapter.
//!
//! Thin wrapper around the Git binary for the handful of subcommands needed
//! to bring a source checkout up to date. Every call runs inside of the work
//! tree of the checkout.

use crate::process::{run_checked, Invocation, ProcessRunner, Result};

use std::path::Path;
use tracing::{debug, instrument};

/// Git checkout at some work tree.
#[derive(Debug)]
pub struct Git<'a, R>
where
    R: ProcessRunner + ?Sized,
{
    runner: &'a R,
    work_tree: &'a Path,
    log_dir: &'a Path,
}

impl<'a, R> Git<'a, R>
where
    R: ProcessRunner + ?Sized,
{
    /// Construct new Git adapter for target work tree.
    ///
    /// Output of failing Git calls gets logged into `log_dir`.
    pub fn new(runner: &'a R, work_tree: &'a Path, log_dir: &'a Path) -> Self {
        Self {
            runner,
            work_tree,
            log_dir,
        }
    }

    /// Work tree of checkout.
    pub fn work_tree(&self) -> &Path {
        self.work_tree
    }

    /// Update remote tracking data of every remote.
    ///
    /// # Errors
    ///
    /// - Return [`ProcessError`](crate::process::ProcessError) if Git fails.
    #[instrument(skip(self), level = "debug")]
    pub fn remote_update(&self) -> Result<()> {
        self.gitcall(["remote", "update"], "remote update")?;
        Ok(())
    }

    /// Check if work tree contains a Git repository.
    pub fn is_repository(&self) -> bool {
        self.work_tree.join(".git").exists()
    }

    /// Check that work tree has no uncommitted changes.
    ///
    /// Untracked files count as changes too.
    ///
    /// # Errors
    ///
    /// - Return [`ProcessError`](crate::process::ProcessError) if Git fails.
    #[instrument(skip(self), level = "debug")]
    pub fn is_working_copy_clean(&self) -> Result<bool> {
        let output = self.gitcall(["status", "--porcelain"], "working copy status")?;
        debug!("working copy status: {:?}", output.trim());
        Ok(output.trim().is_empty())
    }

    /// Fast-forward tracked branch.
    ///
    /// # Errors
    ///
    /// - Return [`ProcessError`](crate::process::ProcessError) if Git fails,
    ///   or the branch cannot be fast-forwarded.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self) -> Result<()> {
        self.gitcall(["pull", "--ff-only"], "pull")?;
        Ok(())
    }

    fn gitcall(
        &self,
        args: impl IntoIterator<Item = &'static str>,
        operation: &'static str,
    ) -> Result<String> {
        let invocation = Invocation::new("git")
            .args(args)
            .current_dir(self.work_tree);
        Ok(run_checked(self.runner, &invocation, operation, self.log_dir)?.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{fake::FakeRunner, ProcessOutput};
    use pretty_assertions::assert_eq;

    #[test]
    fn calls_run_inside_work_tree() -> anyhow::Result<()> {
        let runner = FakeRunner::new();
        let logs = tempfile::tempdir()?;
        let git = Git::new(&runner, Path::new("/srv/blog"), logs.path());

        git.remote_update()?;
        git.pull()?;

        assert_eq!(runner.calls(), ["git remote update", "git pull --ff-only"]);
        for invocation in runner.invocations() {
            assert_eq!(invocation.working_dir(), Some(Path::new("/srv/blog")));
        }

        Ok(())
    }

    #[test]
    fn porcelain_output_means_dirty() -> anyhow::Result<()> {
        let logs = tempfile::tempdir()?;

        let clean = FakeRunner::new();
        assert!(Git::new(&clean, Path::new("/srv/blog"), logs.path()).is_working_copy_clean()?);

        let dirty = FakeRunner::new().respond(
            "git status --porcelain",
            ProcessOutput::success().with_stdout("?? notes.txt\n"),
        );
        assert!(!Git::new(&dirty, Path::new("/srv/blog"), logs.path()).is_working_copy_clean()?);

        Ok(())
    }

    #[test]
    fn repository_detection_looks_for_gitdir() -> anyhow::Result<()> {
        let runner = FakeRunner::new();
        let work_tree = tempfile::tempdir()?;
        let git = Git::new(&runner, work_tree.path(), work_tree.path());

        assert!(!git.is_repository());
        std::fs::create_dir(work_tree.path().join(".git"))?;
        assert!(git.is_repository());
        assert!(runner.calls().is_empty());

        Ok(())
    }
}
