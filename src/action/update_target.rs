// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Synchronize source checkout into live site.
//!
//! Synchronization is done by rsync in archive mode. Archive mode preserves
//! permissions, timestamps, and copies symbolic links as links, so links are
//! never followed into their targets. Git metadata stays behind. Files that
//! did not change are not transferred again, so the action can be re-run
//! safely.

use crate::{
    action::{Action, ActionContext, Result},
    process::{Invocation, ProcessRunner, SystemRunner},
};

use std::{ffi::OsString, path::Path};
use tracing::{info, instrument};

/// Fixed rsync options.
pub const SYNC_ARGS: [&str; 2] = ["-a", "--exclude=.git"];

/// Copy source checkout over to live site.
#[derive(Debug)]
pub struct UpdateTarget<'a, R = SystemRunner>
where
    R: ProcessRunner + ?Sized,
{
    context: ActionContext<'a, R>,
}

impl<'a, R> UpdateTarget<'a, R>
where
    R: ProcessRunner + ?Sized,
{
    /// Construct new target update action.
    pub fn new(context: ActionContext<'a, R>) -> Self {
        Self { context }
    }
}

impl<R> Action for UpdateTarget<'_, R>
where
    R: ProcessRunner + ?Sized,
{
    fn name(&self) -> &'static str {
        "update target"
    }

    #[instrument(skip(self), level = "debug")]
    fn execute(&self) -> Result<()> {
        let source = self.context.site.path("source")?;
        let target = self.context.site.path("site")?;

        info!("sync {} into {}", source.display(), target.display());
        let invocation = Invocation::new("rsync")
            .args(SYNC_ARGS)
            .arg(contents_of(source))
            .arg(target)
            .elevated();
        self.context.run_checked(&invocation, "target update")?;

        Ok(())
    }
}

// INVARIANT: Trailing slash makes rsync copy the contents of the directory,
// not the directory itself.
fn contents_of(dir: &Path) -> OsString {
    let mut path = dir.as_os_str().to_owned();
    if !dir.to_string_lossy().ends_with('/') {
        path.push("/");
    }
    path
}
