// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bring source checkout up to date.

use crate::{
    action::{Action, ActionContext, ActionError, Result},
    git::Git,
    process::{Invocation, ProcessRunner, SystemRunner},
};

use std::path::Path;
use tracing::{info, instrument};

/// Arguments of dependency installation.
///
/// Install from lock file only, skip development dependencies, prefer
/// distribution archives, and generate an authoritative class map.
pub const INSTALL_ARGS: [&str; 4] = [
    "install",
    "--classmap-authoritative",
    "--prefer-dist",
    "--no-dev",
];

/// Pull source checkout, and install its dependencies.
///
/// Dependencies are installed in the source root, and in the nested
/// `extensions` project of the source root.
#[derive(Debug)]
pub struct UpdateSource<'a, R = SystemRunner>
where
    R: ProcessRunner + ?Sized,
{
    context: ActionContext<'a, R>,
}

impl<'a, R> UpdateSource<'a, R>
where
    R: ProcessRunner + ?Sized,
{
    /// Construct new source update action.
    pub fn new(context: ActionContext<'a, R>) -> Self {
        Self { context }
    }

    fn dependency_install(&self, root: &Path) -> Result<()> {
        info!("install dependencies in {}", root.display());
        let invocation = Invocation::new("composer")
            .args(INSTALL_ARGS)
            .current_dir(root)
            .env("COMPOSER_ALLOW_SUPERUSER", "1")
            .env("COMPOSER_DISABLE_XDEBUG_WARN", "1");
        self.context.run_checked(&invocation, "dependency install")?;

        Ok(())
    }
}

impl<R> Action for UpdateSource<'_, R>
where
    R: ProcessRunner + ?Sized,
{
    fn name(&self) -> &'static str {
        "update source"
    }

    #[instrument(skip(self), level = "debug")]
    fn execute(&self) -> Result<()> {
        let source = self.context.site.path("source")?;
        let log_dir = self.context.config.log_dir();
        let git = Git::new(self.context.runner, source, &log_dir);

        info!("update remotes of {}", source.display());
        git.remote_update()?;

        if !git.is_repository() {
            return Err(ActionError::NoRepository {
                path: source.into(),
            });
        }

        // INVARIANT: Never pull over local modifications.
        if !git.is_working_copy_clean()? {
            return Err(ActionError::DirtyWorkingCopy {
                path: source.into(),
            });
        }

        info!("pull {}", source.display());
        git.pull()?;

        self.dependency_install(source)?;
        self.dependency_install(&source.join("extensions"))?;

        Ok(())
    }
}
