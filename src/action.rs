// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment actions.
//!
//! An __action__ is one self-contained deployment step. Each action reads
//! whatever it needs from the shared [`Config`], and carries out its work
//! through external programs. Actions take no other input, and produce no
//! output besides success or failure.
//!
//! # Available Actions
//!
//! 1. [`UpdateSource`]: pull the source checkout, and install its
//!    dependencies.
//! 2. [`UpdateTarget`]: synchronize the source checkout into the live site.
//! 3. [`SetPermissions`]: apply ownership and ACL grants to the live site.
//!
//! Actions are independent of each other. Chaining them runs each one
//! strictly after the previous one succeeded. Nothing is rolled back when an
//! action fails. Fix the cause, and run it again.

pub mod set_permissions;
pub mod update_source;
pub mod update_target;

pub use set_permissions::{AclPlan, Principal, SetPermissions};
pub use update_source::UpdateSource;
pub use update_target::UpdateTarget;

use crate::{
    config::{Config, ConfigError, Site},
    process::{run_checked, Invocation, ProcessError, ProcessOutput, ProcessRunner, SystemRunner},
};

use std::path::PathBuf;
use tracing::{error, info};

/// Single deployment step.
pub trait Action {
    /// Name of action for reporting.
    fn name(&self) -> &'static str;

    /// Carry out deployment step.
    ///
    /// # Errors
    ///
    /// - Return [`ActionError`] if any part of the step fails.
    fn execute(&self) -> Result<()>;
}

/// Shared state every action works with.
#[derive(Debug)]
pub struct ActionContext<'a, R = SystemRunner>
where
    R: ProcessRunner + ?Sized,
{
    pub(crate) config: &'a Config,
    pub(crate) site: &'a Site,
    pub(crate) runner: &'a R,
}

impl<'a, R> ActionContext<'a, R>
where
    R: ProcessRunner + ?Sized,
{
    /// Construct new action context.
    pub fn new(config: &'a Config, site: &'a Site, runner: &'a R) -> Self {
        Self {
            config,
            site,
            runner,
        }
    }

    /// Run invocation, and treat non-zero exit status as fatal.
    ///
    /// # Errors
    ///
    /// - Return [`ProcessError`] if invocation fails.
    pub(crate) fn run_checked(
        &self,
        invocation: &Invocation,
        operation: &'static str,
    ) -> Result<ProcessOutput, ProcessError> {
        run_checked(self.runner, invocation, operation, &self.config.log_dir())
    }
}

impl<R> Clone for ActionContext<'_, R>
where
    R: ProcessRunner + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for ActionContext<'_, R> where R: ProcessRunner + ?Sized {}

/// Execute actions one after another.
///
/// Stops at first failing action. Remaining actions are not executed.
///
/// # Errors
///
/// - Return [`ActionError::Step`] naming the failing action.
pub fn execute_chain(actions: &[&dyn Action]) -> Result<()> {
    for action in actions {
        info!("run {}", action.name());
        action.execute().map_err(|err| {
            error!("{} failed, skipping remaining actions", action.name());
            ActionError::Step {
                action: action.name(),
                source: Box::new(err),
            }
        })?;
    }

    Ok(())
}

/// Action error types.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Configuration lacks something the action needs.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// External program failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Source path is not a Git checkout.
    #[error("no git repository found at {path:?}")]
    NoRepository { path: PathBuf },

    /// Source checkout has local modifications that a pull could clobber.
    #[error("git repository at {path:?} has uncommitted changes")]
    DirtyWorkingCopy { path: PathBuf },

    /// Action of a chain failed.
    #[error("{action} failed")]
    Step {
        action: &'static str,
        #[source]
        source: Box<ActionError>,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ActionError> = std::result::Result<T, E>;
