// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Apply ownership and ACL grants to live site.
//!
//! Ownership is all or nothing: the site is only handed over when both the
//! configured owner and group exist. ACL grants are per principal: a missing
//! user or group is skipped with a warning, and every other principal still
//! gets its grant.
//!
//! Grants are applied twice, once as effective ACL entries and once as
//! default ACL entries, so files created later on inherit the same access.

use crate::{
    action::{Action, ActionContext, Result},
    process::{Invocation, ProcessRunner, SystemRunner},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument, warn};

/// User or group known to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(String),
    Group(String),
}

impl Principal {
    /// Name of principal.
    pub fn name(&self) -> &str {
        match self {
            Self::User(name) | Self::Group(name) => name.as_str(),
        }
    }

    /// ACL entry granting read, write, and directory traversal.
    pub fn acl_entry(&self) -> String {
        match self {
            Self::User(name) => format!("u:{name}:rwX"),
            Self::Group(name) => format!("g:{name}:rwX"),
        }
    }

    fn lookup(&self) -> Invocation {
        let database = match self {
            Self::User(_) => "passwd",
            Self::Group(_) => "group",
        };
        Invocation::new("getent").args([database, self.name()])
    }
}

impl Display for Principal {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::User(name) => write!(fmt, "user {name:?}"),
            Self::Group(name) => write!(fmt, "group {name:?}"),
        }
    }
}

/// Staged ACL grants.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AclPlan {
    /// Principals that exist, in configured order, users first.
    pub granted: Vec<Principal>,

    /// Principals skipped because they do not exist.
    pub skipped: Vec<Principal>,
}

impl AclPlan {
    /// ACL entries of every granted principal.
    pub fn entries(&self) -> Vec<String> {
        self.granted.iter().map(Principal::acl_entry).collect()
    }
}

/// Hand live site over to configured owner, and grant ACL access.
#[derive(Debug)]
pub struct SetPermissions<'a, R = SystemRunner>
where
    R: ProcessRunner + ?Sized,
{
    context: ActionContext<'a, R>,
}

impl<'a, R> SetPermissions<'a, R>
where
    R: ProcessRunner + ?Sized,
{
    /// Construct new permission action.
    pub fn new(context: ActionContext<'a, R>) -> Self {
        Self { context }
    }

    /// Stage ACL grants for every configured principal that exists.
    ///
    /// # Errors
    ///
    /// - Return [`ActionError`](crate::action::ActionError) if host database
    ///   cannot be queried.
    pub fn plan(&self) -> Result<AclPlan> {
        let acl = &self.context.config.acl;
        let principals = acl
            .users
            .iter()
            .cloned()
            .map(Principal::User)
            .chain(acl.groups.iter().cloned().map(Principal::Group));

        let mut plan = AclPlan::default();
        for principal in principals {
            if self.exists(&principal)? {
                plan.granted.push(principal);
            } else {
                plan.skipped.push(principal);
            }
        }

        Ok(plan)
    }

    fn exists(&self, principal: &Principal) -> Result<bool> {
        let found = self.context.runner.run(&principal.lookup())?.is_success();
        if !found {
            warn!("{principal} does not exist");
        }

        Ok(found)
    }
}

impl<R> Action for SetPermissions<'_, R>
where
    R: ProcessRunner + ?Sized,
{
    fn name(&self) -> &'static str {
        "set permissions"
    }

    #[instrument(skip(self), level = "debug")]
    fn execute(&self) -> Result<()> {
        let site = self.context.site.path("site")?;
        let permission = &self.context.config.permission;

        // INVARIANT: Check both principals, even if the first one is missing.
        let has_owner = self.exists(&Principal::User(permission.user.clone()))?;
        let has_group = self.exists(&Principal::Group(permission.group.clone()))?;
        if has_owner && has_group {
            info!(
                "change ownership of {} to {}:{}",
                site.display(),
                permission.user,
                permission.group
            );
            let chown = Invocation::new("chown")
                .arg("-R")
                .arg(format!("{}:{}", permission.user, permission.group))
                .arg(site);
            self.context.run_checked(&chown, "ownership change")?;
        } else {
            warn!("skip ownership change of {}", site.display());
        }

        let plan = self.plan()?;
        if plan.granted.is_empty() {
            warn!("no ACL grants to apply to {}", site.display());
            return Ok(());
        }

        let modifications = plan
            .entries()
            .into_iter()
            .flat_map(|entry| ["-m".to_string(), entry]);
        for (flag, operation) in [("-R", "ACL grant"), ("-dR", "default ACL grant")] {
            info!("apply {operation} to {}", site.display());
            let setfacl = Invocation::new("setfacl")
                .arg(flag)
                .args(modifications.clone())
                .arg(site);
            self.context.run_checked(&setfacl, operation)?;
        }

        Ok(())
    }
}
