// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the deployment configuration file to simplify the
//! process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # General Layout
//!
//! The configuration is split into two scopes. The __global__ scope holds
//! settings shared by every site: the owner and group that should own
//! deployed files, and the users and groups that receive ACL grants. The
//! __site__ scope is a named map of filesystem paths, e.g., `source` for the
//! checkout that gets pulled, and `site` for the live directory that gets
//! served.
//!
//! ```toml
//! [permission]
//! user = "www-data"
//! group = "www-data"
//!
//! [acl]
//! users = ["alice", "bob"]
//! groups = ["www-data"]
//!
//! [sites.example]
//! source = "/srv/source/example"
//! site = "/var/www/example"
//! ```

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Deployment configuration layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Directory where diagnostic logs of failed commands are written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Owner and group of deployed files.
    pub permission: PermissionSettings,

    /// Principals to grant access to through ACL entries.
    #[serde(default)]
    pub acl: AclSettings,

    /// Named sites that can be deployed.
    #[serde(default)]
    pub sites: BTreeMap<String, Site>,
}

impl Config {
    /// Select active site.
    ///
    /// If no name is given, then the only configured site is selected.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownSite`] if named site is not configured.
    /// - Return [`ConfigError::SiteNotSelected`] if no name was given, and
    ///   the configuration does not contain exactly one site.
    pub fn site(&self, name: Option<&str>) -> Result<&Site> {
        match name {
            Some(name) => self.sites.get(name).ok_or_else(|| ConfigError::UnknownSite {
                name: name.into(),
            }),
            None => {
                let mut sites = self.sites.values();
                match (sites.next(), sites.next()) {
                    (Some(site), None) => Ok(site),
                    _ => Err(ConfigError::SiteNotSelected {
                        available: self.sites.keys().cloned().collect::<Vec<_>>().join(", "),
                    }),
                }
            }
        }
    }

    /// Directory to write diagnostic logs into.
    ///
    /// Falls back to the system temporary directory.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        if let Some(log_dir) = &config.log_dir {
            config.log_dir = Some(expand_path(log_dir)?);
        }

        for (name, site) in config.sites.iter_mut() {
            site.name = name.clone();
            for path in site.paths.values_mut() {
                *path = expand_path(path)?;
            }
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Ownership settings applied to the live site.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PermissionSettings {
    /// Name of user that should own deployed files.
    pub user: String,

    /// Name of group that should own deployed files.
    pub group: String,
}

/// ACL principal listing.
///
/// Order of each listing is the order rules get staged in.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AclSettings {
    /// Users granted read, write, and directory traversal.
    #[serde(default)]
    pub users: Vec<String>,

    /// Groups granted read, write, and directory traversal.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Named path map of a single site.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Site {
    #[serde(skip)]
    name: String,

    #[serde(flatten)]
    paths: BTreeMap<String, PathBuf>,
}

impl Site {
    /// Construct new site from name and path listing.
    pub fn new(
        name: impl Into<String>,
        paths: impl IntoIterator<Item = (impl Into<String>, impl Into<PathBuf>)>,
    ) -> Self {
        Self {
            name: name.into(),
            paths: paths
                .into_iter()
                .map(|(key, path)| (key.into(), path.into()))
                .collect(),
        }
    }

    /// Name of site in configuration.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Lookup named path of site.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::MissingPath`] if path is absent or empty.
    pub fn path(&self, key: &str) -> Result<&Path> {
        self.paths
            .get(key)
            .map(PathBuf::as_path)
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| ConfigError::MissingPath {
                site: self.name.clone(),
                key: key.into(),
            })
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Site does not define a required path.
    #[error("site {site:?} does not define a {key:?} path")]
    MissingPath { site: String, key: String },

    /// Named site is not configured.
    #[error("site {name:?} is not configured")]
    UnknownSite { name: String },

    /// No site was named, and there is no single site to fall back on.
    #[error("no site selected, choose one of: [{available}]")]
    SiteNotSelected { available: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
