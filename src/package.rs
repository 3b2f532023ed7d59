// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Self-contained bundle packaging.
//!
//! The packager turns a source tree into a single executable __bundle__: a
//! bootstrap stub followed by a tar payload holding stripped sources,
//! embedded dependency sources, autoload metadata, the license, and the
//! entry point. It is a build tool, not a deployment step.
//!
//! # Bundle Definition
//!
//! What goes into a bundle is described by a `bundle.toml` file at the top
//! of the source tree. Every field is optional. Missing fields fall back to
//! the layout of a Composer-managed project.
//!
//! ```toml
//! alias = "deploy.phar"
//! entry = "bin/deploy"
//! interpreter = "php"
//! version_file = "src/Deploy.php"
//! compress = true
//!
//! [[sources]]
//! dir = "src"
//! patterns = ["*.php"]
//!
//! [[sources]]
//! dir = "vendor/symfony"
//! patterns = ["*.php", "LICENSE"]
//! exclude = ["Tests", "tests", "docs"]
//! ```
//!
//! # Reproducibility
//!
//! Bundles built from the same commit are byte-for-byte identical. Sources
//! are walked in sorted order, and once the bundle is written, it is opened
//! again to stamp every entry with the commit time, and to sign the
//! normalized payload.

pub mod archive;
pub mod strip;
pub mod stub;
pub mod version;

use crate::package::{
    archive::Payload,
    strip::strip_whitespace,
    stub::{split, Stub, STALE_AFTER_SECS},
    version::{BuildVersion, VersionError},
};

use glob::Pattern;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read, read_to_string, remove_file},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, instrument, warn};

/// File name of bundle definition inside of source tree.
pub const BUNDLE_DEFINITION: &str = "bundle.toml";

/// Directory names of version control metadata never bundled.
const VCS_DIRS: [&str; 6] = [".git", ".svn", ".hg", ".bzr", "_darcs", "CVS"];

/// Bundle definition layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BundleDefinition {
    /// Name of bundle, and default file name of output.
    pub alias: String,

    /// Entry point relative to source tree.
    pub entry: String,

    /// Program that runs the entry point.
    pub interpreter: String,

    /// Only file that gets version placeholders replaced.
    pub version_file: String,

    /// Development branch alias injected into the version file.
    pub branch_alias: String,

    /// Compress payload with gzip.
    pub compress: bool,

    /// License file added unstripped.
    pub license: String,

    /// Autoload metadata added verbatim.
    pub autoload: Vec<String>,

    /// Autoload metadata added verbatim if present.
    pub optional_autoload: Vec<String>,

    /// Directories of sources to strip and add.
    pub sources: Vec<SourceSet>,
}

impl Default for BundleDefinition {
    fn default() -> Self {
        Self {
            alias: "deploy.phar".into(),
            entry: "bin/deploy".into(),
            interpreter: "php".into(),
            version_file: "src/Deploy.php".into(),
            branch_alias: String::new(),
            compress: true,
            license: "LICENSE".into(),
            autoload: [
                "vendor/autoload.php",
                "vendor/composer/autoload_namespaces.php",
                "vendor/composer/autoload_psr4.php",
                "vendor/composer/autoload_classmap.php",
                "vendor/composer/autoload_files.php",
                "vendor/composer/autoload_real.php",
                "vendor/composer/ClassLoader.php",
            ]
            .map(String::from)
            .to_vec(),
            optional_autoload: vec!["vendor/composer/include_paths.php".into()],
            sources: vec![
                SourceSet {
                    dir: "src".into(),
                    patterns: vec!["*.php".into()],
                    exclude: vec![],
                },
                SourceSet {
                    dir: "vendor/symfony".into(),
                    patterns: vec!["*.php".into(), "LICENSE".into()],
                    exclude: vec!["Tests".into(), "tests".into(), "docs".into()],
                },
            ],
        }
    }
}

impl FromStr for BundleDefinition {
    type Err = PackageError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let definition: Self = toml::from_str(data).map_err(PackageError::Deserialize)?;
        definition.validate()?;
        Ok(definition)
    }
}

impl BundleDefinition {
    /// Check that every field rendered into the bootstrap stub is shell-safe.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::UnsafeField`] if alias, interpreter, or entry
    ///   holds anything besides ASCII alphanumerics and `._+-/`.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("alias", &self.alias),
            ("interpreter", &self.interpreter),
            ("entry", &self.entry),
        ] {
            if !is_shell_safe(value) {
                return Err(PackageError::UnsafeField {
                    field,
                    value: value.clone(),
                });
            }
        }

        Ok(())
    }
}

// INVARIANT: Stub fields are pasted into the script unquoted.
fn is_shell_safe(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-' | '/'))
}

/// Directory of sources to bundle.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SourceSet {
    /// Directory relative to source tree.
    pub dir: String,

    /// File name patterns to include.
    pub patterns: Vec<String>,

    /// Directory names to skip entirely.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Bundle builder for a source tree.
#[derive(Debug, Clone)]
pub struct Packager {
    root: PathBuf,
    definition: BundleDefinition,
}

impl Packager {
    /// Construct new packager for source tree.
    pub fn new(root: impl Into<PathBuf>, definition: BundleDefinition) -> Self {
        Self {
            root: root.into(),
            definition,
        }
    }

    /// Open source tree, and load its bundle definition.
    ///
    /// Falls back to default bundle definition if source tree has none.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Read`] if definition cannot be read.
    /// - Return [`PackageError::Deserialize`] if definition is invalid.
    /// - Return [`PackageError::UnsafeField`] if definition cannot be rendered
    ///   into the stub.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(BUNDLE_DEFINITION);
        let definition = if path.exists() {
            read_to_string(&path)
                .map_err(|err| PackageError::Read {
                    path: path.clone(),
                    source: err,
                })?
                .parse::<BundleDefinition>()?
        } else {
            info!("no {BUNDLE_DEFINITION} in {}, using defaults", root.display());
            BundleDefinition::default()
        };

        Ok(Self::new(root, definition))
    }

    /// Bundle definition in use.
    pub fn definition(&self) -> &BundleDefinition {
        &self.definition
    }

    /// Default output path of bundle.
    pub fn default_output(&self) -> PathBuf {
        self.root.join(&self.definition.alias)
    }

    /// Build bundle at output path from current HEAD of source tree.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError::Version`] if HEAD commit cannot be resolved.
    /// - Return [`PackageError`] if any file cannot be read or written.
    pub fn compile(&self, output: &Path) -> Result<()> {
        let version =
            BuildVersion::from_repository(&self.root, self.definition.branch_alias.as_str())?;
        self.compile_with(output, &version)
    }

    /// Build bundle at output path for resolved version.
    ///
    /// # Errors
    ///
    /// - Return [`PackageError`] if any file cannot be read or written.
    #[instrument(skip(self, output, version), level = "debug")]
    pub fn compile_with(&self, output: &Path, version: &BuildVersion) -> Result<()> {
        self.definition.validate()?;
        info!("build {} version {}", self.definition.alias, version.version);
        clear(output)?;

        let mut payload = Payload::new();
        for set in &self.definition.sources {
            for path in self.collect(set)? {
                self.add_file(&mut payload, &path, version, true)?;
            }
        }

        for path in &self.definition.autoload {
            self.add_file(&mut payload, path, version, false)?;
        }
        for path in &self.definition.optional_autoload {
            if self.root.join(path).exists() {
                self.add_file(&mut payload, path, version, false)?;
            }
        }

        self.add_entry(&mut payload)?;

        if payload.get(self.definition.version_file.as_str()).is_none() {
            warn!(
                "version file {} is not part of bundle",
                self.definition.version_file
            );
        }

        let stub = self.stub(version);
        self.finalize(output, &stub, payload)?;
        normalize(output, &stub, version.date.timestamp())?;
        info!("bundle written to {}", output.display());

        Ok(())
    }

    /// Relative paths of every file of source set, in sorted order.
    fn collect(&self, set: &SourceSet) -> Result<Vec<String>> {
        let dir = self.root.join(&set.dir);
        if !dir.is_dir() {
            return Err(PackageError::MissingSource { path: dir });
        }

        let patterns = set
            .patterns
            .iter()
            .map(|pattern| Pattern::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = set.exclude.clone();

        let mut paths = Vec::new();
        let walker = WalkBuilder::new(&dir)
            .standard_filters(false)
            .filter_entry(move |entry| {
                let name = entry.file_name().to_string_lossy();
                let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
                !(is_dir && (VCS_DIRS.contains(&&*name) || exclude.iter().any(|dir| *dir == name)))
            })
            .build();

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !patterns.iter().any(|pattern| pattern.matches(&name)) {
                continue;
            }

            paths.push(self.relative(entry.path()));
        }

        paths.sort();
        Ok(paths)
    }

    // INVARIANT: Archive paths always use forward slashes.
    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn add_file(
        &self,
        payload: &mut Payload,
        path: &str,
        version: &BuildVersion,
        strip: bool,
    ) -> Result<()> {
        let mut content = self.read(path)?;
        if path == self.definition.version_file {
            debug!("inject version into {path}");
            content = version.inject(content.as_str());
        }
        if strip {
            content = strip_whitespace(content.as_str());
        }

        payload.add(path, content);
        Ok(())
    }

    fn add_entry(&self, payload: &mut Payload) -> Result<()> {
        let content = self.read(self.definition.entry.as_str())?;
        payload.add(self.definition.entry.as_str(), without_shebang(content.as_str()));
        Ok(())
    }

    fn read(&self, path: &str) -> Result<String> {
        let path = self.root.join(path);
        read_to_string(&path).map_err(|err| PackageError::Read { path, source: err })
    }

    fn stub(&self, version: &BuildVersion) -> Stub {
        Stub {
            alias: self.definition.alias.clone(),
            version: version.version.clone(),
            release_date: version.release_date(),
            interpreter: self.definition.interpreter.clone(),
            entry: self.definition.entry.clone(),
            compressed: self.definition.compress,
            warning_time: version
                .is_commit_hash()
                .then(|| version.date.timestamp() + STALE_AFTER_SECS),
        }
    }

    // Stop buffering: add license, encode payload, and write bundle.
    fn finalize(&self, output: &Path, stub: &Stub, mut payload: Payload) -> Result<()> {
        let license = self.read(self.definition.license.as_str())?;
        payload.add(self.definition.license.as_str(), format!("\n{license}\n"));

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let encoded = payload
            .encode(self.definition.compress, now)
            .map_err(|err| PackageError::Archive {
                path: output.into(),
                source: err,
            })?;

        write_bundle(output, &stub.bundle(&encoded))
    }
}

/// Stamp every entry of bundle with timestamp, and sign it again.
///
/// # Errors
///
/// - Return [`PackageError::Corrupt`] if file is not a bundle.
/// - Return [`PackageError`] if bundle cannot be read or written.
pub fn normalize(path: &Path, stub: &Stub, timestamp: i64) -> Result<()> {
    let bundle = read(path).map_err(|err| PackageError::Read {
        path: path.into(),
        source: err,
    })?;
    let (_, encoded) = split(&bundle).ok_or_else(|| PackageError::Corrupt { path: path.into() })?;

    let archive_error = |err| PackageError::Archive {
        path: path.into(),
        source: err,
    };
    let payload = Payload::decode(encoded).map_err(archive_error)?;
    let encoded = payload
        .encode(Payload::is_compressed(encoded), timestamp.max(0) as u64)
        .map_err(archive_error)?;

    write_bundle(path, &stub.bundle(&encoded))
}

fn clear(output: &Path) -> Result<()> {
    if output.exists() {
        remove_file(output).map_err(|err| PackageError::Write {
            path: output.into(),
            source: err,
        })?;
    }

    Ok(())
}

// INVARIANT: Bundle appears at output path complete, or not at all.
fn write_bundle(output: &Path, bundle: &[u8]) -> Result<()> {
    let write_error = |err| PackageError::Write {
        path: output.into(),
        source: err,
    };

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    mkdirp::mkdirp(&parent).map_err(write_error)?;

    let mut file = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
    file.write_all(bundle).map_err(write_error)?;
    make_executable(file.as_file()).map_err(write_error)?;
    file.persist(output)
        .map_err(|err| write_error(err.error))?;

    Ok(())
}

#[cfg(unix)]
fn make_executable(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

fn without_shebang(content: &str) -> &str {
    if !content.starts_with("#!") {
        return content;
    }

    content
        .find('\n')
        .map_or("", |end| content[end..].trim_start())
}

/// Packaging error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// Failed to deserialize bundle definition.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to resolve build version.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Bundle definition field cannot be rendered into the stub safely.
    #[error("bundle definition field {field} has unsafe value {value:?}")]
    UnsafeField { field: &'static str, value: String },

    /// Source set directory does not exist.
    #[error("source directory {path:?} does not exist")]
    MissingSource { path: PathBuf },

    /// Source file name pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Source tree cannot be walked.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// File cannot be read.
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File cannot be written.
    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Payload cannot be encoded or decoded.
    #[error("failed to encode payload of {path:?}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not a bundle.
    #[error("{path:?} is not a bundle")]
    Corrupt { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;
