// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process invocation.
//!
//! Every deployment step is carried out by some external program, e.g., Git
//! pulls the source, rsync copies it over, setfacl grants access. All of these
//! calls go through the [`ProcessRunner`] trait so the sequencing logic of a
//! deployment step can be exercised against a fake runner that records
//! invocations instead of executing them.
//!
//! Invocations block until the child process exits. There is no timeout, so
//! a hung external tool hangs the whole deployment.

use chrono::Utc;
use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::write,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Program used to run an invocation with elevated privileges.
pub const ELEVATE_PROGRAM: &str = "sudo";

/// Description of a single external command.
///
/// The working directory is carried along as part of the invocation, so the
/// working directory of the current process never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    elevated: bool,
}

impl Invocation {
    /// Construct new invocation of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            elevated: false,
        }
    }

    /// Append single argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append sequence of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run invocation inside of target directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set environment variable for invocation only.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Run invocation with elevated privileges.
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    /// Program that actually gets executed.
    pub fn program(&self) -> &OsStr {
        if self.elevated {
            OsStr::new(ELEVATE_PROGRAM)
        } else {
            self.program.as_os_str()
        }
    }

    /// Arguments that actually get passed to [`Self::program`].
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        if self.elevated {
            argv.push(self.program.clone());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Working directory of invocation, if any.
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Environment overrides of invocation.
    pub fn envs(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.envs
            .iter()
            .map(|(key, value)| (key.as_os_str(), value.as_os_str()))
    }
}

impl Display for Invocation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program().to_string_lossy().as_ref())?;
        for arg in self.argv() {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Captured result of a finished invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// Successful output with nothing captured.
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    /// Failed output with target exit code and error message.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Replace captured standard output.
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Check if process exited with zero status.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Standard output and standard error labeled and joined together.
    pub fn combined(&self) -> String {
        let mut message = String::new();

        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}\n", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            message.push_str(format!("stderr: {}\n", self.stderr).as_str());
        }

        message
    }
}

/// Layer of indirection for running external commands.
pub trait ProcessRunner {
    /// Run invocation to completion, capturing its output.
    ///
    /// A non-zero exit status is not an error at this level. Callers decide
    /// what a failing exit status means for them.
    ///
    /// # Errors
    ///
    /// - Return [`ProcessError::Spawn`] if the program cannot be started.
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Run external commands on the host system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    #[instrument(skip(self, invocation), level = "debug")]
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        debug!("run {invocation}");
        let mut command = Command::new(invocation.program());
        command.args(invocation.argv()).envs(invocation.envs());
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|err| ProcessError::Spawn {
            command: invocation.to_string(),
            source: err,
        })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        })
    }
}

/// Run invocation, and treat non-zero exit status as fatal.
///
/// Captured output of a failing invocation is written into a diagnostic log
/// file inside of `log_dir`. The returned error names that log file.
///
/// # Errors
///
/// - Return [`ProcessError::Spawn`] if the program cannot be started.
/// - Return [`ProcessError::Failed`] if the program exits with non-zero
///   status.
/// - Return [`ProcessError::Log`] if the diagnostic log cannot be written.
pub fn run_checked<R>(
    runner: &R,
    invocation: &Invocation,
    operation: &'static str,
    log_dir: &Path,
) -> Result<ProcessOutput>
where
    R: ProcessRunner + ?Sized,
{
    let output = runner.run(invocation)?;
    if output.is_success() {
        return Ok(output);
    }

    let log = log_dir.join(format!(
        "sitedeploy-{operation}-{}.log",
        Utc::now().format("%Y%m%dT%H%M%S%.3f")
    ));
    let mut contents = format!("$ {invocation}\n");
    if let Some(dir) = invocation.working_dir() {
        contents.push_str(format!("# in {}\n", dir.display()).as_str());
    }
    contents.push_str(format!("# exit {}\n", describe_exit(&output.code)).as_str());
    contents.push_str(output.combined().as_str());

    mkdirp::mkdirp(log_dir)
        .and_then(|_| write(&log, contents))
        .map_err(|err| ProcessError::Log {
            path: log.clone(),
            source: err,
        })?;

    Err(ProcessError::Failed {
        operation,
        command: invocation.to_string(),
        code: output.code,
        log,
    })
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "by signal".into(), |code| format!("with status {code}"))
}

/// Process invocation error types.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Program could not be started.
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Program exited with non-zero status.
    #[error(
        "{operation} failed: `{command}` exited {}, details logged to {}",
        describe_exit(.code),
        .log.display()
    )]
    Failed {
        operation: &'static str,
        command: String,
        code: Option<i32>,
        log: PathBuf,
    },

    /// Diagnostic log could not be written.
    #[error("failed to write diagnostic log {path:?}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ProcessError> = std::result::Result<T, E>;

/// Recording runner for exercising deployment logic without side effects.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::{Invocation, ProcessOutput, ProcessRunner, Result};
    use std::cell::RefCell;

    /// Fake runner that records every invocation it receives.
    ///
    /// Invocations succeed with empty output unless a scripted response
    /// matches. A response matches when the rendered command line starts
    /// with its pattern. The first matching response wins.
    #[derive(Debug, Default)]
    pub struct FakeRunner {
        responses: Vec<(String, ProcessOutput)>,
        calls: RefCell<Vec<Invocation>>,
    }

    impl FakeRunner {
        /// Construct new fake runner with no scripted responses.
        pub fn new() -> Self {
            Self::default()
        }

        /// Script response for command lines starting with pattern.
        pub fn respond(mut self, pattern: impl Into<String>, output: ProcessOutput) -> Self {
            self.responses.push((pattern.into(), output));
            self
        }

        /// Every invocation received so far.
        pub fn invocations(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        /// Rendered command lines of every invocation received so far.
        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().iter().map(ToString::to_string).collect()
        }

        /// Check if any received command line starts with pattern.
        pub fn called(&self, pattern: &str) -> bool {
            self.calls().iter().any(|call| call.starts_with(pattern))
        }
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
            let line = invocation.to_string();
            self.calls.borrow_mut().push(invocation.clone());

            Ok(self
                .responses
                .iter()
                .find(|(pattern, _)| line.starts_with(pattern.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(ProcessOutput::success))
        }
    }
}
