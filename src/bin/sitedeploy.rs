// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use sitedeploy::{
    action::{execute_chain, Action, ActionContext, SetPermissions, UpdateSource, UpdateTarget},
    config::Config,
    package::Packager,
    path::default_config_file,
    process::SystemRunner,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{fs::read_to_string, path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "sitedeploy [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, value_name = "file")]
    pub config: Option<PathBuf>,

    /// Name of site to act on, optional if only one site is configured.
    #[arg(short, long, global = true, value_name = "name")]
    pub site: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(&self) -> Result<()> {
        match &self.command {
            Command::ConfigShow => self.run_config_show(),
            Command::UpdateSource => self.run_actions(&[Step::UpdateSource]),
            Command::UpdateTarget => self.run_actions(&[Step::UpdateTarget]),
            Command::SetPermissions => self.run_actions(&[Step::SetPermissions]),
            Command::Deploy => self.run_actions(&[
                Step::UpdateSource,
                Step::UpdateTarget,
                Step::SetPermissions,
            ]),
            Command::Package(opts) => run_package(opts),
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(default_config_file()?),
        }
    }

    fn load_config(&self) -> Result<(PathBuf, Config)> {
        let path = self.config_path()?;
        let data = read_to_string(&path)
            .with_context(|| format!("failed to read configuration file {path:?}"))?;
        let config = data
            .parse::<Config>()
            .with_context(|| format!("invalid configuration file {path:?}"))?;

        Ok((path, config))
    }

    fn run_config_show(&self) -> Result<()> {
        let (path, config) = self.load_config()?;
        println!("# {}\n{config}", path.display());

        Ok(())
    }

    fn run_actions(&self, steps: &[Step]) -> Result<()> {
        let (_, config) = self.load_config()?;
        let site = config.site(self.site.as_deref())?;
        let runner = SystemRunner;
        let context = ActionContext::new(&config, site, &runner);

        let update_source = UpdateSource::new(context);
        let update_target = UpdateTarget::new(context);
        let set_permissions = SetPermissions::new(context);
        let mut actions: Vec<&dyn Action> = Vec::with_capacity(steps.len());
        for step in steps {
            actions.push(match step {
                Step::UpdateSource => &update_source,
                Step::UpdateTarget => &update_target,
                Step::SetPermissions => &set_permissions,
            });
        }

        execute_chain(&actions)?;

        Ok(())
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Show active configuration.
    #[command(name = "config:show")]
    ConfigShow,

    /// Pull source checkout of site, and install its dependencies.
    #[command(name = "update:source")]
    UpdateSource,

    /// Synchronize source checkout into live site directory.
    #[command(name = "update:target")]
    UpdateTarget,

    /// Apply ownership and ACL grants to live site directory.
    #[command(name = "permissions:set")]
    SetPermissions,

    /// Update source, update target, and set permissions in one go.
    Deploy,

    /// Build self-contained bundle of a source tree.
    #[command(override_usage = "sitedeploy package [options]")]
    Package(PackageOptions),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    UpdateSource,
    UpdateTarget,
    SetPermissions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PackageOptions {
    /// Top of source tree to bundle.
    #[arg(short, long, value_name = "dir", default_value = ".")]
    pub root: PathBuf,

    /// Path to write bundle to instead of alias of bundle.
    #[arg(short, long, value_name = "file")]
    pub output: Option<PathBuf>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_package(opts: &PackageOptions) -> Result<()> {
    let packager = Packager::open(&opts.root)?;
    let output = match &opts.output {
        Some(output) => output.clone(),
        None => packager.default_output(),
    };
    packager.compile(&output)?;

    Ok(())
}
