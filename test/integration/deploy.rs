// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use sitedeploy::{
    action::{execute_chain, ActionContext, ActionError, SetPermissions, UpdateSource, UpdateTarget},
    config::Config,
    process::{fake::FakeRunner, ProcessOutput},
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs::{create_dir_all, read_dir, read_to_string, write};

fn config_file(root: &std::path::Path) -> Result<Config> {
    let path = root.join("config.toml");
    write(
        &path,
        format!(
            r#"
            log_dir = "{root}/logs"

            [permission]
            user = "deploy"
            group = "www-data"

            [acl]
            users = ["alice", "bob"]
            groups = ["www-data"]

            [sites.blog]
            source = "{root}/source"
            site = "{root}/www"
            "#,
            root = root.display()
        ),
    )?;

    Ok(read_to_string(&path)?.parse()?)
}

#[test]
fn deploy_runs_every_action_in_order() -> Result<()> {
    let root = tempfile::tempdir()?;
    create_dir_all(root.path().join("source").join(".git"))?;
    let config = config_file(root.path())?;
    let site = config.site(None)?;
    let runner = FakeRunner::new().respond("getent passwd bob", ProcessOutput::failure(2, ""));
    let context = ActionContext::new(&config, site, &runner);

    execute_chain(&[
        &UpdateSource::new(context),
        &UpdateTarget::new(context),
        &SetPermissions::new(context),
    ])?;

    let source = root.path().join("source");
    let www = root.path().join("www");
    let install = "composer install --classmap-authoritative --prefer-dist --no-dev";
    assert_eq!(
        runner.calls(),
        [
            "git remote update".to_string(),
            "git status --porcelain".to_string(),
            "git pull --ff-only".to_string(),
            install.to_string(),
            install.to_string(),
            format!("sudo rsync -a --exclude=.git {}/ {}", source.display(), www.display()),
            "getent passwd deploy".to_string(),
            "getent group www-data".to_string(),
            format!("chown -R deploy:www-data {}", www.display()),
            "getent passwd alice".to_string(),
            "getent passwd bob".to_string(),
            "getent group www-data".to_string(),
            format!("setfacl -R -m u:alice:rwX -m g:www-data:rwX {}", www.display()),
            format!("setfacl -dR -m u:alice:rwX -m g:www-data:rwX {}", www.display()),
        ]
    );
    let dirs = runner
        .invocations()
        .iter()
        .filter(|invocation| invocation.program() == "composer")
        .filter_map(|invocation| invocation.working_dir().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    assert_eq!(dirs, [source.clone(), source.join("extensions")]);

    Ok(())
}

#[test]
fn failed_step_stops_deploy_and_leaves_log() -> Result<()> {
    let root = tempfile::tempdir()?;
    create_dir_all(root.path().join("source").join(".git"))?;
    let config = config_file(root.path())?;
    let site = config.site(Some("blog"))?;
    let runner = FakeRunner::new().respond(
        "sudo rsync",
        ProcessOutput::failure(23, "rsync: some files could not be transferred"),
    );
    let context = ActionContext::new(&config, site, &runner);

    let result = execute_chain(&[
        &UpdateSource::new(context),
        &UpdateTarget::new(context),
        &SetPermissions::new(context),
    ]);

    assert!(matches!(
        result,
        Err(ActionError::Step {
            action: "update target",
            ..
        })
    ));
    assert!(!runner.called("getent"));
    assert!(!runner.called("setfacl"));

    let logs = read_dir(root.path().join("logs"))?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(logs.len(), 1);
    let log = read_to_string(logs[0].path())?;
    assert!(log.contains("exit with status 23"));
    assert!(log.contains("rsync: some files could not be transferred"));

    Ok(())
}
