// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use sitedeploy::package::{
    archive::Payload,
    stub::{split, STALE_AFTER_SECS},
    version::RELEASE_DATE_FORMAT,
    Packager,
};

use anyhow::{anyhow, Result};
use chrono::DateTime;
use git2::Oid;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{
    fs::{read, read_dir},
    path::Path,
    process::Command,
};
use tempfile::TempDir;

fn project() -> Result<(TempDir, RepoFixture, Oid)> {
    let dir = tempfile::tempdir()?;
    let fixture = RepoFixture::new(dir.path())?;

    fixture.stage_and_commit(
        "bundle.toml",
        indoc! {r#"
            alias = "deploy.phar"
            autoload = ["vendor/autoload.php"]
            optional_autoload = []

            [[sources]]
            dir = "src"
            patterns = ["*.php"]
        "#},
    )?;
    fixture.stage_and_commit(
        "src/Deploy.php",
        indoc! {r#"
            <?php
            // Application metadata.
            const VERSION = '@package_version@';
            const RELEASED = '@release_date@';
        "#},
    )?;
    fixture.stage_and_commit(
        "src/Helper.php",
        indoc! {r#"
            <?php
            /* Placeholder stays as-is here. */
            $marker = '@package_version@';
        "#},
    )?;
    fixture.stage_and_commit("vendor/autoload.php", "<?php\nreturn [];\n")?;
    fixture.stage_and_commit(
        "bin/deploy",
        "#!/usr/bin/env php\n<?php\nrequire __DIR__.'/../src/Deploy.php';\n",
    )?;
    let head = fixture.stage_and_commit("LICENSE", "MIT License")?;

    Ok((dir, fixture, head))
}

fn build(root: &Path, output: &Path) -> Result<Vec<u8>> {
    Packager::open(root)?.compile(output)?;
    Ok(read(output)?)
}

fn unpack(bundle: &[u8]) -> Result<(String, Payload)> {
    let (stub, payload) = split(bundle).ok_or_else(|| anyhow!("not a bundle"))?;
    Ok((
        String::from_utf8(stub.to_vec())?,
        Payload::decode(payload)?,
    ))
}

#[test]
fn same_commit_builds_identical_bundles() -> Result<()> {
    let (_dir, fixture, _) = project()?;
    let out = tempfile::tempdir()?;

    let first = build(fixture.path()?, &out.path().join("first.phar"))?;
    let second = build(fixture.path()?, &out.path().join("second.phar"))?;

    assert_eq!(first, second);

    Ok(())
}

#[test]
fn version_lands_in_version_file_only() -> Result<()> {
    let (_dir, fixture, head) = project()?;
    fixture.tag("v1.0.0")?;
    let out = tempfile::tempdir()?;

    let bundle = build(fixture.path()?, &out.path().join("deploy.phar"))?;
    let (_, payload) = unpack(&bundle)?;

    let released = DateTime::from_timestamp(fixture.commit_time(head)?, 0)
        .ok_or_else(|| anyhow!("commit time out of range"))?
        .format(RELEASE_DATE_FORMAT)
        .to_string();
    let expect = format!("<?php\n\nconst VERSION = 'v1.0.0';\nconst RELEASED = '{released}';\n");
    assert_eq!(payload.get("src/Deploy.php"), Some(expect.as_bytes()));
    assert_eq!(
        payload.get("src/Helper.php"),
        Some(b"<?php\n\n$marker = '@package_version@';\n".as_slice())
    );
    assert_eq!(
        payload.get("bin/deploy"),
        Some(b"<?php\nrequire __DIR__.'/../src/Deploy.php';\n".as_slice())
    );

    Ok(())
}

#[test]
fn exact_tag_build_never_goes_stale() -> Result<()> {
    let (_dir, fixture, _) = project()?;
    fixture.tag("v1.0.0")?;
    let out = tempfile::tempdir()?;

    let bundle = build(fixture.path()?, &out.path().join("deploy.phar"))?;
    let (stub, _) = unpack(&bundle)?;

    assert!(stub.contains("\n# deploy.phar v1.0.0 ("));
    assert!(stub.contains("\nWARNING_TIME=\n"));

    Ok(())
}

#[test]
fn untagged_build_uses_commit_hash() -> Result<()> {
    let (_dir, fixture, head) = project()?;
    let out = tempfile::tempdir()?;

    let bundle = build(fixture.path()?, &out.path().join("deploy.phar"))?;
    let (stub, _) = unpack(&bundle)?;

    let warning_time = fixture.commit_time(head)? + STALE_AFTER_SECS;
    assert!(stub.contains(format!("\n# deploy.phar {head} (").as_str()));
    assert!(stub.contains(format!("\nWARNING_TIME={warning_time}\n").as_str()));

    Ok(())
}

#[test]
fn packaging_outside_repository_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("deploy.phar");

    let result = Packager::open(dir.path())?.compile(&output);

    assert!(result.is_err());
    assert!(!output.exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn bundle_runs_its_entry_point() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fixture = RepoFixture::new(dir.path())?;
    fixture.stage_and_commit(
        "bundle.toml",
        indoc! {r#"
            alias = "greet.phar"
            entry = "bin/greet"
            interpreter = "sh"
            autoload = []
            optional_autoload = []
            sources = []
        "#},
    )?;
    fixture.stage_and_commit("bin/greet", "#!/bin/sh\necho \"hello $1\"\n")?;
    fixture.stage_and_commit("LICENSE", "MIT License")?;
    let out = tempfile::tempdir()?;
    let bundle = out.path().join("greet.phar");
    Packager::open(fixture.path()?)?.compile(&bundle)?;
    let tmp = tempfile::tempdir()?;

    let run = |arg: &str| -> Result<(bool, String)> {
        let output = Command::new("sh")
            .arg(&bundle)
            .arg(arg)
            .env("TMPDIR", tmp.path())
            .output()?;
        Ok((
            output.status.success(),
            String::from_utf8(output.stdout)?,
        ))
    };

    assert_eq!(run("world")?, (true, "hello world\n".to_string()));
    let mapped = read_dir(tmp.path())?
        .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(mapped.len(), 1);
    assert!(mapped[0].starts_with("greet.phar-"));

    // Second run reuses the extracted payload.
    assert_eq!(run("again")?, (true, "hello again\n".to_string()));
    assert_eq!(read_dir(tmp.path())?.count(), 1);

    Ok(())
}
