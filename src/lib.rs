// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment automation for source-controlled web sites.
//!
//! A __site__ is a pair of directories: a Git checkout of its source, and the
//! live directory that gets served. Deploying a site means pulling the
//! source, installing its dependencies, synchronizing the source into the
//! live directory, and fixing ownership and ACLs of the live directory. Each
//! of those steps is an [`action::Action`] that shells out to the usual
//! tools through a [`process::ProcessRunner`].
//!
//! Separately, [`package::Packager`] builds the deployment tool itself into a
//! single self-contained bundle.

pub mod action;
pub mod config;
pub mod git;
pub mod package;
pub mod path;
pub mod process;
