//! datastack CLI library: exposes modules for the binary and for tests.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod app;
pub mod application;
pub mod assets;
pub mod cli;
pub mod commands;
pub mod deployers;
pub mod domain;
pub mod infra;
pub mod output;
