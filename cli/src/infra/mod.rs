//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, state
//! config and journal files, vault HTTP clients, and artifact encryption.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod encryption;
pub mod fs;
pub mod journal;
pub mod state;
pub mod vault;
