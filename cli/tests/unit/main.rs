//! Unit tests for the datastack CLI
//!
//! These tests use mocked dependencies and run fast without external tools.

mod dry_run;
mod encryption;
mod helpers;
mod mocks;
mod orchestrator;
mod secrets;
mod state_store;
