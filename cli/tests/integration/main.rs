//! Integration tests for the datastack CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior. No
//! external tool is ever run: every deploy here is a dry run.

mod cli_tests;
mod decrypt_command;
