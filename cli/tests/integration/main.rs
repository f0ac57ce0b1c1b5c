//! Integration tests for the strata CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! Every test runs in a temp directory with `STRATA_CONFIG` pointed inside
//! it, so nothing outside the sandbox is read or written.

mod cli_tests;
mod config_command;
mod synth_command;
