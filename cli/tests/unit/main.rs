//! Unit tests for strata CLI
//!
//! These tests use mocked ports and run fast without external I/O.

mod architecture;
mod config_service;
mod deploy_service;
mod mocks;
mod property_tests;
mod synth_service;
