//! Domain layer — pure resource modelling, validation and stack composition.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs` or `std::process`.
//! All functions are synchronous and take data in, returning data out.

pub mod app;
pub mod compute;
pub mod config;
pub mod data;
pub mod edge;
pub mod error;
pub mod iam;
pub mod network;
pub mod security;
pub mod stack;
pub mod stacks;
pub mod storage;

pub use app::{App, STACK_NAMES};
pub use config::{StrataConfig, validate_config_key, validate_config_value};
pub use stack::Stack;
