//! Command implementations

pub mod config;
pub mod deploy;
pub mod destroy;
pub mod list;
pub mod synth;
pub mod version;
