//! # tstcc core
//!
//! Shared building blocks for the tstcc workspace: all-or-nothing artifact
//! publishing and the layered runner settings consumed by the CLI.

pub mod config;
pub mod persistence;

pub use config::{BackendSettings, PipelineSettings, TransferSettings, load_settings};
pub use persistence::{atomic_write, atomic_write_json, load_json, sha256_hex};
