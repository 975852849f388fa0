// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of the tracing of the VTN manager.
//!
//! Crates declare their tracing targets with [`trace_target!`], together with a default level
//! and a set of tags. All declarations are collected at link time. Levels can then be changed
//! per tag at runtime with a configuration string such as `default=info,link=debug`.

#![deny(clippy::all, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod control;
pub mod display;
pub mod targets;

use thiserror::Error;

// re-exports
pub use control::TracingControl;
pub use control::get_trace_ctl;
pub use tracing_subscriber::filter::LevelFilter;

/// Errors when configuring tracing
#[derive(Debug, Error, PartialEq)]
pub enum TraceCtlError {
    #[error("Invalid syntax '{0}': expected tag=level")]
    Syntax(String),
    #[error("Invalid level '{0}' for tag '{1}'")]
    BadLevel(String, String),
    #[error("Unknown tag '{0}'")]
    UnknownTag(String),
}
