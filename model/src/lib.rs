// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Data model of the VTN operational-status engine.
//!
//! This crate has no I/O. It defines the keys under which the persisted records are stored,
//! the fault flags and the health they encode, the interface classifier and the derivation
//! of notifications from a pair of fault masks.

#![deny(clippy::all, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod classify;
pub mod display;
pub mod fault;
pub mod keys;
pub mod notify;
pub mod records;

// re-exports
pub use classify::{InterfaceKind, classify};
pub use fault::{FaultDelta, FaultFlags, HealthState, decode, encode};
pub use keys::{IfKey, LinkKey, NodeKey, PortKey, SpanKey, TenantCtrlrKey, TenantKey};
pub use notify::{Notification, derive_notification};
