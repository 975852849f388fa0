// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Operational-status propagation engine of the VTN manager.
//!
//! Signals from the controllers (port state changes, controller connectivity, path faults)
//! and configuration commits are turned into fault masks on the interfaces they concern.
//! Masks are reconciled across virtual links and health changes are aggregated into virtual
//! nodes, tenant spans and tenants, raising or clearing alarms on the way.
//!
//! The engine is stateless. All the state lives in records accessed through a
//! [`PersistenceGateway`]; controllers are queried through a [`ControllerQueryGateway`] and
//! alarms are delivered to an [`AlarmGateway`].

#![deny(clippy::all, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod counters;
mod engine;
pub mod errors;
pub mod gateway;
mod link;
mod node;
pub mod params;
mod pass;
pub mod samples;
mod tenant;
pub mod updater;

// re-exports
pub use counters::init_metrics;
pub use engine::{BatchReport, StatusEngine};
pub use errors::{EngineError, EngineResult, StoreError, StoreResult};
pub use gateway::{
    AlarmEvent, AlarmGateway, ControllerQueryGateway, Match, PersistenceGateway, PortHealth,
    Projection, QueryError,
};
pub use link::RemoteUpdate;
pub use params::{EngineParams, EngineParamsBuilder};
pub use samples::PortSamples;
pub use tenant::AlarmDecision;
pub use updater::{DriverResult, InterfaceUpdate, Signal};
