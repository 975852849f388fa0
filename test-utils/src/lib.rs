// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Testing utilities for the VTN status engine: in-memory gateways and topology fixtures

pub mod alarms;
pub mod controllers;
pub mod fixtures;
pub mod store;

pub use alarms::RecordingAlarms;
pub use controllers::ScriptedControllers;
pub use fixtures::{TestBed, Topology};
pub use store::MemStore;
