// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! State shared by the steps of one write transaction

use model::display::FaultDisplay;
use model::keys::IfKey;
use model::{FaultFlags, HealthState, decode};
use std::fmt::Display;

use crate::counters;
use crate::errors::{EngineError, EngineResult};
use crate::gateway::{AlarmEvent, PersistenceGateway};
use crate::samples::PortSamples;

/// How records missing from the store are handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PassMode {
    /// Handling a signal: aggregation records must exist
    Live,
    /// Building the initial state of a tenant: aggregation records are created as needed
    Settle,
}

/// The element whose transition triggers an aggregate change
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Origin {
    pub(crate) node: Option<String>,
    pub(crate) iface: Option<String>,
}

impl Origin {
    pub(crate) fn iface(key: &IfKey) -> Self {
        Self {
            node: Some(key.node.clone()),
            iface: Some(key.iface.clone()),
        }
    }
}

/// One transaction, run with the configuration lock held for writing.
///
/// The steps of the propagation (updater, link reconciler, aggregators) are methods of this
/// type, defined in their respective modules.
pub(crate) struct Pass<'a> {
    pub(crate) store: &'a dyn PersistenceGateway,
    pub(crate) samples: &'a PortSamples,
    pub(crate) mode: PassMode,
    /// Alarm changes stored during the transaction, dispatched once the lock is released
    pub(crate) alarms: Vec<AlarmEvent>,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(
        store: &'a dyn PersistenceGateway,
        samples: &'a PortSamples,
        mode: PassMode,
    ) -> Self {
        Self {
            store,
            samples,
            mode,
            alarms: Vec::new(),
        }
    }
    pub(crate) fn settling(&self) -> bool {
        self.mode == PassMode::Settle
    }
}

/// Check that a stored fault mask and health agree.
/// `Uninitialized` records may carry any well-formed mask.
pub(crate) fn validate(
    key: &dyn Display,
    mask: FaultFlags,
    health: HealthState,
) -> EngineResult<()> {
    if !mask.is_well_formed() {
        return Err(EngineError::Invariant {
            key: key.to_string(),
            detail: format!("undefined fault bits in {:#x}", mask.bits()),
        });
    }
    if !health.is_uninitialized() && decode(mask) != health {
        return Err(EngineError::Invariant {
            key: key.to_string(),
            detail: format!("health {health} does not match faults {}", FaultDisplay(mask)),
        });
    }
    Ok(())
}

/// Like [`validate`], logging the violation. Returns false if the record must be skipped.
pub(crate) fn is_sane(key: &dyn Display, mask: FaultFlags, health: HealthState) -> bool {
    match validate(key, mask, health) {
        Ok(()) => true,
        Err(e) => {
            counters::invariant_violation(&e);
            false
        }
    }
}

/// Describe a mask transition, for errors and logs
pub(crate) fn transition(before: FaultFlags, after: FaultFlags) -> String {
    format!("{} -> {}", FaultDisplay(before), FaultDisplay(after))
}
