// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Notifications derived from the transition of a fault mask

use serde::{Deserialize, Serialize};

use crate::fault::FaultFlags;

/// What a change of fault mask means for the rest of the topology
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIs,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Notification {
    /// Nothing that matters to the peers changed
    Commit,
    PortFault,
    PortUnknown,
    PortFaultReset,
    PortFaultResetFromUnknown,
    PortFaultFromUnknown,
    PortUnknownFromDown,
    PathFault,
    PathFaultReset,
    VtnExhaustion,
    VtnExhaustionReset,
}

impl Notification {
    /// Tell if the notification brings an element into the unknown state
    #[must_use]
    pub fn is_into_unknown(self) -> bool {
        matches!(
            self,
            Notification::PortUnknown | Notification::PortUnknownFromDown
        )
    }
}

/// Derive the notification for the transition `orig` -> `new` of a fault mask.
///
/// A transition which only toggles `PATH_FAULT` is a path notification whatever else is set,
/// and likewise for `REMOTE_VTN_EXHAUSTION`.
/// Every other transition between two masks of the same health is a [`Notification::Commit`].
#[must_use]
pub fn derive_notification(orig: FaultFlags, new: FaultFlags) -> Notification {
    if orig ^ new == FaultFlags::PATH_FAULT {
        return if new.contains(FaultFlags::PATH_FAULT) {
            Notification::PathFault
        } else {
            Notification::PathFaultReset
        };
    }
    if orig ^ new == FaultFlags::REMOTE_VTN_EXHAUSTION {
        return if new.contains(FaultFlags::REMOTE_VTN_EXHAUSTION) {
            Notification::VtnExhaustion
        } else {
            Notification::VtnExhaustionReset
        };
    }
    let orig_unknown = orig.contains(FaultFlags::PORT_UNKNOWN);
    let new_unknown = new.contains(FaultFlags::PORT_UNKNOWN);
    match (orig.is_up(), orig_unknown, new.is_up(), new_unknown) {
        // up -> ...
        (true, _, true, _) => Notification::Commit,
        (true, _, false, false) => Notification::PortFault,
        (true, _, false, true) => Notification::PortUnknown,
        // unknown -> ...
        (false, true, true, _) => Notification::PortFaultResetFromUnknown,
        (false, true, false, false) => Notification::PortFaultFromUnknown,
        (false, true, false, true) => Notification::Commit,
        // down -> ...
        (false, false, true, _) => Notification::PortFaultReset,
        (false, false, false, true) => Notification::PortUnknownFromDown,
        (false, false, false, false) => Notification::Commit,
    }
}
