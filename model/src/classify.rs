// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface classifier

use crate::records::{InterfaceFlags, InterfaceRecord, NodeKind};

/// How the status of an interface is determined
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "snake_case")]
pub enum InterfaceKind {
    /// Terminates a virtual link crossing into another controller/domain
    Boundary,
    /// Terminates a virtual link
    Linked,
    /// Bound to a physical port
    Mapped,
    /// Neither linked nor bound
    Unbound,
    /// Legacy-mapping shim of a unified bridge
    Converted,
}

impl InterfaceKind {
    /// Tell if the status of interfaces of this kind depends on a virtual link
    #[must_use]
    pub fn is_link_end(self) -> bool {
        matches!(self, InterfaceKind::Boundary | InterfaceKind::Linked)
    }
}

/// Classify an interface from its stored attributes.
///
/// Interfaces of port-map nodes are passive membership records: only the presence of a port
/// binding matters for them.
#[must_use]
pub fn classify(record: &InterfaceRecord) -> InterfaceKind {
    if record.node_kind != NodeKind::PortMap {
        if record.flags.contains(InterfaceFlags::CONVERTED) {
            return InterfaceKind::Converted;
        }
        if record.flags.contains(InterfaceFlags::BOUNDARY) {
            return InterfaceKind::Boundary;
        }
        if record.flags.contains(InterfaceFlags::LINKED) {
            return InterfaceKind::Linked;
        }
    }
    if record.binding.is_some() {
        InterfaceKind::Mapped
    } else {
        InterfaceKind::Unbound
    }
}
