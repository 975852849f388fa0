// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Persisted records read and written by the status engine.
//!
//! All of these are owned by the configuration store. They are created by the configuration
//! layer (health `Uninitialized`, mask `PORT_UP`) and only mutated by the engine.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::fault::{FaultFlags, HealthState, decode};
use crate::keys::{IfKey, LinkKey, NodeKey, PortKey, SpanKey, TenantCtrlrKey, TenantKey};

/// Revision of a record, as assigned by the store on every successful write
pub type Revision = u64;

bitflags! {
    /// Static attributes of an interface which drive its classification
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct InterfaceFlags: u32 {
        /// The virtual link of this interface crosses into another controller/domain
        const BOUNDARY = 0x01;
        /// The interface terminates a virtual link
        const LINKED = 0x02;
        /// Legacy-mapping shim inside a unified virtual bridge
        const CONVERTED = 0x04;
        /// Converted interface which only forwards traffic for a unified bridge
        const UNIFIED_FORWARD = 0x08;
    }
}

/// Kind of a virtual node
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIs,
)]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Bridge,
    Router,
    Terminal,
    /// Passive membership record of a port-map
    PortMap,
}

/// Binding of an interface to a physical port
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub port: PortKey,
    pub vlan: u16,
    pub tagged: bool,
}

impl PortBinding {
    #[must_use]
    pub fn new(port: PortKey, vlan: u16, tagged: bool) -> Self {
        Self { port, vlan, tagged }
    }
}

/// Virtual node interface
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub key: IfKey,
    pub span: SpanKey,
    pub fault: FaultFlags,
    pub health: HealthState,
    pub flags: InterfaceFlags,
    pub node_kind: NodeKind,
    pub admin_enabled: bool,
    pub binding: Option<PortBinding>,
    pub vlink: Option<LinkKey>,
    pub revision: Revision,
}

impl InterfaceRecord {
    #[must_use]
    pub fn new(key: IfKey, span: SpanKey) -> Self {
        Self {
            key,
            span,
            fault: FaultFlags::PORT_UP,
            health: HealthState::Uninitialized,
            flags: InterfaceFlags::empty(),
            node_kind: NodeKind::Bridge,
            admin_enabled: true,
            binding: None,
            vlink: None,
            revision: 0,
        }
    }
    #[must_use]
    pub fn set_binding(mut self, binding: PortBinding) -> Self {
        self.binding = Some(binding);
        self
    }
    #[must_use]
    pub fn set_vlink(mut self, vlink: LinkKey, boundary: bool) -> Self {
        self.vlink = Some(vlink);
        self.flags.insert(InterfaceFlags::LINKED);
        self.flags.set(InterfaceFlags::BOUNDARY, boundary);
        self
    }
    #[must_use]
    pub fn set_flags(mut self, flags: InterfaceFlags) -> Self {
        self.flags = flags;
        self
    }
    #[must_use]
    pub fn set_node_kind(mut self, kind: NodeKind) -> Self {
        self.node_kind = kind;
        self
    }
    #[must_use]
    pub fn set_admin_enabled(mut self, enabled: bool) -> Self {
        self.admin_enabled = enabled;
        self
    }
    #[must_use]
    pub fn set_fault(mut self, fault: FaultFlags) -> Self {
        self.fault = fault;
        self.health = decode(fault);
        self
    }
    /// Key of the tenant-controller record this interface contributes to
    #[must_use]
    pub fn tenant_ctrlr_key(&self) -> TenantCtrlrKey {
        TenantCtrlrKey {
            tenant: self.key.tenant.clone(),
            span: self.span.clone(),
        }
    }
}

/// One end of a virtual link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkEnd {
    /// An interface tracked by this system
    Tracked(IfKey),
    /// The link crosses into territory with no tracked element
    UnknownPeer,
}

/// Virtual link between two interfaces
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualLinkRecord {
    pub key: LinkKey,
    pub ends: [LinkEnd; 2],
    pub fault: FaultFlags,
    pub health: HealthState,
    pub boundary_name: Option<String>,
    pub revision: Revision,
}

impl VirtualLinkRecord {
    #[must_use]
    pub fn new(key: LinkKey, end1: LinkEnd, end2: LinkEnd) -> Self {
        Self {
            key,
            ends: [end1, end2],
            fault: FaultFlags::PORT_UP,
            health: HealthState::Uninitialized,
            boundary_name: None,
            revision: 0,
        }
    }
    #[must_use]
    pub fn set_boundary_name(mut self, name: &str) -> Self {
        self.boundary_name = Some(name.to_owned());
        self
    }
    /// Get the end of the link opposite to `local`, if `local` is one of its ends
    #[must_use]
    pub fn peer_of(&self, local: &IfKey) -> Option<&LinkEnd> {
        match &self.ends {
            [LinkEnd::Tracked(a), other] if a == local => Some(other),
            [other, LinkEnd::Tracked(b)] if b == local => Some(other),
            _ => None,
        }
    }
}

/// Saturating counts of the unhealthy elements contributing to an aggregate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounters {
    pub down: u32,
    pub unknown: u32,
}

impl HealthCounters {
    fn slot(&mut self, health: HealthState) -> Option<&mut u32> {
        match health {
            HealthState::Down => Some(&mut self.down),
            HealthState::Unknown => Some(&mut self.unknown),
            HealthState::Up | HealthState::Uninitialized => None,
        }
    }
    /// Move one contributor from `before` to `after`. Counters never go below zero.
    pub fn apply(&mut self, before: HealthState, after: HealthState) {
        if before == after {
            return;
        }
        if let Some(count) = self.slot(before) {
            *count = count.saturating_sub(1);
        }
        if let Some(count) = self.slot(after) {
            *count = count.saturating_add(1);
        }
    }
    /// Number of unhealthy contributors
    #[must_use]
    pub fn unhealthy(&self) -> u32 {
        self.down.saturating_add(self.unknown)
    }
    /// Health of the aggregate: `Unknown` wins over `Down`, `Up` when nothing is unhealthy
    #[must_use]
    pub fn health(&self) -> HealthState {
        if self.unknown > 0 {
            HealthState::Unknown
        } else if self.down > 0 {
            HealthState::Down
        } else {
            HealthState::Up
        }
    }
}

/// Virtual bridge, router, terminal or port-map
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNodeRecord {
    pub key: NodeKey,
    pub kind: NodeKind,
    pub span: SpanKey,
    pub counters: HealthCounters,
    pub health: HealthState,
    pub revision: Revision,
}

impl VirtualNodeRecord {
    #[must_use]
    pub fn new(key: NodeKey, kind: NodeKind, span: SpanKey) -> Self {
        Self {
            key,
            kind,
            span,
            counters: HealthCounters::default(),
            health: HealthState::Uninitialized,
            revision: 0,
        }
    }
    #[must_use]
    pub fn tenant_ctrlr_key(&self) -> TenantCtrlrKey {
        TenantCtrlrKey {
            tenant: self.key.tenant.clone(),
            span: self.span.clone(),
        }
    }
}

/// Status of a tenant over one (controller, domain) span
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantControllerRecord {
    pub key: TenantCtrlrKey,
    pub counters: HealthCounters,
    pub health: HealthState,
    pub alarm_raised: bool,
    pub disconnected: bool,
    pub revision: Revision,
}

impl TenantControllerRecord {
    #[must_use]
    pub fn new(key: TenantCtrlrKey) -> Self {
        Self {
            key,
            counters: HealthCounters::default(),
            health: HealthState::Uninitialized,
            alarm_raised: false,
            disconnected: false,
            revision: 0,
        }
    }
    /// Health implied by the counters and the connectivity of the controller
    #[must_use]
    pub fn derived_health(&self) -> HealthState {
        if self.disconnected {
            HealthState::Unknown
        } else {
            self.counters.health()
        }
    }
}

/// Tenant (VTN)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub key: TenantKey,
    pub down_count: u32,
    pub health: HealthState,
    pub revision: Revision,
}

impl TenantRecord {
    #[must_use]
    pub fn new(key: TenantKey) -> Self {
        Self {
            key,
            down_count: 0,
            health: HealthState::Uninitialized,
            revision: 0,
        }
    }
}

/// Aggregate status of the converted interfaces of a tenant over one span
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPortRecord {
    pub key: TenantCtrlrKey,
    pub health: HealthState,
    pub revision: Revision,
}

impl GatewayPortRecord {
    #[must_use]
    pub fn new(key: TenantCtrlrKey, health: HealthState) -> Self {
        Self {
            key,
            health,
            revision: 0,
        }
    }
}
