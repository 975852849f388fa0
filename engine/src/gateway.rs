// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Collaborators of the status engine: the store of records, the controllers that know the
//! actual state of the ports and the consumer of alarms.

use async_trait::async_trait;
use model::keys::{IfKey, LinkKey, NodeKey, PortKey, TenantCtrlrKey, TenantKey};
use model::records::{
    GatewayPortRecord, InterfaceRecord, Revision, TenantControllerRecord, TenantRecord,
    VirtualLinkRecord, VirtualNodeRecord,
};
use model::{FaultDelta, FaultFlags, HealthState, SpanKey};
use std::fmt::Display;
use thiserror::Error;

use crate::errors::StoreResult;

/// Which part of an interface record a read is interested in. Stores may leave out the
/// optional fields a projection does not cover; they are always allowed to return the full
/// record. Only records read with [`Projection::Full`] may be written back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Projection {
    /// Flags, node kind, fault mask and health: what counting the interface in its node needs.
    /// Port binding and virtual link may be missing.
    Flags,
    /// The whole record
    Full,
    /// The (controller, domain) span and port binding, with the flags and node kind that
    /// classify the interface. The virtual link may be missing.
    ControllerDomain,
}

/// Precondition of a write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    /// Overwrite whatever is stored
    Any,
    /// The record must not exist yet
    Absent,
    /// The stored record must be at this revision
    Revision(Revision),
}

impl Match {
    /// Tell if a record at revision `stored` (None if absent) satisfies the precondition
    #[must_use]
    pub fn accepts(self, stored: Option<Revision>) -> bool {
        match self {
            Match::Any => true,
            Match::Absent => stored.is_none(),
            Match::Revision(rev) => stored == Some(rev),
        }
    }
    /// Precondition for writing back a record read at revision `rev`.
    /// Records never written have revision 0 and are created.
    #[must_use]
    pub fn read_at(rev: Revision) -> Self {
        if rev == 0 {
            Match::Absent
        } else {
            Match::Revision(rev)
        }
    }
}

/// Access to the persisted records.
///
/// Every write is its own store transaction and returns the new revision of the record.
/// Scans return keys only: the records are read again by the transaction that mutates them.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn read_interface(
        &self,
        key: &IfKey,
        projection: Projection,
    ) -> StoreResult<Option<InterfaceRecord>>;
    async fn write_interface(&self, record: &InterfaceRecord, guard: Match)
    -> StoreResult<Revision>;

    async fn read_link(&self, key: &LinkKey) -> StoreResult<Option<VirtualLinkRecord>>;
    async fn write_link(&self, record: &VirtualLinkRecord, guard: Match) -> StoreResult<Revision>;

    async fn read_node(&self, key: &NodeKey) -> StoreResult<Option<VirtualNodeRecord>>;
    async fn write_node(&self, record: &VirtualNodeRecord, guard: Match) -> StoreResult<Revision>;

    async fn read_tenant_ctrlr(
        &self,
        key: &TenantCtrlrKey,
    ) -> StoreResult<Option<TenantControllerRecord>>;
    async fn write_tenant_ctrlr(
        &self,
        record: &TenantControllerRecord,
        guard: Match,
    ) -> StoreResult<Revision>;

    async fn read_tenant(&self, key: &TenantKey) -> StoreResult<Option<TenantRecord>>;
    async fn write_tenant(&self, record: &TenantRecord, guard: Match) -> StoreResult<Revision>;

    async fn read_gateway_port(
        &self,
        key: &TenantCtrlrKey,
    ) -> StoreResult<Option<GatewayPortRecord>>;

    /// Interfaces bound to a physical port, across all tenants
    async fn interfaces_by_port(&self, port: &PortKey) -> StoreResult<Vec<IfKey>>;
    /// Interfaces located on a (controller, domain) span, across all tenants
    async fn interfaces_by_span(&self, span: &SpanKey) -> StoreResult<Vec<IfKey>>;
    async fn interfaces_of_tenant(&self, tenant: &TenantKey) -> StoreResult<Vec<IfKey>>;
    async fn interfaces_of_node(&self, node: &NodeKey) -> StoreResult<Vec<IfKey>>;
    async fn nodes_of_tenant(&self, tenant: &TenantKey) -> StoreResult<Vec<NodeKey>>;
    async fn tenant_controllers(&self, tenant: &TenantKey) -> StoreResult<Vec<TenantCtrlrKey>>;
    /// Tenant-controller records of all the tenants spanning a controller
    async fn tenant_controllers_by_controller(
        &self,
        controller: &str,
    ) -> StoreResult<Vec<TenantCtrlrKey>>;
    async fn tenants(&self) -> StoreResult<Vec<TenantKey>>;
}

/// Operational state of a port or controller as reported by a controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PortHealth {
    Up,
    Down,
    Unknown,
}

impl PortHealth {
    /// The change to the port bits of a fault mask that reflects this state
    #[must_use]
    pub fn port_delta(self) -> FaultDelta {
        let set = match self {
            PortHealth::Up => FaultFlags::PORT_UP,
            PortHealth::Down => FaultFlags::PORT_FAULT,
            PortHealth::Unknown => FaultFlags::PORT_UNKNOWN,
        };
        FaultDelta {
            set,
            clear: FaultFlags::PORT,
        }
    }
}

impl From<HealthState> for PortHealth {
    fn from(health: HealthState) -> Self {
        match health {
            HealthState::Up => PortHealth::Up,
            HealthState::Down => PortHealth::Down,
            HealthState::Unknown | HealthState::Uninitialized => PortHealth::Unknown,
        }
    }
}

/// Failures to obtain a state from a controller
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("Controller {0} is unreachable")]
    Unreachable(String),
    #[error("Query rejected: {0}")]
    Rejected(String),
    #[error("Query timed out")]
    Timeout,
}

/// Queries to the controllers
#[async_trait]
pub trait ControllerQueryGateway: Send + Sync {
    async fn query_port(&self, port: &PortKey) -> Result<PortHealth, QueryError>;
    async fn query_controller(&self, controller: &str) -> Result<PortHealth, QueryError>;
}

/// Raising or clearing of the alarm of a tenant over one span
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlarmEvent {
    pub key: TenantCtrlrKey,
    /// Node whose transition caused the alarm change, if any
    pub node: Option<String>,
    /// Interface whose transition caused the alarm change, if any
    pub iface: Option<String>,
    pub raised: bool,
}

impl Display for AlarmEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = if self.raised { "raised" } else { "cleared" };
        write!(f, "alarm {action} for {}", self.key)?;
        if let Some(node) = &self.node {
            write!(f, " node: {node}")?;
        }
        if let Some(iface) = &self.iface {
            write!(f, " interface: {iface}")?;
        }
        Ok(())
    }
}

/// Consumer of alarms. Delivery is fire-and-forget: failures are the gateway's business.
#[async_trait]
pub trait AlarmGateway: Send + Sync {
    async fn notify(&self, event: AlarmEvent);
}
