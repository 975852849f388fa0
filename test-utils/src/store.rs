// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory persistence gateway.
//!
//! Records live in one table per kind. Writes honor their precondition and bump the revision
//! of the record, the way a transactional store would. Failures can be injected.

use async_trait::async_trait;
use dashmap::DashMap;
use engine::{Match, PersistenceGateway, Projection, StoreError, StoreResult};
use model::keys::{IfKey, LinkKey, NodeKey, PortKey, SpanKey, TenantCtrlrKey, TenantKey};
use model::records::{
    GatewayPortRecord, InterfaceRecord, Revision, TenantControllerRecord, TenantRecord,
    VirtualLinkRecord, VirtualNodeRecord,
};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
#[allow(unused)]
use tracing::trace;

/// Records carrying a revision
pub trait Versioned: Clone {
    fn revision(&self) -> Revision;
    fn set_revision(&mut self, revision: Revision);
}

macro_rules! versioned {
    ($($record:ty),*) => {
        $(impl Versioned for $record {
            fn revision(&self) -> Revision {
                self.revision
            }
            fn set_revision(&mut self, revision: Revision) {
                self.revision = revision;
            }
        })*
    };
}
versioned!(
    InterfaceRecord,
    VirtualLinkRecord,
    VirtualNodeRecord,
    TenantControllerRecord,
    TenantRecord,
    GatewayPortRecord
);

#[derive(Debug, Default)]
pub struct MemStore {
    interfaces: DashMap<IfKey, InterfaceRecord>,
    links: DashMap<LinkKey, VirtualLinkRecord>,
    nodes: DashMap<NodeKey, VirtualNodeRecord>,
    tenant_ctrlrs: DashMap<TenantCtrlrKey, TenantControllerRecord>,
    tenants: DashMap<TenantKey, TenantRecord>,
    gateway_ports: DashMap<TenantCtrlrKey, GatewayPortRecord>,
    /// failure returned by every operation while set
    failure: Mutex<Option<StoreError>>,
    /// keys (as displayed) whose next write conflicts
    conflicts: DashMap<String, ()>,
    writes: AtomicUsize,
}

fn sorted<K: Ord>(mut keys: Vec<K>) -> Vec<K> {
    keys.sort();
    keys
}

/// Leave out what a projection does not cover, so that readers relying on it get caught
fn project(mut record: InterfaceRecord, projection: Projection) -> InterfaceRecord {
    match projection {
        Projection::Full => {}
        Projection::Flags => {
            record.binding = None;
            record.vlink = None;
        }
        Projection::ControllerDomain => record.vlink = None,
    }
    record
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `failure`, or work again with `None`
    pub fn fail_with(&self, failure: Option<StoreError>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Make the next write of the record with key `key` fail with a conflict
    pub fn conflict_once(&self, key: &dyn Display) {
        self.conflicts.insert(key.to_string(), ());
    }

    /// Number of successful writes so far
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn check(&self) -> StoreResult<()> {
        match &*self.failure.lock().unwrap() {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    fn read<K, R>(&self, table: &DashMap<K, R>, key: &K) -> StoreResult<Option<R>>
    where
        K: Eq + Hash,
        R: Clone,
    {
        self.check()?;
        Ok(table.get(key).map(|r| r.clone()))
    }

    fn write<K, R>(
        &self,
        table: &DashMap<K, R>,
        key: &K,
        record: &R,
        guard: Match,
    ) -> StoreResult<Revision>
    where
        K: Eq + Hash + Clone + Display,
        R: Versioned,
    {
        self.check()?;
        let stored = table.get(key).map(|r| r.revision());
        let name = key.to_string();
        if self.conflicts.remove(&name).is_some() || !guard.accepts(stored) {
            let expected = match guard {
                Match::Revision(rev) => Some(rev),
                Match::Any | Match::Absent => None,
            };
            return Err(StoreError::Conflict {
                key: name,
                expected,
                found: stored,
            });
        }
        let revision = stored.unwrap_or(0) + 1;
        let mut record = record.clone();
        record.set_revision(revision);
        table.insert(key.clone(), record);
        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!("Stored {name} at revision {revision}");
        Ok(revision)
    }

    fn scan<K, R>(&self, table: &DashMap<K, R>, keep: impl Fn(&R) -> bool) -> StoreResult<Vec<K>>
    where
        K: Eq + Hash + Clone + Ord,
    {
        self.check()?;
        let keys = table
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        Ok(sorted(keys))
    }

    // Seeding: records are stored as given, with a fresh revision

    pub fn put_interface(&self, record: InterfaceRecord) {
        self.seed(&self.interfaces, record.key.clone(), record);
    }
    pub fn put_link(&self, record: VirtualLinkRecord) {
        self.seed(&self.links, record.key.clone(), record);
    }
    pub fn put_node(&self, record: VirtualNodeRecord) {
        self.seed(&self.nodes, record.key.clone(), record);
    }
    pub fn put_tenant_ctrlr(&self, record: TenantControllerRecord) {
        self.seed(&self.tenant_ctrlrs, record.key.clone(), record);
    }
    pub fn put_tenant(&self, record: TenantRecord) {
        self.seed(&self.tenants, record.key.clone(), record);
    }
    pub fn put_gateway_port(&self, record: GatewayPortRecord) {
        self.seed(&self.gateway_ports, record.key.clone(), record);
    }

    fn seed<K, R>(&self, table: &DashMap<K, R>, key: K, mut record: R)
    where
        K: Eq + Hash,
        R: Versioned,
    {
        let revision = table.get(&key).map_or(0, |r| r.revision()) + 1;
        record.set_revision(revision);
        table.insert(key, record);
    }

    /// Drop an interface record, as the configuration layer does when deleting it
    pub fn remove_interface(&self, key: &IfKey) -> Option<InterfaceRecord> {
        self.interfaces.remove(key).map(|(_, record)| record)
    }
    pub fn remove_node(&self, key: &NodeKey) -> Option<VirtualNodeRecord> {
        self.nodes.remove(key).map(|(_, record)| record)
    }

    // Inspection

    #[must_use]
    pub fn interface(&self, key: &IfKey) -> Option<InterfaceRecord> {
        self.interfaces.get(key).map(|r| r.clone())
    }
    #[must_use]
    pub fn link(&self, key: &LinkKey) -> Option<VirtualLinkRecord> {
        self.links.get(key).map(|r| r.clone())
    }
    #[must_use]
    pub fn node(&self, key: &NodeKey) -> Option<VirtualNodeRecord> {
        self.nodes.get(key).map(|r| r.clone())
    }
    #[must_use]
    pub fn tenant_ctrlr(&self, key: &TenantCtrlrKey) -> Option<TenantControllerRecord> {
        self.tenant_ctrlrs.get(key).map(|r| r.clone())
    }
    #[must_use]
    pub fn tenant(&self, key: &TenantKey) -> Option<TenantRecord> {
        self.tenants.get(key).map(|r| r.clone())
    }
}

#[async_trait]
impl PersistenceGateway for MemStore {
    async fn read_interface(
        &self,
        key: &IfKey,
        projection: Projection,
    ) -> StoreResult<Option<InterfaceRecord>> {
        let record = self.read(&self.interfaces, key)?;
        Ok(record.map(|r| project(r, projection)))
    }
    async fn write_interface(
        &self,
        record: &InterfaceRecord,
        guard: Match,
    ) -> StoreResult<Revision> {
        self.write(&self.interfaces, &record.key, record, guard)
    }

    async fn read_link(&self, key: &LinkKey) -> StoreResult<Option<VirtualLinkRecord>> {
        self.read(&self.links, key)
    }
    async fn write_link(&self, record: &VirtualLinkRecord, guard: Match) -> StoreResult<Revision> {
        self.write(&self.links, &record.key, record, guard)
    }

    async fn read_node(&self, key: &NodeKey) -> StoreResult<Option<VirtualNodeRecord>> {
        self.read(&self.nodes, key)
    }
    async fn write_node(&self, record: &VirtualNodeRecord, guard: Match) -> StoreResult<Revision> {
        self.write(&self.nodes, &record.key, record, guard)
    }

    async fn read_tenant_ctrlr(
        &self,
        key: &TenantCtrlrKey,
    ) -> StoreResult<Option<TenantControllerRecord>> {
        self.read(&self.tenant_ctrlrs, key)
    }
    async fn write_tenant_ctrlr(
        &self,
        record: &TenantControllerRecord,
        guard: Match,
    ) -> StoreResult<Revision> {
        self.write(&self.tenant_ctrlrs, &record.key, record, guard)
    }

    async fn read_tenant(&self, key: &TenantKey) -> StoreResult<Option<TenantRecord>> {
        self.read(&self.tenants, key)
    }
    async fn write_tenant(&self, record: &TenantRecord, guard: Match) -> StoreResult<Revision> {
        self.write(&self.tenants, &record.key, record, guard)
    }

    async fn read_gateway_port(
        &self,
        key: &TenantCtrlrKey,
    ) -> StoreResult<Option<GatewayPortRecord>> {
        self.read(&self.gateway_ports, key)
    }

    async fn interfaces_by_port(&self, port: &PortKey) -> StoreResult<Vec<IfKey>> {
        self.scan(&self.interfaces, |r| {
            r.binding.as_ref().is_some_and(|b| &b.port == port)
        })
    }
    async fn interfaces_by_span(&self, span: &SpanKey) -> StoreResult<Vec<IfKey>> {
        self.scan(&self.interfaces, |r| &r.span == span)
    }
    async fn interfaces_of_tenant(&self, tenant: &TenantKey) -> StoreResult<Vec<IfKey>> {
        self.scan(&self.interfaces, |r| &r.key.tenant == tenant)
    }
    async fn interfaces_of_node(&self, node: &NodeKey) -> StoreResult<Vec<IfKey>> {
        self.scan(&self.interfaces, |r| {
            r.key.tenant == node.tenant && r.key.node == node.node
        })
    }
    async fn nodes_of_tenant(&self, tenant: &TenantKey) -> StoreResult<Vec<NodeKey>> {
        self.scan(&self.nodes, |r| &r.key.tenant == tenant)
    }
    async fn tenant_controllers(&self, tenant: &TenantKey) -> StoreResult<Vec<TenantCtrlrKey>> {
        self.scan(&self.tenant_ctrlrs, |r| &r.key.tenant == tenant)
    }
    async fn tenant_controllers_by_controller(
        &self,
        controller: &str,
    ) -> StoreResult<Vec<TenantCtrlrKey>> {
        self.scan(&self.tenant_ctrlrs, |r| r.key.span.controller == controller)
    }
    async fn tenants(&self) -> StoreResult<Vec<TenantKey>> {
        self.scan(&self.tenants, |_| true)
    }
}
