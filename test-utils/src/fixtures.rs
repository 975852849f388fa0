// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Topology fixtures.
//!
//! Elements are seeded the way the configuration layer creates them: health uninitialized and
//! fault mask `PORT_UP`. A commit (`StatusEngine::on_commit`) settles them.

use engine::{EngineParams, EngineParamsBuilder, StatusEngine};
use model::keys::{IfKey, LinkKey, NodeKey, PortKey, SpanKey, TenantCtrlrKey, TenantKey};
use model::records::{
    GatewayPortRecord, InterfaceFlags, InterfaceRecord, LinkEnd, NodeKind, PortBinding,
    TenantControllerRecord, TenantRecord, VirtualLinkRecord, VirtualNodeRecord,
};
use model::HealthState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::{MemStore, RecordingAlarms, ScriptedControllers};

/// Builder of a topology in a [`MemStore`]
pub struct Topology<'a> {
    store: &'a MemStore,
}

impl<'a> Topology<'a> {
    #[must_use]
    pub fn new(store: &'a MemStore) -> Self {
        Self { store }
    }

    pub fn tenant(&self, tenant: &str) -> TenantKey {
        let key = TenantKey::new(tenant);
        self.store.put_tenant(TenantRecord::new(key.clone()));
        key
    }

    /// The record of `tenant` over the span of `controller` and `domain`
    pub fn span(&self, tenant: &str, controller: &str, domain: &str) -> TenantCtrlrKey {
        let key = TenantCtrlrKey::new(tenant, controller, domain);
        self.store
            .put_tenant_ctrlr(TenantControllerRecord::new(key.clone()));
        key
    }

    pub fn node(&self, span: &TenantCtrlrKey, node: &str, kind: NodeKind) -> NodeKey {
        let key = NodeKey::new(span.tenant.as_str(), node);
        self.store
            .put_node(VirtualNodeRecord::new(key.clone(), kind, span.span.clone()));
        key
    }

    fn iface_record(&self, node: &NodeKey, iface: &str) -> InterfaceRecord {
        let key = IfKey::new(node.tenant.as_str(), &node.node, iface);
        let (span, kind) = self
            .store
            .node(node)
            .map(|n| (n.span, n.kind))
            .unwrap_or_else(|| (SpanKey::new("none", "none"), NodeKind::Bridge));
        InterfaceRecord::new(key, span).set_node_kind(kind)
    }

    /// Store an interface record as is
    pub fn iface(&self, record: InterfaceRecord) -> IfKey {
        let key = record.key.clone();
        self.store.put_interface(record);
        key
    }

    /// An interface mapped to `port` with the default VLAN
    pub fn mapped(&self, node: &NodeKey, iface: &str, port: &PortKey) -> IfKey {
        let record = self
            .iface_record(node, iface)
            .set_binding(PortBinding::new(port.clone(), 0, false));
        self.iface(record)
    }

    /// An interface mapped to nothing
    pub fn unbound(&self, node: &NodeKey, iface: &str) -> IfKey {
        let record = self.iface_record(node, iface);
        self.iface(record)
    }

    /// A legacy-mapping interface of a unified bridge
    pub fn converted(&self, node: &NodeKey, iface: &str, unified_forward: bool) -> IfKey {
        let mut flags = InterfaceFlags::CONVERTED;
        flags.set(InterfaceFlags::UNIFIED_FORWARD, unified_forward);
        let record = self.iface_record(node, iface).set_flags(flags);
        self.iface(record)
    }

    pub fn gateway_port(&self, span: &TenantCtrlrKey, health: HealthState) {
        self.store
            .put_gateway_port(GatewayPortRecord::new(span.clone(), health));
    }

    /// A virtual link between two new interfaces of `a` and `b`, either one optionally bound
    /// to a port. The link is a boundary link if the nodes are on different spans; it has no
    /// boundary name.
    pub fn link(
        &self,
        name: &str,
        a: (&NodeKey, &str, Option<&PortKey>),
        b: (&NodeKey, &str, Option<&PortKey>),
    ) -> (LinkKey, IfKey, IfKey) {
        let link = LinkKey::new(a.0.tenant.as_str(), name);
        let ra = self.iface_record(a.0, a.1);
        let rb = self.iface_record(b.0, b.1);
        let boundary = ra.span != rb.span;
        self.store.put_link(VirtualLinkRecord::new(
            link.clone(),
            LinkEnd::Tracked(ra.key.clone()),
            LinkEnd::Tracked(rb.key.clone()),
        ));
        let ka = self.link_end(ra, &link, boundary, a.2);
        let kb = self.link_end(rb, &link, boundary, b.2);
        (link, ka, kb)
    }

    /// Give a boundary name to a link
    pub fn name_boundary(&self, link: &LinkKey, name: &str) {
        if let Some(record) = self.store.link(link) {
            self.store.put_link(record.set_boundary_name(name));
        }
    }

    /// A boundary link whose other end is outside of the managed territory
    pub fn open_link(
        &self,
        name: &str,
        node: &NodeKey,
        iface: &str,
        port: Option<&PortKey>,
    ) -> (LinkKey, IfKey) {
        let link = LinkKey::new(node.tenant.as_str(), name);
        let record = self.iface_record(node, iface);
        self.store.put_link(
            VirtualLinkRecord::new(
                link.clone(),
                LinkEnd::Tracked(record.key.clone()),
                LinkEnd::UnknownPeer,
            )
            .set_boundary_name(name),
        );
        let key = self.link_end(record, &link, true, port);
        (link, key)
    }

    fn link_end(
        &self,
        record: InterfaceRecord,
        link: &LinkKey,
        boundary: bool,
        port: Option<&PortKey>,
    ) -> IfKey {
        let mut record = record.set_vlink(link.clone(), boundary);
        if let Some(port) = port {
            record = record.set_binding(PortBinding::new(port.clone(), 0, false));
        }
        self.iface(record)
    }
}

/// An engine wired to in-memory collaborators
pub struct TestBed {
    pub store: Arc<MemStore>,
    pub controllers: Arc<ScriptedControllers>,
    pub alarms: Arc<RecordingAlarms>,
    pub lock: Arc<RwLock<()>>,
    pub engine: StatusEngine,
}

impl TestBed {
    /// Query timeout of test beds
    pub const QUERY_TIMEOUT: Duration = Duration::from_millis(200);

    #[must_use]
    pub fn new() -> Self {
        let params = EngineParamsBuilder::default()
            .name("test-bed")
            .query_timeout(Self::QUERY_TIMEOUT)
            .build()
            .unwrap();
        Self::with_params(params)
    }

    #[must_use]
    pub fn with_params(params: EngineParams) -> Self {
        let store = Arc::new(MemStore::new());
        let controllers = Arc::new(ScriptedControllers::new());
        let alarms = Arc::new(RecordingAlarms::new());
        let lock = Arc::new(RwLock::new(()));
        let engine = StatusEngine::new(
            params,
            store.clone(),
            controllers.clone(),
            alarms.clone(),
            lock.clone(),
        )
        .unwrap();
        Self {
            store,
            controllers,
            alarms,
            lock,
            engine,
        }
    }

    #[must_use]
    pub fn topology(&self) -> Topology<'_> {
        Topology::new(&self.store)
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}
