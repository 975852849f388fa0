// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use vtnmgr_engine as engine;

use engine::PortHealth;
use model::keys::{IfKey, LinkKey, PortKey, SpanKey, TenantCtrlrKey, TenantKey};
use model::records::NodeKind;
use model::{FaultFlags, HealthState, InterfaceKind, Notification};
use pretty_assertions::assert_eq;
use test_utils::TestBed;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

/// Two bridges of a tenant joined by a virtual link, each on its own span
struct Boundary {
    bed: TestBed,
    tenant: TenantKey,
    span_a: TenantCtrlrKey,
    span_b: TenantCtrlrKey,
    link: LinkKey,
    a: IfKey,
    b: IfKey,
}

fn boundary() -> Boundary {
    let bed = TestBed::new();
    let (tenant, span_a, span_b, link, a, b) = {
        let topo = bed.topology();
        let tenant = topo.tenant("vtn1");
        let span_a = topo.span("vtn1", "odc1", "dom1");
        let span_b = topo.span("vtn1", "odc2", "dom2");
        let vbr1 = topo.node(&span_a, "vbr1", NodeKind::Bridge);
        let vbr2 = topo.node(&span_b, "vbr2", NodeKind::Bridge);
        let (link, a, b) = topo.link("vlk1", (&vbr1, "if1", None), (&vbr2, "if1", None));
        (tenant, span_a, span_b, link, a, b)
    };
    Boundary {
        bed,
        tenant,
        span_a,
        span_b,
        link,
        a,
        b,
    }
}

impl Boundary {
    fn disable_a(&self) {
        let record = self.bed.store.interface(&self.a).unwrap();
        self.bed.topology().iface(record.set_admin_enabled(false));
    }
    fn mask(&self, key: &IfKey) -> FaultFlags {
        self.bed.store.interface(key).unwrap().fault
    }
}

/// Two bridges on the same span joined by a virtual link, both ends bound to a port
struct Linked {
    bed: TestBed,
    span: TenantCtrlrKey,
    link: LinkKey,
    a: IfKey,
    b: IfKey,
    port_a: PortKey,
}

async fn linked() -> Linked {
    let bed = TestBed::new();
    let port_a = PortKey::new("odc1", "dom1", "PP-OF:00:00:00:00:00:00:00:01-s1-eth1");
    let port_b = PortKey::new("odc1", "dom1", "PP-OF:00:00:00:00:00:00:00:02-s2-eth1");
    let (tenant, span, link, a, b) = {
        let topo = bed.topology();
        let tenant = topo.tenant("vtn1");
        let span = topo.span("vtn1", "odc1", "dom1");
        let vbr1 = topo.node(&span, "vbr1", NodeKind::Bridge);
        let vbr2 = topo.node(&span, "vbr2", NodeKind::Bridge);
        let (link, a, b) = topo.link(
            "vlk1",
            (&vbr1, "if1", Some(&port_a)),
            (&vbr2, "if1", Some(&port_b)),
        );
        (tenant, span, link, a, b)
    };
    bed.engine.on_commit(&tenant).await.unwrap();
    Linked {
        bed,
        span,
        link,
        a,
        b,
        port_a,
    }
}

#[tokio::test]
#[traced_test]
async fn test_boundary_disconnect_leaves_healthy_peer() {
    let t = boundary();
    let report = t.bed.engine.on_commit(&t.tenant).await.unwrap();
    assert_eq!(report.updates[0].kind, InterfaceKind::Boundary);
    assert_eq!(t.mask(&t.a), FaultFlags::PORT_UP);
    assert_eq!(t.mask(&t.b), FaultFlags::PORT_UP);

    let cancel = CancellationToken::new();
    let report = t
        .bed
        .engine
        .on_controller_connectivity("odc1", false, &cancel)
        .await
        .unwrap();
    assert_eq!(report.tenants, 1);
    assert_eq!(report.updates.len(), 1);
    let update = &report.updates[0];
    assert_eq!(update.new_mask, FaultFlags::PORT_UNKNOWN);
    assert_eq!(update.notification, Notification::PortUnknown);
    let remote = update.remote.as_ref().unwrap();
    assert_eq!(remote.key, t.b);
    assert_eq!(remote.new_mask, FaultFlags::PORT_UP);

    assert_eq!(t.mask(&t.a), FaultFlags::PORT_UNKNOWN);
    assert_eq!(t.mask(&t.b), FaultFlags::PORT_UP);
    let link = t.bed.store.link(&t.link).unwrap();
    assert_eq!(link.fault, FaultFlags::PORT_UNKNOWN);
    assert_eq!(link.health, HealthState::Unknown);

    let span = t.bed.store.tenant_ctrlr(&t.span_a).unwrap();
    assert!(span.disconnected);
    assert_eq!(span.health, HealthState::Unknown);
    assert_eq!(t.bed.store.tenant_ctrlr(&t.span_b).unwrap().health, HealthState::Up);
    assert_eq!(t.bed.store.tenant(&t.tenant).unwrap().health, HealthState::Unknown);
    assert!(t.bed.alarms.events().is_empty());
}

#[tokio::test]
async fn test_boundary_reconnect() {
    let t = boundary();
    t.bed.engine.on_commit(&t.tenant).await.unwrap();
    let cancel = CancellationToken::new();
    t.bed
        .engine
        .on_controller_connectivity("odc1", false, &cancel)
        .await
        .unwrap();
    let report = t
        .bed
        .engine
        .on_controller_connectivity("odc1", true, &cancel)
        .await
        .unwrap();
    assert_eq!(
        report.updates[0].notification,
        Notification::PortFaultResetFromUnknown
    );
    assert_eq!(t.mask(&t.a), FaultFlags::PORT_UP);
    assert_eq!(t.bed.store.link(&t.link).unwrap().health, HealthState::Up);
    let span = t.bed.store.tenant_ctrlr(&t.span_a).unwrap();
    assert!(!span.disconnected);
    assert_eq!(span.health, HealthState::Up);
    assert_eq!(t.bed.store.tenant(&t.tenant).unwrap().health, HealthState::Up);
}

#[tokio::test]
async fn test_boundary_disconnect_clears_derived_fault() {
    let t = boundary();
    t.disable_a();
    t.bed.engine.on_commit(&t.tenant).await.unwrap();
    // the unbound peer of a disabled end is faulty
    assert_eq!(t.mask(&t.a), FaultFlags::ADMIN_DISABLE);
    assert_eq!(t.mask(&t.b), FaultFlags::PORT_FAULT);
    assert!(t.bed.alarms.is_raised(&t.span_a));
    assert!(t.bed.alarms.is_raised(&t.span_b));
    assert_eq!(t.bed.store.tenant(&t.tenant).unwrap().down_count, 2);

    let cancel = CancellationToken::new();
    t.bed
        .engine
        .on_controller_connectivity("odc1", false, &cancel)
        .await
        .unwrap();
    assert_eq!(t.mask(&t.a), FaultFlags::ADMIN_DISABLE | FaultFlags::PORT_UNKNOWN);
    assert_eq!(t.mask(&t.b), FaultFlags::PORT_UP);
    assert!(!t.bed.alarms.is_raised(&t.span_b));
    assert_eq!(t.bed.store.tenant_ctrlr(&t.span_b).unwrap().health, HealthState::Up);
}

#[tokio::test]
async fn test_named_boundary_keeps_derived_fault() {
    let t = boundary();
    t.bed.topology().name_boundary(&t.link, "bdry1");
    t.disable_a();
    t.bed.engine.on_commit(&t.tenant).await.unwrap();
    assert_eq!(t.mask(&t.b), FaultFlags::PORT_FAULT);

    let cancel = CancellationToken::new();
    t.bed
        .engine
        .on_controller_connectivity("odc1", false, &cancel)
        .await
        .unwrap();
    assert_eq!(t.mask(&t.b), FaultFlags::PORT_FAULT);
    assert!(t.bed.alarms.is_raised(&t.span_b));
}

#[tokio::test]
#[traced_test]
async fn test_port_down_reflects_on_peer() {
    let t = linked().await;
    let cancel = CancellationToken::new();
    let report = t
        .bed
        .engine
        .on_physical_port_status(&t.port_a, PortHealth::Down, &cancel)
        .await
        .unwrap();
    assert_eq!(report.updates[0].kind, InterfaceKind::Linked);
    let remote = report.updates[0].remote.as_ref().unwrap();
    assert_eq!(remote.new_mask, FaultFlags::REMOTE_DOWN);
    assert_eq!(remote.notification, Notification::PortFault);

    assert_eq!(t.bed.store.interface(&t.a).unwrap().fault, FaultFlags::PORT_FAULT);
    assert_eq!(t.bed.store.interface(&t.b).unwrap().fault, FaultFlags::REMOTE_DOWN);
    assert_eq!(t.bed.store.link(&t.link).unwrap().fault, FaultFlags::PORT_FAULT);
    let span = t.bed.store.tenant_ctrlr(&t.span).unwrap();
    assert_eq!(span.counters.down, 2);
    assert_eq!(t.bed.alarms.events().len(), 1);

    // nothing new: nothing written
    let writes = t.bed.store.writes();
    let report = t
        .bed
        .engine
        .on_physical_port_status(&t.port_a, PortHealth::Down, &cancel)
        .await
        .unwrap();
    assert_eq!(report.changes().count(), 0);
    assert_eq!(t.bed.store.writes(), writes);

    t.bed
        .engine
        .on_physical_port_status(&t.port_a, PortHealth::Up, &cancel)
        .await
        .unwrap();
    assert_eq!(t.bed.store.interface(&t.a).unwrap().fault, FaultFlags::PORT_UP);
    assert_eq!(t.bed.store.interface(&t.b).unwrap().fault, FaultFlags::PORT_UP);
    assert_eq!(t.bed.store.link(&t.link).unwrap().health, HealthState::Up);
    assert!(!t.bed.alarms.is_raised(&t.span));
    assert_eq!(t.bed.alarms.events().len(), 2);
}

#[tokio::test]
async fn test_path_fault_is_symmetric() {
    let t = linked().await;
    let cancel = CancellationToken::new();
    let span = SpanKey::new("odc1", "dom1");
    let report = t
        .bed
        .engine
        .on_path_fault(&span, true, &cancel)
        .await
        .unwrap();
    assert_eq!(report.updates.len(), 2);
    assert!(
        report
            .updates
            .iter()
            .all(|u| u.notification == Notification::PathFault)
    );
    let both = FaultFlags::PATH_FAULT | FaultFlags::REMOTE_PATH_FAULT;
    assert_eq!(t.bed.store.interface(&t.a).unwrap().fault, both);
    assert_eq!(t.bed.store.interface(&t.b).unwrap().fault, both);
    assert_eq!(t.bed.store.link(&t.link).unwrap().fault, FaultFlags::PATH_FAULT);
    assert!(t.bed.alarms.is_raised(&t.span));

    t.bed
        .engine
        .on_path_fault(&span, false, &cancel)
        .await
        .unwrap();
    assert_eq!(t.bed.store.interface(&t.a).unwrap().fault, FaultFlags::PORT_UP);
    assert_eq!(t.bed.store.interface(&t.b).unwrap().fault, FaultFlags::PORT_UP);
    assert_eq!(t.bed.store.link(&t.link).unwrap().fault, FaultFlags::PORT_UP);
    assert!(!t.bed.alarms.is_raised(&t.span));
}

#[tokio::test]
async fn test_vtn_exhaustion_marks_far_end() {
    let t = boundary();
    t.bed.engine.on_commit(&t.tenant).await.unwrap();
    let span = SpanKey::new("odc1", "dom1");

    let report = t
        .bed
        .engine
        .on_vtn_exhaustion(&t.tenant, &span, true)
        .await
        .unwrap();
    assert_eq!(report.updates.len(), 1);
    let update = &report.updates[0];
    assert_eq!(update.key, t.a);
    assert!(!update.changed());
    let remote = update.remote.as_ref().unwrap();
    assert_eq!(remote.key, t.b);
    assert_eq!(remote.new_mask, FaultFlags::REMOTE_VTN_EXHAUSTION);
    assert_eq!(remote.notification, Notification::VtnExhaustion);
    assert_eq!(t.mask(&t.a), FaultFlags::PORT_UP);
    assert_eq!(t.bed.store.interface(&t.b).unwrap().health, HealthState::Down);
    assert!(t.bed.alarms.is_raised(&t.span_b));

    // a later commit of the far end keeps the condition
    t.bed.engine.on_commit(&t.tenant).await.unwrap();
    assert_eq!(t.mask(&t.b), FaultFlags::REMOTE_VTN_EXHAUSTION);

    let report = t
        .bed
        .engine
        .on_vtn_exhaustion(&t.tenant, &span, false)
        .await
        .unwrap();
    let remote = report.updates[0].remote.as_ref().unwrap();
    assert_eq!(remote.notification, Notification::VtnExhaustionReset);
    assert_eq!(t.mask(&t.b), FaultFlags::PORT_UP);
    assert!(!t.bed.alarms.is_raised(&t.span_b));
}

#[tokio::test]
async fn test_open_link_updates_local_end_only() {
    let bed = TestBed::new();
    let topo = bed.topology();
    let tenant = topo.tenant("vtn1");
    let span = topo.span("vtn1", "odc1", "dom1");
    let node = topo.node(&span, "vbr1", NodeKind::Bridge);
    let port = PortKey::new("odc1", "dom1", "PP-OF:00:00:00:00:00:00:00:01-s1-eth3");
    let (link, iface) = topo.open_link("vlk9", &node, "if1", Some(&port));
    bed.engine.on_commit(&tenant).await.unwrap();
    assert_eq!(bed.store.link(&link).unwrap().health, HealthState::Up);

    let cancel = CancellationToken::new();
    let report = bed
        .engine
        .on_physical_port_status(&port, PortHealth::Down, &cancel)
        .await
        .unwrap();
    assert_eq!(report.updates[0].remote, None);
    assert_eq!(bed.store.interface(&iface).unwrap().fault, FaultFlags::PORT_FAULT);
    assert_eq!(bed.store.link(&link).unwrap().fault, FaultFlags::PORT_FAULT);
}

#[tokio::test]
#[traced_test]
async fn test_interface_removal_releases_peer() {
    let t = linked().await;
    let cancel = CancellationToken::new();
    t.bed
        .engine
        .on_physical_port_status(&t.port_a, PortHealth::Down, &cancel)
        .await
        .unwrap();
    assert!(t.bed.alarms.is_raised(&t.span));

    let removed = t.bed.store.remove_interface(&t.a).unwrap();
    let remote = t
        .bed
        .engine
        .on_interface_removed(&removed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote.key, t.b);
    assert_eq!(remote.old_mask, FaultFlags::REMOTE_DOWN);
    assert_eq!(remote.new_mask, FaultFlags::PORT_UP);
    assert_eq!(remote.notification, Notification::PortFaultReset);

    let span = t.bed.store.tenant_ctrlr(&t.span).unwrap();
    assert_eq!(span.counters.down, 0);
    assert_eq!(span.health, HealthState::Up);
    assert!(!t.bed.alarms.is_raised(&t.span));
}
