// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use vtnmgr_engine as engine;

use engine::{DriverResult, PortHealth, Signal};
use model::keys::{IfKey, NodeKey, PortKey, TenantCtrlrKey, TenantKey};
use model::records::NodeKind;
use model::{FaultFlags, HealthState, InterfaceKind, Notification};
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_utils::TestBed;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

/// A tenant with one bridge and one interface mapped to a port
struct Mapped {
    bed: TestBed,
    tenant: TenantKey,
    span: TenantCtrlrKey,
    node: NodeKey,
    iface: IfKey,
    port: PortKey,
}

fn mapped() -> Mapped {
    let bed = TestBed::new();
    let (tenant, span, node, iface, port) = {
        let topo = bed.topology();
        let tenant = topo.tenant("vtn1");
        let span = topo.span("vtn1", "odc1", "dom1");
        let node = topo.node(&span, "vbr1", NodeKind::Bridge);
        let port = PortKey::new("odc1", "dom1", "PP-OF:00:00:00:00:00:00:00:01-s1-eth1");
        let iface = topo.mapped(&node, "if1", &port);
        (tenant, span, node, iface, port)
    };
    Mapped {
        bed,
        tenant,
        span,
        node,
        iface,
        port,
    }
}

async fn settled() -> Mapped {
    let t = mapped();
    t.bed.engine.on_commit(&t.tenant).await.unwrap();
    t
}

#[tokio::test]
#[traced_test]
async fn test_commit_settles_tenant() {
    let t = mapped();
    assert_eq!(
        t.bed.store.tenant(&t.tenant).unwrap().health,
        HealthState::Uninitialized
    );

    let report = t.bed.engine.on_commit(&t.tenant).await.unwrap();
    assert_eq!(report.tenants, 1);
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].kind, InterfaceKind::Mapped);
    assert_eq!(report.updates[0].new_health, HealthState::Up);
    assert!(report.alarms.is_empty());
    assert_eq!(t.bed.controllers.port_queries(), 1);

    let iface = t.bed.store.interface(&t.iface).unwrap();
    assert_eq!(iface.fault, FaultFlags::PORT_UP);
    assert_eq!(iface.health, HealthState::Up);
    assert_eq!(t.bed.store.node(&t.node).unwrap().health, HealthState::Up);
    let span = t.bed.store.tenant_ctrlr(&t.span).unwrap();
    assert_eq!(span.health, HealthState::Up);
    assert!(!span.alarm_raised);
    let tenant = t.bed.store.tenant(&t.tenant).unwrap();
    assert_eq!(tenant.health, HealthState::Up);
    assert_eq!(tenant.down_count, 0);
}

#[tokio::test]
async fn test_commit_is_idempotent() {
    let t = settled().await;
    let writes = t.bed.store.writes();
    let report = t.bed.engine.on_commit(&t.tenant).await.unwrap();
    assert_eq!(report.changes().count(), 0);
    assert_eq!(t.bed.store.writes(), writes);
    assert!(t.bed.alarms.events().is_empty());
}

#[tokio::test]
async fn test_commit_with_port_down() {
    let t = mapped();
    t.bed.controllers.set_port(&t.port, PortHealth::Down);
    let report = t.bed.engine.on_commit(&t.tenant).await.unwrap();

    assert_eq!(report.updates[0].new_mask, FaultFlags::PORT_FAULT);
    assert_eq!(report.alarms.len(), 1);
    assert!(report.alarms[0].raised);
    assert_eq!(report.alarms[0].node, None);
    assert!(t.bed.alarms.is_raised(&t.span));
    let tenant = t.bed.store.tenant(&t.tenant).unwrap();
    assert_eq!(tenant.health, HealthState::Down);
    assert_eq!(tenant.down_count, 1);
}

#[tokio::test]
#[traced_test]
async fn test_port_down_raises_alarm() {
    let t = settled().await;
    let cancel = CancellationToken::new();
    let report = t
        .bed
        .engine
        .on_physical_port_status(&t.port, PortHealth::Down, &cancel)
        .await
        .unwrap();

    assert_eq!(report.tenants, 1);
    let update = &report.updates[0];
    assert_eq!(update.key, t.iface);
    assert_eq!(update.old_mask, FaultFlags::PORT_UP);
    assert_eq!(update.new_mask, FaultFlags::PORT_FAULT);
    assert_eq!(update.notification, Notification::PortFault);
    assert!(update.propagated);

    let node = t.bed.store.node(&t.node).unwrap();
    assert_eq!(node.counters.down, 1);
    assert_eq!(node.health, HealthState::Down);
    let tenant = t.bed.store.tenant(&t.tenant).unwrap();
    assert_eq!(tenant.down_count, 1);
    assert_eq!(tenant.health, HealthState::Down);

    assert_eq!(report.alarms.len(), 1);
    let alarm = &report.alarms[0];
    assert!(alarm.raised);
    assert_eq!(alarm.key, t.span);
    assert_eq!(alarm.node.as_deref(), Some("vbr1"));
    assert_eq!(alarm.iface.as_deref(), Some("if1"));
    assert_eq!(t.bed.alarms.events(), report.alarms);
    assert!(t.bed.store.tenant_ctrlr(&t.span).unwrap().alarm_raised);
}

#[tokio::test]
async fn test_port_up_clears_alarm() {
    let t = settled().await;
    let cancel = CancellationToken::new();
    t.bed
        .engine
        .on_physical_port_status(&t.port, PortHealth::Down, &cancel)
        .await
        .unwrap();
    let report = t
        .bed
        .engine
        .on_physical_port_status(&t.port, PortHealth::Up, &cancel)
        .await
        .unwrap();

    let update = &report.updates[0];
    assert_eq!(update.new_mask, FaultFlags::PORT_UP);
    assert_eq!(update.notification, Notification::PortFaultReset);
    let node = t.bed.store.node(&t.node).unwrap();
    assert_eq!(node.counters.down, 0);
    assert_eq!(node.health, HealthState::Up);
    let tenant = t.bed.store.tenant(&t.tenant).unwrap();
    assert_eq!(tenant.down_count, 0);
    assert_eq!(tenant.health, HealthState::Up);

    let events = t.bed.alarms.events_for(&t.span);
    assert_eq!(events.len(), 2);
    assert!(!events[1].raised);
    assert!(!t.bed.alarms.is_raised(&t.span));
}

#[tokio::test]
async fn test_repeated_port_down_raises_once() {
    let t = settled().await;
    let cancel = CancellationToken::new();
    for _ in 0..3 {
        t.bed
            .engine
            .on_physical_port_status(&t.port, PortHealth::Down, &cancel)
            .await
            .unwrap();
    }
    assert_eq!(t.bed.alarms.events().len(), 1);
    assert_eq!(t.bed.store.node(&t.node).unwrap().counters.down, 1);
}

#[tokio::test]
async fn test_second_interface_down_keeps_alarm() {
    let t = mapped();
    let port2 = PortKey::new("odc1", "dom1", "PP-OF:00:00:00:00:00:00:00:01-s1-eth2");
    t.bed.topology().mapped(&t.node, "if2", &port2);
    t.bed.engine.on_commit(&t.tenant).await.unwrap();

    let cancel = CancellationToken::new();
    for port in [&t.port, &port2] {
        t.bed
            .engine
            .on_physical_port_status(port, PortHealth::Down, &cancel)
            .await
            .unwrap();
    }
    // one node down, whatever the number of its interfaces down
    assert_eq!(t.bed.store.node(&t.node).unwrap().counters.down, 2);
    assert_eq!(t.bed.store.tenant(&t.tenant).unwrap().down_count, 1);
    assert_eq!(t.bed.alarms.events().len(), 1);

    t.bed
        .engine
        .on_physical_port_status(&t.port, PortHealth::Up, &cancel)
        .await
        .unwrap();
    assert!(t.bed.alarms.is_raised(&t.span));
    t.bed
        .engine
        .on_physical_port_status(&port2, PortHealth::Up, &cancel)
        .await
        .unwrap();
    assert!(!t.bed.alarms.is_raised(&t.span));
    assert_eq!(t.bed.store.tenant(&t.tenant).unwrap().health, HealthState::Up);
}

#[tokio::test]
async fn test_unknown_port_does_not_raise_alarm() {
    let t = settled().await;
    let cancel = CancellationToken::new();
    let report = t
        .bed
        .engine
        .on_physical_port_status(&t.port, PortHealth::Unknown, &cancel)
        .await
        .unwrap();
    assert_eq!(report.updates[0].new_mask, FaultFlags::PORT_UNKNOWN);
    assert_eq!(report.updates[0].notification, Notification::PortUnknown);
    assert!(report.alarms.is_empty());
    let tenant = t.bed.store.tenant(&t.tenant).unwrap();
    assert_eq!(tenant.health, HealthState::Unknown);
    assert_eq!(tenant.down_count, 0);
}

#[tokio::test]
async fn test_admin_disabled_interface() {
    let t = mapped();
    let record = t.bed.store.interface(&t.iface).unwrap();
    t.bed.topology().iface(record.set_admin_enabled(false));
    t.bed.engine.on_commit(&t.tenant).await.unwrap();
    assert_eq!(
        t.bed.store.interface(&t.iface).unwrap().fault,
        FaultFlags::ADMIN_DISABLE
    );

    // the port coming back does not bring the interface up
    let cancel = CancellationToken::new();
    let report = t
        .bed
        .engine
        .on_physical_port_status(&t.port, PortHealth::Up, &cancel)
        .await
        .unwrap();
    assert_eq!(report.changes().count(), 0);
    assert_eq!(t.bed.store.node(&t.node).unwrap().health, HealthState::Down);
}

#[tokio::test]
async fn test_unbound_interface_is_down() {
    let bed = TestBed::new();
    let topo = bed.topology();
    let tenant = topo.tenant("vtn1");
    let span = topo.span("vtn1", "odc1", "dom1");
    let node = topo.node(&span, "vbr1", NodeKind::Bridge);
    let iface = topo.unbound(&node, "if1");

    let report = bed.engine.on_commit(&tenant).await.unwrap();
    assert_eq!(report.updates[0].kind, InterfaceKind::Unbound);
    assert_eq!(bed.store.interface(&iface).unwrap().fault, FaultFlags::PORT_FAULT);
    assert_eq!(bed.store.node(&node).unwrap().health, HealthState::Down);
    assert!(bed.alarms.is_raised(&span));
}

#[tokio::test]
async fn test_controller_down_at_commit() {
    let t = mapped();
    t.bed.controllers.set_controller("odc1", PortHealth::Down);
    t.bed.engine.on_commit(&t.tenant).await.unwrap();

    // ports of a controller which is not up are not queried
    assert_eq!(t.bed.controllers.port_queries(), 0);
    let iface = t.bed.store.interface(&t.iface).unwrap();
    assert_eq!(iface.fault, FaultFlags::PORT_UNKNOWN);
    assert_eq!(iface.health, HealthState::Unknown);
    assert_eq!(t.bed.store.tenant(&t.tenant).unwrap().health, HealthState::Unknown);
    assert!(t.bed.alarms.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout_is_unknown() {
    let t = mapped();
    t.bed
        .controllers
        .delay_port(&t.port, TestBed::QUERY_TIMEOUT + Duration::from_secs(1));
    t.bed.engine.on_commit(&t.tenant).await.unwrap();

    assert_eq!(
        t.bed.store.interface(&t.iface).unwrap().health,
        HealthState::Unknown
    );
    assert_eq!(t.bed.store.node(&t.node).unwrap().health, HealthState::Unknown);
}

#[tokio::test]
async fn test_update_with_disconnected_driver() {
    let t = settled().await;
    let update = t
        .bed
        .engine
        .update_interface(&t.iface, Signal::Commit, DriverResult::ControllerDisconnected)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.new_mask, FaultFlags::PORT_UNKNOWN);
    assert_eq!(update.notification, Notification::PortUnknown);
    assert_eq!(t.bed.controllers.port_queries(), 1);

    let span = t.bed.store.tenant_ctrlr(&t.span).unwrap();
    assert_eq!(span.counters.unknown, 1);
    assert_eq!(span.health, HealthState::Unknown);
}

#[tokio::test]
async fn test_update_missing_interface() {
    let t = settled().await;
    let missing = IfKey::new("vtn1", "vbr1", "if9");
    let update = t
        .bed
        .engine
        .update_interface(&missing, Signal::Commit, DriverResult::Success)
        .await
        .unwrap();
    assert_eq!(update, None);
}

#[tokio::test]
async fn test_converted_interface_follows_gateway_port() {
    let bed = TestBed::new();
    let topo = bed.topology();
    let tenant = topo.tenant("vtn1");
    let span = topo.span("vtn1", "odc1", "dom1");
    let node = topo.node(&span, "vbr1", NodeKind::Bridge);
    let iface = topo.converted(&node, "if1", false);
    topo.gateway_port(&span, HealthState::Down);

    let report = bed.engine.on_commit(&tenant).await.unwrap();
    assert_eq!(report.updates[0].kind, InterfaceKind::Converted);
    assert!(report.updates[0].propagated);
    assert_eq!(bed.store.interface(&iface).unwrap().fault, FaultFlags::PORT_FAULT);
    assert_eq!(bed.store.node(&node).unwrap().health, HealthState::Down);

    topo.gateway_port(&span, HealthState::Up);
    bed.engine.on_commit(&tenant).await.unwrap();
    assert_eq!(bed.store.interface(&iface).unwrap().fault, FaultFlags::PORT_UP);
    assert_eq!(bed.store.node(&node).unwrap().health, HealthState::Up);
    assert!(!bed.alarms.is_raised(&span));
}

#[tokio::test]
async fn test_unified_forward_interface_not_propagated() {
    let bed = TestBed::new();
    let topo = bed.topology();
    let tenant = topo.tenant("vtn1");
    let span = topo.span("vtn1", "odc1", "dom1");
    let node = topo.node(&span, "vbr1", NodeKind::Bridge);
    // no gateway port at all
    let iface = topo.converted(&node, "if1", true);

    let report = bed.engine.on_commit(&tenant).await.unwrap();
    assert!(!report.updates[0].propagated);
    assert_eq!(bed.store.interface(&iface).unwrap().health, HealthState::Down);
    let node = bed.store.node(&node).unwrap();
    assert_eq!(node.counters.down, 0);
    assert_eq!(node.health, HealthState::Up);
    assert!(bed.alarms.events().is_empty());
}

#[tokio::test]
async fn test_port_map_interfaces_are_mapped() {
    let bed = TestBed::new();
    let topo = bed.topology();
    let tenant = topo.tenant("vtn1");
    let span = topo.span("vtn1", "odc1", "dom1");
    let node = topo.node(&span, "pmap1", NodeKind::PortMap);
    let port = PortKey::new("odc1", "dom1", "PP-OF:00:00:00:00:00:00:00:02-s2-eth1");
    let iface = topo.mapped(&node, "if1", &port);
    bed.controllers.set_port(&port, PortHealth::Down);

    let report = bed.engine.on_commit(&tenant).await.unwrap();
    assert_eq!(report.updates[0].kind, InterfaceKind::Mapped);
    assert_eq!(bed.store.interface(&iface).unwrap().fault, FaultFlags::PORT_FAULT);
}
