// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tenant aggregator.
//!
//! Nodes are counted per tenant-controller record, that is per (controller, domain) span of
//! a tenant. Like nodes, spans are recounted from the stored state of their nodes on every
//! update. The alarm of a span follows the number of nodes which are down: it is raised while
//! at least one is down and cleared otherwise. Alarm events are queued once the span record
//! carrying the new alarm state is stored. The tenant record sums up its spans.

use model::HealthState;
use model::keys::{TenantCtrlrKey, TenantKey};
use model::records::{HealthCounters, TenantControllerRecord, TenantRecord, VirtualNodeRecord};
use std::collections::BTreeSet;
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, info, trace};

use crate::counters;
use crate::errors::{EngineError, EngineResult, StoreContext};
use crate::gateway::{AlarmEvent, Match};
use crate::pass::{Origin, Pass};

trace_target!("tenant-aggregator", LevelFilter::INFO, &["status", "aggregation", "alarm"]);

/// What to do with the alarm of a tenant span
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AlarmDecision {
    None,
    Raise,
    Clear,
}

impl AlarmDecision {
    /// Decision bringing an alarm currently `raised` in line with the count of nodes down
    #[must_use]
    pub fn for_down_count(raised: bool, down: u32) -> Self {
        match (raised, down > 0) {
            (false, true) => AlarmDecision::Raise,
            (true, false) => AlarmDecision::Clear,
            _ => AlarmDecision::None,
        }
    }
}

/// Sum of the settled tenant-controller records of a tenant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TenantTotals {
    down_count: u32,
    health: HealthState,
}

impl Pass<'_> {
    /// Queue the alarm event of a stored decision
    fn queue_alarm(
        &mut self,
        record: &TenantControllerRecord,
        decision: AlarmDecision,
        origin: &Origin,
    ) {
        let raised = match decision {
            AlarmDecision::None => return,
            AlarmDecision::Raise => true,
            AlarmDecision::Clear => false,
        };
        let event = AlarmEvent {
            key: record.key.clone(),
            node: origin.node.clone(),
            iface: origin.iface.clone(),
            raised,
        };
        info!("{event}");
        counters::alarm(raised);
        self.alarms.push(event);
    }

    async fn write_tenant_ctrlr(
        &mut self,
        record: &mut TenantControllerRecord,
        change: &str,
    ) -> EngineResult<()> {
        record.revision = self
            .store
            .write_tenant_ctrlr(record, Match::read_at(record.revision))
            .await
            .writing(&record.key, &change)?;
        Ok(())
    }

    /// Count the unhealthy nodes of a span
    async fn span_counters(&self, key: &TenantCtrlrKey) -> EngineResult<HealthCounters> {
        let mut counters = HealthCounters::default();
        for node_key in self.store.nodes_of_tenant(&key.tenant).await.at(&key.tenant)? {
            let Some(node) = self.store.read_node(&node_key).await.at(&node_key)? else {
                continue;
            };
            if node.span == key.span {
                counters.apply(HealthState::Uninitialized, node.health);
            }
        }
        Ok(counters)
    }

    /// Recount a span from its nodes, bring its alarm in line and store it, then refresh its
    /// tenant. `record` may be uninitialized, in which case it gets settled.
    async fn refresh_span(
        &mut self,
        mut record: TenantControllerRecord,
        origin: &Origin,
    ) -> EngineResult<()> {
        let prior = record.clone();
        record.counters = self.span_counters(&record.key).await?;
        record.health = record.derived_health();
        let decision = AlarmDecision::for_down_count(record.alarm_raised, record.counters.down);
        record.alarm_raised = record.counters.down > 0;
        if record != prior {
            let change = format!("{} -> {}", prior.health, record.health);
            self.write_tenant_ctrlr(&mut record, &change).await?;
            trace!(
                "{}: {} down, {} unknown, {change}",
                record.key, record.counters.down, record.counters.unknown
            );
        }
        self.queue_alarm(&record, decision, origin);
        self.refresh_tenant(&record.key.tenant).await
    }

    /// Account for a change of a node in its tenant-controller record. Nothing is done while
    /// that record has not settled: the settle pass will count the node.
    pub(crate) async fn aggregate_span(
        &mut self,
        node: &VirtualNodeRecord,
        origin: &Origin,
    ) -> EngineResult<()> {
        let key = node.tenant_ctrlr_key();
        let record = match self.store.read_tenant_ctrlr(&key).await.at(&key)? {
            Some(record) => record,
            None if self.settling() => {
                debug!("No status for {key} yet: change of {} deferred", node.key);
                return Ok(());
            }
            None => return Err(EngineError::NoSuchInstance(key.to_string())),
        };
        if record.health.is_uninitialized() {
            trace!("{key} not settled: change of {} deferred", node.key);
            return Ok(());
        }
        self.refresh_span(record, origin).await
    }

    /// Set whether the controller of a span is reachable, then refresh its tenant
    pub(crate) async fn set_disconnected(
        &mut self,
        key: &TenantCtrlrKey,
        disconnected: bool,
    ) -> EngineResult<()> {
        let Some(mut record) = self.store.read_tenant_ctrlr(key).await.at(key)? else {
            debug!("No status for {key}");
            return Ok(());
        };
        if record.disconnected != disconnected {
            let prior = record.health;
            record.disconnected = disconnected;
            if !record.health.is_uninitialized() {
                record.health = record.derived_health();
            }
            let change = format!("disconnected: {disconnected}");
            self.write_tenant_ctrlr(&mut record, &change).await?;
            debug!("{key}: {change}, {prior} -> {}", record.health);
        }
        self.refresh_tenant(&key.tenant).await
    }

    async fn tenant_totals(&self, tenant: &TenantKey) -> EngineResult<TenantTotals> {
        let mut totals = TenantTotals {
            down_count: 0,
            health: HealthState::Up,
        };
        for key in self.store.tenant_controllers(tenant).await.at(tenant)? {
            let Some(record) = self.store.read_tenant_ctrlr(&key).await.at(&key)? else {
                continue;
            };
            if record.health.is_uninitialized() {
                continue;
            }
            totals.down_count = totals.down_count.saturating_add(record.counters.down);
            match record.health {
                HealthState::Unknown => totals.health = HealthState::Unknown,
                HealthState::Down if totals.health == HealthState::Up => {
                    totals.health = HealthState::Down;
                }
                _ => {}
            }
        }
        if totals.down_count > 0 && totals.health == HealthState::Up {
            totals.health = HealthState::Down;
        }
        Ok(totals)
    }

    /// Recompute a settled tenant record from its tenant-controller records
    pub(crate) async fn refresh_tenant(&mut self, tenant: &TenantKey) -> EngineResult<()> {
        let mut record = match self.store.read_tenant(tenant).await.at(tenant)? {
            Some(record) => record,
            None if self.settling() => return Ok(()),
            None => return Err(EngineError::NoSuchInstance(tenant.to_string())),
        };
        if record.health.is_uninitialized() {
            trace!("Tenant {tenant} not settled yet");
            return Ok(());
        }
        let totals = self.tenant_totals(tenant).await?;
        self.store_tenant_totals(&mut record, totals).await
    }

    async fn store_tenant_totals(
        &mut self,
        record: &mut TenantRecord,
        totals: TenantTotals,
    ) -> EngineResult<()> {
        if record.down_count == totals.down_count && record.health == totals.health {
            return Ok(());
        }
        let change = format!("{} -> {}", record.health, totals.health);
        record.down_count = totals.down_count;
        record.health = totals.health;
        record.revision = self
            .store
            .write_tenant(record, Match::read_at(record.revision))
            .await
            .writing(&record.key, &change)?;
        debug!("Tenant {}: {change}, {} down", record.key, record.down_count);
        Ok(())
    }

    /// Settle the state of a tenant once its interfaces have been updated.
    ///
    /// Nodes that were never aggregated take the state of their interfaces. All the
    /// tenant-controller records are then recounted from their nodes, the uninitialized ones
    /// included, and raise their alarm if any of those is down. Finally the tenant record is
    /// computed from its spans.
    pub(crate) async fn settle_tenant(&mut self, tenant: &TenantKey) -> EngineResult<()> {
        let Some(mut record) = self.store.read_tenant(tenant).await.at(tenant)? else {
            debug!("Tenant {tenant} is gone: nothing to settle");
            return Ok(());
        };

        // nodes
        let mut spans: BTreeSet<TenantCtrlrKey> = self
            .store
            .tenant_controllers(tenant)
            .await
            .at(tenant)?
            .into_iter()
            .collect();
        for key in self.store.nodes_of_tenant(tenant).await.at(tenant)? {
            let Some(mut node) = self.store.read_node(&key).await.at(&key)? else {
                continue;
            };
            if node.health.is_uninitialized() {
                node.counters = self.node_counters(&key, None).await?;
                node.health = node.counters.health();
                node.revision = self
                    .store
                    .write_node(&node, Match::read_at(node.revision))
                    .await
                    .writing(&key, &format!("uninitialized -> {}", node.health))?;
                debug!("Node {key} settled: {}", node.health);
            }
            spans.insert(node.tenant_ctrlr_key());
        }

        // spans
        for key in spans {
            let span = match self.store.read_tenant_ctrlr(&key).await.at(&key)? {
                Some(span) => span,
                None => TenantControllerRecord::new(key.clone()),
            };
            let fresh = span.health.is_uninitialized();
            self.refresh_span(span, &Origin::default()).await?;
            if fresh {
                debug!("{key} settled");
            }
        }

        // tenant
        let totals = self.tenant_totals(tenant).await?;
        if record.health.is_uninitialized() {
            info!("Tenant {tenant} settled: {}", totals.health);
        }
        self.store_tenant_totals(&mut record, totals).await
    }
}
