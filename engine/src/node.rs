// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Node aggregator.
//!
//! The counters of a node are recounted from the stored health of its interfaces every time
//! one of them is updated. A transaction interrupted between the write of an interface and
//! the write of its node is thus repaired by the next update of any interface of the node.

use model::HealthState;
use model::keys::{IfKey, NodeKey};
use model::records::{HealthCounters, InterfaceRecord, VirtualNodeRecord};
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, trace};

use crate::errors::{EngineError, EngineResult, StoreContext};
use crate::gateway::{Match, Projection};
use crate::pass::{Origin, Pass, is_sane};
use crate::updater::counts_in_node;

trace_target!("node-aggregator", LevelFilter::INFO, &["status", "aggregation"]);

impl Pass<'_> {
    /// Count the unhealthy interfaces of a node, leaving out `without`
    pub(crate) async fn node_counters(
        &self,
        key: &NodeKey,
        without: Option<&IfKey>,
    ) -> EngineResult<HealthCounters> {
        let mut counters = HealthCounters::default();
        for ifkey in self.store.interfaces_of_node(key).await.at(key)? {
            if without == Some(&ifkey) {
                continue;
            }
            let Some(iface) = self
                .store
                .read_interface(&ifkey, Projection::Flags)
                .await
                .at(&ifkey)?
            else {
                continue;
            };
            if counts_in_node(&iface) && is_sane(&ifkey, iface.fault, iface.health) {
                counters.apply(HealthState::Uninitialized, iface.health);
            }
        }
        Ok(counters)
    }

    /// Recount the node of `iface` after an update of the interface, or after its removal,
    /// and hand the result to the tenant-controller record of the node.
    /// Returns true if the health of the node changed.
    pub(crate) async fn aggregate_node(
        &mut self,
        iface: &InterfaceRecord,
        removed: bool,
    ) -> EngineResult<bool> {
        let key = iface.key.node_key();
        let mut node = match self.store.read_node(&key).await.at(&key)? {
            Some(node) => node,
            None if self.settling() => {
                debug!("Creating the status record of node {key}");
                VirtualNodeRecord::new(key.clone(), iface.node_kind, iface.span.clone())
            }
            None => return Err(EngineError::NoSuchInstance(key.to_string())),
        };

        let prior = node.clone();
        let without = removed.then_some(&iface.key);
        node.counters = self.node_counters(&key, without).await?;
        // an unsettled node is left to the settle pass unless its interfaces changed
        if self.settling() || node.counters != prior.counters || !node.health.is_uninitialized() {
            node.health = node.counters.health();
        }
        if node != prior {
            node.revision = self
                .store
                .write_node(&node, Match::read_at(node.revision))
                .await
                .writing(&key, &format!("{} -> {}", prior.health, node.health))?;
            trace!(
                "Node {key}: {} unhealthy ({} unknown) after {}",
                node.counters.unhealthy(),
                node.counters.unknown,
                iface.key
            );
        }

        let flipped = prior.health != node.health;
        if flipped {
            debug!("Node {key}: {} -> {}", prior.health, node.health);
        }
        self.aggregate_span(&node, &Origin::iface(&iface.key)).await?;
        Ok(flipped)
    }
}
