// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface status updater: computes the new fault mask of an interface from a signal,
//! stores it and hands the health transition to the node aggregator.

use model::keys::IfKey;
use model::records::{InterfaceFlags, InterfaceRecord};
use model::{
    FaultDelta, FaultFlags, HealthState, InterfaceKind, Notification, classify, decode,
    derive_notification, encode,
};
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, trace, warn};

use crate::counters;
use crate::errors::{EngineResult, StoreContext};
use crate::gateway::{Match, PortHealth, Projection};
use crate::link::{LinkOutcome, RemoteUpdate};
use crate::pass::{Pass, is_sane, transition};

trace_target!("status-updater", LevelFilter::INFO, &["status"]);

/// What an interface is being updated for
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Signal {
    /// Recompute from the current state, e.g. after a configuration commit
    Commit,
    /// The state of the bound port was reported
    PortStatus,
    ControllerUp,
    ControllerDown,
    PathFault { asserted: bool },
    VtnExhaustion { asserted: bool },
}

impl Signal {
    /// Tell if the signal is about the state of ports, which then has to be sampled
    #[must_use]
    pub fn samples_ports(self) -> bool {
        matches!(
            self,
            Signal::Commit | Signal::PortStatus | Signal::ControllerUp | Signal::ControllerDown
        )
    }
}

/// Outcome reported by the driver that relayed a signal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DriverResult {
    #[default]
    Success,
    /// The controller of the interface could not be reached
    ControllerDisconnected,
}

/// The result of updating one interface
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceUpdate {
    pub key: IfKey,
    pub kind: InterfaceKind,
    pub old_mask: FaultFlags,
    pub new_mask: FaultFlags,
    pub old_health: HealthState,
    pub new_health: HealthState,
    pub notification: Notification,
    /// Whether the transition was handed to the node aggregator
    pub propagated: bool,
    /// The update of the other end of the virtual link, if reconciled
    pub remote: Option<RemoteUpdate>,
}

impl InterfaceUpdate {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.old_mask != self.new_mask || self.old_health != self.new_health
    }
}

/// Tell if the health of an interface counts in its node. Converted interfaces which only
/// forward traffic for a unified bridge do not.
pub(crate) fn counts_in_node(record: &InterfaceRecord) -> bool {
    classify(record) != InterfaceKind::Converted
        || !record.flags.contains(InterfaceFlags::UNIFIED_FORWARD)
}

/// Unbound interfaces have nothing that could make them work. A port-unknown condition is
/// kept while the controller is disconnected.
fn unbound_delta(orig: FaultFlags, disconnected: bool) -> FaultDelta {
    let keep_unknown = disconnected && orig.contains(FaultFlags::PORT_UNKNOWN);
    FaultDelta {
        set: FaultFlags::PORT_FAULT,
        clear: if keep_unknown {
            FaultFlags::empty()
        } else {
            FaultFlags::PORT_UNKNOWN
        },
    }
}

impl Pass<'_> {
    /// Port bits of an interface with a port binding
    fn port_delta(
        &self,
        record: &InterfaceRecord,
        signal: Signal,
        disconnected: bool,
    ) -> FaultDelta {
        if !signal.samples_ports() {
            return FaultDelta::NONE;
        }
        let Some(binding) = &record.binding else {
            return FaultDelta::NONE;
        };
        if disconnected {
            PortHealth::Unknown.port_delta()
        } else {
            self.samples.get(&binding.port).port_delta()
        }
    }

    /// Own bits of the end of a virtual link. Bits reflecting the peer are left to the link
    /// reconciler.
    fn link_end_delta(
        &self,
        record: &InterfaceRecord,
        signal: Signal,
        disconnected: bool,
    ) -> FaultDelta {
        let port = if record.binding.is_some() {
            self.port_delta(record, signal, disconnected)
        } else if signal.samples_ports() {
            FaultDelta::toggle(FaultFlags::PORT_UNKNOWN, disconnected)
        } else {
            FaultDelta::NONE
        };
        match signal {
            Signal::PathFault { asserted } => {
                port.then(FaultDelta::toggle(FaultFlags::PATH_FAULT, asserted))
            }
            _ => port,
        }
    }

    /// Port bits of a converted interface, from the gateway port of its tenant and span
    async fn gateway_port_delta(
        &self,
        record: &InterfaceRecord,
        signal: Signal,
        disconnected: bool,
    ) -> EngineResult<FaultDelta> {
        if !signal.samples_ports() {
            return Ok(FaultDelta::NONE);
        }
        if disconnected {
            return Ok(PortHealth::Unknown.port_delta());
        }
        let key = record.tenant_ctrlr_key();
        let health = match self.store.read_gateway_port(&key).await.at(&key)? {
            Some(gwport) => PortHealth::from(gwport.health),
            None => {
                debug!("No gateway port for {key}: {} is down", record.key);
                PortHealth::Down
            }
        };
        Ok(health.port_delta())
    }

    /// Update the status of an interface.
    ///
    /// Returns `None` if the interface does not exist or is skipped because its stored
    /// state is inconsistent.
    pub(crate) async fn update_interface(
        &mut self,
        key: &IfKey,
        signal: Signal,
        driver: DriverResult,
    ) -> EngineResult<Option<InterfaceUpdate>> {
        let Some(mut record) = self
            .store
            .read_interface(key, Projection::Full)
            .await
            .at(key)?
        else {
            debug!("Interface {key} is gone: nothing to update");
            return Ok(None);
        };
        if !is_sane(key, record.fault, record.health) {
            return Ok(None);
        }

        let kind = classify(&record);
        let disconnected =
            signal == Signal::ControllerDown || driver == DriverResult::ControllerDisconnected;
        let orig = record.fault;
        let admin = FaultDelta::toggle(FaultFlags::ADMIN_DISABLE, !record.admin_enabled);
        trace!("Updating {kind} interface {key} on {signal} ({driver})");

        let propagated = counts_in_node(&record);
        let mut remote = None;
        let new_mask = match kind {
            InterfaceKind::Mapped => {
                encode(orig, admin.then(self.port_delta(&record, signal, disconnected)))
            }
            InterfaceKind::Converted => {
                let delta = self.gateway_port_delta(&record, signal, disconnected).await?;
                encode(orig, admin.then(delta))
            }
            InterfaceKind::Unbound => encode(orig, admin.then(unbound_delta(orig, disconnected))),
            InterfaceKind::Boundary | InterfaceKind::Linked => {
                let local = encode(
                    orig,
                    admin.then(self.link_end_delta(&record, signal, disconnected)),
                );
                match self.reconcile_link(&record, local, signal).await? {
                    LinkOutcome::Unresolved => encode(orig, admin),
                    LinkOutcome::LocalOnly(mask) => mask,
                    LinkOutcome::Reconciled { local, remote: peer } => {
                        remote = Some(peer);
                        local
                    }
                }
            }
        };

        let old_health = record.health;
        let new_health = decode(new_mask);
        let notification = derive_notification(orig, new_mask);
        counters::notification(notification);

        if new_mask != orig || new_health != old_health {
            let change = transition(orig, new_mask);
            record.fault = new_mask;
            record.health = new_health;
            record.revision = self
                .store
                .write_interface(&record, Match::read_at(record.revision))
                .await
                .writing(key, &change)?;
            debug!("Interface {key}: {change} ({old_health} -> {new_health}, {notification})");
        }

        if propagated {
            self.aggregate_node(&record, false).await?;
        } else {
            debug!("Interface {key} only forwards for a unified bridge: not propagated");
        }

        Ok(Some(InterfaceUpdate {
            key: key.clone(),
            kind,
            old_mask: orig,
            new_mask,
            old_health,
            new_health,
            notification,
            propagated,
            remote,
        }))
    }
}
