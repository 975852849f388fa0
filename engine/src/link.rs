// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link reconciler.
//!
//! The two ends of a virtual link reflect each other's state. What crosses the link is the
//! *own* state of each end: its mask without the bits that were themselves derived from the
//! peer, so that a fault never echoes back to the side it came from. Reconciliation is level
//! triggered, which makes it idempotent: running it again with the same inputs writes nothing.

use model::keys::IfKey;
use model::records::{InterfaceRecord, LinkEnd, VirtualLinkRecord};
use model::{FaultFlags, Notification, decode, derive_notification};
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, warn};

use crate::errors::{EngineResult, StoreContext};
use crate::gateway::{Match, PortHealth, Projection};
use crate::pass::{Pass, is_sane, transition};
use crate::updater::Signal;

trace_target!("link-reconciler", LevelFilter::INFO, &["status", "link"]);

/// The change applied to the far end of a link
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteUpdate {
    pub key: IfKey,
    pub old_mask: FaultFlags,
    pub new_mask: FaultFlags,
    pub notification: Notification,
}

/// What the reconciliation decided for the local end
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum LinkOutcome {
    /// The link or its far end could not be found
    Unresolved,
    /// The far end is not tracked: only the local end is updated
    LocalOnly(FaultFlags),
    Reconciled {
        local: FaultFlags,
        remote: RemoteUpdate,
    },
}

/// The state of one end of a link, as seen from the other end
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PeerView {
    pub(crate) state: PortHealth,
    pub(crate) path_fault: bool,
}

impl PeerView {
    /// A peer that went away
    pub(crate) const ABSENT: PeerView = PeerView {
        state: PortHealth::Unknown,
        path_fault: false,
    };

    /// Own state of an end. Without a port binding, a `PORT_FAULT` on an end can only come
    /// from its peer and is not part of its own state. Path faults travel separately.
    pub(crate) fn of(mask: FaultFlags, bound: bool) -> Self {
        let own = if bound {
            FaultFlags::ADMIN_DISABLE | FaultFlags::PORT_FAULT
        } else {
            FaultFlags::ADMIN_DISABLE
        };
        let state = if mask.contains(FaultFlags::PORT_UNKNOWN) {
            PortHealth::Unknown
        } else if mask.intersects(own) {
            PortHealth::Down
        } else {
            PortHealth::Up
        };
        Self {
            state,
            path_fault: mask.contains(FaultFlags::PATH_FAULT),
        }
    }
}

/// Reflect the state of the peer into the mask of an end.
///
/// A peer that is down sets `REMOTE_DOWN` on an end with a port binding and `PORT_FAULT` on
/// one without. A peer in an unknown state does not count as down, except across a named
/// boundary which stays faulty for an unbound end.
pub(crate) fn reflect(
    mask: FaultFlags,
    peer: PeerView,
    bound: bool,
    named_boundary: bool,
) -> FaultFlags {
    let mut mask = mask;
    match peer.state {
        PortHealth::Down => {
            if bound {
                mask.insert(FaultFlags::REMOTE_DOWN);
            } else {
                mask.insert(FaultFlags::PORT_FAULT);
            }
        }
        PortHealth::Up => {
            mask.remove(FaultFlags::REMOTE_DOWN);
            if !bound {
                mask.remove(FaultFlags::PORT_FAULT);
            }
        }
        PortHealth::Unknown => {
            mask.remove(FaultFlags::REMOTE_DOWN);
            if !bound && !named_boundary {
                mask.remove(FaultFlags::PORT_FAULT);
            }
        }
    }
    mask.with(
        FaultFlags::REMOTE_PATH_FAULT,
        peer.path_fault && peer.state != PortHealth::Unknown,
    )
}

/// Fault mask of a link from the masks (and own states) of its tracked ends
pub(crate) fn link_mask(ends: &[(PeerView, FaultFlags)]) -> FaultFlags {
    let mut mask = FaultFlags::PORT_UP;
    for (view, end) in ends {
        match view.state {
            PortHealth::Unknown => mask |= FaultFlags::PORT_UNKNOWN,
            PortHealth::Down => mask |= FaultFlags::PORT_FAULT,
            PortHealth::Up => {}
        }
        if view.path_fault {
            mask |= FaultFlags::PATH_FAULT;
        }
        mask |= *end & FaultFlags::REMOTE_VTN_EXHAUSTION;
    }
    mask
}

impl Pass<'_> {
    /// Store a new mask for a link if it differs from the stored one
    async fn store_link_mask(
        &mut self,
        link: &mut VirtualLinkRecord,
        mask: FaultFlags,
    ) -> EngineResult<()> {
        let health = decode(mask);
        if link.fault == mask && link.health == health {
            return Ok(());
        }
        let change = transition(link.fault, mask);
        link.fault = mask;
        link.health = health;
        link.revision = self
            .store
            .write_link(link, Match::read_at(link.revision))
            .await
            .writing(&link.key, &change)?;
        debug!("Link {}: {change}", link.key);
        Ok(())
    }

    /// Reconcile the link of `local`, whose mask is about to become `local_mask`.
    ///
    /// The far end is stored, and aggregated, by this function. The local end is left to the
    /// caller, which gets its final mask in the outcome.
    pub(crate) async fn reconcile_link(
        &mut self,
        local: &InterfaceRecord,
        local_mask: FaultFlags,
        signal: Signal,
    ) -> EngineResult<LinkOutcome> {
        let Some(link_key) = &local.vlink else {
            debug!("Interface {} has no link", local.key);
            return Ok(LinkOutcome::Unresolved);
        };
        let Some(mut link) = self.store.read_link(link_key).await.at(link_key)? else {
            debug!("Link {link_key} of {} is gone", local.key);
            return Ok(LinkOutcome::Unresolved);
        };
        if !is_sane(&link.key, link.fault, link.health) {
            return Ok(LinkOutcome::Unresolved);
        }
        let named = link.boundary_name.is_some();
        let local_bound = local.binding.is_some();

        let remote_key = match link.peer_of(&local.key).cloned() {
            None => {
                warn!("Interface {} is not an end of link {link_key}", local.key);
                return Ok(LinkOutcome::Unresolved);
            }
            Some(LinkEnd::UnknownPeer) => {
                debug!("Link {link_key} has no tracked peer for {}", local.key);
                let mask = link_mask(&[(PeerView::of(local_mask, local_bound), local_mask)]);
                self.store_link_mask(&mut link, mask).await?;
                return Ok(LinkOutcome::LocalOnly(local_mask));
            }
            Some(LinkEnd::Tracked(key)) => key,
        };

        let Some(mut remote) = self
            .store
            .read_interface(&remote_key, Projection::Full)
            .await
            .at(&remote_key)?
        else {
            debug!("Far end {remote_key} of link {link_key} is gone");
            return Ok(LinkOutcome::Unresolved);
        };
        if !is_sane(&remote_key, remote.fault, remote.health) {
            return Ok(LinkOutcome::Unresolved);
        }
        let remote_bound = remote.binding.is_some();

        let local_view = PeerView::of(local_mask, local_bound);
        let mut remote_mask = reflect(remote.fault, local_view, remote_bound, named);
        if let Signal::VtnExhaustion { asserted } = signal {
            remote_mask.set(FaultFlags::REMOTE_VTN_EXHAUSTION, asserted);
        }
        let remote_view = PeerView::of(remote_mask, remote_bound);
        let local_mask = reflect(local_mask, remote_view, local_bound, named);

        let mask = link_mask(&[
            (PeerView::of(local_mask, local_bound), local_mask),
            (remote_view, remote_mask),
        ]);
        self.store_link_mask(&mut link, mask).await?;

        let old_mask = remote.fault;
        let notification = derive_notification(old_mask, remote_mask);
        if remote_mask != old_mask {
            let change = transition(old_mask, remote_mask);
            remote.fault = remote_mask;
            remote.health = decode(remote_mask);
            remote.revision = self
                .store
                .write_interface(&remote, Match::read_at(remote.revision))
                .await
                .writing(&remote_key, &change)?;
            debug!("Far end {remote_key} of {link_key}: {change} ({notification})");
        }
        self.aggregate_node(&remote, false).await?;

        Ok(LinkOutcome::Reconciled {
            local: local_mask,
            remote: RemoteUpdate {
                key: remote_key,
                old_mask,
                new_mask: remote_mask,
                notification,
            },
        })
    }

    /// Clear what the far end of the link of a removed interface derived from it
    pub(crate) async fn detach_link_end(
        &mut self,
        removed: &InterfaceRecord,
    ) -> EngineResult<Option<RemoteUpdate>> {
        let Some(link_key) = &removed.vlink else {
            return Ok(None);
        };
        let Some(link) = self.store.read_link(link_key).await.at(link_key)? else {
            return Ok(None);
        };
        let Some(LinkEnd::Tracked(remote_key)) = link.peer_of(&removed.key) else {
            return Ok(None);
        };
        let Some(mut remote) = self
            .store
            .read_interface(remote_key, Projection::Full)
            .await
            .at(remote_key)?
        else {
            return Ok(None);
        };
        if !is_sane(remote_key, remote.fault, remote.health) {
            return Ok(None);
        }
        let bound = remote.binding.is_some();
        let old_mask = remote.fault;
        let new_mask = reflect(old_mask, PeerView::ABSENT, bound, link.boundary_name.is_some())
            - FaultFlags::REMOTE_VTN_EXHAUSTION;
        if new_mask == old_mask {
            self.aggregate_node(&remote, false).await?;
            return Ok(None);
        }
        let change = transition(old_mask, new_mask);
        remote.fault = new_mask;
        remote.health = decode(new_mask);
        remote.revision = self
            .store
            .write_interface(&remote, Match::read_at(remote.revision))
            .await
            .writing(remote_key, &change)?;
        debug!("Peer {} removed: {remote_key} {change}", removed.key);
        self.aggregate_node(&remote, false).await?;
        Ok(Some(RemoteUpdate {
            key: remote_key.clone(),
            old_mask,
            new_mask,
            notification: derive_notification(old_mask, new_mask),
        }))
    }
}
