// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display implementations for keys and records

use std::fmt::Display;

use crate::fault::FaultFlags;
use crate::keys::{IfKey, LinkKey, NodeKey, PortKey, SpanKey, TenantCtrlrKey, TenantKey};
use crate::records::{
    InterfaceRecord, LinkEnd, TenantControllerRecord, VirtualLinkRecord, VirtualNodeRecord,
};

impl Display for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant, self.node)
    }
}
impl Display for IfKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.node, self.iface)
    }
}
impl Display for LinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant, self.link)
    }
}
impl Display for SpanKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.controller, self.domain)
    }
}
impl Display for TenantCtrlrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.tenant, self.span)
    }
}
impl Display for PortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.span, self.logical_port_id)
    }
}

/// Wrapper to show a fault mask as a list of flag names
pub struct FaultDisplay(pub FaultFlags);
impl Display for FaultDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_up() {
            return write!(f, "PORT_UP");
        }
        let mut first = true;
        for (name, _) in self.0.iter_names() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        let unknown = self.0.bits() & !FaultFlags::all().bits();
        if unknown != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{unknown:#x}")?;
        }
        Ok(())
    }
}

impl Display for InterfaceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "interface {} ({}) fault:{} health:{}",
            self.key,
            self.span,
            FaultDisplay(self.fault),
            self.health
        )
    }
}

impl Display for LinkEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEnd::Tracked(key) => write!(f, "{key}"),
            LinkEnd::UnknownPeer => write!(f, "<unknown-peer>"),
        }
    }
}

impl Display for VirtualLinkRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vlink {} [{} <-> {}] fault:{} health:{}",
            self.key,
            self.ends[0],
            self.ends[1],
            FaultDisplay(self.fault),
            self.health
        )?;
        if let Some(boundary) = &self.boundary_name {
            write!(f, " boundary:{boundary}")?;
        }
        Ok(())
    }
}

impl Display for VirtualNodeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({}) down:{} unknown:{} health:{}",
            self.kind,
            self.key,
            self.span,
            self.counters.down,
            self.counters.unknown,
            self.health
        )
    }
}

impl Display for TenantControllerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} down:{} unknown:{} health:{} alarm:{}{}",
            self.key,
            self.counters.down,
            self.counters.unknown,
            self.health,
            self.alarm_raised,
            if self.disconnected {
                " (disconnected)"
            } else {
                ""
            }
        )
    }
}
