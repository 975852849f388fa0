// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Lookup keys of the persisted records.
//!
//! Every reference between elements (interface to node, link to its two interfaces, node to
//! its tenant-controller record) is one of these keys, never an owned pointer.

use serde::{Deserialize, Serialize};

/// Name of a tenant (VTN)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantKey(pub String);

impl TenantKey {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_owned())
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A virtual node (bridge, router, terminal, port-map) of a tenant
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub tenant: TenantKey,
    pub node: String,
}

impl NodeKey {
    #[must_use]
    pub fn new(tenant: &str, node: &str) -> Self {
        Self {
            tenant: TenantKey::new(tenant),
            node: node.to_owned(),
        }
    }
}

/// A virtual node interface
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IfKey {
    pub tenant: TenantKey,
    pub node: String,
    pub iface: String,
}

impl IfKey {
    #[must_use]
    pub fn new(tenant: &str, node: &str, iface: &str) -> Self {
        Self {
            tenant: TenantKey::new(tenant),
            node: node.to_owned(),
            iface: iface.to_owned(),
        }
    }
    /// Key of the node owning this interface
    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        NodeKey {
            tenant: self.tenant.clone(),
            node: self.node.clone(),
        }
    }
}

/// A virtual link of a tenant
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey {
    pub tenant: TenantKey,
    pub link: String,
}

impl LinkKey {
    #[must_use]
    pub fn new(tenant: &str, link: &str) -> Self {
        Self {
            tenant: TenantKey::new(tenant),
            link: link.to_owned(),
        }
    }
}

/// A (controller, domain) span
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanKey {
    pub controller: String,
    pub domain: String,
}

impl SpanKey {
    #[must_use]
    pub fn new(controller: &str, domain: &str) -> Self {
        Self {
            controller: controller.to_owned(),
            domain: domain.to_owned(),
        }
    }
}

/// The status record of a tenant over one (controller, domain) span
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantCtrlrKey {
    pub tenant: TenantKey,
    pub span: SpanKey,
}

impl TenantCtrlrKey {
    #[must_use]
    pub fn new(tenant: &str, controller: &str, domain: &str) -> Self {
        Self {
            tenant: TenantKey::new(tenant),
            span: SpanKey::new(controller, domain),
        }
    }
}

/// A physical (logical) port as known by a controller
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortKey {
    pub span: SpanKey,
    pub logical_port_id: String,
}

impl PortKey {
    #[must_use]
    pub fn new(controller: &str, domain: &str, logical_port_id: &str) -> Self {
        Self {
            span: SpanKey::new(controller, domain),
            logical_port_id: logical_port_id.to_owned(),
        }
    }
}
