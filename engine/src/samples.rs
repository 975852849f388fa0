// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port state sampling.
//!
//! Controllers are queried before the configuration lock is taken for writing. The results
//! are kept in a [`PortSamples`] which the updater consults when it computes a fault mask.

use futures::future::join_all;
use model::keys::PortKey;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::timeout;
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, warn};

use crate::gateway::{ControllerQueryGateway, PortHealth, QueryError};

trace_target!("port-sampling", LevelFilter::INFO, &["status"]);

/// The states of a set of ports, as obtained before a write transaction
#[derive(Debug, Default, Clone)]
pub struct PortSamples(HashMap<PortKey, PortHealth>);

impl PortSamples {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Samples made of the single state reported for a port
    #[must_use]
    pub fn single(port: PortKey, health: PortHealth) -> Self {
        let mut samples = Self::new();
        samples.insert(port, health);
        samples
    }
    pub fn insert(&mut self, port: PortKey, health: PortHealth) {
        self.0.insert(port, health);
    }
    /// State of a port. A port which was not sampled is `Unknown`.
    #[must_use]
    pub fn get(&self, port: &PortKey) -> PortHealth {
        self.0.get(port).copied().unwrap_or_else(|| {
            debug!("No sample for port {port}: assuming unknown");
            PortHealth::Unknown
        })
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Run a query bounded by `limit`. Errors and timeouts are reported as `Unknown`.
async fn bounded<F>(what: &(dyn Display + Sync), limit: Duration, query: F) -> PortHealth
where
    F: Future<Output = Result<PortHealth, QueryError>>,
{
    let result = timeout(limit, query)
        .await
        .unwrap_or(Err(QueryError::Timeout));
    match result {
        Ok(health) => health,
        Err(e) => {
            warn!("Failed to query {what}: {e}");
            PortHealth::Unknown
        }
    }
}

/// Query the state of `ports`.
///
/// Each controller is asked first whether it is up: the ports of a controller which is not
/// are `Unknown` without further queries. The remaining ports are queried concurrently.
pub(crate) async fn sample_ports(
    gateway: &dyn ControllerQueryGateway,
    ports: BTreeSet<PortKey>,
    limit: Duration,
) -> PortSamples {
    let mut samples = PortSamples::new();
    if ports.is_empty() {
        return samples;
    }

    let mut by_controller: BTreeMap<String, Vec<PortKey>> = BTreeMap::new();
    for port in ports {
        by_controller
            .entry(port.span.controller.clone())
            .or_default()
            .push(port);
    }

    let mut reachable = Vec::new();
    for (controller, ports) in by_controller {
        let state = bounded(
            &format!("controller {controller}"),
            limit,
            gateway.query_controller(&controller),
        )
        .await;
        if state == PortHealth::Up {
            reachable.extend(ports);
        } else {
            debug!(
                "Controller {controller} is {state}: {} port(s) are unknown",
                ports.len()
            );
            ports
                .into_iter()
                .for_each(|port| samples.insert(port, PortHealth::Unknown));
        }
    }

    let states = join_all(reachable.iter().map(|port| {
        bounded(
            port as &(dyn Display + Sync),
            limit,
            gateway.query_port(port),
        )
    }))
    .await;
    for (port, state) in reachable.into_iter().zip(states) {
        debug!("Port {port} is {state}");
        samples.insert(port, state);
    }
    samples
}
