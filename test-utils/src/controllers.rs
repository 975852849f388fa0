// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Controller query gateway answering from a script

use async_trait::async_trait;
use dashmap::DashMap;
use engine::{ControllerQueryGateway, PortHealth, QueryError};
use model::keys::PortKey;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Ports and controllers not scripted are up
#[derive(Debug, Default)]
pub struct ScriptedControllers {
    ports: DashMap<PortKey, Result<PortHealth, QueryError>>,
    controllers: DashMap<String, Result<PortHealth, QueryError>>,
    delays: DashMap<PortKey, Duration>,
    port_queries: AtomicUsize,
}

impl ScriptedControllers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_port(&self, port: &PortKey, health: PortHealth) {
        self.ports.insert(port.clone(), Ok(health));
    }
    pub fn fail_port(&self, port: &PortKey, error: QueryError) {
        self.ports.insert(port.clone(), Err(error));
    }
    /// Make queries for a port take `delay` before answering
    pub fn delay_port(&self, port: &PortKey, delay: Duration) {
        self.delays.insert(port.clone(), delay);
    }
    pub fn set_controller(&self, controller: &str, health: PortHealth) {
        self.controllers.insert(controller.to_owned(), Ok(health));
    }
    pub fn fail_controller(&self, controller: &str, error: QueryError) {
        self.controllers.insert(controller.to_owned(), Err(error));
    }
    /// Number of port queries received so far
    #[must_use]
    pub fn port_queries(&self) -> usize {
        self.port_queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ControllerQueryGateway for ScriptedControllers {
    async fn query_port(&self, port: &PortKey) -> Result<PortHealth, QueryError> {
        self.port_queries.fetch_add(1, Ordering::Relaxed);
        let delay = self.delays.get(port).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.ports
            .get(port)
            .map_or(Ok(PortHealth::Up), |answer| answer.clone())
    }
    async fn query_controller(&self, controller: &str) -> Result<PortHealth, QueryError> {
        self.controllers
            .get(controller)
            .map_or(Ok(PortHealth::Up), |answer| answer.clone())
    }
}
