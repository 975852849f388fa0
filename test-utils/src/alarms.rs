// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Alarm gateway that records what it is told

use async_trait::async_trait;
use engine::{AlarmEvent, AlarmGateway};
use model::keys::TenantCtrlrKey;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct RecordingAlarms {
    events: Mutex<Vec<AlarmEvent>>,
    /// cancelled when the next event is received
    cancel: Mutex<Option<CancellationToken>>,
}

impl RecordingAlarms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn events(&self) -> Vec<AlarmEvent> {
        self.events.lock().unwrap().clone()
    }
    #[must_use]
    pub fn events_for(&self, key: &TenantCtrlrKey) -> Vec<AlarmEvent> {
        self.events()
            .into_iter()
            .filter(|e| &e.key == key)
            .collect()
    }
    /// Whether the alarm of a span is currently raised, as far as the events received tell
    #[must_use]
    pub fn is_raised(&self, key: &TenantCtrlrKey) -> bool {
        self.events_for(key).last().is_some_and(|e| e.raised)
    }
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
    /// Cancel `token` upon receiving the next event, as an operator reacting to an alarm would
    pub fn cancel_on_next(&self, token: CancellationToken) {
        *self.cancel.lock().unwrap() = Some(token);
    }
}

#[async_trait]
impl AlarmGateway for RecordingAlarms {
    async fn notify(&self, event: AlarmEvent) {
        self.events.lock().unwrap().push(event);
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
    }
}
