// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use metrics::{counter, describe_counter};
use model::Notification;
use tracing::error;

use crate::errors::EngineError;

/// Metric name constants
pub const NOTIFICATIONS: &str = "vtn_status_notifications";
pub const ALARMS: &str = "vtn_status_alarms";
pub const INVARIANT_VIOLATIONS: &str = "vtn_status_invariant_violations";
pub const CANCELLED_BATCHES: &str = "vtn_status_cancelled_batches";

/// Initialize metrics descriptions
pub fn init_metrics() {
    describe_counter!(NOTIFICATIONS, "Interface status notifications, by kind");
    describe_counter!(ALARMS, "Tenant alarms raised and cleared");
    describe_counter!(
        INVARIANT_VIOLATIONS,
        "Records skipped because their fault mask and health disagree"
    );
    describe_counter!(CANCELLED_BATCHES, "Multi-tenant passes cancelled midway");
}

pub(crate) fn notification(notification: Notification) {
    let kind: &'static str = notification.into();
    counter!(NOTIFICATIONS, "kind" => kind).increment(1);
}

pub(crate) fn alarm(raised: bool) {
    let action = if raised { "raise" } else { "clear" };
    counter!(ALARMS, "action" => action).increment(1);
}

/// Log an invariant violation. The offending element is left untouched by the caller.
pub(crate) fn invariant_violation(e: &EngineError) {
    error!("{e}: record skipped");
    counter!(INVARIANT_VIOLATIONS).increment(1);
}

pub(crate) fn batch_cancelled() {
    counter!(CANCELLED_BATCHES).increment(1);
}
