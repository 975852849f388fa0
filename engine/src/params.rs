// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Engine parameters

use derive_builder::Builder;
use std::fmt::Display;
use std::time::Duration;

pub const DEFAULT_ENGINE_NAME: &str = "vtn-status";
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Parameters of a [`StatusEngine`](crate::StatusEngine). N.B. we derive a builder type
/// `EngineParamsBuilder` and provide defaults for each field.
#[derive(Builder, Clone, Debug)]
pub struct EngineParams {
    #[builder(setter(into), default = DEFAULT_ENGINE_NAME.to_string())]
    pub name: String,

    /// Bound on every query to a controller. A query not answered in time yields `Unknown`.
    #[builder(default = DEFAULT_QUERY_TIMEOUT)]
    pub query_timeout: Duration,

    /// Yield to the runtime between the tenants of a batch
    #[builder(default = true)]
    pub yield_between_tenants: bool,

    /// Tracing configuration (e.g. `default=info,link=debug`) applied when the engine is built.
    /// If unset, the engine does not touch the tracing setup of the process.
    #[builder(setter(into, strip_option), default)]
    pub tracing: Option<String>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            name: DEFAULT_ENGINE_NAME.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            yield_between_tenants: true,
            tracing: None,
        }
    }
}

impl Display for EngineParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Status engine config")?;
        writeln!(f, "  name          : {}", self.name)?;
        writeln!(f, "  query timeout : {:?}", self.query_timeout)?;
        writeln!(f, "  yield         : {}", self.yield_between_tenants)?;
        writeln!(
            f,
            "  tracing       : {}",
            self.tracing.as_deref().unwrap_or("--")
        )
    }
}
