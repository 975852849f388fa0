// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Entry points of the status engine.
//!
//! Every signal is handled tenant by tenant. For each tenant, the interfaces concerned are
//! looked up with the configuration lock held for reading, the controllers are queried with no
//! lock held, and the interfaces are updated with the lock held for writing. Alarms decided
//! during a transaction are delivered once the lock is released.

use model::keys::{IfKey, PortKey, SpanKey, TenantCtrlrKey, TenantKey};
use model::records::InterfaceRecord;
use model::{HealthState, classify};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracectl::{get_trace_ctl, trace_target};
#[allow(unused)]
use tracing::{debug, error, info, warn};

use crate::counters;
use crate::errors::{EngineError, EngineResult, StoreContext};
use crate::gateway::{
    AlarmEvent, AlarmGateway, ControllerQueryGateway, PersistenceGateway, PortHealth, Projection,
};
use crate::link::RemoteUpdate;
use crate::params::EngineParams;
use crate::pass::{Pass, PassMode};
use crate::samples::{PortSamples, sample_ports};
use crate::updater::{DriverResult, InterfaceUpdate, Signal};

trace_target!("status-engine", LevelFilter::INFO, &["status"]);

/// What a signal did, over all the tenants it concerned
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Number of tenants processed
    pub tenants: usize,
    pub updates: Vec<InterfaceUpdate>,
    pub alarms: Vec<AlarmEvent>,
}

impl BatchReport {
    /// Updates that changed a fault mask or a health
    pub fn changes(&self) -> impl Iterator<Item = &InterfaceUpdate> {
        self.updates.iter().filter(|u| u.changed())
    }
}

/// The interfaces of one tenant concerned by a signal
#[derive(Clone, Debug)]
struct TenantJob {
    tenant: TenantKey,
    /// `None` stands for all the interfaces of the tenant
    ifaces: Option<Vec<IfKey>>,
    /// Spans of the tenant whose controller changed connectivity, and whether it is connected
    connectivity: Option<(Vec<TenantCtrlrKey>, bool)>,
}

impl TenantJob {
    fn new(tenant: TenantKey, ifaces: Vec<IfKey>) -> Self {
        Self {
            tenant,
            ifaces: Some(ifaces),
            connectivity: None,
        }
    }
    fn whole(tenant: TenantKey) -> Self {
        Self {
            tenant,
            ifaces: None,
            connectivity: None,
        }
    }
}

/// How the interfaces of a job are processed
#[derive(Clone, Copy, Debug)]
struct JobOptions {
    signal: Signal,
    driver: DriverResult,
    mode: PassMode,
    /// Settle the tenant after its interfaces
    settle: bool,
    /// Only update the ends of virtual links
    link_ends_only: bool,
}

impl JobOptions {
    fn live(signal: Signal) -> Self {
        Self {
            signal,
            driver: DriverResult::Success,
            mode: PassMode::Live,
            settle: false,
            link_ends_only: matches!(
                signal,
                Signal::PathFault { .. } | Signal::VtnExhaustion { .. }
            ),
        }
    }
    fn settle() -> Self {
        Self {
            signal: Signal::Commit,
            driver: DriverResult::Success,
            mode: PassMode::Settle,
            settle: true,
            link_ends_only: false,
        }
    }
}

/// Interfaces to update in a transaction, and the ports to sample beforehand
#[derive(Debug, Default)]
struct Plan {
    items: Vec<(IfKey, DriverResult)>,
    ports: BTreeSet<PortKey>,
}

fn by_tenant(keys: Vec<IfKey>) -> BTreeMap<TenantKey, Vec<IfKey>> {
    let mut map: BTreeMap<TenantKey, Vec<IfKey>> = BTreeMap::new();
    for key in keys {
        map.entry(key.tenant.clone()).or_default().push(key);
    }
    map
}

/// The operational-status propagation engine
pub struct StatusEngine {
    params: EngineParams,
    store: Arc<dyn PersistenceGateway>,
    controllers: Arc<dyn ControllerQueryGateway>,
    alarms: Arc<dyn AlarmGateway>,
    lock: Arc<RwLock<()>>,
}

impl StatusEngine {
    /// Build an engine. `lock` is the configuration lock shared with the rest of the
    /// application: the engine takes it for reading to look up records and for writing to
    /// update them.
    ///
    /// # Errors
    ///
    /// Fails if the tracing configuration in `params` is invalid.
    pub fn new(
        params: EngineParams,
        store: Arc<dyn PersistenceGateway>,
        controllers: Arc<dyn ControllerQueryGateway>,
        alarms: Arc<dyn AlarmGateway>,
        lock: Arc<RwLock<()>>,
    ) -> EngineResult<Self> {
        if let Some(config) = &params.tracing {
            get_trace_ctl().setup_from_string(config)?;
        }
        counters::init_metrics();
        debug!("{params}");
        Ok(Self {
            params,
            store,
            controllers,
            alarms,
            lock,
        })
    }

    #[must_use]
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    #[must_use]
    pub fn config_lock(&self) -> Arc<RwLock<()>> {
        self.lock.clone()
    }

    /// Decide which interfaces of a job to update, with which driver result, and which ports
    /// to sample for them. Runs with the configuration lock held for reading.
    async fn plan(&self, job: &TenantJob, opts: JobOptions, sampled: bool) -> EngineResult<Plan> {
        let _guard = self.lock.read().await;
        let store = &*self.store;
        let keys = match &job.ifaces {
            Some(keys) => keys.clone(),
            None => store.interfaces_of_tenant(&job.tenant).await.at(&job.tenant)?,
        };

        let mut plan = Plan::default();
        let mut disconnected: BTreeMap<TenantCtrlrKey, bool> = BTreeMap::new();
        for key in keys {
            let Some(record) = store
                .read_interface(&key, Projection::ControllerDomain)
                .await
                .at(&key)?
            else {
                debug!("Interface {key} is gone");
                continue;
            };
            if opts.link_ends_only && !classify(&record).is_link_end() {
                continue;
            }
            let driver = match opts.signal {
                Signal::ControllerDown => DriverResult::ControllerDisconnected,
                Signal::ControllerUp => opts.driver,
                _ if opts.driver == DriverResult::ControllerDisconnected => opts.driver,
                _ => {
                    let span = record.tenant_ctrlr_key();
                    let off = match disconnected.get(&span) {
                        Some(off) => *off,
                        None => {
                            let off = store
                                .read_tenant_ctrlr(&span)
                                .await
                                .at(&span)?
                                .is_some_and(|r| r.disconnected);
                            disconnected.insert(span, off);
                            off
                        }
                    };
                    if off {
                        DriverResult::ControllerDisconnected
                    } else {
                        DriverResult::Success
                    }
                }
            };
            if !sampled
                && opts.signal.samples_ports()
                && driver == DriverResult::Success
                && let Some(binding) = &record.binding
            {
                plan.ports.insert(binding.port.clone());
            }
            plan.items.push((key, driver));
        }
        Ok(plan)
    }

    /// The steps of a tenant transaction
    async fn apply(
        pass: &mut Pass<'_>,
        job: &TenantJob,
        opts: JobOptions,
        plan: &Plan,
    ) -> EngineResult<Vec<InterfaceUpdate>> {
        if let Some((spans, connected)) = &job.connectivity {
            for span in spans {
                pass.set_disconnected(span, !connected).await?;
            }
        }
        let mut updates = Vec::with_capacity(plan.items.len());
        for (key, driver) in &plan.items {
            if let Some(update) = pass.update_interface(key, opts.signal, *driver).await? {
                updates.push(update);
            }
        }
        if opts.settle {
            pass.settle_tenant(&job.tenant).await?;
        }
        Ok(updates)
    }

    async fn dispatch(&self, alarms: &[AlarmEvent]) {
        for event in alarms {
            self.alarms.notify(event.clone()).await;
        }
    }

    /// Process one tenant: plan, sample, update. `samples` are used as is if given.
    async fn run_tenant(
        &self,
        job: &TenantJob,
        opts: JobOptions,
        samples: Option<&PortSamples>,
    ) -> EngineResult<BatchReport> {
        let plan = self.plan(job, opts, samples.is_some()).await?;
        let sampled;
        let samples = match samples {
            Some(samples) => samples,
            None => {
                sampled = sample_ports(
                    &*self.controllers,
                    plan.ports.clone(),
                    self.params.query_timeout,
                )
                .await;
                &sampled
            }
        };

        let (result, alarms) = {
            let _guard = self.lock.write().await;
            let mut pass = Pass::new(&*self.store, samples, opts.mode);
            let result = Self::apply(&mut pass, job, opts, &plan).await;
            (result, pass.alarms)
        };
        // alarms are queued once stored: those of a failed transaction are delivered too
        self.dispatch(&alarms).await;
        let updates = result?;
        debug!(
            "Tenant {}: {} interface(s) updated on {}",
            job.tenant,
            updates.iter().filter(|u| u.changed()).count(),
            opts.signal
        );
        Ok(BatchReport {
            tenants: 1,
            updates,
            alarms,
        })
    }

    /// Process the jobs one tenant at a time, yielding in between. Cancellation is checked
    /// before every tenant; the tenants already processed stay committed.
    async fn run_batch(
        &self,
        jobs: Vec<TenantJob>,
        opts: JobOptions,
        samples: Option<&PortSamples>,
        cancel: &CancellationToken,
    ) -> EngineResult<BatchReport> {
        let mut report = BatchReport::default();
        for job in jobs {
            if report.tenants > 0 && self.params.yield_between_tenants {
                tokio::task::yield_now().await;
            }
            if cancel.is_cancelled() {
                counters::batch_cancelled();
                warn!(
                    "Processing of {} cancelled after {} tenant(s)",
                    opts.signal, report.tenants
                );
                return Err(EngineError::Cancelled {
                    completed: report.tenants,
                });
            }
            match self.run_tenant(&job, opts, samples).await {
                Ok(done) => {
                    report.tenants += 1;
                    report.updates.extend(done.updates);
                    report.alarms.extend(done.alarms);
                }
                Err(e) => {
                    error!("Failed to process {} for tenant {}: {e}", opts.signal, job.tenant);
                    return Err(EngineError::BatchAborted {
                        completed: report.tenants,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Update a single interface.
    ///
    /// # Errors
    ///
    /// Fails on store errors, write conflicts and missing aggregation records.
    pub async fn update_interface(
        &self,
        key: &IfKey,
        signal: Signal,
        driver: DriverResult,
    ) -> EngineResult<Option<InterfaceUpdate>> {
        let job = TenantJob::new(key.tenant.clone(), vec![key.clone()]);
        let opts = JobOptions {
            driver,
            link_ends_only: false,
            ..JobOptions::live(signal)
        };
        let mut report = self.run_tenant(&job, opts, None).await?;
        Ok(report.updates.pop())
    }

    /// A controller reported the state of a physical port: update every interface bound to it
    ///
    /// # Errors
    ///
    /// Fails if the batch is cancelled or aborted by an error.
    pub async fn on_physical_port_status(
        &self,
        port: &PortKey,
        health: PortHealth,
        cancel: &CancellationToken,
    ) -> EngineResult<BatchReport> {
        let keys = {
            let _guard = self.lock.read().await;
            self.store.interfaces_by_port(port).await.at(port)?
        };
        info!("Port {port} is {health}: {} interface(s) bound", keys.len());
        let jobs = by_tenant(keys)
            .into_iter()
            .map(|(tenant, ifaces)| TenantJob::new(tenant, ifaces))
            .collect();
        let samples = PortSamples::single(port.clone(), health);
        self.run_batch(jobs, JobOptions::live(Signal::PortStatus), Some(&samples), cancel)
            .await
    }

    /// A controller was connected or disconnected: update every tenant spanning it
    ///
    /// # Errors
    ///
    /// Fails if the batch is cancelled or aborted by an error.
    pub async fn on_controller_connectivity(
        &self,
        controller: &str,
        connected: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<BatchReport> {
        let mut jobs: BTreeMap<TenantKey, TenantJob> = BTreeMap::new();
        {
            let _guard = self.lock.read().await;
            let records = self
                .store
                .tenant_controllers_by_controller(controller)
                .await
                .at(&controller)?;
            let spans: BTreeSet<SpanKey> = records.iter().map(|k| k.span.clone()).collect();
            for key in records {
                let job = jobs.entry(key.tenant.clone()).or_insert_with(|| TenantJob {
                    tenant: key.tenant.clone(),
                    ifaces: Some(Vec::new()),
                    connectivity: Some((Vec::new(), connected)),
                });
                if let Some((keys, _)) = &mut job.connectivity {
                    keys.push(key);
                }
            }
            for span in &spans {
                let keys = self.store.interfaces_by_span(span).await.at(span)?;
                for (tenant, ifaces) in by_tenant(keys) {
                    let job = jobs
                        .entry(tenant.clone())
                        .or_insert_with(|| TenantJob::new(tenant, Vec::new()));
                    if let Some(all) = &mut job.ifaces {
                        all.extend(ifaces);
                    }
                }
            }
        }
        let state = if connected { "connected" } else { "disconnected" };
        info!("Controller {controller} {state}: {} tenant(s) concerned", jobs.len());
        let signal = if connected {
            Signal::ControllerUp
        } else {
            Signal::ControllerDown
        };
        self.run_batch(jobs.into_values().collect(), JobOptions::live(signal), None, cancel)
            .await
    }

    /// A path fault was asserted or cleared on a span: update the ends of virtual links there
    ///
    /// # Errors
    ///
    /// Fails if the batch is cancelled or aborted by an error.
    pub async fn on_path_fault(
        &self,
        span: &SpanKey,
        asserted: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<BatchReport> {
        let keys = {
            let _guard = self.lock.read().await;
            self.store.interfaces_by_span(span).await.at(span)?
        };
        info!("Path fault on {span}: {asserted}");
        let jobs = by_tenant(keys)
            .into_iter()
            .map(|(tenant, ifaces)| TenantJob::new(tenant, ifaces))
            .collect();
        let opts = JobOptions::live(Signal::PathFault { asserted });
        self.run_batch(jobs, opts, Some(&PortSamples::new()), cancel)
            .await
    }

    /// A tenant ran out (or no longer runs out) of resources on a span: mark the far ends of
    /// its virtual links there
    ///
    /// # Errors
    ///
    /// Fails on store errors, write conflicts and missing aggregation records.
    pub async fn on_vtn_exhaustion(
        &self,
        tenant: &TenantKey,
        span: &SpanKey,
        asserted: bool,
    ) -> EngineResult<BatchReport> {
        let keys: Vec<IfKey> = {
            let _guard = self.lock.read().await;
            self.store.interfaces_by_span(span).await.at(span)?
        }
        .into_iter()
        .filter(|key| &key.tenant == tenant)
        .collect();
        info!("Resource exhaustion of {tenant} on {span}: {asserted}");
        let job = TenantJob::new(tenant.clone(), keys);
        let opts = JobOptions::live(Signal::VtnExhaustion { asserted });
        self.run_tenant(&job, opts, Some(&PortSamples::new())).await
    }

    /// Settle a tenant after a configuration commit: update all its interfaces and finalize
    /// the elements which are still uninitialized
    ///
    /// # Errors
    ///
    /// Fails on store errors and write conflicts.
    pub async fn on_commit(&self, tenant: &TenantKey) -> EngineResult<BatchReport> {
        self.run_tenant(&TenantJob::whole(tenant.clone()), JobOptions::settle(), None)
            .await
    }

    /// Settle every tenant which is still uninitialized, one tenant per transaction
    ///
    /// # Errors
    ///
    /// Fails if the batch is cancelled or aborted by an error.
    pub async fn reconcile_uninitialized_tenants(
        &self,
        cancel: &CancellationToken,
    ) -> EngineResult<BatchReport> {
        let mut jobs = Vec::new();
        {
            let _guard = self.lock.read().await;
            for tenant in self.store.tenants().await.at(&"tenants")? {
                let uninitialized = self
                    .store
                    .read_tenant(&tenant)
                    .await
                    .at(&tenant)?
                    .is_some_and(|r| r.health == HealthState::Uninitialized);
                if uninitialized {
                    jobs.push(TenantJob::whole(tenant));
                }
            }
        }
        info!("{} tenant(s) to settle", jobs.len());
        self.run_batch(jobs, JobOptions::settle(), None, cancel).await
    }

    /// An interface was deleted: withdraw its contribution from its node and clear what the
    /// far end of its virtual link derived from it
    ///
    /// # Errors
    ///
    /// Fails on store errors and write conflicts.
    pub async fn on_interface_removed(
        &self,
        record: &InterfaceRecord,
    ) -> EngineResult<Option<RemoteUpdate>> {
        let samples = PortSamples::new();
        let (result, alarms) = {
            let _guard = self.lock.write().await;
            let mut pass = Pass::new(&*self.store, &samples, PassMode::Live);
            let result = Self::detach(&mut pass, record).await;
            (result, pass.alarms)
        };
        self.dispatch(&alarms).await;
        result
    }

    async fn detach(
        pass: &mut Pass<'_>,
        record: &InterfaceRecord,
    ) -> EngineResult<Option<RemoteUpdate>> {
        let remote = pass.detach_link_end(record).await?;
        match pass.aggregate_node(record, true).await {
            Ok(_) => {}
            // the owner may be going away with the interface
            Err(EngineError::NoSuchInstance(key)) => debug!("{key} is gone"),
            Err(e) => return Err(e),
        }
        debug!("Interface {} removed", record.key);
        Ok(remote)
    }
}
