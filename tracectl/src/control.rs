// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::{OrderMap, OrderSet};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, Registry, prelude::*, reload};

use crate::display::TargetCfgDbByTag;
use crate::targets::TRACING_TARGETS;
use crate::{LevelFilter, TraceCtlError, trace_target};

trace_target!("tracectl", LevelFilter::INFO, &[]);

/// Configuration of one target
#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: Vec<&'static str>,
}

impl TargetCfg {
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

#[derive(Debug)]
pub(crate) struct TargetCfgDb {
    pub(crate) level: LevelFilter,
    pub(crate) targets: OrderMap<&'static str, TargetCfg>,
    pub(crate) tags: OrderMap<&'static str, OrderSet<&'static str>>,
}

impl TargetCfgDb {
    fn new(level: LevelFilter) -> Self {
        let mut db = Self {
            level,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for target in TRACING_TARGETS {
            db.register(target.target, target.name, target.level, target.tags);
        }
        db
    }
    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        let mut all_tags = tags.to_vec();
        if !all_tags.contains(&name) {
            all_tags.push(name);
        }
        for tag in &all_tags {
            self.tags.entry(*tag).or_default().insert(target);
        }
        let cfg = TargetCfg {
            target,
            name,
            level,
            tags: all_tags,
        };
        if let Some(prior) = self.targets.insert(target, cfg) {
            warn!("Target {} has been multiply defined!", prior.target);
        }
    }
    fn env_filter(&self) -> EnvFilter {
        self.targets
            .values()
            .filter_map(|t| format!("{}={}", t.target, t.level).parse::<Directive>().ok())
            .fold(EnvFilter::new(self.level.to_string()), EnvFilter::add_directive)
    }
    /// Set the level of all the targets carrying a tag. Returns how many targets changed.
    fn set_tag_level(&mut self, tag: &str, level: LevelFilter) -> Result<usize, TraceCtlError> {
        let Some(targets) = self.tags.get(tag) else {
            return Err(TraceCtlError::UnknownTag(tag.to_owned()));
        };
        let mut changed = 0;
        for target in targets {
            if let Some(cfg) = self.targets.get_mut(target)
                && cfg.level != level
            {
                cfg.level = level;
                changed += 1;
            }
        }
        Ok(changed)
    }
    pub(crate) fn targets_by_tag<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a TargetCfg> {
        let targets = self.tags.get(tag);
        self.targets
            .values()
            .filter(move |cfg| targets.is_some_and(|t| t.contains(cfg.target)))
    }
    fn as_config_string(&self) -> String {
        let mut out = format!("default={}", self.level);
        for target in self.targets.values() {
            out += &format!(",{}={}", target.name, target.level);
        }
        out
    }
}

/// Parse a string of comma-separated `tag=level` items, with level one of
/// off, error, warn, info, debug, trace
fn parse_tracing_config(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceCtlError> {
    let mut result = OrderMap::new();
    for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        let Some((tag, level)) = item.split_once('=') else {
            return Err(TraceCtlError::Syntax(item.to_owned()));
        };
        let (tag, level) = (tag.trim(), level.trim());
        let level = LevelFilter::from_str(level)
            .map_err(|_| TraceCtlError::BadLevel(level.to_owned(), tag.to_owned()))?;
        result.insert(tag.to_owned(), level);
    }
    Ok(result)
}

/// Handle to change the tracing configuration of the process
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetCfgDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetCfgDb::new(LevelFilter::INFO);
        let (filter, reload_filter) = reload::Layer::new(db.env_filter());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true);

        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            // somebody else owns the global subscriber (e.g. a test harness)
            warn!("Tracing subscriber not installed: {e}");
        }

        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }
    fn db(&self) -> MutexGuard<'_, TargetCfgDb> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
    fn reload(&self, db: &TargetCfgDb) {
        if let Err(e) = self.reload_filter.reload(db.env_filter()) {
            error!("Failed to reload tracing filter: {e}");
        }
    }

    /// Initialize tracing if not done yet
    pub fn init() {
        get_trace_ctl();
    }
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.db();
        let changed = db.set_tag_level(tag, level)?;
        if changed > 0 {
            self.reload(&db);
        }
        debug!("Set level of tag '{tag}' to {level}: {changed} targets changed");
        Ok(())
    }
    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.db();
        db.targets.values_mut().for_each(|t| t.level = level);
        self.reload(&db);
    }
    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db();
        if db.level != level {
            db.level = level;
            self.reload(&db);
            info!("Set default log level to {level}");
        }
    }
    #[must_use]
    pub fn get_default_level(&self) -> LevelFilter {
        self.db().level
    }

    /// Apply a configuration string like `default=warn,all=info,link=debug`.
    /// `default` sets the level of unregistered targets and `all` that of every registered one;
    /// other items are tags and are applied last so that they override `all`.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let config = parse_tracing_config(input)?;
        if let Some(level) = config.get("default") {
            self.set_default_level(*level);
        }
        if let Some(level) = config.get("all") {
            self.set_level_all(*level);
        }
        config
            .iter()
            .filter(|(tag, _)| !matches!(tag.as_str(), "default" | "all"))
            .try_for_each(|(tag, level)| self.set_tag_level(tag, *level))
    }

    #[must_use]
    pub fn get_target(&self, target: &str) -> Option<TargetCfg> {
        self.db().targets.get(target).cloned()
    }
    #[must_use]
    pub fn get_targets_by_tag(&self, tag: &str) -> Vec<TargetCfg> {
        self.db().targets_by_tag(tag).cloned().collect()
    }
    #[must_use]
    pub fn get_tags(&self) -> Vec<&'static str> {
        self.db().tags.keys().copied().collect()
    }
    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.db().as_config_string()
    }
    pub fn dump(&self) {
        let db = self.db();
        info!("{db}");
    }
    pub fn dump_targets_by_tag(&self) {
        let db = self.db();
        info!("{}", TargetCfgDbByTag(&db));
    }
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get a reference to the process-wide [`TracingControl`], initializing it if needed
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}
