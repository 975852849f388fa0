// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Display implementations

use crate::control::{TargetCfg, TargetCfgDb};
use std::fmt::Display;

macro_rules! TARGET_FMT {
    () => {
        "{:>48} │ {:>8} │ {}"
    };
}

impl Display for TargetCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            format_args!(TARGET_FMT!(), self.target, self.level, self.tags.join(","))
        )
    }
}

impl Display for TargetCfgDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{:>40}", "──── Tracing targets ────")?;
        writeln!(f, "{}", format_args!(TARGET_FMT!(), "TARGET", "LEVEL", "TAGS"))?;
        for target in self.targets.values() {
            writeln!(f, "{target}")?;
        }
        write!(
            f,
            "{}",
            format_args!(TARGET_FMT!(), "(default)", self.level, "--")
        )
    }
}

pub(crate) struct TargetCfgDbByTag<'a>(pub(crate) &'a TargetCfgDb);

impl Display for TargetCfgDbByTag<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{:>40}", "──── Tracing targets by tag ────")?;
        for tag in self.0.tags.keys() {
            writeln!(f, " {tag}:")?;
            for target in self.0.targets_by_tag(tag) {
                writeln!(f, "      {:<48} : {}", target.target, target.level)?;
            }
        }
        Ok(())
    }
}
