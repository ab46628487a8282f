//! Per-site outcomes and counters of a retyping run.

use crate::error::Error;
use efixray_types::CType;
use std::fmt;

/// What happened at one matched service call.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteOutcome {
    /// The store accepted the new type.
    Retyped { variable: String, ty: CType },
    /// Dry run: the type that would have been applied.
    Planned { variable: String, ty: CType },
    /// The site was left untouched.
    Failed(Error),
}

/// Outcome of one matched service call.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteReport {
    pub function: u64,
    /// Address of the call (or of the usage record when the call has none).
    pub site: u64,
    pub service: &'static str,
    pub protocol: Option<String>,
    pub outcome: SiteOutcome,
}

impl fmt::Display for SiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} {}", self.site, self.service)?;
        if let Some(protocol) = &self.protocol {
            write!(f, " ({})", protocol)?;
        }
        match &self.outcome {
            SiteOutcome::Retyped { variable, ty } => write!(f, ": {} -> {}", variable, ty),
            SiteOutcome::Planned { variable, ty } => write!(f, ": {} => {} (dry run)", variable, ty),
            SiteOutcome::Failed(err) => write!(f, ": {}", err),
        }
    }
}

/// Counters over a retyping run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetypeStats {
    /// Usage records processed.
    pub records: usize,
    /// Records skipped because no function contains them or the
    /// function did not decompile.
    pub skipped_records: usize,
    /// Function bodies traversed (once per table).
    pub traversals: usize,
    /// Calls whose target matched a catalog entry.
    pub matched_calls: usize,
    /// Matched calls skipped for a wrong argument count.
    pub arg_count_mismatches: usize,
    pub retyped: usize,
    pub planned: usize,
    pub failures: usize,
}

/// Everything a retyping run decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetypeReport {
    pub sites: Vec<SiteReport>,
    /// Errors that skipped a whole usage record.
    pub record_errors: Vec<Error>,
    pub stats: RetypeStats,
}

impl RetypeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a site outcome and updates the counters.
    pub fn push(&mut self, site: SiteReport) {
        match &site.outcome {
            SiteOutcome::Retyped { .. } => self.stats.retyped += 1,
            SiteOutcome::Planned { .. } => self.stats.planned += 1,
            SiteOutcome::Failed(_) => self.stats.failures += 1,
        }
        self.sites.push(site);
    }

    /// Records a usage record that could not be processed.
    pub fn skip_record(&mut self, err: Error) {
        self.stats.skipped_records += 1;
        self.record_errors.push(err);
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: RetypeReport) {
        let s = other.stats;
        self.stats.records += s.records;
        self.stats.skipped_records += s.skipped_records;
        self.stats.traversals += s.traversals;
        self.stats.matched_calls += s.matched_calls;
        self.stats.arg_count_mismatches += s.arg_count_mismatches;
        self.stats.retyped += s.retyped;
        self.stats.planned += s.planned;
        self.stats.failures += s.failures;
        self.sites.extend(other.sites);
        self.record_errors.extend(other.record_errors);
    }

    /// Errors of failed sites.
    pub fn failures(&self) -> impl Iterator<Item = (&SiteReport, &Error)> {
        self.sites.iter().filter_map(|s| match &s.outcome {
            SiteOutcome::Failed(err) => Some((s, err)),
            _ => None,
        })
    }

    /// Variables retyped, with their new types.
    pub fn retyped(&self) -> impl Iterator<Item = (&str, &CType)> {
        self.sites.iter().filter_map(|s| match &s.outcome {
            SiteOutcome::Retyped { variable, ty } => Some((variable.as_str(), ty)),
            _ => None,
        })
    }
}
