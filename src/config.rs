//! Run-wide configuration.
//!
//! The original implementation keeps tolerance overrides, selection lists
//! and prune mode as process-wide globals (SPEC_FULL.md §9 design note).
//! This crate threads a single [`Config`] by reference into every
//! component instead, the way the teacher threads its own `Options`
//! structs (`flush::Options`) into collaborators rather than reaching for
//! statics.

use crate::select::Selections;

/// Which of the three pruning strategies spec.md §4.5 names is active.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PruneMode {
    /// `-Pr`: whole-record removal only.
    Record,
    /// `-Ps`: sample-level trimming.
    Sample,
    /// `-Pe`: edges-only, selection-derived trimming.
    EdgesOnly,
}

/// `-Sd|-Sh|-Sm` boundary-split granularity.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SplitGranularity {
    Day,
    Hour,
    Minute,
}

/// How to re-stamp a record's publication version/quality on write
/// (`-Q`, spec.md §6).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VersionOverride {
    Quality(u8), // ASCII R/D/Q/M
    Numeric(u8),
}

#[derive(Debug)]
pub struct Config {
    pub time_tolerance_seconds: Option<f64>,
    pub sample_rate_tolerance: f64,
    pub best_version: bool,
    pub prune_mode: Option<PruneMode>,
    pub global_start: Option<crate::time::Nstime>,
    pub global_end: Option<crate::time::Nstime>,
    pub match_pattern: Option<String>,
    pub match_regex: Option<String>,
    pub reject_regex: Option<String>,
    pub selections: Selections,
    pub skip_non_data: bool,
    pub split: Option<SplitGranularity>,
    pub version_override: Option<VersionOverride>,
    pub verbosity: u8,
    pub summary_path: Option<String>,
    pub summary_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_tolerance_seconds: None,
            sample_rate_tolerance: 0.0001,
            best_version: true,
            prune_mode: None,
            global_start: None,
            global_end: None,
            match_pattern: None,
            match_regex: None,
            reject_regex: None,
            selections: Selections::default(),
            skip_non_data: false,
            split: None,
            version_override: None,
            verbosity: 0,
            summary_path: None,
            summary_prefix: String::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn time_tolerance(&self, sample_period_ns: i64) -> i64 {
        crate::time::effective_time_tolerance(sample_period_ns, self.time_tolerance_seconds)
    }

    #[must_use]
    pub fn rates_tolerable(&self, a: f64, b: f64) -> bool {
        crate::time::rates_tolerable(a, b, self.sample_rate_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn default_tolerance_tracks_sample_period() {
        let cfg = Config::default();
        assert_eq!(cfg.time_tolerance(10_000_000), 5_000_000);
    }

    #[test]
    fn override_tolerance_wins() {
        let mut cfg = Config::default();
        cfg.time_tolerance_seconds = Some(0.001);
        assert_eq!(cfg.time_tolerance(10_000_000), 1_000_000);
    }
}
