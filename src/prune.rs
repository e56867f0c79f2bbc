//! Pruner (spec.md §4.5). Mutates Record metadata only; never touches
//! on-disk bytes.

use crate::config::{Config, PruneMode};
use crate::coverage::Coverage;
use crate::record::Record;
use crate::time::Nstime;
use crate::tracelist::TraceList;

/// Selection-derived TrimBound (spec.md §4.3's final paragraph): applies
/// regardless of prune mode whenever sample-level or edges-only pruning
/// is active, since both modes trim record edges to the selection window.
fn apply_selection_trim(record: &mut Record, config: &Config) {
    if let Some(gs) = config.global_start {
        let candidate = match record.select_start {
            Some(ss) => gs.max(ss),
            None => gs,
        };
        if candidate > record.start && candidate < record.end {
            record.new_start = Some(record.new_start.map_or(candidate, |ns| ns.max(candidate)));
        }
    } else if let Some(ss) = record.select_start {
        if ss > record.start && ss < record.end {
            record.new_start = Some(record.new_start.map_or(ss, |ns| ns.max(ss)));
        }
    }

    if let Some(ge) = config.global_end {
        let candidate = match record.select_end {
            Some(se) => ge.min(se),
            None => ge,
        };
        if candidate > record.start && candidate < record.end {
            record.new_end = Some(record.new_end.map_or(candidate, |ne| ne.min(candidate)));
        }
    } else if let Some(se) = record.select_end {
        if se > record.start && se < record.end {
            record.new_end = Some(record.new_end.map_or(se, |ne| ne.min(se)));
        }
    }
}

/// `trimtrace(target_seg, coverage)` (spec.md §4.5).
pub fn trimtrace(tl: &mut TraceList, trace_idx: usize, seg_idx: usize, coverage: &Coverage, config: &Config) {
    let Some(mode) = config.prune_mode else {
        return;
    };

    let period = tl.trace_ids[trace_idx].segments[seg_idx].sample_period_ns();
    let timetol = config.time_tolerance(period);
    let record_ids: Vec<_> = tl.trace_ids[trace_idx].segments[seg_idx].records.iter().collect();

    for rid in record_ids {
        if !tl.record(rid).is_contributing() {
            continue;
        }

        // Phase A: whole-record removal.
        let (es, ee) = tl.record(rid).effective_interval();
        if !coverage.is_empty() && coverage.fully_contains(es, ee, timetol) {
            tl.record_mut(rid).mark_non_contributing();
            continue;
        }

        match mode {
            PruneMode::Record => {}
            PruneMode::EdgesOnly => {
                apply_selection_trim(tl.record_mut(rid), config);
            }
            PruneMode::Sample => {
                apply_selection_trim(tl.record_mut(rid), config);
                phase_b_sample_trim(tl, rid, coverage, timetol, period, config);
            }
        }
    }
}

fn phase_b_sample_trim(
    tl: &mut TraceList,
    rid: crate::record::RecordId,
    coverage: &Coverage,
    timetol: i64,
    period: i64,
    config: &Config,
) {
    let (es, ee) = tl.record(rid).effective_interval();
    let Some(cov) = coverage.overlapping(es, ee, timetol) else {
        return;
    };

    if es < cov.start && ee.saturating_add(timetol) >= cov.start {
        let new_end = cov.start.saturating_sub(period).saturating_add(timetol);
        let record = tl.record_mut(rid);
        if let Some(gs) = config.global_start {
            if new_end < gs {
                record.mark_non_contributing();
                return;
            }
        }
        if new_end <= record.start {
            record.mark_non_contributing();
            return;
        }
        record.new_end = Some(new_end);
    } else if ee > cov.end && es.saturating_sub(timetol) <= cov.end {
        let new_start = cov.end.saturating_add(period).saturating_sub(timetol);
        let record = tl.record_mut(rid);
        if let Some(ge) = config.global_end {
            if new_start > ge {
                record.mark_non_contributing();
                return;
            }
        }
        if new_start >= record.end {
            record.mark_non_contributing();
            return;
        }
        record.new_start = Some(new_start);
    }

    collapse_if_degenerate(tl.record_mut(rid), timetol);
}

fn collapse_if_degenerate(record: &mut Record, timetol: i64) {
    let (es, ee): (Nstime, Nstime) = record.effective_interval();
    if es.as_nanos() >= ee.as_nanos().saturating_sub(timetol) {
        record.mark_non_contributing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoding;
    use crate::coverage::CoverageEntry;
    use crate::fileref::FileRef;
    use crate::sourceid::SourceId;
    use test_log::test;

    fn t(n: i64) -> Nstime {
        Nstime::from_nanos(n)
    }

    fn sid() -> SourceId {
        SourceId::new("NET", "STA", "", "BHZ")
    }

    fn setup() -> (TraceList, Config, usize, usize) {
        let mut tl = TraceList::new();
        let mut cfg = Config::default();
        cfg.prune_mode = Some(PruneMode::Sample);
        let file = tl.add_file(FileRef::new("/tmp/a", None));
        let period = crate::time::sample_period_ns(100.0);
        let (_, trace_idx, seg_idx, _) = tl.add_record(
            sid(),
            1,
            file,
            0,
            512,
            t(0),
            t(1000 * period),
            100.0,
            Encoding::Int32,
            &cfg,
        );
        (tl, cfg, trace_idx, seg_idx)
    }

    #[test]
    fn whole_record_removal_when_fully_covered() {
        let (mut tl, cfg, trace_idx, seg_idx) = setup();
        let rid = tl.trace_ids[trace_idx].segments[seg_idx].records.first().unwrap();
        let (start, end) = tl.record(rid).effective_interval();
        let coverage = Coverage {
            entries: vec![CoverageEntry {
                start,
                end,
                sample_rate: 100.0,
                pubversion: 2,
            }],
        };
        trimtrace(&mut tl, trace_idx, seg_idx, &coverage, &cfg);
        assert!(!tl.record(rid).is_contributing());
    }

    #[test]
    fn left_overlap_trims_new_end() {
        let (mut tl, cfg, trace_idx, seg_idx) = setup();
        let rid = tl.trace_ids[trace_idx].segments[seg_idx].records.first().unwrap();
        let period = crate::time::sample_period_ns(100.0);
        // Coverage starts at sample 500 and runs to the end.
        let cov_start = t(500 * period);
        let coverage = Coverage {
            entries: vec![CoverageEntry {
                start: cov_start,
                end: t(1000 * period),
                sample_rate: 100.0,
                pubversion: 1,
            }],
        };
        trimtrace(&mut tl, trace_idx, seg_idx, &coverage, &cfg);
        let record = tl.record(rid);
        assert!(record.is_contributing());
        assert!(record.new_end.is_some());
        assert!(record.new_end.unwrap() < cov_start);
    }

    #[test]
    fn untouched_when_no_coverage() {
        let (mut tl, cfg, trace_idx, seg_idx) = setup();
        let rid = tl.trace_ids[trace_idx].segments[seg_idx].records.first().unwrap();
        let coverage = Coverage::default();
        trimtrace(&mut tl, trace_idx, seg_idx, &coverage, &cfg);
        let record = tl.record(rid);
        assert!(record.is_contributing());
        assert!(record.new_start.is_none());
        assert!(record.new_end.is_none());
    }
}
