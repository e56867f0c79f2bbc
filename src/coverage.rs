//! Coverage Analyzer (spec.md §4.4).

use crate::config::Config;
use crate::segment::Segment;
use crate::time::Nstime;
use crate::tracelist::TraceList;

#[derive(Clone, Debug)]
pub struct CoverageEntry {
    pub start: Nstime,
    pub end: Nstime,
    pub sample_rate: f64,
    pub pubversion: u8,
}

#[derive(Clone, Debug, Default)]
pub struct Coverage {
    pub entries: Vec<CoverageEntry>,
}

impl Coverage {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `[start,end]`, expanded by `timetol` on both sides of every
    /// coverage entry, is fully dominated by a single entry (Phase A,
    /// whole-record removal).
    #[must_use]
    pub fn fully_contains(&self, start: Nstime, end: Nstime, timetol: i64) -> bool {
        self.entries.iter().any(|c| {
            let lo = c.start.saturating_sub(timetol);
            let hi = c.end.saturating_add(timetol);
            start >= lo && end <= hi
        })
    }

    /// Finds the entry overlapping `[start, end]`, if any — used by the
    /// Pruner's sample-level trim phase.
    #[must_use]
    pub fn overlapping(&self, start: Nstime, end: Nstime, timetol: i64) -> Option<&CoverageEntry> {
        self.entries.iter().find(|c| {
            end.saturating_add(timetol) >= c.start && start.saturating_sub(timetol) <= c.end
        })
    }
}

fn segment_len(seg: &Segment) -> i64 {
    (seg.end.as_nanos() - seg.start.as_nanos()).max(0)
}

/// Whether `peer` outranks `target` under the active priority policy
/// (spec.md §4.4 step 5). Ties (equal pub-version priority and equal
/// length) favor whichever segment was created earlier (DESIGN.md's
/// resolution of the §9 open question), not a symmetric `>=`/`>` length
/// comparison alone — a symmetric rule cannot produce the asymmetric
/// winner/loser spec.md §8 scenario 2 requires from two equal-length
/// overlapping segments.
fn peer_outranks(
    config: &Config,
    peer_pubversion: u8,
    peer: &Segment,
    target_pubversion: u8,
    target: &Segment,
) -> bool {
    if config.best_version && peer_pubversion != target_pubversion {
        return peer_pubversion > target_pubversion;
    }

    let peer_len = segment_len(peer);
    let target_len = segment_len(target);
    match peer_len.cmp(&target_len) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => peer.created_order < target.created_order,
    }
}

/// `findcoverage(TraceList, target_id, target_seg) → Coverage` (spec.md
/// §4.4). Peers are drawn from every Segment sharing the target's
/// SourceID — including other Segments of the *same* TraceID, since those
/// are exactly the overlapping-same-version case spec.md §8 scenario 2
/// exercises.
#[must_use]
pub fn findcoverage(tl: &TraceList, target_trace_idx: usize, target_seg_idx: usize, config: &Config) -> Coverage {
    let target_trace = &tl.trace_ids[target_trace_idx];
    let target_seg = &target_trace.segments[target_seg_idx];
    let target_source = target_trace.source_id.clone();
    let target_pubversion = target_trace.pubversion;

    let timetol = config.time_tolerance(target_seg.sample_period_ns());

    let mut coverage = Coverage::default();

    for (trace_idx, trace) in tl.trace_ids.iter().enumerate() {
        if trace.source_id != target_source {
            continue;
        }

        for (seg_idx, seg) in trace.segments.iter().enumerate() {
            if trace_idx == target_trace_idx && seg_idx == target_seg_idx {
                continue;
            }
            if seg.sample_rate == 0.0 {
                continue;
            }
            if !config.rates_tolerable(seg.sample_rate, target_seg.sample_rate) {
                continue;
            }

            if let Some(last) = coverage.entries.last() {
                if seg.start >= last.start && seg.end <= last.end {
                    continue;
                }
            }

            let overlaps = target_seg.end.saturating_add(timetol) >= seg.start
                && target_seg.start.saturating_sub(timetol) <= seg.end;
            if !overlaps {
                continue;
            }

            if !peer_outranks(config, trace.pubversion, seg, target_pubversion, target_seg) {
                continue;
            }

            let period = seg.sample_period_ns();
            for rid in seg.records.iter() {
                let record = tl.record(rid);
                if !record.is_contributing() {
                    continue;
                }
                let (es, ee) = record.effective_interval();

                let extend = coverage.entries.last_mut().filter(|last| {
                    (last.end.saturating_add(period).as_nanos() - es.as_nanos()).abs() <= timetol
                });
                match extend {
                    Some(last) => last.end = last.end.max(ee),
                    None => coverage.entries.push(CoverageEntry {
                        start: es,
                        end: ee,
                        sample_rate: seg.sample_rate,
                        pubversion: trace.pubversion,
                    }),
                }
            }
        }
    }

    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoding;
    use crate::fileref::FileRef;
    use crate::sourceid::SourceId;
    use test_log::test;

    fn t(n: i64) -> Nstime {
        Nstime::from_nanos(n * 1_000_000_000)
    }

    fn sid() -> SourceId {
        SourceId::new("NET", "STA", "", "BHZ")
    }

    #[test]
    fn higher_pubversion_always_outranks() {
        let mut tl = TraceList::new();
        let cfg = Config::default();
        let file = tl.add_file(FileRef::new("/tmp/a", None));
        let (_, trace1, _, _) =
            tl.add_record(sid(), 1, file, 0, 512, t(0), t(10), 100.0, Encoding::Int32, &cfg);
        tl.add_record(sid(), 2, file, 512, 512, t(0), t(10), 100.0, Encoding::Int32, &cfg);

        let coverage = findcoverage(&tl, trace1, 0, &cfg);
        assert!(!coverage.is_empty());
        assert!(coverage.fully_contains(t(0), t(10), 0));
    }

    #[test]
    fn equal_length_tie_favors_earlier_created_segment() {
        let mut tl = TraceList::new();
        let cfg = Config::default();
        let file = tl.add_file(FileRef::new("/tmp/a", None));
        // R1 00:00:00 -> 00:00:10, R2 00:00:05 -> 00:00:15, both pubver 1.
        let (_, trace_idx, seg1, _) =
            tl.add_record(sid(), 1, file, 0, 512, t(0), t(10), 100.0, Encoding::Int32, &cfg);
        let (_, _, seg2, _) =
            tl.add_record(sid(), 1, file, 512, 512, t(5), t(15), 100.0, Encoding::Int32, &cfg);
        assert_ne!(seg1, seg2);

        let coverage_for_r1 = findcoverage(&tl, trace_idx, seg1, &cfg);
        assert!(coverage_for_r1.is_empty(), "earlier segment should keep its coverage");

        let coverage_for_r2 = findcoverage(&tl, trace_idx, seg2, &cfg);
        assert!(!coverage_for_r2.is_empty(), "later segment should be outranked");
    }
}
