//! Reconciler (spec.md §4.8): after the Pruner runs, a Segment's cached
//! `start`/`end` can drift from its Records' actual extent — a leading or
//! trailing Record may have been marked non-contributing, or trimmed.
//! This restores I4 (`segment.start`/`segment.end` track the first/last
//! contributing Record's effective interval).

use crate::tracelist::TraceList;

/// Recomputes `start`/`end` for every Segment of every TraceID from its
/// first and last contributing Record. A Segment left with no
/// contributing Records at all keeps its prior bounds — the Writer skips
/// it entirely since its RecordList is empty.
pub fn reconcile(tl: &mut TraceList) {
    for trace_idx in 0..tl.trace_ids.len() {
        for seg_idx in 0..tl.trace_ids[trace_idx].segments.len() {
            reconcile_segment(tl, trace_idx, seg_idx);
        }
    }
}

fn reconcile_segment(tl: &mut TraceList, trace_idx: usize, seg_idx: usize) {
    let record_ids: Vec<_> = tl.trace_ids[trace_idx].segments[seg_idx].records.iter().collect();

    let mut first = None;
    let mut last = None;
    for rid in record_ids {
        let record = tl.record(rid);
        if !record.is_contributing() {
            continue;
        }
        let (es, ee) = record.effective_interval();
        first = Some(first.map_or(es, |f: crate::time::Nstime| f.min(es)));
        last = Some(last.map_or(ee, |l: crate::time::Nstime| l.max(ee)));
    }

    if let (Some(start), Some(end)) = (first, last) {
        let seg = &mut tl.trace_ids[trace_idx].segments[seg_idx];
        seg.start = start;
        seg.end = end;
    }
}
