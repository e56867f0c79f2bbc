//! `Segment` — a maximal contiguous time run at one sample rate (spec.md
//! §3 glossary).

use crate::recordlist::RecordList;
use crate::time::Nstime;

#[derive(Debug)]
pub struct Segment {
    pub start: Nstime,
    pub end: Nstime,
    pub sample_rate: f64,
    pub records: RecordList,
    /// Monotonic creation order, assigned by `TraceList::add_record` when
    /// the segment is first allocated. Used only to break priority ties
    /// between equal-length, equal-version segments deterministically
    /// (spec.md §9 open question; decision recorded in DESIGN.md): the
    /// earlier-created segment keeps its coverage.
    pub created_order: u32,
}

impl Segment {
    #[must_use]
    pub fn new(start: Nstime, end: Nstime, sample_rate: f64, created_order: u32) -> Self {
        Self {
            start,
            end,
            sample_rate,
            records: RecordList::new(),
            created_order,
        }
    }

    #[must_use]
    pub fn sample_period_ns(&self) -> i64 {
        crate::time::sample_period_ns(self.sample_rate)
    }
}
