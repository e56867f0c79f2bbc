//! Record Index (spec.md §4.1).
//!
//! A `Record` is a pointer to an on-disk miniSEED record plus the
//! metadata the Coverage Analyzer, Pruner, Reconciler and Writer mutate in
//! place. Per the arena-and-indices design note (SPEC_FULL.md §9),
//! `Record`s live in `TraceList::records: Vec<Record>` and are referenced
//! everywhere else by `RecordId`, the way the teacher's segment code
//! refers to blocks by handle rather than by raw pointer.

use crate::codec::Encoding;
use crate::fileref::FileId;
use crate::time::Nstime;

/// Index into `TraceList::records`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RecordId(pub usize);

#[derive(Clone, Debug)]
pub struct Record {
    pub file: FileId,
    pub offset: u64,
    /// On-disk length in bytes. `0` means "marked non-contributing" (I2);
    /// the record is never freed, only skipped.
    pub reclen: u32,

    pub start: Nstime,
    pub end: Nstime,
    pub sample_rate: f64,
    pub pubversion: u8,
    pub encoding: Encoding,

    /// `{new_start, new_end}`, either possibly unset (I3).
    pub new_start: Option<Nstime>,
    pub new_end: Option<Nstime>,

    /// Effective intersection of matching selection windows (§4.3).
    pub select_start: Option<Nstime>,
    pub select_end: Option<Nstime>,
}

impl Record {
    #[must_use]
    pub fn new(
        file: FileId,
        offset: u64,
        reclen: u32,
        start: Nstime,
        end: Nstime,
        sample_rate: f64,
        pubversion: u8,
        encoding: Encoding,
    ) -> Self {
        Self {
            file,
            offset,
            reclen,
            start,
            end,
            sample_rate,
            pubversion,
            encoding,
            new_start: None,
            new_end: None,
            select_start: None,
            select_end: None,
        }
    }

    #[must_use]
    pub fn is_contributing(&self) -> bool {
        self.reclen > 0
    }

    pub fn mark_non_contributing(&mut self) {
        self.reclen = 0;
    }

    /// `effective(r)` from spec.md's glossary: TrimBound applied to the
    /// original interval, further intersected with SelectBound.
    #[must_use]
    pub fn effective_interval(&self) -> (Nstime, Nstime) {
        let mut s = self.new_start.unwrap_or(self.start);
        let mut e = self.new_end.unwrap_or(self.end);
        if let Some(ss) = self.select_start {
            if ss > s {
                s = ss;
            }
        }
        if let Some(se) = self.select_end {
            if se < e {
                e = se;
            }
        }
        (s, e)
    }

    #[must_use]
    pub fn effective_start(&self) -> Nstime {
        self.effective_interval().0
    }

    /// Checks I3: TrimBound endpoints must lie within the original
    /// interval and, if both set, be correctly ordered.
    #[must_use]
    pub fn trim_bound_is_sane(&self) -> bool {
        if let Some(ns) = self.new_start {
            if ns < self.start || ns > self.end {
                return false;
            }
        }
        if let Some(ne) = self.new_end {
            if ne < self.start || ne > self.end {
                return false;
            }
        }
        if let (Some(ns), Some(ne)) = (self.new_start, self.new_end) {
            if ns > ne {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn t(n: i64) -> Nstime {
        Nstime::from_nanos(n)
    }

    fn base_record() -> Record {
        Record::new(FileId(0), 0, 512, t(0), t(100), 100.0, 1, Encoding::Int32)
    }

    #[test]
    fn effective_interval_defaults_to_original() {
        let r = base_record();
        assert_eq!(r.effective_interval(), (t(0), t(100)));
    }

    #[test]
    fn trim_bound_narrows_effective_interval() {
        let mut r = base_record();
        r.new_start = Some(t(10));
        r.new_end = Some(t(90));
        assert_eq!(r.effective_interval(), (t(10), t(90)));
    }

    #[test]
    fn select_bound_further_narrows() {
        let mut r = base_record();
        r.new_start = Some(t(10));
        r.select_start = Some(t(20));
        r.select_end = Some(t(50));
        assert_eq!(r.effective_interval(), (t(20), t(50)));
    }

    #[test]
    fn trim_bound_sanity_rejects_inversion() {
        let mut r = base_record();
        r.new_start = Some(t(90));
        r.new_end = Some(t(10));
        assert!(!r.trim_bound_is_sane());
    }

    #[test]
    fn trim_bound_sanity_rejects_out_of_range() {
        let mut r = base_record();
        r.new_start = Some(t(-5));
        assert!(!r.trim_bound_is_sane());
    }
}
