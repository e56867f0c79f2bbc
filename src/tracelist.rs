//! Trace View (spec.md §4.2): builds and owns `TraceList → TraceID →
//! Segment → RecordList`, the central data structure every other
//! component operates over.

use crate::codec::Encoding;
use crate::config::Config;
use crate::fileref::{FileId, FileRef};
use crate::record::{Record, RecordId};
use crate::recordlist::RecordList;
use crate::segment::Segment;
use crate::sourceid::SourceId;
use crate::time::Nstime;
use crate::traceid::TraceId;

/// Where a new record landed relative to an existing Segment (§4.2).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Whence {
    NewSegment,
    Append,
    /// Counts as a reorder event for diagnostics (SPEC_FULL.md §2).
    Prepend,
}

pub struct TraceList {
    pub file_refs: Vec<FileRef>,
    pub records: Vec<Record>,
    pub trace_ids: Vec<TraceId>,
    next_segment_order: u32,
}

impl Default for TraceList {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            file_refs: Vec::new(),
            records: Vec::new(),
            trace_ids: Vec::new(),
            next_segment_order: 0,
        }
    }

    pub fn add_file(&mut self, file_ref: FileRef) -> FileId {
        self.file_refs.push(file_ref);
        FileId(self.file_refs.len() - 1)
    }

    pub fn record(&self, id: RecordId) -> &Record {
        &self.records[id.0]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut Record {
        &mut self.records[id.0]
    }

    fn find_trace_id(&self, source_id: &SourceId, pubversion: u8) -> Option<usize> {
        self.trace_ids
            .iter()
            .position(|t| t.source_id == *source_id && t.pubversion == pubversion)
    }

    /// Classifies how `record_start..record_end` relates to `segment`,
    /// given an already-tolerable sample rate.
    #[must_use]
    pub fn whence_of(segment: &Segment, record_start: Nstime, record_end: Nstime, timetol: i64) -> Whence {
        let period = segment.sample_period_ns();
        let expected_after_end = segment.end.saturating_add(period);
        let gap_end = (record_start.as_nanos() - expected_after_end.as_nanos()).abs();
        let expected_before_start = segment.start.saturating_sub(period);
        let gap_start = (record_end.as_nanos() - expected_before_start.as_nanos()).abs();

        let end_ok = gap_end <= timetol;
        let start_ok = gap_start <= timetol;

        match (end_ok, start_ok) {
            (true, true) => {
                if gap_end <= gap_start {
                    Whence::Append
                } else {
                    Whence::Prepend
                }
            }
            (true, false) => Whence::Append,
            (false, true) => Whence::Prepend,
            (false, false) => Whence::NewSegment,
        }
    }

    /// Inserts a parsed miniSEED record into the Trace View, creating a
    /// TraceID/Segment as needed. Returns the record's id, the owning
    /// trace/segment indices, and the fit classification.
    #[allow(clippy::too_many_arguments)]
    pub fn add_record(
        &mut self,
        source_id: SourceId,
        pubversion: u8,
        file: FileId,
        offset: u64,
        reclen: u32,
        start: Nstime,
        end: Nstime,
        sample_rate: f64,
        encoding: Encoding,
        config: &Config,
    ) -> (RecordId, usize, usize, Whence) {
        self.add_record_with_trim(
            source_id, pubversion, file, offset, reclen, start, end, sample_rate, encoding, config, None, None,
        )
    }

    /// Like [`TraceList::add_record`], but takes a TrimBound to apply to the
    /// new Record immediately rather than after insertion. Used by the
    /// boundary-split path (spec.md §4.2): a split piece's fit against
    /// existing Segments, and the Segment bounds it then contributes to,
    /// must be judged by its own (trimmed) effective interval, not by the
    /// full extent of the physical on-disk record every piece shares —
    /// otherwise every piece of one input record looks identical to
    /// `whence_of` and to the Coverage Analyzer.
    #[allow(clippy::too_many_arguments)]
    pub fn add_record_with_trim(
        &mut self,
        source_id: SourceId,
        pubversion: u8,
        file: FileId,
        offset: u64,
        reclen: u32,
        start: Nstime,
        end: Nstime,
        sample_rate: f64,
        encoding: Encoding,
        config: &Config,
        new_start: Option<Nstime>,
        new_end: Option<Nstime>,
    ) -> (RecordId, usize, usize, Whence) {
        let trace_idx = self.find_trace_id(&source_id, pubversion).unwrap_or_else(|| {
            self.trace_ids.push(TraceId::new(source_id.clone(), pubversion));
            self.trace_ids.len() - 1
        });

        let fit_start = new_start.unwrap_or(start);
        let fit_end = new_end.unwrap_or(end);

        let period = crate::time::sample_period_ns(sample_rate);
        let timetol = config.time_tolerance(period);

        let mut best: Option<(usize, Whence)> = None;
        for (seg_idx, seg) in self.trace_ids[trace_idx].segments.iter().enumerate() {
            if !config.rates_tolerable(seg.sample_rate, sample_rate) {
                continue;
            }
            let whence = Self::whence_of(seg, fit_start, fit_end, timetol);
            if whence != Whence::NewSegment {
                best = Some((seg_idx, whence));
                break;
            }
        }

        let mut record = Record::new(file, offset, reclen, start, end, sample_rate, pubversion, encoding);
        record.new_start = new_start;
        record.new_end = new_end;
        self.records.push(record);
        let record_id = RecordId(self.records.len() - 1);

        let (seg_idx, whence) = match best {
            Some((seg_idx, whence)) => {
                let seg = &mut self.trace_ids[trace_idx].segments[seg_idx];
                match whence {
                    Whence::Append => {
                        seg.records.push(record_id);
                        seg.end = seg.end.max(fit_end);
                    }
                    Whence::Prepend => {
                        seg.records.prepend(record_id);
                        seg.start = seg.start.min(fit_start);
                        self.file_refs[file.0].note_reorder();
                    }
                    Whence::NewSegment => unreachable!(),
                }
                (seg_idx, whence)
            }
            None => {
                let order = self.next_segment_order;
                self.next_segment_order += 1;
                let mut seg = Segment::new(fit_start, fit_end, sample_rate, order);
                seg.records.push(record_id);
                self.trace_ids[trace_idx].segments.push(seg);
                (self.trace_ids[trace_idx].segments.len() - 1, Whence::NewSegment)
            }
        };

        (record_id, trace_idx, seg_idx, whence)
    }

    /// Record Writer's regroup pass (§4.6): walks the TraceList, grouping
    /// consecutive TraceIDs by SourceID (ignoring pub-version), and
    /// flattens each group's Segment-level RecordLists into a single
    /// ID-level list, dropping `reclen = 0` entries along the way.
    ///
    /// TraceIDs are sorted by `(SourceID, pubversion)` first so that
    /// "consecutive... share SourceID" is well defined regardless of
    /// ingest order.
    pub fn regroup_by_source(&mut self) -> Vec<(SourceId, RecordList)> {
        self.trace_ids
            .sort_by(|a, b| a.source_id.cmp(&b.source_id).then(a.pubversion.cmp(&b.pubversion)));

        let mut groups: Vec<(SourceId, RecordList)> = Vec::new();
        for trace in &mut self.trace_ids {
            let mut combined = RecordList::new();
            for seg in &mut trace.segments {
                let ids: Vec<RecordId> = seg
                    .records
                    .iter()
                    .filter(|id| self.records[id.0].is_contributing())
                    .collect();
                combined.append(&mut RecordList::from_vec(ids));
                seg.records = RecordList::new();
            }

            match groups.last_mut() {
                Some((source_id, list)) if *source_id == trace.source_id => {
                    list.append(&mut combined);
                }
                _ => groups.push((trace.source_id.clone(), combined)),
            }
            trace.write_list = Some(RecordList::new());
        }
        groups
    }
}
