//! Record Writer (spec.md §4.6): regroup, stable-sort, read back, trim,
//! re-stamp and emit every surviving record to its configured sink(s).

pub mod sink;

use std::fmt;

use rustc_hash::FxHashMap;

use crate::archive::ExpandedFields;
use crate::codec::{v2, v3, AnyRecord, MiniseedRecord};
use crate::config::{Config, VersionOverride};
use crate::mergesort::mergesort_by_key;
use crate::sourceid::SourceId;
use crate::time::Nstime;
use crate::tracelist::TraceList;
use sink::SinkHandle;

/// One line of the `-out` summary (spec.md §6): "SOURCEID|PUBVER|STARTTIME|
/// ENDTIME|BYTES_WRITTEN|SAMPLE_COUNT".
#[derive(Clone, Debug)]
pub struct SummaryEntry {
    pub source_id: SourceId,
    pub pubversion: u8,
    pub start: Nstime,
    pub end: Nstime,
    pub bytes_written: u64,
    pub sample_count: u64,
}

impl SummaryEntry {
    fn new(source_id: SourceId, pubversion: u8) -> Self {
        Self {
            source_id,
            pubversion,
            start: Nstime::from_nanos(i64::MAX),
            end: Nstime::from_nanos(i64::MIN),
            bytes_written: 0,
            sample_count: 0,
        }
    }

    fn observe(&mut self, start: Nstime, end: Nstime, bytes: u64, samples: u64) {
        self.start = self.start.min(start);
        self.end = self.end.max(end);
        self.bytes_written += bytes;
        self.sample_count += samples;
    }

    /// Renders one line, with `prefix` prepended as spec.md §6 describes
    /// (`-outprefix STR`).
    #[must_use]
    pub fn to_line(&self, prefix: &str) -> String {
        format!(
            "{prefix}{}|{}|{}|{}|{}|{}",
            self.source_id, self.pubversion, self.start, self.end, self.bytes_written, self.sample_count
        )
    }
}

impl fmt::Display for SummaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line(""))
    }
}

/// Walks every regrouped, sorted ID-level RecordList and streams surviving
/// records to every configured sink. Returns one [`SummaryEntry`] per
/// `(SourceId, pubversion)` pair actually written.
pub fn write_traces(tl: &mut TraceList, config: &Config, sinks: &mut [SinkHandle]) -> crate::Result<Vec<SummaryEntry>> {
    let groups = tl.regroup_by_source();
    let mut summaries: Vec<SummaryEntry> = Vec::new();

    for (source_id, list) in groups {
        let mut ids = list.into_vec();
        // Spec.md §4.6: "For each ID-level list that had overlaps pruned,
        // stable-sort...". Sorting an already-ordered list is a no-op under
        // a stable mergesort, so applying it unconditionally keeps output
        // order deterministic regardless of whether pruning actually ran,
        // without special-casing prune mode here.
        mergesort_by_key(&mut ids, |rid| tl.record(*rid).effective_start());

        let mut per_version: FxHashMap<u8, SummaryEntry> = FxHashMap::default();

        for rid in ids {
            let record = tl.record(rid).clone();

            let mut buf = Vec::new();
            tl.file_refs[record.file.0].read_at(record.offset, record.reclen, &mut buf)?;

            let header = match AnyRecord::parse_header(&buf) {
                Ok(h) => h,
                Err(err) => {
                    log::warn!("{source_id}: could not re-parse a previously-ingested record at write time: {err}");
                    continue;
                }
            };

            let has_trim_bound = record.new_start.is_some() || record.new_end.is_some();
            let mut bytes = buf;
            let mut sample_count = u64::from(header.sample_count());
            let mut degrade_rest_of_id = false;

            if has_trim_bound {
                match trim(&header, &bytes, record.new_start, record.new_end) {
                    Ok(Some((out, count))) => {
                        bytes = out;
                        sample_count = count as u64;
                    }
                    Ok(None) => continue, // all samples dropped: nothing to emit
                    Err(err) => {
                        log::warn!(
                            "{source_id}: trim failed ({err}), emitting the untrimmed record and skipping the rest of this source id"
                        );
                        degrade_rest_of_id = true;
                    }
                }
            }

            let final_pubversion = match config.version_override {
                None => record.pubversion,
                Some(VersionOverride::Numeric(n)) => n,
                Some(VersionOverride::Quality(q)) => v2::quality_priority(q),
            };
            if config.version_override.is_some() {
                apply_version_override(&mut bytes, &header, config.version_override.unwrap());
            }

            let (eff_start, eff_end) = record.effective_interval();
            let fields = ExpandedFields {
                source_id: source_id.clone(),
                time: eff_start,
                pubversion: final_pubversion,
                legacy_quality: header.legacy_quality_byte(),
                record_length: bytes.len() as u32,
                sample_rate: record.sample_rate,
            };

            for s in sinks.iter_mut() {
                s.write_record(&fields, &bytes)?;
            }

            tl.file_refs[record.file.0].note_written(eff_start, eff_end, bytes.len() as u64);

            per_version
                .entry(final_pubversion)
                .or_insert_with(|| SummaryEntry::new(source_id.clone(), final_pubversion))
                .observe(eff_start, eff_end, bytes.len() as u64, sample_count);

            if degrade_rest_of_id {
                break;
            }
        }

        summaries.extend(per_version.into_values());
    }

    log_reorder_diagnostics(tl, config);
    Ok(summaries)
}

/// `trim(record, buffer)` (spec.md §4.6). `None` means "skip": every
/// sample was trimmed away. An `Err` means the record's encoding could not
/// be decoded/repacked at all (degrade-and-continue is the caller's job).
fn trim(
    header: &AnyRecord,
    buf: &[u8],
    new_start_bound: Option<Nstime>,
    new_end_bound: Option<Nstime>,
) -> crate::Result<Option<(Vec<u8>, usize)>> {
    if !header.encoding_of().supported_for_trim() {
        return Err(crate::Error::UnsupportedEncoding(header.encoding_of()));
    }

    let mut samples = header.decode_samples(buf)?;
    if samples.is_empty() {
        return Ok(None);
    }

    let period = header.sample_period_of();
    let mut start = header.start_time();

    if let Some(ns) = new_start_bound {
        if period > 0 {
            let mut dropped = 0usize;
            while dropped < samples.len() && start < ns {
                start = start.saturating_add(period);
                dropped += 1;
            }
            if dropped >= samples.len() {
                return Ok(None);
            }
            if dropped > 0 {
                samples.drop_front(dropped);
            }
        }
    }

    if let Some(ne) = new_end_bound {
        if period > 0 {
            let mut remaining = samples.len();
            let mut end = start.saturating_add(period * (remaining as i64 - 1));
            let mut dropped = 0usize;
            while remaining > 0 && end > ne {
                end = end.saturating_sub(period);
                remaining -= 1;
                dropped += 1;
            }
            if remaining == 0 {
                return Ok(None);
            }
            if dropped > 0 {
                samples.drop_back(dropped);
            }
        }
    }

    let final_count = samples.len();
    let mut out = Vec::new();
    header.pack_record(start, &samples, &mut out)?;
    Ok(Some((out, final_count)))
}

/// `-Q` re-stamp (spec.md §4.6 step 4): patches the version/quality field
/// of an already-serialized record in place, recomputing the v3 header CRC
/// when applicable. v2 has no CRC to maintain.
fn apply_version_override(bytes: &mut [u8], header: &AnyRecord, override_: VersionOverride) {
    match header {
        AnyRecord::V2(_) => {
            if let VersionOverride::Quality(q) = override_ {
                if v2::QUALITY_OFFSET < bytes.len() {
                    bytes[v2::QUALITY_OFFSET] = q;
                }
            } else {
                log::warn!("-Q with a numeric version has no legacy quality-byte equivalent for a v2 record; left unchanged");
            }
        }
        AnyRecord::V3(_) => {
            let value = match override_ {
                VersionOverride::Numeric(n) => n,
                VersionOverride::Quality(q) => v2::quality_priority(q),
            };
            if v3::PUBVERSION_OFFSET < bytes.len() {
                bytes[v3::PUBVERSION_OFFSET] = value;
            }
            if v3::CRC_OFFSET + 4 <= bytes.len() {
                let crc = crate::codec::header_crc32(bytes, v3::CRC_OFFSET);
                bytes[v3::CRC_OFFSET..v3::CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
            }
        }
    }
}

/// Surfaces per-file reorder counters at verbosity >= 2 (SPEC_FULL.md §2).
fn log_reorder_diagnostics(tl: &TraceList, config: &Config) {
    if config.verbosity < 2 {
        return;
    }
    for file_ref in &tl.file_refs {
        if file_ref.stats.reorder_count > 0 {
            log::info!(
                "{}: {} record(s) arrived out of order",
                file_ref.display_name,
                file_ref.stats.reorder_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoding as Enc;
    use crate::config::PruneMode;
    use crate::fileref::FileRef;
    use crate::sourceid::SourceId;
    use test_log::test;

    fn build_v2_record(start_doy: u32, sample_count: u16, values: &[i32]) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        buf[0..6].copy_from_slice(b"000001");
        buf[6] = b'D';
        buf[7] = b' ';
        buf[8..13].copy_from_slice(b"STA  ");
        buf[13..15].copy_from_slice(b"  ");
        buf[15..18].copy_from_slice(b"BHZ");
        buf[18..20].copy_from_slice(b"NE");
        buf[20..22].copy_from_slice(&2020u16.to_be_bytes());
        buf[22..24].copy_from_slice(&(start_doy as u16).to_be_bytes());
        buf[30..32].copy_from_slice(&sample_count.to_be_bytes());
        buf[32..34].copy_from_slice(&100i16.to_be_bytes());
        buf[34..36].copy_from_slice(&1i16.to_be_bytes());
        buf[39] = 1;
        buf[44..46].copy_from_slice(&64u16.to_be_bytes());
        buf[46..48].copy_from_slice(&48u16.to_be_bytes());
        buf[48..50].copy_from_slice(&1000u16.to_be_bytes());
        buf[50..52].copy_from_slice(&0u16.to_be_bytes());
        buf[52] = Enc::Int32.to_code();
        buf[53] = 1;
        buf[54] = 8; // 256-byte record
        for (i, v) in values.iter().enumerate() {
            buf[64 + i * 4..64 + i * 4 + 4].copy_from_slice(&v.to_be_bytes());
        }
        buf
    }

    fn sid() -> SourceId {
        SourceId::new("NE", "STA", "", "BHZ")
    }

    #[test]
    fn writes_untrimmed_record_to_single_file_sink() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("in.mseed");
        let raw = build_v2_record(100, 4, &[1, 2, 3, 4]);
        std::fs::write(&path, &raw)?;

        let mut tl = TraceList::new();
        let cfg = Config::default();
        let file = tl.add_file(FileRef::new(&path, None));
        tl.add_record(
            sid(),
            2,
            file,
            0,
            256,
            crate::time::Nstime::from_calendar(2020, 100, 0, 0, 0, 0)?,
            crate::time::Nstime::from_calendar(2020, 100, 0, 0, 0, 30_000_000)?,
            100.0,
            Enc::Int32,
            &cfg,
        );

        let out_path = dir.path().join("out.mseed");
        let mut sinks = vec![sink::SinkHandle::from(sink::SingleFileSink::create(&out_path, false)?)];
        let summaries = write_traces(&mut tl, &cfg, &mut sinks)?;
        for s in sinks.iter_mut() {
            s.close()?;
        }

        assert_eq!(std::fs::read(&out_path)?.len(), 256);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].sample_count, 4);
        Ok(())
    }

    #[test]
    fn trimmed_record_shrinks_sample_count() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("in.mseed");
        let raw = build_v2_record(100, 4, &[1, 2, 3, 4]);
        std::fs::write(&path, &raw)?;

        let mut tl = TraceList::new();
        let mut cfg = Config::default();
        cfg.prune_mode = Some(PruneMode::Sample);
        let file = tl.add_file(FileRef::new(&path, None));
        let start = crate::time::Nstime::from_calendar(2020, 100, 0, 0, 0, 0)?;
        let period = crate::time::sample_period_ns(100.0);
        let end = start.saturating_add(period * 3);
        let (rid, ..) = tl.add_record(sid(), 1, file, 0, 256, start, end, 100.0, Enc::Int32, &cfg);
        tl.record_mut(rid).new_start = Some(start.saturating_add(period));

        let out_path = dir.path().join("out.mseed");
        let mut sinks = vec![sink::SinkHandle::from(sink::SingleFileSink::create(&out_path, false)?)];

        let summaries = write_traces(&mut tl, &cfg, &mut sinks)?;
        for s in sinks.iter_mut() {
            s.close()?;
        }

        assert_eq!(summaries[0].sample_count, 3);
        Ok(())
    }

    #[test]
    fn non_contributing_record_is_not_written() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("in.mseed");
        let raw = build_v2_record(100, 4, &[1, 2, 3, 4]);
        std::fs::write(&path, &raw)?;

        let mut tl = TraceList::new();
        let cfg = Config::default();
        let file = tl.add_file(FileRef::new(&path, None));
        let (rid, ..) = tl.add_record(
            sid(),
            1,
            file,
            0,
            256,
            crate::time::Nstime::from_calendar(2020, 100, 0, 0, 0, 0)?,
            crate::time::Nstime::from_calendar(2020, 100, 0, 0, 0, 30_000_000)?,
            100.0,
            Enc::Int32,
            &cfg,
        );
        tl.record_mut(rid).mark_non_contributing();

        let out_path = dir.path().join("out.mseed");
        let mut sinks = vec![sink::SinkHandle::from(sink::SingleFileSink::create(&out_path, false)?)];
        let summaries = write_traces(&mut tl, &cfg, &mut sinks)?;
        for s in sinks.iter_mut() {
            s.close()?;
        }

        assert!(summaries.is_empty());
        assert_eq!(std::fs::read(&out_path)?.len(), 0);
        Ok(())
    }

    #[test]
    fn summary_line_format_matches_spec() {
        let mut entry = SummaryEntry::new(sid(), 2);
        entry.observe(Nstime::from_nanos(0), Nstime::from_nanos(1), 512, 100);
        let line = entry.to_line("PREFIX:");
        assert!(line.starts_with("PREFIX:NE.STA..BHZ|2|"));
        assert!(line.ends_with("|512|100"));
    }

    #[test]
    fn version_override_quality_patches_v2_byte_in_place() -> crate::Result<()> {
        let raw = build_v2_record(100, 4, &[1, 2, 3, 4]);
        let header = crate::codec::AnyRecord::parse_header(&raw)?;
        let mut bytes = raw.clone();
        apply_version_override(&mut bytes, &header, crate::config::VersionOverride::Quality(b'M'));
        assert_eq!(bytes[v2::QUALITY_OFFSET], b'M');
        // Everything outside the patched byte is untouched.
        assert_eq!(bytes[..v2::QUALITY_OFFSET], raw[..v2::QUALITY_OFFSET]);
        Ok(())
    }
}
