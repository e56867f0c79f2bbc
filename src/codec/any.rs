//! Format auto-detection: a miniSEED stream may interleave version 2 and
//! version 3 records (the original tool's ingest loop re-detects the
//! version at every record boundary, never assumes a file is homogeneous).

use super::{v2, v3, Encoding, MiniseedRecord, Samples};
use crate::sourceid::SourceId;
use crate::time::Nstime;

/// Either miniSEED header version, picked by [`detect_version`] and
/// delegated to uniformly through [`MiniseedRecord`].
#[derive(Clone, Debug)]
pub enum AnyRecord {
    V2(v2::RecordHeader),
    V3(v3::RecordHeader),
}

/// Looks at the first few bytes of a candidate record and decides which
/// parser to hand them to. v3 records start with the two-byte magic `MS`
/// followed by a version byte of `3`; anything else is assumed to be a v2
/// fixed header (spec.md §6: "Input record format: miniSEED format
/// version 2 or 3").
#[must_use]
pub fn detect_version(buf: &[u8]) -> Option<u8> {
    if buf.len() >= 3 && &buf[0..2] == b"MS" {
        return Some(buf[2]);
    }
    if buf.len() >= 7 && buf[0..6].iter().all(u8::is_ascii_digit) && buf[6].is_ascii_alphabetic() {
        return Some(2);
    }
    None
}

impl MiniseedRecord for AnyRecord {
    fn parse_header(buf: &[u8]) -> crate::Result<Self> {
        match detect_version(buf) {
            Some(3) => Ok(Self::V3(v3::RecordHeader::parse_header(buf)?)),
            Some(2) => Ok(Self::V2(v2::RecordHeader::parse_header(buf)?)),
            Some(other) => Err(crate::Error::Codec(format!(
                "unsupported miniSEED format version {other}"
            ))),
            None => Err(crate::Error::Codec(
                "buffer does not start with a recognizable miniSEED record".into(),
            )),
        }
    }

    fn source_id_of(&self) -> SourceId {
        match self {
            Self::V2(h) => h.source_id_of(),
            Self::V3(h) => h.source_id_of(),
        }
    }

    fn encoding_of(&self) -> Encoding {
        match self {
            Self::V2(h) => h.encoding_of(),
            Self::V3(h) => h.encoding_of(),
        }
    }

    fn sample_period_of(&self) -> i64 {
        match self {
            Self::V2(h) => h.sample_period_of(),
            Self::V3(h) => h.sample_period_of(),
        }
    }

    fn start_time(&self) -> Nstime {
        match self {
            Self::V2(h) => h.start_time(),
            Self::V3(h) => h.start_time(),
        }
    }

    fn publication_version(&self) -> u8 {
        match self {
            Self::V2(h) => h.publication_version(),
            Self::V3(h) => h.publication_version(),
        }
    }

    fn endtime_of(&self) -> Nstime {
        match self {
            Self::V2(h) => h.endtime_of(),
            Self::V3(h) => h.endtime_of(),
        }
    }

    fn sample_count(&self) -> u32 {
        match self {
            Self::V2(h) => h.sample_count(),
            Self::V3(h) => h.sample_count(),
        }
    }

    fn record_length(&self) -> u32 {
        match self {
            Self::V2(h) => h.record_length(),
            Self::V3(h) => h.record_length(),
        }
    }

    fn decode_samples(&self, record_buf: &[u8]) -> crate::Result<Samples> {
        match self {
            Self::V2(h) => h.decode_samples(record_buf),
            Self::V3(h) => h.decode_samples(record_buf),
        }
    }

    fn pack_record(&self, new_start: Nstime, samples: &Samples, out: &mut Vec<u8>) -> crate::Result<()> {
        match self {
            Self::V2(h) => h.pack_record(new_start, samples, out),
            Self::V3(h) => h.pack_record(new_start, samples, out),
        }
    }
}

impl AnyRecord {
    /// `true` for a v2 record whose legacy quality letter should be
    /// carried through the archive template's `%q`/`-Q` quality path
    /// (spec.md §6); v3 records already carry a numeric publication
    /// version so this is always `false` for them.
    #[must_use]
    pub fn is_legacy_quality(&self) -> bool {
        matches!(self, Self::V2(_))
    }

    /// The raw one-letter quality byte for a v2 record, or `None` for v3
    /// (which has no separate quality field — `%q` falls back to the
    /// numeric publication version there, spec.md §6).
    #[must_use]
    pub fn legacy_quality_byte(&self) -> Option<u8> {
        match self {
            Self::V2(h) => Some(h.quality),
            Self::V3(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn detects_v3_magic() {
        let mut buf = vec![0u8; 10];
        buf[0..2].copy_from_slice(b"MS");
        buf[2] = 3;
        assert_eq!(detect_version(&buf), Some(3));
    }

    #[test]
    fn detects_v2_sequence_number_pattern() {
        let mut buf = vec![0u8; 10];
        buf[0..6].copy_from_slice(b"000001");
        buf[6] = b'D';
        assert_eq!(detect_version(&buf), Some(2));
    }

    #[test]
    fn rejects_noise() {
        let buf = vec![0xFFu8; 16];
        assert_eq!(detect_version(&buf), None);
    }
}
