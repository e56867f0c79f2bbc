//! miniSEED v3: 40-byte fixed header, embedded CRC-32, identifier and
//! extra-headers JSON blob.
//!
//! v3 drops the v2 notion of a separate blockette chain in favor of a flat
//! header plus a variable-length FDSN source identifier and a JSON extra
//! headers blob. Both are carried here as opaque byte ranges and round-trip
//! unmodified, since nothing in this crate needs to interpret extra-header
//! content (spec.md's capability set has no hook for it).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use super::steim::{decode_steim1, decode_steim2, encode_steim1, encode_steim2};
use super::{header_crc32, Encoding, MiniseedRecord, Samples};
use crate::sourceid::SourceId;
use crate::time::Nstime;

const FIXED_HEADER_LEN: usize = 40;

/// Byte offset of the CRC-32 field within the fixed header. Exposed so the
/// Writer can recompute it in place after a `-Q` version/quality re-stamp
/// (spec.md §4.6 step 4) without unpacking and repacking the whole record.
pub const CRC_OFFSET: usize = 28;

/// Byte offset of the publication-version field, for the same reason.
pub const PUBVERSION_OFFSET: usize = 32;

#[derive(Clone, Debug)]
pub struct RecordHeader {
    pub flags: u8,
    pub start_time: Nstime,
    pub encoding: Encoding,
    pub sample_rate_period: f64,
    pub sample_count: u32,
    pub publication_version: u8,
    pub identifier: String,
    pub extra_headers: Vec<u8>,
    pub data_offset: usize,
    pub data_length: u32,
}

impl RecordHeader {
    fn rate_to_period_ns(v: f64) -> i64 {
        if v == 0.0 {
            0
        } else if v > 0.0 {
            crate::time::sample_period_ns(v)
        } else {
            (-v * crate::time::NSTMODULUS as f64).round() as i64
        }
    }
}

impl MiniseedRecord for RecordHeader {
    fn parse_header(buf: &[u8]) -> crate::Result<Self> {
        if buf.len() < FIXED_HEADER_LEN || &buf[0..2] != b"MS" {
            return Err(crate::Error::Codec("not a miniSEED v3 record".into()));
        }
        if buf[2] != 3 {
            return Err(crate::Error::Codec(format!(
                "unsupported miniSEED format version {}",
                buf[2]
            )));
        }

        let flags = buf[3];
        let mut c = Cursor::new(&buf[4..]);
        let nanosecond = c.read_u32::<LittleEndian>()?;
        let year = c.read_u16::<LittleEndian>()?;
        let day_of_year = c.read_u16::<LittleEndian>()?;
        let hour = c.read_u8()?;
        let minute = c.read_u8()?;
        let second = c.read_u8()?;
        let encoding_code = c.read_u8()?;
        let sample_rate_period = c.read_f64::<LittleEndian>()?;
        let sample_count = c.read_u32::<LittleEndian>()?;
        let stored_crc = c.read_u32::<LittleEndian>()?;
        let publication_version = c.read_u8()?;
        let sid_len = c.read_u8()? as usize;
        let eh_len = c.read_u16::<LittleEndian>()? as usize;
        let data_length = c.read_u32::<LittleEndian>()?;

        let start_time = Nstime::from_calendar(
            i32::from(year),
            u32::from(day_of_year),
            u32::from(hour),
            u32::from(minute),
            u32::from(second),
            nanosecond,
        )?;

        let sid_start = FIXED_HEADER_LEN;
        let sid_end = sid_start + sid_len;
        let eh_end = sid_end + eh_len;
        let data_offset = eh_end;
        if buf.len() < data_offset {
            return Err(crate::Error::Codec(
                "v3 record truncated before data payload".into(),
            ));
        }

        let identifier = String::from_utf8(buf[sid_start..sid_end].to_vec())
            .map_err(|_| crate::Error::Codec("v3 source identifier is not UTF-8".into()))?;
        let extra_headers = buf[sid_end..eh_end].to_vec();

        if data_offset + data_length as usize <= buf.len() {
            let computed = header_crc32(&buf[..data_offset + data_length as usize], CRC_OFFSET);
            if computed != stored_crc {
                return Err(crate::Error::Codec(format!(
                    "v3 CRC mismatch: stored {stored_crc:#010x}, computed {computed:#010x}"
                )));
            }
        }

        Ok(Self {
            flags,
            start_time,
            encoding: Encoding::from_code(encoding_code),
            sample_rate_period,
            sample_count,
            publication_version,
            identifier,
            extra_headers,
            data_offset,
            data_length,
        })
    }

    fn source_id_of(&self) -> SourceId {
        // FDSN source identifiers are `FDSN:NET_STA_LOC_CHAN[_...]`; fall
        // back to the raw identifier split on '_' when the `FDSN:` prefix
        // is absent so malformed-but-parseable ids still work.
        let rest = self.identifier.strip_prefix("FDSN:").unwrap_or(&self.identifier);
        let parts: Vec<&str> = rest.splitn(4, '_').collect();
        if parts.len() == 4 {
            SourceId::new(parts[0], parts[1], parts[2], parts[3])
        } else {
            SourceId::new("", "", "", self.identifier.clone())
        }
    }

    fn encoding_of(&self) -> Encoding {
        self.encoding
    }

    fn sample_period_of(&self) -> i64 {
        Self::rate_to_period_ns(self.sample_rate_period)
    }

    fn start_time(&self) -> Nstime {
        self.start_time
    }

    fn publication_version(&self) -> u8 {
        self.publication_version
    }

    fn endtime_of(&self) -> Nstime {
        if self.sample_count <= 1 {
            return self.start_time;
        }
        let period = self.sample_period_of();
        self.start_time
            .saturating_add(period * i64::from(self.sample_count - 1))
    }

    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn record_length(&self) -> u32 {
        (self.data_offset as u32) + self.data_length
    }

    fn decode_samples(&self, record_buf: &[u8]) -> crate::Result<Samples> {
        let data = &record_buf[self.data_offset..self.data_offset + self.data_length as usize];
        let n = self.sample_count as usize;
        match self.encoding {
            Encoding::Int16 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(i32::from(c.read_i16::<LittleEndian>()?));
                }
                Ok(Samples::Int(v))
            }
            Encoding::Int32 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(c.read_i32::<LittleEndian>()?);
                }
                Ok(Samples::Int(v))
            }
            Encoding::Float32 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(c.read_f32::<LittleEndian>()?);
                }
                Ok(Samples::Float32(v))
            }
            Encoding::Float64 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(c.read_f64::<LittleEndian>()?);
                }
                Ok(Samples::Float64(v))
            }
            Encoding::Steim1 => Ok(Samples::Int(decode_steim1(data, n)?)),
            Encoding::Steim2 => Ok(Samples::Int(decode_steim2(data, n)?)),
            Encoding::Other(code) => Err(crate::Error::UnsupportedEncoding(Encoding::Other(code))),
        }
    }

    fn pack_record(
        &self,
        new_start: Nstime,
        samples: &Samples,
        out: &mut Vec<u8>,
    ) -> crate::Result<()> {
        if !self.encoding.supported_for_trim() {
            return Err(crate::Error::UnsupportedEncoding(self.encoding));
        }

        let mut payload = Vec::new();
        match (self.encoding, samples) {
            (Encoding::Int16, Samples::Int(v)) => {
                for s in v {
                    payload.write_i16::<LittleEndian>(*s as i16)?;
                }
            }
            (Encoding::Int32, Samples::Int(v)) => {
                for s in v {
                    payload.write_i32::<LittleEndian>(*s)?;
                }
            }
            (Encoding::Float32, Samples::Float32(v)) => {
                for s in v {
                    payload.write_f32::<LittleEndian>(*s)?;
                }
            }
            (Encoding::Float64, Samples::Float64(v)) => {
                for s in v {
                    payload.write_f64::<LittleEndian>(*s)?;
                }
            }
            (Encoding::Steim1, Samples::Int(v)) => payload = encode_steim1(v),
            (Encoding::Steim2, Samples::Int(v)) => payload = encode_steim2(v),
            _ => {
                return Err(crate::Error::Codec(
                    "sample payload does not match record encoding".into(),
                ))
            }
        }

        let (year, doy, hour, minute, second, nanos) = new_start.to_calendar();

        let mut header = Vec::with_capacity(FIXED_HEADER_LEN);
        header.extend_from_slice(b"MS");
        header.push(3);
        header.push(self.flags);
        header.write_u32::<LittleEndian>(nanos)?;
        header.write_u16::<LittleEndian>(year as u16)?;
        header.write_u16::<LittleEndian>(doy as u16)?;
        header.push(hour as u8);
        header.push(minute as u8);
        header.push(second as u8);
        header.push(self.encoding.to_code());
        header.write_f64::<LittleEndian>(self.sample_rate_period)?;
        header.write_u32::<LittleEndian>(samples.len() as u32)?;
        header.write_u32::<LittleEndian>(0)?; // CRC placeholder
        header.push(self.publication_version);
        header.push(self.identifier.len() as u8);
        header.write_u16::<LittleEndian>(self.extra_headers.len() as u16)?;
        header.write_u32::<LittleEndian>(payload.len() as u32)?;

        header.extend_from_slice(self.identifier.as_bytes());
        header.extend_from_slice(&self.extra_headers);
        header.extend_from_slice(&payload);

        let data_offset = FIXED_HEADER_LEN + self.identifier.len() + self.extra_headers.len();
        let crc = header_crc32(&header, CRC_OFFSET);
        header[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        debug_assert_eq!(data_offset + payload.len(), header.len());

        out.extend_from_slice(&header);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn build_record(identifier: &str, extra_headers: &[u8], samples: &[i32]) -> Vec<u8> {
        let mut payload = Vec::new();
        for s in samples {
            payload.extend_from_slice(&s.to_le_bytes());
        }

        let mut header = Vec::new();
        header.extend_from_slice(b"MS");
        header.push(3);
        header.push(0);
        header.extend_from_slice(&0u32.to_le_bytes()); // nanosecond
        header.extend_from_slice(&2020u16.to_le_bytes());
        header.extend_from_slice(&100u16.to_le_bytes());
        header.push(0);
        header.push(0);
        header.push(0);
        header.push(Encoding::Int32.to_code());
        header.extend_from_slice(&100.0f64.to_le_bytes());
        header.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes()); // crc placeholder
        header.push(1); // publication version
        header.push(identifier.len() as u8);
        header.extend_from_slice(&(extra_headers.len() as u16).to_le_bytes());
        header.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        header.extend_from_slice(identifier.as_bytes());
        header.extend_from_slice(extra_headers);
        header.extend_from_slice(&payload);

        let crc = header_crc32(&header, CRC_OFFSET);
        header[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        header
    }

    #[test]
    fn parses_header_and_validates_crc() -> crate::Result<()> {
        let buf = build_record("FDSN:NE_STA_00_BHZ", b"{}", &[1, 2, 3, 4]);
        let header = RecordHeader::parse_header(&buf)?;
        assert_eq!(header.sample_count, 4);
        assert_eq!(header.publication_version, 1);
        let sid = header.source_id_of();
        assert_eq!(sid.network, "NE");
        assert_eq!(sid.station, "STA");
        assert_eq!(sid.location, "00");
        assert_eq!(sid.channel, "BHZ");
        Ok(())
    }

    #[test]
    fn rejects_tampered_crc() {
        let mut buf = build_record("FDSN:NE_STA_00_BHZ", b"{}", &[1, 2, 3, 4]);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(RecordHeader::parse_header(&buf).is_err());
    }

    #[test]
    fn decodes_int32_samples() -> crate::Result<()> {
        let buf = build_record("FDSN:NE_STA_00_BHZ", b"{}", &[10, -20, 30, -40]);
        let header = RecordHeader::parse_header(&buf)?;
        let samples = header.decode_samples(&buf)?;
        assert_eq!(samples, Samples::Int(vec![10, -20, 30, -40]));
        Ok(())
    }

    #[test]
    fn pack_record_preserves_identifier_and_extra_headers() -> crate::Result<()> {
        let buf = build_record("FDSN:NE_STA_00_BHZ", b"{\"k\":1}", &[1, 2, 3, 4, 5]);
        let header = RecordHeader::parse_header(&buf)?;

        let trimmed = Samples::Int(vec![2, 3, 4]);
        let new_start = header.start_time.saturating_add(header.sample_period_of());
        let mut out = Vec::new();
        header.pack_record(new_start, &trimmed, &mut out)?;

        let repacked = RecordHeader::parse_header(&out)?;
        assert_eq!(repacked.sample_count, 3);
        assert_eq!(repacked.identifier, "FDSN:NE_STA_00_BHZ");
        assert_eq!(repacked.extra_headers, b"{\"k\":1}");
        let decoded = repacked.decode_samples(&out)?;
        assert_eq!(decoded, trimmed);
        Ok(())
    }
}
