//! miniSEED v2: 48-byte fixed header plus blockette 1000.
//!
//! Field layout and the BTIME/sample-rate encodings follow the SEED manual
//! as implemented by the original `dataselect` tool's `libmseed`
//! dependency (`examples/original_source/src/dataselect.c` treats records
//! opaquely via that library; this module is the concrete stand-in
//! SPEC_FULL.md §4 calls for).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use super::steim::{decode_steim1, decode_steim2, encode_steim1, encode_steim2};
use super::{Encoding, MiniseedRecord, Samples};
use crate::sourceid::SourceId;
use crate::time::{Nstime, NSTMODULUS};

const FIXED_HEADER_LEN: usize = 48;
const BLOCKETTE1000_LEN: usize = 8;

/// Byte offset of the legacy one-letter data-quality indicator within the
/// fixed header, for the Writer's in-place `-Q` re-stamp (spec.md §4.6
/// step 4). v2 has no CRC to recompute afterward.
pub const QUALITY_OFFSET: usize = 6;

/// Maps the legacy one-letter data-quality indicator to the numeric
/// publication-version priority SPEC_FULL.md §2 defines, shared with the
/// archive template's `%q`.
#[must_use]
pub fn quality_priority(quality: u8) -> u8 {
    match quality {
        b'R' => 1,
        b'D' => 2,
        b'Q' => 3,
        b'M' => 4,
        _ => 0,
    }
}

#[derive(Clone, Debug)]
pub struct RecordHeader {
    /// The fixed header's 6-digit ASCII sequence number, carried through
    /// `pack_record` unchanged so a trimmed v2 record round-trips it
    /// (spec.md §4.6: "carry the FDSN 6-digit sequence number... into a
    /// parsed extra-header field so it round-trips through the codec").
    pub sequence_number: [u8; 6],
    pub quality: u8,
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub start_time: Nstime,
    pub sample_count: u16,
    pub sample_rate: f64,
    pub encoding: Encoding,
    pub big_endian: bool,
    pub record_length: u32,
    pub data_offset: u16,
}

impl RecordHeader {
    fn btime_to_nstime(buf: &[u8]) -> crate::Result<Nstime> {
        let mut c = Cursor::new(buf);
        let year = c.read_u16::<BigEndian>()?;
        let doy = c.read_u16::<BigEndian>()?;
        let hour = c.read_u8()?;
        let minute = c.read_u8()?;
        let second = c.read_u8()?;
        let _unused = c.read_u8()?;
        let fract = c.read_u16::<BigEndian>()?;
        Nstime::from_calendar(
            i32::from(year),
            u32::from(doy),
            u32::from(hour),
            u32::from(minute),
            u32::from(second).min(59),
            u32::from(fract) * 100_000,
        )
    }

    fn nstime_to_btime(t: Nstime, out: &mut Vec<u8>) -> crate::Result<()> {
        let (year, doy, hour, minute, second, nanos) = t.to_calendar();
        out.write_u16::<BigEndian>(year as u16)?;
        out.write_u16::<BigEndian>(doy as u16)?;
        out.write_u8(hour as u8)?;
        out.write_u8(minute as u8)?;
        out.write_u8(second as u8)?;
        out.write_u8(0)?;
        out.write_u16::<BigEndian>((nanos / 100_000) as u16)?;
        Ok(())
    }

    fn decode_sample_rate(factor: i16, multiplier: i16) -> f64 {
        let mut rate = if factor > 0 {
            f64::from(factor)
        } else if factor < 0 {
            -1.0 / f64::from(factor)
        } else {
            0.0
        };
        if multiplier > 0 {
            rate *= f64::from(multiplier);
        } else if multiplier < 0 {
            rate /= -f64::from(multiplier);
        }
        rate
    }

    /// Picks an exact `(factor, multiplier)` pair when `rate` is a whole
    /// number of Hz or an exact reciprocal; falls back to a millihertz
    /// multiplier otherwise. Good enough for records this crate itself
    /// produces by re-packing a trimmed record at its original rate.
    fn encode_sample_rate(rate: f64) -> (i16, i16) {
        if rate <= 0.0 {
            return (0, 0);
        }
        if rate.fract() == 0.0 && rate <= f64::from(i16::MAX) {
            return (rate as i16, 1);
        }
        if (1.0 / rate).fract() == 0.0 && (1.0 / rate) <= f64::from(i16::MAX) {
            return (-((1.0 / rate) as i16), 1);
        }
        let milli = (rate * 1000.0).round();
        if milli > 0.0 && milli <= f64::from(i16::MAX) {
            return (milli as i16, -1000);
        }
        (rate.round().max(1.0) as i16, 1)
    }
}

impl MiniseedRecord for RecordHeader {
    fn parse_header(buf: &[u8]) -> crate::Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(crate::Error::Codec(
                "buffer shorter than v2 fixed header".into(),
            ));
        }

        let mut sequence_number = [b'0'; 6];
        sequence_number.copy_from_slice(&buf[0..6]);
        let quality = buf[6];
        let station = ascii_field(&buf[8..13]);
        let location = ascii_field(&buf[13..15]);
        let channel = ascii_field(&buf[15..18]);
        let network = ascii_field(&buf[18..20]);
        let start_time = Self::btime_to_nstime(&buf[20..30])?;

        let mut c = Cursor::new(&buf[30..36]);
        let sample_count = c.read_u16::<BigEndian>()?;
        let factor = c.read_i16::<BigEndian>()?;
        let multiplier = c.read_i16::<BigEndian>()?;
        let sample_rate = Self::decode_sample_rate(factor, multiplier);

        let num_blockettes = buf[39];
        let mut blockette_offset = u16::from_be_bytes([buf[46], buf[47]]) as usize;

        let mut encoding = Encoding::Other(0);
        let mut big_endian = true;
        let mut record_length = 4096u32;

        for _ in 0..num_blockettes {
            if blockette_offset + 4 > buf.len() {
                break;
            }
            let btype = u16::from_be_bytes([buf[blockette_offset], buf[blockette_offset + 1]]);
            let next = u16::from_be_bytes([
                buf[blockette_offset + 2],
                buf[blockette_offset + 3],
            ]) as usize;
            if btype == 1000 && blockette_offset + BLOCKETTE1000_LEN <= buf.len() {
                encoding = Encoding::from_code(buf[blockette_offset + 4]);
                big_endian = buf[blockette_offset + 5] != 0;
                record_length = 1u32 << buf[blockette_offset + 6];
            }
            if next == 0 || next == blockette_offset {
                break;
            }
            blockette_offset = next;
        }

        let data_offset = u16::from_be_bytes([buf[44], buf[45]]);

        Ok(Self {
            sequence_number,
            quality,
            network,
            station,
            location,
            channel,
            start_time,
            sample_count,
            sample_rate,
            encoding,
            big_endian,
            record_length,
            data_offset,
        })
    }

    fn source_id_of(&self) -> SourceId {
        SourceId::new(
            self.network.clone(),
            self.station.clone(),
            self.location.clone(),
            self.channel.clone(),
        )
    }

    fn encoding_of(&self) -> Encoding {
        self.encoding
    }

    fn sample_period_of(&self) -> i64 {
        crate::time::sample_period_ns(self.sample_rate)
    }

    fn start_time(&self) -> Nstime {
        self.start_time
    }

    fn publication_version(&self) -> u8 {
        quality_priority(self.quality)
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
        u32::from(self.sample_count)
    }

    fn record_length(&self) -> u32 {
        self.record_length
    }

    fn decode_samples(&self, record_buf: &[u8]) -> crate::Result<Samples> {
        let data = &record_buf[self.data_offset as usize..];
        let n = self.sample_count as usize;
        match self.encoding {
            Encoding::Int16 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(i32::from(if self.big_endian {
                        c.read_i16::<BigEndian>()?
                    } else {
                        c.read_i16::<byteorder::LittleEndian>()?
                    }));
                }
                Ok(Samples::Int(v))
            }
            Encoding::Int32 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(if self.big_endian {
                        c.read_i32::<BigEndian>()?
                    } else {
                        c.read_i32::<byteorder::LittleEndian>()?
                    });
                }
                Ok(Samples::Int(v))
            }
            Encoding::Float32 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(if self.big_endian {
                        c.read_f32::<BigEndian>()?
                    } else {
                        c.read_f32::<byteorder::LittleEndian>()?
                    });
                }
                Ok(Samples::Float32(v))
            }
            Encoding::Float64 => {
                let mut v = Vec::with_capacity(n);
                let mut c = Cursor::new(data);
                for _ in 0..n {
                    v.push(if self.big_endian {
                        c.read_f64::<BigEndian>()?
                    } else {
                        c.read_f64::<byteorder::LittleEndian>()?
                    });
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

        let data_offset = self.data_offset.max(64) as usize;
        let mut payload = Vec::new();
        match (self.encoding, samples) {
            (Encoding::Int16, Samples::Int(v)) => {
                for s in v {
                    payload.write_i16::<BigEndian>(*s as i16)?;
                }
            }
            (Encoding::Int32, Samples::Int(v)) => {
                for s in v {
                    payload.write_i32::<BigEndian>(*s)?;
                }
            }
            (Encoding::Float32, Samples::Float32(v)) => {
                for s in v {
                    payload.write_f32::<BigEndian>(*s)?;
                }
            }
            (Encoding::Float64, Samples::Float64(v)) => {
                for s in v {
                    payload.write_f64::<BigEndian>(*s)?;
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

        let record_len = (data_offset + payload.len()).max(self.record_length as usize);
        let record_len = record_len.next_power_of_two().max(256);

        let mut header = Vec::with_capacity(FIXED_HEADER_LEN);
        header.extend_from_slice(&self.sequence_number);
        header.push(self.quality);
        header.push(b' ');
        header.extend_from_slice(&pad_ascii(&self.station, 5));
        header.extend_from_slice(&pad_ascii(&self.location, 2));
        header.extend_from_slice(&pad_ascii(&self.channel, 3));
        header.extend_from_slice(&pad_ascii(&self.network, 2));
        Self::nstime_to_btime(new_start, &mut header)?;
        header.write_u16::<BigEndian>(samples.len() as u16)?;
        let (factor, multiplier) = Self::encode_sample_rate(self.sample_rate);
        header.write_i16::<BigEndian>(factor)?;
        header.write_i16::<BigEndian>(multiplier)?;
        header.push(0); // activity flags
        header.push(0); // i/o flags
        header.push(0); // data quality flags
        header.push(1); // one blockette follows
        header.write_i32::<BigEndian>(0)?; // time correction
        header.write_u16::<BigEndian>(data_offset as u16)?;
        header.write_u16::<BigEndian>(FIXED_HEADER_LEN as u16)?;

        header.write_u16::<BigEndian>(1000)?;
        header.write_u16::<BigEndian>(0)?;
        header.push(self.encoding.to_code());
        header.push(1); // big-endian word order
        header.push(record_len.trailing_zeros() as u8);
        header.push(0);

        header.resize(data_offset, 0);
        header.extend_from_slice(&payload);
        header.resize(record_len, 0);

        out.extend_from_slice(&header);
        Ok(())
    }
}

fn ascii_field(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim_end().to_string()
}

fn pad_ascii(s: &str, len: usize) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.resize(len, b' ');
    v.truncate(len);
    v
}
