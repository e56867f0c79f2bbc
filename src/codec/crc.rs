//! CRC-32 for miniSEED v3 record headers.
//!
//! v3 records carry a CRC-32 of the entire record computed with the CRC
//! field itself zeroed (spec.md §6: "Version 3 records carry a header CRC
//! that is validated; on CRC failure the record is skipped."). Grounded on
//! `examples/Blobfolio-riprip`'s use of the same `crc32fast` crate for
//! checksums over binary audio records — the closest pack precedent for
//! "validate a CRC embedded in a binary container format".

/// Computes the v3 CRC over `record`, a full on-disk record buffer, with
/// the 4 bytes at `crc_field_offset` treated as zero.
#[must_use]
pub fn header_crc32(record: &[u8], crc_field_offset: usize) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&record[..crc_field_offset]);
    hasher.update(&[0, 0, 0, 0]);
    hasher.update(&record[crc_field_offset + 4..]);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn crc_ignores_the_field_itself() {
        let mut record = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        record[4..8].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let crc_with_garbage = header_crc32(&record, 4);

        record[4..8].copy_from_slice(&0u32.to_le_bytes());
        let crc_with_zero = header_crc32(&record, 4);

        assert_eq!(crc_with_garbage, crc_with_zero);
    }
}
