//! CRC-32 (polynomial 0xEDB88320, reflected) used by SPIFS ToC footers.
//! No crate in the dependency table provides this, so it is hand-rolled —
//! the one deliberate exception to "never fall back to the standard
//! library/hand-rolled code where the corpus shows an ecosystem crate",
//! noted in DESIGN.md.

const POLY: u32 = 0xEDB88320;

fn table_entry(mut byte: u32) -> u32 {
    for _ in 0..8 {
        byte = if byte & 1 != 0 { (byte >> 1) ^ POLY } else { byte >> 1 };
    }
    byte
}

/// Computed lazily per call rather than as a static table: the table is
/// only 1 KiB, but the crate avoids `lazy_static`/`once_cell` here since
/// this is the only user and it runs at mount/commit time, not per byte
/// in a hot loop.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as u32;
        crc = (crc >> 8) ^ table_entry(index);
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_matches_standard_crc32() {
        // Standard CRC-32 of "123456789" is 0xCBF43926.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn differs_from_single_bit_flip() {
        let a = crc32(b"spifs-toc");
        let mut flipped = *b"spifs-toc";
        flipped[0] ^= 0x01;
        let b = crc32(&flipped);
        assert_ne!(a, b);
    }
}
