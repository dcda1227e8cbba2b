// Author: Lukas Bower
// Purpose: Bitfield helpers for the `hi:lo` register and header layouts.

//! Bitfield helpers. Ranges are inclusive and written `hi:lo` to match the
//! layout tables.

/// Mask covering `hi:lo` once shifted down to bit 0.
pub(crate) const fn mask(hi: u32, lo: u32) -> u64 {
    let width = hi - lo + 1;
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Extract `hi:lo` from `value`.
pub(crate) const fn get(value: u64, hi: u32, lo: u32) -> u64 {
    (value >> lo) & mask(hi, lo)
}

/// Replace `hi:lo` of `value` with `field`. Bits of `field` above the range
/// width are dropped.
pub(crate) const fn set(value: u64, hi: u32, lo: u32, field: u64) -> u64 {
    let m = mask(hi, lo);
    (value & !(m << lo)) | ((field & m) << lo)
}

/// Whether `field` fits in `hi:lo` without truncation.
pub(crate) const fn fits(hi: u32, lo: u32, field: u64) -> bool {
    field & !mask(hi, lo) == 0
}

/// Read the `index`-th little-endian u64 from `bytes`. Callers check length.
pub(crate) fn read_u64(bytes: &[u8], index: usize) -> u64 {
    let start = index * 8;
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[start..start + 8]);
    u64::from_le_bytes(word)
}

/// Read the little-endian u32 at byte offset `start`. Callers check length.
pub(crate) fn read_u32(bytes: &[u8], start: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[start..start + 4]);
    u32::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_respect_bounds() {
        let value = set(0, 63, 10, 0x3F_FFFF);
        assert_eq!(get(value, 63, 10), 0x3F_FFFF);
        assert_eq!(get(value, 9, 0), 0);
        assert_eq!(set(u64::MAX, 3, 0, 0), u64::MAX & !0xF);
        assert_eq!(mask(63, 0), u64::MAX);
    }

    #[test]
    fn fits_rejects_wide_values() {
        assert!(fits(3, 0, 0xF));
        assert!(!fits(3, 0, 0x10));
        assert!(fits(63, 10, 1 << 53));
        assert!(!fits(63, 10, 1 << 54));
    }
}
