//! Table checksum generation and verification.

/// Sets the checksum byte so that `buf` sums to zero mod 256.
///
/// The byte at `checksum_offset` is zeroed first, the remaining bytes are
/// summed, and the two's complement of the sum is stored.
///
/// # Panics
///
/// Panics if `checksum_offset` is outside `buf` (a caller bug: the offset
/// is a structural constant of the table being built).
pub fn generate_checksum(buf: &mut [u8], checksum_offset: usize) {
    buf[checksum_offset] = 0;
    let sum = pmem_acpi::checksum(buf);
    buf[checksum_offset] = 0u8.wrapping_sub(sum);
}

/// Verifies that `buf` sums to zero mod 256, checksum byte included.
#[must_use]
pub fn is_checksum_valid(buf: &[u8]) -> bool {
    pmem_acpi::is_checksum_valid(buf)
}
