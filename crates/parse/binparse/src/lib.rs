//! `pmem-binparse` --- little-endian byte-slice read primitives.
//!
//! All platform tables handled by this workspace (ACPI NFIT/PCAT/PMTT,
//! SMBIOS, Platform Configuration Data, PBR session images) are
//! little-endian on the wire. This crate provides the single mechanism the
//! decoders use to pull typed fields out of raw table bytes: the
//! [`FromBytes`] trait, bounds-checked and free of pointer casts, so a
//! truncated or hostile buffer can never read out of bounds.

#![no_std]
#![warn(missing_docs)]

/// Types that can be read from a little-endian byte slice.
///
/// Every read is bounds-checked; `None` means the slice was too short.
pub trait FromBytes: Sized {
    /// Number of bytes this type occupies on the wire.
    const WIRE_SIZE: usize;

    /// Read a value from the start of `data`.
    fn read_from(data: &[u8]) -> Option<Self> {
        Self::read_at(data, 0)
    }

    /// Read a value from `data` starting at byte `offset`.
    fn read_at(data: &[u8], offset: usize) -> Option<Self>;
}

macro_rules! impl_from_bytes_int {
    ($($ty:ty),*) => {
        $(
            impl FromBytes for $ty {
                const WIRE_SIZE: usize = size_of::<$ty>();

                fn read_at(data: &[u8], offset: usize) -> Option<Self> {
                    let end = offset.checked_add(size_of::<$ty>())?;
                    let bytes = data.get(offset..end)?;
                    Some(<$ty>::from_le_bytes(bytes.try_into().ok()?))
                }
            }
        )*
    };
}

impl_from_bytes_int!(u8, u16, u32, u64, i32);

impl<const N: usize> FromBytes for [u8; N] {
    const WIRE_SIZE: usize = N;

    fn read_at(data: &[u8], offset: usize) -> Option<Self> {
        let end = offset.checked_add(N)?;
        data.get(offset..end)?.try_into().ok()
    }
}
