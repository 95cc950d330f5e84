//! Bounds-checked little-endian reading and writing for the persisted module index.
//!
//! The [`crate::module::ModuleIndex`] is generated ahead of time and loaded at agent startup,
//! so its decoder has to treat every byte as untrusted. All readers in this module check the
//! remaining length before touching the buffer and report [`crate::Error::OutOfBounds`]
//! instead of panicking.
//!
//! # Key Components
//!
//! - [`crate::utils::io::IndexIO`] - Trait implemented by the primitive integer types used in the index
//! - [`crate::utils::io::read_le_at`] - Read a value at an offset and advance the offset
//! - [`crate::utils::io::write_le`] - Append a value to an output buffer
//! - [`crate::utils::io::read_str_at`] / [`crate::utils::io::write_str`] - Length-prefixed UTF-8 strings
//!
//! # Example
//!
//! ```rust,ignore
//! use classweave::utils::io::{read_le_at, write_le};
//!
//! let mut out = Vec::new();
//! write_le(&mut out, 1u16);
//! write_le(&mut out, 3u32);
//!
//! let mut offset = 0;
//! let first: u16 = read_le_at(&out, &mut offset)?;
//! let second: u32 = read_le_at(&out, &mut offset)?;
//! assert_eq!((first, second, offset), (1, 3, 6));
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for the primitive types that can be read from and written to an encoded index.
///
/// Implemented for `u8`, `u16`, `u32` and `u64`.
pub trait IndexIO: Sized {
    /// Fixed-size byte representation of the type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode to little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_index_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl IndexIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_index_io!(u8 => 1, u16 => 2, u32 => 4, u64 => 8);

/// Read a value of type `T` at `offset` and advance `offset` past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: IndexIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Append `value` to `out` in little-endian byte order.
pub fn write_le<T: IndexIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Read a `u32` length-prefixed UTF-8 string at `offset` and advance `offset` past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the prefix or the payload is truncated, and
/// [`crate::Error::Malformed`] if the payload is not valid UTF-8.
pub fn read_str_at(data: &[u8], offset: &mut usize) -> Result<String> {
    let len = read_le_at::<u32>(data, offset)? as usize;
    let Some(end) = offset.checked_add(len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let value = std::str::from_utf8(&data[*offset..end])
        .map_err(|e| malformed_error!("Invalid UTF-8 at offset {}: {}", *offset, e))?
        .to_string();
    *offset = end;

    Ok(value)
}

/// Append `value` to `out` as a `u32` length-prefixed UTF-8 string.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the string is longer than `u32::MAX` bytes.
pub fn write_str(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| malformed_error!("String of {} bytes is too long", value.len()))?;
    write_le(out, len);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}
