//! Size-query-then-fetch buffer convention.
//!
//! Every bulk query takes a caller buffer. An empty buffer asks for the size
//! and gets back the number of units needed without any copy. A buffer that
//! is too short fails with [`ApiError::BufferTooSmall`] and is not written.
//! Units are bytes for 8-bit calls and UTF-16 code units for wide calls.
//!
//! Records are NUL-terminated and packed back to back.

use crate::codepage;
use crate::error::{self, ApiError, Result};

/// Copy `data` into `buffer`, or report the size when `buffer` is empty.
pub fn copy_out<T: Copy>(data: &[T], buffer: &mut [T]) -> Result<usize> {
    if buffer.is_empty() {
        return Ok(data.len());
    }
    if buffer.len() < data.len() {
        return Err(ApiError::BufferTooSmall);
    }
    buffer[..data.len()].copy_from_slice(data);
    Ok(data.len())
}

/// UTF-16 units needed for `records`, terminators included.
pub fn wide_len<'a>(records: impl IntoIterator<Item = &'a str>) -> Result<usize> {
    records.into_iter().try_fold(0usize, |total, record| {
        error::add(total, error::add(record.encode_utf16().count(), 1)?)
    })
}

/// Bytes needed for `records` in `codepage`, terminators included.
pub fn byte_len<'a>(codepage: u32, records: impl IntoIterator<Item = &'a str>) -> Result<usize> {
    records.into_iter().try_fold(0usize, |total, record| {
        error::add(total, error::add(codepage::byte_len(codepage, record)?, 1)?)
    })
}

pub fn wide_records<'a>(records: impl IntoIterator<Item = &'a str>) -> Vec<u16> {
    let mut out = Vec::new();
    for record in records {
        out.extend(record.encode_utf16());
        out.push(0);
    }
    out
}

pub fn byte_records<'a>(codepage: u32, records: impl IntoIterator<Item = &'a str>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        out.extend(codepage::to_bytes(codepage, record)?);
        out.push(0);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codepage::{CP_JAPANESE, CP_UTF8};

    #[test]
    fn test_copy_out_size_query() {
        let data = [1u16, 2, 3];
        assert_eq!(copy_out(&data, &mut []), Ok(3));

        let mut exact = [0u16; 3];
        assert_eq!(copy_out(&data, &mut exact), Ok(3));
        assert_eq!(exact, data);

        let mut short = [9u16; 2];
        assert_eq!(copy_out(&data, &mut short), Err(ApiError::BufferTooSmall));
        assert_eq!(short, [9, 9]);
    }

    #[test]
    fn test_record_lengths() {
        let records = ["a=b", "あ"];
        assert_eq!(wide_len(records), Ok(6));
        assert_eq!(wide_records(records).len(), 6);
        assert_eq!(byte_len(CP_JAPANESE, records), Ok(7));
        assert_eq!(byte_len(CP_UTF8, records), Ok(8));
        assert_eq!(byte_records(CP_JAPANESE, records).unwrap(), vec![b'a', b'=', b'b', 0, 0x82, 0xA0, 0]);
    }
}
