//! Error kinds reported across the client API surface.

use thiserror::Error;

/// Result kinds a client call can fail with.
///
/// "Not found" and "found but empty" both report [`ApiError::NotFound`];
/// callers cannot tell the two apart.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid argument")]
    InvalidArgument,

    #[error("buffer too small")]
    BufferTooSmall,

    #[error("not found")]
    NotFound,

    #[error("size arithmetic overflow")]
    Overflow,

    #[error("out of memory")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Checked `a + b` for size bookkeeping.
pub(crate) fn add(a: usize, b: usize) -> Result<usize> {
    a.checked_add(b).ok_or(ApiError::Overflow)
}

/// Checked `a * b` for size bookkeeping.
pub(crate) fn mul(a: usize, b: usize) -> Result<usize> {
    a.checked_mul(b).ok_or(ApiError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_math() {
        assert_eq!(add(2, 3), Ok(5));
        assert_eq!(add(usize::MAX, 1), Err(ApiError::Overflow));
        assert_eq!(mul(usize::MAX, 2), Err(ApiError::Overflow));
        assert_eq!(mul(4, 2), Ok(8));
    }
}
