//! Byte ranges and the resumable upload response contract

use crate::error::{Error, Result};
use http::StatusCode;

/// Half-open byte span `[start, end)` of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Range that begins at `committed` and stops at the chunk boundary or
    /// the end of the file, whichever comes first.
    pub fn next(committed: u64, chunk_size: u64, file_len: u64) -> Result<Self> {
        let index = committed / chunk_size;
        let end = chunk_size.saturating_mul(index + 1).min(file_len);
        Self::checked(committed, end, file_len)
    }

    pub fn checked(start: u64, end: u64, file_len: u64) -> Result<Self> {
        if start >= file_len || end <= start || end > file_len {
            return Err(Error::InvalidRange {
                start,
                end,
                file_len,
            });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// `Content-Range` value, e.g. `bytes 0-5242879/10485760`
    pub fn content_range(&self, file_len: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end - 1, file_len)
    }
}

/// Every range the upload will send, in order
pub fn plan_ranges(file_len: u64, chunk_size: u64) -> Result<Vec<ByteRange>> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    while offset < file_len {
        let range = ByteRange::next(offset, chunk_size, file_len)?;
        offset = range.end;
        ranges.push(range);
    }
    Ok(ranges)
}

/// Parse a `Range: bytes=<first>-<last>` response header.
pub fn parse_range_header(value: &str) -> Option<(u64, u64)> {
    let span = value.trim().strip_prefix("bytes=")?;
    let (first, last) = span.split_once('-')?;
    let first = first.trim().parse().ok()?;
    let last = last.trim().parse().ok()?;
    (first <= last).then_some((first, last))
}

/// Decide whether the server durably accepted `sent`.
///
/// A final 2xx status commits the range. A 308 commits it only when the
/// server reports one contiguous span from byte 0 through the last byte
/// just sent.
pub fn check_response(status: StatusCode, range: Option<&str>, sent: ByteRange) -> Result<()> {
    if status == StatusCode::PERMANENT_REDIRECT {
        let expected = sent.end - 1;
        return match range.and_then(parse_range_header) {
            Some((0, last)) if last == expected => Ok(()),
            Some((first, last)) => Err(Error::Protocol(format!(
                "server reported bytes={}-{}, expected bytes=0-{}",
                first, last, expected
            ))),
            None => Err(Error::Protocol(format!(
                "resume response without a usable Range header ({:?})",
                range
            ))),
        };
    }

    if status.is_success() {
        return Ok(());
    }

    Err(Error::Protocol(format!(
        "unexpected status {}",
        status
    )))
}
