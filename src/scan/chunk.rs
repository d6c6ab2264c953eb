//! Fixed-size chunking for resumable uploads.

use crate::error::{DlpGateError, Result};

/// One slice of an upload and its byte offset in the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub offset: u64,
    pub data: &'a [u8],
}

/// Split `data` into consecutive slices of `chunk_size` bytes; the last may be shorter.
///
/// An empty buffer yields no chunks. A zero chunk size is rejected.
pub fn split(data: &[u8], chunk_size: u64) -> Result<impl Iterator<Item = Chunk<'_>>> {
    let size = usize::try_from(chunk_size)
        .ok()
        .filter(|s| *s > 0)
        .ok_or(DlpGateError::InvalidChunkSize(chunk_size))?;
    Ok(data.chunks(size).enumerate().map(move |(ix, data)| Chunk {
        offset: (ix * size) as u64,
        data,
    }))
}

/// Number of chunks [`split`] yields: `ceil(len / chunk_size)`.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        0
    } else {
        len.div_ceil(chunk_size)
    }
}
