//! Segment Recovery
//!
//! Rebuilds a segment's hash index by replaying its file from offset 0.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::entry::{self, Entry, MIN_RECORD_SIZE};
use crate::error::{Result, SegKvError};

const READ_BUFFER_SIZE: usize = 8192;

/// Result of replaying one segment file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records replayed (duplicates included)
    pub entries_recovered: u64,

    /// Bytes consumed; this is where the next append lands
    pub bytes_scanned: u64,
}

/// Replay the segment at `path`
///
/// This will:
/// 1. Read the 4-byte declared size of the next record
/// 2. Read exactly that many bytes (a short read is corruption)
/// 3. Decode the record and point its key at the record's offset
/// 4. Stop cleanly when the file ends on a record boundary
///
/// Later records for a key overwrite earlier ones.
pub(crate) fn replay(path: &Path) -> Result<(HashMap<String, u64>, RecoveryResult)> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let mut index = HashMap::new();
    let mut result = RecoveryResult::default();
    let mut offset = 0u64;
    let mut record = Vec::with_capacity(READ_BUFFER_SIZE);

    loop {
        let mut size_field = [0u8; 4];
        let n = read_full(&mut reader, &mut size_field)?;
        if n == 0 {
            break;
        }
        if n < size_field.len() {
            return Err(truncated(path, offset, size_field.len(), n));
        }

        let size = entry::record_size(size_field);
        if size < MIN_RECORD_SIZE {
            return Err(SegKvError::Corruption(format!(
                "{}: record at offset {} declares {} bytes, below the {} byte minimum",
                path.display(),
                offset,
                size,
                MIN_RECORD_SIZE
            )));
        }

        // Bounds check before allocating: a damaged size field can claim up to 4 GiB
        let remaining = file_len.saturating_sub(offset);
        if size as u64 > remaining {
            return Err(truncated(path, offset, size, remaining as usize));
        }

        record.clear();
        record.resize(size, 0);
        record[..4].copy_from_slice(&size_field);
        let n = read_full(&mut reader, &mut record[4..])?;
        if n < size - 4 {
            return Err(truncated(path, offset, size, n + 4));
        }

        let entry = Entry::decode(&record)?;
        let key = String::from_utf8(entry.key).map_err(|_| {
            SegKvError::Corruption(format!(
                "{}: key at offset {} is not valid UTF-8",
                path.display(),
                offset
            ))
        })?;

        index.insert(key, offset);
        offset += size as u64;
        result.entries_recovered += 1;
    }

    result.bytes_scanned = offset;
    Ok((index, result))
}

/// Fill `buf` as far as the stream allows, returning the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn truncated(path: &Path, offset: u64, declared: usize, found: usize) -> SegKvError {
    SegKvError::Corruption(format!(
        "{}: record at offset {} needs {} bytes, only {} left",
        path.display(),
        offset,
        declared,
        found
    ))
}
