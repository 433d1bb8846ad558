//! Entry Codec
//!
//! Encodes and decodes a single key/value record.
//!
//! ## Record Format (little-endian, records written back-to-back)
//! ```text
//! ┌──────────────┬────────────┬─────────┬────────────┬─────────┬───────────────┐
//! │TotalSize (4) │ KeyLen (4) │   Key   │ ValLen (4) │  Value  │ Checksum (40) │
//! └──────────────┴────────────┴─────────┴────────────┴─────────┴───────────────┘
//!   TotalSize = 12 + KeyLen + ValLen + 40
//! ```
//!
//! The checksum is the lowercase hex SHA-1 digest of `key ++ value`, stored
//! without a length prefix.

use std::io::{self, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::error::{Result, SegKvError};

/// Width of the hex checksum trailer
pub const CHECKSUM_LEN: usize = 40;

/// TotalSize (4) + KeyLen (4)
pub const HEADER_SIZE: usize = 8;

/// TotalSize (4) + KeyLen (4) + ValLen (4)
pub const LENGTH_FIELDS_SIZE: usize = 12;

/// Smallest possible record: empty key, empty value
pub const MIN_RECORD_SIZE: usize = LENGTH_FIELDS_SIZE + CHECKSUM_LEN;

/// Largest record the 4-byte size field can describe
pub const MAX_RECORD_SIZE: usize = u32::MAX as usize;

/// Hex-encoded SHA-1 digest
pub type Checksum = [u8; CHECKSUM_LEN];

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Compute the record checksum over `key ++ value`
pub fn checksum(key: &[u8], value: &[u8]) -> Checksum {
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(value);
    let digest = hasher.finalize();

    let mut out = [0u8; CHECKSUM_LEN];
    for (i, byte) in digest.iter().enumerate() {
        out[2 * i] = HEX_DIGITS[(byte >> 4) as usize];
        out[2 * i + 1] = HEX_DIGITS[(byte & 0x0f) as usize];
    }
    out
}

/// Reject a key/value pair whose record would not fit the size field
pub fn ensure_encodable(key_len: usize, value_len: usize) -> Result<()> {
    let size = (LENGTH_FIELDS_SIZE + CHECKSUM_LEN)
        .checked_add(key_len)
        .and_then(|n| n.checked_add(value_len));

    match size {
        Some(size) if size <= MAX_RECORD_SIZE => Ok(()),
        _ => Err(SegKvError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "record for a {} byte key and {} byte value exceeds {} bytes",
                key_len, value_len, MAX_RECORD_SIZE
            ),
        ))),
    }
}

/// One key/value record as stored in a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub checksum: Checksum,
}

impl Entry {
    /// Build an entry, computing its checksum
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        let value = value.into();
        let checksum = checksum(&key, &value);
        Self {
            key,
            value,
            checksum,
        }
    }

    /// Size of the encoded record in bytes
    pub fn encoded_len(&self) -> usize {
        LENGTH_FIELDS_SIZE + self.key.len() + self.value.len() + CHECKSUM_LEN
    }

    /// Whether the stored checksum matches the key and value
    pub fn is_intact(&self) -> bool {
        checksum(&self.key, &self.value) == self.checksum
    }

    /// Encode to the on-disk record layout
    ///
    /// Callers check [`ensure_encodable`] first; larger records would not
    /// round-trip through the 4-byte length fields.
    pub fn encode(&self) -> Bytes {
        let size = self.encoded_len();
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u32_le(size as u32);
        buf.put_u32_le(self.key.len() as u32);
        buf.put_slice(&self.key);
        buf.put_u32_le(self.value.len() as u32);
        buf.put_slice(&self.value);
        buf.put_slice(&self.checksum);
        buf.freeze()
    }

    /// Decode exactly one record
    ///
    /// `input` must hold the whole record and nothing else; any disagreement
    /// between the length fields and the slice is reported as corruption.
    /// The checksum is not verified here (see [`Entry::is_intact`]).
    pub fn decode(input: &[u8]) -> Result<Self> {
        if input.len() < MIN_RECORD_SIZE {
            return Err(SegKvError::Corruption(format!(
                "record too short: {} bytes, minimum is {}",
                input.len(),
                MIN_RECORD_SIZE
            )));
        }

        let mut buf = input;
        let total_size = buf.get_u32_le() as usize;
        if total_size != input.len() {
            return Err(SegKvError::Corruption(format!(
                "record declares {} bytes but {} were given",
                total_size,
                input.len()
            )));
        }

        let key_len = buf.get_u32_le() as usize;
        if buf.remaining() < key_len + 4 + CHECKSUM_LEN {
            return Err(SegKvError::Corruption(format!(
                "key length {} overruns record of {} bytes",
                key_len, total_size
            )));
        }
        let key = buf[..key_len].to_vec();
        buf.advance(key_len);

        let value_len = buf.get_u32_le() as usize;
        if buf.remaining() != value_len + CHECKSUM_LEN {
            return Err(SegKvError::Corruption(format!(
                "value length {} does not fit record of {} bytes",
                value_len, total_size
            )));
        }
        let value = buf[..value_len].to_vec();
        buf.advance(value_len);

        let mut checksum = [0u8; CHECKSUM_LEN];
        buf.copy_to_slice(&mut checksum);

        Ok(Self {
            key,
            value,
            checksum,
        })
    }
}

/// Read the declared record size from the first four bytes of a record
pub fn record_size(header: [u8; 4]) -> usize {
    u32::from_le_bytes(header) as usize
}

/// Read one record from a stream positioned at its first byte
///
/// The key is skipped rather than parsed; returns `(value, checksum)`.
/// Running out of bytes part-way is reported as corruption.
pub fn read_value<R: Read>(reader: &mut R) -> Result<(Vec<u8>, Checksum)> {
    let mut header = [0u8; HEADER_SIZE];
    read_field(reader, &mut header, "header")?;
    let key_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;

    let skipped = io::copy(&mut reader.by_ref().take(key_len), &mut io::sink())?;
    if skipped != key_len {
        return Err(SegKvError::Corruption(format!(
            "truncated record: key needs {} bytes, found {}",
            key_len, skipped
        )));
    }

    let mut value_len = [0u8; 4];
    read_field(reader, &mut value_len, "value length")?;
    let mut value = vec![0u8; u32::from_le_bytes(value_len) as usize];
    read_field(reader, &mut value, "value")?;

    let mut checksum = [0u8; CHECKSUM_LEN];
    read_field(reader, &mut checksum, "checksum")?;

    Ok((value, checksum))
}

fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], field: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            SegKvError::Corruption(format!("truncated record: missing {}", field))
        }
        _ => SegKvError::Io(e),
    })
}
