//! Journal wire format — the on-disk block encoding.
//!
//! A journal file is a flat sequence of blocks. Every block is:
//!
//! ```text
//! ┌───────────────┬───────────────┬───────────────┬──────────────────┐
//! │ varint(count) │ varint(len)   │ payload       │ sync marker      │
//! │ always 1      │ payload bytes │ len bytes     │ 16 bytes, fixed  │
//! └───────────────┴───────────────┴───────────────┴──────────────────┘
//! ```
//!
//! This is the block framing of the Avro object container format, with one
//! object per block. External readers locate block boundaries and recognise
//! the file family by the sync marker, so the marker bytes and the varint
//! encoding are part of the format. Changing either breaks every existing
//! reader.

use std::io::{self, Read};

use static_assertions::const_assert_eq;

// ── Constants ────────────────────────────────────────────────────────────────

/// Size of the sync marker that terminates every block.
pub const SYNC_MARKER_SIZE: usize = 16;

/// Sync marker shared by every journal file ever written by any relay.
pub const SYNC_MARKER: [u8; SYNC_MARKER_SIZE] = [
    0xa4, 0x8a, 0x1e, 0x90, 0x05, 0x04, 0x24, 0x78, 0x0a, 0x68, 0x33, 0x7f, 0xc2, 0x50, 0x95, 0x63,
];

const_assert_eq!(SYNC_MARKER.len(), 16);

/// Largest datagram the relay accepts and therefore the largest payload a
/// block written by the relay carries. The reader rejects longer blocks
/// before allocating for them.
pub const MAX_PACKET_SIZE: usize = 65535;

/// Longest varint encoding of an `i64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Object count written in front of every block.
pub const OBJECTS_PER_BLOCK: i64 = 1;

/// Upper bound on the block size produced for a maximum-size packet.
pub const MAX_BLOCK_SIZE: usize = 2 * MAX_VARINT_LEN + MAX_PACKET_SIZE + SYNC_MARKER_SIZE;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("varint truncated")]
    VarintTruncated,
    #[error("varint longer than 10 bytes")]
    VarintOverflow,
    #[error("block at offset {offset} is truncated")]
    TruncatedBlock { offset: u64 },
    #[error("block at offset {offset} has object count {count}, expected 1")]
    UnexpectedCount { offset: u64, count: i64 },
    #[error("block at offset {offset} has invalid payload length {length}")]
    InvalidLength { offset: u64, length: i64 },
    #[error("block at offset {offset} ends with a foreign sync marker")]
    SyncMismatch { offset: u64 },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

// ── Varint ───────────────────────────────────────────────────────────────────

/// A zigzag varint held inline. Never allocates.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Varint {
    buf: [u8; MAX_VARINT_LEN],
    len: u8,
}

impl Varint {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for Varint {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Debug for Varint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Varint({:02x?})", self.as_bytes())
    }
}

/// Encode a signed 64-bit value as a zigzag varint.
///
/// Zigzag maps negatives to odd and non-negatives to even unsigned values,
/// then the result is emitted 7 bits at a time, low group first, with the
/// high bit set on every byte except the last.
pub fn encode_long(value: i64) -> Varint {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    while n > 0x7f {
        buf[len] = (n as u8 & 0x7f) | 0x80;
        n >>= 7;
        len += 1;
    }
    buf[len] = n as u8;
    len += 1;
    Varint {
        buf,
        len: len as u8,
    }
}

/// Decode a zigzag varint from the front of `input`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_long(input: &[u8]) -> Result<(i64, usize), WireError> {
    let mut n: u64 = 0;
    for (i, &byte) in input.iter().take(MAX_VARINT_LEN).enumerate() {
        n |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((unzigzag(n), i + 1));
        }
    }
    if input.len() >= MAX_VARINT_LEN {
        Err(WireError::VarintOverflow)
    } else {
        Err(WireError::VarintTruncated)
    }
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

// ── Block framing ────────────────────────────────────────────────────────────

/// The two varints that open a block.
#[derive(Debug, Clone, Copy)]
pub struct BlockPrefix {
    pub count: Varint,
    pub length: Varint,
}

impl BlockPrefix {
    pub fn new(payload_len: usize) -> Self {
        Self {
            count: encode_long(OBJECTS_PER_BLOCK),
            length: encode_long(payload_len as i64),
        }
    }

    /// Total encoded size of a block carrying `payload_len` bytes.
    pub fn block_len(&self, payload_len: usize) -> u64 {
        (self.count.len() + self.length.len() + payload_len + SYNC_MARKER_SIZE) as u64
    }
}

/// Encoded size of the block that wraps a payload of `payload_len` bytes.
pub fn block_len(payload_len: usize) -> u64 {
    BlockPrefix::new(payload_len).block_len(payload_len)
}

/// Append one encoded block to `out`, in wire order.
pub fn encode_block(payload: &[u8], out: &mut Vec<u8>) {
    let prefix = BlockPrefix::new(payload.len());
    out.reserve(prefix.block_len(payload.len()) as usize);
    out.extend_from_slice(prefix.count.as_bytes());
    out.extend_from_slice(prefix.length.as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&SYNC_MARKER);
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Streaming reader over the blocks of one journal file.
///
/// Each block is checked for a count of 1 and a trailing [`SYNC_MARKER`].
/// A clean end of input between blocks ends iteration; an end of input
/// inside a block is reported as [`WireError::TruncatedBlock`].
pub struct BlockReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Byte offset of the next unread block.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next block's payload. `Ok(None)` at a clean end of file.
    pub fn next_block(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        let start = self.offset;
        let truncated = || WireError::TruncatedBlock { offset: start };

        let count = match self.read_long(start, true)? {
            Some(c) => c,
            None => return Ok(None),
        };
        if count != OBJECTS_PER_BLOCK {
            return Err(WireError::UnexpectedCount {
                offset: start,
                count,
            });
        }

        let length = self.read_long(start, false)?.ok_or_else(truncated)?;
        if length < 0 || length > MAX_PACKET_SIZE as i64 {
            return Err(WireError::InvalidLength {
                offset: start,
                length,
            });
        }

        let mut payload = vec![0u8; length as usize];
        self.read_exact_or(&mut payload, start)?;

        let mut marker = [0u8; SYNC_MARKER_SIZE];
        self.read_exact_or(&mut marker, start)?;
        if marker != SYNC_MARKER {
            return Err(WireError::SyncMismatch { offset: start });
        }

        Ok(Some(payload))
    }

    /// Read one varint. With `at_boundary`, EOF before the first byte is a
    /// clean end and yields `None`.
    fn read_long(&mut self, block_start: u64, at_boundary: bool) -> Result<Option<i64>, WireError> {
        let mut n: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let mut byte = [0u8; 1];
            match self.inner.read_exact(&mut byte) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    if i == 0 && at_boundary {
                        return Ok(None);
                    }
                    return Err(WireError::TruncatedBlock {
                        offset: block_start,
                    });
                }
                Err(e) => return Err(e.into()),
            }
            self.offset += 1;
            n |= u64::from(byte[0] & 0x7f) << (7 * i);
            if byte[0] & 0x80 == 0 {
                return Ok(Some(unzigzag(n)));
            }
        }
        Err(WireError::VarintOverflow)
    }

    fn read_exact_or(&mut self, buf: &mut [u8], block_start: u64) -> Result<(), WireError> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(WireError::TruncatedBlock {
                offset: block_start,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<Vec<u8>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}
