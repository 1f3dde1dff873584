//! Framing of a byte stream into coded blocks.
//!
//! Every coded block is a packet prefixed with an 8-byte header:
//!
//! ```text
//! [seq_no: u32 BE][file_pad: u32 BE][payload: block_size bytes]
//! ```
//!
//! `file_pad` is the number of zero bytes appended to the stream to fill the
//! last data packet. It is repeated in every block so that any subset of
//! blocks is self-describing.
use std::fmt;

use crate::errors::{Error, Result};

mod coder;
mod decoder;

pub use coder::Coder;
pub use decoder::Decoder;

/// Size of the block header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Header of a coded block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Sequence number: `0..k` for data, `k..n` for parity
    pub seq_no: u32,
    /// Padding bytes at the end of the stream
    pub file_pad: u32,
}

impl BlockHeader {
    /// Serializes the header.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.seq_no.to_be_bytes());
        bytes[4..].copy_from_slice(&self.file_pad.to_be_bytes());
        bytes
    }

    /// Splits a coded block into its header and payload.
    ///
    /// # Errors
    /// Returns `Error::Format` if the block is shorter than a header.
    pub fn parse(block: &[u8]) -> Result<(BlockHeader, &[u8])> {
        if block.len() < HEADER_SIZE {
            return Err(Error::format(format!(
                "block of {} bytes is shorter than its header",
                block.len()
            )));
        }
        let (header, payload) = block.split_at(HEADER_SIZE);
        let field = |range: std::ops::Range<usize>| {
            let mut buf = [0; 4];
            buf.copy_from_slice(&header[range]);
            u32::from_be_bytes(buf)
        };
        Ok((
            BlockHeader {
                seq_no: field(0..4),
                file_pad: field(4..8),
            },
            payload,
        ))
    }
}

/// The `n` framed blocks of a coded stream, in sequence order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedBlocks {
    blocks: Vec<Vec<u8>>,
    block_len: usize,
}

impl CodedBlocks {
    pub(crate) fn new(blocks: Vec<Vec<u8>>, block_len: usize) -> Self {
        debug_assert!(blocks.iter().all(|b| b.len() == block_len));
        Self { blocks, block_len }
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether there is no block at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Length of every block, header included.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Block `seq`, header included.
    pub fn get(&self, seq: usize) -> Option<&[u8]> {
        self.blocks.get(seq).map(Vec::as_slice)
    }

    /// Iterates over the blocks in sequence order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &[u8]> + ExactSizeIterator {
        self.blocks.iter().map(Vec::as_slice)
    }

    /// Releases the blocks to the caller.
    pub fn into_blocks(self) -> Vec<Vec<u8>> {
        self.blocks
    }
}

/// Hex dump of a block, 16 bytes per line with their printable characters.
pub struct Octets<'a>(pub &'a [u8]);

impl fmt::Display for Octets<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, chunk) in self.0.chunks(16).enumerate() {
            write!(f, "{:04x} ", line * 16)?;
            for col in 0..16 {
                if col % 8 == 0 {
                    write!(f, " ")?;
                }
                match chunk.get(col) {
                    Some(byte) => write!(f, "{:02x} ", byte)?,
                    None => write!(f, "   ")?,
                }
            }
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            writeln!(f, " {}", ascii)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian() {
        let header = BlockHeader {
            seq_no: 0x0102_0304,
            file_pad: 7,
        };
        assert_eq!(header.to_bytes(), [1, 2, 3, 4, 0, 0, 0, 7]);

        let mut block = header.to_bytes().to_vec();
        block.extend_from_slice(b"payload!");
        let (parsed, payload) = BlockHeader::parse(&block).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(payload, b"payload!");
    }

    #[test]
    fn short_block_is_a_format_error() {
        assert!(matches!(BlockHeader::parse(&[0; 5]), Err(Error::Format(_))));
    }

    #[test]
    fn octets_dump() {
        let dump = Octets(b"ABC\x00").to_string();
        // 12 missing columns, plus the separator before the second half.
        let gap = " ".repeat(12 * 3 + 1);
        assert_eq!(dump, format!("0000  41 42 43 00 {} ABC.\n", gap));
    }
}
