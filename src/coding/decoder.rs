use log::{debug, warn};

use super::{BlockHeader, HEADER_SIZE};
use crate::{
    code::CodeParams,
    errors::{Error, Result},
    session::{FecSession, PacketCanvas, SessionRole},
};

/// Rebuilds a byte stream from any decodable subset of its coded blocks.
///
/// Blocks may come in any order. A malformed block is rejected on its own
/// and leaves the decoder untouched, so the caller may go on with the other
/// blocks.
pub struct Decoder {
    session: FecSession,
    canvas: PacketCanvas<Vec<u8>>,
    block_len: usize,
    file_pad: Option<u32>,
    blocks_used: usize,
}

impl Decoder {
    /// Creates a decoder for blocks of `block_len` bytes, header included.
    ///
    /// # Errors
    /// Returns `Error::Config` if the payload size is not a positive multiple
    /// of 4 or if the parameters are invalid.
    pub fn new(params: CodeParams, block_len: usize) -> Result<Self> {
        let block_size = block_len.checked_sub(HEADER_SIZE).ok_or_else(|| {
            Error::config(format!("Blocks of {} bytes cannot hold a header", block_len))
        })?;
        Ok(Decoder {
            session: FecSession::new(params, block_size, SessionRole::Decoder)?,
            canvas: PacketCanvas::new(params.data_blocks),
            block_len,
            file_pad: None,
            blocks_used: 0,
        })
    }

    /// Number of distinct blocks fed so far, rejected ones and duplicates
    /// excluded.
    pub fn blocks_used(&self) -> usize {
        self.blocks_used
    }

    /// Feeds one coded block.
    ///
    /// # Returns
    /// Whether every data packet is now known.
    ///
    /// # Errors
    /// Returns `Error::Format` if the block has the wrong length, an unknown
    /// sequence number or a padding inconsistent with earlier blocks, and
    /// `Error::OutOfMemory` if decoding runs out of memory.
    pub fn push_block(&mut self, block: &[u8]) -> Result<bool> {
        let header = self.check_block(block).inspect_err(|e| warn!("Rejected block: {}", e))?;
        let payload = &block[HEADER_SIZE..];
        let seq = header.seq_no as usize;
        self.file_pad = Some(header.file_pad);
        if !self.session.is_packet_known(&self.canvas, seq) {
            self.blocks_used += 1;
        }
        self.session.decode_step_copy(&mut self.canvas, payload, seq)?;
        Ok(self.is_done())
    }

    fn check_block(&self, block: &[u8]) -> Result<BlockHeader> {
        if block.len() != self.block_len {
            return Err(Error::format(format!(
                "block of {} bytes, expected {}",
                block.len(),
                self.block_len
            )));
        }
        let (header, _) = BlockHeader::parse(block)?;
        let params = self.session.params();
        if header.seq_no as usize >= params.total_blocks() {
            return Err(Error::format(format!(
                "sequence number {} outside a code of {} blocks",
                header.seq_no,
                params.total_blocks()
            )));
        }
        match self.file_pad {
            Some(pad) if pad != header.file_pad => Err(Error::format(format!(
                "block {} announces {} padding bytes, earlier blocks {}",
                header.seq_no, header.file_pad, pad
            ))),
            None if header.file_pad as usize > self.session.block_size() * params.data_blocks => {
                Err(Error::format(format!(
                    "padding of {} bytes exceeds the stream",
                    header.file_pad
                )))
            }
            _ => Ok(header),
        }
    }

    /// Whether every data packet is known.
    pub fn is_done(&mut self) -> bool {
        self.session.is_decoding_complete(&self.canvas)
    }

    /// The rebuilt stream, once decoding is complete.
    pub fn recovered(&mut self) -> Option<Vec<u8>> {
        if !self.is_done() {
            return None;
        }
        let pad = self.file_pad? as usize;
        let mut data: Vec<u8> = self.canvas.iter().flatten().flatten().copied().collect();
        data.truncate(data.len() - pad);
        debug!(
            "Recovered {} bytes from {} blocks",
            data.len(),
            self.blocks_used
        );
        Some(data)
    }

    /// Number of data blocks known, received or rebuilt.
    pub fn data_blocks_known(&self) -> usize {
        self.canvas.known_count()
    }

    /// Decodes a whole set of blocks, skipping malformed ones.
    ///
    /// The block length is taken from the first block that can open a
    /// decoder; blocks before it are skipped. Padding is taken from the first
    /// accepted block, so a first block with a forged padding makes every
    /// later block look inconsistent and decoding fails.
    ///
    /// # Errors
    /// Returns `Error::Format` if the blocks are not enough to rebuild the
    /// stream, or if no block has a usable length.
    pub fn decode<'a>(
        params: CodeParams,
        blocks: impl IntoIterator<Item = &'a [u8]>,
    ) -> Result<Vec<u8>> {
        let mut decoder: Option<Decoder> = None;
        for block in blocks {
            if decoder.is_none() {
                decoder = Decoder::open(params, block)?;
            }
            let Some(decoder) = decoder.as_mut() else {
                continue;
            };
            match decoder.push_block(block) {
                Ok(true) => break,
                Ok(false) | Err(Error::Format(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut decoder = decoder.ok_or_else(|| Error::format("no usable block to decode"))?;
        decoder.recovered().ok_or_else(|| {
            Error::format(format!(
                "{} blocks are not enough to rebuild the stream ({} of {} data blocks known)",
                decoder.blocks_used(),
                decoder.data_blocks_known(),
                params.data_blocks
            ))
        })
    }

    /// Opens a decoder sized after `block`.
    ///
    /// # Returns
    /// `None` if the length of `block` cannot be that of a coded block, in
    /// which case the block should be skipped.
    ///
    /// # Errors
    /// Returns `Error::Config` if the parameters are invalid.
    pub fn open(params: CodeParams, block: &[u8]) -> Result<Option<Decoder>> {
        params.validate()?;
        match Decoder::new(params, block.len()) {
            Ok(decoder) => Ok(Some(decoder)),
            Err(Error::Config(msg)) => {
                warn!("Rejected block of {} bytes: {}", block.len(), msg);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
