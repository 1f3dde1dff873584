use log::debug;

use super::{BlockHeader, CodedBlocks, HEADER_SIZE};
use crate::{
    code::CodeParams,
    errors::{Error, Result},
    session::{FecSession, PacketCanvas, SessionRole},
};

/// Turns a byte stream into `k` data blocks and `m` parity blocks.
#[derive(Clone, Copy, Debug)]
pub struct Coder {
    params: CodeParams,
}

impl Coder {
    /// Creates a coder for the given code.
    pub fn new(params: CodeParams) -> Self {
        Self { params }
    }

    /// Code parameters of the coder.
    pub fn params(&self) -> &CodeParams {
        &self.params
    }

    /// Packet size used for a stream of `len` bytes: `len / k` rounded up to
    /// a multiple of 4.
    pub fn block_size_for(&self, len: usize) -> usize {
        len.div_ceil(self.params.data_blocks).next_multiple_of(4)
    }

    /// Codes a byte stream.
    ///
    /// # Returns
    /// The `k + m` framed blocks, data blocks first. The last data block is
    /// zero padded.
    ///
    /// # Errors
    /// Returns `Error::Config` if `data` is empty or if the padding does not
    /// fit a block header.
    pub fn encode(&self, data: &[u8]) -> Result<CodedBlocks> {
        if data.is_empty() {
            return Err(Error::config("Cannot code an empty stream"));
        }
        let k = self.params.data_blocks;
        let block_size = self.block_size_for(data.len());
        let file_pad = u32::try_from(block_size * k - data.len())
            .map_err(|_| Error::config("Padding does not fit a block header"))?;

        let slots: Vec<Option<Vec<u8>>> = (0..self.params.total_blocks())
            .map(|i| {
                (i < k).then(|| {
                    let start = (i * block_size).min(data.len());
                    let end = ((i + 1) * block_size).min(data.len());
                    let mut packet = data[start..end].to_vec();
                    packet.resize(block_size, 0);
                    packet
                })
            })
            .collect();
        let mut canvas = PacketCanvas::from(slots);

        let mut session = FecSession::new(self.params, block_size, SessionRole::Encoder)?;
        for i in 0..self.params.parity_blocks {
            let mut fec = vec![0; block_size];
            session.build_fec_packet(&canvas.as_view(), i, &mut fec)?;
            canvas.insert(k + i, fec);
        }

        let blocks = canvas
            .into_slots()
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(seq, payload)| {
                let header = BlockHeader {
                    seq_no: seq as u32,
                    file_pad,
                };
                let mut block = Vec::with_capacity(HEADER_SIZE + block_size);
                block.extend_from_slice(&header.to_bytes());
                block.extend_from_slice(&payload);
                block
            })
            .collect();
        debug!(
            "Coded {} bytes into {} blocks of {} bytes (padding {})",
            data.len(),
            self.params.total_blocks(),
            block_size,
            file_pad
        );
        Ok(CodedBlocks::new(blocks, HEADER_SIZE + block_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodecVariant;

    #[test]
    fn block_size_is_a_multiple_of_four() {
        let coder = Coder::new(CodeParams::new(8, 4, 3, 21, CodecVariant::Staircase).unwrap());
        assert_eq!(coder.block_size_for(512), 64);
        assert_eq!(coder.block_size_for(513), 68);
        assert_eq!(coder.block_size_for(3), 4);
    }

    #[test]
    fn blocks_carry_headers_and_padding() {
        let params = CodeParams::new(4, 2, 2, 21, CodecVariant::Staircase).unwrap();
        let blocks = Coder::new(params).encode(b"0123456789").unwrap();
        // 10 bytes over 4 blocks: 3 rounded up to 4, 6 bytes of padding.
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks.block_len(), HEADER_SIZE + 4);
        for (seq, block) in blocks.iter().enumerate() {
            let (header, _) = BlockHeader::parse(block).unwrap();
            assert_eq!(header.seq_no as usize, seq);
            assert_eq!(header.file_pad, 6);
        }
        assert_eq!(&blocks.get(2).unwrap()[HEADER_SIZE..], b"89\0\0");
        assert_eq!(&blocks.get(3).unwrap()[HEADER_SIZE..], b"\0\0\0\0");
    }

    #[test]
    fn empty_stream_is_rejected() {
        let coder = Coder::new(CodeParams::default());
        assert!(matches!(coder.encode(&[]), Err(Error::Config(_))));
    }
}
