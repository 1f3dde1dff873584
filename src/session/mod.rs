//! FEC sessions.
//!
//! A [`FecSession`] owns the parity-check matrix of one code instance and the
//! state needed to encode or decode one FEC block with it:
//! - the encoder turns a full canvas of data packets into parity packets,
//!   either one parity packet at a time ([`FecSession::build_fec_packet`]) or
//!   incrementally as data packets become available
//!   ([`FecSession::build_fec_packets_per_col`]);
//! - the decoder takes packets in any order ([`FecSession::decode_step`]) and
//!   rebuilds missing ones by peeling the equations of the matrix.
//!
//! A session serves a single FEC block. Start a new session for unrelated
//! data.
use log::debug;

use crate::{
    builder::create_pchk_matrix,
    code::CodeParams,
    errors::{Error, Result},
    matrix::SparseBitMatrix,
    store::{HeapStore, PacketStore},
};

pub mod canvas;
mod decode;
mod encode;

pub use canvas::PacketCanvas;

/// What a session may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    /// Builds parity packets.
    Encoder,
    /// Rebuilds missing data packets.
    Decoder,
    /// Both; mostly useful in tests and simulations.
    Both,
}

impl SessionRole {
    fn encodes(self) -> bool {
        matches!(self, SessionRole::Encoder | SessionRole::Both)
    }

    fn decodes(self) -> bool {
        matches!(self, SessionRole::Decoder | SessionRole::Both)
    }
}

/// Mapping between packet sequence numbers and matrix columns.
///
/// Parity packet `k + i` is column `i`, data packet `s` is column `m + s`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Layout {
    data: usize,
    parity: usize,
}

impl Layout {
    fn is_data(self, seq: usize) -> bool {
        seq < self.data
    }

    fn col_of(self, seq: usize) -> usize {
        if self.is_data(seq) {
            seq + self.parity
        } else {
            seq - self.data
        }
    }

    fn seq_of(self, col: usize) -> usize {
        if col < self.parity {
            col + self.data
        } else {
            col - self.parity
        }
    }
}

/// Encoding and decoding state of one FEC block.
pub struct FecSession<S: PacketStore = HeapStore> {
    params: CodeParams,
    block_size: usize,
    role: SessionRole,
    layout: Layout,
    small_fec_ratio: bool,
    matrix: SparseBitMatrix,
    store: S,

    // Encoder side
    encoder_unknown: Vec<usize>,
    encoded_cols: Vec<bool>,

    // Decoder side
    unknown: Vec<usize>,
    partial_sums: Vec<Option<S::Packet>>,
    parity_canvas: Vec<Option<S::Packet>>,
    first_non_decoded: usize,
}

impl FecSession<HeapStore> {
    /// Opens a session whose packets live on the heap.
    ///
    /// # Arguments
    /// * `params` - Code parameters, shared with the peer
    /// * `block_size` - Packet size in bytes, a non-zero multiple of 4
    /// * `role` - Encoder, decoder or both
    ///
    /// # Errors
    /// Returns `Error::Config` if the parameters or the block size are
    /// invalid.
    pub fn new(params: CodeParams, block_size: usize, role: SessionRole) -> Result<Self> {
        Self::with_store(params, block_size, role, HeapStore)
    }
}

impl<S: PacketStore> FecSession<S> {
    /// Opens a session whose packets are managed by `store`.
    ///
    /// # Errors
    /// Returns `Error::Config` if the parameters or the block size are
    /// invalid.
    pub fn with_store(
        params: CodeParams,
        block_size: usize,
        role: SessionRole,
        store: S,
    ) -> Result<Self> {
        params.validate()?;
        if block_size == 0 || block_size % 4 != 0 {
            return Err(Error::config(format!(
                "Block size must be a positive multiple of 4, got {}",
                block_size
            )));
        }

        let matrix = create_pchk_matrix(&params)?;
        let row_degrees: Vec<usize> = (0..matrix.rows()).map(|r| matrix.row_degree(r)).collect();
        let n = params.total_blocks();
        let m = params.parity_blocks;
        let small_fec_ratio = params.triangle_with_small_fec_ratio();
        if small_fec_ratio {
            debug!("Triangle code with a small FEC ratio: parity packets are never kept");
        }

        let (encoder_unknown, encoded_cols) = if role.encodes() {
            (row_degrees.clone(), vec![false; n])
        } else {
            (Vec::new(), Vec::new())
        };
        let (unknown, partial_sums, parity_canvas) = if role.decodes() {
            (
                row_degrees,
                std::iter::repeat_with(|| None).take(m).collect(),
                std::iter::repeat_with(|| None).take(m).collect(),
            )
        } else {
            (Vec::new(), Vec::new(), Vec::new())
        };

        Ok(FecSession {
            params,
            block_size,
            role,
            layout: Layout {
                data: params.data_blocks,
                parity: m,
            },
            small_fec_ratio,
            matrix,
            store,
            encoder_unknown,
            encoded_cols,
            unknown,
            partial_sums,
            parity_canvas,
            first_non_decoded: 0,
        })
    }

    /// Code parameters of the session.
    pub fn params(&self) -> &CodeParams {
        &self.params
    }

    /// Packet size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Role the session was opened with.
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Current parity-check matrix. Decoding deletes its entries.
    pub fn matrix(&self) -> &SparseBitMatrix {
        &self.matrix
    }

    /// Packet store of the session.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable packet store, e.g. to allocate packets handed to the session.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Whether packet `seq` has been received or rebuilt.
    ///
    /// Data packets are known once in the canvas. Parity packets are known
    /// while kept by the session, or once no equation mentions them anymore.
    ///
    /// # Panics
    ///
    /// Panics if `seq` is not a packet of the code.
    pub fn is_packet_known(&self, canvas: &PacketCanvas<S::Packet>, seq: usize) -> bool {
        assert!(seq < self.params.total_blocks(), "packet {} out of range", seq);
        if self.layout.is_data(seq) {
            canvas.is_known(seq)
        } else {
            self.matrix.col_degree(self.layout.col_of(seq)) == 0
                || self
                    .parity_canvas
                    .get(seq - self.params.data_blocks)
                    .is_some_and(Option::is_some)
        }
    }

    /// Whether every data packet of `canvas` is known.
    ///
    /// Data packets are never forgotten, so the first unknown slot only moves
    /// forward and is remembered between calls.
    pub fn is_decoding_complete(&mut self, canvas: &PacketCanvas<S::Packet>) -> bool {
        while self.first_non_decoded < self.params.data_blocks {
            if !canvas.is_known(self.first_non_decoded) {
                return false;
            }
            self.first_non_decoded += 1;
        }
        true
    }
}

impl<S: PacketStore> Drop for FecSession<S> {
    fn drop(&mut self) {
        for packet in self
            .partial_sums
            .drain(..)
            .chain(self.parity_canvas.drain(..))
            .flatten()
        {
            self.store.free(packet);
        }
    }
}
