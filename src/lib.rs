//! LDGM erasure codes with Staircase and Triangle parity structures.
//!
//! `k` data packets are protected by `m` parity packets. Each parity packet
//! is the XOR of a sparse, seeded pseudo-random subset of the other packets,
//! as described by a parity-check matrix that both ends rebuild from the
//! code parameters. The decoder is incremental: packets are fed one at a
//! time, in any order, and missing data packets are rebuilt as soon as the
//! equations allow it.
//!
//! - [`builder`] builds the parity-check matrix
//! - [`session`] encodes and decodes packets of one FEC block
//! - [`coding`] frames a byte stream into self-describing blocks and back
//! - [`simulate`] estimates decoding performance
pub mod builder;
pub mod code;
pub mod coding;
pub mod errors;
pub mod matrix;
pub mod rand48;
pub mod serialize;
pub mod session;
pub mod simulate;
pub mod store;

pub use code::{CodeParams, CodecVariant};
pub use coding::{BlockHeader, CodedBlocks, Coder, Decoder, HEADER_SIZE};
pub use errors::{Error, Result};
pub use session::{FecSession, PacketCanvas, SessionRole};
pub use store::{HeapStore, PacketStore};
