//! Incremental peeling decoder.
//!
//! Each row of the parity-check matrix is an equation whose terms XOR to
//! zero. When a packet becomes known, its value is added to the partial sum
//! of every equation it takes part in and its entry is deleted from the
//! matrix. An equation left with a single entry gives the value of that last
//! packet: its partial sum. The rebuilt packet is then injected like a
//! received one, which may resolve further equations.
//!
//! For instance, with data packets `s1, s2` and a parity packet `f1`:
//!
//! ```text
//! s1 + s2 + f1 = 0    (row 0)
//!      s2 + f1 = 0    (row 1)
//! ```
//!
//! receiving `s2` resolves row 1 and gives `f1`, which in turn resolves row 0
//! and gives `s1`.
//!
//! Partial sums are only allocated once an equation has a single unknown
//! left, so that packets received early do not each cost a buffer per
//! equation. Known packets whose equation has no partial sum yet keep their
//! entry and are folded in when the sum appears.
use log::{debug, trace};

use super::{FecSession, PacketCanvas};
use crate::{
    errors::Result,
    store::{PacketStore, xor_into},
};

impl<S: PacketStore> FecSession<S> {
    /// Feeds a received packet to the decoder.
    ///
    /// Data packets end up in `canvas`, as do the data packets this packet
    /// allows to rebuild. Packets already known are released and ignored.
    ///
    /// # Arguments
    /// * `canvas` - Data packets by sequence number, `k` slots
    /// * `packet` - Received packet of `block_size` bytes; data packets
    ///   should come from [`PacketStore::alloc_decoded`]
    /// * `seq` - Sequence number of the packet
    ///
    /// # Errors
    /// Returns `Error::OutOfMemory` if a buffer cannot be allocated. The
    /// session cannot be trusted afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the session cannot decode, if `seq` is out of range, or if
    /// the packet or canvas size is wrong.
    pub fn decode_step(
        &mut self,
        canvas: &mut PacketCanvas<S::Packet>,
        packet: S::Packet,
        seq: usize,
    ) -> Result<()> {
        self.check_decode_args(canvas, seq);
        assert_eq!(
            packet.as_ref().len(),
            self.block_size,
            "packet {} has the wrong size",
            seq
        );
        if self.is_packet_known(canvas, seq) {
            trace!("Packet {} already received or rebuilt, ignored", seq);
            self.store.free(packet);
            return Ok(());
        }
        trace!("Processing new packet {}", seq);

        let mut resolvable = Vec::new();
        self.inject(canvas, packet, seq, &mut resolvable)?;

        while let Some(row) = resolvable.pop() {
            // Earlier resolutions may have emptied the row already.
            if self.matrix.row_degree(row) != 1 {
                continue;
            }
            let Some(entry) = self.matrix.first_in_row(row) else {
                continue;
            };
            let rebuilt_seq = self.layout.seq_of(self.matrix.col_of(entry));
            self.matrix.delete(entry);
            let Some(mut sum) = self.partial_sums[row].take() else {
                continue;
            };

            if self.layout.is_data(rebuilt_seq) {
                debug!("Rebuilt data packet {}", rebuilt_seq);
                if canvas.is_known(rebuilt_seq) {
                    self.store.free(sum);
                    continue;
                }
                let mut decoded = self.store.alloc_decoded(rebuilt_seq, self.block_size)?;
                let value = self.store.get(&mut sum)?;
                self.store.get_mut_uninit(&mut decoded).copy_from_slice(value);
                self.store.store(&mut decoded)?;
                self.store.free(sum);
                self.inject(canvas, decoded, rebuilt_seq, &mut resolvable)?;
            } else {
                debug!("Rebuilt parity packet {}", rebuilt_seq);
                if self.is_packet_known(canvas, rebuilt_seq) {
                    self.store.free(sum);
                    continue;
                }
                self.inject(canvas, sum, rebuilt_seq, &mut resolvable)?;
            }
        }
        Ok(())
    }

    /// Feeds a received packet the caller keeps ownership of.
    ///
    /// The bytes are copied into a buffer of the packet store, from
    /// [`PacketStore::alloc_decoded`] for data packets and
    /// [`PacketStore::alloc_temp`] for parity packets, then handed to
    /// [`FecSession::decode_step`]. Nothing is allocated for packets already
    /// known.
    ///
    /// # Errors
    /// Returns `Error::OutOfMemory` if a buffer cannot be allocated.
    ///
    /// # Panics
    ///
    /// Same conditions as [`FecSession::decode_step`].
    pub fn decode_step_copy(
        &mut self,
        canvas: &mut PacketCanvas<S::Packet>,
        bytes: &[u8],
        seq: usize,
    ) -> Result<()> {
        self.check_decode_args(canvas, seq);
        assert_eq!(bytes.len(), self.block_size, "packet {} has the wrong size", seq);
        if self.is_packet_known(canvas, seq) {
            trace!("Packet {} already received or rebuilt, ignored", seq);
            return Ok(());
        }

        let mut packet = if self.layout.is_data(seq) {
            self.store.alloc_decoded(seq, self.block_size)?
        } else {
            self.store.alloc_temp(self.block_size)?
        };
        self.store.get_mut_uninit(&mut packet).copy_from_slice(bytes);
        self.store.store(&mut packet)?;
        self.decode_step(canvas, packet, seq)
    }

    fn check_decode_args(&self, canvas: &PacketCanvas<S::Packet>, seq: usize) {
        assert!(self.role.decodes(), "session cannot decode");
        assert!(seq < self.params.total_blocks(), "packet {} out of range", seq);
        assert_eq!(
            canvas.len(),
            self.params.data_blocks,
            "canvas must hold the data packets"
        );
    }

    /// Adds a newly known packet to its equations and stores it where it
    /// belongs. Rows left with one entry are pushed on `resolvable`.
    fn inject(
        &mut self,
        canvas: &mut PacketCanvas<S::Packet>,
        mut packet: S::Packet,
        seq: usize,
        resolvable: &mut Vec<usize>,
    ) -> Result<()> {
        let col = self.layout.col_of(seq);
        let is_data = self.layout.is_data(seq);

        // Parity packets are kept only while some equation is still far from
        // being solved; otherwise they are folded into partial sums.
        let keep_parity = !is_data
            && !self.small_fec_ratio
            && self
                .matrix
                .col_entries(col)
                .any(|e| self.unknown[self.matrix.row_of(e)] > 2);

        let value = self.store.get(&mut packet)?;
        let mut cursor = self.matrix.first_in_col(col);
        while let Some(entry) = cursor {
            cursor = self.matrix.next_in_col(entry);
            let row = self.matrix.row_of(entry);
            self.unknown[row] -= 1;

            let sum = match self.partial_sums[row].take() {
                Some(sum) => Some(sum),
                None if self.unknown[row] == 1 || self.small_fec_ratio => {
                    Some(self.store.alloc_temp(self.block_size)?)
                }
                None => None,
            };
            if let Some(mut sum) = sum {
                self.store.get(&mut sum)?;
                // The last term of an equation equals its partial sum.
                if self.matrix.row_degree(row) > 1 {
                    xor_into(sum.as_mut(), value);
                }
                self.matrix.delete(entry);
                if !self.small_fec_ratio {
                    self.fold_known(canvas, &mut sum, row)?;
                }
                self.store.store(&mut sum)?;
                if self.matrix.row_degree(row) == 0 {
                    self.store.free(sum);
                } else {
                    self.partial_sums[row] = Some(sum);
                }
            }

            if self.matrix.row_degree(row) == 1 {
                resolvable.push(row);
            }
        }

        if is_data {
            canvas.insert(seq, packet);
        } else if keep_parity && self.matrix.col_degree(col) > 0 {
            self.store.store(&mut packet)?;
            self.parity_canvas[seq - self.params.data_blocks] = Some(packet);
        } else {
            self.store.free(packet);
        }
        Ok(())
    }

    /// Adds every known packet still present in `row` to its partial sum and
    /// removes their entries.
    fn fold_known(
        &mut self,
        canvas: &mut PacketCanvas<S::Packet>,
        sum: &mut S::Packet,
        row: usize,
    ) -> Result<()> {
        let k = self.params.data_blocks;
        let mut cursor = self.matrix.first_in_row(row);
        while let Some(entry) = cursor {
            cursor = self.matrix.next_in_row(entry);
            let col = self.matrix.col_of(entry);
            let seq = self.layout.seq_of(col);
            let known = if seq < k {
                canvas.get_mut(seq)
            } else {
                self.parity_canvas[seq - k].as_mut()
            };
            let Some(known) = known else {
                continue;
            };
            xor_into(sum.as_mut(), self.store.get(known)?);
            self.matrix.delete(entry);

            if seq >= k && self.matrix.col_degree(col) == 0 {
                if let Some(parity) = self.parity_canvas[seq - k].take() {
                    trace!("Parity packet {} no longer needed", seq);
                    self.store.free(parity);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

    use super::*;
    use crate::{
        code::{CodeParams, CodecVariant},
        errors::Error,
        matrix::SparseBitMatrix,
        session::{Layout, SessionRole},
        store::HeapStore,
    };

    const SIZE: usize = 8;

    /// Session on a hand-made matrix.
    fn toy_session(matrix: SparseBitMatrix, k: usize, m: usize) -> FecSession {
        let rows = matrix.rows();
        let row_degrees: Vec<usize> = (0..rows).map(|r| matrix.row_degree(r)).collect();
        FecSession {
            params: CodeParams::new(k, m, 1, 0, CodecVariant::Ldgm).unwrap(),
            block_size: SIZE,
            role: SessionRole::Decoder,
            layout: Layout { data: k, parity: m },
            small_fec_ratio: false,
            matrix,
            store: HeapStore,
            encoder_unknown: Vec::new(),
            encoded_cols: Vec::new(),
            unknown: row_degrees,
            partial_sums: vec![None; rows],
            parity_canvas: vec![None; m],
            first_non_decoded: 0,
        }
    }

    fn packets(k: usize) -> Vec<Vec<u8>> {
        (0..k)
            .map(|i| (0..SIZE).map(|j| (i * 53 + j * 11 + 1) as u8).collect())
            .collect()
    }

    fn encode(params: CodeParams, data: &[Vec<u8>]) -> Vec<Vec<u8>> {
        let mut encoder = FecSession::new(params, SIZE, SessionRole::Encoder).unwrap();
        let mut all = data.to_vec();
        for i in 0..params.parity_blocks {
            let view: Vec<Option<&[u8]>> = (0..params.total_blocks())
                .map(|s| all.get(s).map(Vec::as_slice))
                .collect();
            let mut fec = vec![0; SIZE];
            encoder.build_fec_packet(&view, i, &mut fec).unwrap();
            all.push(fec);
        }
        all
    }

    #[test]
    fn two_equation_example() {
        // Columns: f1 (parity), s1, s2.
        // s1 + s2 + f1 = 0 and s2 + f1 = 0, so f1 = s2 and s1 = 0.
        let mut matrix = SparseBitMatrix::new(2, 3);
        for &(r, c) in &[(0, 0), (0, 1), (0, 2), (1, 0), (1, 2)] {
            matrix.insert(r, c);
        }
        let mut session = toy_session(matrix, 2, 1);
        let s2: Vec<u8> = (1..=SIZE as u8).collect();
        let f1 = s2.clone();

        let mut canvas = PacketCanvas::new(2);
        session.decode_step(&mut canvas, s2.clone(), 1).unwrap();
        // f1 was rebuilt on the way.
        assert!(session.is_packet_known(&canvas, 2));
        session.decode_step(&mut canvas, f1, 2).unwrap();
        assert!(session.is_decoding_complete(&canvas));
        assert_eq!(canvas.get(0), Some(&vec![0; SIZE]));
        assert_eq!(canvas.get(1), Some(&s2));
        assert_eq!(session.matrix().entry_count(), 0);
    }

    #[test]
    fn cascade_through_rebuilt_parity() {
        // Columns: f1, f2 (parity), s1, s2.
        // f1 + s1 + s2 = 0 and f2 + f1 + s2 = 0.
        let mut matrix = SparseBitMatrix::new(2, 4);
        for &(r, c) in &[(0, 0), (0, 2), (0, 3), (1, 0), (1, 1), (1, 3)] {
            matrix.insert(r, c);
        }
        let mut session = toy_session(matrix, 2, 2);
        let s1 = vec![0x5A; SIZE];
        let s2: Vec<u8> = (1..=SIZE as u8).collect();
        let f1: Vec<u8> = s1.iter().zip(&s2).map(|(a, b)| a ^ b).collect();
        let f2: Vec<u8> = f1.iter().zip(&s2).map(|(a, b)| a ^ b).collect();

        let mut canvas = PacketCanvas::new(2);
        session.decode_step(&mut canvas, s2.clone(), 1).unwrap();
        assert!(!session.is_decoding_complete(&canvas));
        session.decode_step(&mut canvas, f2, 3).unwrap();
        assert!(session.is_decoding_complete(&canvas));
        assert_eq!(canvas.get(0), Some(&s1));
        assert!(session.is_packet_known(&canvas, 2));
    }

    #[test]
    fn duplicates_change_nothing() {
        let params = CodeParams::new(20, 10, 3, 3, CodecVariant::Staircase).unwrap();
        let all = encode(params, &packets(20));
        let mut once = FecSession::new(params, SIZE, SessionRole::Decoder).unwrap();
        let mut twice = FecSession::new(params, SIZE, SessionRole::Decoder).unwrap();
        let mut canvas_once = PacketCanvas::new(20);
        let mut canvas_twice = PacketCanvas::new(20);
        for seq in [25, 3, 21, 7, 25, 12] {
            once.decode_step_copy(&mut canvas_once, &all[seq], seq).unwrap();
            twice.decode_step_copy(&mut canvas_twice, &all[seq], seq).unwrap();
            twice.decode_step_copy(&mut canvas_twice, &all[seq], seq).unwrap();
        }
        assert_eq!(canvas_once, canvas_twice);
        assert_eq!(once.matrix().to_string(), twice.matrix().to_string());
    }

    #[test]
    fn all_data_packets_complete_without_parity() {
        let params = CodeParams::new(10, 5, 3, 8, CodecVariant::Ldgm).unwrap();
        let data = packets(10);
        let mut session = FecSession::new(params, SIZE, SessionRole::Decoder).unwrap();
        let mut canvas = PacketCanvas::new(10);
        for (seq, packet) in data.iter().enumerate() {
            session.decode_step(&mut canvas, packet.clone(), seq).unwrap();
        }
        assert!(session.is_decoding_complete(&canvas));
        assert_eq!(canvas.into_slots(), data.into_iter().map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn recovers_from_shuffled_subsets() {
        let mut rng = StdRng::seed_from_u64(1);
        for variant in [CodecVariant::Staircase, CodecVariant::Triangle] {
            // Triangle with n < 2k exercises the small FEC ratio path.
            let params = CodeParams::new(40, 20, 7, 21, variant).unwrap();
            let data = packets(40);
            let all = encode(params, &data);
            let mut decoded = 0;
            for _ in 0..20 {
                let mut order: Vec<usize> = (0..60).collect();
                order.shuffle(&mut rng);
                order.truncate(56);
                let mut session = FecSession::new(params, SIZE, SessionRole::Decoder).unwrap();
                let mut canvas = PacketCanvas::new(40);
                for seq in order {
                    session.decode_step_copy(&mut canvas, &all[seq], seq).unwrap();
                }
                if session.is_decoding_complete(&canvas) {
                    decoded += 1;
                    for (seq, packet) in data.iter().enumerate() {
                        assert_eq!(canvas.get(seq), Some(packet), "{:?}", variant);
                    }
                }
            }
            // Heuristic, not law: losing 4 of 60 packets almost always
            // decodes.
            assert!(decoded >= 18, "{:?}: {} of 20", variant, decoded);
        }
    }

    #[test]
    fn partial_sums_are_released() {
        let params = CodeParams::new(16, 8, 3, 2, CodecVariant::Staircase).unwrap();
        let all = encode(params, &packets(16));
        let mut session = FecSession::new(params, SIZE, SessionRole::Decoder).unwrap();
        let mut canvas = PacketCanvas::new(16);
        for seq in (0..24).rev() {
            session.decode_step_copy(&mut canvas, &all[seq], seq).unwrap();
        }
        assert!(session.is_decoding_complete(&canvas));
        assert_eq!(session.matrix().entry_count(), 0);
        assert!(session.partial_sums.iter().all(Option::is_none));
        assert!(session.parity_canvas.iter().all(Option::is_none));
    }

    /// Store that refuses to allocate after a budget.
    struct TightStore {
        budget: usize,
    }

    impl PacketStore for TightStore {
        type Packet = Vec<u8>;

        fn alloc_decoded(&mut self, _seq: usize, size: usize) -> Result<Vec<u8>> {
            self.alloc_temp(size)
        }

        fn alloc_temp(&mut self, size: usize) -> Result<Vec<u8>> {
            if self.budget == 0 {
                return Err(Error::out_of_memory("budget exhausted"));
            }
            self.budget -= 1;
            Ok(vec![0; size])
        }
    }

    #[test]
    fn allocation_failure_is_reported() {
        let params = CodeParams::new(10, 5, 3, 4, CodecVariant::Staircase).unwrap();
        let all = encode(params, &packets(10));
        let mut session =
            FecSession::with_store(params, SIZE, SessionRole::Decoder, TightStore { budget: 2 })
                .unwrap();
        let mut canvas = PacketCanvas::new(10);
        let result = (0..15)
            .rev()
            .try_for_each(|seq| session.decode_step_copy(&mut canvas, &all[seq], seq));
        assert!(matches!(result, Err(Error::OutOfMemory(_))));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn rejects_unknown_sequence_numbers() {
        let params = CodeParams::new(4, 2, 2, 1, CodecVariant::Staircase).unwrap();
        let mut session = FecSession::new(params, SIZE, SessionRole::Decoder).unwrap();
        let mut canvas = PacketCanvas::new(4);
        let _ = session.decode_step(&mut canvas, vec![0; SIZE], 6);
    }
}
