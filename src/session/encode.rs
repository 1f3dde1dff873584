//! Parity packet construction.
use log::trace;

use super::{FecSession, PacketCanvas};
use crate::{
    errors::{Error, Result},
    store::{PacketStore, xor_into},
};

impl<S: PacketStore> FecSession<S> {
    /// Builds parity packet `fec_index` into `dest`.
    ///
    /// The parity packet is the XOR of every other packet of its equation.
    /// With the Staircase and Triangle variants these include lower parity
    /// packets, so parity packets must be built in increasing order and put
    /// in the canvas as they are built.
    ///
    /// # Arguments
    /// * `canvas` - Packets by sequence number, data first then parity
    /// * `fec_index` - Index of the parity packet, in `0..m`
    /// * `dest` - Destination buffer of `block_size` bytes, overwritten
    ///
    /// # Errors
    /// Returns `Error::MissingPacket` if a needed packet is absent from the
    /// canvas and `Error::Format` if one has the wrong size. The session
    /// stays usable.
    ///
    /// # Panics
    ///
    /// Panics if the session cannot encode, if `fec_index` is out of range or
    /// if `dest` does not hold `block_size` bytes.
    pub fn build_fec_packet(
        &mut self,
        canvas: &[Option<&[u8]>],
        fec_index: usize,
        dest: &mut S::Packet,
    ) -> Result<()> {
        assert!(self.role.encodes(), "session cannot encode");
        assert!(
            fec_index < self.params.parity_blocks,
            "parity index {} out of range",
            fec_index
        );

        let fec = self.store.get_mut_uninit(dest);
        assert_eq!(fec.len(), self.block_size, "destination has the wrong size");
        fec.fill(0);

        for entry in self.matrix.row_entries(fec_index) {
            let col = self.matrix.col_of(entry);
            if col == fec_index {
                continue;
            }
            let seq = self.layout.seq_of(col);
            let packet = canvas
                .get(seq)
                .copied()
                .flatten()
                .ok_or(Error::MissingPacket(seq))?;
            if packet.len() != self.block_size {
                return Err(Error::format(format!(
                    "packet {} holds {} bytes instead of {}",
                    seq,
                    packet.len(),
                    self.block_size
                )));
            }
            xor_into(fec, packet);
        }

        self.store.store(dest)?;
        trace!("Built parity packet {}", fec_index);
        Ok(())
    }

    /// Adds packet `seq` of `canvas` to every parity packet it contributes
    /// to.
    ///
    /// Parity buffers are allocated zeroed in the canvas on first use. A
    /// parity packet is complete once every other packet of its equation was
    /// added; it is then added in turn to the equations it takes part in.
    /// Adding the same packet twice has no effect.
    ///
    /// # Arguments
    /// * `canvas` - Packets by sequence number, `k + m` slots
    /// * `seq` - Packet that just became available
    ///
    /// # Returns
    /// The sequence numbers of the parity packets completed by this call.
    ///
    /// # Errors
    /// Returns `Error::MissingPacket` if packet `seq` is not in the canvas,
    /// `Error::Format` if it has the wrong size and `Error::OutOfMemory` if a
    /// parity buffer cannot be allocated.
    pub fn build_fec_packets_per_col(
        &mut self,
        canvas: &mut PacketCanvas<S::Packet>,
        seq: usize,
    ) -> Result<Vec<usize>> {
        assert!(self.role.encodes(), "session cannot encode");
        assert_eq!(
            canvas.len(),
            self.params.total_blocks(),
            "canvas must hold every packet"
        );
        if canvas.get(seq).is_none() {
            return Err(Error::MissingPacket(seq));
        }

        let k = self.params.data_blocks;
        let mut completed = Vec::new();
        let mut pending = vec![self.layout.col_of(seq)];
        while let Some(col) = pending.pop() {
            if self.encoded_cols[col] {
                continue;
            }
            self.encoded_cols[col] = true;

            let src_seq = self.layout.seq_of(col);
            let rows: Vec<usize> = self
                .matrix
                .col_entries(col)
                .map(|e| self.matrix.row_of(e))
                .filter(|&row| row != col)
                .collect();
            for row in rows {
                let parity_seq = row + k;
                let mut parity = match canvas.take(parity_seq) {
                    Some(parity) => parity,
                    None => self.store.alloc_temp(self.block_size)?,
                };
                let result = self.add_to_parity(canvas, src_seq, &mut parity);
                canvas.insert(parity_seq, parity);
                result?;

                self.encoder_unknown[row] -= 1;
                if self.encoder_unknown[row] == 1 {
                    trace!("Parity packet {} complete", parity_seq);
                    completed.push(parity_seq);
                    pending.push(row);
                }
            }
        }
        Ok(completed)
    }

    fn add_to_parity(
        &mut self,
        canvas: &mut PacketCanvas<S::Packet>,
        src_seq: usize,
        parity: &mut S::Packet,
    ) -> Result<()> {
        let src = canvas
            .get_mut(src_seq)
            .ok_or(Error::MissingPacket(src_seq))?;
        let src = self.store.get(src)?;
        if src.len() != self.block_size {
            return Err(Error::format(format!(
                "packet {} holds {} bytes instead of {}",
                src_seq,
                src.len(),
                self.block_size
            )));
        }
        self.store.get(parity)?;
        xor_into(parity.as_mut(), src);
        self.store.store(parity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        code::{CodeParams, CodecVariant},
        session::SessionRole,
    };

    fn data(k: usize, size: usize) -> Vec<Vec<u8>> {
        (0..k)
            .map(|i| (0..size).map(|j| (i * 31 + j * 7) as u8).collect())
            .collect()
    }

    fn build_all(session: &mut FecSession, data: &[Vec<u8>]) -> Vec<Vec<u8>> {
        let params = *session.params();
        let mut packets: Vec<Vec<u8>> = data.to_vec();
        for i in 0..params.parity_blocks {
            let view: Vec<Option<&[u8]>> = (0..params.total_blocks())
                .map(|s| packets.get(s).map(Vec::as_slice))
                .collect();
            let mut fec = vec![0xAA; session.block_size()];
            session.build_fec_packet(&view, i, &mut fec).unwrap();
            packets.push(fec);
        }
        packets.split_off(params.data_blocks)
    }

    #[test]
    fn every_equation_sums_to_zero() {
        for variant in [CodecVariant::Ldgm, CodecVariant::Staircase, CodecVariant::Triangle] {
            let params = CodeParams::new(16, 8, 3, 5, variant).unwrap();
            let mut session = FecSession::new(params, 12, SessionRole::Encoder).unwrap();
            let data = data(16, 12);
            let parity = build_all(&mut session, &data);
            let packet = |seq: usize| if seq < 16 { &data[seq] } else { &parity[seq - 16] };
            for row in 0..8 {
                let mut sum = vec![0u8; 12];
                for e in session.matrix().row_entries(row) {
                    xor_into(&mut sum, packet(session.layout.seq_of(session.matrix().col_of(e))));
                }
                assert_eq!(sum, vec![0; 12], "{:?} row {}", variant, row);
            }
        }
    }

    #[test]
    fn same_input_same_parity() {
        let params = CodeParams::new(10, 5, 3, 77, CodecVariant::Staircase).unwrap();
        let data = data(10, 8);
        let mut a = FecSession::new(params, 8, SessionRole::Encoder).unwrap();
        let mut b = FecSession::new(params, 8, SessionRole::Encoder).unwrap();
        assert_eq!(build_all(&mut a, &data), build_all(&mut b, &data));
    }

    #[test]
    fn missing_packet_is_reported_and_session_survives() {
        let params = CodeParams::new(6, 3, 2, 1, CodecVariant::Ldgm).unwrap();
        let mut session = FecSession::new(params, 4, SessionRole::Encoder).unwrap();
        let data = data(6, 4);
        let missing = session
            .matrix()
            .row_entries(0)
            .map(|e| session.matrix().col_of(e))
            .find(|&c| c >= 3)
            .map(|c| c - 3)
            .unwrap();
        let view: Vec<Option<&[u8]>> = (0..9)
            .map(|s| (s < 6 && s != missing).then(|| data[s].as_slice()))
            .collect();
        let mut fec = vec![0; 4];
        let err = session.build_fec_packet(&view, 0, &mut fec).unwrap_err();
        assert!(matches!(err, Error::MissingPacket(s) if s == missing));

        let full: Vec<Option<&[u8]>> = (0..9).map(|s| data.get(s).map(Vec::as_slice)).collect();
        session.build_fec_packet(&full, 0, &mut fec).unwrap();
    }

    #[test]
    fn per_column_encoding_matches_row_encoding() {
        for variant in [CodecVariant::Ldgm, CodecVariant::Staircase, CodecVariant::Triangle] {
            let params = CodeParams::new(20, 10, 4, 9, variant).unwrap();
            let data = data(20, 16);
            let mut reference = FecSession::new(params, 16, SessionRole::Encoder).unwrap();
            let expected = build_all(&mut reference, &data);

            let mut session = FecSession::new(params, 16, SessionRole::Encoder).unwrap();
            let mut canvas = PacketCanvas::new(30);
            let mut completed = Vec::new();
            for (seq, packet) in data.iter().enumerate().rev() {
                canvas.insert(seq, packet.clone());
                completed.extend(session.build_fec_packets_per_col(&mut canvas, seq).unwrap());
                // Feeding twice changes nothing.
                assert!(session.build_fec_packets_per_col(&mut canvas, seq).unwrap().is_empty());
            }
            completed.sort_unstable();
            assert_eq!(completed, (20..30).collect::<Vec<_>>(), "{:?}", variant);
            for i in 0..10 {
                assert_eq!(canvas.get(20 + i), Some(&expected[i]), "{:?} parity {}", variant, i);
            }
        }
    }
}
