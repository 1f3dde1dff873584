//! Packet buffer management.
//!
//! A [`FecSession`](crate::session::FecSession) never allocates packet
//! buffers by itself: it asks its [`PacketStore`]. Hosts that keep packets
//! outside of the heap (memory-mapped files, remote storage, pools) implement
//! the trait; everything else uses [`HeapStore`].
use crate::errors::Result;

/// Where and how packet bytes live.
///
/// `get` is called before the session reads a packet and may refresh its
/// content; `get_mut_uninit` hands out a destination that is about to be
/// fully overwritten, so no refresh is needed. `store` commits a packet once
/// the session is done writing it.
pub trait PacketStore {
    /// Owned packet buffer.
    type Packet: AsRef<[u8]> + AsMut<[u8]>;

    /// Allocates the permanent buffer of a data packet that has just been
    /// received or rebuilt.
    fn alloc_decoded(&mut self, seq: usize, size: usize) -> Result<Self::Packet>;

    /// Allocates a zero-filled scratch buffer (partial sums, retained parity
    /// packets).
    fn alloc_temp(&mut self, size: usize) -> Result<Self::Packet>;

    /// Makes sure the content of `packet` is up to date and returns it.
    fn get<'a>(&mut self, packet: &'a mut Self::Packet) -> Result<&'a [u8]> {
        Ok((*packet).as_ref())
    }

    /// Returns the bytes of `packet` for writing, without refreshing them.
    fn get_mut_uninit<'a>(&mut self, packet: &'a mut Self::Packet) -> &'a mut [u8] {
        packet.as_mut()
    }

    /// Commits the content of `packet`.
    fn store(&mut self, _packet: &mut Self::Packet) -> Result<()> {
        Ok(())
    }

    /// Releases a packet the session no longer needs.
    fn free(&mut self, packet: Self::Packet) {
        drop(packet);
    }
}

/// Plain heap buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapStore;

impl HeapStore {
    fn zeroed(size: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)?;
        buf.resize(size, 0);
        Ok(buf)
    }
}

impl PacketStore for HeapStore {
    type Packet = Vec<u8>;

    fn alloc_decoded(&mut self, _seq: usize, size: usize) -> Result<Vec<u8>> {
        Self::zeroed(size)
    }

    fn alloc_temp(&mut self, size: usize) -> Result<Vec<u8>> {
        Self::zeroed(size)
    }
}

/// XORs `src` into `dst`, eight bytes at a time.
///
/// # Panics
///
/// Panics if the lengths differ.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len(), "packets of different sizes");
    let mut dst_words = dst.chunks_exact_mut(8);
    let mut src_words = src.chunks_exact(8);
    for (d, s) in (&mut dst_words).zip(&mut src_words) {
        let sum = word(d) ^ word(s);
        d.copy_from_slice(&sum.to_ne_bytes());
    }
    for (d, s) in dst_words.into_remainder().iter_mut().zip(src_words.remainder()) {
        *d ^= s;
    }
}

fn word(bytes: &[u8]) -> u64 {
    let mut buf = [0; 8];
    buf.copy_from_slice(bytes);
    u64::from_ne_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_store_hands_out_zeroed_buffers() {
        let mut store = HeapStore;
        let mut p = store.alloc_temp(12).unwrap();
        assert_eq!(p, vec![0; 12]);
        assert_eq!(store.get(&mut p).unwrap(), &[0; 12]);
        store.get_mut_uninit(&mut p)[3] = 9;
        store.store(&mut p).unwrap();
        assert_eq!(p[3], 9);
        assert_eq!(store.alloc_decoded(5, 4).unwrap().len(), 4);
    }

    #[test]
    fn impossible_allocation_is_out_of_memory() {
        let err = HeapStore.alloc_temp(usize::MAX).unwrap_err();
        assert!(matches!(err, crate::errors::Error::OutOfMemory(_)));
    }

    #[test]
    fn xor_handles_word_and_tail_bytes() {
        let mut a: Vec<u8> = (0..12).collect();
        let b: Vec<u8> = (0..12).map(|x| x * 3 + 1).collect();
        let expected: Vec<u8> = a.iter().zip(&b).map(|(x, y)| x ^ y).collect();
        xor_into(&mut a, &b);
        assert_eq!(a, expected);
        xor_into(&mut a, &b);
        assert_eq!(a, (0..12).collect::<Vec<u8>>());
    }
}
