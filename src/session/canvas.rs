//! Packets indexed by sequence number.

/// Slots of packets indexed by sequence number.
///
/// A slot goes from unknown (`None`) to known and never back while a session
/// works on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketCanvas<P> {
    slots: Vec<Option<P>>,
}

impl<P> PacketCanvas<P> {
    /// Creates a canvas of `len` unknown slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(len).collect(),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the canvas has no slot at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether packet `seq` is known.
    pub fn is_known(&self, seq: usize) -> bool {
        self.slots[seq].is_some()
    }

    /// Number of known packets.
    pub fn known_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Packet `seq`, if known.
    pub fn get(&self, seq: usize) -> Option<&P> {
        self.slots[seq].as_ref()
    }

    /// Mutable access to packet `seq`, if known.
    pub fn get_mut(&mut self, seq: usize) -> Option<&mut P> {
        self.slots[seq].as_mut()
    }

    /// Fills slot `seq`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already known.
    pub fn insert(&mut self, seq: usize, packet: P) {
        assert!(self.slots[seq].is_none(), "packet {} is already known", seq);
        self.slots[seq] = Some(packet);
    }

    /// Empties slot `seq` and returns its packet.
    pub fn take(&mut self, seq: usize) -> Option<P> {
        self.slots[seq].take()
    }

    /// Iterates over the slots in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&P>> {
        self.slots.iter().map(Option::as_ref)
    }

    /// Consumes the canvas and returns its slots.
    pub fn into_slots(self) -> Vec<Option<P>> {
        self.slots
    }
}

impl<P: AsRef<[u8]>> PacketCanvas<P> {
    /// Borrowed view of the canvas, as the encoder takes it.
    pub fn as_view(&self) -> Vec<Option<&[u8]>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map(AsRef::as_ref))
            .collect()
    }
}

impl<P> From<Vec<Option<P>>> for PacketCanvas<P> {
    fn from(slots: Vec<Option<P>>) -> Self {
        Self { slots }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_fill_once() {
        let mut canvas: PacketCanvas<Vec<u8>> = PacketCanvas::new(3);
        assert_eq!(canvas.len(), 3);
        assert_eq!(canvas.known_count(), 0);
        canvas.insert(1, vec![7, 7]);
        assert!(canvas.is_known(1));
        assert!(!canvas.is_known(0));
        assert_eq!(canvas.as_view(), vec![None, Some(&[7u8, 7][..]), None]);
        assert_eq!(canvas.take(1), Some(vec![7, 7]));
        assert_eq!(canvas.known_count(), 0);
    }

    #[test]
    #[should_panic(expected = "already known")]
    fn double_insert_panics() {
        let mut canvas = PacketCanvas::new(1);
        canvas.insert(0, vec![1u8]);
        canvas.insert(0, vec![2u8]);
    }
}
