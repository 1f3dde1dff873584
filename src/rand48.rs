//! The `lrand48` linear congruential generator.
//!
//! Matrix topology is a pure function of the seed, and encoder and decoder
//! never exchange the matrix. Both ends must therefore draw exactly the same
//! stream. The generator keeps the 48-bit state `X`, iterates
//! `X ← a·X + c mod 2⁴⁸` with `a = 0x5DEECE66D` and `c = 0xB`, and returns the
//! 31 high bits of the new state, as `lrand48(3)` does.

const MULTIPLIER: u64 = 0x5_DEEC_E66D;
const INCREMENT: u64 = 0xB;
const MASK: u64 = (1 << 48) - 1;
const LOW_SEED_BITS: u64 = 0x330E;

/// Seeded `lrand48` stream, owned by whoever builds a matrix.
#[derive(Clone, Debug)]
pub struct Lrand48 {
    state: u64,
}

impl Lrand48 {
    /// Creates a generator in the state `srand48(seed)` leaves behind.
    pub fn new(seed: u32) -> Self {
        Self {
            state: ((seed as u64) << 16) | LOW_SEED_BITS,
        }
    }

    /// Next non-negative 31-bit value.
    pub fn next_i31(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT) & MASK;
        (self.state >> 17) as u32
    }

    /// Next value reduced modulo `bound`, i.e. `lrand48() % bound`.
    ///
    /// The modulo bias is kept on purpose: deployed peers reduce the same way.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    pub fn below(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "bound must be non-zero");
        self.next_i31() as usize % bound
    }
}
