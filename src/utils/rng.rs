//! Small deterministic PRNG used for weight initialisation, dropout masks
//! and sample shuffling.
//!
//! Training must be reproducible from a seed, so the crate carries its own
//! xorshift generator instead of reaching for thread-local entropy.

/// Xorshift64 generator.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

const FALLBACK_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

impl SimpleRng {
    /// Create a generator from `seed`; zero is replaced by a fixed constant
    /// because xorshift never leaves the all-zero state.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { FALLBACK_SEED } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // 24 bits fit the f32 mantissa exactly, so 1.0 is never produced.
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u64() % upper as u64) as usize
        }
    }

    /// `true` with probability `p`.
    pub fn gen_bool(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }

    /// Split off an independent generator, e.g. one per worker slot.
    pub fn fork(&mut self) -> SimpleRng {
        SimpleRng::new(self.next_u64() ^ FALLBACK_SEED)
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }
}
