/// Counter-based random number generator.
///
/// Every draw is a pure function of `(seed, generation)`, so a generator can
/// be rewound, peeked ahead, or branched into a derived substream without
/// disturbing the parent sequence.

use rand::RngCore;

const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeedGen {
    seed: u64,
    generation: u64,
}

/// Seeded generator with a monotonically increasing generation counter and a
/// stack of branches. Implements [`RngCore`], so the usual `rand::Rng`
/// helpers (`gen_range`, `gen_bool`, `WeightedIndex`) draw from it directly.
#[derive(Debug, Clone)]
pub struct GenRng {
    root: SeedGen,
    branches: Vec<SeedGen>,
}

impl GenRng {
    pub fn new(seed: u64) -> Self {
        Self::with_generation(seed, 0)
    }

    pub fn with_generation(seed: u64, generation: u64) -> Self {
        Self {
            root: SeedGen { seed, generation },
            branches: Vec::new(),
        }
    }

    /// Raw 64-bit value for a seed/generation pair.
    pub fn raw_at(seed: u64, generation: u64) -> u64 {
        let mut z = seed
            .wrapping_add(generation.wrapping_mul(GOLDEN))
            .wrapping_add(GOLDEN);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn top(&self) -> &SeedGen {
        self.branches.last().unwrap_or(&self.root)
    }

    fn top_mut(&mut self) -> &mut SeedGen {
        match self.branches.last_mut() {
            Some(top) => top,
            None => &mut self.root,
        }
    }

    /// Seed of the root stream.
    pub fn base_seed(&self) -> u64 {
        self.root.seed
    }

    /// Seed of the active branch.
    pub fn seed(&self) -> u64 {
        self.top().seed
    }

    pub fn generation(&self) -> u64 {
        self.top().generation
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.top_mut().generation = generation;
    }

    /// Number of active branches above the root stream.
    pub fn depth(&self) -> usize {
        self.branches.len()
    }

    /// Returns the raw value at the current generation and advances it.
    pub fn next_raw(&mut self) -> u64 {
        let top = self.top_mut();
        let value = Self::raw_at(top.seed, top.generation);
        top.generation = top.generation.wrapping_add(1);
        value
    }

    /// Raw value at an arbitrary generation of the active stream. Does not
    /// advance the generator.
    pub fn peek_at(&self, generation: u64) -> u64 {
        Self::raw_at(self.seed(), generation)
    }

    /// Value in `0..max` at an arbitrary generation. Returns 0 when `max` is 0.
    pub fn peek_at_range(&self, generation: u64, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.peek_at(generation) % max as u64) as usize
    }

    /// Rewinds the active stream to generation zero.
    pub fn reset(&mut self) {
        self.top_mut().generation = 0;
    }

    /// Rewinds the active stream and replaces its seed.
    pub fn reset_with(&mut self, seed: u64) {
        let top = self.top_mut();
        top.seed = seed;
        top.generation = 0;
    }

    /// Pushes a substream derived from the active seed and `seed`.
    pub fn branch(&mut self, seed: u64) {
        let derived = Self::raw_at(seed, self.seed());
        self.branches.push(SeedGen {
            seed: derived,
            generation: 0,
        });
    }

    /// Drops the topmost branch. Returns `false` if only the root remains.
    pub fn merge(&mut self) -> bool {
        self.branches.pop().is_some()
    }
}

impl RngCore for GenRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_raw() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_raw()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_raw().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
