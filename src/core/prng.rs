// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives edge weights and cycle source selection; tests pin a seed.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    /// Seed from the wall clock. Visual output is meant to differ per mount.
    pub fn from_entropy() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        use std::time::{SystemTime, UNIX_EPOCH};
        #[cfg(target_arch = "wasm32")]
        use web_time::{SystemTime, UNIX_EPOCH};

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(nanos ^ 0xD1B54A32D192ED03)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        // Marsaglia / Vigna family. Simple, fast, decent for simulation noise.
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // Convert to [0,1).
        let x = self.next_u32();
        (x as f32) / (u32::MAX as f32 + 1.0)
    }

    #[inline]
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32_01()
    }

    /// Uniform-ish in `low..high`; returns `low` for an empty range.
    ///
    /// Reduction is by `%`, so the result is modulo-biased. Fine for layout
    /// jitter and source picks, not for anything that needs exact uniformity.
    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u64;
        let v = self.next_u64() % span;
        low + v as usize
    }

    /// Uniform in `low..=high`.
    #[inline]
    pub fn gen_inclusive_usize(&mut self, low: usize, high: usize) -> usize {
        self.gen_range_usize(low, high.saturating_add(1))
    }

    /// Pick `count` distinct values from `0..n` (partial Fisher-Yates).
    ///
    /// `scratch` is reused between calls so steady-state sampling does not allocate.
    pub fn sample_distinct(&mut self, n: usize, count: usize, scratch: &mut Vec<usize>) {
        scratch.clear();
        scratch.extend(0..n);
        let count = count.min(n);
        for i in 0..count {
            let j = self.gen_range_usize(i, n);
            scratch.swap(i, j);
        }
        scratch.truncate(count);
    }
}
