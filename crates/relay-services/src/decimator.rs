//! Deterministic decimation for the secondary output.
//!
//! With factor N > 1 the decimator answers `false` N-1 times and then
//! `true`, forever. The first `true` comes on the Nth call after
//! construction or [`Decimator::reset`]. Factors 0 and 1 always answer `true`.

#[derive(Debug, Clone)]
pub struct Decimator {
    factor: u32,
    cycle_count: u32,
}

impl Decimator {
    pub fn new(factor: u32) -> Self {
        Self {
            factor,
            cycle_count: 0,
        }
    }

    /// Advance one packet and report whether it goes to the decimated output.
    pub fn should_send(&mut self) -> bool {
        if self.factor <= 1 {
            return true;
        }

        self.cycle_count += 1;
        if self.cycle_count >= self.factor {
            self.cycle_count = 0;
            return true;
        }
        false
    }

    /// Restart the cycle as if freshly constructed.
    pub fn reset(&mut self) {
        self.cycle_count = 0;
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    /// Decisions made since the last send, in `[0, factor)`.
    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }
}
