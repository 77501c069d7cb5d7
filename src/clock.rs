//! # Trace Clock
//!
//! Free-running 32-bit timestamp source consumed by the profiler. Its
//! resolution is independent of the scheduler tick: on target it is the
//! core cycle counter, in tests a virtual counter advanced by hand.

/// A free-running `u32` counter. It may wrap; the profiler extends it.
pub trait Clock {
    fn now(&self) -> u32;
}

/// Deterministic clock for tests and simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualClock {
    now: u32,
}

impl VirtualClock {
    pub const fn new() -> Self {
        Self { now: 0 }
    }

    /// A clock whose counter starts at `now`, e.g. just below the wrap point.
    pub const fn starting_at(now: u32) -> Self {
        Self { now }
    }

    /// Advance by `units`, wrapping like a hardware counter.
    pub fn advance(&mut self, units: u32) {
        self.now = self.now.wrapping_add(units);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> u32 {
        self.now
    }
}

/// DWT cycle counter. Requires `DCB::enable_trace` and
/// `DWT::enable_cycle_counter` before use (done by `kernel::start`).
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct DwtClock;

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl Clock for DwtClock {
    #[inline]
    fn now(&self) -> u32 {
        cortex_m::peripheral::DWT::cycle_count()
    }
}
