//! # Execution-Time Profiler
//!
//! O(1) switch-in/switch-out accounting and the global CPU-load estimate.
//! Both updates run synchronously inside the dispatch transition.
//!
//! ## Clock wrap-around
//!
//! Timestamps are raw readings of a free-running `u32` counter. The
//! profiler keeps a 64-bit extension: any reading smaller than the previous
//! one is taken as exactly one wrap. The scheduler samples the clock on
//! every tick, so the extension is exact as long as the counter wraps less
//! than once per tick (a 16 MHz cycle counter wraps every ~268 s).

use crate::task::TaskId;

#[derive(Debug)]
pub struct Profiler {
    /// High bits of the extended clock.
    epoch: u64,
    last_raw: u32,
    /// Extended timestamp of the boot sample.
    origin: u64,
    started: bool,
    /// Task currently switched in and its extended entry timestamp.
    entry: Option<(TaskId, u64)>,
    total_execution: u64,
    cpu_load: u32,
}

impl Profiler {
    pub const fn new() -> Self {
        Self {
            epoch: 0,
            last_raw: 0,
            origin: 0,
            started: false,
            entry: None,
            total_execution: 0,
            cpu_load: 0,
        }
    }

    /// Take the boot sample. Load is measured from here.
    pub fn start(&mut self, raw: u32) {
        self.last_raw = raw;
        self.epoch = 0;
        self.origin = raw as u64;
        self.started = true;
    }

    /// Extend a raw reading to 64 bits.
    pub fn observe(&mut self, raw: u32) -> u64 {
        if !self.started {
            self.start(raw);
        }
        if raw < self.last_raw {
            self.epoch += 1 << 32;
        }
        self.last_raw = raw;
        self.epoch | raw as u64
    }

    /// Not-Running → Running.
    pub fn enter(&mut self, task: TaskId, raw: u32) {
        let now = self.observe(raw);
        self.entry = Some((task, now));
    }

    /// Running → not-Running. Returns the task and the time it just ran.
    pub fn exit(&mut self, raw: u32) -> Option<(TaskId, u64)> {
        let now = self.observe(raw);
        let (task, entered) = self.entry.take()?;
        let elapsed = now.saturating_sub(entered);
        self.total_execution = self.total_execution.saturating_add(elapsed);
        self.cpu_load = Self::load(self.total_execution, now - self.origin);
        Some((task, elapsed))
    }

    fn load(busy: u64, wall: u64) -> u32 {
        if wall == 0 {
            return 0;
        }
        (busy.saturating_mul(100) / wall).min(100) as u32
    }

    /// Percentage of wall-clock time spent in non-idle tasks since boot,
    /// as of the last switch-out.
    pub fn cpu_load(&self) -> u32 {
        self.cpu_load
    }

    /// Sum of all completed execution intervals.
    pub fn total_execution_time(&self) -> u64 {
        self.total_execution
    }

    /// Time since boot as of the last observation.
    pub fn uptime(&self) -> u64 {
        (self.epoch | self.last_raw as u64) - self.origin
    }
}
