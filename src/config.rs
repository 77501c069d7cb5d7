//! # EdfOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time (no dynamic allocation), and a
//! small runtime [`SchedulerConfig`] selects policy.

/// Scheduler time unit. One tick is one SysTick period.
///
/// Ticks are 64-bit: at `TICK_HZ = 1000` the counter does not wrap in any
/// realistic uptime, so release and deadline arithmetic never wraps.
pub type Tick = u64;

/// Maximum number of user tasks the system can manage simultaneously.
/// This bounds the TCB table. The idle context is not counted here.
pub const MAX_TASKS: usize = 8;

/// Maximum number of queues and mailboxes.
pub const MAX_QUEUES: usize = 8;

/// Total words available for task stacks, shared by all tasks and the
/// idle context. Stacks are carved out bump-style and never returned.
pub const STACK_POOL_WORDS: usize = 2048;

/// Smallest stack a task may request, in words. Must hold the initial
/// 16-word exception frame plus some headroom for the task body.
pub const MIN_STACK_WORDS: usize = 32;

/// Stack size used by [`TaskConfig::periodic`](crate::task::TaskConfig::periodic), in words.
pub const DEFAULT_STACK_WORDS: usize = 128;

/// Stack reserved for the idle context, in words.
pub const IDLE_STACK_WORDS: usize = 64;

/// Total bytes of item storage shared by all queues.
pub const QUEUE_POOL_BYTES: usize = 512;

/// Largest item a queue may carry, in bytes. Blocked senders park a copy
/// of their item in the wait list, so this also bounds wait-list entries.
pub const MAX_ITEM_SIZE: usize = 16;

/// Capacity of the event ring drained by external collaborators.
/// When full, the oldest event is dropped and counted.
pub const EVENT_BUFFER_LEN: usize = 32;

/// SysTick frequency in Hz. One tick = 1 ms.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Timeout value that blocks without a wake tick.
pub const WAIT_FOREVER: Tick = Tick::MAX;

/// What happens to a job that is still unfinished when its task's next
/// release arrives.
///
/// Both policies record the deadline miss; they differ only in what the
/// task runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrunPolicy {
    /// The late job is dropped and the task is re-released immediately under
    /// the new deadline. The task itself is never killed.
    #[default]
    Abandon,
    /// The late job keeps its old deadline. The missed release is parked and
    /// issued as soon as the late job completes. Consecutive misses coalesce
    /// into the latest parked release.
    Defer,
}

/// Runtime scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerConfig {
    /// Policy applied when a release arrives before the previous job ends.
    pub overrun_policy: OverrunPolicy,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        Self {
            overrun_policy: OverrunPolicy::Abandon,
        }
    }

    pub const fn with_overrun_policy(mut self, policy: OverrunPolicy) -> Self {
        self.overrun_policy = policy;
        self
    }
}
