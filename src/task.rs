//! # Task Control Block
//!
//! Defines the periodic task model for EdfOS. Each task releases one job
//! per period; every job must finish by its absolute deadline, which is the
//! only priority signal the scheduler consults.
//!
//! TCBs are created once during initialization and live for the lifetime
//! of the scheduler. Ids are indices into the registry and are never reused.

use heapless::Vec;

use crate::config::{Tick, DEFAULT_STACK_WORDS, MAX_ITEM_SIZE, MIN_STACK_WORDS};
use crate::error::{IpcResult, KernelError, KernelResult};
use crate::ipc::QueueId;

/// Task entry point. Receives the `arg` word from [`TaskConfig`] in R0.
pub type TaskEntry = extern "C" fn(usize) -> !;

/// Stable integer task identifier, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// Index of the task in the registry.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///            release_due()                   dispatch
///  ┌─────────┐ ───────────► ┌─────────┐ ───────────► ┌─────────┐
///  │ Dormant │              │  Ready  │              │ Running │
///  └─────────┘ ◄─────┐      └─────────┘ ◄─────────── └─────────┘
///       ▲            │           ▲         preempt       │  │
///       │            │           │  wake / timeout       │  │
///       │            │      ┌─────────┐    block()       │  │
///       │            │      │ Blocked │ ◄────────────────┘  │
///       │            │      └─────────┘                     │
///       │            └──────────────────────────────────────┘
///       │                          complete_job()
///   resume()   ┌───────────┐
///       └───── │ Suspended │ ◄── suspend()
///              └───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Current job finished; waiting for the next release.
    Dormant,
    /// Released and eligible, not executing.
    Ready,
    /// Executing on the CPU.
    Running,
    /// Waiting on a queue or an explicit delay.
    Blocked,
    /// Ignored by release and dispatch until resumed.
    Suspended,
}

/// Why a Blocked task is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// `delay()` until the given tick.
    Delay { until: Tick },
    /// Waiting for space in a queue.
    Send { queue: QueueId, wake_at: Option<Tick> },
    /// Waiting for an item from a queue.
    Receive { queue: QueueId, wake_at: Option<Tick> },
}

impl BlockReason {
    /// Tick at which the wait expires, if any.
    pub const fn wake_at(&self) -> Option<Tick> {
        match *self {
            BlockReason::Delay { until } => Some(until),
            BlockReason::Send { wake_at, .. } | BlockReason::Receive { wake_at, .. } => wake_at,
        }
    }
}

/// Outcome slot for a blocking IPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitSlot {
    Empty,
    Pending,
    Done(IpcResult),
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static configuration for a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskConfig {
    /// Release period in ticks. Must be non-zero.
    pub period: Tick,
    /// Relative deadline in ticks. `None` means deadline = period.
    pub deadline: Option<Tick>,
    /// Stack size in words.
    pub stack_words: usize,
    /// Word passed to the entry function.
    pub arg: usize,
}

impl TaskConfig {
    /// A task with the given period, implicit deadline and default stack.
    pub const fn periodic(period: Tick) -> Self {
        Self {
            period,
            deadline: None,
            stack_words: DEFAULT_STACK_WORDS,
            arg: 0,
        }
    }

    pub const fn with_deadline(mut self, deadline: Tick) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub const fn with_stack_words(mut self, words: usize) -> Self {
        self.stack_words = words;
        self
    }

    pub const fn with_arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    /// Effective relative deadline, falling back to the period.
    #[inline]
    pub const fn relative_deadline(&self) -> Tick {
        match self.deadline {
            Some(d) => d,
            None => self.period,
        }
    }

    /// Reject parameters the release mechanism cannot honor.
    pub fn validate(&self) -> KernelResult {
        let deadline = self.relative_deadline();
        if self.period == 0 || deadline == 0 || deadline > self.period {
            return Err(KernelError::InvalidConfig);
        }
        if self.stack_words < MIN_STACK_WORDS {
            return Err(KernelError::InvalidConfig);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Opaque execution context: a region of the registry's stack pool and the
/// saved stack pointer, all in word offsets into the pool.
///
/// Offsets rather than addresses keep the scheduler movable; the target
/// port resolves them against the pool once the scheduler sits in its
/// `static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecContext {
    pub(crate) base: usize,
    pub(crate) words: usize,
    pub(crate) sp: usize,
}

impl ExecContext {
    /// First word of the stack region.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// One past the last word of the stack region.
    pub const fn top(&self) -> usize {
        self.base + self.words
    }

    /// Saved stack pointer (word offset into the pool).
    pub const fn stack_pointer(&self) -> usize {
        self.sp
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
pub struct TaskControlBlock {
    pub(crate) id: TaskId,
    pub(crate) name: &'static str,
    pub(crate) state: TaskState,
    pub(crate) period: Tick,
    pub(crate) deadline: Tick,
    pub(crate) absolute_deadline: Tick,
    pub(crate) release_time: Tick,
    pub(crate) execution_time: u64,
    pub(crate) deadline_misses: u32,
    pub(crate) jobs_completed: u32,
    pub(crate) releases: u32,
    /// Set once the current job has been counted as missed.
    pub(crate) job_missed: bool,
    /// Release instant parked by [`OverrunPolicy::Defer`](crate::config::OverrunPolicy::Defer).
    pub(crate) parked_release: Option<Tick>,
    pub(crate) block: Option<BlockReason>,
    pub(crate) wait: WaitSlot,
    /// Item delivered to a blocked receiver.
    pub(crate) inbox: Vec<u8, MAX_ITEM_SIZE>,
    pub(crate) context: ExecContext,
}

impl TaskControlBlock {
    /// A Dormant task whose first release is at `now`.
    pub(crate) fn new(
        id: TaskId,
        name: &'static str,
        config: &TaskConfig,
        context: ExecContext,
        now: Tick,
    ) -> Self {
        Self {
            id,
            name,
            state: TaskState::Dormant,
            period: config.period,
            deadline: config.relative_deadline(),
            absolute_deadline: now,
            release_time: now,
            execution_time: 0,
            deadline_misses: 0,
            jobs_completed: 0,
            releases: 0,
            job_missed: false,
            parked_release: None,
            block: None,
            wait: WaitSlot::Empty,
            inbox: Vec::new(),
            context,
        }
    }

    /// Start a new job at the pending release instant.
    ///
    /// The deadline is derived from the scheduled release time, not from the
    /// moment the release is observed, so late observation never drifts.
    pub(crate) fn release(&mut self) {
        self.absolute_deadline = self.release_time + self.deadline;
        self.release_time += self.period;
        self.releases = self.releases.wrapping_add(1);
        self.job_missed = false;
    }

    /// Record a deadline miss for the current job. Returns `false` if the job
    /// was already counted.
    pub(crate) fn record_miss(&mut self) -> bool {
        if self.job_missed {
            return false;
        }
        self.job_missed = true;
        self.deadline_misses = self.deadline_misses.saturating_add(1);
        true
    }

    /// EDF rank: smaller is more urgent. A total order, ties broken by id.
    #[inline]
    pub fn rank(&self) -> (Tick, TaskId) {
        (self.absolute_deadline, self.id)
    }

    /// Ready or Running.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// A released job that has not completed yet. A task sleeping in
    /// `delay()` is off the CPU between jobs and does not count.
    #[inline]
    pub fn has_active_job(&self) -> bool {
        match self.state {
            TaskState::Ready | TaskState::Running => true,
            TaskState::Blocked => !self.is_delayed(),
            _ => false,
        }
    }

    /// Blocked in `delay()`.
    #[inline]
    pub fn is_delayed(&self) -> bool {
        matches!(self.block, Some(BlockReason::Delay { .. }))
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn period(&self) -> Tick {
        self.period
    }

    /// Relative deadline.
    pub fn deadline(&self) -> Tick {
        self.deadline
    }

    pub fn absolute_deadline(&self) -> Tick {
        self.absolute_deadline
    }

    /// Next instant the task becomes eligible.
    pub fn release_time(&self) -> Tick {
        self.release_time
    }

    /// Cumulative execution time in clock units, updated on every switch-out.
    pub fn execution_time(&self) -> u64 {
        self.execution_time
    }

    pub fn deadline_misses(&self) -> u32 {
        self.deadline_misses
    }

    pub fn jobs_completed(&self) -> u32 {
        self.jobs_completed
    }

    /// Number of jobs released so far.
    pub fn releases(&self) -> u32 {
        self.releases
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        self.block
    }

    pub fn context(&self) -> &ExecContext {
        &self.context
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
