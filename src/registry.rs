//! # Task Registry
//!
//! Fixed-capacity TCB table, the stack memory pool, and periodic release
//! bookkeeping. The registry is the sole owner of every execution context;
//! the scheduler and the arch port only ever see word offsets into it.

use heapless::Vec;

use crate::arch;
use crate::config::{OverrunPolicy, Tick, IDLE_STACK_WORDS, MAX_TASKS, STACK_POOL_WORDS};
use crate::error::{KernelError, KernelResult};
use crate::task::{ExecContext, TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskState};

/// Words in the initial exception frame (8 hardware + 8 software-saved).
pub const FRAME_WORDS: usize = 16;

/// xPSR with only the Thumb bit set.
const INITIAL_XPSR: u32 = 0x0100_0000;

// ---------------------------------------------------------------------------
// Stack pool
// ---------------------------------------------------------------------------

/// Backing words for all stacks. Aligned to 8 bytes as required by AAPCS.
#[repr(C, align(8))]
struct StackWords([u32; STACK_POOL_WORDS]);

/// Bump allocator over a fixed word array. Stacks are never freed.
pub struct StackPool {
    words: StackWords,
    next: usize,
}

impl StackPool {
    pub const fn new() -> Self {
        Self {
            words: StackWords([0; STACK_POOL_WORDS]),
            next: 0,
        }
    }

    /// Carve out `words` words, rounded up to keep every region 8-byte aligned.
    fn alloc(&mut self, words: usize) -> Option<ExecContext> {
        let words = words.checked_add(words & 1)?;
        let end = self.next.checked_add(words)?;
        if end > STACK_POOL_WORDS {
            return None;
        }
        let base = self.next;
        self.next = end;
        Some(ExecContext { base, words, sp: end })
    }

    /// Lay out the initial frame so the first switch-in "returns" into
    /// `entry(arg)`.
    ///
    /// ```text
    /// [Hardware stacked frame]   <- top of region
    ///   xPSR  (Thumb bit set)
    ///   PC    (entry)
    ///   LR    (task_exit)
    ///   R12, R3, R2, R1 (0)
    ///   R0    (arg)
    /// [Software saved context]
    ///   R11 .. R4 (0)            <- saved stack pointer
    /// ```
    fn init_frame(&mut self, ctx: &mut ExecContext, entry: TaskEntry, arg: usize) {
        let frame = ctx.top() - FRAME_WORDS;
        let words = &mut self.words.0[frame..ctx.top()];
        words.fill(0);
        words[8] = arg as u32;
        words[13] = arch::task_exit as usize as u32;
        // Exception return wants the PC with the Thumb bit clear.
        words[14] = entry as usize as u32 & !1;
        words[15] = INITIAL_XPSR;
        ctx.sp = frame;
    }

    /// Words not yet handed out.
    pub fn remaining(&self) -> usize {
        STACK_POOL_WORDS - self.next
    }

    /// Read-only view of a context's stack region.
    pub fn region(&self, ctx: &ExecContext) -> &[u32] {
        &self.words.0[ctx.base()..ctx.top()]
    }

    /// Address of a pool word. Only meaningful once the pool stops moving.
    pub fn word_ptr(&mut self, offset: usize) -> *mut u32 {
        self.words.0.as_mut_ptr().wrapping_add(offset)
    }

    /// Word offset of an address inside the pool.
    pub fn offset_of(&self, ptr: *const u32) -> usize {
        (ptr as usize).wrapping_sub(self.words.0.as_ptr() as usize) / core::mem::size_of::<u32>()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Result of one release pass.
#[derive(Debug, Default)]
pub struct ReleaseBatch {
    /// Jobs released: Dormant tasks turned Ready plus abandoned re-releases.
    pub released: u32,
    /// Blocked tasks re-released under a new deadline. Their wait-list keys
    /// must be refreshed.
    pub rekeyed: Vec<TaskId, MAX_TASKS>,
    /// Misses recorded during the pass, with the deadline that was missed.
    pub missed: Vec<(TaskId, Tick), MAX_TASKS>,
}

pub struct TaskRegistry {
    tasks: Vec<TaskControlBlock, MAX_TASKS>,
    stacks: StackPool,
    deadline_misses: u32,
}

impl TaskRegistry {
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            stacks: StackPool::new(),
            deadline_misses: 0,
        }
    }

    /// Register a task. It starts Dormant and is first released at `now`.
    pub fn create(
        &mut self,
        name: &'static str,
        entry: TaskEntry,
        config: &TaskConfig,
        now: Tick,
    ) -> KernelResult<TaskId> {
        config.validate()?;
        if self.tasks.is_full() {
            return Err(KernelError::ResourceExhausted);
        }
        let mut ctx = self
            .stacks
            .alloc(config.stack_words)
            .ok_or(KernelError::ResourceExhausted)?;
        self.stacks.init_frame(&mut ctx, entry, config.arg);

        let id = TaskId(self.tasks.len() as u8);
        self.tasks
            .push(TaskControlBlock::new(id, name, config, ctx, now))
            .map_err(|_| KernelError::ResourceExhausted)?;
        Ok(id)
    }

    /// Allocate the idle context from the same pool.
    pub fn create_idle(&mut self) -> Option<ExecContext> {
        let mut ctx = self.stacks.alloc(IDLE_STACK_WORDS)?;
        self.stacks.init_frame(&mut ctx, arch::idle_entry, 0);
        Some(ctx)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.tasks.get(id.index())
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskControlBlock> {
        self.tasks.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskControlBlock> {
        self.tasks.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskControlBlock> {
        self.tasks.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Global deadline-miss counter.
    pub fn deadline_misses(&self) -> u32 {
        self.deadline_misses
    }

    pub fn stacks(&self) -> &StackPool {
        &self.stacks
    }

    pub fn stacks_mut(&mut self) -> &mut StackPool {
        &mut self.stacks
    }

    /// Count every unfinished job whose absolute deadline has passed.
    ///
    /// A job due at tick `d` that has not completed by the time the tick-`d`
    /// interrupt is processed is late. Each job is counted at most once.
    pub fn detect_misses(&mut self, now: Tick, missed: &mut Vec<(TaskId, Tick), MAX_TASKS>) {
        for tcb in self.tasks.iter_mut() {
            if tcb.has_active_job() && now >= tcb.absolute_deadline && tcb.record_miss() {
                self.deadline_misses = self.deadline_misses.saturating_add(1);
                // Bounded by MAX_TASKS, cannot overflow.
                let _ = missed.push((tcb.id, tcb.absolute_deadline));
            }
        }
    }

    /// Release every task whose period boundary has arrived.
    pub fn release_due(&mut self, now: Tick, policy: OverrunPolicy) -> ReleaseBatch {
        let mut batch = ReleaseBatch::default();
        for tcb in self.tasks.iter_mut() {
            if tcb.state == TaskState::Suspended || tcb.release_time > now {
                continue;
            }
            if tcb.state == TaskState::Dormant {
                tcb.release();
                tcb.state = TaskState::Ready;
                batch.released += 1;
                continue;
            }
            if tcb.is_delayed() {
                // The boundary ends the sleep and starts the next job.
                if let Some(lost) = tcb.parked_release.take() {
                    tcb.deadline_misses = tcb.deadline_misses.saturating_add(1);
                    self.deadline_misses = self.deadline_misses.saturating_add(1);
                    let _ = batch.missed.push((tcb.id, lost + tcb.deadline));
                }
                tcb.block = None;
                tcb.release();
                tcb.state = TaskState::Ready;
                batch.released += 1;
                continue;
            }

            // Release arrived while the previous job is still active.
            if tcb.record_miss() {
                self.deadline_misses = self.deadline_misses.saturating_add(1);
                let _ = batch.missed.push((tcb.id, tcb.absolute_deadline));
            }
            match policy {
                OverrunPolicy::Abandon => {
                    tcb.release();
                    batch.released += 1;
                    if tcb.state == TaskState::Blocked {
                        let _ = batch.rekeyed.push(tcb.id);
                    }
                }
                OverrunPolicy::Defer => {
                    // A release parked earlier is superseded; that job never runs.
                    if let Some(lost) = tcb.parked_release.replace(tcb.release_time) {
                        tcb.deadline_misses = tcb.deadline_misses.saturating_add(1);
                        self.deadline_misses = self.deadline_misses.saturating_add(1);
                        let _ = batch.missed.push((tcb.id, lost + tcb.deadline));
                    }
                    tcb.release_time += tcb.period;
                }
            }
        }
        batch
    }

    /// Finish the current job of `id`.
    ///
    /// The task goes Dormant until its next release, or, if a release was
    /// parked by [`OverrunPolicy::Defer`], straight back to Ready under the
    /// parked release's deadline.
    pub fn complete_job(&mut self, id: TaskId) -> KernelResult {
        let tcb = self.get_mut(id).ok_or(KernelError::InvalidHandle)?;
        if !tcb.is_runnable() {
            return Err(KernelError::InvalidState);
        }
        tcb.jobs_completed = tcb.jobs_completed.wrapping_add(1);
        match tcb.parked_release.take() {
            Some(at) => {
                tcb.absolute_deadline = at + tcb.deadline;
                tcb.releases = tcb.releases.wrapping_add(1);
                tcb.job_missed = false;
                tcb.state = TaskState::Ready;
            }
            None => tcb.state = TaskState::Dormant,
        }
        Ok(())
    }

    /// Take a task out of release and dispatch.
    pub fn suspend(&mut self, id: TaskId) -> KernelResult {
        let tcb = self.get_mut(id).ok_or(KernelError::InvalidHandle)?;
        match tcb.state {
            TaskState::Blocked => Err(KernelError::InvalidState),
            TaskState::Suspended => Ok(()),
            _ => {
                tcb.state = TaskState::Suspended;
                tcb.parked_release = None;
                Ok(())
            }
        }
    }

    /// Return a suspended task to Dormant, aligned to the next period
    /// boundary at or after `now`.
    pub fn resume(&mut self, id: TaskId, now: Tick) -> KernelResult {
        let tcb = self.get_mut(id).ok_or(KernelError::InvalidHandle)?;
        if tcb.state != TaskState::Suspended {
            return Err(KernelError::InvalidState);
        }
        if tcb.release_time < now {
            let behind = now - tcb.release_time;
            let periods = behind.div_ceil(tcb.period);
            tcb.release_time += periods * tcb.period;
        }
        tcb.state = TaskState::Dormant;
        Ok(())
    }
}
