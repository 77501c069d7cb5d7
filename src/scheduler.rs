//! # EDF Scheduler
//!
//! Core scheduling logic for EdfOS: a preemptive Earliest-Deadline-First
//! scheduler over a fixed set of periodic tasks, with deadline-aware
//! blocking IPC and synchronous execution-time accounting.
//!
//! ## Scheduling Algorithm
//!
//! At each tick:
//! 1. **Advance time**: increment the tick counter, sample the trace clock
//! 2. **Expire waits**: wake delayed tasks and time out IPC waiters
//! 3. **Detect misses**: count every unfinished job whose deadline passed
//! 4. **Release**: turn Dormant or delayed tasks whose period boundary arrived Ready,
//!    applying the overrun policy to tasks still busy with the previous job
//! 5. **Dispatch**: pick the minimum (absolute deadline, id) among
//!    Ready ∪ {Running}; if it differs from the Running task, switch
//!
//! The same dispatch step runs after every other event that can change the
//! ranking: job completion, blocking, wake-up, yield, suspension. Switching
//! is synchronous: `current` and the profiler are updated before the call
//! returns, and the arch port only has to swap stacks afterwards.
//!
//! ## Utilization
//!
//! No admission test is performed. With deadline = period and
//! Σ(Cᵢ/Tᵢ) ≤ 1 EDF misses no deadline; beyond that, overload shows up only
//! as deadline-miss counters and events.

use heapless::Vec;

use crate::clock::Clock;
use crate::config::{SchedulerConfig, Tick, MAX_ITEM_SIZE, MAX_TASKS, WAIT_FOREVER};
use crate::error::{IpcError, IpcResult, KernelError, KernelResult};
use crate::events::{Event, EventLog, SwitchDirection, SwitchEvent};
use crate::ipc::{Queue, QueueId, QueueTable, Waiter};
use crate::profiler::Profiler;
use crate::registry::TaskRegistry;
use crate::task::{
    BlockReason, ExecContext, TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskState,
    WaitSlot,
};

/// Result of a call that may block the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation finished immediately.
    Complete(T),
    /// The caller is now Blocked. Once resumed it collects the result with
    /// [`Scheduler::take_wait_outcome`].
    Blocked,
}

/// Scheduler statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks processed since `start()`.
    pub ticks: u64,
    /// Dispatch transitions, including switches to and from idle.
    pub context_switches: u64,
    /// Jobs released.
    pub releases: u64,
    /// Deadline misses across all tasks.
    pub deadline_misses: u32,
    /// Events discarded because nobody drained the ring in time.
    pub events_dropped: u32,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The scheduler context. Owns every TCB, queue and accounting record;
/// all operations go through `&mut self`, so independent instances never
/// interfere.
pub struct Scheduler<C: Clock> {
    registry: TaskRegistry,
    queues: QueueTable,
    profiler: Profiler,
    events: EventLog,
    clock: C,
    config: SchedulerConfig,
    now: Tick,
    /// Task chosen by the last dispatch. `None` means idle.
    current: Option<TaskId>,
    /// Context whose registers are actually on the CPU. Lags `current`
    /// until the arch port completes the switch.
    active: Option<TaskId>,
    launched: bool,
    idle: Option<ExecContext>,
    started: bool,
    switch_pending: bool,
    context_switches: u64,
    releases: u64,
}

impl<C: Clock> Scheduler<C> {
    pub const fn new(clock: C, config: SchedulerConfig) -> Self {
        Self {
            registry: TaskRegistry::new(),
            queues: QueueTable::new(),
            profiler: Profiler::new(),
            events: EventLog::new(),
            clock,
            config,
            now: 0,
            current: None,
            active: None,
            launched: false,
            idle: None,
            started: false,
            switch_pending: false,
            context_switches: 0,
            releases: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Register a periodic task. It is first released at the next
    /// scheduling point (`start()` or the next tick).
    pub fn create_task(
        &mut self,
        name: &'static str,
        entry: TaskEntry,
        config: TaskConfig,
    ) -> KernelResult<TaskId> {
        let id = self
            .registry
            .create(name, entry, &config, self.now)
            .inspect_err(|err| log::warn!("cannot create task '{}': {}", name, err))?;
        log::debug!(
            "task {} '{}': period {} deadline {}",
            id.index(),
            name,
            config.period,
            config.relative_deadline()
        );
        Ok(id)
    }

    pub fn create_queue(
        &mut self,
        capacity: usize,
        item_size: usize,
        overwrite: bool,
    ) -> KernelResult<QueueId> {
        let id = self
            .queues
            .create(capacity, item_size, overwrite)
            .inspect_err(|err| log::warn!("cannot create queue: {}", err))?;
        log::debug!(
            "queue {}: {} x {} bytes{}, {} pool bytes left",
            id.index(),
            capacity,
            item_size,
            if overwrite { " (overwrite)" } else { "" },
            self.queues.remaining_bytes()
        );
        Ok(id)
    }

    /// Create the idle context, release every task due now and dispatch.
    ///
    /// Failing to create the idle context is fatal: with no context to fall
    /// back to, the system cannot run.
    pub fn start(&mut self) -> KernelResult {
        if self.started {
            return Err(KernelError::InvalidState);
        }
        let Some(idle) = self.registry.create_idle() else {
            log::error!("no stack memory left for the idle task");
            return Err(KernelError::IdleTaskUnavailable);
        };
        self.idle = Some(idle);
        self.profiler.start(self.clock.now());
        self.started = true;
        log::debug!("scheduler started with {} tasks", self.registry.len());

        self.release_pass();
        self.reschedule();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Tick entry point. Returns `true` if a context switch is now pending.
    pub fn tick(&mut self) -> bool {
        if !self.started {
            return false;
        }
        self.now += 1;
        self.profiler.observe(self.clock.now());
        self.events.push(Event::Tick(self.now));

        self.wake_expired();
        self.release_pass();
        self.reschedule();
        self.take_switch_request()
    }

    fn wake_expired(&mut self) {
        let now = self.now;
        for tcb in self.registry.iter_mut() {
            if let Some(BlockReason::Delay { until }) = tcb.block {
                // A sleep reaching the release boundary is ended by the release.
                if until <= now && tcb.release_time > now {
                    tcb.block = None;
                    tcb.state = TaskState::Ready;
                }
            }
        }

        let mut expired: Vec<TaskId, MAX_TASKS> = Vec::new();
        self.queues.take_expired(now, &mut expired);
        for task in expired {
            Self::complete_wait(&mut self.registry, task, Err(IpcError::Timeout), None);
        }
    }

    fn release_pass(&mut self) {
        let mut missed: Vec<(TaskId, Tick), MAX_TASKS> = Vec::new();
        self.registry.detect_misses(self.now, &mut missed);
        for (task, deadline) in missed {
            self.events.push(Event::DeadlineMiss { task, deadline });
        }

        let batch = self.registry.release_due(self.now, self.config.overrun_policy);
        self.releases += batch.released as u64;
        for &(task, deadline) in batch.missed.iter() {
            self.events.push(Event::DeadlineMiss { task, deadline });
        }
        for task in batch.rekeyed {
            if let Some(tcb) = self.registry.get(task) {
                self.queues.rekey(task, tcb.absolute_deadline);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// The task EDF would run now: minimum (absolute deadline, id) over
    /// Ready ∪ {Running}. `None` means idle.
    pub fn pick_next(&self) -> Option<TaskId> {
        self.registry
            .iter()
            .filter(|t| t.is_runnable())
            .min_by_key(|t| t.rank())
            .map(|t| t.id)
    }

    fn reschedule(&mut self) {
        let next = self.pick_next();
        if next == self.current {
            // Same task keeps the CPU, e.g. straight into a parked release.
            if let Some(tcb) = next.and_then(|id| self.registry.get_mut(id)) {
                tcb.state = TaskState::Running;
            }
            return;
        }
        self.dispatch(next);
    }

    fn dispatch(&mut self, next: Option<TaskId>) {
        let timestamp = self.clock.now();

        if let Some((task, elapsed)) = self.profiler.exit(timestamp) {
            if let Some(tcb) = self.registry.get_mut(task) {
                tcb.execution_time = tcb.execution_time.saturating_add(elapsed);
            }
        }
        if let Some(tcb) = self.current.and_then(|id| self.registry.get_mut(id)) {
            if tcb.state == TaskState::Running {
                tcb.state = TaskState::Ready;
            }
        }
        self.events.push(Event::Switch(SwitchEvent {
            task: self.current,
            direction: SwitchDirection::Out,
            timestamp,
        }));

        if let Some(id) = next {
            if let Some(tcb) = self.registry.get_mut(id) {
                tcb.state = TaskState::Running;
            }
            self.profiler.enter(id, timestamp);
        }
        self.events.push(Event::Switch(SwitchEvent {
            task: next,
            direction: SwitchDirection::In,
            timestamp,
        }));

        self.current = next;
        self.context_switches += 1;
        self.switch_pending = true;
    }

    /// Consume the "switch needed" flag raised by the last dispatch.
    pub fn take_switch_request(&mut self) -> bool {
        core::mem::replace(&mut self.switch_pending, false)
    }

    // -----------------------------------------------------------------------
    // Job control
    // -----------------------------------------------------------------------

    fn running_task(&self) -> KernelResult<TaskId> {
        self.current.ok_or(KernelError::NoCurrentTask)
    }

    /// Explicit preemption point. Under EDF the caller keeps the CPU unless
    /// something more urgent became Ready.
    pub fn yield_now(&mut self) {
        self.reschedule();
    }

    /// The running job is done; the task waits for its next release.
    pub fn complete_job(&mut self) -> KernelResult {
        let id = self.running_task()?;
        let releases = |r: &TaskRegistry| r.get(id).map_or(0, |t| t.releases());
        let before = releases(&self.registry);
        self.registry.complete_job(id)?;
        if releases(&self.registry) != before {
            // Parked release issued on completion.
            self.releases += 1;
        }
        self.reschedule();
        Ok(())
    }

    /// Block the running task for `ticks` ticks without ending its job.
    pub fn delay(&mut self, ticks: Tick) -> KernelResult {
        let id = self.running_task()?;
        if ticks == 0 {
            self.yield_now();
            return Ok(());
        }
        let until = self.now.saturating_add(ticks);
        if let Some(tcb) = self.registry.get_mut(id) {
            tcb.state = TaskState::Blocked;
            tcb.block = Some(BlockReason::Delay { until });
        }
        self.reschedule();
        Ok(())
    }

    pub fn suspend(&mut self, id: TaskId) -> KernelResult {
        self.registry.suspend(id)?;
        self.reschedule();
        Ok(())
    }

    /// Resume a suspended task at its next period boundary. A boundary that
    /// falls on the current tick releases the task right away.
    pub fn resume(&mut self, id: TaskId) -> KernelResult {
        self.registry.resume(id, self.now)?;
        if self.started {
            self.release_pass();
            self.reschedule();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // IPC operations
    // -----------------------------------------------------------------------

    fn wake_tick(&self, timeout: Tick) -> Option<Tick> {
        if timeout == WAIT_FOREVER {
            None
        } else {
            Some(self.now.saturating_add(timeout))
        }
    }

    /// Running task and the deadline that keys it in a wait list.
    fn waiter_key(&self) -> IpcResult<(TaskId, Tick)> {
        let id = self.current.ok_or(IpcError::NoCurrentTask)?;
        let tcb = self.registry.get(id).ok_or(IpcError::NoCurrentTask)?;
        Ok((id, tcb.absolute_deadline))
    }

    fn block(registry: &mut TaskRegistry, task: TaskId, reason: BlockReason) {
        if let Some(tcb) = registry.get_mut(task) {
            tcb.state = TaskState::Blocked;
            tcb.block = Some(reason);
            tcb.wait = WaitSlot::Pending;
        }
    }

    /// Finish a blocked IPC call of `task`, optionally delivering an item.
    fn complete_wait(
        registry: &mut TaskRegistry,
        task: TaskId,
        result: IpcResult,
        item: Option<&[u8]>,
    ) {
        if let Some(tcb) = registry.get_mut(task) {
            tcb.inbox.clear();
            if let Some(item) = item {
                // Item sizes are bounded by MAX_ITEM_SIZE at queue creation.
                let _ = tcb.inbox.extend_from_slice(item);
            }
            tcb.wait = WaitSlot::Done(result);
            tcb.block = None;
            tcb.state = TaskState::Ready;
        }
    }

    /// Send `item` to `queue`, blocking up to `timeout` ticks while it is
    /// full. On an overwrite mailbox this is [`overwrite`](Self::overwrite).
    pub fn send(&mut self, queue: QueueId, item: &[u8], timeout: Tick) -> IpcResult<Outcome<()>> {
        if self.queues.get(queue)?.is_overwrite() {
            self.overwrite(queue, item)?;
            return Ok(Outcome::Complete(()));
        }
        let wake_at = self.wake_tick(timeout);
        let key = self.waiter_key();

        let (q, pool) = self.queues.entry(queue)?;
        if item.len() != q.item_size() {
            return Err(IpcError::ItemSize);
        }

        if !q.is_full() {
            // Receivers only wait on an empty queue: hand the item over.
            match q.receivers.pop_most_urgent() {
                Some(w) => Self::complete_wait(&mut self.registry, w.task, Ok(()), Some(item)),
                None => q.push_back(pool, item),
            }
            self.reschedule();
            return Ok(Outcome::Complete(()));
        }

        if timeout == 0 {
            return Err(IpcError::WouldBlock);
        }
        let (task, deadline) = key?;
        let mut parked: Vec<u8, MAX_ITEM_SIZE> = Vec::new();
        parked
            .extend_from_slice(item)
            .map_err(|_| IpcError::ItemSize)?;
        q.senders.push(Waiter { task, deadline, wake_at, item: parked })?;
        Self::block(&mut self.registry, task, BlockReason::Send { queue, wake_at });
        self.reschedule();
        Ok(Outcome::Blocked)
    }

    /// Receive the oldest item of `queue` into `buf`, blocking up to
    /// `timeout` ticks while it is empty.
    pub fn receive(
        &mut self,
        queue: QueueId,
        buf: &mut [u8],
        timeout: Tick,
    ) -> IpcResult<Outcome<()>> {
        let wake_at = self.wake_tick(timeout);
        let key = self.waiter_key();

        let (q, pool) = self.queues.entry(queue)?;
        if buf.len() != q.item_size() {
            return Err(IpcError::ItemSize);
        }

        if !q.is_empty() {
            q.pop_front(pool, buf);
            // A slot just freed: move the most urgent parked item in.
            if let Some(w) = q.senders.pop_most_urgent() {
                q.push_back(pool, &w.item);
                Self::complete_wait(&mut self.registry, w.task, Ok(()), None);
            }
            self.reschedule();
            return Ok(Outcome::Complete(()));
        }

        // Empty but senders still parked (the queue was reset under them).
        if let Some(w) = q.senders.pop_most_urgent() {
            buf.copy_from_slice(&w.item);
            Self::complete_wait(&mut self.registry, w.task, Ok(()), None);
            self.reschedule();
            return Ok(Outcome::Complete(()));
        }

        if timeout == 0 {
            return Err(IpcError::WouldBlock);
        }
        let (task, deadline) = key?;
        q.receivers.push(Waiter { task, deadline, wake_at, item: Vec::new() })?;
        Self::block(&mut self.registry, task, BlockReason::Receive { queue, wake_at });
        self.reschedule();
        Ok(Outcome::Blocked)
    }

    /// Replace the unread value of a single-slot queue. Never blocks.
    pub fn overwrite(&mut self, queue: QueueId, item: &[u8]) -> IpcResult {
        let (q, pool) = self.queues.entry(queue)?;
        if q.capacity() != 1 {
            return Err(IpcError::InvalidOperation);
        }
        if item.len() != q.item_size() {
            return Err(IpcError::ItemSize);
        }
        match q.receivers.pop_most_urgent() {
            Some(w) => Self::complete_wait(&mut self.registry, w.task, Ok(()), Some(item)),
            None => q.replace(pool, item),
        }
        self.reschedule();
        Ok(())
    }

    /// Discard every buffered item. Waiters stay blocked; their timeouts run on.
    pub fn reset_queue(&mut self, queue: QueueId) -> IpcResult {
        let (q, _) = self.queues.entry(queue)?;
        q.clear();
        Ok(())
    }

    pub fn messages_waiting(&self, queue: QueueId) -> IpcResult<usize> {
        Ok(self.queues.get(queue)?.count())
    }

    pub fn queue(&self, queue: QueueId) -> IpcResult<&Queue> {
        self.queues.get(queue)
    }

    /// Collect the result of `task`'s last blocking call after it resumed.
    /// A received item is copied into `buf`; pass an empty slice for sends.
    pub fn take_wait_outcome(&mut self, task: TaskId, buf: &mut [u8]) -> IpcResult {
        let tcb = self.registry.get_mut(task).ok_or(IpcError::InvalidHandle)?;
        match tcb.wait {
            WaitSlot::Empty => Err(IpcError::InvalidOperation),
            WaitSlot::Pending => Err(IpcError::WouldBlock),
            WaitSlot::Done(result) => {
                if !tcb.inbox.is_empty() {
                    if buf.len() != tcb.inbox.len() {
                        return Err(IpcError::ItemSize);
                    }
                    buf.copy_from_slice(&tcb.inbox);
                    tcb.inbox.clear();
                }
                tcb.wait = WaitSlot::Empty;
                result
            }
        }
    }

    // -----------------------------------------------------------------------
    // Arch port hooks
    // -----------------------------------------------------------------------

    /// Save the outgoing context's stack pointer. Called by PendSV.
    pub fn store_stack_pointer(&mut self, sp: *mut u32) {
        if !self.launched {
            return;
        }
        let offset = self.registry.stacks().offset_of(sp);
        match self.active {
            Some(id) => {
                if let Some(tcb) = self.registry.get_mut(id) {
                    tcb.context.sp = offset;
                }
            }
            None => {
                if let Some(idle) = self.idle.as_mut() {
                    idle.sp = offset;
                }
            }
        }
    }

    /// Make the dispatched context active and return its stack pointer.
    pub fn switch_stack_pointer(&mut self) -> *mut u32 {
        self.active = self.current;
        self.launched = true;
        let offset = match self.current {
            Some(id) => self.registry.get(id).map(|t| t.context.sp),
            None => self.idle.map(|c| c.sp),
        }
        .unwrap_or(0);
        self.registry.stacks_mut().word_ptr(offset)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Ticks since start.
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Running task; `None` while idle.
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.registry.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskControlBlock> {
        self.registry.iter()
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn idle_context(&self) -> Option<&ExecContext> {
        self.idle.as_ref()
    }

    pub fn cpu_load(&self) -> u32 {
        self.profiler.cpu_load()
    }

    pub fn total_execution_time(&self) -> u64 {
        self.profiler.total_execution_time()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.now,
            context_switches: self.context_switches,
            releases: self.releases,
            deadline_misses: self.registry.deadline_misses(),
            events_dropped: self.events.dropped(),
        }
    }

    /// Next buffered event, oldest first. Call outside critical sections.
    pub fn pop_event(&mut self) -> Option<Event> {
        self.events.pop()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn set_config(&mut self, config: SchedulerConfig) {
        self.config = config;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::config::STACK_POOL_WORDS;

    extern "C" fn body(_: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn scheduler() -> Scheduler<VirtualClock> {
        Scheduler::new(VirtualClock::new(), SchedulerConfig::new())
    }

    fn step(s: &mut Scheduler<VirtualClock>) {
        s.clock_mut().advance(1);
        s.tick();
    }

    #[test]
    fn test_start_picks_earliest_deadline() {
        let mut s = scheduler();
        let slow = s.create_task("slow", body, TaskConfig::periodic(20)).unwrap();
        let fast = s.create_task("fast", body, TaskConfig::periodic(10)).unwrap();
        s.start().unwrap();
        assert_eq!(s.current(), Some(fast));
        assert_eq!(s.task(fast).unwrap().state(), TaskState::Running);
        assert_eq!(s.task(slow).unwrap().state(), TaskState::Ready);
    }

    #[test]
    fn test_equal_deadlines_break_by_id() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
        let _b = s.create_task("b", body, TaskConfig::periodic(10)).unwrap();
        s.start().unwrap();
        assert_eq!(s.current(), Some(a));
    }

    #[test]
    fn test_start_twice_fails() {
        let mut s = scheduler();
        s.start().unwrap();
        assert_eq!(s.start(), Err(KernelError::InvalidState));
        assert_eq!(s.current(), None);
    }

    #[test]
    fn test_idle_creation_failure_is_fatal() {
        let mut s = scheduler();
        let config = TaskConfig::periodic(10).with_stack_words(STACK_POOL_WORDS);
        s.create_task("hog", body, config).unwrap();
        assert_eq!(s.start(), Err(KernelError::IdleTaskUnavailable));
        assert!(!s.is_started());
    }

    #[test]
    fn test_tick_before_start_is_ignored() {
        let mut s = scheduler();
        s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
        assert!(!s.tick());
        assert_eq!(s.now(), 0);
    }

    #[test]
    fn test_complete_job_goes_idle_then_rereleases() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(5)).unwrap();
        s.start().unwrap();
        s.complete_job().unwrap();
        assert_eq!(s.current(), None);
        assert_eq!(s.task(a).unwrap().state(), TaskState::Dormant);
        assert_eq!(s.complete_job(), Err(KernelError::NoCurrentTask));

        for _ in 0..5 {
            step(&mut s);
        }
        assert_eq!(s.current(), Some(a));
        assert_eq!(s.task(a).unwrap().absolute_deadline(), 10);
    }

    #[test]
    fn test_release_preempts_later_deadline() {
        let mut s = scheduler();
        let long = s.create_task("long", body, TaskConfig::periodic(50)).unwrap();
        let short = s
            .create_task("short", body, TaskConfig::periodic(10).with_deadline(3))
            .unwrap();
        s.start().unwrap();
        assert_eq!(s.current(), Some(short));
        s.complete_job().unwrap();
        assert_eq!(s.current(), Some(long));

        for _ in 0..10 {
            step(&mut s);
        }
        // Released at 10 with deadline 13 < 50.
        assert_eq!(s.current(), Some(short));
        assert_eq!(s.task(long).unwrap().state(), TaskState::Ready);
    }

    #[test]
    fn test_switch_events_and_accounting() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
        s.start().unwrap();
        while s.pop_event().is_some() {}

        s.clock_mut().advance(3);
        s.complete_job().unwrap();
        assert_eq!(
            s.pop_event(),
            Some(Event::Switch(SwitchEvent {
                task: Some(a),
                direction: SwitchDirection::Out,
                timestamp: 3,
            }))
        );
        assert_eq!(
            s.pop_event(),
            Some(Event::Switch(SwitchEvent {
                task: None,
                direction: SwitchDirection::In,
                timestamp: 3,
            }))
        );
        assert_eq!(s.task(a).unwrap().execution_time(), 3);
        assert_eq!(s.total_execution_time(), 3);
        assert_eq!(s.cpu_load(), 100);
    }

    #[test]
    fn test_delay_blocks_until_wake_tick() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(100)).unwrap();
        s.start().unwrap();
        s.delay(3).unwrap();
        assert_eq!(s.current(), None);
        assert_eq!(s.task(a).unwrap().block_reason(), Some(BlockReason::Delay { until: 3 }));
        step(&mut s);
        step(&mut s);
        assert_eq!(s.current(), None);
        step(&mut s);
        assert_eq!(s.current(), Some(a));
    }

    #[test]
    fn test_delay_to_release_boundary_is_not_a_miss() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
        s.start().unwrap();
        s.delay(10).unwrap();
        for _ in 0..10 {
            step(&mut s);
        }
        let tcb = s.task(a).unwrap();
        assert_eq!(tcb.state(), TaskState::Running);
        assert_eq!(tcb.deadline_misses(), 0);
        assert_eq!(tcb.absolute_deadline(), 20);
        assert_eq!(s.stats().deadline_misses, 0);
    }

    #[test]
    fn test_release_ends_delay_past_boundary() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
        s.start().unwrap();
        s.delay(15).unwrap();
        for _ in 0..10 {
            step(&mut s);
        }
        let tcb = s.task(a).unwrap();
        assert_eq!(tcb.state(), TaskState::Running);
        assert_eq!(tcb.block_reason(), None);
        assert_eq!(tcb.deadline_misses(), 0);
        assert_eq!(tcb.absolute_deadline(), 20);
        assert_eq!(tcb.releases(), 2);
        assert_eq!(s.current(), Some(a));
    }

    #[test]
    fn test_suspend_running_task_dispatches_next() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
        let b = s.create_task("b", body, TaskConfig::periodic(20)).unwrap();
        s.start().unwrap();
        s.suspend(a).unwrap();
        assert_eq!(s.current(), Some(b));
        assert_eq!(s.task(a).unwrap().state(), TaskState::Suspended);
        s.resume(a).unwrap();
        assert_eq!(s.task(a).unwrap().state(), TaskState::Dormant);
    }

    #[test]
    fn test_stack_pointer_handoff() {
        let mut s = scheduler();
        let a = s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
        s.start().unwrap();

        let first = s.switch_stack_pointer();
        let saved = *s.task(a).unwrap().context();
        assert_eq!(s.registry().stacks().offset_of(first), saved.stack_pointer());

        // Task pushed 4 more words before being switched out to idle.
        let moved = first.wrapping_sub(4);
        s.complete_job().unwrap();
        s.store_stack_pointer(moved);
        assert_eq!(
            s.task(a).unwrap().context().stack_pointer(),
            saved.stack_pointer() - 4
        );
        let idle_sp = s.switch_stack_pointer();
        assert_eq!(
            s.registry().stacks().offset_of(idle_sp),
            s.idle_context().unwrap().stack_pointer()
        );
    }
}
