//! # Kernel
//!
//! Global scheduler instance and the task-facing API for EdfOS on target.
//!
//! Every call enters a critical section, runs the matching [`Scheduler`]
//! operation and leaves again; if the operation dispatched a different
//! context, PendSV is pended on the way out so the switch happens as soon
//! as the caller unmasks interrupts.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()         ← Select policy
//!         ├─► kernel::create_task()  ← Register tasks (×N)
//!         ├─► kernel::create_queue() ← Register queues (×M)
//!         └─► kernel::start()        ← Launch scheduler (no return)
//!               ├─► Enable DWT cycle counter
//!               ├─► Set interrupt priorities, configure SysTick
//!               ├─► Create idle context, release and dispatch
//!               └─► Launch the dispatched context
//! ```

use crate::arch::cortex_m4;
use crate::clock::DwtClock;
use crate::config::{SchedulerConfig, Tick, SYSTEM_CLOCK_HZ};
use crate::error::{IpcResult, KernelResult};
use crate::events::Event;
use crate::ipc::QueueId;
use crate::scheduler::{Outcome, Scheduler};
use crate::sync::Shared;
use crate::task::{TaskConfig, TaskEntry, TaskId};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// The one scheduler on target. The SysTick and PendSV handlers reach it
/// through the same critical-section guard as thread-mode calls.
pub static SCHEDULER: Shared<Scheduler<DwtClock>> =
    Shared::new(Scheduler::new(DwtClock, SchedulerConfig::new()));

/// Run `f` on the scheduler and pend PendSV if it dispatched.
fn call<R>(f: impl FnOnce(&mut Scheduler<DwtClock>) -> R) -> R {
    let (result, switch) = SCHEDULER.with(|s| {
        let result = f(s);
        (result, s.take_switch_request())
    });
    if switch {
        cortex_m4::trigger_pendsv();
    }
    result
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Select the scheduler policy. Call before `start()`.
pub fn init(config: SchedulerConfig) {
    SCHEDULER.with(|s| s.set_config(config));
}

pub fn create_task(
    name: &'static str,
    entry: TaskEntry,
    config: TaskConfig,
) -> KernelResult<TaskId> {
    SCHEDULER.with(|s| s.create_task(name, entry, config))
}

pub fn create_queue(capacity: usize, item_size: usize, overwrite: bool) -> KernelResult<QueueId> {
    SCHEDULER.with(|s| s.create_queue(capacity, item_size, overwrite))
}

/// Start the scheduler. **Does not return.**
///
/// If the idle context cannot be created the CPU is parked here.
pub fn start(mut cp: cortex_m::Peripherals) -> ! {
    // Masked until the first task's `cpsie i`.
    cortex_m::interrupt::disable();
    cp.DCB.enable_trace();
    cp.DWT.enable_cycle_counter();
    cortex_m4::set_interrupt_priorities(&mut cp.SCB);

    let launch = SCHEDULER.with(|s| {
        s.start()?;
        s.take_switch_request();
        Ok::<_, crate::error::KernelError>(s.switch_stack_pointer())
    });
    let psp = match launch {
        Ok(psp) => psp,
        Err(err) => {
            log::error!("scheduler failed to start: {}", err);
            loop {
                cortex_m::asm::wfi();
            }
        }
    };

    cortex_m4::configure_systick(&mut cp.SYST);
    // SAFETY: `psp` is the dispatched context's initial frame and this is
    // the only launch.
    unsafe { cortex_m4::start_first_task(psp) }
}

/// Voluntary preemption point.
pub fn yield_task() {
    call(|s| s.yield_now());
}

/// End the running job. Returns once the next job of this task runs.
pub fn complete_job() -> KernelResult {
    call(|s| s.complete_job())
}

pub fn delay(ticks: Tick) -> KernelResult {
    call(|s| s.delay(ticks))
}

pub fn suspend(task: TaskId) -> KernelResult {
    call(|s| s.suspend(task))
}

pub fn resume(task: TaskId) -> KernelResult {
    call(|s| s.resume(task))
}

/// Block until resumed, then collect the result of the last IPC call.
fn finish_blocking(outcome: IpcResult<Outcome<()>>, buf: &mut [u8]) -> IpcResult {
    match outcome? {
        Outcome::Complete(()) => Ok(()),
        Outcome::Blocked => {
            // PendSV has already run; this task was woken by hand-off or timeout.
            SCHEDULER.with(|s| match s.current() {
                Some(task) => s.take_wait_outcome(task, buf),
                None => Err(crate::error::IpcError::NoCurrentTask),
            })
        }
    }
}

/// Send `item`, waiting up to `timeout` ticks for space.
pub fn send(queue: QueueId, item: &[u8], timeout: Tick) -> IpcResult {
    let outcome = call(|s| s.send(queue, item, timeout));
    finish_blocking(outcome, &mut [])
}

/// Receive into `buf`, waiting up to `timeout` ticks for an item.
pub fn receive(queue: QueueId, buf: &mut [u8], timeout: Tick) -> IpcResult {
    let outcome = call(|s| s.receive(queue, buf, timeout));
    finish_blocking(outcome, buf)
}

pub fn overwrite(queue: QueueId, item: &[u8]) -> IpcResult {
    call(|s| s.overwrite(queue, item))
}

pub fn reset_queue(queue: QueueId) -> IpcResult {
    SCHEDULER.with(|s| s.reset_queue(queue))
}

pub fn messages_waiting(queue: QueueId) -> IpcResult<usize> {
    SCHEDULER.with(|s| s.messages_waiting(queue))
}

pub fn cpu_load() -> u32 {
    SCHEDULER.with(|s| s.cpu_load())
}

/// Next buffered scheduler event. Render it outside the critical section.
pub fn pop_event() -> Option<Event> {
    SCHEDULER.with(|s| s.pop_event())
}

/// Burn roughly `ms` milliseconds of CPU time.
pub fn busy_for(ms: u32) {
    cortex_m::asm::delay(ms.saturating_mul(SYSTEM_CLOCK_HZ / 1000));
}
