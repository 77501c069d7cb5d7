//! # EdfOS: Earliest-Deadline-First Operating System
//!
//! A tick-driven, single-core real-time scheduler for ARM Cortex-M4
//! microcontrollers. Tasks are periodic; each job must finish by its
//! absolute deadline, and the job with the earliest deadline always runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │              Kernel API (kernel.rs, target)             │
//! │   create_task() · start() · complete_job() · send()    │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   IPC              │  Sync Primitives  │
//! │  scheduler.rs│   ipc.rs           │  sync.rs          │
//! │  ─ tick()    │   ─ Queue          │  ─ Shared<T>      │
//! │  ─ dispatch  │   ─ WaitList       │                   │
//! ├──────────────┼────────────────────┼───────────────────┤
//! │  Registry    │   Profiler         │  Events           │
//! │  registry.rs │   profiler.rs      │  events.rs        │
//! │  task.rs     │   clock.rs         │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · First-task launch                 │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - A task with period `T` and relative deadline `D ≤ T` releases a job
//!   every `T` ticks; job `k` is due at `release₀ + k·T + D`.
//! - The ready set is ordered by (absolute deadline, task id). The minimum
//!   runs; ties go to the smaller id.
//! - A job still unfinished at its deadline is counted as a miss; the
//!   [`OverrunPolicy`](config::OverrunPolicy) decides what runs next.
//! - Queue wait lists use the same key, so the most urgent waiter is
//!   always served first.
//!
//! ## Host and Target
//!
//! Everything except `arch::cortex_m4` and `kernel` is plain `core` code
//! over a [`Scheduler`](scheduler::Scheduler) value, driven on the host by
//! [`sim::Simulation`] and a [`VirtualClock`](clock::VirtualClock).
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only, `heapless` collections
//! - **Fixed pools**: TCB table, stack word pool, queue byte pool
//! - **Critical sections**: `critical_section::with` for shared state

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod task;
pub mod registry;
pub mod ipc;
pub mod clock;
pub mod profiler;
pub mod events;
pub mod scheduler;
pub mod sim;
pub mod sync;
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;

pub use config::{OverrunPolicy, SchedulerConfig, Tick, WAIT_FOREVER};
pub use error::{IpcError, IpcResult, KernelError, KernelResult};
pub use events::{Event, SwitchDirection, SwitchEvent};
pub use ipc::QueueId;
pub use scheduler::{Outcome, Scheduler, SchedulerStats};
pub use task::{TaskConfig, TaskId, TaskState};
