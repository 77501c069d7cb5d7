//! # Workload Simulation
//!
//! Deterministic driver for the scheduler on a [`VirtualClock`]. Each task
//! is given a fixed demand: the number of ticks of CPU one job needs. The
//! simulation advances time one tick at a time, credits the elapsed tick to
//! whichever task was Running, completes jobs whose demand is met, and
//! feeds the scheduler its tick.
//!
//! One clock unit equals one tick, so execution times and CPU load read
//! directly in ticks.
//!
//! ```text
//! step():
//!   running = current()
//!   clock += 1
//!   running.remaining -= 1 ── 0? ──► complete_job()
//!   tick()
//!   drain events
//! ```

use heapless::Vec;

use crate::clock::VirtualClock;
use crate::config::{SchedulerConfig, Tick, MAX_TASKS};
use crate::error::{KernelError, KernelResult};
use crate::events::{log_event, Event, SwitchDirection};
use crate::scheduler::Scheduler;
use crate::task::{TaskConfig, TaskId};

/// CPU demand attached to one simulated task.
#[derive(Debug, Clone, Copy)]
struct Workload {
    task: TaskId,
    demand: Tick,
    remaining: Tick,
    /// Release counter value the current `remaining` belongs to.
    seen_release: u32,
}

extern "C" fn simulated_body(_: usize) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

pub struct Simulation {
    scheduler: Scheduler<VirtualClock>,
    workloads: Vec<Workload, MAX_TASKS>,
    switches_in: u64,
    misses_seen: u64,
}

impl Simulation {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            scheduler: Scheduler::new(VirtualClock::new(), config),
            workloads: Vec::new(),
            switches_in: 0,
            misses_seen: 0,
        }
    }

    /// Periodic task with deadline = period needing `demand` ticks per job.
    pub fn add_periodic(
        &mut self,
        name: &'static str,
        period: Tick,
        demand: Tick,
    ) -> KernelResult<TaskId> {
        self.add_task(name, TaskConfig::periodic(period), demand)
    }

    pub fn add_task(
        &mut self,
        name: &'static str,
        config: TaskConfig,
        demand: Tick,
    ) -> KernelResult<TaskId> {
        if demand == 0 {
            return Err(KernelError::InvalidConfig);
        }
        if self.workloads.is_full() {
            return Err(KernelError::ResourceExhausted);
        }
        let task = self.scheduler.create_task(name, simulated_body, config)?;
        self.workloads
            .push(Workload { task, demand, remaining: demand, seen_release: 0 })
            .map_err(|_| KernelError::ResourceExhausted)?;
        Ok(task)
    }

    pub fn start(&mut self) -> KernelResult {
        self.scheduler.start()?;
        self.drain_events();
        Ok(())
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        self.sync_releases();
        let running = self.scheduler.current();
        self.scheduler.clock_mut().advance(1);

        if let Some(w) = running.and_then(|id| self.workloads.iter_mut().find(|w| w.task == id)) {
            w.remaining = w.remaining.saturating_sub(1);
            if w.remaining == 0 {
                // The running task is the one whose job just finished.
                let _ = self.scheduler.complete_job();
            }
        }

        self.scheduler.tick();
        self.drain_events();
    }

    pub fn run(&mut self, ticks: Tick) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Run, calling `check` after each tick.
    pub fn run_with(&mut self, ticks: Tick, mut check: impl FnMut(&Scheduler<VirtualClock>)) {
        for _ in 0..ticks {
            self.step();
            check(&self.scheduler);
        }
    }

    /// Reset the demand of every task released since the last step.
    fn sync_releases(&mut self) {
        for w in self.workloads.iter_mut() {
            if let Some(tcb) = self.scheduler.task(w.task) {
                if tcb.releases() != w.seen_release {
                    w.seen_release = tcb.releases();
                    w.remaining = w.demand;
                }
            }
        }
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.scheduler.pop_event() {
            log_event(&event);
            match event {
                Event::Switch(sw) if sw.direction == SwitchDirection::In && sw.task.is_some() => {
                    self.switches_in += 1;
                }
                Event::DeadlineMiss { .. } => self.misses_seen += 1,
                _ => {}
            }
        }
    }

    /// Demand left in the current job of `task`.
    pub fn remaining(&self, task: TaskId) -> Option<Tick> {
        self.workloads.iter().find(|w| w.task == task).map(|w| w.remaining)
    }

    /// Switches into a task (idle excluded) seen on the event stream.
    pub fn switches_in(&self) -> u64 {
        self.switches_in
    }

    /// Deadline-miss events seen on the event stream.
    pub fn misses_seen(&self) -> u64 {
        self.misses_seen
    }

    pub fn scheduler(&self) -> &Scheduler<VirtualClock> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<VirtualClock> {
        &mut self.scheduler
    }
}
