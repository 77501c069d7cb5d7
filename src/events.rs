//! # Scheduler Events
//!
//! Task-switch, tick and deadline-miss notifications for collaborators
//! outside the core (pin toggling, serial trace, logging).
//!
//! The scheduler only appends to a bounded ring while it mutates its own
//! state; subscribers drain the ring with `Scheduler::pop_event` outside any
//! critical section. When the ring is full the oldest event is dropped and
//! counted, so a slow subscriber can never stall dispatch.

use heapless::Deque;

use crate::config::{Tick, EVENT_BUFFER_LEN};
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDirection {
    In,
    Out,
}

/// One half of a context switch. `task == None` is the idle context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchEvent {
    pub task: Option<TaskId>,
    pub direction: SwitchDirection,
    /// Raw trace-clock reading.
    pub timestamp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Switch(SwitchEvent),
    Tick(Tick),
    DeadlineMiss { task: TaskId, deadline: Tick },
}

#[derive(Debug)]
pub struct EventLog {
    ring: Deque<Event, EVENT_BUFFER_LEN>,
    dropped: u32,
}

impl EventLog {
    pub const fn new() -> Self {
        Self {
            ring: Deque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.ring.is_full() {
            self.ring.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        let _ = self.ring.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.ring.pop_front()
    }

    /// Events discarded because the ring was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

/// Render an event through the `log` facade.
pub fn log_event(event: &Event) {
    match *event {
        Event::Switch(SwitchEvent { task, direction, timestamp }) => match task {
            Some(id) => log::trace!("switch {:?} task {} @ {}", direction, id.index(), timestamp),
            None => log::trace!("switch {:?} idle @ {}", direction, timestamp),
        },
        Event::Tick(tick) => log::trace!("tick {}", tick),
        Event::DeadlineMiss { task, deadline } => {
            log::warn!("task {} missed deadline {}", task.index(), deadline)
        }
    }
}
