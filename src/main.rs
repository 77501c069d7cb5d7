//! # EdfOS Example Firmware
//!
//! Five periodic tasks exercising dispatch, blocking queues and an
//! overwrite mailbox:
//!
//! | Task | Period | Deadline | Behavior |
//! |------|--------|----------|----------|
//! | `load_fast` | 10 | 10 | ~5 ms of busy work per job |
//! | `load_slow` | 100 | 100 | ~12 ms of busy work per job |
//! | `transmitter` | 50 | 50 | Sends a message into a 14-slot byte queue |
//! | `receiver` | 20 | 20 | Drains the queue and the status mailbox |
//! | `monitor` | 50 | 40 | Publishes CPU load into the status mailbox |
//!
//! Utilization stays well below 1, so EDF meets every deadline.
//! Scheduler events are rendered through `log` by the receiver, outside
//! any critical section.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use edfos::events::log_event;
use edfos::ipc::QueueId;
use edfos::kernel;
use edfos::sync::Shared;
use edfos::task::{TaskConfig, TaskEntry};
use edfos::SchedulerConfig;

const MESSAGE: &[u8; 14] = b"edf scheduler\n";

/// Byte queue from the transmitter to the receiver.
static BYTES: Shared<Option<QueueId>> = Shared::new(None);
/// Latest CPU load, published by the monitor.
static STATUS: Shared<Option<QueueId>> = Shared::new(None);

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Busy work for `arg` milliseconds, then wait for the next period.
extern "C" fn load_task(arg: usize) -> ! {
    loop {
        kernel::busy_for(arg as u32);
        let _ = kernel::complete_job();
    }
}

/// Push the message one byte at a time, waiting up to 100 ticks for space.
extern "C" fn transmitter(_: usize) -> ! {
    loop {
        if let Some(queue) = BYTES.with(|q| *q) {
            for byte in MESSAGE {
                if let Err(err) = kernel::send(queue, core::slice::from_ref(byte), 100) {
                    log::warn!("transmitter: {}", err);
                    break;
                }
            }
        }
        let _ = kernel::complete_job();
    }
}

/// Drain the byte queue, read the latest status, flush events.
extern "C" fn receiver(_: usize) -> ! {
    loop {
        if let Some(queue) = BYTES.with(|q| *q) {
            let mut byte = [0u8; 1];
            while kernel::receive(queue, &mut byte, 0).is_ok() {}
            let _ = kernel::reset_queue(queue);
        }
        if let Some(mailbox) = STATUS.with(|q| *q) {
            let mut load = [0u8; 4];
            if kernel::receive(mailbox, &mut load, 0).is_ok() {
                log::info!("cpu load {}%", u32::from_le_bytes(load));
            }
        }
        while let Some(event) = kernel::pop_event() {
            log_event(&event);
        }
        let _ = kernel::complete_job();
    }
}

/// Publish the current CPU load, replacing any unread value.
extern "C" fn monitor(_: usize) -> ! {
    loop {
        if let Some(mailbox) = STATUS.with(|q| *q) {
            let _ = kernel::overwrite(mailbox, &kernel::cpu_load().to_le_bytes());
        }
        let _ = kernel::complete_job();
    }
}

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let Some(cp) = cortex_m::Peripherals::take() else {
        halt();
    };

    kernel::init(SchedulerConfig::new());

    match kernel::create_queue(MESSAGE.len(), 1, false) {
        Ok(q) => BYTES.with(|slot| *slot = Some(q)),
        Err(err) => log::error!("cannot create byte queue: {}", err),
    }
    match kernel::create_queue(1, 4, true) {
        Ok(q) => STATUS.with(|slot| *slot = Some(q)),
        Err(err) => log::error!("cannot create status mailbox: {}", err),
    }

    let tasks: [(&'static str, TaskEntry, TaskConfig); 5] = [
        ("load_fast", load_task, TaskConfig::periodic(10).with_arg(5)),
        ("load_slow", load_task, TaskConfig::periodic(100).with_arg(12)),
        ("transmitter", transmitter, TaskConfig::periodic(50)),
        ("receiver", receiver, TaskConfig::periodic(20)),
        ("monitor", monitor, TaskConfig::periodic(50).with_deadline(40)),
    ];
    for (name, entry, config) in tasks {
        if let Err(err) = kernel::create_task(name, entry, config) {
            log::error!("cannot create {}: {}", name, err);
            halt();
        }
    }

    kernel::start(cp)
}
