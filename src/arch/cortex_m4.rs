//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! the SysTick tick source, the PendSV stack swap and the first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by tasks and the idle context
//!
//! On exception entry, the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the process stack. PendSV saves and restores R4–R11 by hand.
//!
//! The scheduler has already picked the next context by the time PendSV
//! runs; the handler only stores the outgoing stack pointer and loads the
//! incoming one. FPU registers are not saved: build for
//! `thumbv7em-none-eabi` (soft float).
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xE0
//! - PendSV: 0xFF (lowest), so a switch never preempts another handler

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel::SCHEDULER;

const SYSTICK_PRIORITY: u8 = 0xE0;
const PENDSV_PRIORITY: u8 = 0xFF;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Fire `SysTick` at `TICK_HZ` from the processor clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Request a context switch. PendSV runs as soon as no other handler is active.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: called once before the scheduler starts; no priority-based
    // critical sections exist yet.
    unsafe {
        scb.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
        scb.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode to PSP and jump into the initial frame at `psp`.
///
/// # Safety
/// Must only be called once, with a stack pointer produced by
/// `Scheduler::switch_stack_pointer`.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        "adds r0, #32",        // skip software-saved R4-R11
        "msr psp, r0",
        "movs r0, #2",         // CONTROL.SPSEL = 1
        "msr control, r0",
        "isb",
        "pop {{r0-r3, r12}}",  // R0 carries the entry argument
        "pop {{r4}}",          // LR (task_exit)
        "pop {{r5}}",          // PC (entry, Thumb bit cleared)
        "pop {{r6}}",          // xPSR
        "orr r5, r5, #1",
        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler.
///
/// 1. Push R4–R11 onto the outgoing process stack
/// 2. Hand the resulting PSP to the scheduler
/// 3. Fetch the PSP of the dispatched context
/// 4. Pop R4–R11 and return to Thread mode on PSP
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "push {{r3, lr}}",     // keep EXC_RETURN, MSP stays 8-byte aligned
        "bl {save}",
        "bl {switch}",
        "pop {{r3, lr}}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "bx lr",
        save = sym save_current_context,
        switch = sym do_context_switch,
    );
}

extern "C" fn save_current_context(psp: *mut u32) {
    SCHEDULER.with(|s| s.store_stack_pointer(psp));
}

extern "C" fn do_context_switch() -> *mut u32 {
    SCHEDULER.with(|s| s.switch_stack_pointer())
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// Scheduler tick entry point.
#[no_mangle]
pub extern "C" fn SysTick() {
    if SCHEDULER.with(|s| s.tick()) {
        trigger_pendsv();
    }
}
