//! # Architecture Abstraction Layer
//!
//! Provides a hardware abstraction boundary for the scheduler.
//! The Cortex-M4 port is compiled only for bare-metal ARM targets; on any
//! other target the portable fallbacks below keep the scheduler core
//! buildable and testable on the host.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

/// Sleep until the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    cortex_m::asm::wfi();

    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    core::hint::spin_loop();
}

/// Body of the idle context. Runs whenever no task is Ready.
pub extern "C" fn idle_entry(_arg: usize) -> ! {
    loop {
        wait_for_interrupt();
    }
}

/// Return address planted in every initial frame. Entry functions are
/// `-> !`, so reaching this is a task bug; park the CPU.
pub extern "C" fn task_exit() -> ! {
    loop {
        wait_for_interrupt();
    }
}
