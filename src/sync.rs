//! # Synchronization Primitives
//!
//! Interrupt-safe access to state shared between thread mode and the
//! SysTick/PendSV handlers. On target the `critical-section` implementation
//! comes from `cortex-m` (single core, interrupts masked); host tests link
//! the `std` implementation instead.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section.
///
/// Keep the closure short: every tick and every PendSV waits for it.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// A value only reachable from inside a critical section.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// Calls must not nest: the inner `RefCell` would report the value as
    /// already borrowed.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
