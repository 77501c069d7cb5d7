//! # Error Types
//!
//! Kernel and IPC error codes. Both are `Copy` so they can cross the
//! critical-section boundary and be stored in a TCB without allocation.

use core::fmt;

/// Errors from task/queue creation and task control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free TCB/queue slot, or the stack/queue memory pool is exhausted.
    ResourceExhausted,
    /// Creation parameters are out of range (zero period, deadline longer
    /// than the period, undersized stack, bad queue geometry).
    InvalidConfig,
    /// The task or queue handle does not name a live object.
    InvalidHandle,
    /// The operation is not valid in the task's current state.
    InvalidState,
    /// A job-control call was made while only the idle context is running.
    NoCurrentTask,
    /// The mandatory idle context could not be created. Fatal.
    IdleTaskUnavailable,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::ResourceExhausted => write!(f, "no free slot or backing memory"),
            KernelError::InvalidConfig => write!(f, "invalid configuration parameter"),
            KernelError::InvalidHandle => write!(f, "invalid handle"),
            KernelError::InvalidState => write!(f, "operation invalid in current task state"),
            KernelError::NoCurrentTask => write!(f, "no task is running"),
            KernelError::IdleTaskUnavailable => write!(f, "idle task could not be created"),
        }
    }
}

impl core::error::Error for KernelError {}

/// Errors from queue and mailbox operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// The queue was full (send) or empty (receive) and the timeout was 0.
    WouldBlock,
    /// The call blocked and its timeout elapsed first.
    Timeout,
    /// `overwrite` was called on a queue with more than one slot.
    InvalidOperation,
    /// The queue handle does not name a live queue.
    InvalidHandle,
    /// The item or buffer length does not match the queue's item size.
    ItemSize,
    /// A blocking call was made while only the idle context is running.
    NoCurrentTask,
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcError::WouldBlock => write!(f, "operation would block"),
            IpcError::Timeout => write!(f, "timed out"),
            IpcError::InvalidOperation => write!(f, "overwrite requires a single-slot queue"),
            IpcError::InvalidHandle => write!(f, "invalid queue handle"),
            IpcError::ItemSize => write!(f, "item size mismatch"),
            IpcError::NoCurrentTask => write!(f, "no task is running"),
        }
    }
}

impl core::error::Error for IpcError {}

pub type KernelResult<T = ()> = Result<T, KernelError>;
pub type IpcResult<T = ()> = Result<T, IpcError>;
