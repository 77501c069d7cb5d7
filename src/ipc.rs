//! # Queues and Mailboxes
//!
//! Bounded FIFO queues and single-slot latest-value mailboxes. This module
//! owns the storage and the wait lists; the blocking semantics (who gets
//! woken, state transitions, timeouts) live in the scheduler, which is the
//! only caller.
//!
//! Items are fixed-size byte records copied in and out of a shared byte
//! pool. Wait lists are keyed by (absolute deadline, task id), so the most
//! urgent waiter is always served first.

use heapless::Vec;

use crate::config::{Tick, MAX_ITEM_SIZE, MAX_QUEUES, MAX_TASKS, QUEUE_POOL_BYTES};
use crate::error::{IpcError, IpcResult, KernelError, KernelResult};
use crate::task::TaskId;

/// Queue handle, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub(crate) u8);

impl QueueId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Wait lists
// ---------------------------------------------------------------------------

/// A task blocked on a queue.
#[derive(Debug, Clone)]
pub(crate) struct Waiter {
    pub task: TaskId,
    /// Absolute deadline of the waiting job.
    pub deadline: Tick,
    /// Tick at which the wait times out; `None` waits forever.
    pub wake_at: Option<Tick>,
    /// Parked item of a blocked sender. Empty for receivers.
    pub item: Vec<u8, MAX_ITEM_SIZE>,
}

/// Blocked tasks of one direction. A task waits on at most one queue, so
/// `MAX_TASKS` entries always suffice.
#[derive(Debug, Default)]
pub(crate) struct WaitList {
    entries: Vec<Waiter, MAX_TASKS>,
}

impl WaitList {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, waiter: Waiter) -> IpcResult {
        self.entries.push(waiter).map_err(|_| IpcError::InvalidOperation)
    }

    /// Remove and return the earliest-deadline waiter.
    pub fn pop_most_urgent(&mut self) -> Option<Waiter> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| (w.deadline, w.task))
            .map(|(i, _)| i)?;
        Some(self.entries.swap_remove(idx))
    }

    /// Refresh the key of a waiter whose job was re-released.
    pub fn rekey(&mut self, task: TaskId, deadline: Tick) -> bool {
        match self.entries.iter_mut().find(|w| w.task == task) {
            Some(w) => {
                w.deadline = deadline;
                true
            }
            None => false,
        }
    }

    /// Move every waiter whose timeout has elapsed into `expired`.
    pub fn take_expired(&mut self, now: Tick, expired: &mut Vec<TaskId, MAX_TASKS>) {
        let mut i = 0;
        while i < self.entries.len() {
            if matches!(self.entries[i].wake_at, Some(t) if t <= now) {
                let w = self.entries.swap_remove(i);
                let _ = expired.push(w.task);
            } else {
                i += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Queue descriptor. Its items live in `QueueTable`'s byte pool at
/// `base .. base + capacity * item_size`.
#[derive(Debug)]
pub struct Queue {
    capacity: usize,
    item_size: usize,
    overwrite: bool,
    base: usize,
    head: usize,
    count: usize,
    pub(crate) senders: WaitList,
    pub(crate) receivers: WaitList,
}

impl Queue {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Latest-value mailbox: `send` replaces instead of blocking.
    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    /// Items currently buffered.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn blocked_senders(&self) -> usize {
        self.senders.len()
    }

    pub fn blocked_receivers(&self) -> usize {
        self.receivers.len()
    }

    fn slot(&self, index: usize) -> core::ops::Range<usize> {
        let start = self.base + (index % self.capacity) * self.item_size;
        start..start + self.item_size
    }

    /// Append an item. Caller guarantees `!is_full()`.
    pub(crate) fn push_back(&mut self, pool: &mut [u8], item: &[u8]) {
        let slot = self.slot(self.head + self.count);
        pool[slot].copy_from_slice(item);
        self.count += 1;
    }

    /// Remove the oldest item into `out`. Caller guarantees `!is_empty()`.
    pub(crate) fn pop_front(&mut self, pool: &[u8], out: &mut [u8]) {
        let slot = self.slot(self.head);
        out.copy_from_slice(&pool[slot]);
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
    }

    /// Store `item` as the only unread value. Single-slot queues only.
    pub(crate) fn replace(&mut self, pool: &mut [u8], item: &[u8]) {
        self.head = 0;
        self.count = 0;
        self.push_back(pool, item);
    }

    /// Discard every buffered item. Waiters are left alone.
    pub(crate) fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }
}

// ---------------------------------------------------------------------------
// Queue table
// ---------------------------------------------------------------------------

/// Fixed-capacity queue table plus the byte pool backing all items.
pub struct QueueTable {
    queues: Vec<Queue, MAX_QUEUES>,
    pool: [u8; QUEUE_POOL_BYTES],
    next: usize,
}

impl QueueTable {
    pub const fn new() -> Self {
        Self {
            queues: Vec::new(),
            pool: [0; QUEUE_POOL_BYTES],
            next: 0,
        }
    }

    pub fn create(
        &mut self,
        capacity: usize,
        item_size: usize,
        overwrite: bool,
    ) -> KernelResult<QueueId> {
        if capacity == 0 || item_size == 0 || item_size > MAX_ITEM_SIZE {
            return Err(KernelError::InvalidConfig);
        }
        if overwrite && capacity != 1 {
            return Err(KernelError::InvalidConfig);
        }
        if self.queues.is_full() {
            return Err(KernelError::ResourceExhausted);
        }
        let bytes = capacity
            .checked_mul(item_size)
            .ok_or(KernelError::ResourceExhausted)?;
        if bytes > QUEUE_POOL_BYTES - self.next {
            return Err(KernelError::ResourceExhausted);
        }

        let id = QueueId(self.queues.len() as u8);
        let queue = Queue {
            capacity,
            item_size,
            overwrite,
            base: self.next,
            head: 0,
            count: 0,
            senders: WaitList::new(),
            receivers: WaitList::new(),
        };
        self.queues
            .push(queue)
            .map_err(|_| KernelError::ResourceExhausted)?;
        self.next += bytes;
        Ok(id)
    }

    pub fn get(&self, id: QueueId) -> IpcResult<&Queue> {
        self.queues.get(id.index()).ok_or(IpcError::InvalidHandle)
    }

    /// Split borrow of a queue and the shared pool.
    pub(crate) fn entry(&mut self, id: QueueId) -> IpcResult<(&mut Queue, &mut [u8])> {
        let queue = self
            .queues
            .get_mut(id.index())
            .ok_or(IpcError::InvalidHandle)?;
        Ok((queue, &mut self.pool[..]))
    }

    /// Collect every waiter, on any queue, whose timeout has elapsed.
    pub(crate) fn take_expired(&mut self, now: Tick, expired: &mut Vec<TaskId, MAX_TASKS>) {
        for queue in self.queues.iter_mut() {
            queue.senders.take_expired(now, expired);
            queue.receivers.take_expired(now, expired);
        }
    }

    /// Refresh the wait-list key of `task`, wherever it waits.
    pub(crate) fn rekey(&mut self, task: TaskId, deadline: Tick) {
        for queue in self.queues.iter_mut() {
            if queue.senders.rekey(task, deadline) || queue.receivers.rekey(task, deadline) {
                return;
            }
        }
    }

    /// Pool bytes not yet handed out.
    pub fn remaining_bytes(&self) -> usize {
        QUEUE_POOL_BYTES - self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiter(task: u8, deadline: Tick, wake_at: Option<Tick>) -> Waiter {
        Waiter {
            task: TaskId(task),
            deadline,
            wake_at,
            item: Vec::new(),
        }
    }

    #[test]
    fn test_create_validates_geometry() {
        let mut table = QueueTable::new();
        assert_eq!(table.create(0, 1, false), Err(KernelError::InvalidConfig));
        assert_eq!(table.create(4, 0, false), Err(KernelError::InvalidConfig));
        assert_eq!(
            table.create(1, MAX_ITEM_SIZE + 1, false),
            Err(KernelError::InvalidConfig)
        );
        assert_eq!(table.create(2, 1, true), Err(KernelError::InvalidConfig));
        assert!(table.create(1, 1, true).is_ok());
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut table = QueueTable::new();
        let per_queue = QUEUE_POOL_BYTES / 2;
        table.create(per_queue, 1, false).unwrap();
        table.create(per_queue, 1, false).unwrap();
        assert_eq!(table.remaining_bytes(), 0);
        assert_eq!(table.create(1, 1, false), Err(KernelError::ResourceExhausted));
    }

    #[test]
    fn test_table_exhaustion() {
        let mut table = QueueTable::new();
        for _ in 0..MAX_QUEUES {
            table.create(1, 1, false).unwrap();
        }
        assert_eq!(table.create(1, 1, false), Err(KernelError::ResourceExhausted));
    }

    #[test]
    fn test_ring_wraps_in_fifo_order() {
        let mut table = QueueTable::new();
        let id = table.create(3, 2, false).unwrap();
        let (q, pool) = table.entry(id).unwrap();
        let mut out = [0u8; 2];

        q.push_back(pool, &[1, 1]);
        q.push_back(pool, &[2, 2]);
        q.pop_front(pool, &mut out);
        assert_eq!(out, [1, 1]);
        q.push_back(pool, &[3, 3]);
        q.push_back(pool, &[4, 4]);
        assert!(q.is_full());

        for expected in [[2, 2], [3, 3], [4, 4]] {
            q.pop_front(pool, &mut out);
            assert_eq!(out, expected);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_queues_do_not_share_slots() {
        let mut table = QueueTable::new();
        let a = table.create(1, 1, false).unwrap();
        let b = table.create(1, 1, false).unwrap();
        {
            let (q, pool) = table.entry(a).unwrap();
            q.push_back(pool, b"a");
        }
        {
            let (q, pool) = table.entry(b).unwrap();
            q.push_back(pool, b"b");
        }
        let mut out = [0u8; 1];
        let (q, pool) = table.entry(a).unwrap();
        q.pop_front(pool, &mut out);
        assert_eq!(&out, b"a");
    }

    #[test]
    fn test_replace_keeps_single_item() {
        let mut table = QueueTable::new();
        let id = table.create(1, 1, true).unwrap();
        let (q, pool) = table.entry(id).unwrap();
        q.replace(pool, b"A");
        q.replace(pool, b"B");
        assert_eq!(q.count(), 1);
        let mut out = [0u8; 1];
        q.pop_front(pool, &mut out);
        assert_eq!(&out, b"B");
    }

    #[test]
    fn test_wait_list_serves_earliest_deadline() {
        let mut list = WaitList::new();
        list.push(waiter(2, 30, None)).unwrap();
        list.push(waiter(1, 10, None)).unwrap();
        list.push(waiter(0, 10, None)).unwrap();
        assert_eq!(list.pop_most_urgent().unwrap().task, TaskId(0));
        assert_eq!(list.pop_most_urgent().unwrap().task, TaskId(1));
        assert_eq!(list.pop_most_urgent().unwrap().task, TaskId(2));
        assert!(list.pop_most_urgent().is_none());
    }

    #[test]
    fn test_wait_list_rekey_changes_order() {
        let mut list = WaitList::new();
        list.push(waiter(0, 10, None)).unwrap();
        list.push(waiter(1, 20, None)).unwrap();
        assert!(list.rekey(TaskId(0), 40));
        assert_eq!(list.pop_most_urgent().unwrap().task, TaskId(1));
    }

    #[test]
    fn test_take_expired_leaves_others() {
        let mut list = WaitList::new();
        list.push(waiter(0, 10, Some(5))).unwrap();
        list.push(waiter(1, 10, None)).unwrap();
        list.push(waiter(2, 10, Some(9))).unwrap();
        let mut expired = Vec::new();
        list.take_expired(5, &mut expired);
        assert_eq!(expired.as_slice(), &[TaskId(0)]);
        assert_eq!(list.len(), 2);
        list.take_expired(9, &mut expired);
        assert_eq!(expired.as_slice(), &[TaskId(0), TaskId(2)]);
        assert_eq!(list.pop_most_urgent().unwrap().task, TaskId(1));
    }
}
