//! 32-bucket priority run queue: an array of FIFO lists indexed by
//! priority, plus a bitmap where bit *p* is set iff bucket *p* is
//! non-empty. This is the "arena + stable indices" re-expression of the
//! original's intrusive linked lists (§9 design notes): threads live in a
//! separate arena and the run queue only ever stores their ids.

use crate::config::MAX_PRIORITY;
use crate::sched::Tid;
use alloc::collections::VecDeque;

const NUM_BUCKETS: usize = MAX_PRIORITY as usize + 1;

pub struct RunQueue {
    buckets: [VecDeque<Tid>; NUM_BUCKETS],
    bitmap: u32,
}

impl RunQueue {
    pub fn new() -> Self {
        RunQueue {
            buckets: core::array::from_fn(|_| VecDeque::new()),
            bitmap: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    pub fn len_at(&self, priority: u8) -> usize {
        self.buckets[priority as usize].len()
    }

    /// Insert at the front of `priority`'s bucket: a woken or
    /// preempted-with-quantum-left thread runs before existing peers.
    pub fn enqueue_head(&mut self, tid: Tid, priority: u8) {
        self.buckets[priority as usize].push_front(tid);
        self.bitmap |= 1 << priority;
    }

    /// Insert at the back of `priority`'s bucket: preserves FIFO order
    /// among same-priority threads.
    pub fn enqueue_tail(&mut self, tid: Tid, priority: u8) {
        self.buckets[priority as usize].push_back(tid);
        self.bitmap |= 1 << priority;
    }

    /// Remove `tid` from wherever it sits in `priority`'s bucket (used when
    /// a thread is plucked off the run queue without having been picked,
    /// e.g. cancellation). Returns whether it was found.
    pub fn remove(&mut self, tid: Tid, priority: u8) -> bool {
        let bucket = &mut self.buckets[priority as usize];
        if let Some(pos) = bucket.iter().position(|&t| t == tid) {
            bucket.remove(pos);
            if bucket.is_empty() {
                self.bitmap &= !(1 << priority);
            }
            true
        } else {
            false
        }
    }

    /// Scan the bitmap from the highest set bit down; within that bucket,
    /// pick and remove the first thread for which `pinned_ok` returns true
    /// (a thread whose `pinned_cpu` is unset or equals the calling CPU).
    pub fn pick_top(&mut self, mut pinned_ok: impl FnMut(Tid) -> bool) -> Option<Tid> {
        let mut bitmap = self.bitmap;
        while bitmap != 0 {
            let priority = 31 - bitmap.leading_zeros() as u8;
            let bucket = &mut self.buckets[priority as usize];
            if let Some(pos) = bucket.iter().position(|&t| pinned_ok(t)) {
                let tid = bucket.remove(pos).unwrap();
                if bucket.is_empty() {
                    self.bitmap &= !(1 << priority);
                }
                return Some(tid);
            }
            bitmap &= !(1 << priority);
        }
        None
    }

    /// Bit `p` of the bitmap, for the "bitmap bit set iff bucket non-empty"
    /// invariant property test.
    pub fn bit_set(&self, priority: u8) -> bool {
        self.bitmap & (1 << priority) != 0
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}
