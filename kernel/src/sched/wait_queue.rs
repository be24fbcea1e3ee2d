//! Wait queues: an ordered list of blocked threads plus a count kept in
//! lockstep with the list. Queues themselves live in the scheduler's own
//! arena (`Scheduler::wait_queues`) and are addressed by `WaitQueueId`
//! rather than owned by whoever creates one — that is what lets a firing
//! timeout remove a thread from whichever queue it is blocked on, since the
//! scheduler can always look the queue up by id. Mutexes, events and
//! semaphores are thin layers over the operations here.
//!
//! A genuine blocking call suspends its caller's stack at the scheduling
//! point and resumes it, transparently, once woken — that is the
//! architecture port's job (`ArchPort::context_switch`) on real hardware.
//! `MockArch`'s no-op implementation can't replicate that for host tests,
//! so `wait_queue_block` only performs the bookkeeping half (enqueue,
//! mark `Blocked`, perform the scheduling point); the outcome is read back
//! with `Scheduler::take_wait_result` once the caller is current again.

use super::{Scheduler, Tid, ThreadFlags, ThreadState, WakeReason};
use crate::error::{KernelError, Result};
use alloc::collections::VecDeque;

pub type WaitQueueId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Woken(i32),
    TimedOut,
    Destroyed,
}

pub struct WaitQueue {
    list: VecDeque<Tid>,
}

impl WaitQueue {
    pub fn new() -> Self {
        WaitQueue { list: VecDeque::new() }
    }

    pub fn count(&self) -> usize {
        self.list.len()
    }

    fn remove(&mut self, tid: Tid) -> bool {
        if let Some(pos) = self.list.iter().position(|&t| t == tid) {
            self.list.remove(pos);
            true
        } else {
            false
        }
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Queue the running thread on `cpu` onto `queue_id`, arm a timeout if
    /// given, and perform the scheduling point. Once this thread is current
    /// again, call `take_wait_result` to learn why it was woken.
    pub fn wait_queue_block(&mut self, cpu: usize, queue_id: WaitQueueId, timeout_us: Option<u64>) -> Result<()> {
        let cur = self.current(cpu).ok_or(KernelError::Internal)?;
        let queue = self.wait_queues.get_mut(&queue_id).ok_or(KernelError::ObjectDestroyed)?;
        queue.list.push_back(cur);
        if let Some(t) = self.threads.get_mut(&cur) {
            t.wake_reason = WakeReason::Woken;
        }
        self.block_current_on(cpu, queue_id, timeout_us);
        Ok(())
    }

    /// Read back why `tid` left its last blocking wait. Valid to call once
    /// the thread is no longer `Blocked`.
    pub fn take_wait_result(&self, tid: Tid) -> Option<WaitOutcome> {
        self.thread(tid).map(|t| match t.wake_reason {
            WakeReason::Woken => WaitOutcome::Woken(t.wait_block_code),
            WakeReason::TimedOut => WaitOutcome::TimedOut,
            WakeReason::Destroyed => WaitOutcome::Destroyed,
        })
    }

    /// Pop the first waiter, mark it `Ready` and head-insert it into the
    /// run queue so it runs before existing peers, per §4.1's wake
    /// semantics. Returns the woken thread, or `None` if the queue was
    /// empty or unknown. `Mutex::unlock` uses the return value to hand
    /// ownership directly to the waiter it wakes.
    pub fn wait_queue_wake_one(&mut self, queue_id: WaitQueueId, wake_code: i32) -> Option<Tid> {
        let tid = self.wait_queues.get_mut(&queue_id).and_then(|q| q.list.pop_front())?;
        self.ready_waiter(tid, WakeReason::Woken, wake_code);
        Some(tid)
    }

    /// Wake every waiter currently on the queue, in FIFO arrival order.
    pub fn wait_queue_wake_all(&mut self, queue_id: WaitQueueId, wake_code: i32) {
        loop {
            let tid = match self.wait_queues.get_mut(&queue_id).and_then(|q| q.list.pop_front()) {
                Some(t) => t,
                None => break,
            };
            self.ready_waiter(tid, WakeReason::Woken, wake_code);
        }
    }

    /// Wake a specific thread that is (or may no longer be) waiting on
    /// `queue_id`. Returns `false`, a no-op, if the thread already left the
    /// queue by any other means (woken, timed out, queue destroyed).
    pub fn wait_queue_unblock_thread(&mut self, queue_id: WaitQueueId, tid: Tid, wake_code: i32) -> bool {
        let removed = self.wait_queues.get_mut(&queue_id).map(|q| q.remove(tid)).unwrap_or(false);
        if removed {
            self.ready_waiter(tid, WakeReason::Woken, wake_code);
        }
        removed
    }

    /// Tear down a queue, waking every current waiter with
    /// `WaitOutcome::Destroyed`. The queue id itself stays valid but empty;
    /// callers that own it (a `Mutex`, an `Event`) are responsible for not
    /// handing out the id again afterwards.
    pub fn wait_queue_destroy(&mut self, queue_id: WaitQueueId) {
        loop {
            let tid = match self.wait_queues.get_mut(&queue_id).and_then(|q| q.list.pop_front()) {
                Some(t) => t,
                None => break,
            };
            self.ready_waiter(tid, WakeReason::Destroyed, 0);
        }
    }

    /// Test-only: whether `tid` sits in `queue_id`'s list right now, for
    /// the "blocked iff queued" invariant property test below.
    #[cfg(test)]
    pub(crate) fn wait_queue_contains(&self, queue_id: WaitQueueId, tid: Tid) -> bool {
        self.wait_queues.get(&queue_id).map(|q| q.list.contains(&tid)).unwrap_or(false)
    }

    fn ready_waiter(&mut self, tid: Tid, reason: WakeReason, wake_code: i32) {
        let (priority, is_idle) = match self.threads.get_mut(&tid) {
            Some(t) if t.state == ThreadState::Blocked => {
                t.state = ThreadState::Ready;
                t.blocking_wait_queue = None;
                t.wait_block_code = wake_code;
                t.wake_reason = reason;
                (t.priority, t.flags.contains(ThreadFlags::IDLE))
            }
            _ => return,
        };
        if !is_idle {
            self.run_queue.enqueue_head(tid, priority);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn new_sched_with_idle() -> Scheduler {
        let mut s = Scheduler::new();
        s.create_idle_thread(0, 0).unwrap();
        s
    }

    #[test]
    fn block_then_wake_one_is_fifo() {
        let mut s = new_sched_with_idle();
        let q = s.new_wait_queue();
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        let b = s.create_thread("b", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.resume(b).unwrap();
        s.yield_now(0); // a current
        s.wait_queue_block(0, q, None).unwrap(); // a blocks on q, b becomes current
        assert_eq!(s.current(0), Some(b));
        assert_eq!(s.thread(a).unwrap().state, ThreadState::Blocked);
        assert_eq!(s.wait_queue_len(q), 1);

        s.wait_queue_wake_one(q, 99);
        assert_eq!(s.thread(a).unwrap().state, ThreadState::Ready);
        assert_eq!(s.take_wait_result(a), Some(WaitOutcome::Woken(99)));
        assert_eq!(s.wait_queue_len(q), 0);
    }

    #[test]
    fn timeout_removes_waiter_from_queue() {
        let mut s = new_sched_with_idle();
        let q = s.new_wait_queue();
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.yield_now(0);
        s.wait_queue_block(0, q, Some(1000)).unwrap();
        assert_eq!(s.wait_queue_len(q), 1);

        s.process_timeouts(1000);
        assert_eq!(s.thread(a).unwrap().state, ThreadState::Ready);
        assert_eq!(s.take_wait_result(a), Some(WaitOutcome::TimedOut));
        assert_eq!(s.wait_queue_len(q), 0);
    }

    #[test]
    fn wake_after_timeout_already_fired_is_a_no_op() {
        let mut s = new_sched_with_idle();
        let q = s.new_wait_queue();
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.yield_now(0);
        s.wait_queue_block(0, q, Some(100)).unwrap();
        s.process_timeouts(100);
        assert_eq!(s.take_wait_result(a), Some(WaitOutcome::TimedOut));

        // q is already empty; waking it again must not resurrect a.
        s.wait_queue_wake_one(q, 5);
        assert_eq!(s.take_wait_result(a), Some(WaitOutcome::TimedOut));
    }

    #[test]
    fn destroy_wakes_every_waiter_as_destroyed() {
        let mut s = new_sched_with_idle();
        let q = s.new_wait_queue();
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        let b = s.create_thread("b", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.resume(b).unwrap();
        s.yield_now(0);
        s.wait_queue_block(0, q, None).unwrap(); // a blocks, b runs
        s.yield_now(0); // b yields
        s.wait_queue_block(0, q, None).unwrap(); // b blocks too
        assert_eq!(s.wait_queue_len(q), 2);

        s.wait_queue_destroy(q);
        assert_eq!(s.take_wait_result(a), Some(WaitOutcome::Destroyed));
        assert_eq!(s.take_wait_result(b), Some(WaitOutcome::Destroyed));
        assert_eq!(s.wait_queue_len(q), 0);
    }

    proptest::proptest! {
        /// §8 invariant 1 and 3: a thread is BLOCKED iff it sits on its
        /// `blocking_wait_queue`'s list, and the queue's count always
        /// matches that list's length, across any interleaving of
        /// block/wake-one/wake-all on a handful of threads sharing one
        /// queue.
        #[test]
        fn blocked_state_matches_queue_membership_after_any_op_sequence(
            ops in proptest::collection::vec((0u8..4, 0usize..4), 0..40)
        ) {
            let mut s = new_sched_with_idle();
            let q = s.new_wait_queue();
            let threads: Vec<Tid> = (0..4)
                .map(|i| {
                    let t = s.create_thread("t", 16, 0, 0, ThreadFlags::empty()).unwrap();
                    s.resume(t).unwrap();
                    t
                })
                .collect();
            s.yield_now(0);

            for (kind, idx) in ops {
                let tid = threads[idx];
                match kind {
                    0 => {
                        if s.current(0) == Some(tid) {
                            let _ = s.wait_queue_block(0, q, None);
                        }
                    }
                    1 => { s.wait_queue_wake_one(q, 0); }
                    2 => { s.wait_queue_wake_all(q, 0); }
                    _ => { s.wait_queue_unblock_thread(q, tid, 0); }
                }
                for &t in &threads {
                    let is_blocked = s.thread(t).unwrap().state == ThreadState::Blocked;
                    let in_queue = s.wait_queue_contains(q, t);
                    proptest::prop_assert_eq!(is_blocked, in_queue);
                }
                proptest::prop_assert_eq!(s.wait_queue_len(q), {
                    let mut n = 0;
                    for &t in &threads {
                        if s.wait_queue_contains(q, t) {
                            n += 1;
                        }
                    }
                    n
                });
            }
        }
    }
}
