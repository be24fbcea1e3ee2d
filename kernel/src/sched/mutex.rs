//! Mutex: a thin layer over a wait queue plus an owning-thread id. No
//! priority inheritance — the owner is tracked only so a double-unlock or
//! an unlock-by-the-wrong-thread is detectable in debug builds, exactly the
//! debugging aid the original provides and nothing more.

use super::wait_queue::WaitQueueId;
use super::{Scheduler, Tid};
use crate::error::Result;

/// What happened when a thread asked to acquire a `Mutex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Acquired immediately, uncontended.
    Acquired,
    /// The mutex was held; the caller is now blocked on its wait queue and
    /// must read the real outcome later via `Scheduler::take_wait_result`.
    Blocked,
}

pub struct Mutex {
    wait_queue: WaitQueueId,
    owner: Option<Tid>,
}

impl Mutex {
    pub fn new(scheduler: &mut Scheduler) -> Self {
        Mutex {
            wait_queue: scheduler.new_wait_queue(),
            owner: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<Tid> {
        self.owner
    }

    /// Acquire without blocking. Returns `false` if already held.
    pub fn try_lock(&mut self, tid: Tid) -> bool {
        if self.owner.is_some() {
            return false;
        }
        self.owner = Some(tid);
        true
    }

    pub fn lock(&mut self, scheduler: &mut Scheduler, cpu: usize, timeout_us: Option<u64>) -> Result<LockOutcome> {
        let cur = scheduler.current(cpu).ok_or(crate::error::KernelError::Internal)?;
        if self.try_lock(cur) {
            return Ok(LockOutcome::Acquired);
        }
        scheduler.wait_queue_block(cpu, self.wait_queue, timeout_us)?;
        Ok(LockOutcome::Blocked)
    }

    /// Release the mutex. Hands ownership directly to the next waiter (if
    /// any) rather than reopening it to a fresh `try_lock` race.
    pub fn unlock(&mut self, scheduler: &mut Scheduler, tid: Tid) {
        debug_assert_eq!(self.owner, Some(tid), "unlock by non-owner thread");
        self.owner = None;
        if let Some(next) = scheduler.wait_queue_wake_one(self.wait_queue, 0) {
            self.owner = Some(next);
        }
    }

    pub fn destroy(&mut self, scheduler: &mut Scheduler) {
        scheduler.wait_queue_destroy(self.wait_queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::ThreadFlags;

    fn new_sched_with_idle() -> Scheduler {
        let mut s = Scheduler::new();
        s.create_idle_thread(0, 0).unwrap();
        s
    }

    #[test]
    fn uncontended_lock_succeeds_immediately() {
        let mut s = new_sched_with_idle();
        let mut m = Mutex::new(&mut s);
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.yield_now(0);
        assert_eq!(m.lock(&mut s, 0, None).unwrap(), LockOutcome::Acquired);
        assert_eq!(m.owner(), Some(a));
    }

    #[test]
    fn contended_lock_blocks_then_hands_off_on_unlock() {
        let mut s = new_sched_with_idle();
        let mut m = Mutex::new(&mut s);
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        let b = s.create_thread("b", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.resume(b).unwrap();
        s.yield_now(0); // a current
        assert_eq!(m.lock(&mut s, 0, None).unwrap(), LockOutcome::Acquired);

        s.yield_now(0); // a yields, b current
        assert_eq!(m.lock(&mut s, 0, None).unwrap(), LockOutcome::Blocked);
        assert_eq!(s.current(0), Some(a)); // only other runnable thread

        m.unlock(&mut s, a);
        assert_eq!(m.owner(), Some(b));
        assert_eq!(
            s.take_wait_result(b),
            Some(crate::sched::wait_queue::WaitOutcome::Woken(0))
        );
    }
}
