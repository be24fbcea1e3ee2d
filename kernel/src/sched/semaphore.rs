//! Counting semaphore. Named in passing alongside the mutex and event
//! primitives but never given its own write-up in the distilled spec;
//! supplemented here as a straightforward third layer over the same wait
//! queue `Mutex`/`Event` use, since `semaphore_wait` is named as a
//! suspension point a blocking block-device/FS call may transitively hit.

use super::wait_queue::WaitQueueId;
use super::Scheduler;
use crate::error::Result;

pub struct Semaphore {
    wait_queue: WaitQueueId,
    count: i64,
}

impl Semaphore {
    pub fn new(scheduler: &mut Scheduler, initial_count: i64) -> Self {
        Semaphore {
            wait_queue: scheduler.new_wait_queue(),
            count: initial_count,
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Decrement the count; blocks if it would go negative. Caller reads
    /// the real outcome via `Scheduler::take_wait_result` once rescheduled,
    /// in the blocking case.
    pub fn wait(&mut self, scheduler: &mut Scheduler, cpu: usize, timeout_us: Option<u64>) -> Result<bool> {
        self.count -= 1;
        if self.count >= 0 {
            return Ok(true);
        }
        scheduler.wait_queue_block(cpu, self.wait_queue, timeout_us)?;
        Ok(false)
    }

    /// Increment the count, waking one waiter if the count was negative.
    pub fn post(&mut self, scheduler: &mut Scheduler) {
        self.count += 1;
        if self.count <= 0 {
            scheduler.wait_queue_wake_one(self.wait_queue, 0);
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
    fn wait_succeeds_while_count_positive() {
        let mut s = new_sched_with_idle();
        let mut sem = Semaphore::new(&mut s, 2);
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.yield_now(0);
        assert!(sem.wait(&mut s, 0, None).unwrap());
        assert_eq!(sem.count(), 1);
        assert!(sem.wait(&mut s, 0, None).unwrap());
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn wait_blocks_once_exhausted_then_post_wakes() {
        let mut s = new_sched_with_idle();
        let mut sem = Semaphore::new(&mut s, 0);
        let a = s.create_thread("a", 16, 0, 0, ThreadFlags::empty()).unwrap();
        s.resume(a).unwrap();
        s.yield_now(0);

        assert!(!sem.wait(&mut s, 0, None).unwrap());
        assert_eq!(sem.count(), -1);
        assert_eq!(s.thread(a).unwrap().state, crate::sched::ThreadState::Blocked);

        sem.post(&mut s);
        assert_eq!(sem.count(), 0);
        assert_eq!(s.thread(a).unwrap().state, crate::sched::ThreadState::Ready);
    }
}
