//! Event: a binary condition threads can wait on. `AutoUnsignal` wakes
//! exactly one waiter and immediately clears itself; `Broadcast` latches
//! the signalled bit so every current *and future* waiter passes through
//! until explicitly cleared.

use super::wait_queue::WaitQueueId;
use super::Scheduler;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    AutoUnsignal,
    Broadcast,
}

pub struct Event {
    wait_queue: WaitQueueId,
    mode: EventMode,
    signalled: bool,
}

impl Event {
    pub fn new(scheduler: &mut Scheduler, mode: EventMode) -> Self {
        Event {
            wait_queue: scheduler.new_wait_queue(),
            mode,
            signalled: false,
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.signalled
    }

    /// Wait for the event. Returns immediately if a broadcast event is
    /// already latched; otherwise blocks. Caller reads the real outcome
    /// via `Scheduler::take_wait_result` once rescheduled, in the blocking
    /// case.
    pub fn wait(&mut self, scheduler: &mut Scheduler, cpu: usize, timeout_us: Option<u64>) -> Result<bool> {
        if self.mode == EventMode::Broadcast && self.signalled {
            return Ok(true);
        }
        scheduler.wait_queue_block(cpu, self.wait_queue, timeout_us)?;
        Ok(false)
    }

    /// Signal the event. `AutoUnsignal` wakes one waiter and never
    /// latches; `Broadcast` wakes every current waiter and latches until
    /// `clear`.
    pub fn signal(&mut self, scheduler: &mut Scheduler) {
        match self.mode {
            EventMode::AutoUnsignal => {
                scheduler.wait_queue_wake_one(self.wait_queue, 0);
            }
            EventMode::Broadcast => {
                self.signalled = true;
                scheduler.wait_queue_wake_all(self.wait_queue, 0);
            }
        }
    }

    pub fn clear(&mut self) {
        self.signalled = false;
    }

    pub fn destroy(&mut self, scheduler: &mut Scheduler) {
        scheduler.wait_queue_destroy(self.wait_queue);
    }
}
