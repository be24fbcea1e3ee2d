//! L1: thread scheduler and synchronization primitives. All manipulation of
//! run queues, wait queues and thread state happens through `Scheduler`,
//! which stands in for the "global thread lock, interrupts disabled"
//! discipline the original enforces — every method here takes `&mut self`,
//! so the one spinlock guarding the whole scheduler is the borrow checker
//! plus whatever mutex actually wraps a `Scheduler` instance in a real
//! deployment (see `sched::smp::scheduler()`).
//!
//! Wait queues live in their own arena on the scheduler (`wait_queues`),
//! addressed by `WaitQueueId`, rather than being owned directly by whoever
//! creates one (a `Mutex`, an `Event`, a thread's join queue). That is what
//! lets a timeout fire and remove a thread from whichever queue it is
//! blocked on: the scheduler can always look the queue up by id, whereas a
//! raw `&mut WaitQueue` handed to `wait_queue_block` would be out of reach
//! by the time the timeout list is walked later.

pub mod event;
pub mod mutex;
pub mod runqueue;
pub mod semaphore;
pub mod smp;
pub mod wait_queue;

use crate::arch::CpuContext;
use crate::config::{DEFAULT_PRIORITY, DEFAULT_QUANTUM_TICKS, IDLE_PRIORITY, SMP_MAX_CPUS};
use crate::error::{KernelError, Result};
use crate::log;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use bitflags::bitflags;
use runqueue::RunQueue;
use wait_queue::{WaitQueue, WaitQueueId};

pub use smp::{init, with_scheduler};

pub type Tid = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Suspended,
    Ready,
    Running,
    Blocked,
    Sleeping,
    Death,
}

/// Why a blocked thread left a wait queue. Kept separate from
/// `wait_block_code` so a legitimate negative payload (an exit code, say)
/// can never be confused with a timeout or destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Woken,
    TimedOut,
    Destroyed,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ThreadFlags: u32 {
        const DETACHED           = 1 << 0;
        const REAL_TIME          = 1 << 1;
        const IDLE               = 1 << 2;
        const FREE_STACK         = 1 << 3;
        const FREE_STRUCT        = 1 << 4;
        const STACK_BOUNDS_CHECK = 1 << 5;
    }
}

pub struct Thread {
    pub id: Tid,
    pub name: heapless::String<31>,
    /// Opaque to the scheduler: a real deployment's architecture-port
    /// trampoline is what actually calls through `entry(arg)`.
    pub entry: usize,
    pub arg: usize,
    pub priority: u8,
    pub state: ThreadState,
    pub remaining_quantum: i32,
    pub flags: ThreadFlags,
    pub context: CpuContext,
    pub exit_code: i32,
    pub join_queue: WaitQueueId,
    pub blocking_wait_queue: Option<WaitQueueId>,
    pub wait_block_code: i32,
    pub wake_reason: WakeReason,
    pub current_cpu: Option<usize>,
    pub pinned_cpu: Option<usize>,
}

impl Thread {
    pub fn is_real_time(&self) -> bool {
        self.flags.contains(ThreadFlags::REAL_TIME) && self.priority > DEFAULT_PRIORITY
    }
}

enum TimeoutSource {
    Sleep,
    WaitQueue(WaitQueueId),
}

struct PendingTimeout {
    deadline_us: u64,
    tid: Tid,
    source: TimeoutSource,
}

/// Everything the scheduler touches: the thread arena (an index-addressed
/// replacement for the original's intrusive list nodes), the wait-queue
/// arena, the run queue, per-CPU current-thread slots, and the sleep/
/// timeout list.
pub struct Scheduler {
    threads: BTreeMap<Tid, Thread>,
    wait_queues: BTreeMap<WaitQueueId, WaitQueue>,
    next_wait_queue_id: WaitQueueId,
    run_queue: RunQueue,
    current: [Option<Tid>; SMP_MAX_CPUS],
    idle: [Option<Tid>; SMP_MAX_CPUS],
    timeouts: Vec<PendingTimeout>,
    next_tid: Tid,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            threads: BTreeMap::new(),
            wait_queues: BTreeMap::new(),
            next_wait_queue_id: 1,
            run_queue: RunQueue::new(),
            current: [None; SMP_MAX_CPUS],
            idle: [None; SMP_MAX_CPUS],
            timeouts: Vec::new(),
            next_tid: 1,
        }
    }

    fn alloc_tid(&mut self) -> Tid {
        let tid = self.next_tid;
        self.next_tid += 1;
        tid
    }

    /// Allocate a fresh, empty wait queue and return its id. Used directly
    /// by `Mutex`/`Event`/`Semaphore` as well as for each thread's own
    /// join queue.
    pub fn new_wait_queue(&mut self) -> WaitQueueId {
        let id = self.next_wait_queue_id;
        self.next_wait_queue_id += 1;
        self.wait_queues.insert(id, WaitQueue::new());
        id
    }

    pub fn wait_queue_len(&self, id: WaitQueueId) -> usize {
        self.wait_queues.get(&id).map(|q| q.count()).unwrap_or(0)
    }

    /// Create a thread in the `Suspended` state. Does not make it runnable;
    /// call `resume` for that.
    pub fn create_thread(
        &mut self,
        name: &str,
        priority: u8,
        entry: usize,
        arg: usize,
        flags: ThreadFlags,
    ) -> Result<Tid> {
        if priority > crate::config::MAX_PRIORITY {
            return Err(KernelError::InvalidArgs.into());
        }
        let tid = self.alloc_tid();
        let join_queue = self.new_wait_queue();
        let mut heapless_name = heapless::String::new();
        let _ = heapless_name.push_str(name);
        let thread = Thread {
            id: tid,
            name: heapless_name,
            entry,
            arg,
            priority,
            state: ThreadState::Suspended,
            remaining_quantum: DEFAULT_QUANTUM_TICKS as i32,
            flags,
            context: CpuContext::default(),
            exit_code: 0,
            join_queue,
            blocking_wait_queue: None,
            wait_block_code: 0,
            wake_reason: WakeReason::Woken,
            current_cpu: None,
            pinned_cpu: None,
        };
        self.threads.insert(tid, thread);
        log::trace("sched", "thread created");
        Ok(tid)
    }

    /// Create and immediately mark runnable the per-CPU idle thread.
    pub fn create_idle_thread(&mut self, cpu: usize, entry: usize) -> Result<Tid> {
        let tid = self.create_thread(
            "idle",
            IDLE_PRIORITY,
            entry,
            0,
            ThreadFlags::IDLE | ThreadFlags::DETACHED,
        )?;
        if let Some(t) = self.threads.get_mut(&tid) {
            t.pinned_cpu = Some(cpu);
        }
        self.idle[cpu] = Some(tid);
        Ok(tid)
    }

    pub fn thread(&self, tid: Tid) -> Option<&Thread> {
        self.threads.get(&tid)
    }

    pub fn current(&self, cpu: usize) -> Option<Tid> {
        self.current[cpu]
    }

    /// Move a `Suspended` thread to `Ready` and enqueue it (tail — it joins
    /// the back of its priority bucket like any newly runnable thread).
    pub fn resume(&mut self, tid: Tid) -> Result<()> {
        let priority = {
            let t = self.threads.get_mut(&tid).ok_or(KernelError::NotFound)?;
            if t.state != ThreadState::Suspended {
                return Err(KernelError::BadState.into());
            }
            t.state = ThreadState::Ready;
            t.priority
        };
        self.run_queue.enqueue_tail(tid, priority);
        Ok(())
    }

    /// `pick_top`, honoring CPU pinning, falling back to the per-CPU idle
    /// thread when nothing else is runnable.
    fn pick_next(&mut self, cpu: usize) -> Tid {
        let picked = self
            .run_queue
            .pick_top(|tid| match self.threads.get(&tid) {
                Some(t) => t.pinned_cpu.is_none() || t.pinned_cpu == Some(cpu),
                None => false,
            });
        picked.unwrap_or_else(|| self.idle[cpu].expect("idle thread must exist"))
    }

    fn switch_to(&mut self, cpu: usize, next: Tid) {
        if let Some(prev) = self.current[cpu] {
            if let Some(t) = self.threads.get_mut(&prev) {
                t.current_cpu = None;
            }
        }
        self.current[cpu] = Some(next);
        if let Some(t) = self.threads.get_mut(&next) {
            t.state = ThreadState::Running;
            t.current_cpu = Some(cpu);
            t.remaining_quantum = DEFAULT_QUANTUM_TICKS as i32;
        }
        log::trace("sched", "context switch");
    }

    /// `yield()`: tail-insert current, pick, switch if different.
    pub fn yield_now(&mut self, cpu: usize) {
        if let Some(cur) = self.current[cpu] {
            let priority = self.threads[&cur].priority;
            if !self.threads[&cur].flags.contains(ThreadFlags::IDLE) {
                self.threads.get_mut(&cur).unwrap().state = ThreadState::Ready;
                self.run_queue.enqueue_tail(cur, priority);
            }
        }
        let next = self.pick_next(cpu);
        self.switch_to(cpu, next);
    }

    /// `preempt()`: head-insert current unless its quantum is already
    /// exhausted, in which case it goes to the back like a plain yield.
    pub fn preempt(&mut self, cpu: usize) {
        if let Some(cur) = self.current[cpu] {
            let (priority, quantum, is_idle) = {
                let t = &self.threads[&cur];
                (t.priority, t.remaining_quantum, t.flags.contains(ThreadFlags::IDLE))
            };
            if !is_idle {
                self.threads.get_mut(&cur).unwrap().state = ThreadState::Ready;
                if quantum > 0 {
                    self.run_queue.enqueue_head(cur, priority);
                } else {
                    self.run_queue.enqueue_tail(cur, priority);
                }
            }
        }
        let next = self.pick_next(cpu);
        self.switch_to(cpu, next);
    }

    /// `block()`: caller has already queued itself on `queue_id` and set
    /// state to `Blocked`; this just performs the scheduling point.
    fn block_current_on(&mut self, cpu: usize, queue_id: WaitQueueId, timeout_us: Option<u64>) {
        if let Some(cur) = self.current[cpu] {
            let t = self.threads.get_mut(&cur).unwrap();
            t.state = ThreadState::Blocked;
            t.blocking_wait_queue = Some(queue_id);
            if let Some(timeout) = timeout_us {
                self.timeouts.push(PendingTimeout {
                    deadline_us: crate::time::now_us() + timeout,
                    tid: cur,
                    source: TimeoutSource::WaitQueue(queue_id),
                });
                self.timeouts.sort_by_key(|e| e.deadline_us);
            }
        }
        let next = self.pick_next(cpu);
        self.switch_to(cpu, next);
    }

    /// `sleep(delay)`: install a one-shot wake, mark `Sleeping`, switch.
    pub fn sleep(&mut self, cpu: usize, delay_us: u64) {
        if let Some(cur) = self.current[cpu] {
            let t = self.threads.get_mut(&cur).unwrap();
            t.state = ThreadState::Sleeping;
            self.timeouts.push(PendingTimeout {
                deadline_us: crate::time::now_us() + delay_us,
                tid: cur,
                source: TimeoutSource::Sleep,
            });
            self.timeouts.sort_by_key(|e| e.deadline_us);
        }
        let next = self.pick_next(cpu);
        self.switch_to(cpu, next);
    }

    /// Fire every sleep/timeout entry whose deadline has passed, in
    /// deadline order, waking the owning thread. Mirrors the timer wheel's
    /// `process_expired` but lives here because waking needs full
    /// scheduler access (run queue + thread table + wait-queue arena),
    /// which a bare `TimerCallback` function pointer cannot close over.
    pub fn process_timeouts(&mut self, now: u64) {
        while let Some(entry) = self.timeouts.first() {
            if entry.deadline_us > now {
                break;
            }
            let entry = self.timeouts.remove(0);
            match entry.source {
                TimeoutSource::Sleep => {
                    if let Some(t) = self.threads.get_mut(&entry.tid) {
                        if t.state == ThreadState::Sleeping {
                            t.state = ThreadState::Ready;
                            let priority = t.priority;
                            self.run_queue.enqueue_head(entry.tid, priority);
                        }
                    }
                }
                TimeoutSource::WaitQueue(qid) => {
                    // No-op if the thread already left BLOCKED on this exact
                    // queue — e.g. a concurrent wake beat the timeout.
                    let still_blocked = self
                        .threads
                        .get(&entry.tid)
                        .map(|t| t.state == ThreadState::Blocked && t.blocking_wait_queue == Some(qid))
                        .unwrap_or(false);
                    if still_blocked {
                        if let Some(q) = self.wait_queues.get_mut(&qid) {
                            q.remove(entry.tid);
                        }
                        let t = self.threads.get_mut(&entry.tid).unwrap();
                        t.state = ThreadState::Ready;
                        t.blocking_wait_queue = None;
                        t.wait_block_code = 0;
                        t.wake_reason = WakeReason::TimedOut;
                        let priority = t.priority;
                        self.run_queue.enqueue_head(entry.tid, priority);
                    }
                }
            }
        }
    }

    /// Timer tick: decrement the running thread's quantum; the caller
    /// (architecture port interrupt epilogue) should invoke `preempt` if
    /// this returns `true` and the thread is not real-time/idle.
    pub fn timer_tick(&mut self, cpu: usize) -> bool {
        if let Some(cur) = self.current[cpu] {
            let t = self.threads.get_mut(&cur).unwrap();
            if t.is_real_time() || t.flags.contains(ThreadFlags::IDLE) {
                return false;
            }
            t.remaining_quantum -= 1;
            return t.remaining_quantum <= 0;
        }
        false
    }

    /// `exit(code)`: mark `Death`, wake every joiner, reap if detached.
    /// Never returns to the caller's thread — the scheduler switches away.
    pub fn exit_current(&mut self, cpu: usize, code: i32) {
        let cur = match self.current[cpu] {
            Some(c) => c,
            None => return,
        };
        let join_queue = self.threads.get(&cur).unwrap().join_queue;
        {
            let t = self.threads.get_mut(&cur).unwrap();
            t.state = ThreadState::Death;
            t.exit_code = code;
        }
        self.wait_queue_wake_all(join_queue, code);

        let detached = self.threads[&cur].flags.contains(ThreadFlags::DETACHED);
        if detached {
            self.wait_queues.remove(&join_queue);
            self.threads.remove(&cur);
        }
        self.current[cpu] = None;
        let next = self.pick_next(cpu);
        self.switch_to(cpu, next);
    }

    /// Block the caller on `target`'s join queue until it exits, or until
    /// `timeout_us` passes. If `target` has already exited this resolves
    /// immediately with its exit code; otherwise the caller blocks and must
    /// read the outcome later via `take_wait_result` once rescheduled (see
    /// `wait_queue::WaitOutcome` — `Woken(code)` carries the exit code,
    /// `TimedOut`/`Destroyed` map to `Errno::Timeout`/`ObjectDestroyed`).
    pub fn join(&mut self, cpu: usize, target: Tid, timeout_us: Option<u64>) -> Result<JoinResult> {
        let (already_dead, detached, exit_code, join_queue) = match self.threads.get(&target) {
            Some(t) => (t.state == ThreadState::Death, t.flags.contains(ThreadFlags::DETACHED), t.exit_code, t.join_queue),
            None => return Err(KernelError::NotFound.into()),
        };
        if detached {
            return Err(KernelError::ThreadDetached.into());
        }
        if already_dead {
            self.wait_queues.remove(&join_queue);
            self.threads.remove(&target);
            return Ok(JoinResult::Exited(exit_code));
        }
        self.wait_queue_block(cpu, join_queue, timeout_us)?;
        Ok(JoinResult::Blocked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinResult {
    Exited(i32),
    Blocked,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
