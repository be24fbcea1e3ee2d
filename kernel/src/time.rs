//! L0: monotonic time source and the timer wheel. One-shot and periodic
//! callbacks fire from `process_expired`, which the architecture port's
//! interrupt epilogue calls whenever the local one-shot timer fires.
//!
//! The monotonic clock itself is an explicit atomic counter rather than a
//! cycle-counter read: the core is not allowed to assume a particular
//! hardware timer (boot/MMU/interrupt-controller specifics are out of
//! scope), and an explicit counter is what makes `tests/scenarios.rs` able
//! to drive deterministic time without a platform.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

static BOOT_TIMESTAMP_US: AtomicU64 = AtomicU64::new(0);

pub fn init_boot_timestamp() {
    BOOT_TIMESTAMP_US.store(0, Ordering::SeqCst);
}

/// Monotonic microseconds since `init_boot_timestamp`.
pub fn now_us() -> u64 {
    BOOT_TIMESTAMP_US.load(Ordering::SeqCst)
}

/// Advance the clock. Called by the platform's tick source; called
/// directly by tests that want deterministic time.
pub fn advance_us(delta_us: u64) {
    BOOT_TIMESTAMP_US.fetch_add(delta_us, Ordering::SeqCst);
}

pub fn uptime_ms() -> u64 {
    now_us() / 1000
}

pub type TimerId = u64;

/// Returns `true` if firing this timer should cause the interrupt
/// epilogue to invoke the scheduler's preemption path.
pub type TimerCallback = fn(TimerId, u64) -> bool;

struct TimerEntry {
    id: TimerId,
    deadline_us: u64,
    period_us: Option<u64>,
    callback: TimerCallback,
    cancelled: bool,
}

/// A sorted-by-deadline list of armed timers. `process_expired` is the only
/// place callbacks run; it is meant to be called from interrupt context
/// with the wheel's lock released around the callback invocation itself,
/// matching the requirement that timer callbacks be wait-free against code
/// they may preempt.
pub struct TimerWheel {
    entries: Mutex<Vec<TimerEntry>>,
    next_id: AtomicU64,
}

impl TimerWheel {
    pub const fn new() -> Self {
        TimerWheel {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn insert_sorted(list: &mut Vec<TimerEntry>, entry: TimerEntry) {
        let pos = list
            .iter()
            .position(|e| e.deadline_us > entry.deadline_us)
            .unwrap_or(list.len());
        list.insert(pos, entry);
    }

    /// Arm a one-shot timer at `deadline_us`.
    pub fn arm_oneshot(&self, deadline_us: u64, callback: TimerCallback) -> TimerId {
        self.arm(deadline_us, None, callback)
    }

    /// Arm a periodic timer whose first firing is at `deadline_us` and which
    /// re-arms at `previous_deadline + period_us` on every subsequent firing,
    /// so drift never accumulates against the clock.
    pub fn arm_periodic(&self, deadline_us: u64, period_us: u64, callback: TimerCallback) -> TimerId {
        self.arm(deadline_us, Some(period_us), callback)
    }

    fn arm(&self, deadline_us: u64, period_us: Option<u64>, callback: TimerCallback) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut list = self.entries.lock();
        Self::insert_sorted(
            &mut list,
            TimerEntry {
                id,
                deadline_us,
                period_us,
                callback,
                cancelled: false,
            },
        );
        id
    }

    /// Cancel a timer. Returns `true` if the cancellation beat the firing
    /// (the caller's effect will not run), `false` if the timer had already
    /// fired or did not exist.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut list = self.entries.lock();
        if let Some(pos) = list.iter().position(|e| e.id == id && !e.cancelled) {
            list.remove(pos);
            return true;
        }
        false
    }

    /// Fire every timer whose deadline has passed, in deadline order.
    /// Returns `true` if any fired callback asked for a reschedule.
    pub fn process_expired(&self, now: u64) -> bool {
        let mut reschedule = false;
        loop {
            let due = {
                let mut list = self.entries.lock();
                match list.first() {
                    Some(e) if e.deadline_us <= now => Some(list.remove(0)),
                    _ => None,
                }
            };
            let entry = match due {
                Some(e) => e,
                None => break,
            };
            if (entry.callback)(entry.id, now) {
                reschedule = true;
            }
            if let Some(period) = entry.period_us {
                let mut list = self.entries.lock();
                Self::insert_sorted(
                    &mut list,
                    TimerEntry {
                        id: entry.id,
                        deadline_us: entry.deadline_us + period,
                        period_us: Some(period),
                        callback: entry.callback,
                        cancelled: false,
                    },
                );
            }
        }
        reschedule
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;

    static HITS: AtomicU32 = AtomicU32::new(0);
    fn bump(_id: TimerId, _now: u64) -> bool {
        HITS.fetch_add(1, Ordering::SeqCst);
        false
    }

    #[test]
    fn fires_in_deadline_order() {
        static ORDER: Mutex<Vec<u64>> = Mutex::new(Vec::new());
        fn record(id: TimerId, _now: u64) -> bool {
            ORDER.lock().push(id);
            false
        }

        let wheel = TimerWheel::new();
        let a = wheel.arm_oneshot(30, record);
        let b = wheel.arm_oneshot(10, record);
        let c = wheel.arm_oneshot(20, record);
        wheel.process_expired(100);

        let order = ORDER.lock();
        assert_eq!(*order, [b, c, a]);
    }

    #[test]
    fn periodic_rearms_against_previous_deadline_not_now() {
        let wheel = TimerWheel::new();
        wheel.arm_periodic(10, 10, bump);
        HITS.store(0, Ordering::SeqCst);

        // Firing late (now=55) should still schedule the next deadline at
        // 10+10=20, 20+10=30, ... not 55+10, so all of 10/20/30/40/50 fire.
        wheel.process_expired(55);
        assert_eq!(HITS.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn cancel_beats_unfired_timer() {
        let wheel = TimerWheel::new();
        let id = wheel.arm_oneshot(1000, bump);
        assert!(wheel.cancel(id));
        assert_eq!(wheel.len(), 0);
        assert!(!wheel.cancel(id));
    }
}
