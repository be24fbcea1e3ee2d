//! SMP glue: the single global `Scheduler` instance, per-CPU idle thread
//! bring-up, and the cross-CPU "reschedule IPI" wrapper. A real multi-core
//! boot pins one idle thread per core as each one comes up; `MockArch`
//! reports a single CPU, so host tests only ever see `cpu == 0`, but the
//! bookkeeping here does not assume that.

use super::{Scheduler, Tid};
use lazy_static::lazy_static;
use spin::Mutex;

lazy_static! {
    static ref SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());
}

/// Bring up one idle thread per CPU the architecture port reports, and
/// arm the periodic preemption timer policy described in §4.1.
pub fn init() {
    let num_cpus = crate::arch::port().num_cpus();
    let mut sched = SCHEDULER.lock();
    for cpu in 0..num_cpus {
        let _ = sched.create_idle_thread(cpu, 0);
    }
    crate::log::info("sched", "scheduler brought up");
}

/// Run `f` with exclusive access to the global scheduler. Stands in for
/// the "acquire the global thread lock, interrupts disabled" discipline
/// the original enforces around every run-queue/wait-queue mutation.
pub fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let guard = crate::arch::port().disable_interrupts();
    let mut sched = SCHEDULER.lock();
    let result = f(&mut sched);
    drop(sched);
    crate::arch::port().restore_interrupts(guard);
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuStats {
    pub current: Option<Tid>,
    pub is_idle: bool,
}

/// Snapshot of what a CPU is doing right now, for the ambient observability
/// the teacher's own scheduler exposes (dashboards, `/proc`-style status).
pub fn cpu_stats(sched: &Scheduler, cpu: usize) -> CpuStats {
    let current = sched.current(cpu);
    let is_idle = current
        .and_then(|tid| sched.thread(tid))
        .map(|t| t.flags.contains(super::ThreadFlags::IDLE))
        .unwrap_or(true);
    CpuStats { current, is_idle }
}

/// Ask `target_cpu` to reconsider its scheduling decision, e.g. because a
/// higher-priority thread just became runnable while it was running
/// something lower-priority, or a wake made its in-progress choice
/// suboptimal. A no-op on `MockArch`'s single-CPU model.
pub fn reschedule_ipi(target_cpu: usize) {
    crate::arch::port().send_reschedule_ipi(target_cpu);
}
