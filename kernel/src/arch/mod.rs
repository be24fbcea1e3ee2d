//! Architecture port: the boundary the core never crosses itself. Context
//! switch, interrupt masking, per-CPU current-thread access and cache
//! maintenance are all provided by whichever platform embeds this crate;
//! boot, MMU page-table formats and interrupt-controller glue are out of
//! scope (see the crate's top-level design notes) and are not modeled here
//! at all.

use crate::log::LogLevel;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Saved register state for one thread. Opaque to everything above the
/// architecture port; `sched` only ever copies it wholesale.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct CpuContext {
    pub regs: [u64; 16],
    pub pc: u64,
    pub sp: u64,
}

/// Hooks the scheduler needs from the platform. A real platform provides
/// one implementation per architecture; tests use `MockArch`.
pub trait ArchPort: Send + Sync {
    /// Index of the CPU executing the call, in `[0, num_cpus())`.
    fn current_cpu(&self) -> usize;
    fn num_cpus(&self) -> usize;
    /// Disable local interrupts, returning whether they were enabled before.
    fn disable_interrupts(&self) -> bool;
    /// Restore local interrupts to the state `disable_interrupts` returned.
    fn restore_interrupts(&self, was_enabled: bool);
    /// Switch execution from `from` to `to`. Returns once `from` is resumed.
    fn context_switch(&self, from: &mut CpuContext, to: &CpuContext);
    /// Arm the local one-shot timer to fire at `deadline_us` (boot-relative).
    fn arm_oneshot_timer(&self, deadline_us: u64);
    fn cancel_oneshot_timer(&self);
    /// Raise a reschedule IPI targeting `cpu`.
    fn send_reschedule_ipi(&self, cpu: usize);
}

/// Single-CPU, no-op architecture port used by host unit tests and by
/// `tests/scenarios.rs`. Interrupt masking and context switches are
/// bookkeeping only; there is no real concurrent hardware to drive.
pub struct MockArch;

impl ArchPort for MockArch {
    fn current_cpu(&self) -> usize {
        0
    }
    fn num_cpus(&self) -> usize {
        1
    }
    fn disable_interrupts(&self) -> bool {
        true
    }
    fn restore_interrupts(&self, _was_enabled: bool) {}
    fn context_switch(&self, _from: &mut CpuContext, _to: &CpuContext) {}
    fn arm_oneshot_timer(&self, _deadline_us: u64) {}
    fn cancel_oneshot_timer(&self) {}
    fn send_reschedule_ipi(&self, _cpu: usize) {}
}

static ARCH: MockArch = MockArch;

/// The platform's architecture port. Single global since exactly one
/// platform embeds this crate at a time; tests use the mock above.
pub fn port() -> &'static dyn ArchPort {
    &ARCH
}

type SinkFn = fn(LogLevel, &str, &str);

fn default_sink(_level: LogLevel, _module: &str, _message: &str) {}

static LOG_SINK: AtomicPtr<()> = AtomicPtr::new(default_sink as *mut ());

/// Install the platform's log sink (e.g. a UART writer). Tests may install
/// one that appends to a buffer for assertions.
pub fn set_log_sink(sink: SinkFn) {
    LOG_SINK.store(sink as *mut (), Ordering::Relaxed);
}

pub(crate) fn log_sink(level: LogLevel, module: &str, message: &str) {
    let ptr = LOG_SINK.load(Ordering::Relaxed);
    let f: SinkFn = unsafe { core::mem::transmute(ptr) };
    f(level, module, message);
}

#[cfg(target_arch = "x86_64")]
pub mod x86_64 {
    //! Register-level UART sink used by the `corekernel` binary target.
    //! Not exercised by host tests; `spin::Mutex` guards the single COM1
    //! writer the way the teacher guards its serial port.
    use spin::Mutex;
    use uart_16550::SerialPort;

    static COM1: Mutex<Option<SerialPort>> = Mutex::new(None);

    /// # Safety
    /// Must be called once, early, before any logging happens, on real
    /// x86_64 hardware or a compatible emulator exposing COM1 at 0x3F8.
    pub unsafe fn init_serial() {
        let mut port = SerialPort::new(0x3F8);
        port.init();
        *COM1.lock() = Some(port);
    }

    pub fn serial_sink(_level: crate::log::LogLevel, module: &str, message: &str) {
        use core::fmt::Write;
        if let Some(port) = COM1.lock().as_mut() {
            let _ = write!(port, "{}: {}\n", module, message);
        }
    }
}
