//! Level-filtered logging over a pluggable sink. Low-level layers log at
//! `debug!`/`trace!` only; a policy boundary (VFS dispatch, the 9P RPC
//! entry point, the AHCI command dispatcher) logs `warn!`/`error!` when it
//! turns an internal error into a caller-visible one.

use core::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn get_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        3 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

#[inline]
pub fn is_enabled(level: LogLevel) -> bool {
    level <= get_level()
}

/// Emit a line through the architecture port's log sink. On hosts without a
/// wired sink (unit tests) this is a no-op rather than a panic.
pub fn log(level: LogLevel, module: &str, message: &str) {
    if !is_enabled(level) {
        return;
    }
    crate::arch::log_sink(level, module, message);
}

#[inline]
pub fn error(module: &str, message: &str) {
    log(LogLevel::Error, module, message);
}

#[inline]
pub fn warn(module: &str, message: &str) {
    log(LogLevel::Warn, module, message);
}

#[inline]
pub fn info(module: &str, message: &str) {
    log(LogLevel::Info, module, message);
}

#[inline]
pub fn debug(module: &str, message: &str) {
    log(LogLevel::Debug, module, message);
}

#[inline]
pub fn trace(module: &str, message: &str) {
    log(LogLevel::Trace, module, message);
}
