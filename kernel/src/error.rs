//! Crate-wide error taxonomy. `KernelError` is the semantic error a
//! subsystem raises; `Errno` is the POSIX-flavored numeric form every
//! public API ultimately returns.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    InvalidArgs,
    NotFound,
    AlreadyExists,
    AlreadyMounted,
    NoMemory,
    Io,
    Timeout,
    BadState,
    NotSupported,
    NotEnoughBuffer,
    ThreadDetached,
    ObjectDestroyed,
    Crc,
    /// An invariant the core itself is supposed to maintain was violated.
    Internal,
    WouldBlock,
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    EPERM = 1,
    ENOENT = 2,
    ESRCH = 3,
    EIO = 5,
    E2BIG = 7,
    EAGAIN = 11,
    ENOMEM = 12,
    EBUSY = 16,
    EEXIST = 17,
    EINVAL = 22,
    ENOSYS = 38,
    ETIMEDOUT = 110,
    ECANCELED = 125,
}

impl From<KernelError> for Errno {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::InvalidArgs => Errno::EINVAL,
            KernelError::NotFound => Errno::ENOENT,
            KernelError::AlreadyExists => Errno::EEXIST,
            KernelError::AlreadyMounted => Errno::EBUSY,
            KernelError::NoMemory => Errno::ENOMEM,
            KernelError::Io => Errno::EIO,
            KernelError::Timeout => Errno::ETIMEDOUT,
            KernelError::BadState => Errno::EINVAL,
            KernelError::NotSupported => Errno::ENOSYS,
            KernelError::NotEnoughBuffer => Errno::E2BIG,
            KernelError::ThreadDetached => Errno::ESRCH,
            KernelError::ObjectDestroyed => Errno::ECANCELED,
            KernelError::Crc => Errno::EIO,
            KernelError::Internal => Errno::EIO,
            KernelError::WouldBlock => Errno::EAGAIN,
        }
    }
}

impl Errno {
    pub fn as_isize(self) -> isize {
        -(self as i32 as isize)
    }

    pub fn description(self) -> &'static str {
        match self {
            Errno::EPERM => "operation not permitted",
            Errno::ENOENT => "no such file or device",
            Errno::ESRCH => "no such thread",
            Errno::EIO => "i/o error",
            Errno::E2BIG => "argument list too long",
            Errno::EAGAIN => "would block",
            Errno::ENOMEM => "out of memory",
            Errno::EBUSY => "resource busy",
            Errno::EEXIST => "already exists",
            Errno::EINVAL => "invalid argument",
            Errno::ENOSYS => "not supported",
            Errno::ETIMEDOUT => "timed out",
            Errno::ECANCELED => "canceled",
        }
    }
}

pub type Result<T> = core::result::Result<T, Errno>;

/// Convenience for sites that want to propagate a `KernelError` through a
/// function that returns `Result<T>` (i.e. `Result<T, Errno>`).
pub fn err<T>(e: KernelError) -> Result<T> {
    Err(Errno::from(e))
}
