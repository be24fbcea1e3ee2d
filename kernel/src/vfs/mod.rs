//! L3: virtual filesystem layer. A thin, path-dispatching front end over
//! whatever concrete filesystems are mounted; all filesystem-specific
//! behavior (flat vs. hierarchical namespaces, durability, caching) lives
//! behind the `FileSystem` trait object each mount point holds.

pub mod mount;

pub use mount::Vfs;

use crate::error::Result;
use alloc::string::String;

pub type Cookie = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size: u64,
    pub capacity: u64,
    pub file_type: FileType,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

/// The capability set one mounted filesystem instance exposes, per §6's
/// VFS file protocol (`mount`/`unmount` live one level up, on `Vfs` itself,
/// since they are about the mount table rather than any one filesystem).
/// `mkdir`/`opendir`/`readdir`/`closedir` default to `NotSupported` so a
/// flat filesystem like SPIFS only needs to implement the file operations.
pub trait FileSystem: Send + Sync {
    fn open(&self, path: &str) -> Result<Cookie>;
    fn create(&self, path: &str, len: u64) -> Result<Cookie>;
    fn remove(&self, path: &str) -> Result<()>;
    fn read(&self, cookie: Cookie, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn write(&self, cookie: Cookie, offset: u64, buf: &[u8]) -> Result<usize>;
    fn stat(&self, cookie: Cookie) -> Result<Stat>;
    fn truncate(&self, cookie: Cookie, len: u64) -> Result<()>;
    fn close(&self, cookie: Cookie) -> Result<()>;

    fn mkdir(&self, path: &str) -> Result<()> {
        let _ = path;
        crate::error::err(crate::error::KernelError::NotSupported)
    }
    fn opendir(&self, path: &str) -> Result<Cookie> {
        let _ = path;
        crate::error::err(crate::error::KernelError::NotSupported)
    }
    fn readdir(&self, cookie: Cookie) -> Result<Option<DirEntry>> {
        let _ = cookie;
        crate::error::err(crate::error::KernelError::NotSupported)
    }
    fn closedir(&self, cookie: Cookie) -> Result<()> {
        let _ = cookie;
        crate::error::err(crate::error::KernelError::NotSupported)
    }
}
