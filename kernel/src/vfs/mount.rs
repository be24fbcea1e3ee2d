//! Mount table and path dispatch. `Vfs::open`/`create`/... resolve a path
//! to its longest-matching mount point, delegate to that filesystem, and
//! remember the mapping from the cookie handed back to the caller to
//! (filesystem, filesystem-local cookie) so later calls on that cookie
//! dispatch to the right place without the caller repeating the path.

use super::{Cookie, DirEntry, FileSystem, Stat};
use crate::error::{err, KernelError, Result};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;

pub struct Vfs {
    mounts: BTreeMap<String, Arc<dyn FileSystem>>,
    open_files: BTreeMap<Cookie, (Arc<dyn FileSystem>, Cookie)>,
    open_dirs: BTreeMap<Cookie, (Arc<dyn FileSystem>, Cookie)>,
    next_cookie: Cookie,
}

impl Vfs {
    pub fn new() -> Self {
        Vfs {
            mounts: BTreeMap::new(),
            open_files: BTreeMap::new(),
            open_dirs: BTreeMap::new(),
            next_cookie: 1,
        }
    }

    fn alloc_cookie(&mut self) -> Cookie {
        let c = self.next_cookie;
        self.next_cookie += 1;
        c
    }

    pub fn mount(&mut self, mount_point: &str, fs: Arc<dyn FileSystem>) -> Result<()> {
        if !mount_point.starts_with('/') {
            return err(KernelError::InvalidArgs);
        }
        if self.mounts.contains_key(mount_point) {
            return err(KernelError::AlreadyMounted);
        }
        self.mounts.insert(mount_point.to_string(), fs);
        Ok(())
    }

    pub fn unmount(&mut self, mount_point: &str) -> Result<()> {
        if self.mounts.remove(mount_point).is_none() {
            return err(KernelError::NotFound);
        }
        Ok(())
    }

    /// Longest mount-point match covering `path`, and the remainder path
    /// relative to that mount point (with leading `/` kept so nested
    /// filesystems still see an absolute-looking path; SPIFS itself
    /// rejects any embedded `/` as `NotSupported`, per §4.5).
    fn resolve(&self, path: &str) -> Result<(Arc<dyn FileSystem>, String)> {
        if !path.starts_with('/') {
            return err(KernelError::InvalidArgs);
        }
        let mut best: Option<&str> = None;
        for mp in self.mounts.keys() {
            let matches = mp == "/" || path == mp.as_str() || {
                let mut prefix = mp.clone();
                prefix.push('/');
                path.starts_with(prefix.as_str())
            };
            if matches && best.map_or(true, |b| mp.len() > b.len()) {
                best = Some(mp.as_str());
            }
        }
        let mp = best.ok_or(crate::error::Errno::from(KernelError::NotFound))?;
        let fs = self.mounts.get(mp).expect("resolved mount point must exist").clone();
        let remainder = if mp == "/" {
            path.to_string()
        } else {
            let stripped = &path[mp.len()..];
            if stripped.is_empty() {
                "/".to_string()
            } else {
                stripped.to_string()
            }
        };
        Ok((fs, remainder))
    }

    pub fn open(&mut self, path: &str) -> Result<Cookie> {
        let (fs, rel) = self.resolve(path)?;
        let local = fs.open(&rel)?;
        let cookie = self.alloc_cookie();
        self.open_files.insert(cookie, (fs, local));
        Ok(cookie)
    }

    pub fn create(&mut self, path: &str, len: u64) -> Result<Cookie> {
        let (fs, rel) = self.resolve(path)?;
        let local = fs.create(&rel, len)?;
        let cookie = self.alloc_cookie();
        self.open_files.insert(cookie, (fs, local));
        Ok(cookie)
    }

    pub fn remove(&mut self, path: &str) -> Result<()> {
        let (fs, rel) = self.resolve(path)?;
        fs.remove(&rel)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (fs, rel) = self.resolve(path)?;
        fs.mkdir(&rel)
    }

    fn file(&self, cookie: Cookie) -> Result<&(Arc<dyn FileSystem>, Cookie)> {
        self.open_files.get(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))
    }

    pub fn read(&self, cookie: Cookie, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let (fs, local) = self.file(cookie)?;
        fs.read(*local, offset, buf)
    }

    pub fn write(&self, cookie: Cookie, offset: u64, buf: &[u8]) -> Result<usize> {
        let (fs, local) = self.file(cookie)?;
        fs.write(*local, offset, buf)
    }

    pub fn stat(&self, cookie: Cookie) -> Result<Stat> {
        let (fs, local) = self.file(cookie)?;
        fs.stat(*local)
    }

    pub fn truncate(&self, cookie: Cookie, len: u64) -> Result<()> {
        let (fs, local) = self.file(cookie)?;
        fs.truncate(*local, len)
    }

    pub fn close(&mut self, cookie: Cookie) -> Result<()> {
        let (fs, local) = self.open_files.remove(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?;
        fs.close(local)
    }

    pub fn opendir(&mut self, path: &str) -> Result<Cookie> {
        let (fs, rel) = self.resolve(path)?;
        let local = fs.opendir(&rel)?;
        let cookie = self.alloc_cookie();
        self.open_dirs.insert(cookie, (fs, local));
        Ok(cookie)
    }

    pub fn readdir(&self, cookie: Cookie) -> Result<Option<DirEntry>> {
        let (fs, local) = self.open_dirs.get(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?;
        fs.readdir(*local)
    }

    pub fn closedir(&mut self, cookie: Cookie) -> Result<()> {
        let (fs, local) = self.open_dirs.remove(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?;
        fs.closedir(local)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::FileType;
    use alloc::vec;
    use spin::Mutex;

    /// Minimal in-memory filesystem for exercising mount dispatch without
    /// depending on SPIFS.
    struct MemFs {
        files: Mutex<BTreeMap<String, alloc::vec::Vec<u8>>>,
    }

    impl MemFs {
        fn new() -> Self {
            MemFs { files: Mutex::new(BTreeMap::new()) }
        }
    }

    impl FileSystem for MemFs {
        fn open(&self, path: &str) -> Result<Cookie> {
            if self.files.lock().contains_key(path) {
                Ok(1)
            } else {
                err(KernelError::NotFound)
            }
        }
        fn create(&self, path: &str, len: u64) -> Result<Cookie> {
            self.files.lock().insert(path.to_string(), vec![0u8; len as usize]);
            Ok(1)
        }
        fn remove(&self, path: &str) -> Result<()> {
            self.files.lock().remove(path).map(|_| ()).ok_or(crate::error::Errno::from(KernelError::NotFound))
        }
        fn read(&self, _cookie: Cookie, offset: u64, buf: &mut [u8]) -> Result<usize> {
            let files = self.files.lock();
            let data = files.values().next().ok_or(crate::error::Errno::from(KernelError::NotFound))?;
            let start = offset as usize;
            let n = buf.len().min(data.len().saturating_sub(start));
            buf[..n].copy_from_slice(&data[start..start + n]);
            Ok(n)
        }
        fn write(&self, _cookie: Cookie, offset: u64, buf: &[u8]) -> Result<usize> {
            let mut files = self.files.lock();
            let data = files.values_mut().next().ok_or(crate::error::Errno::from(KernelError::NotFound))?;
            let start = offset as usize;
            if start + buf.len() > data.len() {
                data.resize(start + buf.len(), 0);
            }
            data[start..start + buf.len()].copy_from_slice(buf);
            Ok(buf.len())
        }
        fn stat(&self, _cookie: Cookie) -> Result<Stat> {
            let files = self.files.lock();
            let data = files.values().next().ok_or(crate::error::Errno::from(KernelError::NotFound))?;
            Ok(Stat { size: data.len() as u64, capacity: data.len() as u64, file_type: FileType::File })
        }
        fn truncate(&self, _cookie: Cookie, len: u64) -> Result<()> {
            let mut files = self.files.lock();
            let data = files.values_mut().next().ok_or(crate::error::Errno::from(KernelError::NotFound))?;
            data.truncate(len as usize);
            Ok(())
        }
        fn close(&self, _cookie: Cookie) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn mount_then_open_dispatches_to_correct_filesystem() {
        let mut vfs = Vfs::new();
        vfs.mount("/flash", Arc::new(MemFs::new())).unwrap();
        let c = vfs.create("/flash/a", 8).unwrap();
        vfs.write(c, 0, b"hello").unwrap();
        let mut buf = [0u8; 5];
        vfs.read(c, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn double_mount_at_same_point_is_rejected() {
        let mut vfs = Vfs::new();
        vfs.mount("/flash", Arc::new(MemFs::new())).unwrap();
        assert!(vfs.mount("/flash", Arc::new(MemFs::new())).is_err());
    }

    #[test]
    fn unmatched_path_returns_not_found() {
        let mut vfs = Vfs::new();
        vfs.mount("/flash", Arc::new(MemFs::new())).unwrap();
        assert!(vfs.open("/other/a").is_err());
    }

    #[test]
    fn longest_mount_point_wins() {
        let mut vfs = Vfs::new();
        vfs.mount("/", Arc::new(MemFs::new())).unwrap();
        vfs.mount("/flash", Arc::new(MemFs::new())).unwrap();
        let c = vfs.create("/flash/a", 4).unwrap();
        // Written through the more specific mount, not the root one.
        vfs.write(c, 0, b"ab").unwrap();
        let mut buf = [0u8; 2];
        vfs.read(c, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"ab");
    }
}
