//! SPIFS: a flat, log-structured filesystem for raw NOR flash with
//! power-fail-safe commits via a dual table-of-contents, per §4.5/§6.
//! Grounded on `examples/original_source/lib/fs/spifs/spifs.c` for the
//! on-disk layout and commit ordering; everything else (VFS glue, error
//! taxonomy) follows this crate's own conventions.

use crate::block::BlockDevice;
use crate::config::{SPIFS_ENTRY_SIZE, SPIFS_ERASED_SENTINEL, SPIFS_MAGIC, SPIFS_MAX_FILENAME_LEN, SPIFS_VERSION};
use crate::error::{err, KernelError, Result};
use crate::fs::crc32::crc32;
use crate::vfs::{Cookie, FileSystem, FileType, Stat};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

const HEADER_SIZE: usize = 32;
const FOOTER_SIZE: usize = 32;

const FRONT_TOC_NAME: &str = "front-toc";
const BACK_TOC_NAME: &str = "back-toc";

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileEntry {
    page_index: u32,
    length: u32,
    capacity: u32,
    name: String,
}

impl FileEntry {
    fn pages(&self, page_size: u64) -> u32 {
        (self.capacity as u64).div_ceil(page_size) as u32
    }

    fn encode(&self, out: &mut [u8; SPIFS_ENTRY_SIZE]) {
        out[0..4].copy_from_slice(&self.page_index.to_le_bytes());
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8..12].copy_from_slice(&self.capacity.to_le_bytes());
        let name_bytes = self.name.as_bytes();
        let n = name_bytes.len().min(SPIFS_MAX_FILENAME_LEN);
        out[12..12 + n].copy_from_slice(&name_bytes[..n]);
        for b in &mut out[12 + n..32] {
            *b = 0;
        }
    }

    fn decode(buf: &[u8; SPIFS_ENTRY_SIZE]) -> Result<Self> {
        let page_index = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let capacity = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let name_region = &buf[12..32];
        let end = name_region.iter().position(|&b| b == 0).unwrap_or(name_region.len());
        let name = core::str::from_utf8(&name_region[..end]).map_err(|_| crate::error::Errno::from(KernelError::Io))?;
        Ok(FileEntry { page_index, length, capacity, name: name.to_string() })
    }
}

struct TocHeader {
    generation: u32,
    total_length: u32,
    crc32: u32,
}

impl TocHeader {
    fn encode(&self, zero_crc: bool) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&SPIFS_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&(if zero_crc { 0 } else { self.crc32 }).to_le_bytes());
        out[8..12].copy_from_slice(&self.generation.to_le_bytes());
        out[12..16].copy_from_slice(&self.total_length.to_le_bytes());
        out[16..20].copy_from_slice(&SPIFS_VERSION.to_le_bytes());
        out
    }

    fn decode(buf: &[u8; HEADER_SIZE]) -> Option<Self> {
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != SPIFS_MAGIC {
            return None;
        }
        let crc32 = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let generation = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let total_length = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        Some(TocHeader { generation, total_length, crc32 })
    }
}

fn encode_footer(crc: u32, zero_crc: bool) -> [u8; FOOTER_SIZE] {
    let mut out = [0u8; FOOTER_SIZE];
    out[28..32].copy_from_slice(&(if zero_crc { 0 } else { crc }).to_le_bytes());
    out
}

fn decode_footer_crc(buf: &[u8; FOOTER_SIZE]) -> u32 {
    u32::from_le_bytes(buf[28..32].try_into().unwrap())
}

struct SpifsState {
    entries: Vec<FileEntry>,
    generation: u32,
    /// `true` once the page-0 ToC ("front") is the live one.
    live_is_front: bool,
    handles: BTreeMap<Cookie, String>,
    next_cookie: Cookie,
}

/// A mounted SPIFS instance. One mutex guards the whole in-memory file
/// list and handle table, matching §5's "one mutex each, all public
/// operations acquire it" for SPIFS.
pub struct Spifs {
    device: Arc<dyn BlockDevice>,
    page_size: u64,
    num_pages: u32,
    state: Mutex<SpifsState>,
}

fn page_size_of(device: &dyn BlockDevice) -> u64 {
    device
        .erase_geometry()
        .first()
        .map(|r| r.unit_size)
        .unwrap_or(device.block_size() as u64)
}

impl Spifs {
    fn page_offset(&self, page_index: u32) -> u64 {
        page_index as u64 * self.page_size
    }

    fn back_toc_page(&self) -> u32 {
        self.num_pages - 1
    }

    fn read_candidate_toc(&self, page_index: u32) -> Result<Option<(u32, Vec<FileEntry>)>> {
        let mut header_buf = [0u8; HEADER_SIZE];
        self.device.read(self.page_offset(page_index), &mut header_buf)?;
        let header = match TocHeader::decode(&header_buf) {
            Some(h) => h,
            None => return Ok(None),
        };
        if header.total_length as usize % SPIFS_ENTRY_SIZE != 0 {
            return Ok(None);
        }
        let n_entries = header.total_length as usize / SPIFS_ENTRY_SIZE;
        let entries_bytes_len = n_entries * SPIFS_ENTRY_SIZE;
        if (HEADER_SIZE + entries_bytes_len + FOOTER_SIZE) as u64 > self.page_size {
            return Ok(None);
        }
        let mut entries_bytes = vec![0u8; entries_bytes_len];
        self.device.read(self.page_offset(page_index) + HEADER_SIZE as u64, &mut entries_bytes)?;
        let mut footer_buf = [0u8; FOOTER_SIZE];
        self.device
            .read(self.page_offset(page_index) + HEADER_SIZE as u64 + entries_bytes_len as u64, &mut footer_buf)?;

        let mut combined = Vec::with_capacity(HEADER_SIZE + entries_bytes_len + FOOTER_SIZE);
        combined.extend_from_slice(&header.encode(true));
        combined.extend_from_slice(&entries_bytes);
        combined.extend_from_slice(&encode_footer(0, true));
        let computed = crc32(&combined);
        let footer_crc = decode_footer_crc(&footer_buf);
        if computed != header.crc32 || computed != footer_crc {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(n_entries);
        for chunk in entries_bytes.chunks_exact(SPIFS_ENTRY_SIZE) {
            let arr: [u8; SPIFS_ENTRY_SIZE] = chunk.try_into().unwrap();
            entries.push(FileEntry::decode(&arr)?);
        }
        entries.sort_by_key(|e| e.page_index);
        Ok(Some((header.generation, entries)))
    }

    /// Mount an existing SPIFS image. Fails with `Crc` if neither ToC page
    /// validates.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let page_size = page_size_of(device.as_ref());
        let num_pages = (device.total_size() / page_size) as u32;
        let fs = Spifs {
            device,
            page_size,
            num_pages,
            state: Mutex::new(SpifsState {
                entries: Vec::new(),
                generation: 0,
                live_is_front: true,
                handles: BTreeMap::new(),
                next_cookie: 1,
            }),
        };

        let front = fs.read_candidate_toc(0)?;
        let back = fs.read_candidate_toc(fs.back_toc_page())?;
        let (generation, live_is_front, entries) = match (front, back) {
            (None, None) => return err(KernelError::Crc),
            (Some((g, e)), None) => (g, true, e),
            (None, Some((g, e))) => (g, false, e),
            (Some((ga, ea)), Some((gb, eb))) => {
                if ga >= gb {
                    (ga, true, ea)
                } else {
                    (gb, false, eb)
                }
            }
        };

        let mut state = fs.state.lock();
        state.entries = entries;
        state.generation = generation;
        state.live_is_front = live_is_front;
        drop(state);
        Ok(fs)
    }

    /// Initialize a blank device as a fresh SPIFS image: reserved front/
    /// back ToC entries only, generation 1 committed to the front page.
    pub fn format(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let page_size = page_size_of(device.as_ref());
        let num_pages = (device.total_size() / page_size) as u32;
        let back_page = num_pages - 1;
        let entries = vec![
            FileEntry { page_index: 0, length: page_size as u32, capacity: page_size as u32, name: FRONT_TOC_NAME.to_string() },
            FileEntry { page_index: back_page, length: page_size as u32, capacity: page_size as u32, name: BACK_TOC_NAME.to_string() },
        ];
        let fs = Spifs {
            device,
            page_size,
            num_pages,
            state: Mutex::new(SpifsState {
                entries,
                generation: 0,
                // So the first commit targets the front page (page 0).
                live_is_front: false,
                handles: BTreeMap::new(),
                next_cookie: 1,
            }),
        };
        let mut state = fs.state.lock();
        fs.commit_locked(&mut state)?;
        drop(state);
        Ok(fs)
    }

    fn commit_locked(&self, state: &mut SpifsState) -> Result<()> {
        let target_page = if state.live_is_front { self.back_toc_page() } else { 0 };
        let new_generation = state.generation.wrapping_add(1);

        state.entries.sort_by_key(|e| e.page_index);
        let mut entries_bytes = Vec::with_capacity(state.entries.len() * SPIFS_ENTRY_SIZE);
        for entry in &state.entries {
            let mut buf = [0u8; SPIFS_ENTRY_SIZE];
            entry.encode(&mut buf);
            entries_bytes.extend_from_slice(&buf);
        }
        let total_length = entries_bytes.len() as u32;

        let mut header = TocHeader { generation: new_generation, total_length, crc32: 0 };
        let mut combined = Vec::with_capacity(HEADER_SIZE + entries_bytes.len() + FOOTER_SIZE);
        combined.extend_from_slice(&header.encode(true));
        combined.extend_from_slice(&entries_bytes);
        combined.extend_from_slice(&encode_footer(0, true));
        let crc = crc32(&combined);
        header.crc32 = crc;

        self.device.erase(self.page_offset(target_page), self.page_size)?;
        self.device.write(self.page_offset(target_page), &header.encode(false))?;
        self.device.write(self.page_offset(target_page) + HEADER_SIZE as u64, &entries_bytes)?;
        self.device
            .write(self.page_offset(target_page) + HEADER_SIZE as u64 + entries_bytes.len() as u64, &encode_footer(crc, false))?;

        state.generation = new_generation;
        state.live_is_front = !state.live_is_front;
        Ok(())
    }

    fn is_reserved_name(name: &str) -> bool {
        name == FRONT_TOC_NAME || name == BACK_TOC_NAME
    }

    fn find_open_run(entries: &[FileEntry], page_size: u64, pages_needed: u32) -> Option<u32> {
        for pair in entries.windows(2) {
            let prev_end = pair[0].page_index + pair[0].pages(page_size);
            let gap = pair[1].page_index - prev_end;
            if gap >= pages_needed {
                return Some(prev_end);
            }
        }
        None
    }

    fn erase_pages(&self, page_index: u32, pages: u32) -> Result<()> {
        self.device.erase(self.page_offset(page_index), pages as u64 * self.page_size)?;
        let mut sentinel = [0u8; 4];
        sentinel.copy_from_slice(&SPIFS_ERASED_SENTINEL);
        self.device.write(self.page_offset(page_index), &sentinel)
    }

    /// Shrink reclaim: erase pages between the last real file and the back
    /// ToC that are not backing any file, then re-commit so the reclaimed
    /// space is implicitly available to the next `find_open_run` (it
    /// already was, via the gap; this just returns the pages to an erased
    /// state ahead of time instead of lazily on next `create`).
    /// Test-only: the on-disk start page backing `path`'s handle, so
    /// cross-module scenario tests can check gap reuse without reaching
    /// into `state` directly.
    #[cfg(test)]
    pub(crate) fn debug_start_page(&self, cookie: Cookie) -> Option<u32> {
        let state = self.state.lock();
        let name = state.handles.get(&cookie)?;
        state.entries.iter().find(|e| &e.name == name).map(|e| e.page_index)
    }

    pub fn trim(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.entries.sort_by_key(|e| e.page_index);
        if let Some(last_before_back) = state.entries.iter().rev().nth(1) {
            let gap_start = last_before_back.page_index + last_before_back.pages(self.page_size);
            let back_page = self.back_toc_page();
            if gap_start < back_page {
                self.erase_pages(gap_start, back_page - gap_start)?;
                return self.commit_locked(&mut state);
            }
        }
        Ok(())
    }
}

impl FileSystem for Spifs {
    fn open(&self, path: &str) -> Result<Cookie> {
        let name = path.trim_start_matches('/');
        if name.contains('/') {
            return err(KernelError::NotSupported);
        }
        if Self::is_reserved_name(name) {
            return err(KernelError::NotFound);
        }
        let mut state = self.state.lock();
        if !state.entries.iter().any(|e| e.name == name) {
            return err(KernelError::NotFound);
        }
        let cookie = state.next_cookie;
        state.next_cookie += 1;
        state.handles.insert(cookie, name.to_string());
        Ok(cookie)
    }

    fn create(&self, path: &str, len: u64) -> Result<Cookie> {
        let name = path.trim_start_matches('/');
        if name.contains('/') {
            return err(KernelError::NotSupported);
        }
        if name.len() > SPIFS_MAX_FILENAME_LEN || Self::is_reserved_name(name) {
            return err(KernelError::NotSupported);
        }
        let mut state = self.state.lock();
        if state.entries.iter().any(|e| e.name == name) {
            return err(KernelError::AlreadyExists);
        }

        let pages_needed = len.div_ceil(self.page_size).max(1) as u32;
        let capacity = pages_needed as u64 * self.page_size;
        let page_index = match Self::find_open_run(&state.entries, self.page_size, pages_needed) {
            Some(p) => p,
            None => return err(KernelError::NoMemory),
        };

        if let Err(e) = self.erase_pages(page_index, pages_needed) {
            return Err(e);
        }

        let entry = FileEntry { page_index, length: 0, capacity: capacity as u32, name: name.to_string() };
        state.entries.push(entry);
        state.entries.sort_by_key(|e| e.page_index);

        if let Err(e) = self.commit_locked(&mut state) {
            state.entries.retain(|e| e.name != name);
            return Err(e);
        }

        let cookie = state.next_cookie;
        state.next_cookie += 1;
        state.handles.insert(cookie, name.to_string());
        Ok(cookie)
    }

    fn remove(&self, path: &str) -> Result<()> {
        let name = path.trim_start_matches('/');
        let mut state = self.state.lock();
        if !state.entries.iter().any(|e| e.name == name) {
            return err(KernelError::NotFound);
        }
        let removed: Vec<FileEntry> = state.entries.iter().filter(|e| e.name == name).cloned().collect();
        state.entries.retain(|e| e.name != name);
        if let Err(e) = self.commit_locked(&mut state) {
            state.entries.extend(removed);
            state.entries.sort_by_key(|e| e.page_index);
            return Err(e);
        }
        Ok(())
    }

    fn read(&self, cookie: Cookie, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();
        let name = state.handles.get(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?;
        let entry = state.entries.iter().find(|e| &e.name == name).ok_or(crate::error::Errno::from(KernelError::NotFound))?;
        if offset >= entry.length as u64 {
            return Ok(0);
        }
        let n = buf.len().min((entry.length as u64 - offset) as usize);
        let device_offset = self.page_offset(entry.page_index) + offset;
        self.device.read(device_offset, &mut buf[..n])?;
        Ok(n)
    }

    fn write(&self, cookie: Cookie, offset: u64, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let name = state.handles.get(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?.clone();
        let index = state.entries.iter().position(|e| e.name == name).ok_or(crate::error::Errno::from(KernelError::NotFound))?;

        let capacity = state.entries[index].capacity as u64;
        let new_end = offset.checked_add(buf.len() as u64).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?;
        if new_end > capacity {
            return err(KernelError::NoMemory);
        }

        let page_index = state.entries[index].page_index;
        self.write_pages(page_index, offset, buf)?;

        let mut grown = false;
        if new_end > state.entries[index].length as u64 {
            state.entries[index].length = new_end as u32;
            grown = true;
        }
        if grown {
            self.commit_locked(&mut state)?;
        }
        Ok(buf.len())
    }

    fn stat(&self, cookie: Cookie) -> Result<Stat> {
        let state = self.state.lock();
        let name = state.handles.get(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?;
        let entry = state.entries.iter().find(|e| &e.name == name).ok_or(crate::error::Errno::from(KernelError::NotFound))?;
        Ok(Stat { size: entry.length as u64, capacity: entry.capacity as u64, file_type: FileType::File })
    }

    fn truncate(&self, cookie: Cookie, len: u64) -> Result<()> {
        let mut state = self.state.lock();
        let name = state.handles.get(&cookie).ok_or(crate::error::Errno::from(KernelError::InvalidArgs))?.clone();
        let index = state.entries.iter().position(|e| e.name == name).ok_or(crate::error::Errno::from(KernelError::NotFound))?;
        if len > state.entries[index].length as u64 {
            return err(KernelError::InvalidArgs);
        }
        state.entries[index].length = len as u32;
        self.commit_locked(&mut state)
    }

    fn close(&self, cookie: Cookie) -> Result<()> {
        let mut state = self.state.lock();
        state.handles.remove(&cookie);
        Ok(())
    }
}

impl Spifs {
    /// Read-modify-write over whole pages whenever `offset`/`offset+len`
    /// isn't page-aligned at both ends, per §4.5.
    fn write_pages(&self, file_page_index: u32, offset: u64, buf: &[u8]) -> Result<()> {
        let mut remaining = buf;
        let mut pos = offset;
        while !remaining.is_empty() {
            let page_in_file = pos / self.page_size;
            let page_start_offset = page_in_file * self.page_size;
            let offset_in_page = (pos - page_start_offset) as usize;
            let space_in_page = self.page_size as usize - offset_in_page;
            let chunk_len = remaining.len().min(space_in_page);
            let device_page_byte = self.page_offset(file_page_index) + page_start_offset;

            if offset_in_page == 0 && chunk_len == self.page_size as usize {
                self.device.write(device_page_byte, &remaining[..chunk_len])?;
            } else {
                let mut page_buf = vec![0u8; self.page_size as usize];
                self.device.read(device_page_byte, &mut page_buf)?;
                page_buf[offset_in_page..offset_in_page + chunk_len].copy_from_slice(&remaining[..chunk_len]);
                self.device.write(device_page_byte, &page_buf)?;
            }

            remaining = &remaining[chunk_len..];
            pos += chunk_len as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::mock::MockBlockDevice;
    use crate::block::EraseRegion;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn fresh_device(total_size: u64, page_size: u64) -> Arc<MockBlockDevice> {
        Arc::new(MockBlockDevice::new(total_size, page_size as u32).with_erase_geometry(vec![EraseRegion {
            start: 0,
            len: total_size,
            unit_size: page_size,
        }]))
    }

    #[test]
    fn format_then_mount_round_trips_empty_fs() {
        let device = fresh_device(8 * 8192, 8192);
        Spifs::format(device.clone()).unwrap();
        let fs = Spifs::mount(device).unwrap();
        let state = fs.state.lock();
        assert_eq!(state.entries.len(), 2);
        assert_eq!(state.generation, 1);
    }

    #[test]
    fn create_write_read_round_trips_after_remount() {
        let device = fresh_device(8 * 8192, 8192);
        Spifs::format(device.clone()).unwrap();
        {
            let fs = Spifs::mount(device.clone()).unwrap();
            let c = fs.create("a", 16 * 1024).unwrap();
            fs.write(c, 0, b"hello").unwrap();
        }
        let fs = Spifs::mount(device).unwrap();
        let c = fs.open("a").unwrap();
        let mut buf = [0u8; 5];
        let n = fs.read(c, 0, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn gap_left_by_removed_file_is_reused() {
        let device = fresh_device(8 * 8192, 8192);
        Spifs::format(device.clone()).unwrap();
        let fs = Spifs::mount(device).unwrap();
        fs.create("a", 8192).unwrap();
        let b = fs.create("b", 8192).unwrap();
        fs.create("c", 8192).unwrap();
        let b_page = {
            let state = fs.state.lock();
            state.entries.iter().find(|e| e.name == "b").unwrap().page_index
        };
        fs.remove("b").unwrap();
        let _ = b;
        let d = fs.create("d", 8192).unwrap();
        let d_page = {
            let state = fs.state.lock();
            state.handles.get(&d).cloned().and_then(|name| state.entries.iter().find(|e| e.name == name).map(|e| e.page_index)).unwrap()
        };
        assert_eq!(d_page, b_page);
    }

    #[test]
    fn opening_unknown_name_is_not_found() {
        let device = fresh_device(8 * 8192, 8192);
        Spifs::format(device.clone()).unwrap();
        let fs = Spifs::mount(device).unwrap();
        assert!(fs.open("missing").is_err());
    }

    #[test]
    fn name_with_slash_is_not_supported() {
        let device = fresh_device(8 * 8192, 8192);
        Spifs::format(device.clone()).unwrap();
        let fs = Spifs::mount(device).unwrap();
        assert!(fs.create("a/b", 8192).is_err());
    }

    /// A device wrapper that silently drops (writes nothing for) one
    /// specific write call, to simulate a power failure mid-commit.
    struct DropNthWrite {
        inner: Arc<MockBlockDevice>,
        counter: AtomicU32,
        drop_index: u32,
    }

    impl BlockDevice for DropNthWrite {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn total_size(&self) -> u64 {
            self.inner.total_size()
        }
        fn block_size(&self) -> u32 {
            self.inner.block_size()
        }
        fn erase_geometry(&self) -> &[EraseRegion] {
            self.inner.erase_geometry()
        }
        fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
            self.inner.read(offset, buf)
        }
        fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.drop_index {
                return Ok(());
            }
            self.inner.write(offset, buf)
        }
        fn erase(&self, offset: u64, len: u64) -> Result<()> {
            self.inner.erase(offset, len)
        }
        fn ioctl(&self, request: crate::block::IoctlRequest, arg: u64) -> Result<u64> {
            self.inner.ioctl(request, arg)
        }
    }

    #[test]
    fn power_fail_mid_commit_keeps_previous_toc_authoritative() {
        let inner = fresh_device(8 * 8192, 8192);
        Spifs::format(inner.clone()).unwrap();
        {
            let fs = Spifs::mount(inner.clone()).unwrap();
            let c = fs.create("a", 16 * 1024).unwrap();
            fs.write(c, 0, b"hello").unwrap();
        }
        // The write below touches data once, then the commit it triggers
        // writes header/entries/footer in that order. Dropping the 3rd
        // write overall (the entries write) corrupts that commit's CRC
        // without ever applying the generation bump durably.
        let wrapped = Arc::new(DropNthWrite { inner: inner.clone(), counter: AtomicU32::new(0), drop_index: 3 });
        {
            let fs = Spifs::mount(wrapped.clone() as Arc<dyn BlockDevice>).unwrap();
            let c = fs.open("a").unwrap();
            // Triggers a commit (grows length), whose footer write is dropped.
            let _ = fs.write(c, 5, b"world");
        }

        let fs = Spifs::mount(inner).unwrap();
        let c = fs.open("a").unwrap();
        let mut buf = [0u8; 5];
        let n = fs.read(c, 0, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }
}
