//! In-memory `BlockDevice` used by host tests and by `tests/scenarios.rs`
//! to drive SPIFS/AHCI logic without real hardware. Grounded on the
//! teacher's `drivers/mock/block.rs` fault-injection pattern: reads/writes
//! can be made to fail at a configurable rate, and erase geometry is
//! settable so geometry-aware allocation can be exercised deterministically.

use super::{BlockDevice, EraseRegion, IoctlRequest};
use crate::error::{KernelError, Result};
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

pub struct MockBlockDevice {
    data: Mutex<Vec<u8>>,
    block_size: u32,
    erase_geometry: Vec<EraseRegion>,
    /// Out of every `fail_every` operations, the next one fails. 0 disables.
    fail_every: AtomicU32,
    op_count: AtomicU32,
}

impl MockBlockDevice {
    pub fn new(total_size: u64, block_size: u32) -> Self {
        MockBlockDevice {
            data: Mutex::new(vec![0u8; total_size as usize]),
            block_size,
            erase_geometry: Vec::new(),
            fail_every: AtomicU32::new(0),
            op_count: AtomicU32::new(0),
        }
    }

    pub fn with_erase_geometry(mut self, geometry: Vec<EraseRegion>) -> Self {
        self.erase_geometry = geometry;
        self
    }

    /// Make every `n`th operation fail with `KernelError::Io`. `n == 0`
    /// disables fault injection.
    pub fn set_fail_every(&self, n: u32) {
        self.fail_every.store(n, Ordering::SeqCst);
        self.op_count.store(0, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<()> {
        let every = self.fail_every.load(Ordering::SeqCst);
        if every == 0 {
            return Ok(());
        }
        let count = self.op_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count % every == 0 {
            return Err(KernelError::Io.into());
        }
        Ok(())
    }
}

impl BlockDevice for MockBlockDevice {
    fn name(&self) -> &str {
        "mock0"
    }

    fn total_size(&self) -> u64 {
        self.data.lock().len() as u64
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn erase_geometry(&self) -> &[EraseRegion] {
        &self.erase_geometry
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.maybe_fail()?;
        let data = self.data.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(KernelError::InvalidArgs.into());
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.maybe_fail()?;
        let mut data = self.data.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(KernelError::InvalidArgs.into());
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn erase(&self, offset: u64, len: u64) -> Result<()> {
        self.maybe_fail()?;
        let mut data = self.data.lock();
        let start = offset as usize;
        let end = start + len as usize;
        if end > data.len() {
            return Err(KernelError::InvalidArgs.into());
        }
        for b in &mut data[start..end] {
            *b = 0xFF;
        }
        Ok(())
    }

    fn ioctl(&self, _request: IoctlRequest, _arg: u64) -> Result<u64> {
        Err(KernelError::NotSupported.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dev = MockBlockDevice::new(4096, 512);
        dev.write(512, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        dev.read(512, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn erase_sets_region_to_erased_value() {
        let dev = MockBlockDevice::new(4096, 512);
        dev.write(0, &[0xAB; 512]).unwrap();
        dev.erase(0, 512).unwrap();
        let mut buf = [0u8; 512];
        dev.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 512]);
    }

    #[test]
    fn fail_every_injects_periodic_failures() {
        let dev = MockBlockDevice::new(4096, 512);
        dev.set_fail_every(3);
        let mut buf = [0u8; 4];
        assert!(dev.read(0, &mut buf).is_ok());
        assert!(dev.read(0, &mut buf).is_ok());
        assert!(dev.read(0, &mut buf).is_err());
        assert!(dev.read(0, &mut buf).is_ok());
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let dev = MockBlockDevice::new(4096, 512);
        let mut buf = [0u8; 512];
        assert!(dev.read(4096, &mut buf).is_err());
    }
}
