//! L2: block device capability set. Every storage-backed subsystem above
//! this layer — SPIFS, AHCI's own consumers — talks to devices purely
//! through the `BlockDevice` trait; the block layer itself contributes no
//! locking of its own (per §5, device access is serialized by whichever
//! driver owns the device).

pub mod mock;

use crate::error::{KernelError, Result};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// One region of a device's erase geometry: `block_count` blocks starting
/// at `start_block`, all erasable only as a single `unit_size`-byte unit.
/// NOR-flash-style devices often have several such regions of differing
/// unit size (small sectors near one end, large ones elsewhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRegion {
    pub start: u64,
    pub len: u64,
    pub unit_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlRequest {
    GetFileAddr,
    IsMapped,
    GetMapAddr,
}

/// The capability set every block device exposes, per §4.4/§6.
pub trait BlockDevice: Send + Sync {
    fn name(&self) -> &str;
    fn total_size(&self) -> u64;
    /// Power of 2.
    fn block_size(&self) -> u32;
    /// Empty if the device has no erase-granularity constraint (e.g. RAM).
    fn erase_geometry(&self) -> &[EraseRegion];

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
    fn write(&self, offset: u64, buf: &[u8]) -> Result<()>;
    /// Erase `len` bytes starting at `offset`; both must be aligned to the
    /// covering erase region's `unit_size` wherever the device has erase
    /// geometry.
    fn erase(&self, offset: u64, len: u64) -> Result<()>;
    fn ioctl(&self, request: IoctlRequest, arg: u64) -> Result<u64>;
}

fn check_bounds(device: &dyn BlockDevice, offset: u64, len: u64) -> Result<()> {
    let end = offset.checked_add(len).ok_or(KernelError::InvalidArgs)?;
    if end > device.total_size() {
        return Err(KernelError::InvalidArgs.into());
    }
    Ok(())
}

/// A block-addressable slice of a parent device, e.g. a partition. Inherits
/// the parent's block size and whatever erase-geometry regions intersect
/// its own span, translated to subdevice-relative offsets.
pub struct SubDevice {
    parent: Arc<dyn BlockDevice>,
    name: String,
    start_byte: u64,
    size_bytes: u64,
    erase_geometry: Vec<EraseRegion>,
}

/// Publish `name` as a subdevice of `parent` spanning
/// `[start_block, start_block + block_count)` blocks.
pub fn publish_subdevice(
    parent: Arc<dyn BlockDevice>,
    name: &str,
    start_block: u64,
    block_count: u64,
) -> Result<SubDevice> {
    let block_size = parent.block_size() as u64;
    let start_byte = start_block
        .checked_mul(block_size)
        .ok_or(KernelError::InvalidArgs)?;
    let size_bytes = block_count
        .checked_mul(block_size)
        .ok_or(KernelError::InvalidArgs)?;
    let end_byte = start_byte.checked_add(size_bytes).ok_or(KernelError::InvalidArgs)?;
    if end_byte > parent.total_size() {
        return Err(KernelError::InvalidArgs.into());
    }

    let mut erase_geometry = Vec::new();
    for region in parent.erase_geometry() {
        let region_end = region.start + region.len;
        let clip_start = region.start.max(start_byte);
        let clip_end = region_end.min(end_byte);
        if clip_start < clip_end {
            erase_geometry.push(EraseRegion {
                start: clip_start - start_byte,
                len: clip_end - clip_start,
                unit_size: region.unit_size,
            });
        }
    }

    Ok(SubDevice {
        parent,
        name: String::from(name),
        start_byte,
        size_bytes,
        erase_geometry,
    })
}

impl BlockDevice for SubDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_size(&self) -> u64 {
        self.size_bytes
    }

    fn block_size(&self) -> u32 {
        self.parent.block_size()
    }

    fn erase_geometry(&self) -> &[EraseRegion] {
        &self.erase_geometry
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(self, offset, buf.len() as u64)?;
        self.parent.read(self.start_byte + offset, buf)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        check_bounds(self, offset, buf.len() as u64)?;
        self.parent.write(self.start_byte + offset, buf)
    }

    fn erase(&self, offset: u64, len: u64) -> Result<()> {
        check_bounds(self, offset, len)?;
        self.parent.erase(self.start_byte + offset, len)
    }

    fn ioctl(&self, request: IoctlRequest, arg: u64) -> Result<u64> {
        self.parent.ioctl(request, arg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocEnd {
    Front,
    Back,
}

fn round_up(value: u64, unit: u64) -> u64 {
    if unit == 0 {
        return value;
    }
    value.div_ceil(unit) * unit
}

/// Find a `length`-byte run within `[region_start, region_start + region_len)`
/// that respects `geometry`'s erase-unit alignment, per §4.4. `alloc_end`
/// picks which end of the region list — and which end of the winning
/// sub-region — the run is carved from: `Front` walks ascending and takes
/// the low end of the first fit; `Back` walks descending and takes the
/// high end. A device with no erase geometry is treated as one region
/// covering the whole span, aligned to `block_size`.
pub fn adjust_for_erase_geometry(
    geometry: &[EraseRegion],
    block_size: u64,
    region_start: u64,
    region_len: u64,
    length: u64,
    alloc_end: AllocEnd,
) -> Result<u64> {
    let region_end = region_start.checked_add(region_len).ok_or(KernelError::InvalidArgs)?;

    let mut clipped: Vec<(u64, u64, u64)> = Vec::new();
    if geometry.is_empty() {
        clipped.push((region_start, region_len, block_size));
    } else {
        for g in geometry {
            let g_end = g.start + g.len;
            let clip_start = g.start.max(region_start);
            let clip_end = g_end.min(region_end);
            if clip_start < clip_end {
                clipped.push((clip_start, clip_end - clip_start, g.unit_size));
            }
        }
    }

    let ordered: Vec<(u64, u64, u64)> = match alloc_end {
        AllocEnd::Front => clipped,
        AllocEnd::Back => {
            let mut v = clipped;
            v.reverse();
            v
        }
    };

    for (start, len, unit) in ordered {
        let rounded = round_up(length, unit);
        if rounded <= len {
            return Ok(match alloc_end {
                AllocEnd::Front => start,
                // `len` may be a boundary-clipped sub-region and so not a
                // whole multiple of `unit`; floor it first so the carved
                // run's end, and hence its start, stays unit-aligned.
                AllocEnd::Back => start + (len / unit) * unit - rounded,
            });
        }
    }
    Err(KernelError::NoMemory.into())
}
