//! AHCI port command-issue state machine, per §4.6. Grounded on
//! `examples/original_source/dev/block/ahci/port.cpp` (`find_free_cmdslot`,
//! `queue_command`, `wait_for_completion`, `irq_handler`) and
//! `examples/original_source/dev/block/ahci/disk.cpp` (`identify`). Real
//! MMIO register access, PCI/ABAR discovery, and physical memory mapping
//! are out of scope (§1 Non-goals); this module is the logic those
//! register reads/writes drive, taking already-resolved bitmaps/physical
//! runs as input so it is fully testable without hardware.

use crate::config::{AHCI_MAX_PRDT_RUNS, AHCI_MAX_PRDT_RUN_BYTES};
use crate::error::{err, KernelError, Result};
use crate::sched::event::{Event, EventMode};
use crate::sched::Scheduler;
use alloc::vec::Vec;

/// One physically contiguous run backing part of a command's data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRun {
    pub address: u64,
    pub length: u32,
}

/// Coalesce adjacent `(physical_address, length)` page runs (already
/// resolved by the architecture's virtual-to-physical walk, out of scope
/// here) into PRDT-ready runs, merging runs whose end matches the next
/// run's start and whose combined length stays under the 4 MiB PRDT
/// entry limit. Returns `NotEnoughBuffer` if more than
/// `AHCI_MAX_PRDT_RUNS` runs remain after coalescing.
pub fn build_prdt(pages: &[(u64, usize)]) -> Result<Vec<MemRun>> {
    let mut merged: Vec<MemRun> = Vec::new();
    for &(address, length) in pages {
        if length == 0 {
            continue;
        }
        if let Some(last) = merged.last_mut() {
            if last.address + last.length as u64 == address
                && last.length as usize + length <= AHCI_MAX_PRDT_RUN_BYTES
            {
                last.length += length as u32;
                continue;
            }
        }
        if merged.len() >= AHCI_MAX_PRDT_RUNS {
            return err(KernelError::NotEnoughBuffer);
        }
        merged.push(MemRun { address, length: length as u32 });
    }
    Ok(merged)
}

/// Lowest-index-first scan of the combined "slot in use" bitmap
/// (`PxSACT | PxCI | cmd_pending` in the original). Resolves the spec's
/// open question about the original's `__builtin_clz(~all_slots)`
/// (undefined when `all_slots == 0`): scan from bit 0 up, return
/// `NotFound` once every bit up to `num_slots` is set.
pub fn find_free_cmdslot(occupied: u32, num_slots: u32) -> Result<u32> {
    for slot in 0..num_slots {
        if occupied & (1 << slot) == 0 {
            return Ok(slot);
        }
    }
    err(KernelError::NotFound)
}

/// Result of starting a wait for a queued command's completion: either it
/// had already completed (e.g. the IRQ handler ran before this thread got
/// back to it) or the caller is now blocked and must poll
/// `AhciPort::take_completion` once rescheduled. Same two-phase shape as
/// `sched::mutex::LockOutcome`/`sched::Scheduler::JoinResult`, for the
/// same reason: there is no real stack suspension to resume into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Ready(u32),
    Blocked,
}

/// Per-port command-slot bookkeeping: which slots this driver believes
/// are pending, and one event per slot signaled by the IRQ handler.
pub struct AhciPort {
    num_slots: u32,
    cmd_pending: u32,
    slot_events: Vec<Event>,
}

impl AhciPort {
    pub fn new(scheduler: &mut Scheduler, num_slots: u32) -> Self {
        let slot_events = (0..num_slots).map(|_| Event::new(scheduler, EventMode::AutoUnsignal)).collect();
        AhciPort { num_slots, cmd_pending: 0, slot_events }
    }

    pub fn num_slots(&self) -> u32 {
        self.num_slots
    }

    pub fn is_pending(&self, slot: u32) -> bool {
        self.cmd_pending & (1 << slot) != 0
    }

    /// Claim a free slot given the hardware-visible busy bitmap
    /// (`PxSACT | PxCI`) read by the caller, and mark it pending. Does not
    /// itself touch `PxCI`/the command table/FIS; the driver glue above
    /// this layer does that after receiving the slot number.
    pub fn queue_command(&mut self, hw_busy_slots: u32) -> Result<u32> {
        let occupied = hw_busy_slots | self.cmd_pending;
        let slot = find_free_cmdslot(occupied, self.num_slots)?;
        self.slot_events[slot as usize].clear();
        self.cmd_pending |= 1 << slot;
        Ok(slot)
    }

    fn finish(&mut self, slot: u32, error_status: u32) -> Result<u32> {
        self.cmd_pending &= !(1 << slot);
        if error_status & 1 != 0 {
            return err(KernelError::Io);
        }
        Ok(error_status)
    }

    /// Begin waiting for `slot` to complete. `error_status` is the port's
    /// `PxTFD` register, read by the caller; only meaningful if this
    /// returns `Ready` immediately.
    pub fn begin_wait_for_completion(
        &mut self,
        scheduler: &mut Scheduler,
        cpu: usize,
        slot: u32,
        error_status: u32,
    ) -> Result<CompletionOutcome> {
        let signalled = self.slot_events[slot as usize].wait(scheduler, cpu, None)?;
        if signalled {
            Ok(CompletionOutcome::Ready(self.finish(slot, error_status)?))
        } else {
            Ok(CompletionOutcome::Blocked)
        }
    }

    /// Called once the blocked thread is current again; `error_status` is
    /// the `PxTFD` value read at that point. Returns `None` if the wait
    /// hasn't actually completed yet (spurious reschedule).
    pub fn take_completion(&mut self, scheduler: &mut Scheduler, tid: crate::sched::Tid, slot: u32, error_status: u32) -> Option<Result<u32>> {
        match scheduler.take_wait_result(tid)? {
            crate::sched::wait_queue::WaitOutcome::Woken(_) => Some(self.finish(slot, error_status)),
            crate::sched::wait_queue::WaitOutcome::TimedOut => Some(err(KernelError::Timeout)),
            crate::sched::wait_queue::WaitOutcome::Destroyed => Some(err(KernelError::ObjectDestroyed)),
        }
    }

    /// `completed = cmd_pending & ~PxCI`, per §4.6's IRQ handler
    /// description. Signals every completed slot's event and reports
    /// whether a reschedule should be requested on interrupt exit.
    pub fn irq_handler(&mut self, scheduler: &mut Scheduler, hw_ci_register: u32) -> bool {
        let mut completed = self.cmd_pending & !hw_ci_register;
        let mut reschedule = false;
        while completed != 0 {
            let slot = completed.trailing_zeros();
            self.slot_events[slot as usize].signal(scheduler);
            reschedule = true;
            completed &= !(1 << slot);
        }
        reschedule
    }
}

/// IDENTIFY DEVICE response fields this driver consumes, per
/// `examples/original_source/dev/block/ahci/disk.cpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskIdentity {
    pub sector_count: u64,
    pub logical_sector_size: u32,
}

/// Decode the subset of a 256-word IDENTIFY DEVICE response this driver
/// needs. Requires LBA48 support (word 83, bit 10); anything else is
/// `NotSupported`, matching the original's "assumes LBA48" behavior.
pub fn parse_identify(data: &[u16; 256]) -> Result<DiskIdentity> {
    let lba48 = data[83] & (1 << 10) != 0;
    if !lba48 {
        return err(KernelError::NotSupported);
    }

    let sector_count = data[100] as u64
        | (data[101] as u64) << 16
        | (data[102] as u64) << 32
        | (data[103] as u64) << 48;

    let mut logical_sector_size = 512u32;
    let phys_to_logical = data[106];
    if phys_to_logical & 0xC000 == 0x4000 && phys_to_logical & (1 << 12) != 0 {
        logical_sector_size = data[117] as u32 | (data[118] as u32) << 16;
    }

    Ok(DiskIdentity { sector_count, logical_sector_size })
}
