//! Generic virtio descriptor-chain transport, shared by the 9P client.
//! Grounded on the architecture's split-virtqueue implementation
//! (`arch/x86_64::virtqueue`): same descriptor/flags/chain-reclaim shape,
//! but addresses are opaque buffer handles rather than raw physical
//! pointers, and the "device" side (what the teacher's code reaches via
//! `read_volatile`/`write_volatile` on MMIO-backed rings) is a queue a
//! caller (the real interrupt path, or a test) pushes completions into —
//! actual PCI/queue-notify plumbing is out of scope (§1 Non-goals).

use crate::error::{err, KernelError, Result};
use crate::sched::event::{Event, EventMode};
use crate::sched::Scheduler;
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

pub mod desc_flags {
    pub const NEXT: u16 = 1;
    pub const WRITE: u16 = 2;
}

#[derive(Debug, Clone, Copy)]
struct VirtqDesc {
    addr: u64,
    len: u32,
    flags: u16,
    next: u16,
}

/// One descriptor-chain transport queue. `addr` values are indices into
/// whatever buffer pool the caller manages (a `Vec<u8>` per in-flight
/// request here); the queue itself only tracks chain linkage and
/// completion status, exactly as the teacher's ring-based queue tracks
/// descriptor indices rather than buffer contents.
pub struct Virtqueue {
    desc_table: Vec<VirtqDesc>,
    free_desc: Vec<u16>,
    used: VecDeque<(u16, u32)>,
    completion: Event,
}

impl Virtqueue {
    pub fn new(scheduler: &mut Scheduler, queue_size: u16) -> Self {
        Virtqueue {
            desc_table: vec![VirtqDesc { addr: 0, len: 0, flags: 0, next: 0 }; queue_size as usize],
            free_desc: (0..queue_size).rev().collect(),
            used: VecDeque::new(),
            completion: Event::new(scheduler, EventMode::AutoUnsignal),
        }
    }

    fn alloc_desc(&mut self) -> Option<u16> {
        self.free_desc.pop()
    }

    /// Add a buffer chain (e.g. a transmit buffer followed by a
    /// device-writable receive buffer) and return the chain head. `addr`
    /// is a caller-defined handle (an index into its own buffer table),
    /// copied through verbatim.
    pub fn add_buffer_chain(&mut self, buffers: &[(u64, u32, bool)]) -> Result<u16> {
        if buffers.is_empty() || buffers.len() > self.free_desc.len() {
            return err(KernelError::NoMemory);
        }
        let mut indices = Vec::with_capacity(buffers.len());
        for _ in 0..buffers.len() {
            indices.push(self.alloc_desc().expect("checked free_desc.len() above"));
        }
        for (i, &(addr, len, writable)) in buffers.iter().enumerate() {
            let idx = indices[i];
            let flags = if writable { desc_flags::WRITE } else { 0 };
            let (flags, next) = if i + 1 < buffers.len() {
                (flags | desc_flags::NEXT, indices[i + 1])
            } else {
                (flags, 0)
            };
            self.desc_table[idx as usize] = VirtqDesc { addr, len, flags, next };
        }
        Ok(indices[0])
    }

    /// Reclaim every descriptor in the chain headed by `head`.
    pub fn reclaim_chain(&mut self, head: u16) {
        let mut current = head;
        loop {
            let desc = self.desc_table[current as usize];
            self.free_desc.push(current);
            if desc.flags & desc_flags::NEXT == 0 {
                break;
            }
            current = desc.next;
        }
    }

    /// Called from the interrupt path once the device reports a chain
    /// head complete, with the number of bytes it wrote into the
    /// device-writable buffer.
    pub fn push_completion(&mut self, scheduler: &mut Scheduler, head: u16, written: u32) {
        self.used.push_back((head, written));
        self.completion.signal(scheduler);
    }

    /// Pop one queued completion, if any, without blocking.
    pub fn poll_completion(&mut self, head: u16) -> Option<u32> {
        let pos = self.used.iter().position(|&(h, _)| h == head)?;
        let (_, written) = self.used.remove(pos).unwrap();
        Some(written)
    }

    /// Block the caller until at least one completion is queued.
    /// Returns `true` if the wait resolved immediately (a completion was
    /// already posted), `false` if the caller is now blocked and must
    /// call `Scheduler::take_wait_result` once rescheduled.
    pub fn wait_for_any_completion(&mut self, scheduler: &mut Scheduler, cpu: usize, timeout_us: Option<u64>) -> Result<bool> {
        if !self.used.is_empty() {
            return Ok(true);
        }
        self.completion.wait(scheduler, cpu, timeout_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::ThreadFlags;

    #[test]
    fn buffer_chain_links_descriptors_in_order() {
        let mut sched = Scheduler::new();
        sched.create_idle_thread(0, 0).unwrap();
        let mut vq = Virtqueue::new(&mut sched, 8);
        let head = vq.add_buffer_chain(&[(100, 16, false), (200, 64, true)]).unwrap();
        assert_eq!(vq.desc_table[head as usize].flags & desc_flags::NEXT, desc_flags::NEXT);
        let next = vq.desc_table[head as usize].next;
        assert_eq!(vq.desc_table[next as usize].flags & desc_flags::WRITE, desc_flags::WRITE);
    }

    #[test]
    fn reclaim_returns_descriptors_to_the_free_list() {
        let mut sched = Scheduler::new();
        sched.create_idle_thread(0, 0).unwrap();
        let mut vq = Virtqueue::new(&mut sched, 2);
        let head = vq.add_buffer_chain(&[(1, 1, false), (2, 2, true)]).unwrap();
        assert!(vq.add_buffer_chain(&[(3, 3, false)]).is_err());
        vq.reclaim_chain(head);
        assert!(vq.add_buffer_chain(&[(3, 3, false)]).is_ok());
    }

    #[test]
    fn completion_already_posted_is_observed_without_blocking() {
        let mut sched = Scheduler::new();
        sched.create_idle_thread(0, 0).unwrap();
        let mut vq = Virtqueue::new(&mut sched, 4);
        let head = vq.add_buffer_chain(&[(1, 1, false)]).unwrap();
        vq.push_completion(&mut sched, head, 42);
        assert_eq!(vq.wait_for_any_completion(&mut sched, 0, None).unwrap(), true);
        assert_eq!(vq.poll_completion(head), Some(42));
    }

    #[test]
    fn waiter_blocks_until_a_completion_is_pushed() {
        let mut sched = Scheduler::new();
        sched.create_idle_thread(0, 0).unwrap();
        let mut vq = Virtqueue::new(&mut sched, 4);
        let waiter = sched.create_thread("waiter", 16, 0, 0, ThreadFlags::empty()).unwrap();
        sched.resume(waiter).unwrap();
        sched.yield_now(0);

        let head = vq.add_buffer_chain(&[(1, 1, false)]).unwrap();
        assert_eq!(vq.wait_for_any_completion(&mut sched, 0, None).unwrap(), false);
        assert_eq!(sched.thread(waiter).unwrap().state, crate::sched::ThreadState::Blocked);

        vq.push_completion(&mut sched, head, 7);
        assert_eq!(sched.thread(waiter).unwrap().state, crate::sched::ThreadState::Ready);
        assert_eq!(vq.poll_completion(head), Some(7));
    }
}
