//! Device drivers built on top of `block::BlockDevice`/the 9P transport.
//! Register/MMIO access and PCI enumeration are out of scope (§1
//! Non-goals); these modules are the portable logic that sits behind
//! them, grounded on the architecture's own `arch/x86_64::ahci`/
//! `arch/x86_64::virtqueue` plus the original C++ reference driver.

pub mod ahci;
pub mod virtio_transport;
