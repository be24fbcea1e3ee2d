//! Compile-time tunables collected in one place instead of scattered magic
//! numbers, the way the teacher collects `MAX_CPUS`/`HEAP_SIZE`.

/// Highest valid thread priority; 0 is reserved for the idle thread.
pub const MAX_PRIORITY: u8 = 31;
pub const DEFAULT_PRIORITY: u8 = 16;
pub const IDLE_PRIORITY: u8 = 0;

/// Default quantum, in timer ticks, per spec §4.1.
pub const DEFAULT_QUANTUM_TICKS: u32 = 5;
/// Periodic preemption timer armed on entry to a non-real-time thread from
/// a real-time/idle thread.
pub const PREEMPTION_TIMER_PERIOD_US: u64 = 10_000;

pub const SMP_MAX_CPUS: usize = 8;

/// Stack-overflow guard word and padding size, when the debug-bounds flag
/// is enabled on a thread.
pub const THREAD_STACK_PADDING_SIZE: usize = 64;
pub const STACK_GUARD_WORD: u64 = 0xDEAD_BEEF_CAFE_F00D;

/// Default 9P msize (page-aligned buffer size) and RPC timeout.
pub const NINEP_DEFAULT_MSIZE: u32 = 4096 * 32;
pub const NINEP_RPC_TIMEOUT_MS: u64 = 3_000;
pub const NINEP_VERSION: &str = "9P2000.L";
pub const NINEP_MAX_WALK_ELEMENTS: usize = 16;
/// Size of each open file's single page-cache buffer.
pub const NINEP_FILE_PAGE_SIZE: u64 = 4096;

/// AHCI command slots per port, and PRDT limits.
pub const AHCI_MAX_COMMAND_SLOTS: usize = 32;
pub const AHCI_MAX_PRDT_RUNS: usize = 16;
pub const AHCI_MAX_PRDT_RUN_BYTES: usize = 4 * 1024 * 1024;

/// SPIFS on-disk constants.
pub const SPIFS_ENTRY_SIZE: usize = 32;
pub const SPIFS_MAX_FILENAME_LEN: usize = 20;
pub const SPIFS_MAGIC: u32 = 0x5350_4653; // "SPFS"
pub const SPIFS_VERSION: u32 = 1;
pub const SPIFS_ERASED_SENTINEL: [u8; 4] = *b"TOFU";
