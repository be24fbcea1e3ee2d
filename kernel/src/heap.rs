//! Global allocator wiring. Backed by `linked_list_allocator`, the same
//! crate the teacher uses, guarded so it only takes over `#[global_allocator]`
//! on the real no_std target; host unit tests keep the standard library's
//! allocator.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const HEAP_SIZE: usize = 8 * 1024 * 1024;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: linked_list_allocator::LockedHeap = linked_list_allocator::LockedHeap::empty();

static HEAP_INIT_DONE: AtomicBool = AtomicBool::new(false);
static ALLOCATION_FAILURES: AtomicUsize = AtomicUsize::new(0);

#[repr(align(64))]
struct HeapRegion([u8; HEAP_SIZE]);

/// Initialize the global allocator exactly once. Safe to call more than
/// once; only the first call has an effect.
pub fn init_heap() {
    if HEAP_INIT_DONE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    #[cfg(not(test))]
    unsafe {
        static mut HEAP_MEMORY: HeapRegion = HeapRegion([0; HEAP_SIZE]);
        let heap_start = core::ptr::addr_of_mut!(HEAP_MEMORY) as *mut u8;
        ALLOCATOR.lock().init(heap_start, HEAP_SIZE);
    }

    crate::log::info("heap", "initialized");
}

pub fn record_allocation_failure() {
    ALLOCATION_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn allocation_failures() -> usize {
    ALLOCATION_FAILURES.load(Ordering::Relaxed)
}
