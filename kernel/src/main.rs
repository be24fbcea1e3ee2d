//! Thin bare-metal entry point. All real subsystem logic lives in the
//! `corekernel` library crate so it can be exercised by `cargo test` on the
//! host; this binary only wires the library to a concrete machine.
#![no_std]
#![no_main]
#![feature(alloc_error_handler)]

extern crate alloc;

use corekernel::{heap, log, sched, time};

#[cfg(target_arch = "x86_64")]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    heap::init_heap();
    time::init_boot_timestamp();
    log::set_level(log::LogLevel::Info);

    log::info("boot", "corekernel starting");
    sched::init();

    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error("panic", "unrecoverable panic");
    let _ = info;
    loop {
        core::hint::spin_loop();
    }
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    let _ = layout;
    log::error("heap", "allocation failure");
    loop {
        core::hint::spin_loop();
    }
}
