//! Common panic/fault/timestamp handlers for the demos

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

use defmt_semihosting as _;

/// Called when a panic occurs.
///
/// Logs the panic to defmt and then crashes the CPU.
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    defmt::println!("PANIC: {}", defmt::Debug2Format(info));
    cortex_m::asm::udf();
}

/// Called when a HardFault occurs.
///
/// Logs the fault to defmt and then crashes the CPU.
#[cortex_m_rt::exception]
unsafe fn HardFault(info: &cortex_m_rt::ExceptionFrame) -> ! {
    defmt::println!("FAULT: {}", defmt::Debug2Format(info));
    cortex_m::asm::udf();
}

/// Called on a MemManage fault, which the scheduler enables.
///
/// Logs the fault to defmt and then stops.
#[cortex_m_rt::exception]
fn MemoryManagement() -> ! {
    halt("MemManage")
}

/// Called on a BusFault, which the scheduler enables.
///
/// Logs the fault to defmt and then stops.
#[cortex_m_rt::exception]
fn BusFault() -> ! {
    halt("BusFault")
}

/// Called on a UsageFault, which the scheduler enables.
///
/// Logs the fault to defmt and then stops.
#[cortex_m_rt::exception]
fn UsageFault() -> ! {
    halt("UsageFault")
}

/// Report a configurable fault, then stop
///
/// The fault handlers run above SysTick and PendSV, so no task runs again.
fn halt(fault: &str) -> ! {
    defmt::println!("FAULT: {=str}", fault);
    loop {
        cortex_m::asm::wfi();
    }
}

// Log scheduler ticks in the defmt logs
defmt::timestamp!("{=u32:010} {}", robin::now(), robin::task_id());

// End of File
