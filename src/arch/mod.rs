//! The Cortex-M side of the scheduler
//!
//! Exception handlers, plus the peripheral set-up [`Scheduler::start`] needs.
//! The PendSV handler itself is in assembly language, picked to suit the
//! architecture.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(any(arm_architecture = "v6-m", arm_architecture = "v8-m.base"))]
mod eabi_v6;

#[cfg(not(any(arm_architecture = "v6-m", arm_architecture = "v8-m.base")))]
mod eabi;

#[cfg(arm_abi = "eabihf")]
compile_error!("The context switch does not save FPU state - use an `eabi` target");

use cortex_m::peripheral::{SCB, SYST, scb::SystemHandler, syst::SystClkSource};

use crate::Scheduler;

/// The numerically highest, and therefore least urgent, priority
const LOWEST_PRIORITY: u8 = 0xFF;

/// SysTick Handler
///
/// Drives the scheduler's clock. Every tick is a chance to switch task.
#[unsafe(no_mangle)]
extern "C" fn SysTick() {
    if let Some(scheduler) = Scheduler::get_scheduler() {
        scheduler.sched_tick();
    }
}

/// Ask for the PendSV exception
pub(crate) fn pend_switch() {
    SCB::set_pendsv();
}

/// Set exception priorities, and turn on the configurable faults
///
/// PendSV and SysTick both get the lowest priority. Neither can then
/// interrupt another interrupt handler, or each other, so a context switch
/// only ever happens on the way back to a task.
pub(crate) fn configure_exceptions(scb: &mut SCB) {
    // SAFETY: the scheduler isn't running yet, so there are no priority-based
    // critical sections to break
    unsafe {
        scb.set_priority(SystemHandler::PendSV, LOWEST_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, LOWEST_PRIORITY);
    }

    // Without these, UsageFault, BusFault and MemManage all show up as a
    // HardFault
    #[cfg(not(any(arm_architecture = "v6-m", arm_architecture = "v8-m.base")))]
    {
        const MEMFAULTENA: u32 = 1 << 16;
        const BUSFAULTENA: u32 = 1 << 17;
        const USGFAULTENA: u32 = 1 << 18;
        // SAFETY: Only sets enable bits for fault handlers
        unsafe {
            scb.shcsr
                .modify(|shcsr| shcsr | MEMFAULTENA | BUSFAULTENA | USGFAULTENA);
        }
    }
}

/// Make SysTick fire every `systicks_per_sched_tick` processor clocks
pub(crate) fn configure_systick(syst: &mut SYST, systicks_per_sched_tick: u32) {
    // The reload register is 24 bits, and counts down to zero inclusive
    assert!((2..=0x0100_0000).contains(&systicks_per_sched_tick));
    syst.set_reload(systicks_per_sched_tick - 1);
    syst.set_clock_source(SystClkSource::Core);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

// End of File
