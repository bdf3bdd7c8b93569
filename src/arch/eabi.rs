//! Armv7-M EABI code

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{Scheduler, scheduler};

/// PendSV Handler for Armv7-M or Armv8-M Mainline EABI
///
/// This is the task switch code. It is called by hardware when the PendSV bit
/// is set and all other interrupts have finished.
///
/// On entry, we will find that xPSR, PC, LR, R12, R3, R2, R1 and R0 will have
/// been pushed onto the PSP. We thus push the remaining registers (which are
/// as the running task left them), along with the EXC_RETURN value in LR, and
/// hand the resulting stack pointer to the scheduler. It gives us back the
/// stack pointer of the task to run, and we pop the same registers from that.
/// Exiting from this function will cause the hardware to restore PC, LR, R12,
/// R3, R2, R1, and R0 from the new tasks PSP, and so the new task will resume.
///
/// Before the first switch there is no task to save, and the PSP is not yet
/// valid, so we skip the stacking.
///
/// It is a naked function because we do not want the compiler pushing
/// anything else to the stack and re-using registers containing precious task
/// state.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    // NOTE: This code must NOT touch r4-r11 until they are stacked. It can
    // ONLY touch r0-r3 and r12, because those registers were stacked by the
    // hardware on exception entry.

    core::arch::naked_asm!(r#"
    // r1 = the address of the Scheduler object
    ldr     r1, ={scheduler_ptr}
    ldr     r1, [r1]

    // if there is no Scheduler object, there is nothing to switch to
    cmp     r1, #0
    beq     2f

    // r0 = the current task stack pointer
    mrs     r0, psp

    // if the scheduler isn't running yet, skip the stacking of the current task
    ldrb    r2, [r1, {running_offset}]
    cmp     r2, #0
    beq     1f

    //
    // Stack the current task
    //

    // Push the additional state into stack at r0
    stmdb   r0!, {{ r4 - r11, lr }}

    1:

    //
    // Pick the next task
    //
    // r0 holds the current task's stack pointer, and comes back holding the
    // next task's stack pointer. This clobbers lr, which is fine because we
    // load a new one below.
    //

    bl      {switch_from_trap}

    //
    // Pop the next task
    //

    // Pop the additional state from it
    ldmia   r0!, {{ r4 - r11, lr }}

    // Set the current task stack pointer
    msr     psp, r0

    //
    // return to the task
    //

    2:
    bx      lr
    "#,
    scheduler_ptr = sym scheduler::SCHEDULER_PTR,
    running_offset = const Scheduler::RUNNING_OFFSET,
    switch_from_trap = sym scheduler::switch_from_trap,
    );
}

// End of File
