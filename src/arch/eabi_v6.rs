//! Armv6-M EABI code

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{Scheduler, scheduler};

/// PendSV Handler for Armv6-M or Armv8-M Baseline EABI
///
/// This is the task switch code. It is called by hardware when the PendSV bit
/// is set and all other interrupts have finished. It uses only the Armv6-M
/// subset instructions.
///
/// It does the same job as the Armv7-M version, and leaves the saved state in
/// the same order (R4 at the lowest address, then R5 to R11, then EXC_RETURN),
/// but Armv6-M cannot `stmdb`, nor store R8-R11 directly, so we go via R4-R7
/// once those have been stored.
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

    // Make room for r4-r11 and lr
    subs    r0, #36

    // r4-r7 go at the bottom
    stmia   r0!, {{ r4 - r7 }}

    // r8-r11 go next, via r4-r7
    mov     r4, r8
    mov     r5, r9
    mov     r6, r10
    mov     r7, r11
    stmia   r0!, {{ r4 - r7 }}

    // EXC_RETURN goes at the top
    mov     r4, lr
    str     r4, [r0]

    // r0 = the adjusted stack pointer
    subs    r0, #32

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

    // r8-r11 first, via r4-r7
    adds    r0, #16
    ldmia   r0!, {{ r4 - r7 }}
    mov     r8, r4
    mov     r9, r5
    mov     r10, r6
    mov     r11, r7

    // then EXC_RETURN
    ldr     r4, [r0]
    mov     lr, r4

    // then r4-r7 themselves
    subs    r0, #32
    ldmia   r0!, {{ r4 - r7 }}

    // psp = the adjusted task stack pointer
    adds    r0, #20
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
