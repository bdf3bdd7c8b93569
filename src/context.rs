//! Holds the [`SavedContext`] type, which describes a suspended task
//!
//! While a task is not running, its registers live on its own stack, in this
//! order (lowest address first):
//!
//! ```text
//! sp ->  r4 r5 r6 r7 r8 r9 r10 r11 EXC_RETURN   <- stacked by PendSV
//!        r0 r1 r2 r3 r12 lr pc xPSR             <- stacked by the hardware
//! ```
//!
//! The PendSV handlers and the frame initialiser both depend on this exact
//! layout.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::StackPusher;

/// Number of 32-bit words in a [`SavedContext`]
pub const FRAME_WORDS: usize = SoftwareFrame::WORDS + HardwareFrame::WORDS;

/// Size of a [`SavedContext`] on the stack, in bytes
pub const FRAME_SIZE: usize = FRAME_WORDS * 4;

/// The smallest stack a task may have
///
/// Space for one saved context, plus a little headroom.
pub const MIN_STACK_SIZE: usize = FRAME_SIZE + 8;

/// The registers our PendSV handler stacks and unstacks itself
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SoftwareFrame {
    /// Callee-saved registers r4 to r11
    pub r4_r11: [u32; 8],
    /// The `EXC_RETURN` value to leave PendSV with
    pub exc_return: u32,
}

impl SoftwareFrame {
    /// How many words this frame takes up
    pub const WORDS: usize = 9;

    fn to_words(self) -> [u32; Self::WORDS] {
        let r = self.r4_r11;
        [r[0], r[1], r[2], r[3], r[4], r[5], r[6], r[7], self.exc_return]
    }

    /// Stack this frame below `sp`, returning the new stack pointer
    ///
    /// # Safety
    ///
    /// There must be [`Self::WORDS`] free words below `sp`.
    pub unsafe fn push(self, sp: *mut u32) -> *mut u32 {
        // SAFETY: passed on to our caller
        let mut pusher = unsafe { StackPusher::new(sp) };
        pusher.push_block(&self.to_words());
        pusher.current()
    }

    /// Unstack a frame from `sp`, returning it and the new stack pointer
    ///
    /// # Safety
    ///
    /// `sp` must point at a frame previously stacked with [`Self::push`].
    pub unsafe fn pop(sp: *mut u32) -> (SoftwareFrame, *mut u32) {
        // SAFETY: passed on to our caller
        unsafe { (sp.cast::<SoftwareFrame>().read_volatile(), sp.add(Self::WORDS)) }
    }
}

/// The registers the hardware stacks on exception entry, and unstacks on
/// exception return (a 'basic' frame - we never have FPU state)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HardwareFrame {
    /// Argument registers r0 to r3
    pub r0_r3: [u32; 4],
    /// Scratch register
    pub r12: u32,
    /// Link register
    pub lr: u32,
    /// Where the task resumes
    pub pc: u32,
    /// Program status register
    pub xpsr: u32,
}

impl HardwareFrame {
    /// How many words this frame takes up
    pub const WORDS: usize = 8;

    fn to_words(self) -> [u32; Self::WORDS] {
        let r = self.r0_r3;
        [r[0], r[1], r[2], r[3], self.r12, self.lr, self.pc, self.xpsr]
    }

    /// Stack this frame below `sp`, returning the new stack pointer
    ///
    /// # Safety
    ///
    /// There must be [`Self::WORDS`] free words below `sp`.
    pub unsafe fn push(self, sp: *mut u32) -> *mut u32 {
        // SAFETY: passed on to our caller
        let mut pusher = unsafe { StackPusher::new(sp) };
        pusher.push_block(&self.to_words());
        pusher.current()
    }

    /// Unstack a frame from `sp`, returning it and the new stack pointer
    ///
    /// # Safety
    ///
    /// `sp` must point at a frame previously stacked with [`Self::push`].
    pub unsafe fn pop(sp: *mut u32) -> (HardwareFrame, *mut u32) {
        // SAFETY: passed on to our caller
        unsafe { (sp.cast::<HardwareFrame>().read_volatile(), sp.add(Self::WORDS)) }
    }
}

/// Everything we need to resume a task
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SavedContext {
    /// Lower half, handled by PendSV
    pub software: SoftwareFrame,
    /// Upper half, handled by exception entry and return
    pub hardware: HardwareFrame,
}

const _: () = assert!(core::mem::size_of::<SavedContext>() == FRAME_SIZE);

impl SavedContext {
    /// The value of the Processor Status Register when a task starts
    ///
    /// The only bit we need to set is the T bit, to indicate that the
    /// task should run in Thumb mode (the only supported mode on M-profile)
    pub const DEFAULT_XPSR: u32 = 1 << 24;

    /// Return to Thread Mode, on the Process Stack, with no FPU state
    pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

    /// The context of a task that has never run
    ///
    /// Every general purpose register is zero, and exception return will
    /// branch to `entry` in Thumb state on the process stack.
    pub const fn initial(entry: u32) -> SavedContext {
        SavedContext {
            software: SoftwareFrame {
                r4_r11: [0; 8],
                exc_return: Self::EXC_RETURN_THREAD_PSP,
            },
            hardware: HardwareFrame {
                r0_r3: [0; 4],
                r12: 0,
                lr: 0,
                pc: entry,
                xpsr: Self::DEFAULT_XPSR,
            },
        }
    }

    /// Stack the whole context below `stack_top`, hardware half first
    ///
    /// Returns the lowest address used, which is where the task's stack
    /// pointer must be left.
    ///
    /// # Safety
    ///
    /// There must be [`FRAME_WORDS`] free words below `stack_top`.
    pub unsafe fn push(self, stack_top: *mut u32) -> *mut u32 {
        // SAFETY: passed on to our caller
        unsafe {
            let sp = self.hardware.push(stack_top);
            self.software.push(sp)
        }
    }

    /// Read back a context stacked by [`Self::push`]
    ///
    /// Returns the context, and the stack pointer as it was before the
    /// context was pushed.
    ///
    /// # Safety
    ///
    /// `sp` must point at a whole, valid, saved context.
    pub unsafe fn pop(sp: *mut u32) -> (SavedContext, *mut u32) {
        // SAFETY: passed on to our caller
        unsafe {
            let (software, sp) = SoftwareFrame::pop(sp);
            let (hardware, sp) = HardwareFrame::pop(sp);
            (SavedContext { software, hardware }, sp)
        }
    }
}


// End of File
