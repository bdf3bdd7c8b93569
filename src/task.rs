//! Holds the [`Task`] type and methods

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

use crate::{MIN_STACK_SIZE, SavedContext, Stack};

/// The body of a task. It must never return.
pub type TaskEntryFn = fn() -> !;

/// Whether the scheduler may pick a task
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum TaskState {
    /// Can run whenever its turn comes around
    Ready,
    /// Waiting for a particular tick
    Blocked,
}

/// What we paint unused stack with, so we can see how much got used
const STACK_PAINT: u32 = 0xDEAD_C0DE;

/// Represents a task that the scheduler is managing
pub struct Task {
    /// Where this task's saved context lives, while it isn't running
    stack: AtomicPtr<u32>,
    /// The tick on which a blocked task becomes ready again
    block_until: AtomicU32,
    /// Set while the task waits for `block_until`
    blocked: AtomicBool,
    /// The top of this task's stack region
    stack_top: *mut u32,
    /// The size of this task's stack region, in 32-bit words
    stack_words: usize,
    entry_fn: TaskEntryFn,
}

impl Task {
    /// Create a new [`Task`] object
    ///
    /// Panics (at compile time, in a `static`) if the stack cannot hold a
    /// saved context.
    pub const fn new<const N: usize>(entry_fn: TaskEntryFn, stack: &Stack<N>) -> Task {
        assert!(N >= MIN_STACK_SIZE);
        Task {
            entry_fn,
            stack: AtomicPtr::new(stack.top()),
            block_until: AtomicU32::new(0),
            blocked: AtomicBool::new(false),
            stack_top: stack.top(),
            stack_words: N / 4,
        }
    }

    /// Get the initial entry function for this task
    pub const fn entry_fn(&self) -> TaskEntryFn {
        self.entry_fn
    }

    /// Get the current stack pointer for this task
    pub fn stack(&self) -> *mut u32 {
        self.stack.load(Ordering::Relaxed)
    }

    /// Set the current stack pointer for this task
    ///
    /// # Safety
    ///
    /// The task will execute using the stack given, so it must point to the
    /// last item in a valid Arm EABI stack, with a full [`SavedContext`]
    /// proceeding it.
    pub unsafe fn set_stack(&self, new_stack: *mut u32) {
        self.stack.store(new_stack, Ordering::Relaxed)
    }

    /// Get the top of this task's stack region
    pub fn stack_top(&self) -> *mut u32 {
        self.stack_top
    }

    /// Can this task be scheduled right now?
    pub fn state(&self) -> TaskState {
        if self.blocked.load(Ordering::Relaxed) {
            TaskState::Blocked
        } else {
            TaskState::Ready
        }
    }

    /// The tick this task is waiting for
    ///
    /// Only meaningful while the task is [`TaskState::Blocked`].
    pub fn block_until(&self) -> u32 {
        self.block_until.load(Ordering::Relaxed)
    }

    /// Block this task until the tick counter reads `tick`
    pub(crate) fn block(&self, tick: u32) {
        self.block_until.store(tick, Ordering::Relaxed);
        self.blocked.store(true, Ordering::Relaxed);
    }

    /// Make this task ready, if it is blocked until exactly `now`
    ///
    /// Returns `true` if the task was woken. A task whose tick has been
    /// missed stays blocked.
    pub(crate) fn unblock_if_due(&self, now: u32) -> bool {
        if self.blocked.load(Ordering::Relaxed) && self.block_until.load(Ordering::Relaxed) == now
        {
            self.blocked.store(false, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Paint the stack, then build the context this task starts from
    ///
    /// Leaves the task [`TaskState::Ready`], with its stack pointer at the
    /// bottom of a [`SavedContext::initial`] frame.
    ///
    /// # Safety
    ///
    /// The task must not be running, and nothing else may be using its stack.
    pub(crate) unsafe fn init_frame(&self) {
        let bottom = self.stack_top.wrapping_sub(self.stack_words);
        for idx in 0..self.stack_words {
            // SAFETY: every word between bottom and top belongs to our Stack
            unsafe { bottom.add(idx).write_volatile(STACK_PAINT) };
        }
        self.blocked.store(false, Ordering::Relaxed);
        let entry = self.entry_fn as usize as u32;
        // SAFETY: `new` checked the stack can hold a whole frame
        unsafe {
            let sp = SavedContext::initial(entry).push(self.stack_top);
            self.set_stack(sp);
        }
    }

    /// How many bytes at the bottom of the stack have never been written
    ///
    /// This is only a hint - a task can skip over the paint without writing
    /// it, and nothing stops a task overflowing its stack.
    pub fn unused_stack(&self) -> usize {
        let bottom = self.stack_top.wrapping_sub(self.stack_words);
        let mut unused = 0;
        // SAFETY: every word between bottom and top belongs to our Stack
        while unused < self.stack_words
            && unsafe { bottom.add(unused).read_volatile() } == STACK_PAINT
        {
            unused += 1;
        }
        unused * 4
    }
}

/// SAFETY: The raw stack pointers are only dereferenced when the task is
/// initialised (before the scheduler runs) and when measuring the stack.
unsafe impl Sync for Task {}


// End of File
