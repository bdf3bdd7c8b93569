//! Holds the [`StackPusher`] type and methods

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

/// A helper for pushing words into a full-descending Arm EABI stack
pub(crate) struct StackPusher(*mut u32);

impl StackPusher {
    /// Make a new full-descending stack from the given pointer
    ///
    /// It will not write to the given pointer, but it will write immediately
    /// below it - because this is a Full Descending stack.
    ///
    /// # Safety
    ///
    /// There must be enough free space below the given pointer to accept all
    /// the items you are going to push.
    pub(crate) unsafe fn new(stack_top: *mut u32) -> StackPusher {
        StackPusher(stack_top)
    }

    /// Push one word onto the stack, moving the stack pointer down
    pub(crate) fn push(&mut self, value: u32) {
        // SAFETY: the caller of `new` promised us the space
        unsafe {
            self.0 = self.0.offset(-1);
            self.0.write_volatile(value);
        }
    }

    /// Push a block of words, so that `words[0]` ends up at the lowest address
    ///
    /// This matches what `stmdb sp!, {...}` does with a register list.
    pub(crate) fn push_block(&mut self, words: &[u32]) {
        for word in words.iter().rev() {
            self.push(*word);
        }
    }

    /// Get the current stack pointer
    pub(crate) fn current(&self) -> *mut u32 {
        self.0
    }
}


// End of File
