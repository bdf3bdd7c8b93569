//! # Robin
//!
//! A small, pre-emptive, round-robin task scheduler for single-core Arm
//! Cortex-M microcontrollers.
//!
//! You give the [`Scheduler`] a fixed list of [`Task`]s, each with its own
//! [`Stack`]. Every SysTick, the next ready task gets a turn. A task can give
//! up the rest of its turn, and sleep for a while, by calling [`delay`]. When
//! every task is asleep, a built-in idle task runs.
//!
//! ```rust,ignore
//! static SCHEDULER: Scheduler = Scheduler::new(
//!     {
//!         static TASK_LIST: [Task; 1] = [Task::new(rabbits, {
//!             static STACK: Stack<1024> = Stack::new();
//!             &STACK
//!         })];
//!         &TASK_LIST
//!     },
//!     {
//!         static STACK: Stack<256> = Stack::new();
//!         &STACK
//!     },
//! );
//!
//! fn rabbits() -> ! {
//!     loop {
//!         defmt::info!("Rabbit!");
//!         robin::delay(5);
//!     }
//! }
//! ```

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod arch;
mod context;
mod scheduler;
#[cfg(test)]
mod sim;
mod stack;
mod stack_pusher;
mod task;

pub use context::{
    FRAME_SIZE, FRAME_WORDS, HardwareFrame, MIN_STACK_SIZE, SavedContext, SoftwareFrame,
};
pub use scheduler::{Scheduler, TaskId};
pub use stack::Stack;
use stack_pusher::StackPusher;
pub use task::{Task, TaskEntryFn, TaskState};

/// Block the calling task for the given number of scheduler ticks
///
/// The task resumes on exactly tick `now() + ticks`, or as soon after as its
/// turn comes around. Does nothing if the scheduler isn't running, or if
/// called from the idle task.
pub fn delay(ticks: u32) {
    if let Some(scheduler) = Scheduler::get_scheduler() {
        scheduler.delay(ticks);
    }
}

/// Get the current time in ticks
pub fn now() -> u32 {
    match Scheduler::get_scheduler() {
        Some(scheduler) => scheduler.now(),
        None => 0xFFFF_FFFF,
    }
}

/// Get the ID of the running task, if the scheduler has been started
pub fn task_id() -> Option<TaskId> {
    Scheduler::get_scheduler().map(Scheduler::current_task_id)
}


// End of File
