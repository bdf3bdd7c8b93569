//! Four tasks, each reporting in and then sleeping for a different time
//!
//! Task 1 reports every 125 ticks, task 2 every 250, task 3 every 500 and
//! task 4 every 1000. With a 1 ms tick, that's 8 Hz, 4 Hz, 2 Hz and 1 Hz. In
//! between, the idle task runs.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

use robin::{Scheduler, Stack, Task};

use robin_demos as _;

/// The MPS2-AN386 runs at 25 MHz, so this is a 1 ms tick
const SYSTICKS_PER_SCHED_TICK: u32 = 25_000;

static TASK_LIST: [Task; 4] = [
    Task::new(task_1, &TASK_1_STACK),
    Task::new(task_2, &TASK_2_STACK),
    Task::new(task_3, &TASK_3_STACK),
    Task::new(task_4, &TASK_4_STACK),
];

static IDLE_STACK: Stack<256> = Stack::new();

static SCHEDULER: Scheduler = Scheduler::new(&TASK_LIST, &IDLE_STACK);

#[cortex_m_rt::entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    defmt::info!("Hello!");
    SCHEDULER.start(cp.SCB, cp.SYST, SYSTICKS_PER_SCHED_TICK);
}

static TASK_1_STACK: Stack<1024> = Stack::new();

/// Reports eight times a second
fn task_1() -> ! {
    loop {
        defmt::info!("This is task 1");
        robin::delay(125);
    }
}

static TASK_2_STACK: Stack<1024> = Stack::new();

/// Reports four times a second
fn task_2() -> ! {
    loop {
        defmt::info!("This is task 2");
        robin::delay(250);
    }
}

static TASK_3_STACK: Stack<1024> = Stack::new();

/// Reports twice a second
fn task_3() -> ! {
    loop {
        defmt::info!("This is task 3");
        robin::delay(500);
    }
}

static TASK_4_STACK: Stack<1024> = Stack::new();

/// Reports once a second, along with how much stack everyone has left
fn task_4() -> ! {
    loop {
        defmt::info!("This is task 4");
        for idx in 0..SCHEDULER.num_tasks() {
            let task_id = robin::TaskId::new(idx);
            if let Some(unused) = SCHEDULER.unused_stack(task_id) {
                defmt::debug!("{} has {=usize} bytes of stack unused", task_id, unused);
            }
        }
        robin::delay(1000);
    }
}

// End of File
