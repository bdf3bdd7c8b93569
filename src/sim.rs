//! A host-side model of the parts of a Cortex-M core the scheduler relies on
//!
//! [`Cpu`] stands in for the register file, the process stack pointer and the
//! NVIC. It takes SysTick and PendSV the way the hardware would: SysTick runs
//! to completion, then a pending PendSV runs once, however many times it was
//! requested. Exception entry and return stack and unstack a
//! [`HardwareFrame`], and our model of the PendSV handler does the
//! [`SoftwareFrame`] half, exactly as the assembly versions do.

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::{HardwareFrame, Scheduler, SoftwareFrame, Stack, Task, TaskEntryFn, TaskId};

fn rabbits() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

fn hamsters() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

fn cats() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

fn dogs() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Entry points for the test tasks, in slot order from slot 1
pub(crate) const ENTRIES: [TaskEntryFn; 4] = [rabbits, hamsters, cats, dogs];

/// Stack size for the test tasks
pub(crate) const TEST_STACK: usize = 512;

/// Build a scheduler with `count` tasks that lives for the rest of the test
pub(crate) fn leaked_scheduler(count: usize) -> &'static Scheduler {
    let tasks: Vec<Task> = ENTRIES
        .iter()
        .cycle()
        .take(count)
        .map(|entry| {
            let stack: &'static Stack<TEST_STACK> = Box::leak(Box::new(Stack::new()));
            Task::new(*entry, stack)
        })
        .collect();
    let tasks: &'static [Task] = tasks.leak();
    let idle_stack: &'static Stack<TEST_STACK> = Box::leak(Box::new(Stack::new()));
    Box::leak(Box::new(Scheduler::new(tasks, idle_stack)))
}

/// The registers a task can see
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Registers {
    pub(crate) r0_r3: [u32; 4],
    pub(crate) r4_r11: [u32; 8],
    pub(crate) r12: u32,
    pub(crate) lr: u32,
    pub(crate) pc: u32,
    pub(crate) xpsr: u32,
}

impl Registers {
    /// What exception entry stacks
    fn hardware_frame(&self) -> HardwareFrame {
        HardwareFrame {
            r0_r3: self.r0_r3,
            r12: self.r12,
            lr: self.lr,
            pc: self.pc,
            xpsr: self.xpsr,
        }
    }

    /// What exception return unstacks
    fn load_hardware_frame(&mut self, frame: HardwareFrame) {
        self.r0_r3 = frame.r0_r3;
        self.r12 = frame.r12;
        self.lr = frame.lr;
        self.pc = frame.pc;
        self.xpsr = frame.xpsr;
    }
}

/// A single core, running the scheduler
pub(crate) struct Cpu {
    pub(crate) regs: Registers,
    /// Process stack pointer
    psp: *mut u32,
    /// The EXC_RETURN value the hardware puts in LR on exception entry
    exc_return: u32,
    /// How many times PendSV has actually run
    pub(crate) pendsv_runs: u32,
    /// The SysTick pending bit
    systick_pending: bool,
    scheduler: &'static Scheduler,
}

impl Cpu {
    /// Do what [`Scheduler::start`] does, minus the peripherals
    pub(crate) fn launch(scheduler: &'static Scheduler) -> Cpu {
        scheduler.init_frames();
        let mut cpu = Cpu {
            regs: Registers::default(),
            psp: core::ptr::null_mut(),
            // Thread mode on the main stack, which is where `start` runs
            exc_return: 0xFFFF_FFF9,
            pendsv_runs: 0,
            systick_pending: false,
            scheduler,
        };
        scheduler.request_switch();
        cpu.service_pending();
        cpu
    }

    /// The SysTick timer reaches zero
    ///
    /// The handler doesn't run until [`Cpu::service_pending`].
    pub(crate) fn pend_systick(&mut self) {
        self.systick_pending = true;
    }

    /// Run the SysTick handler, with nothing else pending
    ///
    /// Any switch it asks for stays pending until [`Cpu::service_pending`].
    pub(crate) fn systick(&mut self) {
        self.scheduler.sched_tick();
    }

    /// Take pending exceptions until there are none left
    ///
    /// PendSV and SysTick share a priority, so neither pre-empts the other,
    /// and when both are pending the lower exception number (PendSV, 14) goes
    /// before SysTick (15).
    pub(crate) fn service_pending(&mut self) {
        loop {
            if self.scheduler.switch_pending() {
                self.pendsv();
            } else if self.systick_pending {
                self.systick_pending = false;
                self.systick();
            } else {
                break;
            }
        }
    }

    /// A timer tick, followed by whatever switch it asked for
    pub(crate) fn tick(&mut self) {
        self.pend_systick();
        self.service_pending();
    }

    /// The current task calls [`Scheduler::delay`]
    ///
    /// The switch it asks for happens as soon as the critical section ends.
    pub(crate) fn delay(&mut self, ticks: u32) {
        self.scheduler.delay(ticks);
        self.service_pending();
    }

    /// The process stack pointer
    pub(crate) fn psp(&self) -> *mut u32 {
        self.psp
    }

    /// Take the PendSV exception
    fn pendsv(&mut self) {
        self.pendsv_runs += 1;
        let saved_sp = if self.scheduler.is_running() {
            // SAFETY: a running task always has room for its context
            unsafe {
                let sp = self.regs.hardware_frame().push(self.psp);
                SoftwareFrame {
                    r4_r11: self.regs.r4_r11,
                    exc_return: self.exc_return,
                }
                .push(sp)
            }
        } else {
            self.psp
        };

        // SAFETY: saved_sp holds a whole context, if there is a running task
        let next_sp = unsafe { self.scheduler.switch_context(saved_sp) };

        // SAFETY: every task's stack pointer points at a whole context
        unsafe {
            let (software, sp) = SoftwareFrame::pop(next_sp);
            self.regs.r4_r11 = software.r4_r11;
            assert_eq!(
                software.exc_return, 0xFFFF_FFFD,
                "must return to thread mode on the process stack"
            );
            let (hardware, sp) = HardwareFrame::pop(sp);
            self.regs.load_hardware_frame(hardware);
            self.psp = sp;
        }
        // Back in thread mode, on the process stack
        self.exc_return = 0xFFFF_FFFD;
    }

    /// Which task is running
    pub(crate) fn current(&self) -> TaskId {
        self.scheduler.current_task_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FRAME_SIZE, SavedContext, TaskState};

    fn entry_addr(slot: usize) -> u32 {
        ENTRIES[slot - 1] as usize as u32
    }

    /// Run each ready task's body once - every body blocks straight away
    fn run_bodies(cpu: &mut Cpu, delays: &[u32]) {
        while !cpu.current().is_idle() {
            let delay = delays[cpu.current().index() - 1];
            cpu.delay(delay);
        }
    }

    #[test]
    fn every_task_gets_an_initial_frame() {
        let sched = leaked_scheduler(4);
        sched.init_frames();
        for slot in 0..sched.num_tasks() {
            let task = sched.get_task(TaskId::new(slot)).unwrap();
            assert_eq!(task.stack(), task.stack_top().wrapping_byte_sub(FRAME_SIZE));
            let (ctx, _) = unsafe { SavedContext::pop(task.stack()) };
            assert_eq!(ctx.hardware.pc, task.entry_fn() as usize as u32);
            assert_eq!(ctx.hardware.xpsr & (1 << 24), 1 << 24);
            assert_eq!(ctx.software.exc_return, 0xFFFF_FFFD);
            assert_eq!(task.state(), TaskState::Ready);
        }
    }

    #[test]
    fn launch_enters_first_task() {
        let sched = leaked_scheduler(4);
        let cpu = Cpu::launch(sched);
        assert!(sched.is_running());
        assert_eq!(cpu.current(), TaskId::new(1));
        assert_eq!(cpu.regs.pc, entry_addr(1));
        assert_eq!(cpu.regs.xpsr, SavedContext::DEFAULT_XPSR);
        assert_eq!(cpu.regs.r0_r3, [0; 4]);
        assert_eq!(cpu.regs.r4_r11, [0; 8]);
        assert_eq!((cpu.regs.r12, cpu.regs.lr), (0, 0));
        // The whole frame has been consumed
        let task = sched.get_task(TaskId::new(1)).unwrap();
        assert_eq!(cpu.psp(), task.stack_top());
        assert!(!sched.switch_pending());
    }

    #[test]
    fn each_tick_rotates_through_ready_tasks() {
        let sched = leaked_scheduler(4);
        let mut cpu = Cpu::launch(sched);
        let mut order = vec![cpu.current().index()];
        for _ in 0..8 {
            cpu.tick();
            order.push(cpu.current().index());
        }
        assert_eq!(order, [1, 2, 3, 4, 1, 2, 3, 4, 1]);
        assert_eq!(sched.now(), 8);
    }

    #[test]
    fn switching_preserves_registers() {
        let sched = leaked_scheduler(3);
        let mut cpu = Cpu::launch(sched);
        let mut snapshots = Vec::new();
        // Let each task 'run' and leave its own pattern in every register
        for slot in 1..=3u32 {
            assert_eq!(cpu.current().index() as u32, slot);
            cpu.regs.r0_r3 = [slot, slot + 1, slot + 2, slot + 3];
            cpu.regs.r4_r11 = core::array::from_fn(|i| slot * 100 + i as u32);
            cpu.regs.r12 = slot * 1000 + 12;
            cpu.regs.lr = slot * 1000 + 14;
            cpu.regs.pc = entry_addr(slot as usize) + 0x20;
            cpu.regs.xpsr = SavedContext::DEFAULT_XPSR | slot;
            snapshots.push(cpu.regs);
            cpu.tick();
        }
        // Round again - every task comes back exactly as it left
        for snapshot in snapshots {
            assert_eq!(cpu.regs, snapshot);
            cpu.tick();
        }
    }

    #[test]
    fn delay_switches_away_and_comes_back() {
        let sched = leaked_scheduler(2);
        let mut cpu = Cpu::launch(sched);
        cpu.regs.r4_r11[0] = 0xCAFE;
        cpu.delay(3);
        // T1 is blocked, so T2 runs, and keeps running as T1 is not ready
        assert_eq!(cpu.current(), TaskId::new(2));
        cpu.tick();
        assert_eq!(cpu.current(), TaskId::new(2));
        cpu.tick();
        assert_eq!(cpu.current(), TaskId::new(2));
        cpu.tick();
        assert_eq!(sched.now(), 3);
        assert_eq!(cpu.current(), TaskId::new(1));
        assert_eq!(cpu.regs.r4_r11[0], 0xCAFE);
    }

    #[test]
    fn delay_wakes_on_exact_tick() {
        let sched = leaked_scheduler(2);
        let mut cpu = Cpu::launch(sched);
        for _ in 0..7 {
            cpu.tick();
        }
        // Make sure T1 is the one calling delay
        while cpu.current() != TaskId::new(1) {
            cpu.tick();
        }
        let start = sched.now();
        cpu.delay(5);
        let t1 = TaskId::new(1);
        for _ in 1..5 {
            cpu.tick();
            assert_eq!(sched.task_state(t1), Some(TaskState::Blocked));
            assert_ne!(cpu.current(), t1);
        }
        cpu.systick();
        assert_eq!(sched.now(), start + 5);
        assert_eq!(sched.task_state(t1), Some(TaskState::Ready));
    }

    #[test]
    fn all_blocked_runs_idle() {
        let sched = leaked_scheduler(4);
        let mut cpu = Cpu::launch(sched);
        run_bodies(&mut cpu, &[10, 10, 10, 10]);
        assert_eq!(cpu.current(), TaskId::IDLE);
        assert_eq!(cpu.regs.pc, sched.get_task(TaskId::IDLE).unwrap().entry_fn() as usize as u32);
        // Idle can't block
        cpu.delay(5);
        assert_eq!(cpu.current(), TaskId::IDLE);
        assert_eq!(sched.task_state(TaskId::IDLE), Some(TaskState::Ready));
        cpu.tick();
        assert_eq!(cpu.current(), TaskId::IDLE);
    }

    #[test]
    fn repeated_requests_switch_once() {
        let sched = leaked_scheduler(3);
        let mut cpu = Cpu::launch(sched);
        let runs = cpu.pendsv_runs;
        let requests = sched.switch_requests();
        // Three requests before interrupts come back on
        critical_section::with(|_cs| {
            sched.delay(4);
            sched.request_switch();
            sched.request_switch();
        });
        cpu.service_pending();
        assert_eq!(cpu.pendsv_runs, runs + 1);
        assert_eq!(sched.switch_requests(), requests + 3);
        assert_eq!(cpu.current(), TaskId::new(2));
    }

    #[test]
    fn pendsv_goes_before_a_pending_tick() {
        let sched = leaked_scheduler(3);
        let mut cpu = Cpu::launch(sched);
        let runs = cpu.pendsv_runs;
        // The timer expires while task 1 is blocking itself
        sched.delay(4);
        cpu.pend_systick();
        assert_eq!(sched.now(), 0);
        cpu.service_pending();
        // Task 1 was switched out at tick 0, then the tick rotated 2 -> 3
        assert_eq!(sched.now(), 1);
        assert_eq!(cpu.pendsv_runs, runs + 2);
        assert_eq!(cpu.current(), TaskId::new(3));
        assert_eq!(sched.task_state(TaskId::new(1)), Some(TaskState::Blocked));
        assert_eq!(sched.get_task(TaskId::new(1)).unwrap().block_until(), 4);
    }

    #[test]
    fn four_task_reference_system() {
        const DELAYS: [u32; 4] = [125, 250, 500, 1000];
        let sched = leaked_scheduler(4);
        let mut cpu = Cpu::launch(sched);
        let state = |slot| sched.task_state(TaskId::new(slot)).unwrap();

        // All four run at tick zero, then block
        run_bodies(&mut cpu, &DELAYS);
        assert_eq!(cpu.current(), TaskId::IDLE);
        for slot in 1..=4 {
            assert_eq!(state(slot), TaskState::Blocked);
        }

        while sched.now() < 124 {
            cpu.tick();
            assert_eq!(cpu.current(), TaskId::IDLE);
        }

        cpu.systick();
        assert_eq!(sched.now(), 125);
        assert_eq!(state(1), TaskState::Ready);
        assert_eq!(state(2), TaskState::Blocked);
        assert_eq!(state(3), TaskState::Blocked);
        assert_eq!(state(4), TaskState::Blocked);
        cpu.service_pending();
        assert_eq!(cpu.current(), TaskId::new(1));
        run_bodies(&mut cpu, &DELAYS);

        while sched.now() < 249 {
            cpu.tick();
            assert_eq!(cpu.current(), TaskId::IDLE);
        }

        cpu.systick();
        assert_eq!(sched.now(), 250);
        assert_eq!(state(1), TaskState::Ready);
        assert_eq!(state(2), TaskState::Ready);
        assert_eq!(state(3), TaskState::Blocked);
        assert_eq!(state(4), TaskState::Blocked);
        cpu.service_pending();
        assert_eq!(cpu.current(), TaskId::new(1));
        run_bodies(&mut cpu, &DELAYS);

        // Run on to tick 1000, counting how often each task gets a turn
        let mut turns = [0u32; 5];
        while sched.now() < 1000 {
            cpu.tick();
            while !cpu.current().is_idle() {
                let slot = cpu.current().index();
                turns[slot] += 1;
                cpu.delay(DELAYS[slot - 1]);
            }
            assert!(cpu.current().index() < sched.num_tasks());
        }
        // T1 wakes at 375, 500, 625, 750, 875 and 1000, T2 at 500, 750 and
        // 1000, T3 at 500 and 1000, and T4 only at 1000
        assert_eq!(turns, [0, 6, 3, 2, 1]);
        assert_eq!(sched.task_state(TaskId::IDLE), Some(TaskState::Ready));
    }
}

// End of File
