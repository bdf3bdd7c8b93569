//! Contains the [`Scheduler`] type

// Copyright (c) 2025 Ferrous Systems
// SPDX-License-Identifier: GPL-3.0-or-later

use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering};

use crate::{Stack, Task, TaskState};

/// The location of our one and only running [`Scheduler`] object.
///
/// We need this so that the free-standing SysTick and PendSV handlers know
/// where all our system state is.
pub(crate) static SCHEDULER_PTR: AtomicPtr<Scheduler> = AtomicPtr::new(core::ptr::null_mut());

/// Identifies a task slot in the scheduler
///
/// Slot zero is always the idle task. Your tasks are numbered from one, in
/// the order you gave them to [`Scheduler::new`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskId(usize);

impl TaskId {
    /// The idle task, which runs when nothing else can
    pub const IDLE: TaskId = TaskId(0);

    /// Create a Task ID from a slot index
    pub const fn new(index: usize) -> TaskId {
        TaskId(index)
    }

    /// The slot index of this task
    pub const fn index(self) -> usize {
        self.0
    }

    /// Is this the idle task?
    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

#[cfg(target_os = "none")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "T{=usize:03}", self.0);
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(fmt, "T{:03}", self.0)
    }
}

/// The body of the idle task
fn idle_task() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// A pre-emptive, round-robin task-switching scheduler
///
/// Every tick, the next ready task after the current one gets the CPU. Tasks
/// give up the rest of their turn by calling [`crate::delay`]. When every
/// task is blocked, the built-in idle task runs.
///
/// The Arm hardware will push {xPSR, PC, LR, R12, R3, R2, R1, R0} to PSP when
/// an exception occurs. PendSV then pushes the rest (R11 to R4, plus
/// EXC_RETURN) - see [`SavedContext`](crate::SavedContext).
#[repr(C)]
pub struct Scheduler {
    /// Set by the first context switch. Until then, there is no task context
    /// for PendSV to save.
    running: AtomicBool,
    /// Mirrors the PendSV pending bit
    switch_pending: AtomicBool,
    /// Which task is currently running (or about to run)
    current_task: AtomicUsize,
    /// Current tick count. Wraps.
    ticks: AtomicU32,
    /// How many times a context switch has been asked for
    switch_requests: AtomicU32,
    /// Slot zero - never blocks
    idle: Task,
    /// A fixed, static list of all our other tasks
    task_list: &'static [Task],
}

impl Scheduler {
    /// The offset, in bytes, to the `running` field
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub(crate) const RUNNING_OFFSET: usize = core::mem::offset_of!(Scheduler, running);

    /// Build the scheduler
    ///
    /// Your tasks become slots `1..=task_list.len()`. The idle task gets
    /// slot 0, and runs on `idle_stack`.
    pub const fn new<const N: usize>(
        task_list: &'static [Task],
        idle_stack: &'static Stack<N>,
    ) -> Scheduler {
        // Nothing to schedule without at least one task
        assert!(!task_list.is_empty());
        Scheduler {
            running: AtomicBool::new(false),
            switch_pending: AtomicBool::new(false),
            current_task: AtomicUsize::new(TaskId::IDLE.0),
            ticks: AtomicU32::new(0),
            switch_requests: AtomicU32::new(0),
            idle: Task::new(idle_task, idle_stack),
            task_list,
        }
    }

    /// Run the scheduler
    ///
    /// You may only call this once, and you should call it from `fn main()`
    /// once all your hardware is configured. We should be in Privileged
    /// Thread mode on the Main stack.
    ///
    /// `systicks_per_sched_tick` sets the tick period, in processor clock
    /// cycles.
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub fn start(
        &'static self,
        mut scb: cortex_m::peripheral::SCB,
        mut syst: cortex_m::peripheral::SYST,
        systicks_per_sched_tick: u32,
    ) -> ! {
        if self.running.load(Ordering::SeqCst) || !SCHEDULER_PTR.load(Ordering::SeqCst).is_null()
        {
            panic!("Tried to re-start scheduler!");
        }

        // remember where this object is - it's 'static so it cannot move
        let self_addr = self as *const Scheduler as *mut Scheduler;
        info!("Scheduler @ {=usize:08x}", self_addr as usize);
        SCHEDULER_PTR.store(self_addr, Ordering::Release);

        // Must do this before SysTick starts, because every tick pends a
        // switch and the switch expects each task to have a frame
        self.init_frames();

        crate::arch::configure_exceptions(&mut scb);
        crate::arch::configure_systick(&mut syst, systicks_per_sched_tick);

        // Fire the PendSV exception - the PendSV handler will select a task
        // to run and run it
        debug!("Hit PendSV");
        self.request_switch();
        // flush the pipeline to ensure the PendSV fires before we reach the end of this function
        cortex_m::asm::isb();
        // impossible to get here
        unreachable!();
    }

    /// Give every task, including idle, a fresh initial context
    #[cfg_attr(not(any(test, target_os = "none")), allow(dead_code))]
    pub(crate) fn init_frames(&self) {
        for (task_id, task) in self.iter() {
            info!(
                "Init task frame {}, with stack @ 0x{=usize:08x}",
                task_id,
                task.stack() as usize
            );

            // SAFETY: The task constructor does not let us make tasks with
            // stacks that are too small, and no task is running yet.
            unsafe {
                task.init_frame();
            }

            debug!(
                "Fini task frame {}, with stack @ 0x{=usize:08x}",
                task_id,
                task.stack() as usize
            );
        }
    }

    /// Call once per tick, from the SysTick handler
    ///
    /// Advances the tick count, readies any task waiting for exactly this
    /// tick, and always asks for a context switch.
    pub fn sched_tick(&self) {
        // Only this handler writes `ticks`, so a load and a store is enough
        let now = self.ticks.load(Ordering::Relaxed).wrapping_add(1);
        self.ticks.store(now, Ordering::Relaxed);
        trace!("Tick {=u32}", now);

        for (task_id, task) in self.iter().skip(1) {
            if task.unblock_if_due(now) {
                debug!("{} ready", task_id);
            }
        }

        self.request_switch();
    }

    /// Block the current task for `ticks` ticks, and switch away from it
    ///
    /// Only call this from a task - never from an interrupt handler. The task
    /// picks up where it left off once the tick count has reached
    /// `now() + ticks` and its turn comes around. The wake-up tick has to be
    /// hit exactly, so a delay of zero sleeps until the tick count wraps back
    /// round to `now()`. The idle task never blocks, so calling this from the
    /// idle task does nothing.
    pub fn delay(&self, ticks: u32) {
        critical_section::with(|_cs| {
            let task_id = self.current_task_id();
            if task_id.is_idle() {
                return;
            }
            let until = self.now().wrapping_add(ticks);
            trace!("- {} blocked until {=u32}", task_id, until);
            self.task(task_id).block(until);
            self.request_switch();
        });
        // The switch happens here, once interrupts are back on. By the time
        // we get past this line, it is our turn again.
    }

    /// Pick the task that should run after `current`
    ///
    /// Looks at each slot once, starting with the one after `current` and
    /// wrapping around, and returns the first ready task that isn't idle. If
    /// there isn't one, returns [`TaskId::IDLE`]. A `current` that is out of
    /// range is taken modulo the number of slots.
    pub fn select_next(&self, current: TaskId) -> TaskId {
        let num_tasks = self.num_tasks();
        let current = current.0 % num_tasks;
        // Go through all the tasks. We start with the one after the
        // current task, so we don't keep picking the same task.
        for mut idx in (current + 1)..=(current + num_tasks) {
            // do the wrap-around
            while idx >= num_tasks {
                idx -= num_tasks;
            }
            let task_id = TaskId(idx);
            if !task_id.is_idle() && self.task(task_id).state() == TaskState::Ready {
                return task_id;
            }
        }
        TaskId::IDLE
    }

    /// The body of the PendSV handler
    ///
    /// `saved_sp` is where the outgoing task's [`SavedContext`] was stacked
    /// (ignored on the very first switch, when there is no outgoing task).
    /// Picks the next task, makes it current and returns its stack pointer,
    /// from which PendSV unstacks the incoming context.
    ///
    /// [`SavedContext`]: crate::SavedContext
    ///
    /// # Safety
    ///
    /// Call only from the context switch handler (or a model of it), with a
    /// pointer to a complete saved context on the current task's stack.
    pub unsafe fn switch_context(&self, saved_sp: *mut u32) -> *mut u32 {
        self.switch_pending.store(false, Ordering::Relaxed);
        let outgoing = self.current_task_id();
        if self.running.load(Ordering::Relaxed) {
            // SAFETY: our caller promised saved_sp points at a full context
            unsafe { self.task(outgoing).set_stack(saved_sp) };
        } else {
            self.running.store(true, Ordering::Relaxed);
        }
        let incoming = self.select_next(outgoing);
        trace!("< switch {} -> {}", outgoing, incoming);
        self.current_task.store(incoming.0, Ordering::Relaxed);
        self.task(incoming).stack()
    }

    /// Ask for a context switch
    ///
    /// Asking again before the switch has happened makes no difference.
    /// Callers are either the SysTick handler or inside a critical section,
    /// so the counter doesn't need a read-modify-write atomic.
    pub(crate) fn request_switch(&self) {
        let requests = self.switch_requests.load(Ordering::Relaxed);
        self.switch_requests
            .store(requests.wrapping_add(1), Ordering::Relaxed);
        self.switch_pending.store(true, Ordering::Relaxed);
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        crate::arch::pend_switch();
    }

    /// Get current tick count
    pub fn now(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Get the current Task ID
    pub fn current_task_id(&self) -> TaskId {
        TaskId(self.current_task.load(Ordering::Relaxed))
    }

    /// How many slots there are, including the idle task
    pub fn num_tasks(&self) -> usize {
        self.task_list.len() + 1
    }

    /// Has the first context switch happened yet?
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Is there a context switch waiting to happen?
    pub fn switch_pending(&self) -> bool {
        self.switch_pending.load(Ordering::Relaxed)
    }

    /// How many context switches have been requested, in total
    pub fn switch_requests(&self) -> u32 {
        self.switch_requests.load(Ordering::Relaxed)
    }

    /// Get the state of a task, if the ID is valid
    pub fn task_state(&self, task_id: TaskId) -> Option<TaskState> {
        self.get_task(task_id).map(Task::state)
    }

    /// How much of a task's stack has never been touched, in bytes
    pub fn unused_stack(&self, task_id: TaskId) -> Option<usize> {
        self.get_task(task_id).map(Task::unused_stack)
    }

    /// Look up a task by ID
    pub fn get_task(&self, task_id: TaskId) -> Option<&Task> {
        match task_id.0 {
            0 => Some(&self.idle),
            idx => self.task_list.get(idx - 1),
        }
    }

    /// Look up a task we know exists
    fn task(&self, task_id: TaskId) -> &Task {
        match task_id.0 {
            0 => &self.idle,
            idx => &self.task_list[idx - 1],
        }
    }

    /// All the tasks, idle first
    fn iter(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        core::iter::once(&self.idle)
            .chain(self.task_list.iter())
            .enumerate()
            .map(|(idx, task)| (TaskId(idx), task))
    }

    /// Get the handle to the global scheduler
    pub(crate) fn get_scheduler() -> Option<&'static Scheduler> {
        // Get our stashed pointer
        let scheduler_ptr = SCHEDULER_PTR.load(Ordering::Relaxed);
        // Are we initialised?
        if scheduler_ptr.is_null() {
            None
        } else {
            // SAFETY: Only [`Scheduler::start`] writes to [`SCHEDULER_PTR`] and it
            // always sets it to be a valid pointer to a [`Scheduler`] that does not
            // move.
            Some(unsafe { &*scheduler_ptr })
        }
    }
}

/// Called from the PendSV handler, between stacking one task and unstacking
/// the next
///
/// Takes the stack pointer of the task we are leaving and returns the stack
/// pointer of the task to resume. If no scheduler has been started there is
/// nothing to switch to, so we hand back `saved_sp` untouched.
///
/// # Safety
///
/// Only the PendSV handler may call this.
#[cfg_attr(not(any(test, target_os = "none")), allow(dead_code))]
pub(crate) unsafe extern "C" fn switch_from_trap(saved_sp: *mut u32) -> *mut u32 {
    match Scheduler::get_scheduler() {
        // SAFETY: the assembly stacked a full context at saved_sp
        Some(scheduler) => unsafe { scheduler.switch_context(saved_sp) },
        None => saved_sp,
    }
}


// End of File
