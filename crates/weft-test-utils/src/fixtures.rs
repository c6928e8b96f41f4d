//! Reusable task fixtures.
//!
//! - [`failing_task`] panics at chosen indices.
//! - [`erroring_task`] returns `Err` at chosen indices.
//! - [`Gate`] holds a task in Running until the test opens it.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use weft_sched::Task;

/// A view-less parallel-for over `0..domain` that panics at every index in
/// `fail_at`.
pub fn failing_task(label: &str, domain: usize, fail_at: &[usize]) -> Task {
    let fail_at = fail_at.to_vec();
    Task::parallel_for(label, domain, (), move |i, _| {
        if fail_at.contains(&i) {
            panic!("injected failure at {i}");
        }
    })
}

/// A view-less parallel-for over `0..domain` that returns `Err` at every
/// index in `fail_at`.
pub fn erroring_task(label: &str, domain: usize, fail_at: &[usize]) -> Task {
    let fail_at = fail_at.to_vec();
    Task::try_parallel_for(label, domain, (), move |i, _| {
        if fail_at.contains(&i) {
            Err(format!("rejected index {i}"))
        } else {
            Ok(())
        }
    })
}

/// A single task that sleeps for `duration`.
pub fn sleeping_task(label: &str, duration: Duration) -> Task {
    Task::single(label, (), move |_| std::thread::sleep(duration))
}

/// A latch that blocks tasks built from it until [`open`](Gate::open).
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

#[derive(Default)]
struct GateState {
    open: bool,
    entered: usize,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every blocked and future task through.
    pub fn open(&self) {
        let (lock, cond) = &*self.inner;
        lock.lock().unwrap().open = true;
        cond.notify_all();
    }

    /// Block until `n` tasks have entered the gate.
    pub fn wait_entered(&self, n: usize) {
        let (lock, cond) = &*self.inner;
        let mut state = lock.lock().unwrap();
        while state.entered < n {
            state = cond.wait(state).unwrap();
        }
    }

    fn pass(&self) {
        let (lock, cond) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.entered += 1;
        cond.notify_all();
        while !state.open {
            state = cond.wait(state).unwrap();
        }
    }

    /// A single view-less task that blocks until the gate opens.
    pub fn task(&self, label: &str) -> Task {
        let gate = self.clone();
        Task::single(label, (), move |_| gate.pass())
    }
}
