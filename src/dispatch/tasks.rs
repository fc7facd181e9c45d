//! Deferred continuations.
//!
//! Work that must not run inside the current loop iteration is queued here
//! and drained by the connection before control returns to the event source.

use std::collections::VecDeque;

use crate::dispatch::dispatch_loop::Invocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Re-enter the dispatch loop as the entry that scheduled it.
    Resume(Invocation),
    /// Run the finalize-and-notify step, then re-enter the loop.
    FinalizeDrain,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn next(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task: Task) -> bool {
        self.tasks.contains(&task)
    }
}
