//! Background task spawning.
//!
//! Work that may block (recording service requests, the stdin reader) runs
//! off the session thread and reports back over channels only. The session
//! holds a boxed spawner, so tests can swap in one that defers tasks.

use std::thread;

/// A unit of work handed to a [`TaskSpawner`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskSpawner: Send {
    fn spawn(&self, task: Task);
}

/// Runs every task on a fresh named thread.
pub struct ThreadSpawner {
    name: String,
}

impl ThreadSpawner {
    pub fn new() -> Self {
        Self::named("synthwave-task")
    }

    pub fn named(name: &str) -> Self {
        ThreadSpawner {
            name: name.to_string(),
        }
    }
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, task: Task) {
        if let Err(e) = thread::Builder::new().name(self.name.clone()).spawn(task) {
            log::error!("Failed to spawn {} thread: {}", self.name, e);
        }
    }
}
