use crate::address::Address;
use crate::task::Task;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

struct Remembered {
    task: Arc<Task>,
    dependants: HashSet<Address>,
}

/// Tasks that were started in the background and must be torn down once every task that
/// depends on them is done.
#[derive(Default)]
pub struct TaskRememberer {
    remembered: Mutex<Vec<Remembered>>,
}

impl TaskRememberer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `task` is to be torn down once all of `dependants` are done.
    pub fn remember<I>(&self, task: Arc<Task>, dependants: I)
    where
        I: IntoIterator<Item = Address>,
    {
        let dependants = dependants.into_iter().collect();
        self.remembered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Remembered { task, dependants });
    }

    /// Mark `address` as done and release every remembered task that has no unfinished
    /// dependants left.
    pub fn done(&self, address: &Address) -> Vec<Arc<Task>> {
        let mut remembered = self.remembered.lock().unwrap_or_else(PoisonError::into_inner);
        let mut released = Vec::new();
        let mut kept = Vec::new();
        for mut entry in remembered.drain(..) {
            entry.dependants.remove(address);
            if entry.dependants.is_empty() {
                released.push(entry.task);
            } else {
                kept.push(entry);
            }
        }
        *remembered = kept;
        released
    }

    /// Release everything that is still remembered.
    pub fn forget_all(&self) -> Vec<Arc<Task>> {
        self.remembered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .map(|entry| entry.task)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.remembered.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TaskRememberer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRememberer").field("remembered", &self.len()).finish()
    }
}
