//! Transaction-scoped commit callback queue
//!
//! Callbacks registered during a save/delete run exactly once, only after
//! the enclosing transaction commits. A context that is dropped without
//! `run` being called (the rollback path) discards its queue.

use flatrow_core::model::EntityRecord;

/// Queue of actions deferred until transaction success
///
/// The context is created per save/delete invocation and owns its callback
/// list; there is no ambient shared queue.
#[derive(Default)]
pub struct CommitContext<'a> {
    callbacks: Vec<Box<dyn FnOnce(&mut EntityRecord) + 'a>>,
}

impl<'a> CommitContext<'a> {
    /// Create an empty context
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Queue a callback bound to the entity being persisted
    pub fn register(&mut self, callback: Box<dyn FnOnce(&mut EntityRecord) + 'a>) {
        self.callbacks.push(callback);
    }

    /// Number of queued callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Invoke every queued callback in registration order
    ///
    /// Consumes the context; callers invoke this only after a successful
    /// commit, so callbacks observe post-commit state.
    pub fn run(self, record: &mut EntityRecord) {
        for callback in self.callbacks {
            callback(record);
        }
    }
}
