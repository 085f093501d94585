//! Keyed mutexes serializing grading within a (user, contest) scope.
//!
//! Streak state is read-then-write on the grading path, and the read must
//! observe every earlier write in the same scope. Database transactions do
//! not give that ordering; a per-scope async mutex does. Scopes are
//! independent, so grading parallelizes across them.

use crate::domain::{ContestId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The unit of grading serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub user_id: UserId,
    pub contest_id: ContestId,
}

#[derive(Debug, Default)]
pub struct ScopeLocks {
    inner: Mutex<HashMap<Scope, Arc<tokio::sync::Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex for one scope, created on first use.
    pub fn for_scope(&self, user_id: &UserId, contest_id: ContestId) -> Arc<tokio::sync::Mutex<()>> {
        let scope = Scope {
            user_id: user_id.clone(),
            contest_id,
        };
        let mut map = self.inner.lock().expect("scope lock registry poisoned");
        map.entry(scope).or_default().clone()
    }
}
