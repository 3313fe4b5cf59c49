use crate::domain::SubjectKey;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Subjects whose persistence call has not resolved yet. A locked subject
/// cannot be picked up again, which caps in-flight calls per item at one.
#[derive(Debug, Default)]
pub struct SubjectLocks {
    held: Mutex<HashSet<SubjectKey>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<SubjectKey>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the lock, returning false if it is already held
    pub fn acquire(&self, key: &SubjectKey) -> bool {
        self.held().insert(key.clone())
    }

    pub fn release(&self, key: &SubjectKey) {
        self.held().remove(key);
    }

    pub fn is_locked(&self, key: &SubjectKey) -> bool {
        self.held().contains(key)
    }

    pub fn len(&self) -> usize {
        self.held().len()
    }

    pub fn is_empty(&self) -> bool {
        self.held().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;

    #[test]
    fn test_acquire_is_exclusive() {
        let locks = SubjectLocks::new();
        let key = SubjectKey::Task(TaskId::new("t1"));

        assert!(locks.acquire(&key));
        assert!(!locks.acquire(&key));
        assert!(locks.is_locked(&key));
        assert_eq!(locks.len(), 1);

        locks.release(&key);
        assert!(!locks.is_locked(&key));
        assert!(locks.is_empty());
        assert!(locks.acquire(&key));
    }
}
