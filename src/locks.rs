use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One mutex per submission id. Held across "write mark, recompute aggregate,
/// write aggregate" so two writers on the same submission never interleave.
/// Writers on different submissions take different mutexes.
#[derive(Default)]
pub struct SubmissionLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SubmissionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Runs `f` holding the submission's mutex. The slot is dropped from the
    /// registry once no other caller holds or waits on it.
    pub fn with_submission<T>(&self, submission_id: &str, f: impl FnOnce() -> T) -> T {
        let slot = self
            .slots()
            .entry(submission_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let out = {
            // Guarded state is `()`, so a poisoned slot is still usable.
            let _guard = match slot.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            f()
        };

        // Clones are only taken and released under the registry lock, so a
        // count of one means the map holds the last reference.
        let mut slots = self.slots();
        drop(slot);
        if slots
            .get(submission_id)
            .is_some_and(|s| Arc::strong_count(s) == 1)
        {
            slots.remove(submission_id);
        }
        out
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_submission_is_exclusive() {
        let locks = Arc::new(SubmissionLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_submission("s1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().expect("join");
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn different_submissions_do_not_block_each_other() {
        let locks = SubmissionLocks::new();
        let out = locks.with_submission("a", || locks.with_submission("b", || 42));
        assert_eq!(out, 42);
    }

    #[test]
    fn registry_does_not_grow_with_distinct_submissions() {
        let locks = SubmissionLocks::new();
        for i in 0..100 {
            locks.with_submission(&format!("s{i}"), || ());
        }
        assert_eq!(locks.len(), 0);

        locks.with_submission("outer", || {
            locks.with_submission("inner", || assert_eq!(locks.len(), 2));
            assert_eq!(locks.len(), 1);
        });
        assert_eq!(locks.len(), 0);
    }
}
