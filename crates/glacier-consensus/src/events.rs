//! Dependency resolution for out-of-order acceptance.
//!
//! A [`Blocker`] holds entries that each wait on a set of dependency
//! ids and carry a terminal action. Draining the last dependency makes
//! the entry fire; a rejected dependency abandons the entry and,
//! transitively, everything waiting on it. Each entry resolves exactly
//! once.
//!
//! Actions are returned to the caller rather than executed in place:
//! the single consensus mutator runs them, which keeps all state
//! mutation on one logical thread.

use std::collections::HashMap;

use glacier_ids::Id;
use glacier_utils::Set;
use tracing::trace;

/// A registered entry waiting on dependencies.
#[derive(Debug)]
struct Entry<A> {
    deps: Set<Id>,
    action: A,
}

/// Tracks dependency fan-in for pending terminal actions.
///
/// Entries are keyed by the id they will resolve (a vertex or
/// transaction id); dependencies are the ids that must fulfill first.
#[derive(Debug)]
pub struct Blocker<A> {
    entries: HashMap<Id, Entry<A>>,
    /// Reverse index: dependency id to the entries waiting on it.
    /// May hold stale entry ids after abandonment; lookups filter
    /// through `entries`.
    blocking: HashMap<Id, Vec<Id>>,
}

impl<A> Default for Blocker<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Blocker<A> {
    /// Creates an empty blocker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            blocking: HashMap::new(),
        }
    }

    /// Registers an entry for `id` waiting on `deps`.
    ///
    /// If `deps` is already empty the entry fires immediately and the
    /// action is returned. Callers guarantee `id` is not already
    /// registered.
    pub fn register(&mut self, id: Id, deps: Set<Id>, action: A) -> Option<A> {
        debug_assert!(!self.entries.contains_key(&id), "entry registered twice");

        if deps.is_empty() {
            trace!(%id, "entry ready at registration");
            return Some(action);
        }

        for dep in deps.iter() {
            self.blocking.entry(*dep).or_default().push(id);
        }
        self.entries.insert(id, Entry { deps, action });
        None
    }

    /// Marks `id` as resolved successfully.
    ///
    /// Removes `id` from every waiting entry's dependency set and
    /// returns the entries whose last dependency just drained, paired
    /// with their actions. The caller executes the actions and calls
    /// `fulfill` again for each id it thereby resolves.
    pub fn fulfill(&mut self, id: Id) -> Vec<(Id, A)> {
        let Some(waiters) = self.blocking.remove(&id) else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        for waiter in waiters {
            let Some(entry) = self.entries.get_mut(&waiter) else {
                continue; // already abandoned
            };
            entry.deps.remove(&id);
            if entry.deps.is_empty() {
                let entry = self.entries.remove(&waiter).unwrap();
                ready.push((waiter, entry.action));
            }
        }
        ready
    }

    /// Marks `id` as resolved unsuccessfully.
    ///
    /// Every entry waiting on `id` is abandoned, and abandonment
    /// propagates to entries waiting on those entries in turn. The
    /// abandoned entries are returned with their never-fired actions so
    /// the caller can record the corresponding rejections.
    pub fn abandon(&mut self, id: Id) -> Vec<(Id, A)> {
        let mut abandoned = Vec::new();
        let mut worklist = vec![id];

        while let Some(dep) = worklist.pop() {
            let Some(waiters) = self.blocking.remove(&dep) else {
                continue;
            };
            for waiter in waiters {
                if let Some(entry) = self.entries.remove(&waiter) {
                    trace!(id = %waiter, on = %dep, "entry abandoned");
                    abandoned.push((waiter, entry.action));
                    worklist.push(waiter);
                }
            }
        }
        abandoned
    }

    /// Returns the number of entries still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
