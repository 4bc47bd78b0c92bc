//! A multiset (bag) with quorum-threshold support.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::set::Set;

/// A multiset that tracks the count of each element.
///
/// Bags carry the vote tallies of a poll. They support threshold
/// tracking, for querying which elements have been counted at least
/// `alpha` times, and a deterministic [`mode`](Bag::mode) used
/// for the modal-choice rule.
///
/// # Examples
///
/// ```
/// use glacier_utils::Bag;
///
/// let mut bag = Bag::new();
/// bag.add(1);
/// bag.add(1);
/// bag.add(2);
///
/// assert_eq!(bag.count(&1), 2);
/// assert_eq!(bag.len(), 3);
///
/// bag.set_threshold(2);
/// assert!(bag.threshold().contains(&1));
/// assert!(!bag.threshold().contains(&2));
/// ```
#[derive(Clone)]
pub struct Bag<T: Eq + Hash + Clone> {
    counts: HashMap<T, usize>,
    size: usize,
    threshold: usize,
    met_threshold: Set<T>,
}

impl<T: Eq + Hash + Clone> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Bag<T> {
    /// Creates a new empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            size: 0,
            threshold: 0,
            met_threshold: Set::new(),
        }
    }

    /// Creates a bag from an iterator of elements.
    pub fn of<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Self::new();
        for item in iter {
            bag.add(item);
        }
        bag
    }

    /// Sets the threshold for the threshold set.
    ///
    /// Elements counted at least `threshold` times are included in
    /// [`threshold`](Bag::threshold).
    pub fn set_threshold(&mut self, threshold: usize) {
        if self.threshold == threshold {
            return;
        }

        self.threshold = threshold;
        self.met_threshold.clear();

        for (item, &count) in &self.counts {
            if count >= threshold {
                self.met_threshold.add(item.clone());
            }
        }
    }

    /// Adds a single element to the bag.
    pub fn add(&mut self, item: T) {
        self.add_count(item, 1);
    }

    /// Adds an element with a specific count. A zero count is a no-op.
    pub fn add_count(&mut self, item: T, count: usize) {
        if count == 0 {
            return;
        }

        let total = self.counts.entry(item.clone()).or_insert(0);
        *total += count;
        self.size += count;

        if self.threshold > 0 && *total >= self.threshold {
            self.met_threshold.add(item);
        }
    }

    /// Returns the count of the given element.
    #[must_use]
    pub fn count(&self, item: &T) -> usize {
        self.counts.get(item).copied().unwrap_or(0)
    }

    /// Returns the total number of elements, including duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the unique elements in the bag.
    pub fn list(&self) -> Vec<T> {
        self.counts.keys().cloned().collect()
    }

    /// Returns an iterator over unique elements and their counts.
    pub fn iter(&self) -> impl Iterator<Item = (&T, usize)> {
        self.counts.iter().map(|(item, &count)| (item, count))
    }

    /// Returns the set of elements that have met the threshold.
    #[must_use]
    pub fn threshold(&self) -> &Set<T> {
        &self.met_threshold
    }

    /// Removes all instances of an element from the bag.
    pub fn remove(&mut self, item: &T) {
        if let Some(count) = self.counts.remove(item) {
            self.size -= count;
            self.met_threshold.remove(item);
        }
    }
}

impl<T: Eq + Hash + Clone + Ord> Bag<T> {
    /// Returns the most common element and its count.
    ///
    /// Ties are broken toward the least element under `Ord`. The
    /// tie-break must be identical on every honest node, so the rule is
    /// fixed here and shared by every consumer.
    ///
    /// Returns `None` if the bag is empty.
    pub fn mode(&self) -> Option<(T, usize)> {
        self.counts
            .iter()
            .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
            .map(|(item, &count)| (item.clone(), count))
    }
}

impl<T: Eq + Hash + Clone + fmt::Debug> fmt::Debug for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bag(size={}): {{", self.size)?;
        for (i, (item, count)) in self.counts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item:?}: {count}")?;
        }
        write!(f, "}}")
    }
}
