//! A generic set implementation.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::iter::FromIterator;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A set of unique elements.
///
/// A wrapper around `HashSet` with the convenience operations the
/// consensus structures use for dependency and conflict bookkeeping.
///
/// # Examples
///
/// ```
/// use glacier_utils::Set;
///
/// let mut set = Set::new();
/// set.add(1);
/// set.add(2);
/// set.add(1); // duplicate, ignored
///
/// assert_eq!(set.len(), 2);
/// assert!(set.contains(&1));
/// ```
#[derive(Clone, Default)]
pub struct Set<T: Eq + Hash> {
    inner: HashSet<T>,
}

impl<T: Eq + Hash> Set<T> {
    /// Creates a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: HashSet::new(),
        }
    }

    /// Creates a set from an iterator of elements.
    pub fn of<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }

    /// Adds an element to the set.
    ///
    /// Returns `true` if the element was newly inserted.
    pub fn add(&mut self, value: T) -> bool {
        self.inner.insert(value)
    }

    /// Returns `true` if the set contains the element.
    pub fn contains(&self, value: &T) -> bool {
        self.inner.contains(value)
    }

    /// Removes an element from the set.
    ///
    /// Returns `true` if the element was present.
    pub fn remove(&mut self, value: &T) -> bool {
        self.inner.remove(value)
    }

    /// Returns the number of elements in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes all elements from the set.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Returns an iterator over the elements.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    /// Adds all elements from another set to this set.
    pub fn union(&mut self, other: &Self)
    where
        T: Clone,
    {
        for item in &other.inner {
            self.inner.insert(item.clone());
        }
    }

    /// Removes all elements that are in the other set.
    pub fn difference(&mut self, other: &Self) {
        self.inner.retain(|x| !other.inner.contains(x));
    }

    /// Returns `true` if this set and the other have any elements in common.
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.len() <= other.len() {
            self.inner.iter().any(|x| other.inner.contains(x))
        } else {
            other.inner.iter().any(|x| self.inner.contains(x))
        }
    }

    /// Converts the set to a vector.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.iter().cloned().collect()
    }
}

impl<T: Eq + Hash> FromIterator<T> for Set<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl<T: Eq + Hash> IntoIterator for Set<T> {
    type Item = T;
    type IntoIter = std::collections::hash_set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a, T: Eq + Hash> IntoIterator for &'a Set<T> {
    type Item = &'a T;
    type IntoIter = std::collections::hash_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<T: Eq + Hash + fmt::Debug> fmt::Debug for Set<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.iter()).finish()
    }
}

impl<T: Eq + Hash> PartialEq for Set<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Eq + Hash> Eq for Set<T> {}

impl<T: Eq + Hash + Serialize> Serialize for Set<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.inner.serialize(serializer)
    }
}

impl<'de, T: Eq + Hash + Deserialize<'de>> Deserialize<'de> for Set<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self {
            inner: HashSet::deserialize(deserializer)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_contains() {
        let mut set = Set::new();
        assert!(set.add(1));
        assert!(!set.add(1));
        assert!(set.contains(&1));
        assert!(!set.contains(&2));
    }

    #[test]
    fn test_remove() {
        let mut set = Set::of(vec![1, 2, 3]);
        assert!(set.remove(&2));
        assert!(!set.remove(&2));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_union_difference() {
        let mut a = Set::of(vec![1, 2]);
        let b = Set::of(vec![2, 3]);

        a.union(&b);
        assert_eq!(a.len(), 3);

        a.difference(&b);
        assert_eq!(a, Set::of(vec![1]));
    }

    #[test]
    fn test_overlaps() {
        let a = Set::of(vec![1, 2]);
        let b = Set::of(vec![2, 3]);
        let c = Set::of(vec![4]);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
