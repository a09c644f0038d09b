//! Unordered membership sets over comparable identifiers.

use std::collections::hash_set;
use std::collections::HashSet;
use std::hash::Hash;

/// Identifiers that can be "absent": the empty string, zero.
///
/// Upstream parsing yields these for missing values; a [`Set`] refuses them.
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for &str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! impl_blank_int {
    ($($t:ty),*) => {
        $(impl Blank for $t {
            fn is_blank(&self) -> bool {
                *self == 0
            }
        })*
    };
}

impl_blank_int!(i32, i64, u32, u64);

/// A membership set. Iteration order is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Set<T: Eq + Hash> {
    items: HashSet<T>,
}

impl<T: Eq + Hash> Default for Set<T> {
    fn default() -> Self {
        Self {
            items: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash + Clone + Blank> Set<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item`. Blank identifiers are ignored. Returns true if the set changed.
    pub fn add(&mut self, item: T) -> bool {
        if item.is_blank() {
            return false;
        }
        self.items.insert(item)
    }

    pub fn remove(&mut self, item: &T) -> bool {
        self.items.remove(item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copy the members out, in no particular order.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Copy the members out, sorted. Handy for logs and assertions.
    pub fn to_sorted_vec(&self) -> Vec<T>
    where
        T: Ord,
    {
        let mut v = self.to_vec();
        v.sort();
        v
    }

    pub fn iter(&self) -> hash_set::Iter<'_, T> {
        self.items.iter()
    }

    /// Add every member of `other` to `self`.
    pub fn merge(&mut self, other: &Set<T>) {
        for item in other.iter() {
            self.items.insert(item.clone());
        }
    }

    pub fn union(&self, other: &Set<T>) -> Set<T> {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    pub fn intersection(&self, other: &Set<T>) -> Set<T> {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Set {
            items: small
                .items
                .iter()
                .filter(|i| large.items.contains(*i))
                .cloned()
                .collect(),
        }
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(&self, other: &Set<T>) -> Set<T> {
        Set {
            items: self
                .items
                .iter()
                .filter(|i| !other.items.contains(*i))
                .cloned()
                .collect(),
        }
    }
}

impl<T: Eq + Hash + Clone + Blank> FromIterator<T> for Set<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Set::new();
        for item in iter {
            set.add(item);
        }
        set
    }
}

impl<T: Eq + Hash + Clone + Blank> Extend<T> for Set<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<T: Eq + Hash> IntoIterator for Set<T> {
    type Item = T;
    type IntoIter = hash_set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T: Eq + Hash> IntoIterator for &'a Set<T> {
    type Item = &'a T;
    type IntoIter = hash_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
