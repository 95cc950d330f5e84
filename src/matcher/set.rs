//! A growable bit set over [`ModuleId`].
//!
//! [`MatchSet`] records which instrumentation modules matched the class currently being
//! evaluated. The combining matcher fills it, the splitting transformer consumes it in
//! ascending id order. Ids are dense, so one `u64` word covers 64 modules and the
//! common case of a few hundred modules fits in a handful of words.
//!
//! Unlike a fixed-capacity bit vector the set grows on [`MatchSet::insert`], because
//! supplementary ids (runtime-configured modules, context-store injectors) are allocated
//! above the static range after the set may already exist. Queries beyond the current
//! capacity simply report "not set".
//!
//! # Example
//!
//! ```rust
//! use classweave::matcher::MatchSet;
//! use classweave::module::ModuleId;
//!
//! let mut set = MatchSet::new();
//! set.insert(ModuleId::new(70));
//! set.insert(ModuleId::new(3));
//!
//! assert!(set.contains(ModuleId::new(3)));
//! assert_eq!(set.iter().map(ModuleId::index).collect::<Vec<_>>(), vec![3, 70]);
//! ```

use crate::module::ModuleId;

/// A bit set of matched module ids.
///
/// Equality ignores capacity: two sets are equal when they contain the same ids.
#[derive(Clone, Default)]
pub struct MatchSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
}

impl MatchSet {
    /// Creates a new, empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Creates a new, empty set with room for `capacity` ids without reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns the number of ids this set can hold without growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len() * 64
    }

    /// Returns `true` if no id is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit for `id`, growing the set if needed.
    pub fn insert(&mut self, id: ModuleId) {
        let index = id.index();
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % 64);
    }

    /// Clears the bit for `id`. Ids beyond the capacity are already clear.
    pub fn remove(&mut self, id: ModuleId) {
        let index = id.index();
        if let Some(word) = self.words.get_mut(index / 64) {
            *word &= !(1u64 << (index % 64));
        }
    }

    /// Returns `true` if the bit for `id` is set.
    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        let index = id.index();
        self.words
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    /// Returns the number of ids set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears all bits, keeping the allocation.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Unions in the ids of `other` that are also present in `mask`.
    ///
    /// Returns `true` if `self` changed.
    pub fn union_masked(&mut self, other: &Self, mask: &Self) -> bool {
        let len = other.words.len().min(mask.words.len());
        if len > self.words.len() {
            self.words.resize(len, 0);
        }
        let mut changed = false;
        for ((a, b), m) in self
            .words
            .iter_mut()
            .zip(other.words.iter())
            .zip(mask.words.iter())
        {
            let old = *a;
            *a |= *b & *m;
            changed |= old != *a;
        }
        changed
    }

    /// Returns an iterator over the set ids in ascending order.
    pub fn iter(&self) -> MatchSetIter<'_> {
        MatchSetIter {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl PartialEq for MatchSet {
    fn eq(&self, other: &Self) -> bool {
        let (short, long) = if self.words.len() <= other.words.len() {
            (&self.words, &other.words)
        } else {
            (&other.words, &self.words)
        };
        short.iter().zip(long.iter()).all(|(a, b)| a == b)
            && long[short.len()..].iter().all(|&w| w == 0)
    }
}

impl Eq for MatchSet {}

impl std::fmt::Debug for MatchSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for id in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
            first = false;
        }
        write!(f, "}}")
    }
}

impl FromIterator<ModuleId> for MatchSet {
    fn from_iter<I: IntoIterator<Item = ModuleId>>(iter: I) -> Self {
        let mut set = MatchSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl Extend<ModuleId> for MatchSet {
    fn extend<I: IntoIterator<Item = ModuleId>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl<'a> IntoIterator for &'a MatchSet {
    type Item = ModuleId;
    type IntoIter = MatchSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the ids in a [`MatchSet`], in ascending order.
pub struct MatchSetIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for MatchSetIter<'_> {
    type Item = ModuleId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                // clear lowest set bit
                self.current &= self.current - 1;
                return Some(ModuleId::from_index(self.word_idx * 64 + bit));
            }
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(set: &MatchSet) -> Vec<usize> {
        set.iter().map(ModuleId::index).collect()
    }

    #[test]
    fn insert_grows() {
        let mut set = MatchSet::new();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 0);

        set.insert(ModuleId::new(130));
        assert_eq!(set.capacity(), 192);
        assert!(set.contains(ModuleId::new(130)));
        assert!(!set.contains(ModuleId::new(129)));
        assert!(!set.contains(ModuleId::new(5000)));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn remove_beyond_capacity_is_noop() {
        let mut set = MatchSet::with_capacity(10);
        set.insert(ModuleId::new(3));
        set.remove(ModuleId::new(900));
        set.remove(ModuleId::new(3));
        assert!(set.is_empty());
    }

    #[test]
    fn iteration_is_ascending() {
        let set: MatchSet = [200, 0, 63, 64, 65, 7]
            .into_iter()
            .map(ModuleId::new)
            .collect();
        assert_eq!(ids(&set), vec![0, 7, 63, 64, 65, 200]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut set: MatchSet = [1, 100].into_iter().map(ModuleId::new).collect();
        let capacity = set.capacity();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), capacity);
        assert_eq!(ids(&set), Vec::<usize>::new());
    }

    #[test]
    fn union_masked_filters() {
        let mut set = MatchSet::new();
        let hits: MatchSet = [1, 4, 70].into_iter().map(ModuleId::new).collect();
        let mask: MatchSet = [4, 70].into_iter().map(ModuleId::new).collect();

        assert!(set.union_masked(&hits, &mask));
        assert_eq!(ids(&set), vec![4, 70]);

        let narrow_mask: MatchSet = [1].into_iter().map(ModuleId::new).collect();
        let mut set = MatchSet::new();
        set.union_masked(&hits, &narrow_mask);
        assert_eq!(ids(&set), vec![1]);
    }

    #[test]
    fn equality_ignores_capacity() {
        let mut a = MatchSet::with_capacity(512);
        let mut b = MatchSet::new();
        assert_eq!(a, b);

        a.insert(ModuleId::new(9));
        b.insert(ModuleId::new(9));
        assert_eq!(a, b);

        b.insert(ModuleId::new(300));
        assert_ne!(a, b);
    }

    #[test]
    fn debug_format() {
        let set: MatchSet = [2, 5].into_iter().map(ModuleId::new).collect();
        assert_eq!(format!("{set:?}"), "{2, 5}");
    }
}
