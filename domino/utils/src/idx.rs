//! Small-integer handles and the arenas they index.
//!
//! Handles are newtypes over `u32` so that identity comparisons are cheap and
//! maps keyed by a handle can be plain vectors. Use [impl_index!] to derive
//! the plumbing for a new handle type.

use std::marker::PhantomData;
use std::ops;

/// A type that can be used as an index into an arena.
pub trait IndexRef: Copy + Eq {
    fn index(&self) -> usize;
    fn new(input: usize) -> Self;
}

/// Implements the [IndexRef] trait for a tuple struct wrapping an unsigned
/// integer. Defaults to a `u32` backing type unless one is supplied.
#[macro_export]
macro_rules! impl_index {
    ($struct_name:ident) => {
        impl_index!($struct_name, u32);
    };

    ($struct_name:ident, $backing_ty:ty) => {
        impl $crate::IndexRef for $struct_name {
            fn index(&self) -> usize {
                self.0 as usize
            }

            fn new(input: usize) -> Self {
                Self(input as $backing_ty)
            }
        }

        impl From<usize> for $struct_name {
            fn from(input: usize) -> Self {
                <$struct_name as $crate::IndexRef>::new(input)
            }
        }
    };
}

/// A map from a handle type to values, backed by a dense vector. Keys are
/// handed out sequentially by [IndexedMap::push].
#[derive(Debug, Clone)]
pub struct IndexedMap<K, D>
where
    K: IndexRef,
{
    data: Vec<D>,
    phantom: PhantomData<K>,
}

impl<K, D> IndexedMap<K, D>
where
    K: IndexRef,
{
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
        }
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            data: Vec::with_capacity(size),
            phantom: PhantomData,
        }
    }

    /// Insert a new value and return the key assigned to it.
    pub fn push(&mut self, item: D) -> K {
        self.data.push(item);
        K::new(self.data.len() - 1)
    }

    pub fn get(&self, idx: K) -> Option<&D> {
        self.data.get(idx.index())
    }

    pub fn get_mut(&mut self, idx: K) -> Option<&mut D> {
        self.data.get_mut(idx.index())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + use<K, D> {
        (0..self.data.len()).map(K::new)
    }
}

impl<K, D> Default for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D> ops::Index<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        &self.data[index.index()]
    }
}

impl<K, D> ops::IndexMut<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        &mut self.data[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_index;

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    struct TestIdx(u32);
    impl_index!(TestIdx);

    #[test]
    fn push_hands_out_sequential_keys() {
        let mut map: IndexedMap<TestIdx, &str> = IndexedMap::new();
        let a = map.push("a");
        let b = map.push("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(map[a], "a");
        assert_eq!(map[b], "b");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn get_out_of_bounds_is_none() {
        let map: IndexedMap<TestIdx, u8> = IndexedMap::new();
        assert!(map.get(TestIdx(3)).is_none());
    }
}
