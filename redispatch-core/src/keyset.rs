//! # Dispatch Key Sets
//!
//! [`DispatchKeySet`] is an immutable, single-word bitset over
//! [`DispatchKey`]. All set arithmetic returns a new value; nothing mutates in
//! place, so a set can be freely copied between the dispatcher, fallbacks and
//! kernels.
//!
//! The dispatcher always runs the kernel for the highest-priority key of the
//! active set. Redispatching "below" a key is expressed as
//! [`DispatchKeySet::keys_after`] or as an intersection with a mask such as
//! [`AFTER_AUTOGRAD_KEYSET`].

use crate::{
    error::DispatchError,
    key::{DispatchKey, NUM_DISPATCH_KEYS},
};
use bitflags::bitflags;
use std::{
    fmt,
    ops::{BitAnd, BitOr, Not, Sub},
};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct KeyBits: u64 {
        // Every bit below NUM_DISPATCH_KEYS is a known key.
        const _ = (1u64 << NUM_DISPATCH_KEYS) - 1;
    }
}

/// An immutable set of dispatch keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchKeySet(KeyBits);

impl DispatchKeySet {
    /// The empty set.
    pub const EMPTY: DispatchKeySet = DispatchKeySet(KeyBits::empty());

    /// Create an empty set.
    pub const fn empty() -> Self {
        Self::EMPTY
    }

    /// The set of every known key.
    pub const fn full() -> Self {
        Self(KeyBits::all())
    }

    /// A set with a single key.
    pub const fn from_key(key: DispatchKey) -> Self {
        Self(KeyBits::from_bits_retain(1u64 << key.priority()))
    }

    /// A set with the given keys.
    pub const fn from_keys(keys: &[DispatchKey]) -> Self {
        let mut bits = 0u64;
        let mut i = 0;
        while i < keys.len() {
            bits |= 1u64 << keys[i].priority();
            i += 1;
        }
        Self(KeyBits::from_bits_retain(bits))
    }

    /// Build a set from raw bits, dropping bits that name no key.
    pub const fn from_raw(bits: u64) -> Self {
        Self(KeyBits::from_bits_truncate(bits))
    }

    /// Every key of strictly lower priority than `key`.
    pub const fn full_after(key: DispatchKey) -> Self {
        Self(KeyBits::from_bits_retain((1u64 << key.priority()) - 1))
    }

    /// The raw bit representation.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0.bits()
    }

    /// Whether `key` is a member.
    #[inline]
    pub const fn has(self, key: DispatchKey) -> bool {
        self.raw() & (1u64 << key.priority()) != 0
    }

    /// Whether every member of `other` is a member of `self`.
    pub const fn is_superset(self, other: DispatchKeySet) -> bool {
        self.raw() & other.raw() == other.raw()
    }

    /// Whether the set has no members.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.raw() == 0
    }

    /// Number of members.
    pub const fn len(self) -> usize {
        self.raw().count_ones() as usize
    }

    /// A copy of this set with `key` added.
    pub const fn add(self, key: DispatchKey) -> Self {
        self.union(Self::from_key(key))
    }

    /// A copy of this set without `key`.
    pub const fn remove(self, key: DispatchKey) -> Self {
        self.difference(Self::from_key(key))
    }

    /// Keys in either set.
    pub const fn union(self, other: DispatchKeySet) -> Self {
        Self(self.0.union(other.0))
    }

    /// Keys in both sets.
    pub const fn intersection(self, other: DispatchKeySet) -> Self {
        Self(self.0.intersection(other.0))
    }

    /// Keys in `self` but not in `other`.
    pub const fn difference(self, other: DispatchKeySet) -> Self {
        Self(self.0.difference(other.0))
    }

    /// Every known key not in `self`.
    pub const fn complement(self) -> Self {
        Self(self.0.complement())
    }

    /// Members of strictly lower priority than `key`.
    ///
    /// Used to continue resolution past a key that contributed nothing.
    pub const fn keys_after(self, key: DispatchKey) -> Self {
        self.intersection(Self::full_after(key))
    }

    /// The member with the highest priority.
    pub fn highest_priority_key(self) -> Result<DispatchKey, DispatchError> {
        if self.is_empty() {
            return Err(DispatchError::EmptyKeySet);
        }
        let index = 63 - self.raw().leading_zeros();
        DispatchKey::from_index(index as u8).ok_or(DispatchError::EmptyKeySet)
    }

    /// Iterate members from highest to lowest priority.
    pub fn iter(self) -> DispatchKeySetIter {
        DispatchKeySetIter { remaining: self.raw() }
    }
}

impl Default for DispatchKeySet {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<DispatchKey> for DispatchKeySet {
    fn from(key: DispatchKey) -> Self {
        Self::from_key(key)
    }
}

impl FromIterator<DispatchKey> for DispatchKeySet {
    fn from_iter<I: IntoIterator<Item = DispatchKey>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::add)
    }
}

impl IntoIterator for DispatchKeySet {
    type Item = DispatchKey;
    type IntoIter = DispatchKeySetIter;

    fn into_iter(self) -> DispatchKeySetIter {
        self.iter()
    }
}

impl BitOr for DispatchKeySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for DispatchKeySet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl Sub for DispatchKeySet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.difference(rhs)
    }
}

impl Not for DispatchKeySet {
    type Output = Self;

    fn not(self) -> Self {
        self.complement()
    }
}

impl fmt::Debug for DispatchKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DispatchKeySet(")?;
        for (i, key) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(key.name())?;
        }
        f.write_str(")")
    }
}

/// Iterator over a key set, highest priority first.
#[derive(Debug, Clone)]
pub struct DispatchKeySetIter {
    remaining: u64,
}

impl Iterator for DispatchKeySetIter {
    type Item = DispatchKey;

    fn next(&mut self) -> Option<DispatchKey> {
        if self.remaining == 0 {
            return None;
        }
        let index = 63 - self.remaining.leading_zeros();
        self.remaining &= !(1u64 << index);
        DispatchKey::from_index(index as u8)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for DispatchKeySetIter {}

/// Every autograd key.
pub const AUTOGRAD_KEYSET: DispatchKeySet = DispatchKeySet::from_keys(&[
    DispatchKey::AutogradOther,
    DispatchKey::AutogradCpu,
    DispatchKey::AutogradCuda,
    DispatchKey::AutogradXpu,
    DispatchKey::AutogradMps,
    DispatchKey::AutogradHpu,
    DispatchKey::AutogradXla,
    DispatchKey::AutogradLazy,
    DispatchKey::AutogradMeta,
    DispatchKey::AutogradPrivateUse1,
    DispatchKey::AutogradPrivateUse2,
    DispatchKey::AutogradPrivateUse3,
]);

/// Every key except the autograd keys.
///
/// `keys & AFTER_AUTOGRAD_KEYSET` is the set to redispatch with once autograd
/// has had its turn.
pub const AFTER_AUTOGRAD_KEYSET: DispatchKeySet = AUTOGRAD_KEYSET.complement();

/// Function form of [`AFTER_AUTOGRAD_KEYSET`].
#[inline]
pub const fn after_autograd_keyset() -> DispatchKeySet {
    AFTER_AUTOGRAD_KEYSET
}

/// Every concrete backend key.
pub const BACKEND_KEYSET: DispatchKeySet = DispatchKeySet::full_after(DispatchKey::AdInplaceOrView);
