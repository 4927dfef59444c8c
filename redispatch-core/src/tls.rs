//! # Thread-Local Dispatch Key Sets
//!
//! Each thread carries an `included` and an `excluded` key set. The
//! dispatcher adds the former to, and removes the latter from, the keys it
//! computes from a call's arguments. Guards change them for a scope and
//! restore the previous value on drop, so nesting is safe.

use crate::{
    key::DispatchKey,
    keyset::{AUTOGRAD_KEYSET, DispatchKeySet},
};
use std::{cell::Cell, marker::PhantomData};

/// Snapshot of the thread-local key sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalDispatchKeySet {
    /// Keys forced on for every call on this thread.
    pub included: DispatchKeySet,
    /// Keys forced off for every call on this thread.
    pub excluded: DispatchKeySet,
}

impl LocalDispatchKeySet {
    /// Apply the local sets to the keys computed from arguments.
    pub fn apply(self, keys: DispatchKeySet) -> DispatchKeySet {
        (keys | self.included) - self.excluded
    }
}

thread_local! {
    static LOCAL_KEYS: Cell<LocalDispatchKeySet> = const {
        Cell::new(LocalDispatchKeySet {
            included: DispatchKeySet::EMPTY,
            excluded: DispatchKeySet::EMPTY,
        })
    };
}

/// Read this thread's key sets.
pub fn local_dispatch_key_set() -> LocalDispatchKeySet {
    LOCAL_KEYS.with(Cell::get)
}

fn set_local_dispatch_key_set(local: LocalDispatchKeySet) {
    LOCAL_KEYS.with(|cell| cell.set(local));
}

/// Adds keys to this thread's included set until dropped.
#[must_use = "the keys are only included while the guard is alive"]
pub struct IncludeDispatchKeyGuard {
    previous: LocalDispatchKeySet,
    // Guards restore thread-local state and must stay on their thread.
    _not_send: PhantomData<*const ()>,
}

impl IncludeDispatchKeyGuard {
    /// Include `keys` until the guard is dropped.
    pub fn new(keys: impl Into<DispatchKeySet>) -> Self {
        let previous = local_dispatch_key_set();
        set_local_dispatch_key_set(LocalDispatchKeySet {
            included: previous.included | keys.into(),
            ..previous
        });
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for IncludeDispatchKeyGuard {
    fn drop(&mut self) {
        set_local_dispatch_key_set(self.previous);
    }
}

/// Adds keys to this thread's excluded set until dropped.
#[must_use = "the keys are only excluded while the guard is alive"]
pub struct ExcludeDispatchKeyGuard {
    previous: LocalDispatchKeySet,
    _not_send: PhantomData<*const ()>,
}

impl ExcludeDispatchKeyGuard {
    /// Exclude `keys` until the guard is dropped.
    pub fn new(keys: impl Into<DispatchKeySet>) -> Self {
        let previous = local_dispatch_key_set();
        set_local_dispatch_key_set(LocalDispatchKeySet {
            excluded: previous.excluded | keys.into(),
            ..previous
        });
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ExcludeDispatchKeyGuard {
    fn drop(&mut self) {
        set_local_dispatch_key_set(self.previous);
    }
}

/// Excludes every autograd key for its scope.
///
/// Calls made inside go straight to `AdInplaceOrView` and the backends.
#[must_use = "autograd is only disabled while the guard is alive"]
pub struct AutoDispatchBelowAutograd {
    _guard: ExcludeDispatchKeyGuard,
}

impl AutoDispatchBelowAutograd {
    /// Enter the scope.
    pub fn new() -> Self {
        Self {
            _guard: ExcludeDispatchKeyGuard::new(AUTOGRAD_KEYSET),
        }
    }
}

impl Default for AutoDispatchBelowAutograd {
    fn default() -> Self {
        Self::new()
    }
}

/// Excludes autograd and `AdInplaceOrView` for its scope.
#[must_use = "the keys are only excluded while the guard is alive"]
pub struct AutoDispatchBelowAdInplaceOrView {
    _guard: ExcludeDispatchKeyGuard,
}

impl AutoDispatchBelowAdInplaceOrView {
    /// Enter the scope.
    pub fn new() -> Self {
        Self {
            _guard: ExcludeDispatchKeyGuard::new(
                AUTOGRAD_KEYSET.add(DispatchKey::AdInplaceOrView),
            ),
        }
    }
}

impl Default for AutoDispatchBelowAdInplaceOrView {
    fn default() -> Self {
        Self::new()
    }
}
