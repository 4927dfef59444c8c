//! # Fallback Registry
//!
//! Every dispatch key may carry one process-wide fallback: the behavior used
//! when the selected key has no kernel for the operator being called.
//!
//! - [`FallbackEntry::Unset`]: nothing registered; the call fails.
//! - [`FallbackEntry::Fallthrough`]: the key contributes nothing; resolution
//!   continues with the keys after it, as if it had never been set.
//! - [`FallbackEntry::Boxed`]: a boxed function that receives the operator,
//!   the full active key set and the stack.
//!
//! Registrations are collected with [`FallbackRegistryBuilder`], either by
//! hand or from [`FallbackRegistration`]s submitted through `inventory`, and
//! frozen into an immutable [`FallbackRegistry`]. The process-wide table
//! returned by [`FallbackRegistry::global`] is built exactly once, on first
//! use.

use crate::{
    autograd::register_autograd_fallbacks,
    error::{DispatchError, RegistrationError},
    key::{DispatchKey, NUM_DISPATCH_KEYS},
    keyset::DispatchKeySet,
    operator::OperatorHandle,
    stack::Stack,
};
use std::{fmt, sync::OnceLock};

/// Signature of a boxed fallback.
pub type BoxedFallbackFn =
    fn(&OperatorHandle<'_>, DispatchKeySet, &mut Stack) -> Result<(), DispatchError>;

/// A named boxed fallback function.
#[derive(Clone, Copy)]
pub struct BoxedFallback {
    name: &'static str,
    func: BoxedFallbackFn,
}

impl BoxedFallback {
    /// Create a named fallback.
    pub const fn new(name: &'static str, func: BoxedFallbackFn) -> Self {
        Self { name, func }
    }

    /// Name shown in registry dumps and errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invoke the fallback.
    #[inline]
    pub fn call(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        (self.func)(op, keys, stack)
    }

    fn addr(&self) -> usize {
        self.func as usize
    }
}

// Same fallback only when name and address both agree. Fn addresses may be
// merged or duplicated across codegen units, so an address match alone is
// not trusted. Registering one function under two names is a conflict.
impl PartialEq for BoxedFallback {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.addr() == other.addr()
    }
}

impl Eq for BoxedFallback {}

impl fmt::Debug for BoxedFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedFallback")
            .field("name", &self.name)
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

/// The fallback registered for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackEntry {
    /// No fallback.
    #[default]
    Unset,
    /// Skip this key and keep resolving.
    Fallthrough,
    /// Run a boxed function.
    Boxed(BoxedFallback),
}

impl FallbackEntry {
    /// A boxed fallback entry.
    pub const fn boxed(name: &'static str, func: BoxedFallbackFn) -> Self {
        FallbackEntry::Boxed(BoxedFallback::new(name, func))
    }

    /// Whether no fallback is registered.
    pub fn is_unset(&self) -> bool {
        matches!(self, FallbackEntry::Unset)
    }

    /// Whether the entry skips its key.
    pub fn is_fallthrough(&self) -> bool {
        matches!(self, FallbackEntry::Fallthrough)
    }
}

impl fmt::Display for FallbackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackEntry::Unset => f.write_str("unset"),
            FallbackEntry::Fallthrough => f.write_str("fallthrough"),
            FallbackEntry::Boxed(b) => write!(f, "boxed `{}`", b.name),
        }
    }
}

/// A fallback submitted for static collection.
///
/// Use [`register_fallback!`](crate::register_fallback) rather than building
/// these by hand.
#[derive(Debug)]
pub struct FallbackRegistration {
    /// Key the fallback is registered for.
    pub key: DispatchKey,
    /// The fallback.
    pub entry: FallbackEntry,
    /// Module that submitted the registration.
    pub site: &'static str,
}

impl FallbackRegistration {
    /// A fallthrough for `key`.
    pub const fn fallthrough(key: DispatchKey, site: &'static str) -> Self {
        Self {
            key,
            entry: FallbackEntry::Fallthrough,
            site,
        }
    }

    /// A boxed fallback for `key`.
    pub const fn boxed(
        key: DispatchKey,
        name: &'static str,
        func: BoxedFallbackFn,
        site: &'static str,
    ) -> Self {
        Self {
            key,
            entry: FallbackEntry::boxed(name, func),
            site,
        }
    }
}

inventory::collect!(FallbackRegistration);

/// Submit a fallback for a key to the process-wide table.
///
/// # Example
/// ```rust,ignore
/// register_fallback!(AdInplaceOrView => fallthrough);
/// register_fallback!(AutogradCpu => autograd_fallback);
/// ```
#[macro_export]
macro_rules! register_fallback {
    ($key:ident => fallthrough) => {
        $crate::inventory::submit! {
            $crate::FallbackRegistration::fallthrough(
                $crate::DispatchKey::$key,
                module_path!(),
            )
        }
    };
    ($key:ident => $func:path) => {
        $crate::inventory::submit! {
            $crate::FallbackRegistration::boxed(
                $crate::DispatchKey::$key,
                stringify!($func),
                $func,
                module_path!(),
            )
        }
    };
}

// ============================================================================
// FallbackRegistryBuilder
// ============================================================================

/// Builder for a [`FallbackRegistry`].
///
/// Registering an equal entry twice is accepted; a different entry for a key
/// that already has one is rejected.
///
/// # Example
/// ```ignore
/// let registry = FallbackRegistryBuilder::new()
///     .register(DispatchKey::AdInplaceOrView, FallbackEntry::Fallthrough)?
///     .register(DispatchKey::AutogradCpu, FallbackEntry::boxed("fb", fb))?
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct FallbackRegistryBuilder {
    entries: [FallbackEntry; NUM_DISPATCH_KEYS],
}

impl FallbackRegistryBuilder {
    /// Create a builder with every key unset.
    pub fn new() -> Self {
        Self {
            entries: [FallbackEntry::Unset; NUM_DISPATCH_KEYS],
        }
    }

    /// Create a builder holding every registration linked into the process.
    pub fn from_inventory() -> Result<Self, RegistrationError> {
        let mut builder = Self::new();
        for registration in inventory::iter::<FallbackRegistration> {
            builder.register_mut(registration.key, registration.entry)?;
        }
        Ok(builder)
    }

    /// Register a fallback.
    pub fn register(
        mut self,
        key: DispatchKey,
        entry: FallbackEntry,
    ) -> Result<Self, RegistrationError> {
        self.register_mut(key, entry)?;
        Ok(self)
    }

    /// Register a fallback (mutable version).
    pub fn register_mut(
        &mut self,
        key: DispatchKey,
        entry: FallbackEntry,
    ) -> Result<(), RegistrationError> {
        if entry.is_unset() {
            return Err(RegistrationError::InvalidEntry(key));
        }
        let slot = &mut self.entries[key.priority() as usize];
        if slot.is_unset() {
            *slot = entry;
            Ok(())
        } else if *slot == entry {
            Ok(())
        } else {
            Err(RegistrationError::Duplicate {
                key,
                existing: slot.to_string(),
                attempted: entry.to_string(),
            })
        }
    }

    /// Register a fallthrough.
    pub fn register_fallthrough(self, key: DispatchKey) -> Result<Self, RegistrationError> {
        self.register(key, FallbackEntry::Fallthrough)
    }

    /// Register a boxed fallback.
    pub fn register_boxed(
        self,
        key: DispatchKey,
        name: &'static str,
        func: BoxedFallbackFn,
    ) -> Result<Self, RegistrationError> {
        self.register(key, FallbackEntry::boxed(name, func))
    }

    /// Freeze the table.
    pub fn build(self) -> FallbackRegistry {
        let fallthrough_keys = DispatchKey::ALL
            .iter()
            .filter(|k| self.entries[k.priority() as usize].is_fallthrough())
            .copied()
            .collect();
        FallbackRegistry {
            entries: self.entries,
            fallthrough_keys,
        }
    }
}

impl Default for FallbackRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FallbackRegistry
// ============================================================================

/// An immutable, thread-safe table of per-key fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRegistry {
    entries: [FallbackEntry; NUM_DISPATCH_KEYS],
    fallthrough_keys: DispatchKeySet,
}

static GLOBAL: OnceLock<FallbackRegistry> = OnceLock::new();

impl FallbackRegistry {
    /// A registry with every key unset.
    pub fn empty() -> Self {
        FallbackRegistryBuilder::new().build()
    }

    /// The process-wide registry, built from every linked
    /// [`FallbackRegistration`] on first use.
    ///
    /// # Panics
    ///
    /// Panics if two linked registrations disagree about the same key. A
    /// process must not run against an inconsistent table.
    pub fn global() -> &'static FallbackRegistry {
        GLOBAL.get_or_init(|| match collect_global() {
            Ok(builder) => {
                let registry = builder.build();
                #[cfg(feature = "tracing")]
                tracing::debug!(registered = registry.len(), "fallback registry initialized");
                registry
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(%err, "conflicting fallback registrations");
                panic!("conflicting fallback registrations: {err}");
            }
        })
    }

    /// Look up the fallback for `key`.
    #[inline]
    pub fn resolve(&self, key: DispatchKey) -> &FallbackEntry {
        &self.entries[key.priority() as usize]
    }

    /// Keys registered as fallthrough.
    pub fn fallthrough_keys(&self) -> DispatchKeySet {
        self.fallthrough_keys
    }

    /// Iterate registered entries, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = (DispatchKey, &FallbackEntry)> + '_ {
        DispatchKey::ALL
            .iter()
            .rev()
            .map(|k| (*k, self.resolve(*k)))
            .filter(|(_, entry)| !entry.is_unset())
    }

    /// Number of keys with a fallback.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if no key has a fallback.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per registered key, highest priority first.
    pub fn dump(&self) -> String {
        self.iter()
            .map(|(key, entry)| format!("{key}: {entry}\n"))
            .collect()
    }
}

// The built-in autograd registrations are applied explicitly as well;
// repeating an identical entry is a no-op.
fn collect_global() -> Result<FallbackRegistryBuilder, RegistrationError> {
    let mut builder = FallbackRegistryBuilder::from_inventory()?;
    register_autograd_fallbacks(&mut builder)?;
    Ok(builder)
}

impl Default for FallbackRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(
        _: &OperatorHandle<'_>,
        _: DispatchKeySet,
        _: &mut Stack,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    fn second(
        _: &OperatorHandle<'_>,
        _: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        stack.clear();
        Ok(())
    }

    #[test]
    fn test_resolve_unregistered_is_unset() {
        let registry = FallbackRegistry::empty();
        for key in DispatchKey::ALL {
            assert!(registry.resolve(*key).is_unset());
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_same_entry_twice_is_accepted() {
        let registry = FallbackRegistryBuilder::new()
            .register_boxed(DispatchKey::AutogradCpu, "first", first)
            .unwrap()
            .register_boxed(DispatchKey::AutogradCpu, "first", first)
            .unwrap()
            .register_fallthrough(DispatchKey::AdInplaceOrView)
            .unwrap()
            .register_fallthrough(DispatchKey::AdInplaceOrView)
            .unwrap()
            .build();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.fallthrough_keys(),
            DispatchKeySet::from_key(DispatchKey::AdInplaceOrView)
        );
    }

    #[test]
    fn test_conflicting_entry_is_rejected() {
        let builder = FallbackRegistryBuilder::new()
            .register_boxed(DispatchKey::AutogradCpu, "first", first)
            .unwrap();

        let err = builder
            .clone()
            .register_boxed(DispatchKey::AutogradCpu, "second", second)
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::Duplicate {
                key: DispatchKey::AutogradCpu,
                existing: "boxed `first`".to_string(),
                attempted: "boxed `second`".to_string(),
            }
        );

        let err = builder
            .register_fallthrough(DispatchKey::AutogradCpu)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Duplicate { .. }));
    }

    #[test]
    fn test_same_function_under_another_name_conflicts() {
        let err = FallbackRegistryBuilder::new()
            .register_boxed(DispatchKey::AutogradCpu, "first", first)
            .unwrap()
            .register_boxed(DispatchKey::AutogradCpu, "alias", first)
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Duplicate { key: DispatchKey::AutogradCpu, .. }
        ));
        assert_ne!(
            FallbackEntry::boxed("first", first),
            FallbackEntry::boxed("alias", first)
        );
    }

    #[test]
    fn test_unset_cannot_be_registered() {
        let err = FallbackRegistryBuilder::new()
            .register(DispatchKey::Cpu, FallbackEntry::Unset)
            .unwrap_err();
        assert_eq!(err, RegistrationError::InvalidEntry(DispatchKey::Cpu));
    }

    #[test]
    fn test_dump_lists_highest_priority_first() {
        let registry = FallbackRegistryBuilder::new()
            .register_fallthrough(DispatchKey::AdInplaceOrView)
            .unwrap()
            .register_boxed(DispatchKey::AutogradMeta, "first", first)
            .unwrap()
            .build();
        assert_eq!(
            registry.dump(),
            "AutogradMeta: boxed `first`\nADInplaceOrView: fallthrough\n"
        );
    }
}
