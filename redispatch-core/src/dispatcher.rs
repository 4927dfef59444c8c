//! # Dispatcher
//!
//! The dispatcher owns every declared operator, a [`FallbackRegistry`] and a
//! reference to an autograd [`HookSlot`]. It is built once with
//! [`DispatcherBuilder`] and is immutable afterwards, so it can be shared
//! across threads without locking.
//!
//! # Resolution
//!
//! For a key set `keys`:
//!
//! 1. Select `key = keys.highest_priority_key()`.
//! 2. If the operator has a kernel for `key`, run it with `keys`.
//! 3. Otherwise consult the fallback for `key`:
//!    - `Fallthrough`: continue from step 1 with `keys.keys_after(key)`;
//!    - `Boxed`: run it with `keys`;
//!    - `Unset`: fail with [`DispatchError::MissingKernel`].
//!
//! Kernel errors are returned as-is.

use crate::{
    error::{DispatchError, RegistrationError},
    fallback::{FallbackEntry, FallbackRegistry},
    hooks::{AUTOGRAD_HOOKS, HookSlot},
    key::DispatchKey,
    keyset::DispatchKeySet,
    operator::{OperatorBuilder, OperatorEntry, OperatorHandle, OperatorName},
    stack::Stack,
};
use std::collections::{HashMap, hash_map::Entry};

enum Fallbacks {
    Global,
    Owned(FallbackRegistry),
}

/// An immutable operator table with fallbacks.
pub struct Dispatcher {
    operators: HashMap<OperatorName, OperatorEntry>,
    fallbacks: Fallbacks,
    hooks: &'static HookSlot,
}

impl Dispatcher {
    /// Create a new builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Look an operator up by its qualified name (`name.overload`).
    pub fn find_op(&self, name: &str) -> Result<OperatorHandle<'_>, DispatchError> {
        self.find_schema(&OperatorName::from(name))
            .ok_or_else(|| DispatchError::UnknownOperator(name.to_owned()))
    }

    /// Look an operator up by name.
    pub fn find_schema(&self, name: &OperatorName) -> Option<OperatorHandle<'_>> {
        self.operators
            .get(name)
            .map(|entry| OperatorHandle::new(self, entry))
    }

    /// Find `name` and dispatch a call with the arguments on `stack`.
    pub fn call(&self, name: &str, stack: &mut Stack) -> Result<(), DispatchError> {
        self.find_op(name)?.call_boxed(stack)
    }

    /// The fallback table in use.
    pub fn fallbacks(&self) -> &FallbackRegistry {
        match &self.fallbacks {
            Fallbacks::Global => FallbackRegistry::global(),
            Fallbacks::Owned(registry) => registry,
        }
    }

    /// The autograd hook slot in use.
    pub fn hooks(&self) -> &'static HookSlot {
        self.hooks
    }

    /// Names of every operator, sorted.
    pub fn operator_names(&self) -> Vec<&OperatorName> {
        let mut names: Vec<_> = self.operators.keys().collect();
        names.sort();
        names
    }

    pub(crate) fn dispatch(
        &self,
        op: OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        let fallbacks = self.fallbacks();
        let mut remaining = keys;
        loop {
            if remaining.is_empty() {
                return Err(DispatchError::NoKernel {
                    op: op.name().to_string(),
                });
            }
            let key = remaining.highest_priority_key()?;

            if let Some(kernel) = op.entry().kernel(key) {
                #[cfg(feature = "tracing")]
                tracing::trace!(op = %op.name(), %key, "kernel");
                return kernel.call(&op, remaining, stack);
            }

            match fallbacks.resolve(key) {
                FallbackEntry::Fallthrough => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(op = %op.name(), %key, "fallthrough");
                    remaining = remaining.keys_after(key);
                }
                FallbackEntry::Boxed(fallback) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(
                        op = %op.name(),
                        %key,
                        fallback = fallback.name(),
                        "boxed fallback"
                    );
                    return fallback.call(&op, remaining, stack);
                }
                FallbackEntry::Unset => {
                    return Err(DispatchError::MissingKernel {
                        op: op.name().to_string(),
                        key,
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("operators", &self.operator_names())
            .field("fallbacks", &self.fallbacks().len())
            .field("hooks", self.hooks)
            .finish()
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for a [`Dispatcher`].
///
/// # Example
/// ```ignore
/// let dispatcher = Dispatcher::builder()
///     .register(OperatorBuilder::new(FunctionSchema::new("my::foo", 1, 1)).kernel(...)?)?
///     .build();
/// ```
pub struct DispatcherBuilder {
    operators: HashMap<OperatorName, OperatorBuilder>,
    fallbacks: Option<FallbackRegistry>,
    hooks: &'static HookSlot,
}

impl DispatcherBuilder {
    /// Create a builder using the global fallback table and hook slot.
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
            fallbacks: None,
            hooks: &AUTOGRAD_HOOKS,
        }
    }

    /// Declare an operator.
    pub fn register(mut self, op: OperatorBuilder) -> Result<Self, RegistrationError> {
        self.register_mut(op)?;
        Ok(self)
    }

    /// Declare an operator (mutable version).
    pub fn register_mut(&mut self, op: OperatorBuilder) -> Result<(), RegistrationError> {
        match self.operators.entry(op.name().clone()) {
            Entry::Occupied(occupied) => Err(RegistrationError::DuplicateOperator(
                occupied.key().to_string(),
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(op);
                Ok(())
            }
        }
    }

    /// Add a kernel to an already declared operator.
    pub fn impl_kernel<F>(
        &mut self,
        name: &str,
        key: DispatchKey,
        kernel: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&OperatorHandle<'_>, DispatchKeySet, &mut Stack) -> Result<(), DispatchError>
            + Send
            + Sync
            + 'static,
    {
        let op = self
            .operators
            .get_mut(&OperatorName::from(name))
            .ok_or_else(|| RegistrationError::UnknownOperator(name.to_owned()))?;
        op.kernel_mut(key, std::sync::Arc::new(kernel))
    }

    /// Use `registry` instead of [`FallbackRegistry::global`].
    pub fn with_fallbacks(mut self, registry: FallbackRegistry) -> Self {
        self.fallbacks = Some(registry);
        self
    }

    /// Use `hooks` instead of the process-wide slot.
    pub fn with_hooks(mut self, hooks: &'static HookSlot) -> Self {
        self.hooks = hooks;
        self
    }

    /// Get the number of declared operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Check if no operator is declared.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Freeze the dispatcher.
    ///
    /// # Panics
    ///
    /// Panics if the static fallback registrations linked into the process
    /// conflict, even when this dispatcher uses its own table.
    pub fn build(self) -> Dispatcher {
        FallbackRegistry::global();
        Dispatcher {
            operators: self
                .operators
                .into_iter()
                .map(|(name, op)| (name, op.build()))
                .collect(),
            fallbacks: match self.fallbacks {
                Some(registry) => Fallbacks::Owned(registry),
                None => Fallbacks::Global,
            },
            hooks: self.hooks,
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
