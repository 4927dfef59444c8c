//! # redispatch-core
//!
//! Dispatch keys, fallback registry and redispatch protocol for Redispatch.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! backends and optional subsystems that don't need the standard hooks and
//! kernels of `redispatch-std`.
//!
//! # Layers
//!
//! ## Keys ([`DispatchKey`], [`DispatchKeySet`])
//!
//! A call's active keys form an immutable bitset. The key with the highest
//! bit is served first; redispatching means narrowing the set and resolving
//! again.
//!
//! ## Fallbacks ([`FallbackRegistry`])
//!
//! A per-key table consulted only when the selected key has no kernel for
//! the operator. A key is either unset, a fallthrough (skip it), or a boxed
//! function.
//!
//! ## Autograd Indirection ([`AutogradHooks`], [`HookSlot`])
//!
//! A write-once slot through which an optional autograd subsystem, if
//! linked, intercepts operators that have no autograd kernel. With the slot
//! empty, [`autograd_fallback`] passes calls straight through to the
//! backends.
//!
//! ## Dispatcher ([`Dispatcher`], [`OperatorHandle`])
//!
//! Owns the operators and their per-key kernels, computes active key sets
//! from arguments and thread-local state, and runs the resolution loop.
//!
//! # Error Types
//!
//! - [`RedispatchError`] - Top-level error type
//! - [`DispatchError`] - Call-time errors
//! - [`RegistrationError`] - Table-building errors

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod autograd;
mod dispatcher;
mod error;
mod fallback;
mod hooks;
mod key;
mod keyset;
mod operator;
pub mod stack;
pub mod tls;
mod value;

// Re-exports
pub use autograd::{
    AUTOGRAD_FALLBACK_KEYS, autograd_fallback, autograd_fallback_entry, register_autograd_fallbacks,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{BoxError, DispatchError, ParseKeyError, RedispatchError, RegistrationError};
pub use fallback::{
    BoxedFallback, BoxedFallbackFn, FallbackEntry, FallbackRegistration, FallbackRegistry,
    FallbackRegistryBuilder,
};
pub use hooks::{
    AUTOGRAD_HOOKS, AutogradHooks, AutogradHooksRegistration, HookSlot, autograd_hooks,
    has_autograd_hooks,
};
pub use key::{DispatchKey, NUM_DISPATCH_KEYS};
pub use keyset::{
    AFTER_AUTOGRAD_KEYSET, AUTOGRAD_KEYSET, BACKEND_KEYSET, DispatchKeySet, DispatchKeySetIter,
    after_autograd_keyset,
};
pub use operator::{
    BoxedKernel, FunctionSchema, OperatorBuilder, OperatorEntry, OperatorHandle, OperatorName,
};
pub use stack::Stack;
pub use tls::{
    AutoDispatchBelowAdInplaceOrView, AutoDispatchBelowAutograd, ExcludeDispatchKeyGuard,
    IncludeDispatchKeyGuard, LocalDispatchKeySet,
};
pub use value::{IValue, Tensor};

#[doc(hidden)]
pub use inventory;
