//! # redispatch - Key-Set Operator Dispatcher
//!
//! `redispatch` routes an operator call to a kernel chosen by the highest
//! priority key in the call's active [`DispatchKeySet`]. Keys without a kernel
//! fall back to a per-key table: a fallthrough skips the key, a boxed fallback
//! runs in its place.
//!
//! The autograd keys ship a fallback that passes calls straight through to
//! the backends unless an autograd subsystem has linked itself into
//! [`AUTOGRAD_HOOKS`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use redispatch::prelude::*;
//!
//! let mut builder = Dispatcher::builder();
//! redispatch::ops::register_reference_ops(&mut builder)?;
//! let dispatcher = builder.build();
//!
//! let mut stack: Stack = vec![Tensor::from_vec(vec![1.0, 2.0]).into()];
//! dispatcher.call("aten::neg", &mut stack)?;
//! ```
//!
//! ## Static Registration
//!
//! ```rust,ignore
//! fn my_fallback(op: &OperatorHandle<'_>, keys: DispatchKeySet, stack: &mut Stack)
//!     -> Result<(), DispatchError>
//! {
//!     op.redispatch_boxed(keys & AFTER_AUTOGRAD_KEYSET, stack)
//! }
//!
//! redispatch::register_fallback!(AutogradPrivateUse1 => my_fallback);
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use redispatch_core::{
    // Autograd
    AUTOGRAD_FALLBACK_KEYS,
    AUTOGRAD_HOOKS,
    // Key sets
    AFTER_AUTOGRAD_KEYSET,
    AUTOGRAD_KEYSET,
    // Guards
    AutoDispatchBelowAdInplaceOrView,
    AutoDispatchBelowAutograd,
    AutogradHooks,
    AutogradHooksRegistration,
    BACKEND_KEYSET,
    // Error types
    BoxError,
    // Kernels
    BoxedFallback,
    BoxedFallbackFn,
    BoxedKernel,
    DispatchError,
    // Keys
    DispatchKey,
    DispatchKeySet,
    DispatchKeySetIter,
    // Dispatcher
    Dispatcher,
    DispatcherBuilder,
    ExcludeDispatchKeyGuard,
    // Fallback table
    FallbackEntry,
    FallbackRegistration,
    FallbackRegistry,
    FallbackRegistryBuilder,
    FunctionSchema,
    HookSlot,
    // Values
    IValue,
    IncludeDispatchKeyGuard,
    LocalDispatchKeySet,
    NUM_DISPATCH_KEYS,
    // Operators
    OperatorBuilder,
    OperatorEntry,
    OperatorHandle,
    OperatorName,
    ParseKeyError,
    RedispatchError,
    RegistrationError,
    Stack,
    Tensor,
    after_autograd_keyset,
    autograd_fallback,
    autograd_fallback_entry,
    autograd_hooks,
    has_autograd_hooks,
    register_autograd_fallbacks,
    // Macros
    register_autograd_hooks,
    register_fallback,
};

/// Stack helpers.
pub mod stack {
    pub use redispatch_core::stack::{last_n, pop, pop_n, push_all, tensor_key_set};
}

/// Thread-local dispatch state.
pub mod tls {
    pub use redispatch_core::tls::local_dispatch_key_set;
}

/// Standard autograd hook implementations.
pub mod hooks {
    #![allow(clippy::wildcard_imports)]
    pub use redispatch_std::hooks::*;
}

/// Reference kernels.
pub mod ops {
    #![allow(clippy::wildcard_imports)]
    pub use redispatch_std::ops::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use redispatch_std::testing::*;
}

/// Prelude module - common imports for Redispatch.
///
/// # Usage
///
/// ```rust,ignore
/// use redispatch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Key sets
        AFTER_AUTOGRAD_KEYSET,
        // Hooks
        AutogradHooks,
        DispatchError,
        DispatchKey,
        DispatchKeySet,
        // Dispatcher
        Dispatcher,
        FallbackEntry,
        FallbackRegistry,
        FunctionSchema,
        IValue,
        OperatorBuilder,
        OperatorHandle,
        RegistrationError,
        Stack,
        Tensor,
    };
}

#[cfg(feature = "macros")]
pub use redispatch_macros::fallback;

#[doc(hidden)]
pub use inventory;
