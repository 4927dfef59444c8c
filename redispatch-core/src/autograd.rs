//! # Autograd Fallback
//!
//! Tensors always carry an autograd key, but most operators never register
//! an autograd kernel. For those, the dispatcher lands on the boxed fallback
//! registered here for every backend's autograd key.
//!
//! This is not an autograd implementation. Without linked autograd hooks it
//! is a transparent pass-through to the kernels below autograd; with hooks
//! linked it hands the call to them untouched. Operators that must be
//! differentiable register their own autograd kernel, which always takes
//! precedence over this fallback.
//!
//! The private-use autograd keys are left unset so an extension can claim
//! them.

use crate::{
    error::{DispatchError, RegistrationError},
    fallback::{FallbackEntry, FallbackRegistryBuilder},
    key::DispatchKey,
    keyset::{AFTER_AUTOGRAD_KEYSET, DispatchKeySet},
    operator::OperatorHandle,
    register_fallback,
    stack::Stack,
};

/// Keys whose fallback is [`autograd_fallback`].
pub const AUTOGRAD_FALLBACK_KEYS: [DispatchKey; 9] = [
    DispatchKey::AutogradOther,
    DispatchKey::AutogradCpu,
    DispatchKey::AutogradXpu,
    DispatchKey::AutogradCuda,
    DispatchKey::AutogradXla,
    DispatchKey::AutogradLazy,
    DispatchKey::AutogradMps,
    DispatchKey::AutogradMeta,
    DispatchKey::AutogradHpu,
];

register_fallback!(AutogradOther => autograd_fallback);
register_fallback!(AutogradCpu => autograd_fallback);
register_fallback!(AutogradXpu => autograd_fallback);
register_fallback!(AutogradCuda => autograd_fallback);
register_fallback!(AutogradXla => autograd_fallback);
register_fallback!(AutogradLazy => autograd_fallback);
register_fallback!(AutogradMps => autograd_fallback);
register_fallback!(AutogradMeta => autograd_fallback);
// The view/inplace bookkeeping for this key lives with its own kernels;
// here it must be invisible to resolution.
register_fallback!(AdInplaceOrView => fallthrough);
register_fallback!(AutogradHpu => autograd_fallback);

/// Boxed fallback for autograd keys without an operator-specific kernel.
pub fn autograd_fallback(
    op: &OperatorHandle<'_>,
    keys: DispatchKeySet,
    stack: &mut Stack,
) -> Result<(), DispatchError> {
    let hooks = op.dispatcher().hooks();
    if !hooks.is_present() {
        #[cfg(feature = "tracing")]
        tracing::trace!(op = %op.name(), ?keys, "no autograd hooks, redispatching below autograd");
        return op.redispatch_boxed(keys & AFTER_AUTOGRAD_KEYSET, stack);
    }
    hooks.get()?.on_unimplemented_fallback(op, keys, stack)
}

/// The entry registered for every key in [`AUTOGRAD_FALLBACK_KEYS`].
pub const fn autograd_fallback_entry() -> FallbackEntry {
    FallbackEntry::boxed("autograd_fallback", autograd_fallback)
}

/// Register the autograd fallbacks and the `AdInplaceOrView` fallthrough on
/// a hand-built table.
///
/// Idempotent with the static registrations, so it can be applied to
/// [`FallbackRegistryBuilder::from_inventory`] as well.
pub fn register_autograd_fallbacks(
    builder: &mut FallbackRegistryBuilder,
) -> Result<(), RegistrationError> {
    for key in AUTOGRAD_FALLBACK_KEYS {
        builder.register_mut(key, autograd_fallback_entry())?;
    }
    builder.register_mut(DispatchKey::AdInplaceOrView, FallbackEntry::Fallthrough)
}
