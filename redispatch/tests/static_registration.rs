//! Fallbacks submitted with `register_fallback!` land in the global table.

mod common;

use common::{NO_HOOKS, resolve, tagged_dispatcher};
use redispatch::{
    AFTER_AUTOGRAD_KEYSET, DispatchError, DispatchKey, DispatchKeySet, FallbackEntry,
    FallbackRegistry, OperatorHandle, Stack, autograd_fallback_entry,
};

fn private_use_autograd(
    op: &OperatorHandle<'_>,
    keys: DispatchKeySet,
    stack: &mut Stack,
) -> Result<(), DispatchError> {
    op.redispatch_boxed(keys & AFTER_AUTOGRAD_KEYSET, stack)
}

redispatch::register_fallback!(AutogradPrivateUse1 => private_use_autograd);
redispatch::register_fallback!(PrivateUse2 => fallthrough);

#[test]
fn test_static_fallbacks_are_collected() {
    let registry = FallbackRegistry::global();

    let FallbackEntry::Boxed(fallback) = *registry.resolve(DispatchKey::AutogradPrivateUse1) else {
        panic!("AutogradPrivateUse1 not registered:\n{}", registry.dump());
    };
    assert!(fallback.name().ends_with("private_use_autograd"));
    assert!(registry.fallthrough_keys().has(DispatchKey::PrivateUse2));

    // Built-in registrations are still there.
    assert_eq!(*registry.resolve(DispatchKey::AutogradCpu), autograd_fallback_entry());
    assert_eq!(*registry.resolve(DispatchKey::AutogradPrivateUse3), FallbackEntry::Unset);
}

#[test]
fn test_static_fallbacks_drive_dispatch() {
    let dispatcher = tagged_dispatcher(&[DispatchKey::PrivateUse1], &NO_HOOKS);

    let keys = DispatchKeySet::from_keys(&[
        DispatchKey::PrivateUse1,
        DispatchKey::PrivateUse2,
        DispatchKey::AutogradPrivateUse1,
    ]);
    assert_eq!(resolve(&dispatcher, keys), Ok("PrivateUse1".to_string()));
}
