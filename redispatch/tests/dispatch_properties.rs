mod common;

use common::{NO_HOOKS, resolve, subsets, tagged_dispatcher};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use redispatch::{
    AFTER_AUTOGRAD_KEYSET, AUTOGRAD_FALLBACK_KEYS, AUTOGRAD_KEYSET, DispatchKey, DispatchKeySet,
    ExcludeDispatchKeyGuard, FallbackEntry, FallbackRegistry, FallbackRegistryBuilder, Stack,
    autograd_fallback_entry, ops::REFERENCE_OPS, testing::passthrough_dispatcher,
};

// ============================================================================
// Pass-through Fidelity
// ============================================================================

fn reference_inputs(op: &str, backend: DispatchKey) -> Stack {
    let tensor = |data: Vec<f64>| match backend {
        DispatchKey::Meta => redispatch::Tensor::meta(vec![data.len()]),
        _ => redispatch::Tensor::from_vec(data),
    };
    match op {
        "aten::neg" => vec![tensor(vec![1.0, -2.5, 0.0]).into()],
        _ => vec![
            tensor(vec![1.0, 2.0, 3.0]).into(),
            tensor(vec![-4.0, 0.5, 8.0]).into(),
        ],
    }
}

#[test]
fn test_passthrough_matches_direct_backend_call() {
    let dispatcher = passthrough_dispatcher(&NO_HOOKS);

    for backend in [DispatchKey::Cpu, DispatchKey::Meta] {
        for op in REFERENCE_OPS {
            let mut through_autograd = reference_inputs(op, backend);
            dispatcher.call(op, &mut through_autograd).unwrap();

            let mut direct = reference_inputs(op, backend);
            {
                let _guard = ExcludeDispatchKeyGuard::new(AUTOGRAD_KEYSET);
                dispatcher.call(op, &mut direct).unwrap();
            }

            assert_eq!(through_autograd, direct, "{op} on {backend}");
        }
    }
}

#[test]
fn test_passthrough_preserves_errors() {
    let dispatcher = passthrough_dispatcher(&NO_HOOKS);
    let mismatched = || -> Stack {
        vec![
            redispatch::Tensor::from_vec(vec![1.0]).into(),
            redispatch::Tensor::from_vec(vec![1.0, 2.0]).into(),
        ]
    };

    let through_autograd = dispatcher
        .call("aten::add.Tensor", &mut mismatched())
        .unwrap_err()
        .to_string();
    let direct = {
        let _guard = ExcludeDispatchKeyGuard::new(AUTOGRAD_KEYSET);
        dispatcher
            .call("aten::add.Tensor", &mut mismatched())
            .unwrap_err()
            .to_string()
    };
    assert_eq!(through_autograd, direct);
}

// ============================================================================
// Fallthrough Invisibility
// ============================================================================

const UNIVERSE: [DispatchKey; 10] = [
    DispatchKey::Cpu,
    DispatchKey::Cuda,
    DispatchKey::Xla,
    DispatchKey::Meta,
    DispatchKey::PrivateUse1,
    DispatchKey::AdInplaceOrView,
    DispatchKey::AutogradOther,
    DispatchKey::AutogradCpu,
    DispatchKey::AutogradCuda,
    DispatchKey::AutogradPrivateUse1,
];

#[test]
fn test_fallthrough_key_is_invisible() {
    let dispatcher = tagged_dispatcher(
        &[DispatchKey::Cpu, DispatchKey::Cuda, DispatchKey::Meta],
        &NO_HOOKS,
    );
    let fallthrough = FallbackRegistry::global().fallthrough_keys();
    assert!(fallthrough.has(DispatchKey::AdInplaceOrView));

    let mut checked = 0;
    for set in subsets(&UNIVERSE) {
        for key in fallthrough.iter() {
            if !set.has(key) {
                continue;
            }
            let with_key = resolve(&dispatcher, set);
            let without_key = resolve(&dispatcher, set.remove(key));
            assert_eq!(with_key, without_key, "{set:?} with and without {key}");
            checked += 1;
        }
    }
    assert_eq!(checked, 1 << (UNIVERSE.len() - 1));
}

#[test]
fn test_fallthrough_reaches_backend_kernel() {
    let dispatcher = tagged_dispatcher(&[DispatchKey::Cpu], &NO_HOOKS);
    let keys = DispatchKeySet::from_keys(&[DispatchKey::Cpu, DispatchKey::AdInplaceOrView]);
    assert_eq!(resolve(&dispatcher, keys), Ok("CPU".to_string()));
}

// ============================================================================
// Exclusion Correctness
// ============================================================================

fn assert_no_autograd_after(set: DispatchKeySet) {
    let dropped = set & AFTER_AUTOGRAD_KEYSET;
    for key in DispatchKey::ALL {
        let after = dropped.keys_after(*key);
        assert!(
            (after & AUTOGRAD_KEYSET).is_empty(),
            "{set:?} after {key} kept {after:?}"
        );
    }
}

#[test]
fn test_exclusion_over_sampled_universe() {
    for set in subsets(&UNIVERSE) {
        assert_no_autograd_after(set);
    }
}

#[test]
fn test_exclusion_over_random_full_sets() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    assert_no_autograd_after(DispatchKeySet::full());
    for _ in 0..4096 {
        assert_no_autograd_after(DispatchKeySet::from_raw(rng.random::<u64>()));
    }
}

#[test]
fn test_autograd_fallback_skips_lower_autograd_kernels() {
    // Once autograd keys are stripped, a kernel on a lower autograd key is
    // out of reach.
    let dispatcher = tagged_dispatcher(&[DispatchKey::AutogradCpu, DispatchKey::Cpu], &NO_HOOKS);
    let keys = DispatchKeySet::from_keys(&[
        DispatchKey::Cpu,
        DispatchKey::AutogradCpu,
        DispatchKey::AutogradCuda,
    ]);
    assert_eq!(resolve(&dispatcher, keys), Ok("CPU".to_string()));
    assert_eq!(
        resolve(&dispatcher, keys.remove(DispatchKey::AutogradCuda)),
        Ok("AutogradCPU".to_string())
    );
}

// ============================================================================
// Registration Order Independence
// ============================================================================

fn registry_from(order: &[DispatchKey]) -> FallbackRegistry {
    let mut builder = FallbackRegistryBuilder::new();
    for &key in order {
        builder.register_mut(key, autograd_fallback_entry()).unwrap();
    }
    builder.build()
}

#[test]
fn test_registration_order_is_irrelevant() {
    let expected = registry_from(&AUTOGRAD_FALLBACK_KEYS);
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..64 {
        let mut order = AUTOGRAD_FALLBACK_KEYS;
        order.shuffle(&mut rng);
        assert_eq!(registry_from(&order), expected, "order {order:?}");
    }

    let mut reversed = AUTOGRAD_FALLBACK_KEYS;
    reversed.reverse();
    assert_eq!(registry_from(&reversed), expected);
}

#[test]
fn test_registered_keys_share_one_entry() {
    let registry = FallbackRegistry::global();
    for key in AUTOGRAD_FALLBACK_KEYS {
        assert_eq!(*registry.resolve(key), autograd_fallback_entry());
    }
    assert_eq!(*registry.resolve(DispatchKey::AdInplaceOrView), FallbackEntry::Fallthrough);
}
