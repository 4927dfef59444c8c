#![allow(dead_code)]

use redispatch::{
    DispatchError, DispatchKey, DispatchKeySet, Dispatcher, FunctionSchema, HookSlot, IValue,
    OperatorBuilder, Stack, Tensor,
};

// ============================================================================
// Hook Slots
// ============================================================================

/// A slot that never holds hooks, whatever is linked into the binary.
pub static NO_HOOKS: HookSlot = HookSlot::detached();

// ============================================================================
// Tagging Operators
// ============================================================================

/// Name of the operator built by [`tagged_dispatcher`].
pub const FOO: &str = "test::foo";

/// A dispatcher with one nullary operator, [`FOO`], whose kernel for each of
/// `kernel_keys` pushes the key's name.
pub fn tagged_dispatcher(kernel_keys: &[DispatchKey], hooks: &'static HookSlot) -> Dispatcher {
    let mut op = OperatorBuilder::new(FunctionSchema::new(FOO, 0, 1));
    for &key in kernel_keys {
        op = op
            .kernel(key, move |_op, _keys, stack| {
                stack.push(IValue::from(key.name()));
                Ok(())
            })
            .unwrap();
    }
    Dispatcher::builder()
        .with_hooks(hooks)
        .register(op)
        .unwrap()
        .build()
}

/// Resolve [`FOO`] with an explicit key set and return the tag it produced.
pub fn resolve(dispatcher: &Dispatcher, keys: DispatchKeySet) -> Result<String, String> {
    let op = dispatcher.find_op(FOO).map_err(|e| e.to_string())?;
    let mut stack = Stack::new();
    op.redispatch_boxed(keys, &mut stack)
        .map_err(|e: DispatchError| e.to_string())?;
    match stack.as_slice() {
        [IValue::Str(tag)] => Ok(tag.clone()),
        other => Err(format!("unexpected stack {other:?}")),
    }
}

// ============================================================================
// Key Universes
// ============================================================================

/// Every subset of `universe`.
pub fn subsets(universe: &[DispatchKey]) -> impl Iterator<Item = DispatchKeySet> + '_ {
    (0u32..(1 << universe.len())).map(move |mask| {
        universe
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, k)| *k)
            .collect()
    })
}

/// A tensor whose key set is exactly `keys`.
pub fn keyed(keys: DispatchKeySet) -> Tensor {
    Tensor::with_key_set(Vec::new(), vec![0], keys)
}
