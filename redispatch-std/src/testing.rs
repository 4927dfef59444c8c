//! Testing utilities for Redispatch.
//!
//! # Features
//!
//! - [`RecordingHooks`]: Autograd hooks that record every call they receive
//! - [`CountingKernel`]: A kernel that counts calls and the key sets it saw
//! - [`passthrough_dispatcher`]: A dispatcher with the reference operators

use crate::ops::register_reference_ops;
use redispatch_core::{
    AFTER_AUTOGRAD_KEYSET, AutogradHooks, BoxedKernel, DispatchError, DispatchKey,
    DispatchKeySet, Dispatcher, FallbackRegistry, HookSlot, IValue, OperatorHandle, Stack, Tensor,
    stack,
};
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Recording Hooks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingMode {
    Passthrough,
    Consume,
}

/// Autograd hooks that record `(operator, key set)` for every call.
///
/// Constructible in `const` context so tests can install them from a static.
///
/// # Example
///
/// ```rust,ignore
/// static HOOKS: RecordingHooks = RecordingHooks::passthrough();
/// static SLOT: HookSlot = HookSlot::detached();
/// SLOT.install(&HOOKS)?;
///
/// passthrough_dispatcher(&SLOT).call("aten::neg", &mut stack)?;
/// assert_eq!(HOOKS.count(), 1);
/// ```
pub struct RecordingHooks {
    mode: RecordingMode,
    calls: Mutex<Vec<(String, DispatchKeySet)>>,
}

impl RecordingHooks {
    /// Record, then redispatch below autograd.
    pub const fn passthrough() -> Self {
        Self::with_mode(RecordingMode::Passthrough)
    }

    /// Record, then pop the arguments and push one `IValue::None` per return
    /// without reaching any backend.
    pub const fn consuming() -> Self {
        Self::with_mode(RecordingMode::Consume)
    }

    const fn with_mode(mode: RecordingMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> Vec<(String, DispatchKeySet)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded calls.
    pub fn count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl AutogradHooks for RecordingHooks {
    fn on_unimplemented_fallback(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((op.name().to_string(), keys));
        }
        match self.mode {
            RecordingMode::Passthrough => op.redispatch_boxed(keys & AFTER_AUTOGRAD_KEYSET, stack),
            RecordingMode::Consume => {
                let schema = op.schema();
                stack::pop_n(stack, schema.num_arguments())?;
                stack::push_all(stack, (0..schema.num_returns()).map(|_| IValue::None));
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        "RecordingHooks"
    }
}

// ============================================================================
// Counting Kernel
// ============================================================================

/// A kernel that pops its arguments and pushes its tag once per return.
///
/// Share it through an `Arc` and register with
/// [`OperatorBuilder::boxed_kernel`](redispatch_core::OperatorBuilder::boxed_kernel)
/// to observe which key sets reached it.
pub struct CountingKernel {
    tag: &'static str,
    count: AtomicUsize,
    seen: Mutex<Vec<DispatchKeySet>>,
}

impl CountingKernel {
    /// Create a kernel that pushes `tag`.
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            count: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// The pushed tag.
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Number of calls so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Key sets passed to the kernel, oldest first.
    pub fn seen(&self) -> Vec<DispatchKeySet> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl BoxedKernel for CountingKernel {
    fn call(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(keys);
        }
        let schema = op.schema();
        stack::pop_n(stack, schema.num_arguments())?;
        stack::push_all(stack, (0..schema.num_returns()).map(|_| IValue::from(self.tag)));
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A one-dimensional CPU tensor.
pub fn cpu_tensor(data: &[f64]) -> Tensor {
    Tensor::from_vec(data.to_vec())
}

/// A tensor whose key set is exactly `keys`.
pub fn keyed_tensor(keys: &[DispatchKey]) -> Tensor {
    Tensor::with_key_set(Vec::new(), vec![0], DispatchKeySet::from_keys(keys))
}

/// A dispatcher with the reference operators, the global fallback table and
/// the given hook slot.
///
/// # Panics
///
/// Panics if the global fallback table has conflicting registrations.
pub fn passthrough_dispatcher(hooks: &'static HookSlot) -> Dispatcher {
    let mut builder = Dispatcher::builder()
        .with_fallbacks(FallbackRegistry::global().clone())
        .with_hooks(hooks);
    // The reference operators never collide in a fresh builder.
    if let Err(err) = register_reference_ops(&mut builder) {
        panic!("reference operators failed to register: {err}");
    }
    builder.build()
}
