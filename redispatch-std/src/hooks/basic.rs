//! Basic autograd hooks for operators without an autograd kernel.

use redispatch_core::{
    AFTER_AUTOGRAD_KEYSET, AutoDispatchBelowAutograd, AutogradHooks, DispatchError,
    DispatchKeySet, IValue, OperatorHandle, Stack, Tensor, stack,
};
use std::{collections::BTreeSet, sync::Mutex};

/// What to do when an input requiring grad reaches an operator that has no
/// autograd kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutogradFallbackMode {
    /// Pass through silently.
    Nothing,
    /// Warn once per operator, then pass through.
    #[default]
    Warn,
    /// Fail the call.
    Error,
}

/// Autograd hooks that run the operator below autograd and propagate
/// `requires_grad` to its tensor outputs.
///
/// No graph is recorded; a backward pass through these outputs is not
/// supported.
pub struct BasicAutogradHooks {
    mode: AutogradFallbackMode,
    warned: Mutex<BTreeSet<String>>,
}

impl BasicAutogradHooks {
    /// Create hooks with the given mode.
    pub const fn new(mode: AutogradFallbackMode) -> Self {
        Self {
            mode,
            warned: Mutex::new(BTreeSet::new()),
        }
    }

    /// The configured mode.
    pub fn mode(&self) -> AutogradFallbackMode {
        self.mode
    }

    /// Operators that have been warned about, sorted.
    pub fn warned_ops(&self) -> Vec<String> {
        self.warned
            .lock()
            .map(|warned| warned.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn warn_once(&self, op: &OperatorHandle<'_>) {
        let first = match self.warned.lock() {
            Ok(mut warned) => warned.insert(op.name().to_string()),
            Err(_) => false,
        };
        if first {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                op = %op.name(),
                "autograd kernel not registered; outputs will require grad but cannot be differentiated"
            );
        }
    }
}

impl Default for BasicAutogradHooks {
    fn default() -> Self {
        Self::new(AutogradFallbackMode::default())
    }
}

impl AutogradHooks for BasicAutogradHooks {
    fn on_unimplemented_fallback(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        let schema = op.schema();
        let requires_grad = stack::last_n(stack, schema.num_arguments())?
            .iter()
            .filter_map(IValue::as_tensor)
            .any(Tensor::requires_grad);

        if requires_grad {
            match self.mode {
                AutogradFallbackMode::Error => {
                    return Err(DispatchError::AutogradNotImplemented {
                        op: op.name().to_string(),
                    });
                }
                AutogradFallbackMode::Warn => self.warn_once(op),
                AutogradFallbackMode::Nothing => {}
            }
        }

        {
            let _below = AutoDispatchBelowAutograd::new();
            op.redispatch_boxed(keys & AFTER_AUTOGRAD_KEYSET, stack)?;
        }

        if requires_grad {
            let start = stack.len().saturating_sub(schema.num_returns());
            for value in &mut stack[start..] {
                if let IValue::Tensor(t) = value {
                    t.set_requires_grad(true);
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "BasicAutogradHooks"
    }
}

/// Hooks linked by the `autograd-hooks` feature.
#[cfg(feature = "autograd-hooks")]
pub static BASIC_AUTOGRAD_HOOKS: BasicAutogradHooks =
    BasicAutogradHooks::new(AutogradFallbackMode::Warn);

#[cfg(feature = "autograd-hooks")]
redispatch_core::register_autograd_hooks!(BASIC_AUTOGRAD_HOOKS);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cpu_tensor, passthrough_dispatcher};
    use redispatch_core::HookSlot;

    fn call_neg(hooks: &'static HookSlot, input: Tensor) -> Result<Stack, DispatchError> {
        let dispatcher = passthrough_dispatcher(hooks);
        let mut stack: Stack = vec![input.into()];
        dispatcher.call("aten::neg", &mut stack)?;
        Ok(stack)
    }

    #[test]
    fn test_nothing_mode_propagates_requires_grad() {
        static HOOKS: BasicAutogradHooks = BasicAutogradHooks::new(AutogradFallbackMode::Nothing);
        static SLOT: HookSlot = HookSlot::detached();
        SLOT.install(&HOOKS).unwrap();

        let stack = call_neg(&SLOT, cpu_tensor(&[1.0, -2.0]).requires_grad_(true)).unwrap();
        let out = stack[0].as_tensor().unwrap();
        assert_eq!(out.data(), &[-1.0, 2.0]);
        assert!(out.requires_grad());
        assert!(HOOKS.warned_ops().is_empty());
    }

    #[test]
    fn test_no_grad_inputs_stay_plain() {
        static HOOKS: BasicAutogradHooks = BasicAutogradHooks::new(AutogradFallbackMode::Error);
        static SLOT: HookSlot = HookSlot::detached();
        SLOT.install(&HOOKS).unwrap();

        let stack = call_neg(&SLOT, cpu_tensor(&[3.0])).unwrap();
        assert!(!stack[0].as_tensor().unwrap().requires_grad());
    }

    #[test]
    fn test_error_mode_rejects_grad_inputs() {
        static HOOKS: BasicAutogradHooks = BasicAutogradHooks::new(AutogradFallbackMode::Error);
        static SLOT: HookSlot = HookSlot::detached();
        SLOT.install(&HOOKS).unwrap();

        let err = call_neg(&SLOT, cpu_tensor(&[3.0]).requires_grad_(true)).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::AutogradNotImplemented { ref op } if op == "aten::neg"
        ));
    }

    #[test]
    fn test_warn_mode_warns_once_per_operator() {
        static HOOKS: BasicAutogradHooks = BasicAutogradHooks::new(AutogradFallbackMode::Warn);
        static SLOT: HookSlot = HookSlot::detached();
        SLOT.install(&HOOKS).unwrap();

        for _ in 0..3 {
            call_neg(&SLOT, cpu_tensor(&[1.0]).requires_grad_(true)).unwrap();
        }
        assert_eq!(HOOKS.warned_ops(), vec!["aten::neg".to_string()]);
    }
}
