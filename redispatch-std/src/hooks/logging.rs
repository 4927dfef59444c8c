//! Logging wrapper for autograd hooks.

use redispatch_core::{AutogradHooks, DispatchError, DispatchKeySet, OperatorHandle, Stack};

/// Hooks that log every unimplemented-autograd call before delegating.
///
/// Without the `tracing` feature this is a transparent wrapper.
pub struct LoggingHooks<H> {
    inner: H,
    name: &'static str,
}

impl<H> LoggingHooks<H> {
    /// Create a new `LoggingHooks` wrapper around hooks.
    pub const fn new(inner: H, name: &'static str) -> Self {
        Self { inner, name }
    }

    /// The wrapped hooks.
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: AutogradHooks> AutogradHooks for LoggingHooks<H> {
    #[cfg(feature = "tracing")]
    fn on_unimplemented_fallback(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        let span = tracing::debug_span!(
            "autograd_fallback",
            hooks = %self.name,
            op = %op.name(),
            keys = ?keys,
        );
        let _entered = span.enter();
        tracing::debug!(depth = stack.len(), "entering");
        let result = self.inner.on_unimplemented_fallback(op, keys, stack);
        tracing::debug!(ok = result.is_ok(), depth = stack.len(), "leaving");
        result
    }

    #[cfg(not(feature = "tracing"))]
    fn on_unimplemented_fallback(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        self.inner.on_unimplemented_fallback(op, keys, stack)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHooks, cpu_tensor, passthrough_dispatcher};
    use redispatch_core::{DispatchKey, HookSlot};

    #[test]
    fn test_logging_hooks_delegate() {
        static HOOKS: LoggingHooks<RecordingHooks> =
            LoggingHooks::new(RecordingHooks::passthrough(), "logged");
        static SLOT: HookSlot = HookSlot::detached();
        SLOT.install(&HOOKS).unwrap();

        let dispatcher = passthrough_dispatcher(&SLOT);
        let mut stack: Stack = vec![cpu_tensor(&[2.0]).into()];
        dispatcher.call("aten::neg", &mut stack).unwrap();

        assert_eq!(stack[0].as_tensor().unwrap().data(), &[-2.0]);
        assert_eq!(HOOKS.inner().count(), 1);
        assert!(HOOKS.inner().calls()[0].1.has(DispatchKey::AutogradCpu));
        assert_eq!(SLOT.get().unwrap().name(), "logged");
    }
}
