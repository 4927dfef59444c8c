//! # Autograd Hooks
//!
//! The dispatch core never links against an autograd implementation. An
//! optional subsystem plugs in through [`AutogradHooks`] and a write-once
//! [`HookSlot`]:
//!
//! - A linked subsystem submits one [`AutogradHooksRegistration`] through
//!   [`register_autograd_hooks!`](crate::register_autograd_hooks); the
//!   process-wide [`AUTOGRAD_HOOKS`] slot picks it up on first read.
//! - Alternatively, start-up code calls [`HookSlot::install`] before the
//!   first dispatch.
//!
//! Once read, a slot never changes. Callers check [`HookSlot::is_present`]
//! before [`HookSlot::get`]; with no subsystem linked the correct behavior
//! is to pass straight through.

use crate::{
    error::{DispatchError, RegistrationError},
    keyset::DispatchKeySet,
    operator::OperatorHandle,
    stack::Stack,
};
use std::{fmt, sync::OnceLock};

/// Capabilities an autograd subsystem provides to the dispatch core.
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `AutogradHooks`",
    label = "missing `AutogradHooks` implementation",
    note = "Autograd hooks must implement `on_unimplemented_fallback`."
)]
pub trait AutogradHooks: Send + Sync + 'static {
    /// Called for an operator that reached an autograd key without having an
    /// autograd kernel.
    ///
    /// `keys` is the untouched active key set. The implementation must
    /// either leave the operator's results on `stack` or redispatch.
    fn on_unimplemented_fallback(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError>;

    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Hooks submitted for static collection.
pub struct AutogradHooksRegistration {
    /// The hooks.
    pub hooks: &'static dyn AutogradHooks,
    /// Module that submitted the registration.
    pub site: &'static str,
}

impl AutogradHooksRegistration {
    /// Wrap `hooks` submitted from module `site`.
    pub const fn new(hooks: &'static dyn AutogradHooks, site: &'static str) -> Self {
        Self { hooks, site }
    }
}

inventory::collect!(AutogradHooksRegistration);

/// Link a `static` hooks value into the process-wide [`AUTOGRAD_HOOKS`].
///
/// # Example
/// ```rust,ignore
/// static HOOKS: MyHooks = MyHooks;
/// register_autograd_hooks!(HOOKS);
/// ```
#[macro_export]
macro_rules! register_autograd_hooks {
    ($hooks:path) => {
        $crate::inventory::submit! {
            $crate::AutogradHooksRegistration::new(&$hooks, module_path!())
        }
    };
}

/// A write-once slot holding at most one [`AutogradHooks`] implementation.
pub struct HookSlot {
    cell: OnceLock<Option<&'static dyn AutogradHooks>>,
    linked: bool,
}

/// The process-wide slot, fed by [`register_autograd_hooks!`](crate::register_autograd_hooks).
pub static AUTOGRAD_HOOKS: HookSlot = HookSlot::linked();

impl HookSlot {
    /// A slot that resolves from linked [`AutogradHooksRegistration`]s.
    pub const fn linked() -> Self {
        Self {
            cell: OnceLock::new(),
            linked: true,
        }
    }

    /// A slot that only ever holds what is passed to [`HookSlot::install`].
    pub const fn detached() -> Self {
        Self {
            cell: OnceLock::new(),
            linked: false,
        }
    }

    /// Install hooks.
    ///
    /// Fails if the slot was already filled, was already read, or (for a
    /// linked slot) a subsystem is linked.
    pub fn install(&self, hooks: &'static dyn AutogradHooks) -> Result<(), RegistrationError> {
        let has_linked = self.linked
            && inventory::iter::<AutogradHooksRegistration>
                .into_iter()
                .next()
                .is_some();
        if has_linked {
            return Err(RegistrationError::HooksAlreadyInstalled);
        }
        self.cell
            .set(Some(hooks))
            .map_err(|_| RegistrationError::HooksAlreadyInstalled)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(hooks = hooks.name(), "autograd hooks installed");
        Ok(())
    }

    /// Whether hooks are present.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.resolve().is_some()
    }

    /// The installed hooks.
    ///
    /// Returns [`DispatchError::NotLinked`] when absent; check
    /// [`HookSlot::is_present`] first.
    pub fn get(&self) -> Result<&'static dyn AutogradHooks, DispatchError> {
        self.resolve().ok_or(DispatchError::NotLinked)
    }

    fn resolve(&self) -> Option<&'static dyn AutogradHooks> {
        *self
            .cell
            .get_or_init(|| if self.linked { linked_hooks() } else { None })
    }
}

impl fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.cell.get() {
            None => "unresolved",
            Some(None) => "absent",
            Some(Some(hooks)) => hooks.name(),
        };
        f.debug_struct("HookSlot")
            .field("linked", &self.linked)
            .field("hooks", &state)
            .finish()
    }
}

fn linked_hooks() -> Option<&'static dyn AutogradHooks> {
    let mut registrations = inventory::iter::<AutogradHooksRegistration>.into_iter();
    let first = registrations.next()?;
    if let Some(second) = registrations.next() {
        #[cfg(feature = "tracing")]
        tracing::error!(
            first = first.site,
            second = second.site,
            "more than one autograd hooks implementation linked"
        );
        panic!(
            "more than one autograd hooks implementation linked: `{}` from {} and `{}` from {}",
            first.hooks.name(),
            first.site,
            second.hooks.name(),
            second.site,
        );
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(hooks = first.hooks.name(), site = first.site, "autograd hooks linked");
    Some(first.hooks)
}

/// Whether the process-wide autograd hooks are present.
pub fn has_autograd_hooks() -> bool {
    AUTOGRAD_HOOKS.is_present()
}

/// The process-wide autograd hooks.
pub fn autograd_hooks() -> Result<&'static dyn AutogradHooks, DispatchError> {
    AUTOGRAD_HOOKS.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHooks;

    impl AutogradHooks for NoopHooks {
        fn on_unimplemented_fallback(
            &self,
            _op: &OperatorHandle<'_>,
            _keys: DispatchKeySet,
            _stack: &mut Stack,
        ) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    static NOOP: NoopHooks = NoopHooks;

    #[test]
    fn test_empty_slot() {
        let slot = HookSlot::detached();
        assert!(!slot.is_present());
        assert!(matches!(slot.get(), Err(DispatchError::NotLinked)));
    }

    #[test]
    fn test_install_once() {
        let slot = HookSlot::detached();
        slot.install(&NOOP).unwrap();
        assert!(slot.is_present());
        assert!(slot.get().unwrap().name().ends_with("NoopHooks"));
        assert_eq!(
            slot.install(&NOOP).unwrap_err(),
            RegistrationError::HooksAlreadyInstalled
        );
    }

    #[test]
    fn test_read_seals_slot() {
        let slot = HookSlot::detached();
        assert!(!slot.is_present());
        assert_eq!(
            slot.install(&NOOP).unwrap_err(),
            RegistrationError::HooksAlreadyInstalled
        );
        assert!(!slot.is_present());
    }

    #[test]
    fn test_nothing_linked_in_core() {
        assert!(!has_autograd_hooks());
        assert!(autograd_hooks().is_err());
    }
}
