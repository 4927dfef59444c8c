//! Standard autograd hook implementations.

mod basic;
mod logging;

#[cfg(feature = "autograd-hooks")]
pub use basic::BASIC_AUTOGRAD_HOOKS;
pub use basic::{AutogradFallbackMode, BasicAutogradHooks};
pub use logging::LoggingHooks;
