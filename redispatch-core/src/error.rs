//! Error types for Redispatch.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`RedispatchError`] - Top-level error type
//! - [`DispatchError`] - Errors raised while a call is being dispatched
//! - [`RegistrationError`] - Errors raised while tables are being built
//!
//! Errors returned by kernels travel through fallbacks unchanged; the
//! fallback layer never wraps or logs them.

use crate::key::DispatchKey;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Redispatch operations.
#[derive(Error, Debug)]
pub enum RedispatchError {
    /// An error occurred while dispatching a call.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// An error occurred while registering a kernel, fallback or hook.
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),
}

/// Errors that can occur while dispatching an operator call.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The highest-priority key of an empty set was requested.
    #[error("requested the highest priority key of an empty dispatch key set")]
    EmptyKeySet,

    /// The autograd hooks were read without checking for presence first.
    #[error("no autograd hooks are linked into this process")]
    NotLinked,

    /// No operator with this name is registered.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// The selected key has neither a kernel nor a fallback.
    #[error("could not run `{op}` with the `{key}` dispatch key: no kernel or fallback registered")]
    MissingKernel {
        /// Operator name.
        op: String,
        /// The key that was selected.
        key: DispatchKey,
    },

    /// Every key fell through and nothing was left to run.
    #[error("could not run `{op}`: no dispatch keys left after fallthrough")]
    NoKernel {
        /// Operator name.
        op: String,
    },

    /// A tensor requiring grad reached an operator without an autograd kernel.
    #[error("`{op}` has no autograd kernel but an input requires grad")]
    AutogradNotImplemented {
        /// Operator name.
        op: String,
    },

    /// A kernel found fewer values on the stack than it needs.
    #[error("stack underflow: expected {expected} values, found {actual}")]
    StackUnderflow {
        /// Values required.
        expected: usize,
        /// Values present.
        actual: usize,
    },

    /// A stack value had the wrong type.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Expected type tag.
        expected: &'static str,
        /// Actual type tag.
        actual: &'static str,
    },

    /// An error raised by a kernel.
    #[error(transparent)]
    Kernel(BoxError),
}

/// Errors that can occur while building dispatch tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A key already has a different fallback.
    #[error("fallback for `{key}` already registered as {existing}, cannot register {attempted}")]
    Duplicate {
        /// Key being registered.
        key: DispatchKey,
        /// Description of the entry already present.
        existing: String,
        /// Description of the rejected entry.
        attempted: String,
    },

    /// `Unset` cannot be registered.
    #[error("cannot register an unset fallback for `{0}`")]
    InvalidEntry(DispatchKey),

    /// An operator already has a kernel for this key.
    #[error("operator `{op}` already has a kernel for `{key}`")]
    DuplicateKernel {
        /// Operator name.
        op: String,
        /// Key being registered.
        key: DispatchKey,
    },

    /// An operator with this name is already registered.
    #[error("operator `{0}` is already registered")]
    DuplicateOperator(String),

    /// A kernel was added to an operator that was never declared.
    #[error("operator `{0}` is not declared")]
    UnknownOperator(String),

    /// The hook slot was already filled or already read.
    #[error("autograd hooks are already installed")]
    HooksAlreadyInstalled,
}

/// A dispatch key name that does not match any key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown dispatch key: {0}")]
pub struct ParseKeyError(pub String);

// Convenience conversions
impl From<BoxError> for DispatchError {
    fn from(err: BoxError) -> Self {
        DispatchError::Kernel(err)
    }
}
