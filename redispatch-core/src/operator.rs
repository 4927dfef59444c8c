//! # Operators
//!
//! An operator is a name, a [`FunctionSchema`] and one optional boxed kernel
//! per dispatch key. Operators are declared with [`OperatorBuilder`] and
//! frozen into a [`Dispatcher`](crate::Dispatcher); an [`OperatorHandle`]
//! borrows one of them for calling and redispatching.

use crate::{
    dispatcher::Dispatcher,
    error::{DispatchError, RegistrationError},
    key::{DispatchKey, NUM_DISPATCH_KEYS},
    keyset::DispatchKeySet,
    stack::{self, Stack},
    tls,
};
use std::{fmt, sync::Arc};

/// Fully qualified operator name, such as `aten::add.Tensor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorName {
    name: String,
    overload: String,
}

impl OperatorName {
    /// Create a name with an explicit overload, which may be empty.
    pub fn new(name: impl Into<String>, overload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overload: overload.into(),
        }
    }

    /// Base name, e.g. `aten::add`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overload name; empty for the default overload.
    pub fn overload(&self) -> &str {
        &self.overload
    }
}

impl From<&str> for OperatorName {
    /// Split `name.overload` at the first `.`.
    fn from(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((name, overload)) => Self::new(name, overload),
            None => Self::new(qualified, ""),
        }
    }
}

impl fmt::Display for OperatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overload.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.name, self.overload)
        }
    }
}

/// The boxed calling convention of an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSchema {
    name: OperatorName,
    num_arguments: usize,
    num_returns: usize,
}

impl FunctionSchema {
    /// Declare an operator signature by arity.
    pub fn new(name: impl Into<OperatorName>, num_arguments: usize, num_returns: usize) -> Self {
        Self {
            name: name.into(),
            num_arguments,
            num_returns,
        }
    }

    /// Operator name.
    pub fn name(&self) -> &OperatorName {
        &self.name
    }

    /// Values the caller pushes before the call.
    pub fn num_arguments(&self) -> usize {
        self.num_arguments
    }

    /// Values the kernel leaves in their place.
    pub fn num_returns(&self) -> usize {
        self.num_returns
    }
}

/// A kernel invoked through the boxed calling convention.
pub trait BoxedKernel: Send + Sync + 'static {
    /// Pop the arguments from `stack` and push the results.
    fn call(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError>;
}

impl<F> BoxedKernel for F
where
    F: Fn(&OperatorHandle<'_>, DispatchKeySet, &mut Stack) -> Result<(), DispatchError>
        + Send
        + Sync
        + 'static,
{
    fn call(
        &self,
        op: &OperatorHandle<'_>,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        (self)(op, keys, stack)
    }
}

/// A declared operator with its per-key kernels.
pub struct OperatorEntry {
    schema: FunctionSchema,
    kernels: [Option<Arc<dyn BoxedKernel>>; NUM_DISPATCH_KEYS],
}

impl OperatorEntry {
    /// The operator's schema.
    pub fn schema(&self) -> &FunctionSchema {
        &self.schema
    }

    #[inline]
    pub(crate) fn kernel(&self, key: DispatchKey) -> Option<&Arc<dyn BoxedKernel>> {
        self.kernels[key.priority() as usize].as_ref()
    }

    /// Keys with a kernel.
    pub fn kernel_keys(&self) -> DispatchKeySet {
        DispatchKey::ALL
            .iter()
            .filter(|k| self.kernel(**k).is_some())
            .copied()
            .collect()
    }
}

impl fmt::Debug for OperatorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorEntry")
            .field("schema", &self.schema)
            .field("kernels", &self.kernel_keys())
            .finish()
    }
}

/// Builder for one operator.
///
/// # Example
/// ```ignore
/// let op = OperatorBuilder::new(FunctionSchema::new("my::foo", 1, 1))
///     .kernel(DispatchKey::Cpu, |_op, _keys, stack| { ...; Ok(()) })?;
/// ```
pub struct OperatorBuilder {
    entry: OperatorEntry,
}

impl OperatorBuilder {
    /// Start an operator with no kernels.
    pub fn new(schema: FunctionSchema) -> Self {
        Self {
            entry: OperatorEntry {
                schema,
                kernels: std::array::from_fn(|_| None),
            },
        }
    }

    /// Operator name.
    pub fn name(&self) -> &OperatorName {
        self.entry.schema.name()
    }

    /// Register a kernel closure for `key`.
    pub fn kernel<F>(mut self, key: DispatchKey, kernel: F) -> Result<Self, RegistrationError>
    where
        F: Fn(&OperatorHandle<'_>, DispatchKeySet, &mut Stack) -> Result<(), DispatchError>
            + Send
            + Sync
            + 'static,
    {
        self.kernel_mut(key, Arc::new(kernel))?;
        Ok(self)
    }

    /// Register a shared kernel for `key`.
    pub fn boxed_kernel(
        mut self,
        key: DispatchKey,
        kernel: Arc<dyn BoxedKernel>,
    ) -> Result<Self, RegistrationError> {
        self.kernel_mut(key, kernel)?;
        Ok(self)
    }

    /// Register a shared kernel for `key` (mutable version).
    pub fn kernel_mut(
        &mut self,
        key: DispatchKey,
        kernel: Arc<dyn BoxedKernel>,
    ) -> Result<(), RegistrationError> {
        let slot = &mut self.entry.kernels[key.priority() as usize];
        if slot.is_some() {
            return Err(RegistrationError::DuplicateKernel {
                op: self.entry.schema.name().to_string(),
                key,
            });
        }
        *slot = Some(kernel);
        Ok(())
    }

    pub(crate) fn build(self) -> OperatorEntry {
        self.entry
    }
}

// ============================================================================
// OperatorHandle
// ============================================================================

/// A borrowed operator, able to call and redispatch itself.
#[derive(Clone, Copy)]
pub struct OperatorHandle<'d> {
    dispatcher: &'d Dispatcher,
    entry: &'d OperatorEntry,
}

impl<'d> OperatorHandle<'d> {
    pub(crate) fn new(dispatcher: &'d Dispatcher, entry: &'d OperatorEntry) -> Self {
        Self { dispatcher, entry }
    }

    /// Operator name.
    pub fn name(&self) -> &'d OperatorName {
        self.entry.schema.name()
    }

    /// Operator schema.
    pub fn schema(&self) -> &'d FunctionSchema {
        &self.entry.schema
    }

    /// The dispatcher this operator belongs to.
    pub fn dispatcher(&self) -> &'d Dispatcher {
        self.dispatcher
    }

    /// Whether the operator has its own kernel for `key`.
    pub fn has_kernel(&self, key: DispatchKey) -> bool {
        self.entry.kernel(key).is_some()
    }

    pub(crate) fn entry(&self) -> &'d OperatorEntry {
        self.entry
    }

    /// Active keys for a call: the tensor arguments' keys plus this thread's
    /// included keys, minus its excluded keys.
    pub fn compute_dispatch_key_set(&self, stack: &Stack) -> Result<DispatchKeySet, DispatchError> {
        let arguments = stack::last_n(stack, self.entry.schema.num_arguments())?;
        Ok(tls::local_dispatch_key_set().apply(stack::tensor_key_set(arguments)))
    }

    /// Dispatch a call whose arguments are on top of `stack`.
    pub fn call_boxed(&self, stack: &mut Stack) -> Result<(), DispatchError> {
        let keys = self.compute_dispatch_key_set(stack)?;
        self.redispatch_boxed(keys, stack)
    }

    /// Dispatch with an explicit key set, typically a narrowed copy of the
    /// set a kernel or fallback received.
    pub fn redispatch_boxed(
        &self,
        keys: DispatchKeySet,
        stack: &mut Stack,
    ) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(*self, keys, stack)
    }
}

impl fmt::Debug for OperatorHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperatorHandle").field(self.name()).finish()
    }
}
