//! Reference kernels for a few elementwise operators.
//!
//! Each operator gets a numeric `Cpu` kernel and a shape-only `Meta` kernel.
//! None of them registers an autograd kernel, so calls on ordinary tensors
//! always go through the autograd fallback first.

use redispatch_core::{
    DispatchError, DispatchKey, DispatchKeySet, DispatcherBuilder, FunctionSchema, IValue,
    OperatorBuilder, OperatorHandle, RegistrationError, Stack, Tensor, stack,
};
use thiserror::Error;

/// Errors raised by the reference kernels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Elementwise operands disagree on shape.
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        /// Left operand shape.
        lhs: Vec<usize>,
        /// Right operand shape.
        rhs: Vec<usize>,
    },

    /// A kernel received a tensor from another backend.
    #[error("expected a {expected} tensor, found {found:?}")]
    WrongBackend {
        /// Backend of the kernel.
        expected: DispatchKey,
        /// Backend of the tensor.
        found: Option<DispatchKey>,
    },
}

impl From<KernelError> for DispatchError {
    fn from(err: KernelError) -> Self {
        DispatchError::Kernel(Box::new(err))
    }
}

/// Names of the reference operators.
pub const REFERENCE_OPS: [&str; 3] = ["aten::add.Tensor", "aten::mul.Tensor", "aten::neg"];

/// Declare `aten::add.Tensor`, `aten::mul.Tensor` and `aten::neg` with their
/// `Cpu` and `Meta` kernels.
pub fn register_reference_ops(builder: &mut DispatcherBuilder) -> Result<(), RegistrationError> {
    builder.register_mut(
        OperatorBuilder::new(FunctionSchema::new("aten::add.Tensor", 2, 1))
            .kernel(DispatchKey::Cpu, |_op, _keys, stack| binary_cpu(stack, |a, b| a + b))?
            .kernel(DispatchKey::Meta, |_op, _keys, stack| binary_meta(stack))?,
    )?;
    builder.register_mut(
        OperatorBuilder::new(FunctionSchema::new("aten::mul.Tensor", 2, 1))
            .kernel(DispatchKey::Cpu, |_op, _keys, stack| binary_cpu(stack, |a, b| a * b))?
            .kernel(DispatchKey::Meta, |_op, _keys, stack| binary_meta(stack))?,
    )?;
    builder.register_mut(
        OperatorBuilder::new(FunctionSchema::new("aten::neg", 1, 1))
            .kernel(DispatchKey::Cpu, neg_cpu)?
            .kernel(DispatchKey::Meta, neg_meta)?,
    )?;
    Ok(())
}

fn pop_tensors<const N: usize>(stack: &mut Stack) -> Result<[Tensor; N], DispatchError> {
    let values = stack::pop_n(stack, N)?;
    let tensors = values
        .into_iter()
        .map(IValue::to_tensor)
        .collect::<Result<Vec<_>, _>>()?;
    tensors.try_into().map_err(|v: Vec<Tensor>| DispatchError::StackUnderflow {
        expected: N,
        actual: v.len(),
    })
}

fn expect_backend(t: &Tensor, expected: DispatchKey) -> Result<(), KernelError> {
    match t.backend() {
        Some(found) if found == expected => Ok(()),
        found => Err(KernelError::WrongBackend { expected, found }),
    }
}

fn same_shape(lhs: &Tensor, rhs: &Tensor) -> Result<(), KernelError> {
    if lhs.shape() == rhs.shape() {
        Ok(())
    } else {
        Err(KernelError::ShapeMismatch {
            lhs: lhs.shape().to_vec(),
            rhs: rhs.shape().to_vec(),
        })
    }
}

fn binary_cpu(stack: &mut Stack, f: impl Fn(f64, f64) -> f64) -> Result<(), DispatchError> {
    let [lhs, rhs] = pop_tensors::<2>(stack)?;
    expect_backend(&lhs, DispatchKey::Cpu)?;
    expect_backend(&rhs, DispatchKey::Cpu)?;
    same_shape(&lhs, &rhs)?;
    let data = lhs
        .data()
        .iter()
        .zip(rhs.data())
        .map(|(a, b)| f(*a, *b))
        .collect();
    stack.push(Tensor::new(data, lhs.shape().to_vec(), DispatchKey::Cpu).into());
    Ok(())
}

fn binary_meta(stack: &mut Stack) -> Result<(), DispatchError> {
    let [lhs, rhs] = pop_tensors::<2>(stack)?;
    same_shape(&lhs, &rhs)?;
    stack.push(Tensor::meta(lhs.shape().to_vec()).into());
    Ok(())
}

fn neg_cpu(
    _op: &OperatorHandle<'_>,
    _keys: DispatchKeySet,
    stack: &mut Stack,
) -> Result<(), DispatchError> {
    let [input] = pop_tensors::<1>(stack)?;
    expect_backend(&input, DispatchKey::Cpu)?;
    let data = input.data().iter().map(|x| -x).collect();
    stack.push(Tensor::new(data, input.shape().to_vec(), DispatchKey::Cpu).into());
    Ok(())
}

fn neg_meta(
    _op: &OperatorHandle<'_>,
    _keys: DispatchKeySet,
    stack: &mut Stack,
) -> Result<(), DispatchError> {
    let [input] = pop_tensors::<1>(stack)?;
    stack.push(Tensor::meta(input.shape().to_vec()).into());
    Ok(())
}
