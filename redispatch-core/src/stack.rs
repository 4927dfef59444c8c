//! # Boxed Call Stack
//!
//! A boxed call passes its arguments and results through one [`Stack`]:
//! the caller pushes the arguments, the kernel pops them and pushes its
//! results in their place. The stack is owned by the calling frame and is
//! only ever lent out as `&mut Stack` for the duration of a single dispatch.

use crate::{error::DispatchError, keyset::DispatchKeySet, value::IValue};

/// Arguments and results of a boxed call.
pub type Stack = Vec<IValue>;

/// Pop the top value.
pub fn pop(stack: &mut Stack) -> Result<IValue, DispatchError> {
    stack.pop().ok_or(DispatchError::StackUnderflow {
        expected: 1,
        actual: 0,
    })
}

/// Pop the top `n` values, returned in push order.
pub fn pop_n(stack: &mut Stack, n: usize) -> Result<Vec<IValue>, DispatchError> {
    let start = first_of_last(stack, n)?;
    Ok(stack.split_off(start))
}

/// Borrow the top `n` values without removing them.
pub fn last_n(stack: &Stack, n: usize) -> Result<&[IValue], DispatchError> {
    let start = first_of_last(stack, n)?;
    Ok(&stack[start..])
}

/// Push every value in order.
pub fn push_all<I>(stack: &mut Stack, values: I)
where
    I: IntoIterator,
    I::Item: Into<IValue>,
{
    stack.extend(values.into_iter().map(Into::into));
}

/// Union of the key sets of every tensor among `values`.
pub fn tensor_key_set(values: &[IValue]) -> DispatchKeySet {
    values
        .iter()
        .filter_map(IValue::as_tensor)
        .fold(DispatchKeySet::empty(), |acc, t| acc | t.key_set())
}

fn first_of_last(stack: &Stack, n: usize) -> Result<usize, DispatchError> {
    stack
        .len()
        .checked_sub(n)
        .ok_or(DispatchError::StackUnderflow {
            expected: n,
            actual: stack.len(),
        })
}
