//! Boxed values carried on the dispatch [`Stack`](crate::Stack).

use crate::{
    error::DispatchError,
    key::DispatchKey,
    keyset::{BACKEND_KEYSET, DispatchKeySet},
};

/// A minimal tensor: flat data, a shape and the keys it dispatches on.
///
/// Tensors created with [`Tensor::new`] carry their backend key together with
/// `AdInplaceOrView` and the backend's autograd key, so every call on them
/// passes through the autograd layer first.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f64>,
    shape: Vec<usize>,
    key_set: DispatchKeySet,
    requires_grad: bool,
}

impl Tensor {
    /// Create a tensor on `backend` with the full autograd key stack.
    pub fn new(data: Vec<f64>, shape: Vec<usize>, backend: DispatchKey) -> Self {
        let mut key_set = DispatchKeySet::from_key(backend).add(DispatchKey::AdInplaceOrView);
        if let Some(autograd) = backend.autograd_key() {
            key_set = key_set.add(autograd);
        }
        Self::with_key_set(data, shape, key_set)
    }

    /// Create a one-dimensional CPU tensor.
    pub fn from_vec(data: Vec<f64>) -> Self {
        let len = data.len();
        Self::new(data, vec![len], DispatchKey::Cpu)
    }

    /// Create a shape-only tensor on the `Meta` backend.
    pub fn meta(shape: Vec<usize>) -> Self {
        Self::new(Vec::new(), shape, DispatchKey::Meta)
    }

    /// Create a tensor with an explicit key set.
    pub fn with_key_set(data: Vec<f64>, shape: Vec<usize>, key_set: DispatchKeySet) -> Self {
        Self {
            data,
            shape,
            key_set,
            requires_grad: false,
        }
    }

    /// Set the `requires_grad` flag.
    pub fn requires_grad_(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    /// Set the `requires_grad` flag in place.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// Flat element data; empty for `Meta` tensors.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Dimensions.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements implied by the shape.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Keys this tensor contributes to a call.
    pub fn key_set(&self) -> DispatchKeySet {
        self.key_set
    }

    /// Whether gradients are tracked for this tensor.
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// The highest-priority backend key of this tensor.
    pub fn backend(&self) -> Option<DispatchKey> {
        (self.key_set & BACKEND_KEYSET).highest_priority_key().ok()
    }

    /// Whether the tensor carries shape only.
    pub fn is_meta(&self) -> bool {
        self.backend() == Some(DispatchKey::Meta)
    }
}

/// A boxed argument or result.
#[derive(Debug, Clone, PartialEq)]
pub enum IValue {
    /// No value.
    None,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Double(f64),
    /// A string.
    Str(String),
    /// A list of integers, e.g. a shape.
    IntList(Vec<i64>),
    /// A tensor.
    Tensor(Tensor),
}

impl IValue {
    /// Short name of the variant.
    pub fn tag(&self) -> &'static str {
        match self {
            IValue::None => "None",
            IValue::Bool(_) => "Bool",
            IValue::Int(_) => "Int",
            IValue::Double(_) => "Double",
            IValue::Str(_) => "Str",
            IValue::IntList(_) => "IntList",
            IValue::Tensor(_) => "Tensor",
        }
    }

    /// Whether this is a tensor.
    pub fn is_tensor(&self) -> bool {
        matches!(self, IValue::Tensor(_))
    }

    /// Borrow the tensor, if any.
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            IValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Take the tensor or fail with a type mismatch.
    pub fn to_tensor(self) -> Result<Tensor, DispatchError> {
        match self {
            IValue::Tensor(t) => Ok(t),
            other => Err(mismatch("Tensor", &other)),
        }
    }

    /// Read an integer.
    pub fn to_int(&self) -> Result<i64, DispatchError> {
        match self {
            IValue::Int(i) => Ok(*i),
            other => Err(mismatch("Int", other)),
        }
    }

    /// Read a number, widening `Int` to `f64`.
    pub fn to_double(&self) -> Result<f64, DispatchError> {
        match self {
            IValue::Double(d) => Ok(*d),
            IValue::Int(i) => Ok(*i as f64),
            other => Err(mismatch("Double", other)),
        }
    }

    /// Read a boolean.
    pub fn to_bool(&self) -> Result<bool, DispatchError> {
        match self {
            IValue::Bool(b) => Ok(*b),
            other => Err(mismatch("Bool", other)),
        }
    }
}

fn mismatch(expected: &'static str, actual: &IValue) -> DispatchError {
    DispatchError::TypeMismatch {
        expected,
        actual: actual.tag(),
    }
}

impl From<Tensor> for IValue {
    fn from(t: Tensor) -> Self {
        IValue::Tensor(t)
    }
}

impl From<i64> for IValue {
    fn from(i: i64) -> Self {
        IValue::Int(i)
    }
}

impl From<f64> for IValue {
    fn from(d: f64) -> Self {
        IValue::Double(d)
    }
}

impl From<bool> for IValue {
    fn from(b: bool) -> Self {
        IValue::Bool(b)
    }
}

impl From<&str> for IValue {
    fn from(s: &str) -> Self {
        IValue::Str(s.to_owned())
    }
}

impl From<Vec<i64>> for IValue {
    fn from(v: Vec<i64>) -> Self {
        IValue::IntList(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tensor_carries_autograd_stack() {
        let t = Tensor::from_vec(vec![1.0, 2.0]);
        let expected = DispatchKeySet::from_keys(&[
            DispatchKey::Cpu,
            DispatchKey::AdInplaceOrView,
            DispatchKey::AutogradCpu,
        ]);
        assert_eq!(t.key_set(), expected);
        assert_eq!(t.backend(), Some(DispatchKey::Cpu));
        assert_eq!(t.numel(), 2);
    }

    #[test]
    fn test_meta_tensor() {
        let t = Tensor::meta(vec![2, 3]);
        assert!(t.is_meta());
        assert!(t.data().is_empty());
        assert_eq!(t.numel(), 6);
        assert!(t.key_set().has(DispatchKey::AutogradMeta));
    }

    #[test]
    fn test_ivalue_conversions() {
        assert_eq!(IValue::from(3i64).to_double().unwrap(), 3.0);
        assert!(IValue::from(true).to_bool().unwrap());
        let err = IValue::from("x").to_int().unwrap_err();
        assert!(matches!(
            err,
            DispatchError::TypeMismatch {
                expected: "Int",
                actual: "Str"
            }
        ));
        assert!(IValue::None.to_tensor().is_err());
    }
}
