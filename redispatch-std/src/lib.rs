//! # redispatch-std
//!
//! Standard implementations for the Redispatch dispatcher.
//!
//! This crate provides:
//! - **Autograd hooks**: [`hooks::BasicAutogradHooks`], [`hooks::LoggingHooks`]
//! - **Reference kernels**: `aten::add.Tensor`, `aten::mul.Tensor` and
//!   `aten::neg` for the `CPU` and `Meta` backends, see [`ops`]
//! - **Testing utilities**: [`testing::RecordingHooks`], [`testing::CountingKernel`]
//!
//! Enable the `autograd-hooks` feature to link [`hooks::BasicAutogradHooks`]
//! into the global hook slot.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core
pub use redispatch_core;

// Modules
pub mod hooks;
pub mod ops;
pub mod testing;
