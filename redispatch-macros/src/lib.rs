//! Procedural macros for Redispatch.

use proc_macro::TokenStream;
use syn::{ItemFn, parse_macro_input};

mod fallback;

/// Register a function as the boxed fallback for one or more dispatch keys.
///
/// The function must have the fallback signature
/// `fn(&OperatorHandle<'_>, DispatchKeySet, &mut Stack) -> Result<(), DispatchError>`.
///
/// ```rust,ignore
/// #[redispatch::fallback(AutogradPrivateUse1, AutogradPrivateUse2)]
/// fn my_autograd(op: &OperatorHandle<'_>, keys: DispatchKeySet, stack: &mut Stack)
///     -> Result<(), DispatchError>
/// {
///     op.redispatch_boxed(keys & AFTER_AUTOGRAD_KEYSET, stack)
/// }
/// ```
///
/// A `name = "..."` argument overrides the name shown in registry dumps.
#[proc_macro_attribute]
pub fn fallback(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as fallback::FallbackArgs);
    let input = parse_macro_input!(item as ItemFn);

    match fallback::expand(args, &input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
