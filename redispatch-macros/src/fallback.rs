//! `#[fallback]` expansion.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    Ident, ItemFn, LitStr, Token,
    parse::{Parse, ParseStream},
};

/// Arguments for the `#[fallback]` macro.
pub(crate) struct FallbackArgs {
    /// Dispatch key variants, by name.
    pub keys: Vec<Ident>,
    /// Display name override.
    pub name: Option<LitStr>,
}

impl Parse for FallbackArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut keys = Vec::new();
        let mut name = None;

        while !input.is_empty() {
            let ident: Ident = input.parse()?;

            if input.peek(Token![=]) {
                input.parse::<Token![=]>()?;
                match ident.to_string().as_str() {
                    "name" => name = Some(input.parse()?),
                    other => {
                        return Err(syn::Error::new(
                            ident.span(),
                            format!("unknown attribute: {}", other),
                        ));
                    }
                }
            } else {
                keys.push(ident);
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        if keys.is_empty() {
            return Err(input.error("expected at least one dispatch key"));
        }

        Ok(FallbackArgs { keys, name })
    }
}

pub(crate) fn expand(args: FallbackArgs, input: &ItemFn) -> syn::Result<TokenStream> {
    let sig = &input.sig;
    if sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(sig.asyncness, "fallbacks cannot be async"));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&sig.generics, "fallbacks cannot be generic"));
    }
    if sig.inputs.len() != 3 {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            "fallback must take (op: &OperatorHandle<'_>, keys: DispatchKeySet, stack: &mut Stack)",
        ));
    }

    let fn_name = &sig.ident;
    let display = args
        .name
        .unwrap_or_else(|| LitStr::new(&fn_name.to_string(), fn_name.span()));

    let submissions = args.keys.iter().map(|key| {
        quote! {
            ::redispatch::inventory::submit! {
                ::redispatch::FallbackRegistration::boxed(
                    ::redispatch::DispatchKey::#key,
                    #display,
                    #fn_name,
                    ::core::module_path!(),
                )
            }
        }
    });

    Ok(quote! {
        #input
        #(#submissions)*
    })
}
