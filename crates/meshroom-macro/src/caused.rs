//! `#[derive(Caused)]` macro implementation.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Error, Result};
use synstructure::{BindStyle, Structure};

/// Generates the actual code for `#[derive(Caused)]` macro.
///
/// # Algorithm
///
/// 1. Generate body for trait method `name()` as variant (or struct) name
///    "as is".
/// 2. Generate body for trait method `cause()`:
///     - if variant contains a field marked with `#[cause]`, invokes its
///       `cause()` method;
///     - if variant contains associated error, returns this error;
///     - otherwise returns `None`.
/// 3. Generate implementation of `Caused` trait with the generated methods.
#[allow(clippy::needless_pass_by_value)]
pub fn derive(mut s: Structure<'_>) -> Result<TokenStream> {
    let error_type = error_type(&s)?;

    let name_body = s.each_variant(|v| {
        let name = v.ast().ident.to_string();
        quote!(#name)
    });

    let cause_body = s.bind_with(|_| BindStyle::Move).each_variant(|v| {
        if let Some(caused) = v.bindings().iter().find(|&bi| is_caused(bi)) {
            quote!(return #caused.cause())
        } else if let Some(error) =
            v.bindings().iter().find(|&bi| is_error(bi, &error_type))
        {
            quote!(return Some(#error))
        } else {
            quote!(return None)
        }
    });

    Ok(s.gen_impl(quote! {
        #[automatically_derived]
        gen impl Caused for @Self {
            type Error = #error_type;

            fn name(&self) -> &'static str {
                match *self { #name_body }
            }

            fn cause(self) -> Option<Self::Error> {
                match self { #cause_body }
            }
        }
    }))
}

/// Parses and returns argument of `#[cause(error = "path::to::Error")]`
/// attribute.
fn error_type(s: &Structure<'_>) -> Result<syn::Path> {
    let mut error_type = None;
    for attr in &s.ast().attrs {
        let meta = match attr.parse_meta() {
            Ok(meta) if meta.path().is_ident("cause") => meta,
            _ => continue,
        };
        if error_type.is_some() {
            return Err(Error::new_spanned(
                meta,
                "Cannot have two #[cause(...)] attributes",
            ));
        }
        let list = match meta {
            syn::Meta::List(list) => list,
            _ => {
                return Err(Error::new_spanned(
                    meta,
                    "#[cause] attribute must take a list in parentheses",
                ))
            }
        };
        error_type = match list.nested.first() {
            Some(syn::NestedMeta::Meta(syn::Meta::NameValue(
                syn::MetaNameValue {
                    path,
                    lit: syn::Lit::Str(lit_str),
                    ..
                },
            ))) if path.is_ident("error") => {
                Some(lit_str.parse_with(syn::Path::parse_mod_style)?)
            }
            _ => {
                return Err(Error::new_spanned(
                    list,
                    "Expected attribute like #[cause(error = \
                     \"path::to::Error\")]",
                ));
            }
        };
    }
    error_type.ok_or_else(|| {
        Error::new_spanned(s.ast(), "Error type wasn't provided")
    })
}

/// Checks that the field has `#[cause]` attribute.
fn is_caused(bi: &synstructure::BindingInfo<'_>) -> bool {
    bi.ast().attrs.iter().any(|attr| {
        matches!(
            attr.parse_meta(),
            Ok(syn::Meta::Path(p)) if p.is_ident("cause")
        )
    })
}

/// Checks that the field has the given error type.
fn is_error(bi: &synstructure::BindingInfo<'_>, err: &syn::Path) -> bool {
    match &bi.ast().ty {
        syn::Type::Path(syn::TypePath { qself: None, path }) => path == err,
        _ => false,
    }
}
