//! `#[dispatchable]` macro implementation.

use inflector::Inflector;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{
    parenthesized,
    parse::{Parse, ParseStream, Result},
    parse_quote, Token,
};

/// Arguments of the `#[dispatchable]` attribute.
#[derive(Default)]
pub struct Args {
    /// Type of the `self` receiver of the generated handler methods.
    self_ty: Option<syn::Type>,

    /// Arguments passed to `#[async_trait]` when the generated handler
    /// methods must be `async`.
    async_trait: Option<TokenStream>,
}

impl Parse for Args {
    fn parse(input: ParseStream<'_>) -> Result<Self> {
        let mut args = Self::default();
        while !input.is_empty() {
            if input.peek(Token![self]) {
                let _ = input.parse::<Token![self]>()?;
                let _ = input.parse::<Token![:]>()?;
                args.self_ty = Some(input.parse()?);
            } else {
                let ident: syn::Ident = input.parse()?;
                if ident != "async_trait" {
                    return Err(syn::Error::new(
                        ident.span(),
                        "Unknown argument, expected `self: <type>` or \
                         `async_trait(...)`",
                    ));
                }
                let content;
                let _ = parenthesized!(content in input);
                args.async_trait = Some(content.parse()?);
            }
            if !input.is_empty() {
                let _ = input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

/// Transforms given name from `camelCase` to `snake_case` and adds `on_`
/// prefix.
fn to_handler_fn_name(name: &str) -> String {
    let mut snake_case = name.to_snake_case();
    snake_case.insert_str(0, "on_");
    snake_case
}

/// Returns type of the `handler` argument of `dispatch_with()` for the given
/// receiver type.
fn handler_ty(self_ty: &syn::Type) -> Result<TokenStream> {
    match self_ty {
        syn::Type::Reference(r) => {
            let mutability = &r.mutability;
            Ok(quote! { &#mutability T })
        }
        _ => Err(syn::Error::new_spanned(
            self_ty,
            "Only `&Self` and `&mut Self` receivers are supported",
        )),
    }
}

/// Generates the actual code for `#[dispatchable]` macro.
///
/// # Algorithm
///
/// 1. Generate dispatching `match`-arms for each `enum` variant.
/// 2. Generate trait methods signatures by transforming `enum` variant name
///    from `camelCase` to `snake_case` and add `on_` prefix.
/// 3. Generate trait `{enum_name}Handler` with generated methods from step 2
///    and an associated `Output` type, marking it with `#[async_trait]` if
///    requested.
/// 4. Generate method `dispatch_with()` with a dispatching generated on
///    step 1.
pub fn expand(item_enum: syn::ItemEnum, args: &Args) -> Result<TokenStream> {
    let enum_name = item_enum.ident.to_string();
    let enum_ident = &item_enum.ident;

    let self_ty = args
        .self_ty
        .clone()
        .unwrap_or_else(|| parse_quote! { &mut Self });
    let handler_ty = handler_ty(&self_ty)?;
    let is_async = args.async_trait.is_some();
    let asyncness = if is_async { quote! { async } } else { quote! {} };
    let dot_await = if is_async { quote! { .await } } else { quote! {} };
    let trait_attr = args.async_trait.as_ref().map_or_else(
        || quote! {},
        |a| quote! { #[::async_trait::async_trait(#a)] },
    );

    let dispatch_variants: Vec<_> = item_enum
        .variants
        .iter()
        .map(|v| {
            let variant_ident = &v.ident;
            let handler_fn_ident = syn::Ident::new(
                &to_handler_fn_name(&variant_ident.to_string()),
                Span::call_site(),
            );
            let fields: &Vec<_> = &v
                .fields
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    f.ident.clone().unwrap_or_else(|| {
                        syn::Ident::new(&format!("f{}", i), Span::call_site())
                    })
                })
                .collect();
            match v.fields {
                syn::Fields::Named(_) => quote! {
                    #enum_ident::#variant_ident {#(#fields),*} => {
                        handler.#handler_fn_ident(#(#fields),*)#dot_await
                    },
                },
                syn::Fields::Unnamed(_) => quote! {
                    #enum_ident::#variant_ident(#(#fields),*) => {
                        handler.#handler_fn_ident((#(#fields),*))#dot_await
                    },
                },
                syn::Fields::Unit => quote! {
                    #enum_ident::#variant_ident => {
                        handler.#handler_fn_ident()#dot_await
                    },
                },
            }
        })
        .collect();

    let handler_trait_ident = syn::Ident::new(
        &format!("{}Handler", enum_name),
        Span::call_site(),
    );
    let handler_trait_methods: Vec<_> = item_enum
        .variants
        .iter()
        .map(|v| {
            let fn_name_ident = syn::Ident::new(
                &to_handler_fn_name(&v.ident.to_string()),
                Span::call_site(),
            );
            let args = match v.fields {
                syn::Fields::Named(ref fields) => {
                    let args: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|f| {
                            let ident = f.ident.as_ref()?;
                            let ty = &f.ty;
                            Some(quote! { #ident: #ty })
                        })
                        .collect();
                    quote! { #(#args),* }
                }
                syn::Fields::Unnamed(ref fields) => {
                    let args: Vec<_> =
                        fields.unnamed.iter().map(|f| f.ty.clone()).collect();
                    quote! { data: (#(#args),*) }
                }
                syn::Fields::Unit => quote! {},
            };
            let doc = format!(
                "Handles [`{0}::{1}`] variant of [`{0}`].",
                enum_name, v.ident,
            );
            quote! {
                #[doc = #doc]
                #asyncness fn #fn_name_ident(
                    self: #self_ty, #args
                ) -> Self::Output;
            }
        })
        .collect();

    let trait_doc = format!(
        "Handler of [`{0}`] variants.\n\nUsing [`{0}::dispatch_with`] method \
         dispatches [`{0}`] variants to appropriate methods of this trait.",
        enum_name
    );
    let method_doc =
        format!("Dispatches [`{0}`] with given [`{0}Handler`].", enum_name);

    Ok(quote! {
        #item_enum

        #[automatically_derived]
        #[doc = #trait_doc]
        #trait_attr
        pub trait #handler_trait_ident {
            /// Output type of all the handler methods.
            type Output;

            #(#handler_trait_methods)*
        }

        #[automatically_derived]
        impl #enum_ident {
            #[doc = #method_doc]
            pub #asyncness fn dispatch_with<T: #handler_trait_ident>(
                self,
                handler: #handler_ty,
            ) -> <T as #handler_trait_ident>::Output {
                match self {
                    #(#dispatch_variants)*
                }
            }
        }
    })
}
