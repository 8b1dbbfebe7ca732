//! Derive support for layered configuration in `docker-xylem`.
//!
//! `#[derive(LayeredConfig)]` on an args struct generates:
//!
//! * `Overlay`, merging a file-backed base layer with CLI/env values field by field.
//! * `ApplyDefaults`, filling unset `Option` fields from `#[xylem(default = ...)]`.
//! * `TryFrom<Args> for Target` when the struct carries `#[xylem(try_into = "Target")]`.
//!
//! Field attributes:
//!
//! * `#[xylem(default = EXPR)]` string literals go through `FromStr`, anything else through `Into`.
//! * `#[xylem(optional)]` keeps the field as `Option` on the target.
//! * `#[xylem(try_into)]` converts a non-optional field with `TryInto`.
//! * `#[xylem(skip)]` leaves the field out of the target.
use proc_macro::TokenStream;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, Field, Fields, Lit, Meta, Type, parse_macro_input,
};

#[proc_macro_derive(LayeredConfig, attributes(xylem))]
pub fn derive_layered_config(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let fields = match named_fields(&input.data) {
        Ok(f) => f,
        Err(e) => return e.into_compile_error().into(),
    };

    if let Err(e) = validate_fields(&fields) {
        return e.into_compile_error().into();
    }

    let ident = &input.ident;
    let overlay = overlay_body(&fields);
    let defaults = defaults_body(&fields);

    let try_from = match target_type(&input.attrs) {
        Some(target) => {
            let mapping = try_from_body(&fields);
            quote! {
                impl TryFrom<#ident> for #target {
                    type Error = crate::error::XylemError;

                    fn try_from(args: #ident) -> Result<Self, Self::Error> {
                        let args = <#ident as crate::config::ApplyDefaults>::apply_defaults(args);
                        Ok(Self {
                            #(#mapping),*
                        })
                    }
                }
            }
        }
        None => quote! {},
    };

    TokenStream::from(quote! {
        #[automatically_derived]
        impl crate::config::Overlay for #ident {
            fn overlay(self, top: Self) -> Self {
                Self { #(#overlay),* }
            }
        }

        #[automatically_derived]
        impl crate::config::ApplyDefaults for #ident {
            fn apply_defaults(self) -> Self {
                Self { #(#defaults),* }
            }
        }

        #try_from
    })
}

fn named_fields(data: &Data) -> syn::Result<Vec<Field>> {
    match data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => Ok(named.named.iter().cloned().collect()),
            other => Err(syn::Error::new(
                other.span(),
                "#[derive(LayeredConfig)] requires named fields",
            )),
        },
        Data::Enum(e) => Err(syn::Error::new(
            e.enum_token.span(),
            "#[derive(LayeredConfig)] only works on structs",
        )),
        Data::Union(u) => Err(syn::Error::new(
            u.union_token.span(),
            "#[derive(LayeredConfig)] only works on structs",
        )),
    }
}

/// Reads `#[xylem(try_into = "Path::To::Target")]` from the struct attributes.
fn target_type(attrs: &[Attribute]) -> Option<syn::Path> {
    attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("xylem") {
            return None;
        }
        match attr.parse_args::<Meta>().ok()? {
            Meta::NameValue(nv) if nv.path.is_ident("try_into") => match nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(s), ..
                }) => s.parse::<syn::Path>().ok(),
                _ => None,
            },
            _ => None,
        }
    })
}

fn overlay_body(fields: &[Field]) -> Vec<proc_macro2::TokenStream> {
    fields
        .iter()
        .map(|f| {
            let name = &f.ident;
            quote_spanned! {f.span()=>
                #name: crate::config::Overlay::overlay(self.#name, top.#name)
            }
        })
        .collect()
}

fn defaults_body(fields: &[Field]) -> Vec<proc_macro2::TokenStream> {
    fields
        .iter()
        .map(|f| {
            let name = &f.ident;
            match default_expr(f) {
                Some(expr @ Expr::Lit(ExprLit {
                    lit: Lit::Str(_), ..
                })) => quote_spanned! {f.span()=>
                    #name: self.#name.or_else(|| Some(
                        #expr.parse().expect(concat!("invalid default value for field '", stringify!(#name), "'"))
                    ))
                },
                Some(expr) => quote_spanned! {f.span()=>
                    #name: self.#name.or_else(|| {
                        #[allow(clippy::useless_conversion)]
                        Some((#expr).into())
                    })
                },
                None => {
                    if is_flattened(f) {
                        quote_spanned! {f.span()=>
                            #name: crate::config::ApplyDefaults::apply_defaults(self.#name)
                        }
                    } else {
                        quote_spanned! {f.span()=> #name: self.#name }
                    }
                }
            }
        })
        .collect()
}

fn try_from_body(fields: &[Field]) -> Vec<proc_macro2::TokenStream> {
    fields
        .iter()
        .filter(|f| !has_flag(f, "skip"))
        .map(|f| {
            let name = &f.ident;

            if !is_option(&f.ty) {
                let conversion = if is_flattened(f) || has_flag(f, "try_into") {
                    quote!(.try_into()?)
                } else {
                    quote!()
                };
                return quote_spanned! {f.span()=> #name: args.#name #conversion };
            }

            if has_flag(f, "optional") {
                quote_spanned! {f.span()=> #name: args.#name }
            } else if default_expr(f).is_some() {
                // apply_defaults guarantees Some
                quote_spanned! {f.span()=>
                    #name: args.#name.expect(concat!("default missing for ", stringify!(#name)))
                }
            } else {
                let msg = format!(
                    "Missing required configuration field: {}",
                    name.as_ref().map(|i| i.to_string()).unwrap_or_default()
                );
                quote_spanned! {f.span()=>
                    #name: args.#name.ok_or_else(|| crate::config::ConfigError::Validation(#msg.into()))?
                }
            }
        })
        .collect()
}

fn validate_fields(fields: &[Field]) -> syn::Result<()> {
    for field in fields {
        let clap_flatten = ["command", "clap", "arg"]
            .iter()
            .any(|k| has_nested(&field.attrs, k, "flatten"));
        let serde_flatten = has_nested(&field.attrs, "serde", "flatten");

        if clap_flatten != serde_flatten {
            return Err(syn::Error::new(
                field.span(),
                "flatten must be set on both clap and serde, or on neither",
            ));
        }

        let clap_default = ["clap", "arg"].iter().any(|k| {
            has_nested(&field.attrs, k, "default_value")
                || has_nested(&field.attrs, k, "default_value_t")
        });

        if clap_default {
            return Err(syn::Error::new(
                field.span(),
                "clap defaults shadow the config file; use #[xylem(default = ...)] instead",
            ));
        }
    }
    Ok(())
}

fn default_expr(field: &Field) -> Option<Expr> {
    field.attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("xylem") {
            return None;
        }
        match attr.parse_args::<Meta>().ok()? {
            Meta::NameValue(nv) if nv.path.is_ident("default") => Some(nv.value),
            _ => None,
        }
    })
}

fn has_flag(field: &Field, flag: &str) -> bool {
    field.attrs.iter().any(|attr| {
        attr.path().is_ident("xylem")
            && attr
                .parse_args::<Meta>()
                .is_ok_and(|m| matches!(m, Meta::Path(p) if p.is_ident(flag)))
    })
}

fn is_flattened(field: &Field) -> bool {
    ["command", "clap", "arg", "serde"]
        .iter()
        .any(|k| has_nested(&field.attrs, k, "flatten"))
}

fn is_option(ty: &Type) -> bool {
    match ty {
        Type::Path(tp) => tp
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "Option"),
        _ => false,
    }
}

fn has_nested(attrs: &[Attribute], outer: &str, inner: &str) -> bool {
    attrs.iter().any(|attr| {
        if !attr.path().is_ident(outer) {
            return false;
        }
        let mut found = false;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(inner) {
                found = true;
            }
            // Skip over `= value` so parsing can continue past it.
            if meta.input.peek(syn::Token![=]) {
                let _: Expr = meta.value()?.parse()?;
            }
            Ok(())
        });
        found
    })
}
