//! Derive macro mapping result rows onto plain structs.
//!
//! This crate provides the `#[derive(FromRecord)]` macro, which implements
//! `oxide_query::FromRecord` by copying each column onto the field of the
//! same name.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, Ident, Lit, Meta};

/// Derives `FromRecord` for a struct with named fields.
///
/// The struct must implement `Default`: the mapped value starts from the
/// default and each field is overwritten when its column is present and
/// converts to the field type. Other columns are ignored.
///
/// # Field Attributes
///
/// - `#[record(rename = "column_name")]` - Reads the field from another
///   column (defaults to the field name)
/// - `#[record(skip)]` - Never reads the field; it keeps its default
#[proc_macro_derive(FromRecord, attributes(record))]
pub fn derive_from_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_from_record_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_from_record_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "FromRecord derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "FromRecord derive only supports structs",
            ));
        }
    };

    let mut assignments: Vec<TokenStream2> = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let attrs = parse_record_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let column_name = attrs.rename.unwrap_or_else(|| column_name(field_name));

        assignments.push(quote! {
            ::oxide_query::mapping::assign(record, #column_name, &mut out.#field_name);
        });
    }

    let expanded = quote! {
        impl #impl_generics ::oxide_query::mapping::FromRecord
            for #struct_name #ty_generics #where_clause
        {
            fn from_record(record: &::oxide_query::Record) -> Self {
                let mut out = <Self as ::core::default::Default>::default();
                #(#assignments)*
                out
            }
        }
    };

    Ok(expanded)
}

#[derive(Default)]
struct RecordAttrs {
    rename: Option<String>,
    skip: bool,
}

fn parse_record_attrs(attrs: &[Attribute]) -> syn::Result<RecordAttrs> {
    let mut result = RecordAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        // Handle empty attribute like #[record]
        if matches!(attr.meta, Meta::Path(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                result.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: Expr = meta.value()?.parse()?;
                match value {
                    Expr::Lit(lit) => match lit.lit {
                        Lit::Str(s) => {
                            result.rename = Some(s.value());
                            Ok(())
                        }
                        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
                    },
                    other => Err(syn::Error::new_spanned(other, "expected a string literal")),
                }
            } else {
                Err(meta.error("unsupported record attribute, expected `rename` or `skip`"))
            }
        })?;
    }

    Ok(result)
}

/// Column name for a field, without the raw identifier prefix.
fn column_name(field_name: &Ident) -> String {
    let name = field_name.to_string();
    match name.strip_prefix("r#") {
        Some(stripped) => String::from(stripped),
        None => name,
    }
}
