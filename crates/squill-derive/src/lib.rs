//! # squill-derive
//!
//! Procedural macro for declarative table mapping.
//!
//! `#[derive(Entity)]` turns a plain struct with named fields into a mapped
//! type: it implements `squill_client::Entity`, recording the table name,
//! the column list in declaration order, and a get/set accessor pair per
//! field — the mapping descriptor the metadata cache builds its CRUD
//! templates from. No reflection is involved; everything is resolved at
//! compile time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use squill_client::Entity;
//!
//! #[derive(Debug, Default, PartialEq, Entity)]
//! #[squill(table = "person")]
//! struct Person {
//!     #[squill(column = "person_id", primary_key)]
//!     id: i64,
//!     name: String,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, LitStr};

/// Derive macro implementing `squill_client::Entity`.
///
/// The struct must also implement `Default` (the construction recipe used
/// when mapping result rows) and have named fields whose types implement
/// `ToValue` and `FromValue`.
///
/// ## Attributes
///
/// - `#[squill(table = "table_name")]` on the struct — the mapped table;
///   defaults to the snake-cased type name
/// - `#[squill(column = "column_name")]` on a field — the mapped column;
///   defaults to the field name
/// - `#[squill(primary_key)]` on a field — marks the column as (part of)
///   the primary key
#[proc_macro_derive(Entity, attributes(squill))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic types",
        ));
    }
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            ident,
            "Entity can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            ident,
            "Entity requires named fields",
        ));
    };

    let table = table_name(input)?;
    let mut accessors = Vec::new();
    let mut specs = Vec::new();
    for field in &fields.named {
        let Some(field_ident) = &field.ident else {
            return Err(syn::Error::new_spanned(field, "expected a named field"));
        };
        let (column, primary_key) = column_attributes(field)?;
        let get_ident = format_ident!("__squill_get_{}", field_ident);
        let set_ident = format_ident!("__squill_set_{}", field_ident);
        accessors.push(quote! {
            fn #get_ident(entity: &#ident) -> ::squill_client::Value {
                ::squill_client::ToValue::to_value(&entity.#field_ident)
            }
            fn #set_ident(
                entity: &mut #ident,
                value: ::squill_client::Value,
            ) -> ::core::result::Result<(), ::squill_client::MappingError> {
                entity.#field_ident = ::squill_client::FromValue::from_value(value)?;
                ::core::result::Result::Ok(())
            }
        });
        specs.push(quote! {
            ::squill_client::ColumnSpec {
                name: #column,
                primary_key: #primary_key,
                get: #get_ident,
                set: #set_ident,
            }
        });
    }

    let count = specs.len();
    Ok(quote! {
        #[automatically_derived]
        impl ::squill_client::Entity for #ident {
            fn table() -> &'static str {
                #table
            }

            fn columns() -> &'static [::squill_client::ColumnSpec<Self>] {
                #(#accessors)*
                static COLUMNS: [::squill_client::ColumnSpec<#ident>; #count] = [#(#specs),*];
                &COLUMNS
            }
        }
    })
}

fn table_name(input: &DeriveInput) -> syn::Result<String> {
    let mut table = snake_case(&input.ident.to_string());
    for attr in &input.attrs {
        if !attr.path().is_ident("squill") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = value.value();
                Ok(())
            } else {
                Err(meta.error("unknown attribute, expected `table = \"...\"`"))
            }
        })?;
    }
    Ok(table)
}

fn column_attributes(field: &Field) -> syn::Result<(String, bool)> {
    let mut column = field
        .ident
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    if column.starts_with('_') {
        column.remove(0);
    }
    let mut primary_key = false;
    for attr in &field.attrs {
        if !attr.path().is_ident("squill") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("column") {
                let value: LitStr = meta.value()?.parse()?;
                column = value.value();
                Ok(())
            } else if meta.path.is_ident("primary_key") {
                primary_key = true;
                Ok(())
            } else {
                Err(meta.error(
                    "unknown attribute, expected `column = \"...\"` or `primary_key`",
                ))
            }
        })?;
    }
    Ok((column, primary_key))
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
