use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input, spanned::Spanned};

/// Derive macro implementing `MockRow` for a struct with named fields.
///
/// Every field becomes a mock dataset column, in declaration order, and its
/// value is converted with `Into<Value>`.
///
/// # Attributes
///
/// ## `#[mock(skip)]`
/// Leaves the field out of the dataset.
///
/// ## `#[mock(rename = "...")]`
/// Uses the given column name instead of the field name.
///
/// # Example
/// ```ignore
/// use sqlx_fragment_template::{MockDataset, MockRow};
///
/// #[derive(MockRow)]
/// struct User {
///     id: i64,
///     #[mock(rename = "user_name")]
///     name: String,
/// }
///
/// let data = MockDataset::from_records([User { id: 1, name: "matt".into() }])?;
/// ```
#[proc_macro_derive(MockRow, attributes(mock))]
pub fn mock_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_mock_row(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct MockField {
    ident: syn::Ident,
    column: String,
}

fn expand_mock_row(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "MockRow requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "MockRow can only be derived for structs",
            ));
        }
    };

    let mut columns = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let mut column = ident.to_string();
        let mut skip = false;
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("mock")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    column = lit.value();
                    Ok(())
                } else {
                    Err(meta.error("expected `skip` or `rename = \"...\"`"))
                }
            })?;
        }
        if !skip {
            columns.push(MockField { ident, column });
        }
    }

    let column_names = columns.iter().map(|f| &f.column);
    let values = columns.iter().map(|f| {
        let ident = &f.ident;
        quote! {
            ::std::convert::Into::<::sqlx_fragment_template::Value>::into(self.#ident)
        }
    });
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::sqlx_fragment_template::MockRow for #name #ty_generics
            #where_clause
        {
            fn columns() -> ::std::vec::Vec<&'static str> {
                ::std::vec![#(#column_names),*]
            }

            fn into_values(self) -> ::std::vec::Vec<::sqlx_fragment_template::Value> {
                ::std::vec![#(#values),*]
            }
        }
    })
}
