use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Field, Fields, GenericArgument, PathArguments, Type, parse_macro_input,
};

pub fn injectable_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            struct_name,
            "Injectable can only be derived for structs",
        ));
    };

    let body = match &data.fields {
        Fields::Named(fields) => {
            let inits = fields
                .named
                .iter()
                .map(|field| {
                    let name = &field.ident;
                    let value = field_value(field)?;
                    Ok(quote! { #name: #value })
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! { Self { #(#inits),* } }
        }
        Fields::Unnamed(fields) => {
            let values = fields
                .unnamed
                .iter()
                .map(field_value)
                .collect::<syn::Result<Vec<_>>>()?;
            quote! { Self(#(#values),*) }
        }
        Fields::Unit => quote! { Self },
    };

    Ok(quote! {
        impl #impl_generics keel_core::Injectable for #struct_name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn inject(scope: &keel_core::Container) -> ::std::result::Result<Self, keel_core::Error> {
                ::std::result::Result::Ok(#body)
            }
        }
    })
}

fn field_value(field: &Field) -> syn::Result<TokenStream2> {
    if uses_default(field)? {
        return Ok(quote! { ::std::default::Default::default() });
    }

    match arc_inner(&field.ty) {
        Some(inner) => Ok(quote! { scope.resolve::<#inner>()? }),
        None => {
            let ty = &field.ty;
            Ok(quote! { (*scope.resolve::<#ty>()?).clone() })
        }
    }
}

/// Whether the field carries `#[inject(default)]`
fn uses_default(field: &Field) -> syn::Result<bool> {
    let mut default = false;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("inject")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("default") {
                default = true;
                Ok(())
            } else {
                Err(meta.error("unsupported inject option, expected `default`"))
            }
        })?;
    }
    Ok(default)
}

/// `T` for a field typed `Arc<T>` (any path ending in `Arc`)
fn arc_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
