// Procedural macros for the Keel dispatch framework

use proc_macro::TokenStream;

mod injectable;

/// Derive constructor injection for a struct.
///
/// Each field is filled from the resolving scope:
///
/// - `Arc<T>` fields receive the shared provider registered for `T`,
/// - fields marked `#[inject(default)]` use `Default::default()`,
/// - any other field type `T` receives a clone of the provider for `T`.
#[proc_macro_derive(Injectable, attributes(inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::injectable_impl(input)
}
