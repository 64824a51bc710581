//! Rust source rendering of a [`FactoryPlan`].
//!
//! The output is a typed façade over `opfactory_runtime::Factory`: one async
//! method per public path and probe, the dispatch identities as a constant,
//! and the registration hook.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};

use crate::plan::{FactoryPlan, MethodBody, MethodRole, PlannedMethod};

/// Renders one plan as Rust source text.
#[must_use]
pub fn render_source(plan: &FactoryPlan) -> String {
    render(plan).to_string()
}

/// Renders one plan as a token stream.
#[must_use]
pub fn render(plan: &FactoryPlan) -> TokenStream {
    let factory = format_ident!("{}", plan.factory_name);
    let hook = format_ident!("{}", plan.registration_hook);
    let struct_doc = format!("Factory for `{}`.", plan.type_name);
    let operations = plan.dispatch.iter().map(|entry| entry.id.as_str());
    let methods = plan.methods.iter().map(render_method);

    quote! {
        #[doc = #struct_doc]
        #[derive(Clone)]
        pub struct #factory {
            inner: ::std::sync::Arc<::opfactory_runtime::Factory>,
        }

        impl #factory {
            /// Dispatch identities served by this factory.
            pub const OPERATIONS: &'static [&'static str] = &[#(#operations),*];

            #[must_use]
            pub fn new(inner: ::std::sync::Arc<::opfactory_runtime::Factory>) -> Self {
                Self { inner }
            }

            #(#methods)*
        }

        /// Stores the factory in the registry under its factory name.
        pub fn #hook(
            registry: &::opfactory_runtime::ServiceRegistry,
            factory: ::std::sync::Arc<::opfactory_runtime::Factory>,
        ) {
            factory.register(registry);
        }
    }
}

fn render_method(method: &PlannedMethod) -> TokenStream {
    let name = method.name.as_str();
    let ident = format_ident!("{}", name);
    let params: Vec<_> = method
        .params
        .iter()
        .map(|p| format_ident!("{}", p.name))
        .collect();
    let args = quote! { vec![#(#params.into()),*] };
    let typed = quote! { #(#params: impl ::std::convert::Into<::opfactory_core::Value>),* };
    let result = quote! { ::std::result::Result<::std::option::Option<::opfactory_runtime::Output>, ::opfactory_runtime::FactoryError> };

    match (&method.role, &method.body) {
        (MethodRole::Read, _) => quote! {
            pub async fn #ident(&self, #typed) -> #result {
                self.inner.read(#name, #args).await
            }
        },
        (MethodRole::Write, _) => quote! {
            pub async fn #ident(&self, target: ::opfactory_core::Entity, #typed) -> #result {
                self.inner.write(#name, target, #args).await
            }
        },
        (MethodRole::Save, MethodBody::Save { try_name, .. }) => {
            let try_variant = try_name.as_ref().map(|try_name| {
                let try_ident = format_ident!("{}", try_name);
                quote! {
                    pub async fn #try_ident(
                        &self,
                        target: ::opfactory_core::Entity,
                        #typed
                    ) -> ::std::result::Result<::opfactory_runtime::SaveAttempt, ::opfactory_runtime::FactoryError> {
                        self.inner.try_save(#name, target, #args).await
                    }
                }
            });
            quote! {
                pub async fn #ident(&self, target: ::opfactory_core::Entity, #typed) -> #result {
                    self.inner.save(#name, target, #args).await
                }
                #try_variant
            }
        }
        (MethodRole::Probe, _) | (MethodRole::Save, _) => quote! {
            pub async fn #ident(&self, #typed) -> ::std::result::Result<::opfactory_runtime::Authorized, ::opfactory_runtime::FactoryError> {
                self.inner.can(#name, #args).await
            }
        },
    }
}
