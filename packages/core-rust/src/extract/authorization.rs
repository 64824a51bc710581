use crate::catalog::{BaseChain, Catalog};
use crate::config::GeneratorConfig;
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::{AuthorizationDescriptor, ParameterDescriptor, ParameterRole};

use super::operation::{is_self_type, member_hint};
use super::signature::parse_signature;

/// Extracts the authorization descriptors governing the chain's owning type.
///
/// The policy association is taken from the nearest chain member declaring
/// one. No association, more than one association on that member, or an
/// association naming an undeclared type all produce an empty result, so
/// every operation stays open.
pub fn extract_authorizations(
    catalog: &Catalog,
    chain: &BaseChain<'_>,
    config: &GeneratorConfig,
    diags: &mut Diagnostics,
) -> Vec<AuthorizationDescriptor> {
    let Some(owner) = chain.members.first() else {
        return Vec::new();
    };
    let owning = owner.name.as_str();

    let Some(declaring) = chain.members.iter().find(|s| !s.authorize.is_empty()) else {
        return Vec::new();
    };
    if declaring.authorize.len() > 1 {
        diags.report(
            DiagnosticCode::MultiplePolicies,
            owning,
            None,
            format!(
                "`{}` declares {} policy associations ({}); only one is permitted",
                declaring.name,
                declaring.authorize.len(),
                declaring.authorize.join(", ")
            ),
        );
        return Vec::new();
    }
    let policy = declaring.authorize[0].as_str();

    let policy_chain = match catalog.chain(policy) {
        Ok(chain) => chain,
        Err(err) => {
            diags.report(
                DiagnosticCode::UnresolvedPolicy,
                owning,
                Some(policy),
                format!("policy cannot be resolved ({err}); operations stay open"),
            );
            return Vec::new();
        }
    };
    if let Some(base) = &policy_chain.unresolved {
        diags.report(
            DiagnosticCode::UnresolvedBase,
            owning,
            Some(base),
            format!("base `{base}` of policy `{policy}` is not declared"),
        );
    }

    let mut authorizations = Vec::new();
    for surface in &policy_chain.members {
        for text in &surface.methods {
            let sig = match parse_signature(text, config) {
                Ok(sig) => sig,
                Err(message) => {
                    diags.report(
                        DiagnosticCode::UnresolvableSyntax,
                        owning,
                        member_hint(text),
                        format!("policy member of `{}` skipped: {message}", surface.name),
                    );
                    continue;
                }
            };
            let Some(markers) = &sig.authorize else {
                continue;
            };
            for unknown in &markers.unknown {
                diags.report(
                    DiagnosticCode::UnknownMarker,
                    owning,
                    Some(&sig.name),
                    format!("`{unknown}` is not a governed operation"),
                );
            }
            if markers.operations.is_empty() {
                if markers.unknown.is_empty() {
                    diags.report(
                        DiagnosticCode::UnknownMarker,
                        owning,
                        Some(&sig.name),
                        "authorization marker governs no operation",
                    );
                }
                continue;
            }

            let params = sig
                .params
                .iter()
                .map(|raw| {
                    let role = if raw.injected {
                        ParameterRole::Injected
                    } else if is_self_type(&raw.ty, owning, owning) {
                        ParameterRole::SelfReference
                    } else {
                        ParameterRole::Business
                    };
                    ParameterDescriptor::new(raw.name.clone(), raw.ty.clone(), role)
                })
                .collect();

            authorizations.push(AuthorizationDescriptor {
                operations: markers.operations,
                declaring_type: surface.name.clone(),
                method: sig.name.clone(),
                params,
                remote: markers.remote,
                awaitable: sig.shape.is_awaitable(),
            });
        }
    }

    tracing::debug!(
        type_name = owning,
        policy = policy,
        authorizations = authorizations.len(),
        "extracted authorizations"
    );
    authorizations
}
