use std::collections::{BTreeMap, HashMap};

use crate::catalog::BaseChain;
use crate::config::GeneratorConfig;
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::{OperationDescriptor, OperationKind, ParameterDescriptor, ParameterRole};

use super::signature::{parse_signature, strip_references, MethodSignature};

/// Extracts one [`OperationDescriptor`] per operation marker found on the
/// chain's methods, own-type members first.
///
/// Members that cannot be parsed, unknown markers and receiver misuse are
/// reported to `diags` and skipped; everything else still yields
/// descriptors.
pub fn extract_operations(
    chain: &BaseChain<'_>,
    config: &GeneratorConfig,
    diags: &mut Diagnostics,
) -> Vec<OperationDescriptor> {
    let Some(owner) = chain.members.first() else {
        return Vec::new();
    };
    let owning = owner.name.as_str();

    if let Some(base) = &chain.unresolved {
        diags.report(
            DiagnosticCode::UnresolvedBase,
            owning,
            Some(base),
            format!("base type `{base}` is not declared; inherited operations are ignored"),
        );
    }

    let mut operations = Vec::new();
    let mut index = 0;
    for surface in &chain.members {
        for text in &surface.methods {
            let sig = match parse_signature(text, config) {
                Ok(sig) => sig,
                Err(message) => {
                    diags.report(
                        DiagnosticCode::UnresolvableSyntax,
                        owning,
                        member_hint(text),
                        format!("member of `{}` skipped: {message}", surface.name),
                    );
                    continue;
                }
            };
            let before = operations.len();
            describe(&sig, owning, &surface.name, index, &mut operations, diags);
            if operations.len() > before {
                index += 1;
            }
        }
    }

    key_overloads(&mut operations);

    tracing::debug!(
        type_name = owning,
        operations = operations.len(),
        "extracted operations"
    );
    operations
}

fn describe(
    sig: &MethodSignature,
    owning: &str,
    declaring: &str,
    index: usize,
    out: &mut Vec<OperationDescriptor>,
    diags: &mut Diagnostics,
) {
    let Some(markers) = &sig.factory else {
        return;
    };

    for unknown in &markers.unknown {
        let message = if unknown.is_empty() {
            "operation marker names no kind".to_string()
        } else {
            format!("`{unknown}` is not an operation kind")
        };
        diags.report(DiagnosticCode::UnknownMarker, owning, Some(&sig.name), message);
    }
    if markers.kinds.is_empty() && markers.unknown.is_empty() {
        diags.report(
            DiagnosticCode::UnknownMarker,
            owning,
            Some(&sig.name),
            "operation marker names no kind",
        );
    }

    if let Some(callable) = &markers.callable {
        if syn::parse_str::<syn::Ident>(callable).is_err() {
            diags.report(
                DiagnosticCode::UnknownMarker,
                owning,
                Some(&sig.name),
                format!("`{callable}` is not a valid callable name"),
            );
            return;
        }
    }

    for &kind in &markers.kinds {
        let wants_receiver = kind != OperationKind::Execute;
        if wants_receiver != sig.has_receiver {
            let message = if wants_receiver {
                format!("{kind} operations take `&mut self`")
            } else {
                "execute operations are associated functions without `self`".to_string()
            };
            diags.report(DiagnosticCode::InvalidReceiver, owning, Some(&sig.name), message);
            continue;
        }

        let mut params = Vec::with_capacity(sig.params.len() + 1);
        if kind.is_write() {
            params.push(ParameterDescriptor::new(
                "target",
                owning,
                ParameterRole::SelfReference,
            ));
        }
        params.extend(sig.params.iter().map(|raw| {
            let role = if raw.injected {
                ParameterRole::Injected
            } else if is_self_type(&raw.ty, owning, declaring) {
                ParameterRole::SelfReference
            } else {
                ParameterRole::Business
            };
            ParameterDescriptor::new(raw.name.clone(), raw.ty.clone(), role)
        }));

        let public_name = match (&markers.callable, kind) {
            (Some(callable), OperationKind::Execute) => callable.clone(),
            _ => sig.name.clone(),
        };

        out.push(OperationDescriptor {
            kind,
            declaring_type: declaring.to_string(),
            method: sig.name.clone(),
            handler: format!("{declaring}::{}", sig.name),
            public_name,
            shape: sig.shape,
            remote: markers.remote,
            params,
            index,
        });
    }
}

/// Rewrites the handler keys of methods a type declares more than once so
/// each overload binds its own handler. Kinds sharing one method keep one
/// key between them.
fn key_overloads(operations: &mut [OperationDescriptor]) {
    // (declaring type, method) -> index -> declared parameter types
    let mut overloads: BTreeMap<(&str, &str), BTreeMap<usize, Vec<&str>>> = BTreeMap::new();
    for op in operations.iter() {
        overloads
            .entry((op.declaring_type.as_str(), op.method.as_str()))
            .or_default()
            .entry(op.index)
            .or_insert_with(|| declared_types(op));
    }

    let mut keys: HashMap<usize, String> = HashMap::new();
    for ((declaring, method), signatures) in &overloads {
        if signatures.len() < 2 {
            continue;
        }
        for (&index, types) in signatures {
            let same_arity = signatures.values().filter(|t| t.len() == types.len()).count();
            let key = if same_arity == 1 {
                format!("{declaring}::{method}/{}", types.len())
            } else {
                format!("{declaring}::{method}({})", types.join(", "))
            };
            keys.insert(index, key);
        }
    }

    for op in operations.iter_mut() {
        if let Some(key) = keys.get(&op.index) {
            op.handler.clone_from(key);
        }
    }
}

/// Declared parameter types, leaving out the implicit write target.
fn declared_types(op: &OperationDescriptor) -> Vec<&str> {
    op.params
        .iter()
        .skip(usize::from(op.is_write()))
        .map(|p| p.ty.as_str())
        .collect()
}

/// True when `ty`, references stripped, names the owning type, the
/// declaring type, or `Self`.
pub(crate) fn is_self_type(ty: &str, owning: &str, declaring: &str) -> bool {
    let base = strip_references(ty);
    base == owning || base == declaring || base == "Self"
}

/// Best-effort method name for diagnostics on unparseable text.
pub(crate) fn member_hint(text: &str) -> Option<&str> {
    let after = text.split("fn ").nth(1)?.trim_start();
    let end = after
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(after.len());
    (end > 0).then(|| &after[..end])
}
