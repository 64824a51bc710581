//! Factory method synthesis.
//!
//! Bound operations become read and write specs; writes sharing a parameter
//! shape are aggregated into saves; gated reads and writes get probes. The
//! result is one flat list in emission order: reads and writes in discovery
//! order, then saves, then probes. Saves and probes refer to the specs they
//! wrap by position in that list.

pub mod save;

use serde::{Deserialize, Serialize};

use crate::bind::{AuthorizationBinding, BoundOperation};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::OperationDescriptor;

pub use save::{SaveBranch, SaveSpec};

/// Create, Fetch or Execute operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadSpec {
    pub name: String,
    pub bound: BoundOperation,
}

/// Insert, Update or Delete operation; always takes the target first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteSpec {
    pub name: String,
    pub bound: BoundOperation,
}

/// Authorization probe over a read or write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanSpec {
    pub name: String,
    /// Position of the wrapped read or write spec.
    pub wraps: usize,
    pub operation: OperationDescriptor,
    /// Bindings of the wrapped spec that do not need the target.
    pub bindings: Vec<AuthorizationBinding>,
    pub remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactoryMethodSpec {
    Read(ReadSpec),
    Write(WriteSpec),
    Save(SaveSpec),
    Can(CanSpec),
}

impl FactoryMethodSpec {
    /// Resolved name; empty until the naming pass has run.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Read(spec) => &spec.name,
            Self::Write(spec) => &spec.name,
            Self::Save(spec) => &spec.name,
            Self::Can(spec) => &spec.name,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        match self {
            Self::Read(spec) => spec.name = name,
            Self::Write(spec) => spec.name = name,
            Self::Save(spec) => spec.name = name,
            Self::Can(spec) => spec.name = name,
        }
    }

    /// Bound operation of a read or write.
    #[must_use]
    pub fn bound(&self) -> Option<&BoundOperation> {
        match self {
            Self::Read(spec) => Some(&spec.bound),
            Self::Write(spec) => Some(&spec.bound),
            Self::Save(_) | Self::Can(_) => None,
        }
    }

    /// Name before collision resolution. Saves and probes derive theirs
    /// during naming.
    #[must_use]
    pub fn base_name(&self) -> &str {
        match self.bound() {
            Some(bound) => &bound.operation.public_name,
            None => self.name(),
        }
    }

    /// Number of caller-supplied arguments, counting a write's target.
    #[must_use]
    pub fn param_count(&self) -> usize {
        match self {
            Self::Read(spec) => spec.bound.operation.public_params().count(),
            Self::Write(spec) => spec.bound.operation.public_params().count() + 1,
            Self::Save(spec) => spec.params.len() + 1,
            Self::Can(_) => 0,
        }
    }

    /// Discovery order used to break naming ties.
    #[must_use]
    pub fn order(&self) -> usize {
        match self {
            Self::Read(spec) => spec.bound.operation.index,
            Self::Write(spec) => spec.bound.operation.index,
            Self::Save(spec) => spec.order,
            Self::Can(spec) => spec.wraps,
        }
    }
}

/// Builds the spec list for one type from its bound operations.
pub fn synthesize(
    type_name: &str,
    bound: Vec<BoundOperation>,
    diags: &mut Diagnostics,
) -> Vec<FactoryMethodSpec> {
    let mut specs: Vec<FactoryMethodSpec> = bound
        .into_iter()
        .map(|bound| {
            if bound.operation.is_write() {
                FactoryMethodSpec::Write(WriteSpec {
                    name: String::new(),
                    bound,
                })
            } else {
                FactoryMethodSpec::Read(ReadSpec {
                    name: String::new(),
                    bound,
                })
            }
        })
        .collect();

    let order_base = specs.iter().map(FactoryMethodSpec::order).max().map_or(0, |m| m + 1);
    let saves = save::aggregate(type_name, &specs, order_base, diags);
    let probes = probes(type_name, &specs, diags);

    tracing::debug!(
        type_name = type_name,
        operations = specs.len(),
        saves = saves.len(),
        probes = probes.len(),
        "synthesized factory methods"
    );

    specs.extend(saves.into_iter().map(FactoryMethodSpec::Save));
    specs.extend(probes.into_iter().map(FactoryMethodSpec::Can));
    specs
}

fn probes(type_name: &str, specs: &[FactoryMethodSpec], diags: &mut Diagnostics) -> Vec<CanSpec> {
    let mut probes = Vec::new();
    for (position, spec) in specs.iter().enumerate() {
        let Some(bound) = spec.bound() else {
            continue;
        };
        if !bound.is_gated() {
            continue;
        }
        let bindings: Vec<_> = bound
            .bindings
            .iter()
            .filter(|b| !b.needs_target())
            .cloned()
            .collect();
        if bindings.is_empty() {
            diags.report(
                DiagnosticCode::ProbeRequiresTarget,
                type_name,
                Some(&bound.operation.method),
                "every authorization needs the target instance; no probe is generated",
            );
            continue;
        }
        probes.push(CanSpec {
            name: String::new(),
            wraps: position,
            operation: bound.operation.clone(),
            bindings,
            remote: bound.operation.remote,
        });
    }
    probes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::ArgSource;
    use crate::model::{OperationKind, ParameterDescriptor, ParameterRole, ReturnShape};

    fn bound(kind: OperationKind, method: &str, index: usize, tys: &[&str], bindings: Vec<AuthorizationBinding>) -> BoundOperation {
        let mut params = Vec::new();
        if kind.is_write() {
            params.push(ParameterDescriptor::new("target", "Person", ParameterRole::SelfReference));
        }
        params.extend(
            tys.iter()
                .enumerate()
                .map(|(i, ty)| ParameterDescriptor::new(format!("p{i}"), *ty, ParameterRole::Business)),
        );
        BoundOperation {
            operation: OperationDescriptor {
                kind,
                declaring_type: "Person".to_string(),
                method: method.to_string(),
                handler: format!("Person::{method}"),
                public_name: method.to_string(),
                shape: ReturnShape::Value,
                remote: false,
                params,
                index,
            },
            bindings,
        }
    }

    fn open() -> Vec<AuthorizationBinding> {
        vec![AuthorizationBinding {
            authorization: 0,
            args: vec![],
        }]
    }

    fn on_target() -> Vec<AuthorizationBinding> {
        vec![AuthorizationBinding {
            authorization: 1,
            args: vec![ArgSource::Target],
        }]
    }

    fn saves(specs: &[FactoryMethodSpec]) -> Vec<&SaveSpec> {
        specs
            .iter()
            .filter_map(|s| match s {
                FactoryMethodSpec::Save(save) => Some(save),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn writes_with_same_shape_form_one_save() {
        let mut diags = Diagnostics::new();
        let specs = synthesize(
            "Person",
            vec![
                bound(OperationKind::Insert, "insert", 0, &[], vec![]),
                bound(OperationKind::Update, "update", 1, &[], vec![]),
                bound(OperationKind::Delete, "delete", 2, &[], vec![]),
            ],
            &mut diags,
        );
        let saves = saves(&specs);
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].insert, Some(0));
        assert_eq!(saves[0].update, Some(1));
        assert_eq!(saves[0].delete, Some(2));
        assert!(!saves[0].gated);
        assert!(diags.is_empty());
    }

    #[test]
    fn distinct_shapes_form_distinct_saves() {
        let mut diags = Diagnostics::new();
        let specs = synthesize(
            "Person",
            vec![
                bound(OperationKind::Insert, "insert", 0, &[], vec![]),
                bound(OperationKind::Insert, "insert_with", 1, &["String"], vec![]),
                bound(OperationKind::Update, "update_with", 2, &["String"], vec![]),
            ],
            &mut diags,
        );
        let saves = saves(&specs);
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[1].insert, Some(1));
        assert_eq!(saves[1].update, Some(2));
        assert_eq!(saves[1].params.len(), 1);
    }

    #[test]
    fn same_kind_twice_in_one_shape_is_ambiguous() {
        let mut diags = Diagnostics::new();
        let specs = synthesize(
            "Person",
            vec![
                bound(OperationKind::Insert, "insert", 0, &["i64"], vec![]),
                bound(OperationKind::Insert, "insert_again", 1, &["i64"], vec![]),
            ],
            &mut diags,
        );
        assert!(saves(&specs).is_empty());
        assert!(diags.contains(DiagnosticCode::AmbiguousSave));
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn reads_alone_produce_no_save() {
        let mut diags = Diagnostics::new();
        let specs = synthesize(
            "Person",
            vec![bound(OperationKind::Fetch, "fetch", 0, &["i64"], open())],
            &mut diags,
        );
        assert!(saves(&specs).is_empty());
        assert!(matches!(specs.last(), Some(FactoryMethodSpec::Can(c)) if c.wraps == 0));
    }

    #[test]
    fn probe_drops_target_bindings() {
        let mut diags = Diagnostics::new();
        let mut both = open();
        both.extend(on_target());
        let specs = synthesize(
            "Person",
            vec![bound(OperationKind::Update, "update", 0, &[], both)],
            &mut diags,
        );
        let FactoryMethodSpec::Can(probe) = specs.last().unwrap() else {
            panic!("expected probe");
        };
        assert_eq!(probe.bindings.len(), 1);
        assert_eq!(probe.bindings[0].authorization, 0);
    }

    #[test]
    fn probe_needing_only_target_is_reported() {
        let mut diags = Diagnostics::new();
        let specs = synthesize(
            "Person",
            vec![bound(OperationKind::Delete, "delete", 0, &[], on_target())],
            &mut diags,
        );
        assert!(!specs.iter().any(|s| matches!(s, FactoryMethodSpec::Can(_))));
        assert!(diags.contains(DiagnosticCode::ProbeRequiresTarget));
        assert!(saves(&specs)[0].gated);
    }
}
