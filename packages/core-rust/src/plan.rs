//! Emission plan: everything a factory for one type exposes.
//!
//! A [`FactoryPlan`] is the output of a generation pass. The runtime builds
//! a working factory from it; `render` prints it as Rust source.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bind::AuthorizationBinding;
use crate::diagnostics::Diagnostics;
use crate::model::{AuthorizationDescriptor, OperationDescriptor, ParameterDescriptor, ParameterRole};
use crate::synth::FactoryMethodSpec;

bitflags::bitflags! {
    /// Call paths emitted for one factory method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PathSet: u8 {
        /// Throwing public entry.
        const PUBLIC = 1 << 0;
        /// Non-throwing save variant.
        const TRY = 1 << 1;
        /// In-process execution.
        const LOCAL = 1 << 2;
        /// Cross-process dispatch.
        const REMOTE = 1 << 3;
        /// Authorization probe.
        const PROBE = 1 << 4;
    }
}

/// Stable identity of a dispatchable operation: `<Type>::<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    #[must_use]
    pub fn new(type_name: &str, method: &str) -> Self {
        Self(format!("{type_name}::{method}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodRole {
    Read,
    Write,
    Save,
    Probe,
}

/// What a planned method does when called.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodBody {
    /// Runs one operation behind its authorization gate.
    Operation {
        operation: OperationDescriptor,
        bindings: Vec<AuthorizationBinding>,
    },
    /// Routes on the target's save state to one of the named write methods.
    Save {
        insert: Option<String>,
        update: Option<String>,
        delete: Option<String>,
        try_name: Option<String>,
    },
    /// Evaluates the kept authorizations of the named method.
    Probe {
        wraps: String,
        operation: OperationDescriptor,
        bindings: Vec<AuthorizationBinding>,
    },
}

/// One resolved factory method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlannedMethod {
    pub name: String,
    pub role: MethodRole,
    pub paths: PathSet,
    /// Caller-supplied parameters after the target, injected ones removed.
    pub params: Vec<ParameterDescriptor>,
    /// Parameters shipped by the remote path: the target for writes, then
    /// caller-supplied values. Never contains injected parameters.
    pub remote_payload: Vec<ParameterDescriptor>,
    pub body: MethodBody,
}

impl PlannedMethod {
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.paths.contains(PathSet::REMOTE)
    }

    /// True when callers pass a target instance first.
    #[must_use]
    pub fn takes_target(&self) -> bool {
        matches!(self.role, MethodRole::Write | MethodRole::Save)
    }

    /// The wrapped operation of a read, write or probe.
    #[must_use]
    pub fn operation(&self) -> Option<&OperationDescriptor> {
        match &self.body {
            MethodBody::Operation { operation, .. } | MethodBody::Probe { operation, .. } => {
                Some(operation)
            }
            MethodBody::Save { .. } => None,
        }
    }

    #[must_use]
    pub fn bindings(&self) -> &[AuthorizationBinding] {
        match &self.body {
            MethodBody::Operation { bindings, .. } | MethodBody::Probe { bindings, .. } => bindings,
            MethodBody::Save { .. } => &[],
        }
    }
}

/// Receiving-side dispatch table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchEntry {
    pub id: OperationId,
    pub method: String,
}

/// Ways a factory can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Construction {
    /// Every path runs in process.
    Local,
    /// Cross-process operations go through a remote dispatcher.
    Remote,
}

/// Complete factory description for one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryPlan {
    pub type_name: String,
    pub factory_name: String,
    /// The type tracks `is_new` / `is_deleted`.
    pub save_state: bool,
    pub methods: Vec<PlannedMethod>,
    pub authorizations: Vec<AuthorizationDescriptor>,
    pub dispatch: Vec<DispatchEntry>,
    pub constructions: Vec<Construction>,
    pub registration_hook: String,
    pub diagnostics: Diagnostics,
}

impl FactoryPlan {
    /// Lays out the named specs of one type.
    #[must_use]
    pub fn build(
        type_name: &str,
        save_state: bool,
        specs: &[FactoryMethodSpec],
        authorizations: Vec<AuthorizationDescriptor>,
        diagnostics: Diagnostics,
    ) -> Self {
        let methods: Vec<PlannedMethod> = specs
            .iter()
            .map(|spec| plan_method(type_name, spec, specs))
            .collect();

        let dispatch = methods
            .iter()
            .filter(|m| m.is_remote() && m.role != MethodRole::Save)
            .map(|m| DispatchEntry {
                id: OperationId::new(type_name, &m.name),
                method: m.name.clone(),
            })
            .collect::<Vec<_>>();

        let mut constructions = vec![Construction::Local];
        if !dispatch.is_empty() {
            constructions.push(Construction::Remote);
        }

        Self {
            type_name: type_name.to_string(),
            factory_name: format!("{type_name}Factory"),
            save_state,
            methods,
            authorizations,
            dispatch,
            constructions,
            registration_hook: format!("register_{}_factory", snake_case(type_name)),
            diagnostics,
        }
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Option<&PlannedMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Dispatch identity of a remote method.
    #[must_use]
    pub fn operation_id(&self, method: &str) -> OperationId {
        OperationId::new(&self.type_name, method)
    }

    #[must_use]
    pub fn supports(&self, construction: Construction) -> bool {
        self.constructions.contains(&construction)
    }
}

fn plan_method(
    type_name: &str,
    spec: &FactoryMethodSpec,
    specs: &[FactoryMethodSpec],
) -> PlannedMethod {
    match spec {
        FactoryMethodSpec::Read(read) => operation_method(
            &read.name,
            MethodRole::Read,
            &read.bound.operation,
            &read.bound.bindings,
        ),
        FactoryMethodSpec::Write(write) => operation_method(
            &write.name,
            MethodRole::Write,
            &write.bound.operation,
            &write.bound.bindings,
        ),
        FactoryMethodSpec::Save(save) => {
            let branch_name = |slot: Option<usize>| slot.map(|i| specs[i].name().to_string());
            let remote = [save.insert, save.update, save.delete]
                .into_iter()
                .flatten()
                .filter_map(|i| specs[i].bound())
                .any(|b| b.operation.remote);
            let mut paths = PathSet::PUBLIC | PathSet::LOCAL;
            paths.set(PathSet::TRY, save.try_name.is_some());
            paths.set(PathSet::REMOTE, remote);
            let target = ParameterDescriptor::new("target", type_name, ParameterRole::SelfReference);
            PlannedMethod {
                name: save.name.clone(),
                role: MethodRole::Save,
                paths,
                params: save.params.clone(),
                remote_payload: std::iter::once(target).chain(save.params.iter().cloned()).collect(),
                body: MethodBody::Save {
                    insert: branch_name(save.insert),
                    update: branch_name(save.update),
                    delete: branch_name(save.delete),
                    try_name: save.try_name.clone(),
                },
            }
        }
        FactoryMethodSpec::Can(probe) => {
            let wrapped = &specs[probe.wraps];
            let operation = probe.operation.clone();
            let mut paths = PathSet::PROBE;
            paths.set(PathSet::REMOTE, probe.remote);
            let params: Vec<_> = operation.public_params().cloned().collect();
            PlannedMethod {
                name: probe.name.clone(),
                role: MethodRole::Probe,
                paths,
                remote_payload: params.clone(),
                params,
                body: MethodBody::Probe {
                    wraps: wrapped.name().to_string(),
                    operation,
                    bindings: probe.bindings.clone(),
                },
            }
        }
    }
}

fn operation_method(
    name: &str,
    role: MethodRole,
    operation: &OperationDescriptor,
    bindings: &[AuthorizationBinding],
) -> PlannedMethod {
    let mut paths = PathSet::PUBLIC | PathSet::LOCAL;
    paths.set(PathSet::REMOTE, operation.remote);
    let params: Vec<_> = operation.public_params().cloned().collect();
    let remote_payload = operation
        .params
        .iter()
        .take(usize::from(operation.is_write()))
        .chain(params.iter())
        .cloned()
        .collect();
    PlannedMethod {
        name: name.to_string(),
        role,
        paths,
        params,
        remote_payload,
        body: MethodBody::Operation {
            operation: operation.clone(),
            bindings: bindings.to_vec(),
        },
    }
}

/// `PersonModel` -> `person_model`.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
