//! Save aggregation and state-based routing.

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::model::{OperationKind, ParameterDescriptor};
use crate::types::SaveState;

use super::FactoryMethodSpec;

/// Write branch a save resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveBranch {
    Insert,
    Update,
    Delete,
}

impl SaveBranch {
    /// Routes on the target's save-state flags. `None` means the save is a
    /// no-op: the instance is new and already marked deleted.
    #[must_use]
    pub const fn route(state: SaveState) -> Option<Self> {
        match (state.is_new, state.is_deleted) {
            (true, true) => None,
            (true, false) => Some(Self::Insert),
            (false, true) => Some(Self::Delete),
            (false, false) => Some(Self::Update),
        }
    }

    #[must_use]
    pub const fn kind(self) -> OperationKind {
        match self {
            Self::Insert => OperationKind::Insert,
            Self::Update => OperationKind::Update,
            Self::Delete => OperationKind::Delete,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.kind().as_str()
    }
}

/// Save method aggregating up to one write of each kind sharing one
/// caller-visible parameter shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveSpec {
    pub name: String,
    /// Name of the non-throwing variant; only set when a branch is gated.
    pub try_name: Option<String>,
    /// Positions of the branch write specs in the synthesized spec list.
    pub insert: Option<usize>,
    pub update: Option<usize>,
    pub delete: Option<usize>,
    /// Caller-visible parameters after the target, taken from the first
    /// write of the group.
    pub params: Vec<ParameterDescriptor>,
    /// True when at least one branch carries authorizations.
    pub gated: bool,
    pub order: usize,
}

impl SaveSpec {
    /// Position of the write spec handling `branch`, if declared.
    #[must_use]
    pub fn branch(&self, branch: SaveBranch) -> Option<usize> {
        match branch {
            SaveBranch::Insert => self.insert,
            SaveBranch::Update => self.update,
            SaveBranch::Delete => self.delete,
        }
    }

    fn slot(&mut self, kind: OperationKind) -> Option<&mut Option<usize>> {
        match kind {
            OperationKind::Insert => Some(&mut self.insert),
            OperationKind::Update => Some(&mut self.update),
            OperationKind::Delete => Some(&mut self.delete),
            _ => None,
        }
    }
}

/// Groups the write specs in `specs` by shape, in discovery order, and
/// returns one save per unambiguous group.
pub(super) fn aggregate(
    type_name: &str,
    specs: &[FactoryMethodSpec],
    order_base: usize,
    diags: &mut Diagnostics,
) -> Vec<SaveSpec> {
    let mut groups: Vec<(Vec<String>, Vec<usize>)> = Vec::new();
    for (position, spec) in specs.iter().enumerate() {
        let FactoryMethodSpec::Write(write) = spec else {
            continue;
        };
        let key = write.bound.operation.shape_key();
        match groups.iter_mut().find(|(shape, _)| *shape == key) {
            Some((_, members)) => members.push(position),
            None => groups.push((key, vec![position])),
        }
    }

    let mut saves = Vec::new();
    'groups: for (shape, members) in groups {
        let mut save = SaveSpec {
            name: String::new(),
            try_name: None,
            insert: None,
            update: None,
            delete: None,
            params: Vec::new(),
            gated: false,
            order: order_base + saves.len(),
        };
        for &position in &members {
            let FactoryMethodSpec::Write(write) = &specs[position] else {
                continue;
            };
            let operation = &write.bound.operation;
            let Some(slot) = save.slot(operation.kind) else {
                continue;
            };
            if let Some(existing) = *slot {
                diags.report(
                    DiagnosticCode::AmbiguousSave,
                    type_name,
                    Some(&format!("({})", shape.join(", "))),
                    format!(
                        "`{}` and `{}` are both {} operations with the same parameters; no save is generated for them",
                        specs[existing].base_name(),
                        operation.method,
                        operation.kind
                    ),
                );
                continue 'groups;
            }
            *slot = Some(position);
            save.gated |= write.bound.is_gated();
            if save.params.is_empty() {
                save.params = operation.public_params().cloned().collect();
            }
        }
        saves.push(save);
    }
    saves
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn routing_table() {
        let cases = [
            (true, true, None),
            (true, false, Some(SaveBranch::Insert)),
            (false, true, Some(SaveBranch::Delete)),
            (false, false, Some(SaveBranch::Update)),
        ];
        for (is_new, is_deleted, expected) in cases {
            let state = SaveState { is_new, is_deleted };
            assert_eq!(SaveBranch::route(state), expected, "{state:?}");
        }
    }

    proptest! {
        #[test]
        fn route_only_noops_on_new_and_deleted(is_new in any::<bool>(), is_deleted in any::<bool>()) {
            let routed = SaveBranch::route(SaveState { is_new, is_deleted });
            prop_assert_eq!(routed.is_none(), is_new && is_deleted);
            if let Some(branch) = routed {
                prop_assert_eq!(branch == SaveBranch::Insert, is_new);
                prop_assert_eq!(branch == SaveBranch::Delete, is_deleted);
            }
        }
    }
}
