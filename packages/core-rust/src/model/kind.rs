use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle role of a factory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Fetch,
    Insert,
    Update,
    Delete,
    Execute,
}

/// Coarse grouping of operation kinds used by authorization masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationFamily {
    Read,
    Write,
}

bitflags::bitflags! {
    /// Set of operations governed by one authorization method.
    ///
    /// Fine-grained kinds plus the coarse `READ` / `WRITE` families. A
    /// check governs an operation when the mask intersects either the
    /// operation's own flag or its family flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AuthorizeOperation: u32 {
        const CREATE = 1 << 0;
        const FETCH = 1 << 1;
        const INSERT = 1 << 2;
        const UPDATE = 1 << 3;
        const DELETE = 1 << 4;
        const EXECUTE = 1 << 5;
        const READ = 1 << 6;
        const WRITE = 1 << 7;
    }
}

impl OperationKind {
    /// All kinds in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Create,
        Self::Fetch,
        Self::Insert,
        Self::Update,
        Self::Delete,
        Self::Execute,
    ];

    /// Parses a marker name (`create`, `fetch`, ...). Case-insensitive.
    #[must_use]
    pub fn from_marker(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Lower-case marker name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Fetch => "fetch",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Execute => "execute",
        }
    }

    /// Coarse family of this kind. Execute counts as a read.
    #[must_use]
    pub const fn family(self) -> OperationFamily {
        match self {
            Self::Create | Self::Fetch | Self::Execute => OperationFamily::Read,
            Self::Insert | Self::Update | Self::Delete => OperationFamily::Write,
        }
    }

    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self.family(), OperationFamily::Write)
    }

    /// The fine-grained flag for this kind.
    #[must_use]
    pub const fn flag(self) -> AuthorizeOperation {
        match self {
            Self::Create => AuthorizeOperation::CREATE,
            Self::Fetch => AuthorizeOperation::FETCH,
            Self::Insert => AuthorizeOperation::INSERT,
            Self::Update => AuthorizeOperation::UPDATE,
            Self::Delete => AuthorizeOperation::DELETE,
            Self::Execute => AuthorizeOperation::EXECUTE,
        }
    }

    /// Own flag plus family flag: the mask an authorization must intersect.
    #[must_use]
    pub const fn governing_mask(self) -> AuthorizeOperation {
        self.flag().union(self.family().flag())
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OperationFamily {
    #[must_use]
    pub const fn flag(self) -> AuthorizeOperation {
        match self {
            Self::Read => AuthorizeOperation::READ,
            Self::Write => AuthorizeOperation::WRITE,
        }
    }
}

impl AuthorizeOperation {
    /// Parses one governed-operation name from a policy marker.
    #[must_use]
    pub fn from_marker(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "read" => Some(Self::READ),
            "write" => Some(Self::WRITE),
            other => OperationKind::from_marker(other).map(OperationKind::flag),
        }
    }

    /// True when this mask governs operations of the given kind.
    #[must_use]
    pub const fn governs(self, kind: OperationKind) -> bool {
        self.intersects(kind.governing_mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_is_read_family() {
        assert_eq!(OperationKind::Execute.family(), OperationFamily::Read);
        assert!(!OperationKind::Execute.is_write());
        assert!(OperationKind::Delete.is_write());
    }

    #[test]
    fn marker_names_parse_case_insensitively() {
        assert_eq!(OperationKind::from_marker("Fetch"), Some(OperationKind::Fetch));
        assert_eq!(OperationKind::from_marker("upsert"), None);
        assert_eq!(
            AuthorizeOperation::from_marker("WRITE"),
            Some(AuthorizeOperation::WRITE)
        );
        assert_eq!(
            AuthorizeOperation::from_marker("insert"),
            Some(AuthorizeOperation::INSERT)
        );
    }

    #[test]
    fn coarse_write_governs_every_write_kind() {
        let mask = AuthorizeOperation::WRITE;
        assert!(mask.governs(OperationKind::Insert));
        assert!(mask.governs(OperationKind::Update));
        assert!(mask.governs(OperationKind::Delete));
        assert!(!mask.governs(OperationKind::Fetch));
    }

    #[test]
    fn fine_grained_flag_governs_only_its_kind() {
        let mask = AuthorizeOperation::FETCH;
        assert!(mask.governs(OperationKind::Fetch));
        assert!(!mask.governs(OperationKind::Create));
        assert!(!mask.governs(OperationKind::Execute));
    }
}
