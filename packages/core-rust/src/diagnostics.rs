//! Non-fatal generation diagnostics.
//!
//! Every problem the pipeline can work around is recorded here instead of
//! failing the pass. Each diagnostic is also emitted as a `tracing` warning
//! at the moment it is recorded.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What went wrong, independent of where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Member text does not parse as a method signature.
    UnresolvableSyntax,
    /// A marker list names something that is not a known kind.
    UnknownMarker,
    /// Receiver usage contradicts the operation kind.
    InvalidReceiver,
    /// A base type named in the chain is not declared.
    UnresolvedBase,
    /// More than one policy association on one type.
    MultiplePolicies,
    /// The associated policy type is not declared.
    UnresolvedPolicy,
    /// Two same-kind writes share one parameter shape.
    AmbiguousSave,
    /// Every authorization bound to an operation needs the target instance.
    ProbeRequiresTarget,
}

impl DiagnosticCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnresolvableSyntax => "unresolvable-syntax",
            Self::UnknownMarker => "unknown-marker",
            Self::InvalidReceiver => "invalid-receiver",
            Self::UnresolvedBase => "unresolved-base",
            Self::MultiplePolicies => "multiple-policies",
            Self::UnresolvedPolicy => "unresolved-policy",
            Self::AmbiguousSave => "ambiguous-save",
            Self::ProbeRequiresTarget => "probe-requires-target",
        }
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    /// Type being generated when the problem was found.
    pub type_name: String,
    /// Member (method, policy, group) the problem concerns, if any.
    pub member: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.type_name)?;
        if let Some(member) = &self.member {
            write!(f, "::{member}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Diagnostics collected for one type during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic and logs it.
    pub fn report(
        &mut self,
        code: DiagnosticCode,
        type_name: &str,
        member: Option<&str>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            code,
            type_name: type_name.to_string(),
            member: member.map(str::to_string),
            message: message.into(),
        };
        tracing::warn!(
            code = code.as_str(),
            type_name = type_name,
            member = member.unwrap_or(""),
            "{}",
            diagnostic.message
        );
        self.entries.push(diagnostic);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// True when at least one diagnostic carries `code`.
    #[must_use]
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.entries.iter().any(|d| d.code == code)
    }
}
