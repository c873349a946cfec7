//! Errors raised while patching.
//!
//! Every [`PatchError`] is fatal to the patch-build: it means a rule's
//! assumptions about a compiled method do not hold, or the engine was misused.

use ilpatch_bytecode::{InstrId, InstrStream, StreamError};

use crate::cursor::Direction;
use crate::manifest::MethodKey;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("no loaded module defines `{ty}::{member}`")]
    SymbolNotFound { ty: String, member: String },

    #[error("`{ty}::{member}` is ambiguous; candidates: {}", .candidates.join(", "))]
    AmbiguousSymbol {
        ty: String,
        member: String,
        candidates: Vec<String>,
    },

    /// `last_match` is the position of the last successful match of the
    /// searching cursor, if any.
    #[error("pattern [{pattern}] not found searching {direction}{}", last_match_note(.last_match))]
    PatternNotFound {
        pattern: String,
        direction: Direction,
        last_match: Option<usize>,
    },

    #[error("unsupported operand shape at position {position} (`{instr}`): {reason}")]
    UnsupportedOperandShape {
        position: usize,
        instr: String,
        reason: String,
    },

    #[error("rule `{0}` is already registered")]
    DuplicateRuleName(String),

    #[error("no rule named `{0}` is registered")]
    UnknownRule(String),

    #[error("rule `{rule}` was already applied to `{target}`")]
    RuleAlreadyApplied { rule: String, target: String },

    #[error("`{0}` has no body to patch")]
    MissingBody(String),

    #[error("`{0}` is already committed")]
    AlreadyCommitted(String),

    #[error("`{0}` is not a method")]
    NotAMethod(String),

    /// The rule argument does not decode into the shape the rule expects.
    #[error("invalid rule argument: {0}")]
    InvalidRuleArg(String),

    #[error("cursor does not point into this stream")]
    InvalidAnchor,

    #[error(transparent)]
    Stream(#[from] StreamError),
}

fn last_match_note(last_match: &Option<usize>) -> String {
    match last_match {
        Some(pos) => format!(" (last match at position {pos})"),
        None => String::new(),
    }
}

pub type PatchResult<T> = std::result::Result<T, PatchError>;

/// A fatal patch-build failure, attributed to the rule and target it hit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("rule `{rule}` failed on `{target}`: {source}")]
pub struct BuildError {
    pub rule: String,
    pub target: MethodKey,
    #[source]
    pub source: PatchError,
}

impl BuildError {
    pub fn new(rule: &str, target: &MethodKey, source: PatchError) -> Self {
        Self {
            rule: rule.to_owned(),
            target: target.clone(),
            source,
        }
    }
}

/// `UnsupportedOperandShape` for the instruction at `id`.
pub(crate) fn unsupported(
    stream: &InstrStream,
    id: InstrId,
    reason: impl Into<String>,
) -> PatchError {
    PatchError::UnsupportedOperandShape {
        position: stream.position(id).unwrap_or_default(),
        instr: stream
            .get(id)
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("{id:?}")),
        reason: reason.into(),
    }
}
