//! Handles into a [`ModuleSet`](crate::ModuleSet).
//!
//! Handles are plain indices: the module set is immutable for the duration of
//! a patch-build, so a handle resolved once stays valid and comparable.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

/// A type definition inside a module.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct TypeHandle {
    pub module: ModuleId,
    pub index: u32,
}

/// A field or method of a type. Fields and methods are indexed separately.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct MemberHandle {
    pub ty: TypeHandle,
    pub index: u32,
}

/// A resolved reference usable as an instruction operand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SymbolRef {
    Type(TypeHandle),
    Field(MemberHandle),
    Method(MemberHandle),
}

impl SymbolRef {
    pub fn as_method(self) -> Option<MemberHandle> {
        match self {
            Self::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_field(self) -> Option<MemberHandle> {
        match self {
            Self::Field(m) => Some(m),
            _ => None,
        }
    }

    pub fn declaring_type(self) -> TypeHandle {
        match self {
            Self::Type(t) => t,
            Self::Field(m) | Self::Method(m) => m.ty,
        }
    }
}

impl fmt::Display for SymbolRef {
    /// Handle-only rendering; use `ModuleSet::symbol_name` for names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, t, member) = match self {
            Self::Type(t) => ("type", t, None),
            Self::Field(m) => ("field", &m.ty, Some(m.index)),
            Self::Method(m) => ("method", &m.ty, Some(m.index)),
        };
        write!(f, "{kind}#{}.{}", t.module.0, t.index)?;
        if let Some(i) = member {
            write!(f, ".{i}")?;
        }
        Ok(())
    }
}
