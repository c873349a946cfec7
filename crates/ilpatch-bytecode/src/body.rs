//! Method bodies: the instruction stream plus the typed slots it addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stream::InstrStream;

/// Type of an argument or local slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    I32,
    I64,
    F32,
    F64,
    Str,
    /// Any reference or struct type, by full name.
    Object(String),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::I32 => f.write_str("int32"),
            Self::I64 => f.write_str("int64"),
            Self::F32 => f.write_str("float32"),
            Self::F64 => f.write_str("float64"),
            Self::Str => f.write_str("string"),
            Self::Object(name) => f.write_str(name),
        }
    }
}

/// A compiled method body.
///
/// For instance methods `args[0]` is the receiver.
#[derive(Clone, Debug, Default)]
pub struct MethodBody {
    pub args: Vec<ValueType>,
    pub locals: Vec<ValueType>,
    pub stream: InstrStream,
}

impl MethodBody {
    pub fn new(stream: InstrStream) -> Self {
        Self {
            args: Vec::new(),
            locals: Vec::new(),
            stream,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = ValueType>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_locals(mut self, locals: impl IntoIterator<Item = ValueType>) -> Self {
        self.locals = locals.into_iter().collect();
        self
    }

    pub fn local_type(&self, index: u16) -> Option<&ValueType> {
        self.locals.get(index as usize)
    }

    pub fn arg_type(&self, index: u16) -> Option<&ValueType> {
        self.args.get(index as usize)
    }
}
