//! Instructions and their operands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::opcode::{Opcode, OperandKind};
use crate::symbol::SymbolRef;

/// Stable handle to an instruction inside one [`InstrStream`](crate::InstrStream).
///
/// Handles survive insertions and removals of other instructions. A handle
/// also records which stream issued it, so a target from another stream is
/// rejected instead of silently aliasing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId {
    pub(crate) stream: u32,
    pub(crate) index: u32,
}

impl fmt::Debug for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Immediate literal value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}L"),
            Self::F32(v) => write!(f, "{v:?}f"),
            Self::F64(v) => write!(f, "{v:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum Operand {
    #[default]
    None,
    Literal(Literal),
    Symbol(SymbolRef),
    Local(u16),
    Arg(u16),
    Target(InstrId),
    Targets(Vec<InstrId>),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Self::None => OperandKind::None,
            Self::Literal(_) => OperandKind::Literal,
            Self::Symbol(_) => OperandKind::Symbol,
            Self::Local(_) => OperandKind::Local,
            Self::Arg(_) => OperandKind::Arg,
            Self::Target(_) => OperandKind::Target,
            Self::Targets(_) => OperandKind::Targets,
        }
    }

    /// Instructions this operand refers to.
    pub fn targets(&self) -> &[InstrId] {
        match self {
            Self::Target(t) => std::slice::from_ref(t),
            Self::Targets(ts) => ts,
            _ => &[],
        }
    }

    pub(crate) fn targets_mut(&mut self) -> &mut [InstrId] {
        match self {
            Self::Target(t) => std::slice::from_mut(t),
            Self::Targets(ts) => ts,
            _ => &mut [],
        }
    }
}

/// An opcode plus its operand.
#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instr {
    /// Create an instruction without checking that the operand fits the opcode.
    /// The stream checks shapes on insertion.
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    /// Operand-less instruction.
    pub fn op(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    pub fn load_arg(index: u16) -> Self {
        Self::new(Opcode::LoadArg, Operand::Arg(index))
    }

    pub fn load_local(index: u16) -> Self {
        Self::new(Opcode::LoadLocal, Operand::Local(index))
    }

    pub fn store_local(index: u16) -> Self {
        Self::new(Opcode::StoreLocal, Operand::Local(index))
    }

    pub fn load_i32(v: i32) -> Self {
        Self::new(Opcode::LoadConst, Operand::Literal(Literal::I32(v)))
    }

    pub fn load_i64(v: i64) -> Self {
        Self::new(Opcode::LoadConst, Operand::Literal(Literal::I64(v)))
    }

    pub fn load_f32(v: f32) -> Self {
        Self::new(Opcode::LoadConst, Operand::Literal(Literal::F32(v)))
    }

    pub fn load_f64(v: f64) -> Self {
        Self::new(Opcode::LoadConst, Operand::Literal(Literal::F64(v)))
    }

    pub fn load_string(s: impl Into<String>) -> Self {
        Self::new(Opcode::LoadString, Operand::Literal(Literal::Str(s.into())))
    }

    /// Any symbol-carrying instruction: field access, call, newobj.
    pub fn with_symbol(opcode: Opcode, symbol: SymbolRef) -> Self {
        Self::new(opcode, Operand::Symbol(symbol))
    }

    pub fn load_field(field: SymbolRef) -> Self {
        Self::with_symbol(Opcode::LoadField, field)
    }

    pub fn store_field(field: SymbolRef) -> Self {
        Self::with_symbol(Opcode::StoreField, field)
    }

    pub fn call(method: SymbolRef) -> Self {
        Self::with_symbol(Opcode::Call, method)
    }

    pub fn call_virt(method: SymbolRef) -> Self {
        Self::with_symbol(Opcode::CallVirt, method)
    }

    pub fn branch(opcode: Opcode, target: InstrId) -> Self {
        Self::new(opcode, Operand::Target(target))
    }

    pub fn ret() -> Self {
        Self::op(Opcode::Return)
    }

    pub fn symbol(&self) -> Option<SymbolRef> {
        match self.operand {
            Operand::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<&Literal> {
        match &self.operand {
            Operand::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn local(&self) -> Option<u16> {
        match self.operand {
            Operand::Local(i) => Some(i),
            _ => None,
        }
    }

    pub fn arg(&self) -> Option<u16> {
        match self.operand {
            Operand::Arg(i) => Some(i),
            _ => None,
        }
    }

    /// Single branch target, if this is a non-switch branch.
    pub fn target(&self) -> Option<InstrId> {
        match self.operand {
            Operand::Target(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub fn targets(&self) -> &[InstrId] {
        self.operand.targets()
    }
}

impl fmt::Display for Instr {
    /// Handle-level rendering for error messages; see `dump` for named output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Literal(l) => write!(f, " {l}"),
            Operand::Symbol(s) => write!(f, " {s}"),
            Operand::Local(i) | Operand::Arg(i) => write!(f, " {i}"),
            Operand::Target(t) => write!(f, " {t:?}"),
            Operand::Targets(ts) => write!(f, " {ts:?}"),
        }
    }
}
