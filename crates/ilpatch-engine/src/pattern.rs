//! Instruction predicates for cursor searches.
//!
//! A pattern is a slice of predicates; it matches a window of consecutive
//! instructions when each predicate matches the instruction at its offset.
//! Symbol predicates compare resolved [`SymbolRef`]s, which is sound because
//! resolution is idempotent.

use std::fmt;

use ilpatch_bytecode::{Instr, Literal, ModuleSet, Opcode, SymbolRef};

#[derive(Clone)]
pub enum Pred {
    /// Any instruction.
    Any,
    Op(Opcode),
    /// Same opcode and operand.
    Exact(Instr),
    /// Symbol-carrying instruction with this opcode and symbol. `Call` also
    /// accepts `CallVirt`.
    Symbol(Opcode, SymbolRef),
    /// Any instruction whose literal operand equals this one.
    Literal(Literal),
    LoadLocal(u16),
    StoreLocal(u16),
    LoadArg(u16),
    /// Named escape hatch for checks the other forms cannot express.
    Custom(&'static str, fn(&Instr) -> bool),
}

impl Pred {
    pub fn call(method: SymbolRef) -> Self {
        Self::Symbol(Opcode::Call, method)
    }

    pub fn load_field(field: SymbolRef) -> Self {
        Self::Symbol(Opcode::LoadField, field)
    }

    pub fn store_field(field: SymbolRef) -> Self {
        Self::Symbol(Opcode::StoreField, field)
    }

    pub fn string(s: &str) -> Self {
        Self::Literal(Literal::Str(s.to_owned()))
    }

    pub fn matches(&self, instr: &Instr) -> bool {
        match self {
            Pred::Any => true,
            Pred::Op(op) => instr.opcode == *op,
            Pred::Exact(expected) => instr == expected,
            Pred::Symbol(op, symbol) => {
                let op_ok = instr.opcode == *op || (*op == Opcode::Call && instr.opcode.is_call());
                op_ok && instr.symbol() == Some(*symbol)
            }
            Pred::Literal(lit) => instr.literal() == Some(lit),
            Pred::LoadLocal(i) => instr.opcode == Opcode::LoadLocal && instr.local() == Some(*i),
            Pred::StoreLocal(i) => instr.opcode == Opcode::StoreLocal && instr.local() == Some(*i),
            Pred::LoadArg(i) => instr.opcode == Opcode::LoadArg && instr.arg() == Some(*i),
            Pred::Custom(_, f) => f(instr),
        }
    }
}

impl fmt::Debug for Pred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Pred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pred::Any => f.write_str("_"),
            Pred::Op(op) => write!(f, "{op}"),
            Pred::Exact(instr) => write!(f, "{instr}"),
            Pred::Symbol(op, symbol) => write!(f, "{op} {symbol}"),
            Pred::Literal(lit) => write!(f, "{lit}"),
            Pred::LoadLocal(i) => write!(f, "ldloc {i}"),
            Pred::StoreLocal(i) => write!(f, "stloc {i}"),
            Pred::LoadArg(i) => write!(f, "ldarg {i}"),
            Pred::Custom(name, _) => write!(f, "<{name}>"),
        }
    }
}

/// `a; b; c` rendering used in error messages and traces.
pub fn describe(pattern: &[Pred]) -> String {
    pattern
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Like [`describe`], with symbol predicates named through `modules`.
pub fn describe_in(pattern: &[Pred], modules: &ModuleSet) -> String {
    pattern
        .iter()
        .map(|pred| match pred {
            Pred::Symbol(op, symbol) => match modules.symbol_name(*symbol) {
                Some(name) => format!("{op} {name}"),
                None => pred.to_string(),
            },
            _ => pred.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
