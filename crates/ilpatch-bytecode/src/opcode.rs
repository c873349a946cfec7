//! Opcodes and their static properties.
//!
//! Every property the engine reasons about (operand shape, branch-ness,
//! stack role) is an exhaustive match here, so adding an opcode forces a
//! decision at each of them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Instruction opcode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Opcode {
    Nop,
    Dup,
    Pop,

    LoadArg,
    StoreArg,
    LoadLocal,
    StoreLocal,
    /// Push a numeric literal.
    LoadConst,
    LoadString,
    LoadNull,

    LoadField,
    /// Push the address of an instance field (for value-type member access).
    LoadFieldAddr,
    StoreField,
    LoadStaticField,
    StoreStaticField,

    Call,
    CallVirt,
    NewObj,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,

    ConvF32,
    ConvF64,
    ConvI32,
    ConvI64,

    CompareEq,
    CompareLt,
    CompareGt,

    Branch,
    BranchIfTrue,
    BranchIfFalse,
    BranchEq,
    BranchNe,
    BranchLessThan,
    /// Unordered variant: also taken when either operand is NaN.
    BranchLessThanUnordered,
    BranchLessEq,
    BranchGreaterThan,
    BranchGreaterEq,
    Switch,

    Return,
    Throw,
}

/// Shape of the operand an opcode carries.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandKind {
    None,
    Literal,
    Symbol,
    Local,
    Arg,
    Target,
    Targets,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "no",
            Self::Literal => "a literal",
            Self::Symbol => "a symbol",
            Self::Local => "a local index",
            Self::Arg => "an argument index",
            Self::Target => "a branch target",
            Self::Targets => "a target table",
        };
        f.write_str(s)
    }
}

/// How an instruction participates in computing a value on the operand stack.
///
/// Used by the backward walker to trace arithmetic-only producer chains.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StackRole {
    /// Pushes one value without consuming any (literal, local or argument load).
    Producer,
    /// Consumes two values and pushes one.
    BinaryOp,
    Other,
}

impl Opcode {
    pub fn operand_kind(self) -> OperandKind {
        use Opcode::*;
        match self {
            Nop | Dup | Pop | LoadNull => OperandKind::None,
            Add | Sub | Mul | Div | Rem | Neg => OperandKind::None,
            ConvF32 | ConvF64 | ConvI32 | ConvI64 => OperandKind::None,
            CompareEq | CompareLt | CompareGt => OperandKind::None,
            Return | Throw => OperandKind::None,

            LoadArg | StoreArg => OperandKind::Arg,
            LoadLocal | StoreLocal => OperandKind::Local,
            LoadConst | LoadString => OperandKind::Literal,

            LoadField | LoadFieldAddr | StoreField | LoadStaticField | StoreStaticField => {
                OperandKind::Symbol
            }
            Call | CallVirt | NewObj => OperandKind::Symbol,

            Branch | BranchIfTrue | BranchIfFalse | BranchEq | BranchNe | BranchLessThan
            | BranchLessThanUnordered | BranchLessEq | BranchGreaterThan | BranchGreaterEq => {
                OperandKind::Target
            }
            Switch => OperandKind::Targets,
        }
    }

    pub fn stack_role(self) -> StackRole {
        use Opcode::*;
        match self {
            LoadConst | LoadLocal | LoadArg => StackRole::Producer,
            Add | Sub | Mul | Div | Rem => StackRole::BinaryOp,
            Nop | Dup | Pop | StoreArg | StoreLocal | LoadString | LoadNull | LoadField
            | LoadFieldAddr | StoreField | LoadStaticField | StoreStaticField | Call | CallVirt
            | NewObj | Neg | ConvF32 | ConvF64 | ConvI32 | ConvI64 | CompareEq | CompareLt
            | CompareGt | Branch | BranchIfTrue | BranchIfFalse | BranchEq | BranchNe
            | BranchLessThan | BranchLessThanUnordered | BranchLessEq | BranchGreaterThan
            | BranchGreaterEq | Switch | Return | Throw => StackRole::Other,
        }
    }

    /// Whether the operand references other instructions of the stream.
    #[inline]
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::Target | OperandKind::Targets
        )
    }

    /// Branches that may fall through to the next instruction.
    pub fn is_conditional_branch(self) -> bool {
        self.is_branch() && self != Opcode::Branch
    }

    #[inline]
    pub fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::CallVirt)
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Dup => "dup",
            Pop => "pop",
            LoadArg => "ldarg",
            StoreArg => "starg",
            LoadLocal => "ldloc",
            StoreLocal => "stloc",
            LoadConst => "ldc",
            LoadString => "ldstr",
            LoadNull => "ldnull",
            LoadField => "ldfld",
            LoadFieldAddr => "ldflda",
            StoreField => "stfld",
            LoadStaticField => "ldsfld",
            StoreStaticField => "stsfld",
            Call => "call",
            CallVirt => "callvirt",
            NewObj => "newobj",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Rem => "rem",
            Neg => "neg",
            ConvF32 => "conv.r4",
            ConvF64 => "conv.r8",
            ConvI32 => "conv.i4",
            ConvI64 => "conv.i8",
            CompareEq => "ceq",
            CompareLt => "clt",
            CompareGt => "cgt",
            Branch => "br",
            BranchIfTrue => "brtrue",
            BranchIfFalse => "brfalse",
            BranchEq => "beq",
            BranchNe => "bne.un",
            BranchLessThan => "blt",
            BranchLessThanUnordered => "blt.un",
            BranchLessEq => "ble",
            BranchGreaterThan => "bgt",
            BranchGreaterEq => "bge",
            Switch => "switch",
            Return => "ret",
            Throw => "throw",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
