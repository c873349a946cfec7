#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Instruction stream model and module definitions for ilpatch.
//!
//! This crate contains:
//! - Opcodes, operands and instructions
//! - [`InstrStream`]: editable stream with stable handles and branch integrity
//! - [`StreamBuilder`]: label-based stream construction
//! - [`ModuleSet`]: the loaded types, fields and methods that get patched
//! - Committed body images and the human-readable dump

mod body;
mod builder;
mod dump;
mod error;
mod image;
mod instr;
mod module;
mod opcode;
mod stream;
mod symbol;


pub use body::{MethodBody, ValueType};
pub use builder::StreamBuilder;
pub use dump::{dump, dump_method, width_for_count};
pub use error::{StreamError, StreamResult};
pub use image::{CommittedBody, FlatInstr, FlatOperand};
pub use instr::{Instr, InstrId, Literal, Operand};
pub use module::{
    FieldDef, MethodDef, Module, ModuleSet, PatchState, PatchTag, RuleArg, TypeDef,
};
pub use opcode::{Opcode, OperandKind, StackRole};
pub use stream::{InstrStream, Iter, Repair};
pub use symbol::{MemberHandle, ModuleId, SymbolRef, TypeHandle};
