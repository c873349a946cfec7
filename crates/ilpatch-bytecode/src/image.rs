//! Committed body image.
//!
//! A patched body is flattened to positional form before it replaces the
//! original: branch handles become instruction indices, the same way a
//! loader would see it. The image round-trips through postcard.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::body::{MethodBody, ValueType};
use crate::error::{StreamError, StreamResult};
use crate::instr::{Instr, InstrId, Literal, Operand};
use crate::opcode::Opcode;
use crate::stream::InstrStream;
use crate::symbol::SymbolRef;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FlatOperand {
    None,
    Literal(Literal),
    Symbol(SymbolRef),
    Local(u16),
    Arg(u16),
    Target(u32),
    Targets(Vec<u32>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatInstr {
    pub opcode: Opcode,
    pub operand: FlatOperand,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommittedBody {
    pub args: Vec<ValueType>,
    pub locals: Vec<ValueType>,
    pub instrs: Vec<FlatInstr>,
}

impl MethodBody {
    /// Flatten into positional form. Fails if any branch target is dangling.
    pub fn commit(&self) -> StreamResult<CommittedBody> {
        self.stream.verify()?;
        let positions: HashMap<InstrId, u32> = self
            .stream
            .iter()
            .enumerate()
            .map(|(pos, (id, _))| (id, pos as u32))
            .collect();
        // verify() guarantees every target is present.
        let at = |t: &InstrId| positions[t];

        let instrs = self
            .stream
            .iter()
            .map(|(_, instr)| FlatInstr {
                opcode: instr.opcode,
                operand: match &instr.operand {
                    Operand::None => FlatOperand::None,
                    Operand::Literal(l) => FlatOperand::Literal(l.clone()),
                    Operand::Symbol(s) => FlatOperand::Symbol(*s),
                    Operand::Local(i) => FlatOperand::Local(*i),
                    Operand::Arg(i) => FlatOperand::Arg(*i),
                    Operand::Target(t) => FlatOperand::Target(at(t)),
                    Operand::Targets(ts) => FlatOperand::Targets(ts.iter().map(at).collect()),
                },
            })
            .collect();

        Ok(CommittedBody {
            args: self.args.clone(),
            locals: self.locals.clone(),
            instrs,
        })
    }
}

impl CommittedBody {
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn to_bytes(&self) -> StreamResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| StreamError::Image(e.to_string()))
    }

    /// Decode and validate an image.
    pub fn from_bytes(bytes: &[u8]) -> StreamResult<Self> {
        let body: Self = postcard::from_bytes(bytes).map_err(|e| StreamError::Image(e.to_string()))?;
        body.validate()?;
        Ok(body)
    }

    /// Every branch target must be a position inside the body.
    pub fn validate(&self) -> StreamResult<()> {
        let len = self.instrs.len();
        for (position, instr) in self.instrs.iter().enumerate() {
            let targets: &[u32] = match &instr.operand {
                FlatOperand::Target(t) => std::slice::from_ref(t),
                FlatOperand::Targets(ts) => ts,
                _ => &[],
            };
            if let Some(&target) = targets.iter().find(|&&t| t as usize >= len) {
                return Err(StreamError::TargetOutOfRange { position, target });
            }
        }
        Ok(())
    }

    /// Rebuild an editable body with fresh handles.
    pub fn into_body(self) -> StreamResult<MethodBody> {
        self.validate()?;
        let mut stream = InstrStream::new();
        let handle = |stream: &InstrStream, t: u32| stream.id_for_slot(t as usize);

        let mut resolved = Vec::with_capacity(self.instrs.len());
        for flat in self.instrs {
            let operand = match flat.operand {
                FlatOperand::None => Operand::None,
                FlatOperand::Literal(l) => Operand::Literal(l),
                FlatOperand::Symbol(s) => Operand::Symbol(s),
                FlatOperand::Local(i) => Operand::Local(i),
                FlatOperand::Arg(i) => Operand::Arg(i),
                FlatOperand::Target(t) => Operand::Target(handle(&stream, t)),
                FlatOperand::Targets(ts) => {
                    Operand::Targets(ts.into_iter().map(|t| handle(&stream, t)).collect())
                }
            };
            let instr = Instr::new(flat.opcode, operand);
            let (expected, found) = (instr.opcode.operand_kind(), instr.operand.kind());
            if expected != found {
                return Err(StreamError::OperandMismatch {
                    opcode: instr.opcode,
                    expected,
                    found,
                });
            }
            resolved.push(instr);
        }
        for instr in resolved {
            stream.link(instr, None);
        }
        stream.verify()?;

        Ok(MethodBody {
            args: self.args,
            locals: self.locals,
            stream,
        })
    }
}
