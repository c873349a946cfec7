//! Stack-effect backward walker.
//!
//! Given the last instruction of an arithmetic expression, walks backward
//! over the instructions that compute it and inserts a widening conversion
//! after every leaf, so the consumer can switch to the wider type without
//! rewriting the expression itself.
//!
//! The walk keeps a pending operand count, starting at 1:
//!
//! - a binary op (`add`, `sub`, `mul`, `div`, `rem`) adds one
//! - a producer (literal, local or argument load of the narrow type)
//!   removes one and is annotated
//! - anything else while operands are pending is an unsupported shape
//!
//! It stops when the count reaches zero. Nothing is inserted unless the whole
//! walk succeeds.

use ilpatch_bytecode::{
    Instr, InstrId, Literal, MethodBody, Opcode, StackRole, ValueType,
};
use tracing::trace;

use crate::error::{PatchResult, unsupported};

/// Precision change applied to each leaf of the expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Widening {
    /// `float32` leaves, followed by `conv.r8`.
    F32ToF64,
    /// `int32` leaves, followed by `conv.i8`.
    I32ToI64,
}

impl Widening {
    fn narrow(self) -> ValueType {
        match self {
            Widening::F32ToF64 => ValueType::F32,
            Widening::I32ToI64 => ValueType::I32,
        }
    }

    fn conversion(self) -> Opcode {
        match self {
            Widening::F32ToF64 => Opcode::ConvF64,
            Widening::I32ToI64 => Opcode::ConvI64,
        }
    }

    fn accepts_literal(self, lit: &Literal) -> bool {
        matches!(
            (self, lit),
            (Widening::F32ToF64, Literal::F32(_)) | (Widening::I32ToI64, Literal::I32(_))
        )
    }
}

/// One visited instruction and the pending count after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalkStep {
    pub instr: InstrId,
    pub role: StackRole,
    pub pending: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Annotated producers, in walk (reverse program) order.
    pub annotated: Vec<InstrId>,
    /// Inserted conversions, parallel to `annotated`.
    pub conversions: Vec<InstrId>,
    pub steps: Vec<WalkStep>,
}

/// Walk backward from `last` (inclusive) and widen every leaf.
pub fn walk_back_from(
    body: &mut MethodBody,
    last: InstrId,
    widening: Widening,
) -> PatchResult<WalkReport> {
    let stream = &body.stream;
    stream.instr(last)?;

    let mut report = WalkReport::default();
    let mut pending: u32 = 1;
    let mut at = Some(last);

    while pending > 0 {
        let Some(id) = at else {
            return Err(unsupported(
                stream,
                last,
                format!("reached the start of the body with {pending} operand(s) pending"),
            ));
        };
        let instr = stream.instr(id)?;
        let role = instr.opcode.stack_role();
        match role {
            StackRole::BinaryOp => pending += 1,
            StackRole::Producer => {
                check_producer(body, instr, widening).map_err(|reason| unsupported(stream, id, reason))?;
                pending -= 1;
                report.annotated.push(id);
            }
            StackRole::Other => {
                return Err(unsupported(
                    stream,
                    id,
                    "only literals, variable loads and binary arithmetic are supported",
                ));
            }
        }
        trace!(position = stream.position(id), ?role, pending, "walker step");
        report.steps.push(WalkStep {
            instr: id,
            role,
            pending,
        });
        at = stream.prev(id);
    }

    let conv = widening.conversion();
    for &id in &report.annotated {
        let inserted = body.stream.insert_after(id, Instr::op(conv))?;
        report.conversions.push(inserted);
    }
    Ok(report)
}

fn check_producer(body: &MethodBody, instr: &Instr, widening: Widening) -> Result<(), String> {
    let narrow = widening.narrow();
    let found = match instr.opcode {
        Opcode::LoadConst => {
            let lit = instr.literal();
            if lit.is_some_and(|l| widening.accepts_literal(l)) {
                return Ok(());
            }
            return Err(format!("literal is not {narrow}"));
        }
        Opcode::LoadLocal => instr.local().and_then(|i| body.local_type(i)),
        Opcode::LoadArg => instr.arg().and_then(|i| body.arg_type(i)),
        _ => None,
    };
    match found {
        Some(ty) if *ty == narrow => Ok(()),
        Some(ty) => Err(format!("expected a {narrow} variable, found {ty}")),
        None => Err("variable has no declared type".to_owned()),
    }
}
