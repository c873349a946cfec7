//! Reusable edits built from stream and cursor primitives.
//!
//! Each helper validates the shape it relies on before touching the stream,
//! so a rejected edit leaves the stream as it was.

use ilpatch_bytecode::{Instr, InstrId, InstrStream, Opcode, Repair, StreamError, SymbolRef};

use crate::cursor::{Cursor, MoveType};
use crate::error::{PatchResult, unsupported};
use crate::pattern::Pred;

/// Extend the test of conditional `branch` with one more condition.
///
/// `condition` must push a boolean. It is inserted right after `branch`,
/// followed by `brfalse` to the same target. The original branch keeps its
/// target, so the fallthrough path is taken only when the original test
/// falls through and `condition` holds.
pub fn insert_guard(
    stream: &mut InstrStream,
    branch: InstrId,
    condition: impl IntoIterator<Item = Instr>,
) -> PatchResult<Vec<InstrId>> {
    let instr = stream.instr(branch)?;
    let target = match instr.target() {
        Some(t) if instr.opcode.is_conditional_branch() => t,
        _ => return Err(unsupported(stream, branch, "expected a conditional branch")),
    };

    let mut instrs: Vec<Instr> = condition.into_iter().collect();
    if instrs.is_empty() {
        return Err(unsupported(stream, branch, "empty guard condition"));
    }
    instrs.push(Instr::branch(Opcode::BranchIfFalse, target));
    validate(stream, &instrs)?;

    let mut cursor = Cursor::start(stream);
    cursor.move_after(stream, branch)?;
    cursor.emit_all(stream, instrs)
}

/// Shape and target checks the stream would make on insertion, done up front
/// so a multi-instruction edit cannot stop halfway.
fn validate(stream: &InstrStream, instrs: &[Instr]) -> PatchResult<()> {
    for instr in instrs {
        let (expected, found) = (instr.opcode.operand_kind(), instr.operand.kind());
        if expected != found {
            return Err(StreamError::OperandMismatch {
                opcode: instr.opcode,
                expected,
                found,
            }
            .into());
        }
        if let Some(&t) = instr.targets().iter().find(|t| !stream.contains(**t)) {
            return Err(StreamError::StaleInstruction(t).into());
        }
    }
    Ok(())
}

/// Replace the instruction at `first` and the `count - 1` after it with
/// `replacement`. Branches into the replaced range move to the first
/// replacement instruction.
pub fn replace_range(
    stream: &mut InstrStream,
    first: InstrId,
    count: usize,
    replacement: impl IntoIterator<Item = Instr>,
) -> PatchResult<Vec<InstrId>> {
    let instrs: Vec<Instr> = replacement.into_iter().collect();
    if instrs.is_empty() {
        return Err(unsupported(stream, first, "empty replacement"));
    }
    if count == 0 {
        return Err(unsupported(stream, first, "nothing to replace"));
    }

    validate(stream, &instrs)?;
    stream.instr(first)?;

    // Insert, then remove; undo the inserts if the removal is rejected.
    let ids = instrs
        .into_iter()
        .map(|instr| stream.insert_before(first, instr))
        .collect::<Result<Vec<_>, _>>()?;
    if let Err(e) = stream.remove_range(first, count, Repair::To(ids[0])) {
        undo(stream, &ids);
        return Err(e.into());
    }
    Ok(ids)
}

fn undo(stream: &mut InstrStream, ids: &[InstrId]) {
    for &id in ids.iter().rev() {
        // Freshly inserted and not yet targeted by anything.
        let _ = stream.remove(id, Repair::Reject);
    }
}

/// Replace a literal that a later call consumes with the value computed by
/// `replacement`. Branches into the literal move to the replacement.
pub fn retarget_call_site(
    stream: &mut InstrStream,
    literal: InstrId,
    replacement: impl IntoIterator<Item = Instr>,
) -> PatchResult<Vec<InstrId>> {
    if stream.instr(literal)?.literal().is_none() {
        return Err(unsupported(stream, literal, "expected a literal push"));
    }
    let mut at = stream.next(literal);
    let consumed = loop {
        match at.and_then(|id| stream.get(id)) {
            Some(instr) if instr.opcode.is_call() => break true,
            Some(instr) if instr.opcode.is_branch() || instr.opcode == Opcode::Return => {
                break false;
            }
            Some(_) => at = at.and_then(|id| stream.next(id)),
            None => break false,
        }
    };
    if !consumed {
        return Err(unsupported(
            stream,
            literal,
            "no call consumes the literal in the same block",
        ));
    }
    replace_range(stream, literal, 1, replacement)
}

/// After the first store to `field`, call `hook` with the receiver
/// (`ldarg 0; call hook`). Control flow is untouched.
pub fn insert_hook_after_store(
    stream: &mut InstrStream,
    field: SymbolRef,
    hook: SymbolRef,
) -> PatchResult<Vec<InstrId>> {
    let mut cursor = Cursor::start(stream);
    cursor.goto_next(stream, MoveType::After, &[Pred::store_field(field)])?;
    cursor.emit_all(stream, [Instr::load_arg(0), Instr::call(hook)])
}
