//! Human-readable listing of a method body.
//!
//! One instruction per line, prefixed by its current position. Branch
//! targets get `L<n>:` labels numbered in program order, and symbol operands
//! are printed by name.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use ilpatch_core::Colors;

use crate::body::MethodBody;
use crate::instr::{Instr, InstrId, Literal, Operand};
use crate::module::ModuleSet;
use crate::symbol::MemberHandle;

/// Digits needed to print positions `0..len`.
pub fn width_for_count(len: usize) -> usize {
    len.saturating_sub(1).max(1).ilog10() as usize + 1
}

/// Dump a method: its signature line followed by the body listing.
pub fn dump_method(modules: &ModuleSet, method: MemberHandle, colors: Colors) -> Option<String> {
    let ty = modules.type_def(method.ty)?;
    let def = modules.method(method)?;
    let mut out = format!(
        "{} {}{}::{}{}\n",
        def.ret,
        colors.symbol,
        ty.name,
        def.param_signature(),
        colors.reset
    );
    match &def.body {
        Some(body) => out.push_str(&dump(body, modules, colors)),
        None => out.push_str("  (no body)\n"),
    }
    Some(out)
}

pub fn dump(body: &MethodBody, modules: &ModuleSet, colors: Colors) -> String {
    let stream = &body.stream;
    let labels = label_map(body);
    let width = width_for_count(stream.len());
    let c = colors;

    let mut out = String::new();
    for (pos, (id, instr)) in stream.iter().enumerate() {
        if let Some(k) = labels.get(&id) {
            writeln!(out, "{}L{k}{}:", c.label, c.reset).unwrap();
        }
        write!(out, "  {}{pos:0width$}{}  {}", c.muted, c.reset, instr.opcode).unwrap();
        let operand = format_operand(instr, &labels, modules, colors);
        if !operand.is_empty() {
            out.push(' ');
            out.push_str(&operand);
        }
        out.push('\n');
    }
    out
}

/// Label numbers for every branch target, in program order.
fn label_map(body: &MethodBody) -> HashMap<InstrId, usize> {
    let targeted: HashSet<InstrId> = body
        .stream
        .iter()
        .flat_map(|(_, instr)| instr.targets().iter().copied())
        .collect();
    body.stream
        .iter()
        .map(|(id, _)| id)
        .filter(|id| targeted.contains(id))
        .enumerate()
        .map(|(k, id)| (id, k))
        .collect()
}

fn format_operand(
    instr: &Instr,
    labels: &HashMap<InstrId, usize>,
    modules: &ModuleSet,
    c: Colors,
) -> String {
    let label = |t: &InstrId| match labels.get(t) {
        Some(k) => format!("{}L{k}{}", c.label, c.reset),
        None => format!("{t:?}"),
    };
    match &instr.operand {
        Operand::None => String::new(),
        Operand::Literal(Literal::Str(s)) => format!("{}{s:?}{}", c.string, c.reset),
        Operand::Literal(l) => l.to_string(),
        Operand::Symbol(s) => {
            let name = modules.symbol_name(*s).unwrap_or_else(|| s.to_string());
            format!("{}{name}{}", c.symbol, c.reset)
        }
        Operand::Local(i) | Operand::Arg(i) => i.to_string(),
        Operand::Target(t) => label(t),
        Operand::Targets(ts) => {
            let inner: Vec<String> = ts.iter().map(label).collect();
            format!("{}({}{}{}){}", c.muted, c.reset, inner.join(", "), c.muted, c.reset)
        }
    }
}
