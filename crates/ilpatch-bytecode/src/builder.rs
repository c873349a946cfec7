//! Label-based construction of instruction streams.
//!
//! Branches name their targets symbolically; labels are resolved to handles
//! when the stream is built, so forward branches need no placeholders.

use std::collections::HashMap;

use crate::error::{StreamError, StreamResult};
use crate::instr::{Instr, Operand};
use crate::opcode::Opcode;
use crate::stream::InstrStream;

enum Entry {
    Instr(Instr),
    Branch(Opcode, String),
    Switch(Vec<String>),
}

#[derive(Default)]
pub struct StreamBuilder {
    entries: Vec<Entry>,
    labels: HashMap<String, usize>,
    duplicate: Option<String>,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `label` to the next instruction pushed.
    pub fn mark(&mut self, label: &str) -> &mut Self {
        if self
            .labels
            .insert(label.to_owned(), self.entries.len())
            .is_some()
        {
            self.duplicate.get_or_insert_with(|| label.to_owned());
        }
        self
    }

    pub fn push(&mut self, instr: Instr) -> &mut Self {
        self.entries.push(Entry::Instr(instr));
        self
    }

    pub fn branch(&mut self, opcode: Opcode, label: &str) -> &mut Self {
        self.entries.push(Entry::Branch(opcode, label.to_owned()));
        self
    }

    pub fn switch(&mut self, labels: &[&str]) -> &mut Self {
        self.entries
            .push(Entry::Switch(labels.iter().map(|l| l.to_string()).collect()));
        self
    }

    pub fn build(&mut self) -> StreamResult<InstrStream> {
        if let Some(label) = self.duplicate.take() {
            return Err(StreamError::DuplicateLabel(label));
        }
        let len = self.entries.len();
        if let Some((label, _)) = self.labels.iter().find(|(_, at)| **at >= len) {
            return Err(StreamError::TrailingLabel(label.clone()));
        }

        let mut stream = InstrStream::new();
        let resolve = |stream: &InstrStream, label: &str| {
            self.labels
                .get(label)
                .map(|&slot| stream.id_for_slot(slot))
                .ok_or_else(|| StreamError::UndefinedLabel(label.to_owned()))
        };

        let mut resolved = Vec::with_capacity(len);
        for entry in &self.entries {
            let instr = match entry {
                Entry::Instr(instr) => instr.clone(),
                Entry::Branch(opcode, label) => {
                    Instr::new(*opcode, Operand::Target(resolve(&stream, label)?))
                }
                Entry::Switch(labels) => {
                    let targets = labels
                        .iter()
                        .map(|l| resolve(&stream, l))
                        .collect::<StreamResult<Vec<_>>>()?;
                    Instr::new(Opcode::Switch, Operand::Targets(targets))
                }
            };
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
        Ok(stream)
    }
}
