//! Arena-backed instruction stream.
//!
//! Instructions live in an append-only arena and are threaded into program
//! order through a doubly linked list. Handles ([`InstrId`]) index the arena,
//! so inserting or removing one instruction never invalidates the handle of
//! another; branch operands hold handles, not positions.
//!
//! Every edit validates before it mutates: a rejected edit leaves the stream
//! exactly as it was. After any successful edit every branch target names a
//! live instruction of this stream.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{StreamError, StreamResult};
use crate::instr::{Instr, InstrId, Operand};

static NEXT_STREAM_TAG: AtomicU32 = AtomicU32::new(1);

/// What to do with branches that target an instruction being removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repair {
    /// Fail with `DanglingBranchTarget` if any branch would dangle.
    Reject,
    /// Redirect dangling branches to this instruction.
    To(InstrId),
    /// Redirect dangling branches to the instruction after the removed range.
    Following,
}

#[derive(Clone, Debug)]
struct Node {
    /// `None` once removed. Removed slots are never reused.
    instr: Option<Instr>,
    prev: Option<InstrId>,
    next: Option<InstrId>,
}

#[derive(Clone, Debug)]
pub struct InstrStream {
    tag: u32,
    nodes: Vec<Node>,
    head: Option<InstrId>,
    tail: Option<InstrId>,
    len: usize,
}

impl Default for InstrStream {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrStream {
    pub fn new() -> Self {
        Self {
            tag: NEXT_STREAM_TAG.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn first(&self) -> Option<InstrId> {
        self.head
    }

    #[inline]
    pub fn last(&self) -> Option<InstrId> {
        self.tail
    }

    fn node(&self, id: InstrId) -> Option<&Node> {
        if id.stream != self.tag {
            return None;
        }
        self.nodes
            .get(id.index as usize)
            .filter(|n| n.instr.is_some())
    }

    /// Whether `id` names a live instruction of this stream.
    pub fn contains(&self, id: InstrId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: InstrId) -> Option<&Instr> {
        self.node(id).and_then(|n| n.instr.as_ref())
    }

    /// Like [`get`](Self::get), but a stale handle is an error.
    pub fn instr(&self, id: InstrId) -> StreamResult<&Instr> {
        self.get(id).ok_or(StreamError::StaleInstruction(id))
    }

    pub fn next(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|n| n.next)
    }

    pub fn prev(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|n| n.prev)
    }

    /// Instructions in program order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stream: self,
            at: self.head,
        }
    }

    pub fn ids(&self) -> Vec<InstrId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Current position of `id`. Positions shift with every edit; hold handles instead.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.iter().position(|(i, _)| i == id)
    }

    pub fn id_at(&self, position: usize) -> Option<InstrId> {
        self.iter().nth(position).map(|(id, _)| id)
    }

    fn id_at_checked(&self, position: usize) -> StreamResult<InstrId> {
        self.id_at(position).ok_or(StreamError::PositionOutOfRange {
            position,
            len: self.len,
        })
    }

    fn require(&self, id: InstrId) -> StreamResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(StreamError::StaleInstruction(id))
        }
    }

    /// Operand must fit the opcode; branch targets must be live here.
    fn check(&self, instr: &Instr) -> StreamResult<()> {
        let expected = instr.opcode.operand_kind();
        let found = instr.operand.kind();
        if expected != found {
            return Err(StreamError::OperandMismatch {
                opcode: instr.opcode,
                expected,
                found,
            });
        }
        for &target in instr.targets() {
            self.require(target)?;
        }
        Ok(())
    }

    /// Handle the next linked instruction will get. Used by the builder to
    /// resolve forward labels before the instructions exist.
    pub(crate) fn id_for_slot(&self, slot: usize) -> InstrId {
        InstrId {
            stream: self.tag,
            index: slot as u32,
        }
    }

    /// Link `instr` before `next` (or at the end). No validation.
    pub(crate) fn link(&mut self, instr: Instr, next: Option<InstrId>) -> InstrId {
        let id = self.id_for_slot(self.nodes.len());
        let prev = match next {
            Some(n) => self.nodes[n.index as usize].prev,
            None => self.tail,
        };
        self.nodes.push(Node {
            instr: Some(instr),
            prev,
            next,
        });
        match prev {
            Some(p) => self.nodes[p.index as usize].next = Some(id),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => self.nodes[n.index as usize].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
        id
    }

    fn unlink(&mut self, id: InstrId) -> Instr {
        let node = &mut self.nodes[id.index as usize];
        let instr = node.instr.take().expect("unlink of a removed instruction");
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev {
            Some(p) => self.nodes[p.index as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n.index as usize].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        instr
    }

    /// Append at the end of the stream.
    pub fn push(&mut self, instr: Instr) -> StreamResult<InstrId> {
        self.check(&instr)?;
        Ok(self.link(instr, None))
    }

    /// Insert before `next`, or append when `next` is `None`.
    pub fn insert_at(&mut self, next: Option<InstrId>, instr: Instr) -> StreamResult<InstrId> {
        if let Some(n) = next {
            self.require(n)?;
        }
        self.check(&instr)?;
        Ok(self.link(instr, next))
    }

    pub fn insert_before(&mut self, anchor: InstrId, instr: Instr) -> StreamResult<InstrId> {
        self.insert_at(Some(anchor), instr)
    }

    pub fn insert_after(&mut self, anchor: InstrId, instr: Instr) -> StreamResult<InstrId> {
        self.require(anchor)?;
        self.check(&instr)?;
        let next = self.next(anchor);
        Ok(self.link(instr, next))
    }

    /// Swap the operand, keeping the opcode. Returns the previous operand.
    pub fn replace_operand(&mut self, id: InstrId, operand: Operand) -> StreamResult<Operand> {
        let opcode = self.instr(id)?.opcode;
        let candidate = Instr::new(opcode, operand);
        self.check(&candidate)?;
        let slot = self.nodes[id.index as usize]
            .instr
            .as_mut()
            .expect("checked live above");
        Ok(std::mem::replace(&mut slot.operand, candidate.operand))
    }

    /// Branches whose operand targets `target`, in program order.
    pub fn referrers(&self, target: InstrId) -> Vec<InstrId> {
        self.iter()
            .filter(|(_, instr)| instr.targets().contains(&target))
            .map(|(id, _)| id)
            .collect()
    }

    /// Point every branch targeting `from` at `to`. Returns the number of
    /// rewritten operand slots.
    pub fn retarget(&mut self, from: InstrId, to: InstrId) -> StreamResult<usize> {
        let referrers = self.referrers(from);
        self.retarget_from(&referrers, from, to)
    }

    /// Like [`retarget`](Self::retarget), but only rewrites the branches in
    /// `referrers`. Instructions inserted after the referrers were collected
    /// keep their targets.
    pub fn retarget_from(
        &mut self,
        referrers: &[InstrId],
        from: InstrId,
        to: InstrId,
    ) -> StreamResult<usize> {
        self.require(to)?;
        for &id in referrers {
            self.require(id)?;
        }
        let mut rewritten = 0;
        for &id in referrers {
            let Some(instr) = self.nodes[id.index as usize].instr.as_mut() else {
                continue;
            };
            for t in instr.operand.targets_mut() {
                if *t == from {
                    *t = to;
                    rewritten += 1;
                }
            }
        }
        Ok(rewritten)
    }

    pub fn remove(&mut self, id: InstrId, repair: Repair) -> StreamResult<Instr> {
        let mut removed = self.remove_range(id, 1, repair)?;
        Ok(removed.remove(0))
    }

    /// Remove `count` consecutive instructions starting at `first`.
    ///
    /// Branches from surviving instructions into the range are handled per
    /// `repair`; branches inside the range disappear with it.
    pub fn remove_range(
        &mut self,
        first: InstrId,
        count: usize,
        repair: Repair,
    ) -> StreamResult<Vec<Instr>> {
        self.require(first)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut doomed = Vec::with_capacity(count);
        let mut cursor = Some(first);
        for _ in 0..count {
            let Some(id) = cursor else {
                let start = self.position(first).unwrap_or_default();
                return Err(StreamError::PositionOutOfRange {
                    position: start + count - 1,
                    len: self.len,
                });
            };
            doomed.push(id);
            cursor = self.next(id);
        }
        let following = cursor;
        let doomed_set: HashSet<InstrId> = doomed.iter().copied().collect();

        let mut referrers = 0;
        let mut hit = None;
        for (id, instr) in self.iter() {
            if doomed_set.contains(&id) {
                continue;
            }
            for t in instr.targets() {
                if doomed_set.contains(t) {
                    referrers += 1;
                    hit.get_or_insert(*t);
                }
            }
        }

        if let Some(hit) = hit {
            let to = match repair {
                Repair::Reject => None,
                Repair::To(t) if doomed_set.contains(&t) || !self.contains(t) => {
                    return Err(StreamError::InvalidRepairTarget(t));
                }
                Repair::To(t) => Some(t),
                Repair::Following => following,
            };
            let Some(to) = to else {
                return Err(StreamError::DanglingBranchTarget {
                    position: self.position(hit).unwrap_or_default(),
                    referrers,
                });
            };
            for node in &mut self.nodes {
                let Some(instr) = node.instr.as_mut() else {
                    continue;
                };
                for t in instr.operand.targets_mut() {
                    if doomed_set.contains(t) {
                        *t = to;
                    }
                }
            }
        }

        Ok(doomed.into_iter().map(|id| self.unlink(id)).collect())
    }

    /// Check that every branch target names a live instruction of this stream.
    pub fn verify(&self) -> StreamResult<()> {
        for (position, (_, instr)) in self.iter().enumerate() {
            let dangling = instr
                .targets()
                .iter()
                .filter(|t| !self.contains(**t))
                .count();
            if dangling > 0 {
                return Err(StreamError::DanglingBranchTarget {
                    position,
                    referrers: dangling,
                });
            }
        }
        Ok(())
    }

    // Positional forms. Each resolves the position to a handle first.

    /// Insert so that the new instruction ends up at `position`.
    /// `position == len()` appends.
    pub fn insert_before_at(&mut self, position: usize, instr: Instr) -> StreamResult<InstrId> {
        if position == self.len {
            return self.push(instr);
        }
        let anchor = self.id_at_checked(position)?;
        self.insert_before(anchor, instr)
    }

    pub fn insert_after_at(&mut self, position: usize, instr: Instr) -> StreamResult<InstrId> {
        let anchor = self.id_at_checked(position)?;
        self.insert_after(anchor, instr)
    }

    pub fn remove_at(&mut self, position: usize, repair: Repair) -> StreamResult<Instr> {
        let id = self.id_at_checked(position)?;
        self.remove(id, repair)
    }

    pub fn remove_range_at(
        &mut self,
        position: usize,
        count: usize,
        repair: Repair,
    ) -> StreamResult<Vec<Instr>> {
        let id = self.id_at_checked(position)?;
        self.remove_range(id, count, repair)
    }

    pub fn replace_operand_at(
        &mut self,
        position: usize,
        operand: Operand,
    ) -> StreamResult<Operand> {
        let id = self.id_at_checked(position)?;
        self.replace_operand(id, operand)
    }
}

/// Program-order iterator over `(handle, instruction)`.
pub struct Iter<'a> {
    stream: &'a InstrStream,
    at: Option<InstrId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InstrId, &'a Instr);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.at?;
        let node = &self.stream.nodes[id.index as usize];
        self.at = node.next;
        node.instr.as_ref().map(|instr| (id, instr))
    }
}
