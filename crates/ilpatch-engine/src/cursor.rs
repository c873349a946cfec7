//! Pattern-matching cursor.
//!
//! A cursor is an insertion point: it sits immediately before its `next`
//! instruction, or at the end of the stream. It holds handles only and is
//! detached from the stream it walks, so any number of cursors can be kept
//! over one stream and a cursor can be copied to search ahead without losing
//! its own position.
//!
//! Searches never modify the stream. A failed `goto_*` is a
//! [`PatchError::PatternNotFound`]; `try_goto_*` returns `None` instead and
//! leaves the cursor where it was.

use std::fmt;

use ilpatch_bytecode::{Instr, InstrId, InstrStream, Repair};
use tracing::trace;

use crate::error::{PatchError, PatchResult};
use crate::pattern::{Pred, describe};

/// Where the cursor lands after a successful search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MoveType {
    /// Before the first matched instruction.
    #[default]
    Before,
    /// After the last matched instruction.
    After,
    /// Before the first matched instruction, and the next emitted
    /// instruction takes over every branch into the match.
    AfterLabel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Backward => f.write_str("backward"),
        }
    }
}

/// Handles of a matched window, in program order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window(Vec<InstrId>);

impl Window {
    pub fn first(&self) -> InstrId {
        self.0[0]
    }

    pub fn last(&self) -> InstrId {
        self.0[self.0.len() - 1]
    }

    pub fn get(&self, i: usize) -> Option<InstrId> {
        self.0.get(i).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[InstrId] {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    next: Option<InstrId>,
    /// Set by `AfterLabel`: branches into this instruction move to the next emit.
    label: Option<InstrId>,
    /// First instruction of the last match. Skipped by the next search so
    /// repeated searches advance.
    last_match: Option<InstrId>,
}

impl Cursor {
    fn new(next: Option<InstrId>) -> Self {
        Self {
            next,
            label: None,
            last_match: None,
        }
    }

    pub fn start(stream: &InstrStream) -> Self {
        Self::new(stream.first())
    }

    pub fn end() -> Self {
        Self::new(None)
    }

    /// Before the final instruction, typically a method's trailing `ret`.
    pub fn before_last(stream: &InstrStream) -> Self {
        Self::new(stream.last())
    }

    /// Before `id`.
    pub fn at(stream: &InstrStream, id: InstrId) -> PatchResult<Self> {
        if !stream.contains(id) {
            return Err(PatchError::InvalidAnchor);
        }
        Ok(Self::new(Some(id)))
    }

    /// Instruction right after the cursor, `None` at the end.
    pub fn next(&self) -> Option<InstrId> {
        self.next
    }

    /// Instruction right before the cursor.
    pub fn prev(&self, stream: &InstrStream) -> Option<InstrId> {
        match self.next {
            Some(n) => stream.prev(n),
            None => stream.last(),
        }
    }

    /// Current position, `stream.len()` at the end.
    pub fn index(&self, stream: &InstrStream) -> PatchResult<usize> {
        match self.next {
            Some(n) => stream.position(n).ok_or(PatchError::InvalidAnchor),
            None => Ok(stream.len()),
        }
    }

    pub fn move_before(&mut self, stream: &InstrStream, id: InstrId) -> PatchResult<()> {
        *self = Self::at(stream, id)?;
        Ok(())
    }

    pub fn move_after(&mut self, stream: &InstrStream, id: InstrId) -> PatchResult<()> {
        if !stream.contains(id) {
            return Err(PatchError::InvalidAnchor);
        }
        *self = Self::new(stream.next(id));
        Ok(())
    }

    fn check(&self, stream: &InstrStream) -> PatchResult<()> {
        match self.next {
            Some(n) if !stream.contains(n) => Err(PatchError::InvalidAnchor),
            _ => Ok(()),
        }
    }

    /// Window starting at `start` if `pattern` matches there.
    fn window_at(stream: &InstrStream, start: InstrId, pattern: &[Pred]) -> Option<Window> {
        let mut ids = Vec::with_capacity(pattern.len());
        let mut at = Some(start);
        for pred in pattern {
            let id = at?;
            if !pred.matches(stream.get(id)?) {
                return None;
            }
            ids.push(id);
            at = stream.next(id);
        }
        Some(Window(ids))
    }

    fn land(&mut self, stream: &InstrStream, window: &Window, mode: MoveType) {
        self.last_match = Some(window.first());
        match mode {
            MoveType::Before => {
                self.next = Some(window.first());
                self.label = None;
            }
            MoveType::AfterLabel => {
                self.next = Some(window.first());
                self.label = Some(window.first());
            }
            MoveType::After => {
                self.next = stream.next(window.last());
                self.label = None;
            }
        }
        trace!(
            position = stream.position(window.first()),
            len = window.len(),
            ?mode,
            "cursor matched"
        );
    }

    /// Find the first window at or after the cursor matching `pattern`.
    pub fn try_goto_next(
        &mut self,
        stream: &InstrStream,
        mode: MoveType,
        pattern: &[Pred],
    ) -> PatchResult<Option<Window>> {
        self.check(stream)?;
        if pattern.is_empty() {
            return Ok(None);
        }
        let mut at = self.next;
        while let Some(start) = at {
            if Some(start) != self.last_match
                && let Some(window) = Self::window_at(stream, start, pattern)
            {
                self.land(stream, &window, mode);
                return Ok(Some(window));
            }
            at = stream.next(start);
        }
        Ok(None)
    }

    /// Find the nearest window starting before the cursor matching `pattern`.
    pub fn try_goto_prev(
        &mut self,
        stream: &InstrStream,
        mode: MoveType,
        pattern: &[Pred],
    ) -> PatchResult<Option<Window>> {
        self.check(stream)?;
        if pattern.is_empty() {
            return Ok(None);
        }
        let mut at = self.prev(stream);
        while let Some(start) = at {
            if Some(start) != self.last_match
                && let Some(window) = Self::window_at(stream, start, pattern)
            {
                self.land(stream, &window, mode);
                return Ok(Some(window));
            }
            at = stream.prev(start);
        }
        Ok(None)
    }

    pub fn goto_next(
        &mut self,
        stream: &InstrStream,
        mode: MoveType,
        pattern: &[Pred],
    ) -> PatchResult<Window> {
        match self.try_goto_next(stream, mode, pattern)? {
            Some(window) => Ok(window),
            None => Err(self.not_found(stream, Direction::Forward, pattern)),
        }
    }

    pub fn goto_prev(
        &mut self,
        stream: &InstrStream,
        mode: MoveType,
        pattern: &[Pred],
    ) -> PatchResult<Window> {
        match self.try_goto_prev(stream, mode, pattern)? {
            Some(window) => Ok(window),
            None => Err(self.not_found(stream, Direction::Backward, pattern)),
        }
    }

    fn not_found(&self, stream: &InstrStream, direction: Direction, pattern: &[Pred]) -> PatchError {
        PatchError::PatternNotFound {
            pattern: describe(pattern),
            direction,
            last_match: self.last_match.and_then(|id| stream.position(id)),
        }
    }

    /// Whether `pattern` matches the instructions ending right before the cursor.
    pub fn matches_before(&self, stream: &InstrStream, pattern: &[Pred]) -> bool {
        let mut start = self.prev(stream);
        for _ in 1..pattern.len() {
            start = start.and_then(|id| stream.prev(id));
        }
        match start {
            Some(start) if !pattern.is_empty() => Self::window_at(stream, start, pattern).is_some(),
            _ => false,
        }
    }

    /// Whether `pattern` matches the instructions starting at the cursor.
    pub fn matches_at(&self, stream: &InstrStream, pattern: &[Pred]) -> bool {
        match self.next {
            Some(start) if !pattern.is_empty() => Self::window_at(stream, start, pattern).is_some(),
            _ => false,
        }
    }

    /// Insert `instr` at the cursor. The cursor stays before the same
    /// instruction, so consecutive emits come out in order.
    pub fn emit(&mut self, stream: &mut InstrStream, instr: Instr) -> PatchResult<InstrId> {
        self.check(stream)?;
        let referrers = self.label.map(|label| stream.referrers(label));
        let id = stream.insert_at(self.next, instr)?;
        if let (Some(label), Some(referrers)) = (self.label.take(), referrers) {
            stream.retarget_from(&referrers, label, id)?;
        }
        Ok(id)
    }

    pub fn emit_all(
        &mut self,
        stream: &mut InstrStream,
        instrs: impl IntoIterator<Item = Instr>,
    ) -> PatchResult<Vec<InstrId>> {
        instrs
            .into_iter()
            .map(|instr| self.emit(stream, instr))
            .collect()
    }

    /// Remove `count` instructions starting at the cursor. The cursor moves
    /// to the instruction that followed them.
    pub fn remove(
        &mut self,
        stream: &mut InstrStream,
        count: usize,
        repair: Repair,
    ) -> PatchResult<Vec<Instr>> {
        self.check(stream)?;
        let Some(first) = self.next else {
            return Err(PatchError::InvalidAnchor);
        };
        let mut following = Some(first);
        for _ in 0..count {
            following = following.and_then(|id| stream.next(id));
        }
        let removed = stream.remove_range(first, count, repair)?;
        self.next = following;
        if self.label.is_some_and(|l| !stream.contains(l)) {
            self.label = None;
        }
        Ok(removed)
    }
}
