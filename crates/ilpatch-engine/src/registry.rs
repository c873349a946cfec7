//! Rule registry.
//!
//! Rules are registered by name before a build starts and only read during
//! it. Names are unique; registering a name twice is an error.

use ilpatch_bytecode::{InstrStream, MethodBody, RuleArg, SymbolRef};
use ilpatch_core::Colors;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::cursor::{Cursor, MoveType, Window};
use crate::error::{PatchError, PatchResult};
use crate::manifest::MethodKey;
use crate::pattern::{Pred, describe_in};
use crate::resolve::Resolver;

/// What a rule gets to work with for one target.
///
/// The body is a staged copy; it only replaces the original once every rule
/// of the build has succeeded.
pub struct PatchContext<'a, 'm> {
    pub target: &'a MethodKey,
    pub body: &'a mut MethodBody,
    pub resolver: &'a mut Resolver<'m>,
}

impl PatchContext<'_, '_> {
    pub fn stream(&self) -> &InstrStream {
        &self.body.stream
    }

    pub fn stream_mut(&mut self) -> &mut InstrStream {
        &mut self.body.stream
    }

    /// Cursor before the first instruction.
    pub fn cursor(&self) -> Cursor {
        Cursor::start(&self.body.stream)
    }

    pub fn method(&mut self, ty: &str, signature: &str) -> PatchResult<SymbolRef> {
        self.resolver.resolve_method(ty, signature)
    }

    pub fn field(&mut self, ty: &str, name: &str) -> PatchResult<SymbolRef> {
        self.resolver.resolve_field(ty, name)
    }

    /// A method declared on the target's own type.
    pub fn own_method(&mut self, signature: &str) -> PatchResult<SymbolRef> {
        self.resolver.resolve_method(&self.target.ty, signature)
    }

    /// [`Cursor::goto_next`] on the staged stream. A miss names the
    /// pattern's symbols instead of printing raw handles.
    pub fn goto_next(
        &self,
        cursor: &mut Cursor,
        mode: MoveType,
        pattern: &[Pred],
    ) -> PatchResult<Window> {
        cursor
            .goto_next(self.stream(), mode, pattern)
            .map_err(|e| self.name_symbols(e, pattern))
    }

    pub fn goto_prev(
        &self,
        cursor: &mut Cursor,
        mode: MoveType,
        pattern: &[Pred],
    ) -> PatchResult<Window> {
        cursor
            .goto_prev(self.stream(), mode, pattern)
            .map_err(|e| self.name_symbols(e, pattern))
    }

    fn name_symbols(&self, err: PatchError, pattern: &[Pred]) -> PatchError {
        match err {
            PatchError::PatternNotFound {
                direction,
                last_match,
                ..
            } => PatchError::PatternNotFound {
                pattern: describe_in(pattern, self.resolver.modules()),
                direction,
                last_match,
            },
            other => other,
        }
    }

    /// Listing of the staged body, for rule debugging.
    pub fn dump(&self) -> String {
        ilpatch_bytecode::dump(&*self.body, self.resolver.modules(), Colors::OFF)
    }
}

/// Decode a rule argument, reporting a mismatch as a patch error.
pub fn decode_arg<T: DeserializeOwned>(arg: &RuleArg) -> PatchResult<T> {
    arg.decode()
        .map_err(|e| PatchError::InvalidRuleArg(e.to_string()))
}

/// A rule body. Receives the target context and the rule's argument.
pub type RuleFn = dyn Fn(&mut PatchContext<'_, '_>, &RuleArg) -> PatchResult<()>;

#[derive(Default)]
pub struct RuleRegistry {
    rules: IndexMap<String, Box<RuleFn>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, rule: F) -> PatchResult<()>
    where
        F: Fn(&mut PatchContext<'_, '_>, &RuleArg) -> PatchResult<()> + 'static,
    {
        if self.rules.contains_key(name) {
            return Err(PatchError::DuplicateRuleName(name.to_owned()));
        }
        self.rules.insert(name.to_owned(), Box::new(rule));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RuleFn> {
        self.rules.get(name).map(Box::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rules.keys()).finish()
    }
}
