//! Symbol resolution against the loaded module set.
//!
//! A member signature is written `[Ret ]name[(P1,P2)]`:
//!
//! - `Die` matches any method or field named `Die`
//! - `Concat(System.String,System.String)` pins the parameter list
//! - `System.String Concat(System.String,System.String)` also pins the return type
//! - `Microsoft.Xna.Framework.Vector2 Speed` is a field of that type
//!
//! Parameters are split on top-level commas only, so generic arguments such
//! as ``Dictionary`2<System.String,System.Int32>`` stay one parameter.
//!
//! Results are cached per signature for the resolver's lifetime. The module
//! set is borrowed immutably, so a cached reference can never go stale.

use std::collections::HashMap;

use ilpatch_bytecode::{MemberHandle, ModuleSet, SymbolRef, TypeHandle};
use tracing::trace;

use crate::error::{PatchError, PatchResult};

/// Cache counters, for observing that repeated lookups are free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub hits: usize,
    pub misses: usize,
    /// Modules visited by uncached lookups.
    pub module_scans: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Any,
    Method,
    Field,
    Type,
}

/// Parsed member signature.
#[derive(Debug, PartialEq, Eq)]
struct Signature<'s> {
    ret: Option<&'s str>,
    name: &'s str,
    params: Option<Vec<&'s str>>,
}

impl<'s> Signature<'s> {
    fn parse(sig: &'s str) -> Self {
        let sig = sig.trim();
        let (head, params) = match sig.split_once('(') {
            Some((head, rest)) => {
                let rest = rest.trim_end();
                let inner = rest.strip_suffix(')').unwrap_or(rest);
                (head.trim(), Some(split_params(inner)))
            }
            None => (sig, None),
        };
        let (ret, name) = match head.rsplit_once(' ') {
            Some((ret, name)) => (Some(ret.trim()), name),
            None => (None, head),
        };
        Self { ret, name, params }
    }
}

/// Split on commas outside `<>` and `[]`.
fn split_params(inner: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                params.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(inner[start..].trim());
    params.retain(|p| !p.is_empty());
    params
}

pub struct Resolver<'m> {
    modules: &'m ModuleSet,
    cache: HashMap<(Kind, String, String), SymbolRef>,
    stats: ResolveStats,
}

impl<'m> Resolver<'m> {
    pub fn new(modules: &'m ModuleSet) -> Self {
        Self {
            modules,
            cache: HashMap::new(),
            stats: ResolveStats::default(),
        }
    }

    pub fn modules(&self) -> &'m ModuleSet {
        self.modules
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Resolve a method or field of `ty`.
    pub fn resolve(&mut self, ty: &str, member: &str) -> PatchResult<SymbolRef> {
        self.cached(Kind::Any, ty, member)
    }

    pub fn resolve_method(&mut self, ty: &str, signature: &str) -> PatchResult<SymbolRef> {
        self.cached(Kind::Method, ty, signature)
    }

    pub fn resolve_field(&mut self, ty: &str, name: &str) -> PatchResult<SymbolRef> {
        self.cached(Kind::Field, ty, name)
    }

    pub fn resolve_type(&mut self, ty: &str) -> PatchResult<SymbolRef> {
        self.cached(Kind::Type, ty, "")
    }

    /// Like [`resolve_method`](Self::resolve_method), returning the member handle.
    pub fn method_handle(&mut self, ty: &str, signature: &str) -> PatchResult<MemberHandle> {
        self.resolve_method(ty, signature)?
            .as_method()
            .ok_or_else(|| PatchError::NotAMethod(format!("{ty}::{signature}")))
    }

    fn cached(&mut self, kind: Kind, ty: &str, member: &str) -> PatchResult<SymbolRef> {
        let key = (kind, ty.to_owned(), member.trim().to_owned());
        if let Some(&symbol) = self.cache.get(&key) {
            self.stats.hits += 1;
            return Ok(symbol);
        }

        self.stats.misses += 1;
        self.stats.module_scans += self.modules.len();
        trace!(ty, member, "resolver cache miss");

        let symbol = self.lookup(kind, ty, member)?;
        self.cache.insert(key, symbol);
        Ok(symbol)
    }

    fn lookup(&self, kind: Kind, ty: &str, member: &str) -> PatchResult<SymbolRef> {
        let not_found = || PatchError::SymbolNotFound {
            ty: ty.to_owned(),
            member: member.to_owned(),
        };
        let types: Vec<TypeHandle> = self
            .modules
            .modules()
            .flat_map(|(id, _)| self.modules.types_named(id, ty))
            .collect();

        let candidates: Vec<SymbolRef> = if kind == Kind::Type {
            types.into_iter().map(SymbolRef::Type).collect()
        } else {
            let sig = Signature::parse(member);
            types
                .into_iter()
                .flat_map(|t| self.members(t, kind, &sig))
                .collect()
        };

        match candidates.as_slice() {
            [] => Err(not_found()),
            [one] => Ok(*one),
            many => Err(PatchError::AmbiguousSymbol {
                ty: ty.to_owned(),
                member: member.to_owned(),
                candidates: many
                    .iter()
                    .map(|s| self.modules.symbol_name(*s).unwrap_or_else(|| s.to_string()))
                    .collect(),
            }),
        }
    }

    fn members(&self, ty: TypeHandle, kind: Kind, sig: &Signature<'_>) -> Vec<SymbolRef> {
        let Some(def) = self.modules.type_def(ty) else {
            return Vec::new();
        };
        let mut found = Vec::new();

        if matches!(kind, Kind::Any | Kind::Method) {
            for (i, m) in def.methods.iter().enumerate() {
                let matches = m.name == sig.name
                    && sig.ret.is_none_or(|r| r == m.ret)
                    && sig.params.as_ref().is_none_or(|p| *p == m.params);
                if matches {
                    found.push(SymbolRef::Method(MemberHandle {
                        ty,
                        index: i as u32,
                    }));
                }
            }
        }

        if matches!(kind, Kind::Any | Kind::Field) && sig.params.is_none() {
            for (i, f) in def.fields.iter().enumerate() {
                if f.name == sig.name && sig.ret.is_none_or(|r| r == f.ty) {
                    found.push(SymbolRef::Field(MemberHandle {
                        ty,
                        index: i as u32,
                    }));
                }
            }
        }

        found
    }
}
