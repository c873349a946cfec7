//! The loaded module set: types, their fields and methods.
//!
//! Loading compiled modules is done by the host before patching starts; this
//! is the in-memory form the engine resolves symbols against and commits
//! patched bodies into.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::body::MethodBody;
use crate::symbol::{MemberHandle, ModuleId, SymbolRef, TypeHandle};

/// Opaque per-application rule argument.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleArg(pub serde_json::Value);

impl RuleArg {
    pub fn null() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Decode the argument into a rule-specific type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }
}

impl From<serde_json::Value> for RuleArg {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Declarative request to run `rule` on the method carrying the tag.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchTag {
    pub rule: String,
    pub arg: RuleArg,
}

/// Lifecycle of a method during patch-build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PatchState {
    #[default]
    Unpatched,
    /// Rules ran on a staged copy; not yet visible in the module set.
    RulesApplied,
    /// The patched body replaced the original. Never mutated again.
    Committed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    /// Full name of the field's type.
    pub ty: String,
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub name: String,
    pub ret: String,
    pub params: Vec<String>,
    pub body: Option<MethodBody>,
    pub patches: Vec<PatchTag>,
    pub state: PatchState,
}

impl MethodDef {
    pub fn new(name: &str, ret: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            ret: ret.to_owned(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: None,
            patches: Vec::new(),
            state: PatchState::Unpatched,
        }
    }

    pub fn body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a declarative patch tag.
    pub fn patch(mut self, rule: &str, arg: RuleArg) -> Self {
        self.patches.push(PatchTag {
            rule: rule.to_owned(),
            arg,
        });
        self
    }

    /// `name(P1,P2)`.
    pub fn param_signature(&self) -> String {
        format!("{}({})", self.name, self.params.join(","))
    }

    /// `Ret name(P1,P2)`.
    pub fn signature(&self) -> String {
        format!("{} {}", self.ret, self.param_signature())
    }
}

#[derive(Clone, Debug)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push(FieldDef {
            name: name.to_owned(),
            ty: ty.to_owned(),
        });
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }
}

#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub types: Vec<TypeDef>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, ty: TypeDef) -> Self {
        self.types.push(ty);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModuleSet {
    modules: Vec<Module>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: Module) -> ModuleId {
        self.modules.push(module);
        ModuleId(self.modules.len() as u32 - 1)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0 as usize)
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleId(i as u32), m))
    }

    /// Types declared in `module` under `name`.
    pub fn types_named<'a>(
        &'a self,
        module: ModuleId,
        name: &'a str,
    ) -> impl Iterator<Item = TypeHandle> + 'a {
        self.module(module)
            .into_iter()
            .flat_map(|m| m.types.iter().enumerate())
            .filter(move |(_, t)| t.name == name)
            .map(move |(i, _)| TypeHandle {
                module,
                index: i as u32,
            })
    }

    pub fn type_def(&self, handle: TypeHandle) -> Option<&TypeDef> {
        self.module(handle.module)?.types.get(handle.index as usize)
    }

    pub fn field(&self, handle: MemberHandle) -> Option<&FieldDef> {
        self.type_def(handle.ty)?.fields.get(handle.index as usize)
    }

    pub fn method(&self, handle: MemberHandle) -> Option<&MethodDef> {
        self.type_def(handle.ty)?.methods.get(handle.index as usize)
    }

    pub fn method_mut(&mut self, handle: MemberHandle) -> Option<&mut MethodDef> {
        self.modules
            .get_mut(handle.ty.module.0 as usize)?
            .types
            .get_mut(handle.ty.index as usize)?
            .methods
            .get_mut(handle.index as usize)
    }

    /// Every method in module, type, declaration order.
    pub fn methods(&self) -> impl Iterator<Item = (MemberHandle, &TypeDef, &MethodDef)> {
        self.modules().flat_map(|(module, m)| {
            m.types.iter().enumerate().flat_map(move |(ti, t)| {
                let ty = TypeHandle {
                    module,
                    index: ti as u32,
                };
                t.methods.iter().enumerate().map(move |(mi, method)| {
                    (
                        MemberHandle {
                            ty,
                            index: mi as u32,
                        },
                        t,
                        method,
                    )
                })
            })
        })
    }

    /// Human-readable name: `T`, `T::field` or `T::method(P1,P2)`.
    pub fn symbol_name(&self, symbol: SymbolRef) -> Option<String> {
        match symbol {
            SymbolRef::Type(t) => Some(self.type_def(t)?.name.clone()),
            SymbolRef::Field(f) => {
                let ty = self.type_def(f.ty)?;
                Some(format!("{}::{}", ty.name, self.field(f)?.name))
            }
            SymbolRef::Method(m) => {
                let ty = self.type_def(m.ty)?;
                Some(format!("{}::{}", ty.name, self.method(m)?.param_signature()))
            }
        }
    }
}
