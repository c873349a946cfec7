//! Patch manifests: which rules run on which methods.
//!
//! A manifest is either JSON:
//!
//! ```json
//! { "patches": [
//!     { "type": "Celeste.Player", "method": "Update", "rule": "PatchPlayerUpdate" },
//!     { "type": "Celeste.Player", "method": "Die", "rule": "Hook", "arg": { "hook": "OnDie" } }
//! ] }
//! ```
//!
//! or the patch tags declared on methods of a [`ModuleSet`]. Both become a
//! [`PatchPlan`], ordered by first appearance.

use std::fmt;
use std::path::{Path, PathBuf};

use ilpatch_bytecode::{ModuleSet, RuleArg};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Target method, as a declaring type name plus a member signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    #[serde(rename = "type")]
    pub ty: String,
    pub method: String,
}

impl MethodKey {
    pub fn new(ty: &str, method: &str) -> Self {
        Self {
            ty: ty.to_owned(),
            method: method.to_owned(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.ty, self.method)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read manifest `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule `{rule}` is listed twice for `{target}`")]
    DuplicateEntry { target: MethodKey, rule: String },
}

/// One rule applied to one target.
#[derive(Clone, Debug, PartialEq)]
pub struct Application {
    pub rule: String,
    pub arg: RuleArg,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub target: MethodKey,
    pub rule: String,
    #[serde(default)]
    pub arg: RuleArg,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub patches: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn into_plan(self) -> Result<PatchPlan, ManifestError> {
        let mut plan = PatchPlan::new();
        for entry in self.patches {
            plan.add(entry.target, &entry.rule, entry.arg)?;
        }
        Ok(plan)
    }
}

/// Targets and their rules, in the order they were declared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchPlan {
    targets: IndexMap<MethodKey, Vec<Application>>,
}

impl PatchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the patch tags declared on methods, in module, type, then
    /// method order. Targets are keyed by full signature, so overloads stay
    /// distinct.
    pub fn from_annotations(modules: &ModuleSet) -> Result<Self, ManifestError> {
        let mut plan = Self::new();
        for (_, ty, method) in modules.methods() {
            for tag in &method.patches {
                let key = MethodKey::new(&ty.name, &method.signature());
                plan.add(key, &tag.rule, tag.arg.clone())?;
            }
        }
        Ok(plan)
    }

    pub fn add(&mut self, target: MethodKey, rule: &str, arg: RuleArg) -> Result<(), ManifestError> {
        if self
            .get(&target)
            .is_some_and(|apps| apps.iter().any(|a| a.rule == rule))
        {
            return Err(ManifestError::DuplicateEntry {
                target,
                rule: rule.to_owned(),
            });
        }
        self.targets.entry(target).or_default().push(Application {
            rule: rule.to_owned(),
            arg,
        });
        Ok(())
    }

    /// Append every application of `other`.
    pub fn merge(&mut self, other: PatchPlan) -> Result<(), ManifestError> {
        for (target, apps) in other.targets {
            for app in apps {
                self.add(target.clone(), &app.rule, app.arg)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, target: &MethodKey) -> Option<&[Application]> {
        self.targets.get(target).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodKey, &[Application])> {
        self.targets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }
}
