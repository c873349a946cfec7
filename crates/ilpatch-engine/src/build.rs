//! Patch-build driver.
//!
//! A build runs in two phases. Staging resolves every target, clones its body
//! and runs the target's rules on the clone, verifying branch integrity after
//! each rule. Commit happens only when every target staged cleanly: each
//! patched body replaces its original and the method is marked committed.
//! Any error during staging aborts the build with the module set untouched.

use ilpatch_bytecode::{CommittedBody, MemberHandle, MethodBody, ModuleSet, PatchState};
use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::{debug, info};

use crate::error::{BuildError, PatchError, PatchResult};
use crate::manifest::{MethodKey, PatchPlan};
use crate::registry::{PatchContext, RuleRegistry};
use crate::resolve::{ResolveStats, Resolver};

/// Outcome for one patched method.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetReport {
    pub target: MethodKey,
    pub method: MemberHandle,
    /// Rules applied, in order.
    pub rules: Vec<String>,
    pub state: PatchState,
    /// Instruction counts before and after patching.
    pub before: usize,
    pub after: usize,
    /// Positional image of the committed body, for a module writer.
    pub image: CommittedBody,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    pub targets: Vec<TargetReport>,
    pub resolve: ResolveStats,
}

impl BuildReport {
    pub fn rule_count(&self) -> usize {
        self.targets.iter().map(|t| t.rules.len()).sum()
    }

    pub fn get(&self, target: &MethodKey) -> Option<&TargetReport> {
        self.targets.iter().find(|t| &t.target == target)
    }
}

struct Staged {
    target: MethodKey,
    method: MemberHandle,
    body: MethodBody,
    rules: Vec<String>,
    state: PatchState,
    before: usize,
}

impl Staged {
    fn new(modules: &ModuleSet, method: MemberHandle, target: &MethodKey) -> PatchResult<Self> {
        let def = modules
            .method(method)
            .ok_or_else(|| PatchError::NotAMethod(target.to_string()))?;
        if def.state == PatchState::Committed {
            return Err(PatchError::AlreadyCommitted(target.to_string()));
        }
        let body = def
            .body
            .clone()
            .ok_or_else(|| PatchError::MissingBody(target.to_string()))?;
        Ok(Self {
            target: target.clone(),
            method,
            before: body.stream.len(),
            body,
            rules: Vec::new(),
            state: PatchState::Unpatched,
        })
    }
}

/// Apply every rule in `plan` and commit the results into `modules`.
pub fn run(
    modules: &mut ModuleSet,
    registry: &RuleRegistry,
    plan: &PatchPlan,
) -> Result<BuildReport, BuildError> {
    for (target, apps) in plan.iter() {
        if let Some(app) = apps.iter().find(|a| !registry.contains(&a.rule)) {
            return Err(BuildError::new(
                &app.rule,
                target,
                PatchError::UnknownRule(app.rule.clone()),
            ));
        }
    }

    let (staged, resolve) = stage(modules, registry, plan)?;

    let mut images = Vec::with_capacity(staged.len());
    for s in &staged {
        let image = s.body.commit().map_err(|e| {
            let rule = s.rules.last().map(String::as_str).unwrap_or_default();
            BuildError::new(rule, &s.target, e.into())
        })?;
        images.push(image);
    }

    let mut report = BuildReport {
        targets: Vec::with_capacity(staged.len()),
        resolve,
    };
    for (s, image) in staged.into_iter().zip(images) {
        debug_assert_eq!(s.state, PatchState::RulesApplied);
        let after = s.body.stream.len();
        let def = modules
            .method_mut(s.method)
            .expect("staged handles were resolved against this module set");
        def.body = Some(s.body);
        def.state = PatchState::Committed;
        report.targets.push(TargetReport {
            target: s.target,
            method: s.method,
            rules: s.rules,
            state: PatchState::Committed,
            before: s.before,
            after,
            image,
        });
    }

    info!(
        targets = report.targets.len(),
        rules = report.rule_count(),
        cache_hits = report.resolve.hits,
        "patch-build complete"
    );
    Ok(report)
}

fn stage(
    modules: &ModuleSet,
    registry: &RuleRegistry,
    plan: &PatchPlan,
) -> Result<(Vec<Staged>, ResolveStats), BuildError> {
    let mut resolver = Resolver::new(modules);
    // Keyed by handle: two keys naming the same method share one staged body.
    let mut staged: IndexMap<MemberHandle, Staged> = IndexMap::new();

    for (target, apps) in plan.iter() {
        let Some(first) = apps.first() else {
            continue;
        };
        let fail = |rule: &str, e: PatchError| BuildError::new(rule, target, e);

        let method = resolver
            .method_handle(&target.ty, &target.method)
            .map_err(|e| fail(&first.rule, e))?;
        let entry = match staged.entry(method) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                e.insert(Staged::new(modules, method, target).map_err(|e| fail(&first.rule, e))?)
            }
        };

        for app in apps {
            if entry.rules.contains(&app.rule) {
                return Err(fail(
                    &app.rule,
                    PatchError::RuleAlreadyApplied {
                        rule: app.rule.clone(),
                        target: target.to_string(),
                    },
                ));
            }
            let rule = registry
                .get(&app.rule)
                .ok_or_else(|| fail(&app.rule, PatchError::UnknownRule(app.rule.clone())))?;

            debug!(rule = %app.rule, target = %target, "applying rule");
            let mut ctx = PatchContext {
                target,
                body: &mut entry.body,
                resolver: &mut resolver,
            };
            rule(&mut ctx, &app.arg).map_err(|e| fail(&app.rule, e))?;
            entry
                .body
                .stream
                .verify()
                .map_err(|e| fail(&app.rule, e.into()))?;

            entry.rules.push(app.rule.clone());
            entry.state = PatchState::RulesApplied;
            debug!(
                rule = %app.rule,
                target = %target,
                len = entry.body.stream.len(),
                "rule applied"
            );
        }
    }

    Ok((staged.into_values().collect(), resolver.stats()))
}
