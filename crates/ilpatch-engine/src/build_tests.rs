use ilpatch_bytecode::{Instr, ModuleSet, Opcode, PatchState, RuleArg};
use serde::Deserialize;
use serde_json::json;

use crate::test_utils::{PLAYER, SAVE_DATA, game_modules, generic_modules, method, render};
use crate::{
    BuildError, Direction, MethodKey, MoveType, PatchError, PatchPlan, Pred, RuleRegistry,
    Widening, decode_arg, insert_guard, insert_hook_after_store, run, walk_back_from,
};

#[derive(Deserialize)]
struct HookArg {
    field: String,
    hook: String,
}

fn rules() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry
        .register("PatchPlayerUpdate", |ctx, _| {
            let over_water = ctx.own_method("_IsOverWater")?;
            let mut cursor = ctx.cursor();
            let blt = ctx
                .goto_next(&mut cursor, MoveType::Before, &[Pred::Op(Opcode::BranchLessThan)])?
                .first();
            insert_guard(ctx.stream_mut(), blt, [Instr::load_arg(0), Instr::call(over_water)])?;
            Ok(())
        })
        .unwrap();
    registry
        .register("PatchPlayerApproachMaxMove", |ctx, _| {
            let approach = ctx.method("Monocle.Calc", "float32 Approach")?;
            let delta = ctx.method("Monocle.Engine", "get_DeltaTime")?;
            let mut cursor = ctx.cursor();
            let window = cursor.goto_next(
                ctx.stream(),
                MoveType::Before,
                &[
                    Pred::Op(Opcode::Add),
                    Pred::call(delta),
                    Pred::Op(Opcode::Mul),
                    Pred::call(approach),
                ],
            )?;
            walk_back_from(ctx.body, window.first(), Widening::F32ToF64)?;
            Ok(())
        })
        .unwrap();
    registry
        .register("Hook", |ctx, arg| {
            let arg: HookArg = decode_arg(arg)?;
            let field = ctx.field(PLAYER, &arg.field)?;
            let hook = ctx.own_method(&arg.hook)?;
            insert_hook_after_store(ctx.stream_mut(), field, hook)?;
            Ok(())
        })
        .unwrap();
    registry
        .register("PatchLandingSound", |ctx, _| {
            let mut cursor = ctx.cursor();
            ctx.goto_next(&mut cursor, MoveType::Before, &[Pred::string("event:/missing")])?;
            Ok(())
        })
        .unwrap();
    registry
}

fn hook_arg() -> RuleArg {
    RuleArg(json!({
        "field": "onGround",
        "hook": "_SetPlayerWasExplodeLaunchedThisFrame",
    }))
}

fn snapshot(modules: &ModuleSet) -> Vec<(PatchState, String)> {
    ["Update", "NormalUpdate", "Land", "ExplodeLaunch"]
        .into_iter()
        .map(|name| {
            let def = modules.method(method(modules, PLAYER, name)).unwrap();
            (def.state, render(modules, def.body.as_ref().unwrap()))
        })
        .collect()
}

#[test]
fn annotated_targets_are_committed() {
    let mut modules = game_modules();
    let plan = PatchPlan::from_annotations(&modules).unwrap();

    let report = run(&mut modules, &rules(), &plan).unwrap();

    assert_eq!(report.targets.len(), 2);
    assert_eq!(report.rule_count(), 2);
    let update = report
        .get(&MethodKey::new(PLAYER, "void Update()"))
        .unwrap();
    assert_eq!(update.rules, ["PatchPlayerUpdate"]);
    assert_eq!(update.state, PatchState::Committed);
    assert_eq!((update.before, update.after), (9, 12));
    assert_eq!(update.image.len(), 12);
    let normal = &report.targets[1];
    assert_eq!((normal.before, normal.after), (15, 17));
    assert!(report.resolve.misses > 0);

    let def = modules.method(update.method).unwrap();
    assert_eq!(def.state, PatchState::Committed);
    assert_eq!(def.body.as_ref().unwrap().stream.len(), 12);
    let land = modules.method(method(&modules, PLAYER, "Land")).unwrap();
    assert_eq!(land.state, PatchState::Unpatched);
}

#[test]
fn rules_run_in_plan_order() {
    let mut modules = game_modules();
    let key = MethodKey::new(PLAYER, "Update");
    let mut plan = PatchPlan::new();
    plan.add(key.clone(), "PatchPlayerUpdate", RuleArg::null()).unwrap();
    plan.add(key.clone(), "Hook", hook_arg()).unwrap();

    let report = run(&mut modules, &rules(), &plan).unwrap();

    let target = report.get(&key).unwrap();
    assert_eq!(target.rules, ["PatchPlayerUpdate", "Hook"]);
    let def = modules.method(target.method).unwrap();
    let body = render(&modules, def.body.as_ref().unwrap());
    assert!(body.contains(
        "  10  stfld Celeste.Player::onGround\n  11  ldarg 0\n  12  call Celeste.Player::_SetPlayerWasExplodeLaunchedThisFrame()\n"
    ));
}

#[test]
fn failing_rule_leaves_modules_untouched() {
    let mut modules = game_modules();
    let before = snapshot(&modules);
    let mut plan = PatchPlan::from_annotations(&modules).unwrap();
    plan.add(MethodKey::new(PLAYER, "Land"), "PatchLandingSound", RuleArg::null())
        .unwrap();

    let err = run(&mut modules, &rules(), &plan).unwrap_err();

    assert_eq!(
        err,
        BuildError::new(
            "PatchLandingSound",
            &MethodKey::new(PLAYER, "Land"),
            PatchError::PatternNotFound {
                pattern: r#""event:/missing""#.into(),
                direction: Direction::Forward,
                last_match: None,
            }
        )
    );
    assert_eq!(
        err.to_string(),
        r#"rule `PatchLandingSound` failed on `Celeste.Player::Land`: pattern ["event:/missing"] not found searching forward"#
    );
    assert_eq!(snapshot(&modules), before);
}

#[test]
fn unknown_rule_is_rejected_up_front() {
    let mut modules = game_modules();
    let before = snapshot(&modules);
    let key = MethodKey::new(PLAYER, "Update");
    let mut plan = PatchPlan::new();
    plan.add(key.clone(), "PatchPlayerUpdate", RuleArg::null()).unwrap();
    plan.add(key.clone(), "Nope", RuleArg::null()).unwrap();

    let err = run(&mut modules, &rules(), &plan).unwrap_err();

    assert_eq!(
        err,
        BuildError::new("Nope", &key, PatchError::UnknownRule("Nope".into()))
    );
    assert_eq!(snapshot(&modules), before);
}

#[test]
fn target_errors() {
    let cases = [
        ("Die", PatchError::MissingBody("Celeste.Player::Die".into())),
        (
            "Fly",
            PatchError::SymbolNotFound {
                ty: PLAYER.into(),
                member: "Fly".into(),
            },
        ),
    ];
    for (name, expected) in cases {
        let mut modules = game_modules();
        let mut plan = PatchPlan::new();
        plan.add(MethodKey::new(PLAYER, name), "PatchPlayerUpdate", RuleArg::null())
            .unwrap();

        let err = run(&mut modules, &rules(), &plan).unwrap_err();

        assert_eq!(err.rule, "PatchPlayerUpdate");
        assert_eq!(err.source, expected);
    }
}

#[test]
fn committed_methods_are_not_patched_again() {
    let mut modules = game_modules();
    let mut plan = PatchPlan::new();
    plan.add(MethodKey::new(PLAYER, "Update"), "PatchPlayerUpdate", RuleArg::null())
        .unwrap();
    run(&mut modules, &rules(), &plan).unwrap();

    let err = run(&mut modules, &rules(), &plan).unwrap_err();

    assert_eq!(
        err.source,
        PatchError::AlreadyCommitted("Celeste.Player::Update".into())
    );
}

#[test]
fn rule_runs_once_per_method() {
    let mut modules = game_modules();
    let mut plan = PatchPlan::new();
    plan.add(MethodKey::new(PLAYER, "Update"), "PatchPlayerUpdate", RuleArg::null())
        .unwrap();
    plan.add(
        MethodKey::new(PLAYER, "void Update()"),
        "PatchPlayerUpdate",
        RuleArg::null(),
    )
    .unwrap();

    let err = run(&mut modules, &rules(), &plan).unwrap_err();

    assert_eq!(
        err.source,
        PatchError::RuleAlreadyApplied {
            rule: "PatchPlayerUpdate".into(),
            target: "Celeste.Player::void Update()".into(),
        }
    );
}

#[test]
fn bad_rule_argument() {
    let mut modules = game_modules();
    let mut plan = PatchPlan::new();
    plan.add(
        MethodKey::new(PLAYER, "ExplodeLaunch"),
        "Hook",
        RuleArg(json!({ "hook": 3 })),
    )
    .unwrap();

    let err = run(&mut modules, &rules(), &plan).unwrap_err();

    assert!(matches!(err.source, PatchError::InvalidRuleArg(_)));
}

#[test]
fn annotated_generic_target_builds() {
    let mut modules = generic_modules();
    let plan = PatchPlan::from_annotations(&modules).unwrap();
    let mut registry = RuleRegistry::new();
    registry
        .register("Hook", |ctx, _| {
            let target = ctx.target;
            assert_eq!(target.ty, SAVE_DATA);
            Ok(())
        })
        .unwrap();

    let report = run(&mut modules, &registry, &plan).unwrap();

    assert_eq!(report.targets[0].state, PatchState::Committed);
    assert_eq!(report.targets[0].method.index, 0);
}
