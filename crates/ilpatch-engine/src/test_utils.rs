//! Test fixtures: a miniature game-like module set with real-looking bodies.

use ilpatch_bytecode::{
    Instr, MemberHandle, MethodBody, MethodDef, Module, ModuleSet, Opcode, RuleArg,
    StreamBuilder, TypeDef, ValueType, dump, dump_method,
};
use ilpatch_core::Colors;

use crate::resolve::Resolver;

pub const PLAYER: &str = "Celeste.Player";
pub const VECTOR2: &str = "Microsoft.Xna.Framework.Vector2";
pub const STRING: &str = "System.String";
pub const SAVE_DATA: &str = "Celeste.SaveData";
pub const MOD_TABLE: &str = "System.Collections.Generic.Dictionary`2<System.String,System.Int32>";

fn types() -> ModuleSet {
    let mut set = ModuleSet::new();
    set.add(
        Module::new("Engine")
            .with_type(
                TypeDef::new("Monocle.Calc")
                    .method(MethodDef::new("Approach", "float32", &["float32", "float32", "float32"]))
                    .method(MethodDef::new("Approach", VECTOR2, &[VECTOR2, VECTOR2, "float32"])),
            )
            .with_type(
                TypeDef::new("Monocle.Engine").method(MethodDef::new("get_DeltaTime", "float32", &[])),
            )
            .with_type(
                TypeDef::new(STRING)
                    .method(MethodDef::new("Concat", STRING, &[STRING, STRING]))
                    .method(MethodDef::new("Concat", STRING, &[STRING, STRING, STRING])),
            )
            .with_type(TypeDef::new(VECTOR2).field("X", "float32").field("Y", "float32")),
    );
    set.add(
        Module::new("Game")
            .with_type(
                TypeDef::new("Celeste.SurfaceIndex")
                    .method(MethodDef::new("GetPathFromIndex", STRING, &["System.Int32"])),
            )
            .with_type(
                TypeDef::new(PLAYER)
                    .field("Speed", VECTOR2)
                    .field("onGround", "bool")
                    .field("explodeLaunchBoostSpeed", VECTOR2)
                    .method(
                        MethodDef::new("Update", "void", &[])
                            .patch("PatchPlayerUpdate", RuleArg::null()),
                    )
                    .method(
                        MethodDef::new("NormalUpdate", "int32", &[])
                            .patch("PatchPlayerApproachMaxMove", RuleArg::null()),
                    )
                    .method(MethodDef::new("Land", "void", &[]))
                    .method(MethodDef::new("ExplodeLaunch", "void", &[VECTOR2]))
                    .method(MethodDef::new("Play", "void", &[STRING, STRING, "float32"]))
                    .method(MethodDef::new("_IsOverWater", "bool", &[]))
                    .method(MethodDef::new("_SetPlayerWasExplodeLaunchedThisFrame", "void", &[]))
                    .method(MethodDef::new("Die", "void", &[VECTOR2, "bool", "bool"])),
            ),
    );
    set
}

/// The fixture module set. Every `Celeste.Player` method used by tests has
/// a body except `Die`.
pub fn game_modules() -> ModuleSet {
    let mut set = types();
    let mut r = Resolver::new(&set);
    let speed = r.resolve_field(PLAYER, "Speed").unwrap();
    let on_ground = r.resolve_field(PLAYER, "onGround").unwrap();
    let boost = r.resolve_field(PLAYER, "explodeLaunchBoostSpeed").unwrap();
    let x = r.resolve_field(VECTOR2, "X").unwrap();
    let y = r.resolve_field(VECTOR2, "Y").unwrap();
    let delta = r.resolve_method("Monocle.Engine", "get_DeltaTime").unwrap();
    let approach = r
        .resolve_method("Monocle.Calc", "Approach(float32,float32,float32)")
        .unwrap();
    let play = r.resolve_method(PLAYER, "Play").unwrap();

    let update = StreamBuilder::new()
        .push(Instr::load_arg(0))
        .push(Instr::with_symbol(Opcode::LoadFieldAddr, speed))
        .push(Instr::load_field(y))
        .push(Instr::load_f32(-60.0))
        .branch(Opcode::BranchLessThan, "skip")
        .push(Instr::load_arg(0))
        .push(Instr::load_i32(1))
        .push(Instr::store_field(on_ground))
        .mark("skip")
        .push(Instr::ret())
        .build()
        .unwrap();

    // Speed.X = Calc.Approach(Speed.X, 90f, (1f + num) * Engine.DeltaTime)
    let normal_update = StreamBuilder::new()
        .push(Instr::load_arg(0))
        .push(Instr::with_symbol(Opcode::LoadFieldAddr, speed))
        .push(Instr::load_arg(0))
        .push(Instr::with_symbol(Opcode::LoadFieldAddr, speed))
        .push(Instr::load_field(x))
        .push(Instr::load_f32(90.0))
        .push(Instr::load_f32(1.0))
        .push(Instr::load_local(3))
        .push(Instr::op(Opcode::Add))
        .push(Instr::call(delta))
        .push(Instr::op(Opcode::Mul))
        .push(Instr::call(approach))
        .push(Instr::store_field(x))
        .push(Instr::load_i32(0))
        .push(Instr::ret())
        .build()
        .unwrap();

    let land = StreamBuilder::new()
        .push(Instr::load_arg(0))
        .push(Instr::load_string("event:/char/madeline/landing"))
        .push(Instr::load_string("surface_index"))
        .push(Instr::load_local(0))
        .push(Instr::op(Opcode::ConvF32))
        .push(Instr::call_virt(play))
        .push(Instr::ret())
        .build()
        .unwrap();

    let explode_launch = StreamBuilder::new()
        .push(Instr::load_arg(0))
        .push(Instr::load_arg(1))
        .push(Instr::store_field(boost))
        .push(Instr::ret())
        .build()
        .unwrap();

    let player = ValueType::Object(PLAYER.into());
    let bodies = [
        ("Update", MethodBody::new(update).with_args([player.clone()])),
        (
            "NormalUpdate",
            MethodBody::new(normal_update)
                .with_args([player.clone()])
                .with_locals([ValueType::I32, ValueType::I32, ValueType::Bool, ValueType::F32]),
        ),
        (
            "Land",
            MethodBody::new(land)
                .with_args([player.clone()])
                .with_locals([ValueType::I32]),
        ),
        (
            "ExplodeLaunch",
            MethodBody::new(explode_launch)
                .with_args([player, ValueType::Object(VECTOR2.into())]),
        ),
    ];
    let handles: Vec<_> = bodies
        .iter()
        .map(|(name, _)| method(&set, PLAYER, name))
        .collect();
    for (handle, (_, body)) in handles.into_iter().zip(bodies) {
        set.method_mut(handle).unwrap().body = Some(body);
    }
    set
}

/// A type whose methods take generic and multi-dimensional parameters.
/// `RegisterModSaveData(Dictionary)` is tagged for patching.
pub fn generic_modules() -> ModuleSet {
    let mut set = ModuleSet::new();
    let ret = StreamBuilder::new().push(Instr::ret()).build().unwrap();
    set.add(
        Module::new("Game").with_type(
            TypeDef::new(SAVE_DATA)
                .method(
                    MethodDef::new("RegisterModSaveData", "void", &[MOD_TABLE])
                        .body(MethodBody::new(ret))
                        .patch("Hook", RuleArg::null()),
                )
                .method(MethodDef::new(
                    "RegisterModSaveData",
                    "void",
                    &[STRING, "System.Int32"],
                ))
                .method(MethodDef::new("FillBerries", "void", &["System.Int32[,]"])),
        ),
    );
    set
}

pub fn method(modules: &ModuleSet, ty: &str, signature: &str) -> MemberHandle {
    Resolver::new(modules).method_handle(ty, signature).unwrap()
}

/// Clone of a fixture method's body.
pub fn body(modules: &ModuleSet, name: &str) -> MethodBody {
    let handle = method(modules, PLAYER, name);
    modules.method(handle).unwrap().body.clone().unwrap()
}

/// Plain-text listing of `body`.
pub fn render(modules: &ModuleSet, body: &MethodBody) -> String {
    dump(body, modules, Colors::OFF)
}

/// Listing of `body` installed as `Celeste.Player::{name}`, with the
/// signature line on top.
pub fn listing(modules: &ModuleSet, name: &str, body: &MethodBody) -> String {
    let mut modules = modules.clone();
    let handle = method(&modules, PLAYER, name);
    modules.method_mut(handle).unwrap().body = Some(body.clone());
    dump_method(&modules, handle, Colors::OFF).unwrap()
}
