use ilpatch_bytecode::{Instr, MethodBody, Opcode, StackRole, StreamBuilder, ValueType};

use crate::test_utils::{body, game_modules, listing, render};
use crate::{PatchError, WalkStep, Widening, walk_back_from};

fn arith(instrs: impl IntoIterator<Item = Instr>) -> MethodBody {
    let mut b = StreamBuilder::new();
    for instr in instrs {
        b.push(instr);
    }
    b.push(Instr::ret());
    MethodBody::new(b.build().unwrap()).with_locals([ValueType::I32, ValueType::F32])
}

#[test]
fn widens_every_leaf() {
    let mut body = arith([
        Instr::load_f32(1.0),
        Instr::load_local(1),
        Instr::op(Opcode::Add),
    ]);
    let ids = body.stream.ids();

    let report = walk_back_from(&mut body, ids[2], Widening::F32ToF64).unwrap();

    assert_eq!(
        report.steps,
        [
            WalkStep {
                instr: ids[2],
                role: StackRole::BinaryOp,
                pending: 2
            },
            WalkStep {
                instr: ids[1],
                role: StackRole::Producer,
                pending: 1
            },
            WalkStep {
                instr: ids[0],
                role: StackRole::Producer,
                pending: 0
            },
        ]
    );
    assert_eq!(report.annotated, [ids[1], ids[0]]);
    assert_eq!(report.conversions.len(), 2);
    let opcodes: Vec<_> = body.stream.iter().map(|(_, i)| i.opcode).collect();
    assert_eq!(
        opcodes,
        [
            Opcode::LoadConst,
            Opcode::ConvF64,
            Opcode::LoadLocal,
            Opcode::ConvF64,
            Opcode::Add,
            Opcode::Return,
        ]
    );
}

#[test]
fn widens_approach_step() {
    let modules = game_modules();
    let mut body = body(&modules, "NormalUpdate");
    let add = body.stream.id_at(8).unwrap();

    walk_back_from(&mut body, add, Widening::F32ToF64).unwrap();

    insta::assert_snapshot!(listing(&modules, "NormalUpdate", &body), @r"
    int32 Celeste.Player::NormalUpdate()
      00  ldarg 0
      01  ldflda Celeste.Player::Speed
      02  ldarg 0
      03  ldflda Celeste.Player::Speed
      04  ldfld Microsoft.Xna.Framework.Vector2::X
      05  ldc 90.0f
      06  ldc 1.0f
      07  conv.r8
      08  ldloc 3
      09  conv.r8
      10  add
      11  call Monocle.Engine::get_DeltaTime()
      12  mul
      13  call Monocle.Calc::Approach(float32,float32,float32)
      14  stfld Microsoft.Xna.Framework.Vector2::X
      15  ldc 0
      16  ret
    ");
}

#[test]
fn nested_arithmetic() {
    // (a - 2) * (b + a)
    let mut body = arith([
        Instr::load_local(0),
        Instr::load_i32(2),
        Instr::op(Opcode::Sub),
        Instr::load_local(2),
        Instr::load_local(0),
        Instr::op(Opcode::Add),
        Instr::op(Opcode::Mul),
    ])
    .with_locals([ValueType::I32, ValueType::F32, ValueType::I32]);
    let mul = body.stream.id_at(6).unwrap();

    let report = walk_back_from(&mut body, mul, Widening::I32ToI64).unwrap();

    assert_eq!(report.annotated.len(), 4);
    let pending: Vec<_> = report.steps.iter().map(|s| s.pending).collect();
    assert_eq!(pending, [2, 3, 2, 1, 2, 1, 0]);
    let convs = body
        .stream
        .iter()
        .filter(|(_, i)| i.opcode == Opcode::ConvI64)
        .count();
    assert_eq!(convs, 4);
}

#[test]
fn call_in_chain_is_unsupported() {
    let modules = game_modules();
    let mut body = body(&modules, "NormalUpdate");
    let before = render(&modules, &body);
    let mul = body.stream.id_at(10).unwrap();

    let err = walk_back_from(&mut body, mul, Widening::F32ToF64).unwrap_err();

    assert_eq!(
        err.to_string(),
        "unsupported operand shape at position 9 (`call method#0.1.0`): \
         only literals, variable loads and binary arithmetic are supported"
    );
    assert_eq!(render(&modules, &body), before);
}

#[test]
fn narrow_type_is_checked() {
    let mut body = arith([
        Instr::load_local(0),
        Instr::load_f32(1.0),
        Instr::op(Opcode::Add),
    ]);
    let add = body.stream.id_at(2).unwrap();

    let err = walk_back_from(&mut body, add, Widening::F32ToF64).unwrap_err();
    assert_eq!(
        err,
        PatchError::UnsupportedOperandShape {
            position: 0,
            instr: "ldloc 0".into(),
            reason: "expected a float32 variable, found int32".into(),
        }
    );

    let err = walk_back_from(&mut body, add, Widening::I32ToI64).unwrap_err();
    assert!(err.to_string().ends_with("literal is not int32"));
    assert_eq!(body.stream.len(), 4);
}

#[test]
fn untyped_variable() {
    let mut body = arith([Instr::load_arg(0)]);
    let ldarg = body.stream.first().unwrap();

    let err = walk_back_from(&mut body, ldarg, Widening::F32ToF64).unwrap_err();

    assert!(err.to_string().ends_with("variable has no declared type"));
}

#[test]
fn missing_operands() {
    let mut body = arith([Instr::load_f32(1.0), Instr::op(Opcode::Mul)]);
    let mul = body.stream.id_at(1).unwrap();

    let err = walk_back_from(&mut body, mul, Widening::F32ToF64).unwrap_err();

    assert_eq!(
        err.to_string(),
        "unsupported operand shape at position 1 (`mul`): \
         reached the start of the body with 1 operand(s) pending"
    );
    assert_eq!(body.stream.len(), 3);
}
