//! End-to-end lowering tests for functions, statements, and control flow.

use crate::ast::{BinaryOp, ForStmt, IfStmt, NodeKind, Symbol, WhileStmt};
use crate::diagnostic::LowerError;
use crate::ir::dumper::dump_function;
use crate::ir::pool::PoolKey;
use crate::ir::{InstData, IrFunction, IrRef, Opcode};
use crate::test_utils::{
    assert_valid, body_refs, bound_label_hints, count_op, has_label_hint, lower_single, TestUnit,
};

fn jump_target_hints(f: &IrFunction) -> Vec<String> {
    f.instructions
        .iter()
        .filter_map(|inst| match (&inst.op, &inst.data) {
            (Opcode::Jump, InstData::Un(label)) => match &f.inst(*label).data {
                InstData::Label(hint) => Some(hint.as_str().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn single_operand(f: &IrFunction, r: IrRef) -> IrRef {
    match f.inst(r).data {
        InstData::Un(operand) => operand,
        ref other => panic!("expected unary payload, got {:?}", other),
    }
}

#[test]
fn identity_function() {
    // int id(int x) { return x; }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let x = unit.rvalue("x", int);
    let ret = unit.ret(Some(x));
    let func = unit.function("id", int, &[("x", int)], vec![ret]);
    let (f, mut pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    assert_eq!(f.instructions[0].op, Opcode::Arg);
    assert_eq!(f.instructions[0].data, InstData::Arg(0));
    assert_eq!(f.instructions[0].ty, i32_ty);
    assert_eq!(count_op(&f, Opcode::Alloc), 1);
    assert_eq!(count_op(&f, Opcode::Store), 1);
    assert_eq!(count_op(&f, Opcode::Load), 1);
    assert_eq!(count_op(&f, Opcode::RetValue), 1);
    assert_eq!(count_op(&f, Opcode::Ret), 1);

    // The body ends with the bound return label and the terminal ret.
    let n = f.body.len();
    assert_eq!(f.inst(f.body[n - 1]).op, Opcode::Ret);
    assert_eq!(f.inst(f.body[n - 2]).op, Opcode::Label);

    // The returned value is the parameter cell's load.
    let ret_value = body_refs(&f, Opcode::RetValue)[0];
    let returned = single_operand(&f, ret_value);
    assert_eq!(f.inst(returned).op, Opcode::Load);
}

#[test]
fn identity_function_dump() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let x = unit.rvalue("x", int);
    let ret = unit.ret(Some(x));
    let func = unit.function("id", int, &[("x", int)], vec![ret]);
    let (f, pool) = lower_single(unit, func);

    insta::assert_snapshot!(dump_function(&f, &pool), @r#"
    fn id(i32) {
      %2 = alloc 4, align 4
      store %arg0 -> %2
      %5 = load %2 : i32
      ret_value %5
      jump return.4
    return.4:
      ret
    }
    "#);
}

#[test]
fn add_function() {
    // int add(int a, int b) { return a + b; }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let a = unit.rvalue("a", int);
    let b = unit.rvalue("b", int);
    let sum = unit.bin(BinaryOp::Add, a, b, int);
    let ret = unit.ret(Some(sum));
    let func = unit.function("add", int, &[("a", int), ("b", int)], vec![ret]);
    let (f, mut pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert_eq!(count_op(&f, Opcode::Alloc), 2);
    assert_eq!(count_op(&f, Opcode::Store), 2);
    assert_eq!(count_op(&f, Opcode::Load), 2);
    assert_eq!(count_op(&f, Opcode::Add), 1);
    assert_eq!(count_op(&f, Opcode::RetValue), 1);

    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    let add = body_refs(&f, Opcode::Add)[0];
    assert_eq!(f.inst(add).ty, i32_ty);
}

#[test]
fn if_statement_produces_two_way_branch() {
    // int pick(int c) { if (c) return 1; return 0; }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let c = unit.rvalue("c", int);
    let one = unit.lit_int(1);
    let then_ret = unit.ret(Some(one));
    let zero = unit.lit_int(0);
    let tail_ret = unit.ret(Some(zero));
    let if_stmt = unit.stmt(NodeKind::If(IfStmt {
        condition: c,
        then_branch: then_ret,
        else_branch: None,
    }));
    let func = unit.function("pick", int, &[("c", int)], vec![if_stmt, tail_ret]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert_eq!(count_op(&f, Opcode::Branch), 1);
    assert_eq!(count_op(&f, Opcode::CmpNe), 1);
    assert_eq!(count_op(&f, Opcode::RetValue), 2);
    assert_eq!(count_op(&f, Opcode::Ret), 1);
    assert!(has_label_hint(&f, "if.then"));
    assert!(has_label_hint(&f, "if.end"));
}

#[test]
fn if_else_jumps_over_the_else_arm() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let c = unit.rvalue("c", int);
    let one = unit.lit_int(1);
    let then_ret = unit.ret(Some(one));
    let two = unit.lit_int(2);
    let else_ret = unit.ret(Some(two));
    let if_stmt = unit.stmt(NodeKind::If(IfStmt {
        condition: c,
        then_branch: then_ret,
        else_branch: Some(else_ret),
    }));
    let func = unit.function("choose", int, &[("c", int)], vec![if_stmt]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert!(has_label_hint(&f, "if.else"));
    assert!(jump_target_hints(&f).contains(&"if.end".to_string()));
    let hints = bound_label_hints(&f);
    assert_eq!(
        hints,
        vec!["if.then", "if.else", "if.end", "return"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
}

#[test]
fn for_loop_with_declaration() {
    // int sum(int n) { int s = 0; for (int i = 0; i < n; i++) s += i; return s; }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let zero = unit.lit_int(0);
    let s_decl = unit.var_decl("s", int, Some(zero));
    let zero2 = unit.lit_int(0);
    let i_decl = unit.var_decl("i", int, Some(zero2));
    let i = unit.rvalue("i", int);
    let n = unit.rvalue("n", int);
    let cond = unit.bin(BinaryOp::Lt, i, n, int);
    let i_lval = unit.decl_ref("i", int);
    let incr = unit.expr(NodeKind::PostIncrement(i_lval), int);
    let s_lval = unit.decl_ref("s", int);
    let i2 = unit.rvalue("i", int);
    let add_assign = unit.expr(NodeKind::CompoundAssignment(BinaryOp::Add, s_lval, i2), int);
    let body = unit.expr_stmt(add_assign);
    let for_stmt = unit.stmt(NodeKind::For(ForStmt {
        init: Some(i_decl),
        condition: Some(cond),
        increment: Some(incr),
        body,
    }));
    let s = unit.rvalue("s", int);
    let ret = unit.ret(Some(s));
    let func = unit.function("sum", int, &[("n", int)], vec![s_decl, for_stmt, ret]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    // n's cell, s, i.
    assert_eq!(count_op(&f, Opcode::Alloc), 3);
    assert!(has_label_hint(&f, "for.cond"));
    assert!(has_label_hint(&f, "for.then"));
    assert!(has_label_hint(&f, "for.cont"));
    assert!(has_label_hint(&f, "for.end"));
    assert_eq!(count_op(&f, Opcode::CmpLt), 1);
    // i++ and s += i.
    assert_eq!(count_op(&f, Opcode::Add), 2);
    // The backedge jumps to the condition label.
    assert!(jump_target_hints(&f).contains(&"for.cond".to_string()));
}

#[test]
fn continue_targets_the_continuation_label() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let zero = unit.lit_int(0);
    let i_decl = unit.var_decl("i", int, Some(zero));
    let i = unit.rvalue("i", int);
    let n = unit.rvalue("n", int);
    let cond = unit.bin(BinaryOp::Lt, i, n, int);
    let i_lval = unit.decl_ref("i", int);
    let incr = unit.expr(NodeKind::PostIncrement(i_lval), int);
    let cont = unit.stmt(NodeKind::Continue);
    let for_stmt = unit.stmt(NodeKind::For(ForStmt {
        init: Some(i_decl),
        condition: Some(cond),
        increment: Some(incr),
        body: cont,
    }));
    let func = unit.function("spin", unit.registry.type_void, &[("n", int)], vec![for_stmt]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert!(jump_target_hints(&f).contains(&"for.cont".to_string()));
}

#[test]
fn forever_loop_continues_at_the_top() {
    // for (;;) break;
    let mut unit = TestUnit::new();
    let brk = unit.stmt(NodeKind::Break);
    let for_stmt = unit.stmt(NodeKind::For(ForStmt {
        init: None,
        condition: None,
        increment: None,
        body: brk,
    }));
    let func = unit.function("spin", unit.registry.type_void, &[], vec![for_stmt]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert!(!has_label_hint(&f, "for.cond"));
    assert!(!has_label_hint(&f, "for.cont"));
    let targets = jump_target_hints(&f);
    assert!(targets.contains(&"for.then".to_string()));
    assert!(targets.contains(&"for.end".to_string()));
}

#[test]
fn while_loop_shape() {
    // while (c) c = 0;
    let mut unit = TestUnit::new();
    let int = unit.int();
    let c = unit.rvalue("c", int);
    let c_lval = unit.decl_ref("c", int);
    let zero = unit.lit_int(0);
    let assign = unit.expr(NodeKind::Assignment(c_lval, zero), int);
    let body = unit.expr_stmt(assign);
    let while_stmt = unit.stmt(NodeKind::While(WhileStmt { condition: c, body }));
    let func = unit.function("drain", unit.registry.type_void, &[("c", int)], vec![while_stmt]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    let hints = bound_label_hints(&f);
    assert_eq!(
        hints,
        vec!["while.cond", "while.then", "while.end", "return"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
    assert!(jump_target_hints(&f).contains(&"while.cond".to_string()));
}

#[test]
fn do_while_tests_the_condition_at_the_bottom() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let c = unit.rvalue("c", int);
    let body = unit.stmt(NodeKind::EmptyStatement);
    let stmt = unit.stmt(NodeKind::DoWhile(body, c));
    let func = unit.function("once", unit.registry.type_void, &[("c", int)], vec![stmt]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    let hints = bound_label_hints(&f);
    assert_eq!(
        hints,
        vec!["do.then", "do.cond", "do.end", "return"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
    // The bottom branch targets the loop top.
    let branch = body_refs(&f, Opcode::Branch)[0];
    match &f.inst(branch).data {
        InstData::Branch(data) => match &f.inst(data.true_label).data {
            InstData::Label(hint) => assert_eq!(hint.as_str(), "do.then"),
            other => panic!("branch target is not a label: {:?}", other),
        },
        other => panic!("unexpected branch payload: {:?}", other),
    }
}

#[test]
fn switch_collects_cases_and_default() {
    // int sw(int x) { switch (x) { case 1: return 10; default: return 20; } }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let x = unit.rvalue("x", int);
    let one = unit.lit_int(1);
    let ten = unit.lit_int(10);
    let case_ret = unit.ret(Some(ten));
    let case_stmt = unit.stmt(NodeKind::Case(one, case_ret));
    let twenty = unit.lit_int(20);
    let default_ret = unit.ret(Some(twenty));
    let default_stmt = unit.stmt(NodeKind::Default(default_ret));
    let body = unit.compound(vec![case_stmt, default_stmt]);
    let switch_stmt = unit.stmt(NodeKind::Switch(x, body));
    let func = unit.function("sw", int, &[("x", int)], vec![switch_stmt]);
    let (f, mut pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert_eq!(count_op(&f, Opcode::Switch), 1);
    assert_eq!(count_op(&f, Opcode::RetValue), 2);

    let switch = body_refs(&f, Opcode::Switch)[0];
    let data = match &f.inst(switch).data {
        InstData::Switch(data) => data,
        other => panic!("unexpected switch payload: {:?}", other),
    };
    let one_value = pool.intern(PoolKey::IntValue(1));
    assert_eq!(data.cases.len(), 1);
    assert_eq!(data.cases[0].0, one_value);
    match &f.inst(data.cases[0].1).data {
        InstData::Label(hint) => assert_eq!(hint.as_str(), "case"),
        other => panic!("case target is not a label: {:?}", other),
    }
    match &f.inst(data.default).data {
        InstData::Label(hint) => assert_eq!(hint.as_str(), "default"),
        other => panic!("default target is not a label: {:?}", other),
    }
    // The end label is bound exactly once.
    let ends = bound_label_hints(&f)
        .into_iter()
        .filter(|h| h == "switch.end")
        .count();
    assert_eq!(ends, 1);
}

#[test]
fn switch_without_default_falls_back_to_end() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let x = unit.rvalue("x", int);
    let one = unit.lit_int(1);
    let brk = unit.stmt(NodeKind::Break);
    let case_stmt = unit.stmt(NodeKind::Case(one, brk));
    let body = unit.compound(vec![case_stmt]);
    let switch_stmt = unit.stmt(NodeKind::Switch(x, body));
    let func = unit.function("sw", unit.registry.type_void, &[("x", int)], vec![switch_stmt]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    let switch = body_refs(&f, Opcode::Switch)[0];
    let data = match &f.inst(switch).data {
        InstData::Switch(data) => data,
        other => panic!("unexpected switch payload: {:?}", other),
    };
    match &f.inst(data.default).data {
        InstData::Label(hint) => assert_eq!(hint.as_str(), "switch.end"),
        other => panic!("default fallback is not a label: {:?}", other),
    }
}

#[test]
fn logical_and_as_a_value_short_circuits() {
    // int land(int a, int b) { return a && b; }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let a = unit.rvalue("a", int);
    let b = unit.rvalue("b", int);
    let and = unit.bin(BinaryOp::LogicalAnd, a, b, int);
    let ret = unit.ret(Some(and));
    let func = unit.function("land", int, &[("a", int), ("b", int)], vec![ret]);
    let (f, mut pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert!(has_label_hint(&f, "bool_and.true"));
    // One comparison against zero and one branch per operand.
    assert_eq!(count_op(&f, Opcode::CmpNe), 2);
    assert_eq!(count_op(&f, Opcode::Branch), 2);
    // The joined i1 is widened to the return's int type.
    assert_eq!(count_op(&f, Opcode::Zext), 1);
    let zext = body_refs(&f, Opcode::Zext)[0];
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    assert_eq!(f.inst(zext).ty, i32_ty);
    let joined = single_operand(&f, zext);
    assert_eq!(f.inst(joined).op, Opcode::Load);
    assert_eq!(f.inst(joined).ty, pool.type_i1);
}

#[test]
fn implicit_return_zero_emits_a_zero_constant() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let implicit = unit.stmt(NodeKind::ImplicitReturn(true));
    let func = unit.function("main", int, &[], vec![implicit]);
    let (f, mut pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert_eq!(count_op(&f, Opcode::RetValue), 1);
    let ret_value = body_refs(&f, Opcode::RetValue)[0];
    let returned = single_operand(&f, ret_value);
    assert_eq!(f.inst(returned).op, Opcode::Constant);
    let zero_value = pool.intern(PoolKey::IntValue(0));
    assert_eq!(f.inst(returned).data, InstData::Constant(zero_value));
}

#[test]
fn implicit_return_without_zero_emits_nothing() {
    let mut unit = TestUnit::new();
    let implicit = unit.stmt(NodeKind::ImplicitReturn(false));
    let func = unit.function("quiet", unit.registry.type_void, &[], vec![implicit]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert_eq!(count_op(&f, Opcode::RetValue), 0);
    assert_eq!(count_op(&f, Opcode::Ret), 1);
}

#[test]
fn block_scopes_shadow_and_restore() {
    // int f() { int x = 1; { int x = 2; } return x; }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let one = unit.lit_int(1);
    let outer = unit.var_decl("x", int, Some(one));
    let two = unit.lit_int(2);
    let inner = unit.var_decl("x", int, Some(two));
    let block = unit.compound(vec![inner]);
    let x = unit.rvalue("x", int);
    let ret = unit.ret(Some(x));
    let func = unit.function("f", int, &[], vec![outer, block, ret]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert_eq!(count_op(&f, Opcode::Alloc), 2);
    // After the inner block, x resolves to the outer cell again: the load's
    // address is the first alloc in body order.
    let allocs = body_refs(&f, Opcode::Alloc);
    let load = body_refs(&f, Opcode::Load)[0];
    assert_eq!(single_operand(&f, load), allocs[0]);
}

#[test]
fn labeled_statement_binds_a_label() {
    let mut unit = TestUnit::new();
    let body = unit.stmt(NodeKind::EmptyStatement);
    let labeled = unit.stmt(NodeKind::Label(Symbol::from("again"), body));
    let func = unit.function("f", unit.registry.type_void, &[], vec![labeled]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    assert!(has_label_hint(&f, "again"));
}

#[test]
fn goto_is_unsupported() {
    let mut unit = TestUnit::new();
    let goto = unit.stmt(NodeKind::Goto(Symbol::from("out")));
    let func = unit.function("f", unit.registry.type_void, &[], vec![goto]);
    let (result, _) = unit.try_lower(vec![func]);
    assert_eq!(result.unwrap_err(), LowerError::Unsupported("goto"));
}

#[test]
fn case_range_is_unsupported() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let x = unit.rvalue("x", int);
    let lo = unit.lit_int(1);
    let hi = unit.lit_int(3);
    let brk = unit.stmt(NodeKind::Break);
    let range = unit.stmt(NodeKind::CaseRange(lo, hi, brk));
    let body = unit.compound(vec![range]);
    let switch_stmt = unit.stmt(NodeKind::Switch(x, body));
    let func = unit.function("f", unit.registry.type_void, &[("x", int)], vec![switch_stmt]);
    let (result, _) = unit.try_lower(vec![func]);
    assert_eq!(result.unwrap_err(), LowerError::Unsupported("case range"));
}

#[test]
fn complex_typed_variable_is_unsupported() {
    let mut unit = TestUnit::new();
    let double = unit.registry.type_double;
    let complex = unit.registry.complex_of(double);
    let decl = unit.var_decl("z", complex, None);
    let func = unit.function("f", unit.registry.type_void, &[], vec![decl]);
    let (result, _) = unit.try_lower(vec![func]);
    assert_eq!(
        result.unwrap_err(),
        LowerError::Unsupported("complex arithmetic")
    );
}

#[test]
fn declarative_nodes_emit_nothing() {
    let mut unit = TestUnit::new();
    let typedef = unit.stmt(NodeKind::TypedefDecl);
    let record = unit.stmt(NodeKind::RecordDecl);
    let proto = unit.stmt(NodeKind::FunctionProto(Symbol::from("g")));
    let null = unit.stmt(NodeKind::EmptyStatement);
    let func = unit.function(
        "f",
        unit.registry.type_void,
        &[],
        vec![typedef, record, proto, null],
    );
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    // Only the return label and terminal ret.
    assert_eq!(f.body.len(), 2);
}

#[test]
fn file_scope_variables_are_recorded() {
    let mut unit = TestUnit::new();
    let int = unit.int();
    let global = unit.var_decl("counter", int, None);
    let implicit = unit.stmt(NodeKind::ImplicitReturn(false));
    let func = unit.function("f", unit.registry.type_void, &[], vec![implicit]);
    let (module, mut pool) = unit.lower(vec![global, func]);

    assert_eq!(module.globals.len(), 1);
    assert_eq!(module.globals[0].name.as_str(), "counter");
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    assert_eq!(module.globals[0].ty, i32_ty);
    assert_eq!(module.functions.len(), 1);
}

#[test]
fn break_in_switch_and_loop_targets_the_right_labels() {
    // while (c) { switch (c) { case 1: break; } break; }
    let mut unit = TestUnit::new();
    let int = unit.int();
    let c = unit.rvalue("c", int);
    let c2 = unit.rvalue("c", int);
    let one = unit.lit_int(1);
    let inner_break = unit.stmt(NodeKind::Break);
    let case_stmt = unit.stmt(NodeKind::Case(one, inner_break));
    let switch_body = unit.compound(vec![case_stmt]);
    let switch_stmt = unit.stmt(NodeKind::Switch(c2, switch_body));
    let outer_break = unit.stmt(NodeKind::Break);
    let while_body = unit.compound(vec![switch_stmt, outer_break]);
    let while_stmt = unit.stmt(NodeKind::While(WhileStmt {
        condition: c,
        body: while_body,
    }));
    let func = unit.function("f", unit.registry.type_void, &[("c", int)], vec![while_stmt]);
    let (f, pool) = lower_single(unit, func);

    assert_valid(&f, &pool);
    let targets = jump_target_hints(&f);
    // The inner break leaves the switch, the outer break leaves the loop.
    assert!(targets.contains(&"switch.end".to_string()));
    assert!(targets.contains(&"while.end".to_string()));
}
