//! Validator unit tests over hand-built functions.

use symbol_table::GlobalSymbol as Symbol;

use super::pool::{Pool, PoolKey, PoolRef};
use super::validation::{IrValidator, ValidationError};
use super::{Branch, InstData, IrBuilder, IrFunction, IrRef, Opcode};

fn finish(builder: IrBuilder, params: Vec<PoolRef>) -> IrFunction {
    builder.finish(Symbol::from("t"), params)
}

#[test]
fn trivial_function_is_valid() {
    let pool = Pool::new();
    let mut b = IrBuilder::new(&pool);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![]);
    assert!(IrValidator::new().validate(&f, &pool).is_ok());
}

#[test]
fn unbound_jump_target_is_reported() {
    let pool = Pool::new();
    let mut b = IrBuilder::new(&pool);
    let loose = b.add_label("loose");
    b.add_jump(loose);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::UnboundLabel(loose.get())));
}

#[test]
fn duplicate_label_bind_is_reported() {
    let pool = Pool::new();
    let mut b = IrBuilder::new(&pool);
    let twice = b.add_label("twice");
    b.bind_label(twice);
    b.bind_label(twice);
    b.add_jump(twice);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::DuplicateLabelBind(twice.get())));
}

#[test]
fn missing_arg_slot_is_reported() {
    let mut pool = Pool::new();
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    let mut b = IrBuilder::new(&pool);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![i32_ty]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::ArgSlotMismatch(0)));
}

#[test]
fn arg_slot_type_must_match() {
    let mut pool = Pool::new();
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    let i64_ty = pool.intern(PoolKey::Int { width: 64 });
    let mut b = IrBuilder::new(&pool);
    b.add_arg(0, i64_ty);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![i32_ty]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::ArgSlotMismatch(0)));
}

#[test]
fn body_must_end_with_the_return_label_and_ret() {
    let pool = Pool::new();
    let mut b = IrBuilder::new(&pool);
    let ret = b.add_label("return");
    b.bind_label(ret);
    let f = finish(b, vec![]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::MissingTerminalRet));
}

#[test]
fn comparisons_must_produce_i1() {
    let mut pool = Pool::new();
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    let one = pool.intern(PoolKey::IntValue(1));
    let mut b = IrBuilder::new(&pool);
    let c = b.add_constant(one, i32_ty);
    let cmp = b.add_inst(Opcode::CmpEq, InstData::Bin { lhs: c, rhs: c }, i32_ty);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::NonBoolComparison(cmp.get())));
}

#[test]
fn width_casts_must_be_monotone() {
    let mut pool = Pool::new();
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    let one = pool.intern(PoolKey::IntValue(1));
    let mut b = IrBuilder::new(&pool);
    let c = b.add_constant(one, i32_ty);
    let widen = b.add_inst(Opcode::Zext, InstData::Un(c), i32_ty);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::NonMonotonicCast(widen.get())));
}

#[test]
fn branch_must_be_followed_by_a_label() {
    let mut pool = Pool::new();
    let one = pool.intern(PoolKey::IntValue(1));
    let mut b = IrBuilder::new(&pool);
    let cond = b.add_constant(one, pool.type_i1);
    let true_label = b.add_label("true");
    let false_label = b.add_label("false");
    b.branch = Some(Branch {
        true_label,
        false_label,
    });
    b.add_branch(cond);
    b.add_ret();
    b.bind_label(true_label);
    b.bind_label(false_label);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::MissingBlockLabel(0)));
}

#[test]
fn allocs_must_precede_their_uses() {
    let mut pool = Pool::new();
    let i32_ty = pool.intern(PoolKey::Int { width: 32 });
    let ptr = pool.type_ptr;
    let mut b = IrBuilder::new(&pool);
    // Forge a load of the alloc that is emitted right after it; the generic
    // emit path does not hoist, so the body order stays load-then-alloc.
    let future_alloc = IrRef::new(2).unwrap();
    b.add_inst(Opcode::Load, InstData::Un(future_alloc), i32_ty);
    b.add_inst(Opcode::Alloc, InstData::Alloc { size: 4, align: 4 }, ptr);
    let ret = b.add_label("return");
    b.bind_label(ret);
    b.add_ret();
    let f = finish(b, vec![]);
    let errors = IrValidator::new().validate(&f, &pool).unwrap_err();
    assert!(errors.contains(&ValidationError::AllocAfterUse(future_alloc.get())));
}
