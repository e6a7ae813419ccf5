//! Textual IR printer.
//!
//! Prints a function in body order. Pure values (constants, args, symbols)
//! never enter the body, so they are rendered inline at their use sites.

use std::fmt::Write;

use super::pool::{Pool, PoolKey, PoolRef};
use super::{InstData, IrFunction, IrModule, IrRef, Opcode};

/// Render a type reference.
pub fn type_name(pool: &Pool, r: PoolRef) -> String {
    match pool.get(r) {
        PoolKey::Void => "void".to_string(),
        PoolKey::I1 => "i1".to_string(),
        PoolKey::Ptr => "ptr".to_string(),
        PoolKey::Func => "func".to_string(),
        PoolKey::Int { width } => format!("i{}", width),
        PoolKey::Float { width } => format!("f{}", width),
        PoolKey::Array { child, len } => format!("[{} x {}]", len, type_name(pool, *child)),
        PoolKey::Vector { child, len } => format!("<{} x {}>", len, type_name(pool, *child)),
        key => format!("{:?}", key),
    }
}

fn value_name(pool: &Pool, r: PoolRef) -> String {
    match pool.get(r) {
        PoolKey::IntValue(v) => v.to_string(),
        PoolKey::FloatValue { bits } => f64::from_bits(*bits).to_string(),
        PoolKey::Bytes(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        key => format!("{:?}", key),
    }
}

fn label_name(f: &IrFunction, r: IrRef) -> String {
    match &f.inst(r).data {
        InstData::Label(hint) => format!("{}.{}", hint, r.get()),
        _ => format!("%{}", r.get()),
    }
}

fn operand(f: &IrFunction, pool: &Pool, r: IrRef) -> String {
    let inst = f.inst(r);
    match (&inst.op, &inst.data) {
        (Opcode::Constant, InstData::Constant(v)) => value_name(pool, *v),
        (Opcode::Symbol, InstData::Symbol(name)) => format!("@{}", name),
        (Opcode::Arg, InstData::Arg(slot)) => format!("%arg{}", slot),
        _ => format!("%{}", r.get()),
    }
}

/// Dump one function.
pub fn dump_function(f: &IrFunction, pool: &Pool) -> String {
    let mut out = String::new();
    let params = f
        .params
        .iter()
        .map(|&p| type_name(pool, p))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "fn {}({}) {{", f.name, params).unwrap();
    for &r in &f.body {
        let inst = f.inst(r);
        match (&inst.op, &inst.data) {
            (Opcode::Label, _) => {
                writeln!(out, "{}:", label_name(f, r)).unwrap();
            }
            (Opcode::Alloc, InstData::Alloc { size, align }) => {
                writeln!(out, "  %{} = alloc {}, align {}", r.get(), size, align).unwrap();
            }
            (Opcode::Store, InstData::Bin { lhs, rhs }) => {
                writeln!(
                    out,
                    "  store {} -> {}",
                    operand(f, pool, *rhs),
                    operand(f, pool, *lhs)
                )
                .unwrap();
            }
            (Opcode::Jump, InstData::Un(label)) => {
                writeln!(out, "  jump {}", label_name(f, *label)).unwrap();
            }
            (Opcode::Branch, InstData::Branch(data)) => {
                writeln!(
                    out,
                    "  branch {}, {}, {}",
                    operand(f, pool, data.cond),
                    label_name(f, data.true_label),
                    label_name(f, data.false_label)
                )
                .unwrap();
            }
            (Opcode::Switch, InstData::Switch(data)) => {
                let mut cases = String::new();
                for (value, label) in &data.cases {
                    write!(cases, "{} => {}, ", value_name(pool, *value), label_name(f, *label))
                        .unwrap();
                }
                writeln!(
                    out,
                    "  switch {} [{}default {}]",
                    operand(f, pool, data.target),
                    cases,
                    label_name(f, data.default)
                )
                .unwrap();
            }
            (Opcode::Ret, _) => {
                writeln!(out, "  ret").unwrap();
            }
            (Opcode::RetValue, InstData::Un(value)) => {
                writeln!(out, "  ret_value {}", operand(f, pool, *value)).unwrap();
            }
            (Opcode::Call, InstData::Call(data)) => {
                let args = data
                    .args
                    .iter()
                    .map(|&a| operand(f, pool, a))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(
                    out,
                    "  %{} = call {}({}) : {}",
                    r.get(),
                    operand(f, pool, data.func),
                    args,
                    type_name(pool, inst.ty)
                )
                .unwrap();
            }
            (op, InstData::Un(value)) => {
                writeln!(
                    out,
                    "  %{} = {} {} : {}",
                    r.get(),
                    op,
                    operand(f, pool, *value),
                    type_name(pool, inst.ty)
                )
                .unwrap();
            }
            (op, InstData::Bin { lhs, rhs }) => {
                writeln!(
                    out,
                    "  %{} = {} {}, {} : {}",
                    r.get(),
                    op,
                    operand(f, pool, *lhs),
                    operand(f, pool, *rhs),
                    type_name(pool, inst.ty)
                )
                .unwrap();
            }
            (op, _) => {
                writeln!(out, "  %{} = {}", r.get(), op).unwrap();
            }
        }
    }
    out.push_str("}\n");
    out
}

/// Dump a whole module: globals first, then functions.
pub fn dump_module(module: &IrModule, pool: &Pool) -> String {
    let mut out = String::new();
    for global in &module.globals {
        writeln!(out, "global @{} : {}", global.name, type_name(pool, global.ty)).unwrap();
    }
    for (i, f) in module.functions.iter().enumerate() {
        if i > 0 || !module.globals.is_empty() {
            out.push('\n');
        }
        out.push_str(&dump_function(f, pool));
    }
    out
}
