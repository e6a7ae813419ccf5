//! Linear intermediate representation.
//!
//! The IR emitted by lowering is pre-SSA: allocations act as memory cells,
//! loaded and stored explicitly. A function is an append-only instruction
//! buffer plus a body sequence giving the linearized execution order;
//! labels appear in the body at the point they bind, and `jump`/`branch`/
//! `switch` instructions reference them to form the CFG.

use std::fmt;
use std::num::NonZeroU32;

use serde::Serialize;
use symbol_table::GlobalSymbol as Symbol;
use thin_vec::ThinVec;

pub mod dumper;
pub mod pool;
pub mod validation;

#[cfg(test)]
mod tests_validation;

use pool::{Pool, PoolRef};

/// Dense handle identifying an instruction result or a label within a
/// function's instruction buffer.
pub type IrRef = NonZeroU32;

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Opcode {
    // Values
    Constant,
    Symbol,
    Arg,
    // Memory
    Alloc,
    Load,
    Store,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    BitShl,
    BitShr,
    // Comparison (result type i1)
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLte,
    CmpGt,
    CmpGte,
    // Conversions
    Zext,
    Sext,
    Trunc,
    // Control
    Label,
    Jump,
    Branch,
    Switch,
    Ret,
    RetValue,
    Call,
    /// Value-level conditional. Reserved; lowering builds a diamond CFG
    /// instead so that the arms stay lazy.
    Select,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Constant => "constant",
            Opcode::Symbol => "symbol",
            Opcode::Arg => "arg",
            Opcode::Alloc => "alloc",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::BitAnd => "bit_and",
            Opcode::BitOr => "bit_or",
            Opcode::BitXor => "bit_xor",
            Opcode::BitNot => "bit_not",
            Opcode::BitShl => "bit_shl",
            Opcode::BitShr => "bit_shr",
            Opcode::CmpEq => "cmp_eq",
            Opcode::CmpNe => "cmp_ne",
            Opcode::CmpLt => "cmp_lt",
            Opcode::CmpLte => "cmp_lte",
            Opcode::CmpGt => "cmp_gt",
            Opcode::CmpGte => "cmp_gte",
            Opcode::Zext => "zext",
            Opcode::Sext => "sext",
            Opcode::Trunc => "trunc",
            Opcode::Label => "label",
            Opcode::Jump => "jump",
            Opcode::Branch => "branch",
            Opcode::Switch => "switch",
            Opcode::Ret => "ret",
            Opcode::RetValue => "ret_value",
            Opcode::Call => "call",
            Opcode::Select => "select",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::CmpEq
                | Opcode::CmpNe
                | Opcode::CmpLt
                | Opcode::CmpLte
                | Opcode::CmpGt
                | Opcode::CmpGte
        )
    }

    pub fn is_cast(self) -> bool {
        matches!(self, Opcode::Zext | Opcode::Sext | Opcode::Trunc)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Conditional branch payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchData {
    pub cond: IrRef,
    pub true_label: IrRef,
    pub false_label: IrRef,
}

/// Multiway switch payload: interned case values and their labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchData {
    pub target: IrRef,
    pub cases: Vec<(PoolRef, IrRef)>,
    pub default: IrRef,
}

/// Call payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallData {
    pub func: IrRef,
    pub args: ThinVec<IrRef>,
}

/// Instruction payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InstData {
    None,
    Constant(PoolRef),
    Arg(u32),
    Symbol(Symbol),
    Label(Symbol),
    Alloc { size: u64, align: u32 },
    Un(IrRef),
    Bin { lhs: IrRef, rhs: IrRef },
    Branch(Box<BranchData>),
    Switch(Box<SwitchData>),
    Call(Box<CallData>),
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub op: Opcode,
    pub data: InstData,
    pub ty: PoolRef,
}

/// The (true, false) label pair consulted when lowering a boolean
/// expression into control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub true_label: IrRef,
    pub false_label: IrRef,
}

/// A lowered function.
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: Symbol,
    /// Lowered parameter types, in slot order.
    pub params: Vec<PoolRef>,
    pub instructions: Vec<Inst>,
    pub body: Vec<IrRef>,
}

impl IrFunction {
    #[inline]
    pub fn inst(&self, r: IrRef) -> &Inst {
        &self.instructions[(r.get() - 1) as usize]
    }
}

/// A file-scope variable record. Data emission is not implemented; the
/// module only carries the name and lowered type.
#[derive(Debug, Clone, PartialEq)]
pub struct IrGlobal {
    pub name: Symbol,
    pub ty: PoolRef,
}

/// Lowered translation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub globals: Vec<IrGlobal>,
}

/// Append-only instruction builder for one function.
///
/// Owns the per-function transient state: the instruction buffer, the body
/// sequence, the entry-region cursor for allocs, and the branch context.
pub struct IrBuilder {
    pub instructions: Vec<Inst>,
    pub body: Vec<IrRef>,
    /// Current branch-destination context; set by callers before boolean
    /// lowering and restored afterwards.
    pub branch: Option<Branch>,
    /// Body position past the last entry-region alloc.
    alloc_count: usize,
    type_void: PoolRef,
    type_ptr: PoolRef,
}

impl IrBuilder {
    pub fn new(pool: &Pool) -> Self {
        IrBuilder {
            instructions: Vec::new(),
            body: Vec::new(),
            branch: None,
            alloc_count: 0,
            type_void: pool.type_void,
            type_ptr: pool.type_ptr,
        }
    }

    fn push(&mut self, inst: Inst) -> IrRef {
        self.instructions.push(inst);
        IrRef::new(self.instructions.len() as u32).expect("IrRef overflow")
    }

    #[inline]
    pub fn inst(&self, r: IrRef) -> &Inst {
        &self.instructions[(r.get() - 1) as usize]
    }

    /// Generic emit: appends the instruction to the body sequence.
    pub fn add_inst(&mut self, op: Opcode, data: InstData, ty: PoolRef) -> IrRef {
        let r = self.push(Inst { op, data, ty });
        self.body.push(r);
        r
    }

    /// Emit a constant value. Pure values do not enter the body sequence.
    pub fn add_constant(&mut self, value: PoolRef, ty: PoolRef) -> IrRef {
        self.push(Inst {
            op: Opcode::Constant,
            data: InstData::Constant(value),
            ty,
        })
    }

    /// Emit a function parameter slot.
    pub fn add_arg(&mut self, slot: u32, ty: PoolRef) -> IrRef {
        self.push(Inst {
            op: Opcode::Arg,
            data: InstData::Arg(slot),
            ty,
        })
    }

    /// Emit a named global/function reference of the given type.
    pub fn add_symbol(&mut self, name: Symbol, ty: PoolRef) -> IrRef {
        self.push(Inst {
            op: Opcode::Symbol,
            data: InstData::Symbol(name),
            ty,
        })
    }

    /// Allocate a label. Binding happens only when the label is appended to
    /// the body via [`bind_label`](Self::bind_label).
    pub fn add_label(&mut self, hint: &str) -> IrRef {
        self.push(Inst {
            op: Opcode::Label,
            data: InstData::Label(Symbol::from(hint)),
            ty: self.type_void,
        })
    }

    /// Append a label to the body sequence, binding it.
    pub fn bind_label(&mut self, label: IrRef) {
        debug_assert_eq!(self.inst(label).op, Opcode::Label);
        self.body.push(label);
    }

    /// Emit a stack slot. Allocs are hoisted into the function's entry
    /// region of the body so they precede every use.
    pub fn add_alloc(&mut self, size: u64, align: u32) -> IrRef {
        let r = self.push(Inst {
            op: Opcode::Alloc,
            data: InstData::Alloc { size, align },
            ty: self.type_ptr,
        });
        self.body.insert(self.alloc_count, r);
        self.alloc_count += 1;
        r
    }

    /// Emit a store of `value` to `addr`. The result is unused.
    pub fn add_store(&mut self, addr: IrRef, value: IrRef) -> IrRef {
        self.add_inst(
            Opcode::Store,
            InstData::Bin {
                lhs: addr,
                rhs: value,
            },
            self.type_void,
        )
    }

    /// Append a jump, terminating the current block.
    pub fn add_jump(&mut self, label: IrRef) -> IrRef {
        self.add_inst(Opcode::Jump, InstData::Un(label), self.type_void)
    }

    /// Emit a conditional branch to the current branch context's labels.
    pub fn add_branch(&mut self, cond: IrRef) -> IrRef {
        let ctx = self
            .branch
            .expect("ICE: conditional branch emitted without a branch context");
        self.add_inst(
            Opcode::Branch,
            InstData::Branch(Box::new(BranchData {
                cond,
                true_label: ctx.true_label,
                false_label: ctx.false_label,
            })),
            self.type_void,
        )
    }

    /// Append the terminal return.
    pub fn add_ret(&mut self) -> IrRef {
        self.add_inst(Opcode::Ret, InstData::None, self.type_void)
    }

    /// Emit a value-carrying return.
    pub fn add_ret_value(&mut self, value: IrRef) -> IrRef {
        self.add_inst(Opcode::RetValue, InstData::Un(value), self.type_void)
    }

    /// Replace a reserved instruction's payload (switch patching).
    pub fn patch(&mut self, r: IrRef, data: InstData) {
        self.instructions[(r.get() - 1) as usize].data = data;
    }

    /// Finish the function, consuming the builder.
    pub fn finish(self, name: Symbol, params: Vec<PoolRef>) -> IrFunction {
        IrFunction {
            name,
            params,
            instructions: self.instructions,
            body: self.body,
        }
    }
}
