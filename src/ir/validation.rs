//! IR validation pass.
//!
//! Checks that a lowered function is well-formed before it is handed to the
//! printer or a later pass. The validator collects every violation rather
//! than stopping at the first one.

use hashbrown::HashSet;

use super::pool::Pool;
use super::{InstData, IrFunction, IrRef, Opcode};

/// IR validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A jump/branch/switch references a label the body never binds.
    #[error("label %{0} is targeted but never bound")]
    UnboundLabel(u32),
    /// Two body entries bind the same label.
    #[error("label %{0} is bound more than once")]
    DuplicateLabelBind(u32),
    /// Instruction slot `slot` is not the expected `arg` instruction.
    #[error("instruction slot {0} is not arg {0} of the parameter's type")]
    ArgSlotMismatch(usize),
    /// The body does not end with the return label and a terminal return.
    #[error("function body does not end with a bound return label and ret")]
    MissingTerminalRet,
    /// An alloc is used before its body position.
    #[error("alloc %{0} is used before it appears in the body")]
    AllocAfterUse(u32),
    /// A comparison instruction whose result type is not i1.
    #[error("comparison %{0} does not produce i1")]
    NonBoolComparison(u32),
    /// A width cast that does not change bit width in the right direction.
    #[error("cast %{0} does not change bit width monotonically")]
    NonMonotonicCast(u32),
    /// A branch or switch not immediately followed by a label in the body.
    #[error("body position {0} terminates a block but is not followed by a label")]
    MissingBlockLabel(usize),
}

/// IR validation pass. Does not modify the IR.
#[derive(Default)]
pub struct IrValidator {
    errors: Vec<ValidationError>,
}

impl IrValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate one lowered function.
    pub fn validate(
        &mut self,
        function: &IrFunction,
        pool: &Pool,
    ) -> Result<(), Vec<ValidationError>> {
        self.errors.clear();

        let bound = self.check_label_binds(function);
        self.check_targets(function, &bound);
        self.check_arg_slots(function);
        self.check_terminal_ret(function);
        self.check_alloc_order(function);
        self.check_types(function, pool);
        self.check_block_boundaries(function);

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors.clone())
        }
    }

    /// Every label is bound at most once; returns the set of bound labels.
    fn check_label_binds(&mut self, function: &IrFunction) -> HashSet<IrRef> {
        let mut bound = HashSet::new();
        for &r in &function.body {
            if function.inst(r).op == Opcode::Label && !bound.insert(r) {
                self.errors.push(ValidationError::DuplicateLabelBind(r.get()));
            }
        }
        bound
    }

    /// Every jump/branch/switch target appears bound in the body.
    fn check_targets(&mut self, function: &IrFunction, bound: &HashSet<IrRef>) {
        let require = |label: IrRef, errors: &mut Vec<ValidationError>| {
            if !bound.contains(&label) {
                errors.push(ValidationError::UnboundLabel(label.get()));
            }
        };
        for inst in &function.instructions {
            match (&inst.op, &inst.data) {
                (Opcode::Jump, InstData::Un(label)) => require(*label, &mut self.errors),
                (Opcode::Branch, InstData::Branch(data)) => {
                    require(data.true_label, &mut self.errors);
                    require(data.false_label, &mut self.errors);
                }
                (Opcode::Switch, InstData::Switch(data)) => {
                    for (_, label) in &data.cases {
                        require(*label, &mut self.errors);
                    }
                    require(data.default, &mut self.errors);
                }
                _ => {}
            }
        }
    }

    /// Instruction slot `i` holds `arg i` with the parameter's lowered type.
    fn check_arg_slots(&mut self, function: &IrFunction) {
        for (slot, &param_ty) in function.params.iter().enumerate() {
            let ok = function.instructions.get(slot).is_some_and(|inst| {
                inst.op == Opcode::Arg
                    && inst.data == InstData::Arg(slot as u32)
                    && inst.ty == param_ty
            });
            if !ok {
                self.errors.push(ValidationError::ArgSlotMismatch(slot));
            }
        }
    }

    /// The body ends with a bound label followed by a terminal return.
    fn check_terminal_ret(&mut self, function: &IrFunction) {
        let n = function.body.len();
        let ok = n >= 2
            && matches!(
                function.inst(function.body[n - 1]).op,
                Opcode::Ret | Opcode::RetValue
            )
            && function.inst(function.body[n - 2]).op == Opcode::Label;
        if !ok {
            self.errors.push(ValidationError::MissingTerminalRet);
        }
    }

    /// Every alloc precedes (in body order) all of its uses.
    fn check_alloc_order(&mut self, function: &IrFunction) {
        let mut seen = HashSet::new();
        for &r in &function.body {
            let inst = function.inst(r);
            let check = |operand: IrRef, errors: &mut Vec<ValidationError>| {
                if function.inst(operand).op == Opcode::Alloc && !seen.contains(&operand) {
                    errors.push(ValidationError::AllocAfterUse(operand.get()));
                }
            };
            match &inst.data {
                InstData::Un(a) => check(*a, &mut self.errors),
                InstData::Bin { lhs, rhs } => {
                    check(*lhs, &mut self.errors);
                    check(*rhs, &mut self.errors);
                }
                InstData::Branch(data) => check(data.cond, &mut self.errors),
                InstData::Switch(data) => check(data.target, &mut self.errors),
                InstData::Call(data) => {
                    check(data.func, &mut self.errors);
                    for &a in &data.args {
                        check(a, &mut self.errors);
                    }
                }
                _ => {}
            }
            seen.insert(r);
        }
    }

    /// Comparisons produce i1; width casts are monotone.
    fn check_types(&mut self, function: &IrFunction, pool: &Pool) {
        for (index, inst) in function.instructions.iter().enumerate() {
            let r = index as u32 + 1;
            if inst.op.is_comparison() && inst.ty != pool.type_i1 {
                self.errors.push(ValidationError::NonBoolComparison(r));
            }
            if inst.op.is_cast() {
                if let InstData::Un(operand) = inst.data {
                    let from = pool.get(function.inst(operand).ty).bit_width();
                    let to = pool.get(inst.ty).bit_width();
                    if let (Some(from), Some(to)) = (from, to) {
                        let ok = match inst.op {
                            Opcode::Zext | Opcode::Sext => to > from,
                            Opcode::Trunc => to < from,
                            _ => true,
                        };
                        if !ok {
                            self.errors.push(ValidationError::NonMonotonicCast(r));
                        }
                    }
                }
            }
        }
    }

    /// Branch and switch terminate a basic block; the next body entry must
    /// be a label.
    fn check_block_boundaries(&mut self, function: &IrFunction) {
        for (pos, &r) in function.body.iter().enumerate() {
            if matches!(function.inst(r).op, Opcode::Branch | Opcode::Switch) {
                let next_is_label = function
                    .body
                    .get(pos + 1)
                    .is_some_and(|&next| function.inst(next).op == Opcode::Label);
                if !next_is_label {
                    self.errors.push(ValidationError::MissingBlockLabel(pos));
                }
            }
        }
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}
