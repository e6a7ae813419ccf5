//! Expression lowering.
//!
//! Three entry points: `lower_expr` produces an rvalue reference,
//! `lower_lval` produces an address, and `lower_bool` consumes the
//! builder's branch context and produces terminators instead of a value.

use thin_vec::ThinVec;

use crate::ast::{BinaryOp, CastKind, NodeKind, NodeRef, Symbol, UnaryOp};
use crate::diagnostic::LowerError;
use crate::ir::pool::PoolKey;
use crate::ir::{Branch, CallData, InstData, IrRef, Opcode};

use super::Lowerer;

fn binop_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitXor,
        BinaryOp::Shl => Opcode::BitShl,
        BinaryOp::Shr => Opcode::BitShr,
        BinaryOp::Eq => Opcode::CmpEq,
        BinaryOp::Ne => Opcode::CmpNe,
        BinaryOp::Lt => Opcode::CmpLt,
        BinaryOp::Le => Opcode::CmpLte,
        BinaryOp::Gt => Opcode::CmpGt,
        BinaryOp::Ge => Opcode::CmpGte,
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::Comma => {
            panic!("ICE: {:?} has no direct opcode", op)
        }
    }
}

fn is_comparison(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
    )
}

impl<'a> Lowerer<'a> {
    /// Lower an expression in rvalue position.
    pub(super) fn lower_expr(&mut self, node: NodeRef) -> Result<IrRef, LowerError> {
        // Constants the analyzer already evaluated short-circuit everything.
        if let Some(value) = self.value_of(node) {
            let ty = self.lower_type(self.node_type(node))?;
            return Ok(self.add_constant_value(value, ty));
        }

        match self.kind(node) {
            NodeKind::Paren(inner) => self.lower_expr(*inner),
            NodeKind::BinaryOp(op, lhs, rhs) => self.lower_binary(node, *op, *lhs, *rhs),
            NodeKind::Assignment(lhs, rhs) => {
                let (lhs, rhs) = (*lhs, *rhs);
                let value = self.lower_expr(rhs)?;
                let addr = self.lower_lval(lhs)?;
                self.builder.add_store(addr, value);
                Ok(value)
            }
            NodeKind::CompoundAssignment(op, lhs, rhs) => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let value = self.lower_expr(rhs)?;
                let addr = self.lower_lval(lhs)?;
                let ty = self.lower_type(self.node_type(node))?;
                let loaded = self.builder.add_inst(Opcode::Load, InstData::Un(addr), ty);
                let result = self.builder.add_inst(
                    binop_opcode(op),
                    InstData::Bin {
                        lhs: loaded,
                        rhs: value,
                    },
                    ty,
                );
                self.builder.add_store(addr, result);
                Ok(result)
            }
            NodeKind::UnaryOp(op, operand) => self.lower_unary(node, *op, *operand),
            NodeKind::PostIncrement(operand) => self.lower_incdec(node, *operand, Opcode::Add, false),
            NodeKind::PostDecrement(operand) => self.lower_incdec(node, *operand, Opcode::Sub, false),
            NodeKind::Cast(kind, operand) => self.lower_cast(node, *kind, *operand),
            NodeKind::Conditional(cond, then_expr, else_expr) => {
                self.lower_conditional(node, *cond, *then_expr, *else_expr)
            }
            NodeKind::BinaryConditional(cond, then_expr, else_expr) => {
                self.lower_binary_conditional(node, *cond, *then_expr, *else_expr)
            }
            NodeKind::CondDummy => Ok(self
                .cond_dummy_ref
                .expect("ICE: cond_dummy_expr outside of a binary conditional")),
            NodeKind::FunctionCall(callee, args) => self.lower_call(node, *callee, args),
            NodeKind::LiteralInt(_)
            | NodeKind::LiteralFloat(_)
            | NodeKind::LiteralChar(_)
            | NodeKind::LiteralString(_) => {
                panic!("ICE: literal reached rvalue lowering without a computed value")
            }
            _ => Err(LowerError::Unsupported("expression kind")),
        }
    }

    /// Lower an expression in lvalue position, yielding an address.
    pub(super) fn lower_lval(&mut self, node: NodeRef) -> Result<IrRef, LowerError> {
        match self.kind(node) {
            NodeKind::LiteralString(contents) => {
                // Escape the bytes into a printable anonymous name; emitting
                // the anonymous global itself is not implemented.
                let name = format!("\"{}\"", contents.as_str().escape_default());
                Ok(self
                    .builder
                    .add_symbol(Symbol::from(name.as_str()), self.pool.type_ptr))
            }
            NodeKind::DeclRef(name) => match self.symbols.lookup(*name) {
                Some(storage) => Ok(storage),
                // Not a local: treat as an external symbol.
                None => Ok(self.builder.add_symbol(*name, self.pool.type_ptr)),
            },
            NodeKind::Paren(inner) => self.lower_lval(*inner),
            NodeKind::UnaryOp(UnaryOp::Deref, operand) => self.lower_expr(*operand),
            _ => Err(LowerError::Unsupported("lvalue expression kind")),
        }
    }

    /// Lower a boolean expression into control flow: on block exit, control
    /// has transferred to the branch context's true label if the expression
    /// is non-zero and to its false label otherwise.
    pub(super) fn lower_bool(&mut self, node: NodeRef) -> Result<(), LowerError> {
        match self.kind(node) {
            NodeKind::Paren(inner) => self.lower_bool(*inner),
            NodeKind::BinaryOp(BinaryOp::LogicalOr, lhs, rhs) => {
                let (lhs, rhs) = (*lhs, *rhs);
                let ctx = self.branch_context();
                if let Some(value) = self.value_of(lhs) {
                    if value.is_truthy() {
                        self.builder.add_jump(ctx.true_label);
                        Ok(())
                    } else {
                        self.lower_bool(rhs)
                    }
                } else {
                    let false_label = self.builder.add_label("bool_or.false");
                    self.lower_cond(lhs, ctx.true_label, false_label)?;
                    self.builder.bind_label(false_label);
                    self.lower_bool(rhs)
                }
            }
            NodeKind::BinaryOp(BinaryOp::LogicalAnd, lhs, rhs) => {
                let (lhs, rhs) = (*lhs, *rhs);
                let ctx = self.branch_context();
                if let Some(value) = self.value_of(lhs) {
                    if value.is_truthy() {
                        self.lower_bool(rhs)
                    } else {
                        self.builder.add_jump(ctx.false_label);
                        Ok(())
                    }
                } else {
                    let true_label = self.builder.add_label("bool_and.true");
                    self.lower_cond(lhs, true_label, ctx.false_label)?;
                    self.builder.bind_label(true_label);
                    self.lower_bool(rhs)
                }
            }
            NodeKind::UnaryOp(UnaryOp::LogicalNot, operand) => {
                let operand = *operand;
                let ctx = self.branch_context();
                self.lower_cond(operand, ctx.false_label, ctx.true_label)
            }
            NodeKind::BinaryOp(op, lhs, rhs) if is_comparison(*op) => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                let cmp = self.builder.add_inst(
                    binop_opcode(op),
                    InstData::Bin { lhs, rhs },
                    self.pool.type_i1,
                );
                self.builder.add_branch(cmp);
                Ok(())
            }
            // A bool widened to int just to be re-tested: branch on the i1
            // directly, skipping the redundant zext.
            NodeKind::Cast(CastKind::BoolToInt, operand) => {
                let value = self.lower_expr(*operand)?;
                self.builder.add_branch(value);
                Ok(())
            }
            _ => {
                let value = self.lower_expr(node)?;
                let ty = self.lower_type(self.node_type(node))?;
                let zero = self.zero_constant(ty);
                let cmp = self.builder.add_inst(
                    Opcode::CmpNe,
                    InstData::Bin {
                        lhs: value,
                        rhs: zero,
                    },
                    self.pool.type_i1,
                );
                self.builder.add_branch(cmp);
                Ok(())
            }
        }
    }

    /// Run boolean lowering with a fresh branch context, restoring the
    /// enclosing context on every exit path.
    pub(super) fn lower_cond(
        &mut self,
        cond: NodeRef,
        true_label: IrRef,
        false_label: IrRef,
    ) -> Result<(), LowerError> {
        let saved = self.builder.branch.replace(Branch {
            true_label,
            false_label,
        });
        let result = self.lower_bool(cond);
        self.builder.branch = saved;
        result
    }

    fn branch_context(&self) -> Branch {
        self.builder
            .branch
            .expect("ICE: boolean lowering without a branch context")
    }

    fn lower_binary(
        &mut self,
        node: NodeRef,
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
    ) -> Result<IrRef, LowerError> {
        match op {
            BinaryOp::Comma => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => self.lower_bool_value(node),
            BinaryOp::Add | BinaryOp::Sub
                if self.registry.is_pointer(self.node_type(lhs))
                    || (op == BinaryOp::Add && self.registry.is_pointer(self.node_type(rhs))) =>
            {
                self.lower_pointer_arith(node, op, lhs, rhs)
            }
            _ if is_comparison(op) => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                let cmp = self.builder.add_inst(
                    binop_opcode(op),
                    InstData::Bin { lhs, rhs },
                    self.pool.type_i1,
                );
                let ty = self.lower_type(self.node_type(node))?;
                Ok(self.builder.add_inst(Opcode::Zext, InstData::Un(cmp), ty))
            }
            _ => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                let ty = self.lower_type(self.node_type(node))?;
                Ok(self
                    .builder
                    .add_inst(binop_opcode(op), InstData::Bin { lhs, rhs }, ty))
            }
        }
    }

    /// Pointer +/- integer: scale the offset by the element size unless the
    /// element is a single byte. A dedicated address-calculation instruction
    /// is future work.
    fn lower_pointer_arith(
        &mut self,
        node: NodeRef,
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
    ) -> Result<IrRef, LowerError> {
        let ptr_on_left = self.registry.is_pointer(self.node_type(lhs));
        let lowered_lhs = self.lower_expr(lhs)?;
        let lowered_rhs = self.lower_expr(rhs)?;
        let (ptr, offset, ptr_node, offset_node) = if ptr_on_left {
            (lowered_lhs, lowered_rhs, lhs, rhs)
        } else {
            (lowered_rhs, lowered_lhs, rhs, lhs)
        };

        let pointee = self
            .registry
            .pointee(self.node_type(ptr_node))
            .expect("ICE: pointer arithmetic on a non-pointer");
        let elem_size = self.registry.size_of(pointee);
        let ty = self.lower_type(self.node_type(node))?;

        let offset = if elem_size == 1 {
            offset
        } else {
            let offset_ty = self.lower_type(self.node_type(offset_node))?;
            let size = self.pool.intern(PoolKey::IntValue(elem_size as i64));
            let size = self.builder.add_constant(size, offset_ty);
            self.builder.add_inst(
                Opcode::Mul,
                InstData::Bin {
                    lhs: offset,
                    rhs: size,
                },
                offset_ty,
            )
        };
        Ok(self.builder.add_inst(
            binop_opcode(op),
            InstData::Bin { lhs: ptr, rhs: offset },
            ty,
        ))
    }

    fn lower_unary(
        &mut self,
        node: NodeRef,
        op: UnaryOp,
        operand: NodeRef,
    ) -> Result<IrRef, LowerError> {
        match op {
            UnaryOp::Plus => self.lower_expr(operand),
            UnaryOp::Negate => {
                let ty = self.lower_type(self.node_type(node))?;
                let zero = self.zero_constant(ty);
                let value = self.lower_expr(operand)?;
                Ok(self.builder.add_inst(
                    Opcode::Sub,
                    InstData::Bin {
                        lhs: zero,
                        rhs: value,
                    },
                    ty,
                ))
            }
            UnaryOp::BitNot => {
                let value = self.lower_expr(operand)?;
                let ty = self.lower_type(self.node_type(node))?;
                Ok(self
                    .builder
                    .add_inst(Opcode::BitNot, InstData::Un(value), ty))
            }
            UnaryOp::LogicalNot => {
                let operand_ty = self.lower_type(self.node_type(operand))?;
                let zero = self.zero_constant(operand_ty);
                let value = self.lower_expr(operand)?;
                let cmp = self.builder.add_inst(
                    Opcode::CmpNe,
                    InstData::Bin {
                        lhs: zero,
                        rhs: value,
                    },
                    self.pool.type_i1,
                );
                let ty = self.lower_type(self.node_type(node))?;
                Ok(self.builder.add_inst(Opcode::Zext, InstData::Un(cmp), ty))
            }
            UnaryOp::AddressOf => self.lower_lval(operand),
            UnaryOp::Deref => {
                // Dereferencing a function-to-pointer decay is a no-op.
                if let NodeKind::Cast(CastKind::FunctionToPointer, _) = self.kind(operand) {
                    return self.lower_expr(operand);
                }
                let addr = self.lower_lval(node)?;
                let ty = self.lower_type(self.node_type(node))?;
                Ok(self.builder.add_inst(Opcode::Load, InstData::Un(addr), ty))
            }
            UnaryOp::PreIncrement => self.lower_incdec(node, operand, Opcode::Add, true),
            UnaryOp::PreDecrement => self.lower_incdec(node, operand, Opcode::Sub, true),
        }
    }

    /// Increment/decrement: the operand is already an address.
    fn lower_incdec(
        &mut self,
        node: NodeRef,
        operand: NodeRef,
        op: Opcode,
        is_prefix: bool,
    ) -> Result<IrRef, LowerError> {
        let addr = self.lower_lval(operand)?;
        let ty = self.lower_type(self.node_type(node))?;
        let loaded = self.builder.add_inst(Opcode::Load, InstData::Un(addr), ty);
        let one = self.one_constant(ty);
        let updated = self.builder.add_inst(
            op,
            InstData::Bin {
                lhs: loaded,
                rhs: one,
            },
            ty,
        );
        self.builder.add_store(addr, updated);
        Ok(if is_prefix { updated } else { loaded })
    }

    fn lower_cast(
        &mut self,
        node: NodeRef,
        kind: CastKind,
        operand: NodeRef,
    ) -> Result<IrRef, LowerError> {
        match kind {
            CastKind::NoOp => self.lower_expr(operand),
            CastKind::LValToRVal => {
                let addr = self.lower_lval(operand)?;
                let ty = self.lower_type(self.node_type(node))?;
                Ok(self.builder.add_inst(Opcode::Load, InstData::Un(addr), ty))
            }
            CastKind::FunctionToPointer | CastKind::ArrayToPointer => self.lower_lval(operand),
            CastKind::IntCast => {
                let value = self.lower_expr(operand)?;
                let src = self.node_type(operand);
                let dst = self.node_type(node);
                let src_bits = self.registry.bit_size(src);
                let dst_bits = self.registry.bit_size(dst);
                if src_bits == dst_bits {
                    return Ok(value);
                }
                let op = if dst_bits > src_bits {
                    if self.registry.is_signed(src) {
                        Opcode::Sext
                    } else {
                        Opcode::Zext
                    }
                } else {
                    Opcode::Trunc
                };
                let ty = self.lower_type(dst)?;
                Ok(self.builder.add_inst(op, InstData::Un(value), ty))
            }
            CastKind::BoolToInt => {
                let value = self.lower_expr(operand)?;
                let ty = self.lower_type(self.node_type(node))?;
                Ok(self.builder.add_inst(Opcode::Zext, InstData::Un(value), ty))
            }
            CastKind::IntToBool | CastKind::FloatToBool | CastKind::PointerToBool => {
                let value = self.lower_expr(operand)?;
                let operand_ty = self.lower_type(self.node_type(operand))?;
                let zero = self.zero_constant(operand_ty);
                Ok(self.builder.add_inst(
                    Opcode::CmpNe,
                    InstData::Bin {
                        lhs: value,
                        rhs: zero,
                    },
                    self.pool.type_i1,
                ))
            }
            CastKind::FloatCast => Err(LowerError::Unsupported("float cast")),
            CastKind::IntToFloat => Err(LowerError::Unsupported("int to float cast")),
            CastKind::FloatToInt => Err(LowerError::Unsupported("float to int cast")),
            CastKind::PointerToInt => Err(LowerError::Unsupported("pointer to int cast")),
            CastKind::IntToPointer => Err(LowerError::Unsupported("int to pointer cast")),
            CastKind::NullToPointer => Err(LowerError::Unsupported("null to pointer cast")),
            CastKind::Bitcast => Err(LowerError::Unsupported("bitcast")),
            CastKind::UnionCast => Err(LowerError::Unsupported("union cast")),
            CastKind::VectorSplat => Err(LowerError::Unsupported("vector splat")),
        }
    }

    /// `a ? b : c` as a diamond: branch, store each arm into a join cell,
    /// load at the merge. Keeps the arms lazy.
    fn lower_conditional(
        &mut self,
        node: NodeRef,
        cond: NodeRef,
        then_expr: NodeRef,
        else_expr: NodeRef,
    ) -> Result<IrRef, LowerError> {
        let result_ty = self.node_type(node);
        let ty = self.lower_type(result_ty)?;
        let cell = self
            .builder
            .add_alloc(self.registry.size_of(result_ty), self.registry.align_of(result_ty));

        let then_label = self.builder.add_label("cond.then");
        let else_label = self.builder.add_label("cond.else");
        let end_label = self.builder.add_label("cond.end");

        self.lower_cond(cond, then_label, else_label)?;

        self.builder.bind_label(then_label);
        let then_value = self.lower_expr(then_expr)?;
        self.builder.add_store(cell, then_value);
        self.builder.add_jump(end_label);

        self.builder.bind_label(else_label);
        let else_value = self.lower_expr(else_expr)?;
        self.builder.add_store(cell, else_value);

        self.builder.bind_label(end_label);
        Ok(self.builder.add_inst(Opcode::Load, InstData::Un(cell), ty))
    }

    /// GNU `a ?: c`: the condition's value is published while the then arm
    /// lowers, so `cond_dummy_expr` nodes inside it reuse it.
    fn lower_binary_conditional(
        &mut self,
        node: NodeRef,
        cond: NodeRef,
        then_expr: NodeRef,
        else_expr: NodeRef,
    ) -> Result<IrRef, LowerError> {
        let result_ty = self.node_type(node);
        let ty = self.lower_type(result_ty)?;
        let cell = self
            .builder
            .add_alloc(self.registry.size_of(result_ty), self.registry.align_of(result_ty));

        let then_label = self.builder.add_label("cond.then");
        let else_label = self.builder.add_label("cond.else");
        let end_label = self.builder.add_label("cond.end");

        let cond_value = self.lower_expr(cond)?;
        let cond_ty = self.lower_type(self.node_type(cond))?;
        let zero = self.zero_constant(cond_ty);
        let test = self.builder.add_inst(
            Opcode::CmpNe,
            InstData::Bin {
                lhs: cond_value,
                rhs: zero,
            },
            self.pool.type_i1,
        );
        let saved = self.builder.branch.replace(Branch {
            true_label: then_label,
            false_label: else_label,
        });
        self.builder.add_branch(test);
        self.builder.branch = saved;

        self.builder.bind_label(then_label);
        let saved_dummy = self.cond_dummy_ref.replace(cond_value);
        let then_value = self.lower_expr(then_expr);
        self.cond_dummy_ref = saved_dummy;
        let then_value = then_value?;
        self.builder.add_store(cell, then_value);
        self.builder.add_jump(end_label);

        self.builder.bind_label(else_label);
        let else_value = self.lower_expr(else_expr)?;
        self.builder.add_store(cell, else_value);

        self.builder.bind_label(end_label);
        Ok(self.builder.add_inst(Opcode::Load, InstData::Un(cell), ty))
    }

    /// `&&`/`||` needed as a value: run branch lowering into a fresh i1
    /// cell and rejoin, then widen to the expression type.
    fn lower_bool_value(&mut self, node: NodeRef) -> Result<IrRef, LowerError> {
        let ty = self.lower_type(self.node_type(node))?;
        let cell = self.builder.add_alloc(1, 1);
        let true_label = self.builder.add_label("bool.true");
        let false_label = self.builder.add_label("bool.false");
        let end_label = self.builder.add_label("bool.end");

        self.lower_cond(node, true_label, false_label)?;

        self.builder.bind_label(true_label);
        let one = self.one_constant(self.pool.type_i1);
        self.builder.add_store(cell, one);
        self.builder.add_jump(end_label);

        self.builder.bind_label(false_label);
        let zero = self.zero_constant(self.pool.type_i1);
        self.builder.add_store(cell, zero);

        self.builder.bind_label(end_label);
        let joined = self
            .builder
            .add_inst(Opcode::Load, InstData::Un(cell), self.pool.type_i1);
        Ok(self.builder.add_inst(Opcode::Zext, InstData::Un(joined), ty))
    }

    /// Direct-call optimization: peel wrappers off the callee looking for a
    /// free function name; otherwise call through the lowered pointer.
    fn find_direct_callee(&self, mut node: NodeRef) -> Option<Symbol> {
        loop {
            match self.kind(node) {
                NodeKind::Paren(inner) => node = *inner,
                NodeKind::UnaryOp(UnaryOp::AddressOf, inner)
                | NodeKind::UnaryOp(UnaryOp::Deref, inner) => node = *inner,
                NodeKind::Cast(kind, inner)
                    if matches!(
                        kind,
                        CastKind::NoOp
                            | CastKind::LValToRVal
                            | CastKind::FunctionToPointer
                            | CastKind::ArrayToPointer
                    ) =>
                {
                    node = *inner;
                }
                NodeKind::DeclRef(name) => {
                    return if self.symbols.lookup(*name).is_none() {
                        Some(*name)
                    } else {
                        None
                    };
                }
                _ => return None,
            }
        }
    }

    fn lower_call(
        &mut self,
        node: NodeRef,
        callee: NodeRef,
        args: &ThinVec<NodeRef>,
    ) -> Result<IrRef, LowerError> {
        let func = match self.find_direct_callee(callee) {
            Some(name) => self.builder.add_symbol(name, self.pool.type_func),
            None => self.lower_expr(callee)?,
        };
        let mut lowered_args = ThinVec::with_capacity(args.len());
        for &arg in args.iter() {
            lowered_args.push(self.lower_expr(arg)?);
        }
        let ty = self.lower_type(self.node_type(node))?;
        Ok(self.builder.add_inst(
            Opcode::Call,
            InstData::Call(Box::new(CallData {
                func,
                args: lowered_args,
            })),
            ty,
        ))
    }
}
