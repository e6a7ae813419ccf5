//! Statement and control-flow lowering.
//!
//! The `break`/`continue` labels and the switch context form a logical
//! stack whose frames correspond to enclosing constructs; every site that
//! overwrites one restores the prior value on every exit path.

use crate::ast::{ConstValue, ForStmt, IfStmt, NodeKind, NodeRef, VarDeclData, WhileStmt};
use crate::diagnostic::LowerError;
use crate::ir::pool::PoolKey;
use crate::ir::{InstData, IrRef, Opcode, SwitchData};

use super::{Lowerer, SwitchCtx};

impl<'a> Lowerer<'a> {
    pub(super) fn lower_stmt(&mut self, node: NodeRef) -> Result<(), LowerError> {
        match self.kind(node) {
            NodeKind::CompoundStatement(items) => {
                let depth = self.symbols.depth();
                let mut result = Ok(());
                for &item in items.iter() {
                    result = self.lower_stmt(item);
                    if result.is_err() {
                        break;
                    }
                }
                self.symbols.truncate(depth);
                result
            }
            NodeKind::VarDecl(decl) => self.lower_var_decl(node, decl),
            NodeKind::If(stmt) => self.lower_if(stmt),
            NodeKind::While(stmt) => self.lower_while(stmt),
            NodeKind::DoWhile(body, condition) => self.lower_do_while(*body, *condition),
            NodeKind::For(stmt) => {
                let depth = self.symbols.depth();
                let result = self.lower_for(stmt);
                self.symbols.truncate(depth);
                result
            }
            NodeKind::Switch(condition, body) => self.lower_switch(*condition, *body),
            NodeKind::Case(expr, stmt) => self.lower_case(*expr, *stmt),
            NodeKind::CaseRange(..) => Err(LowerError::Unsupported("case range")),
            NodeKind::Default(stmt) => self.lower_default(*stmt),
            NodeKind::Break => {
                let target = self
                    .break_label
                    .expect("ICE: break outside of a loop or switch");
                self.builder.add_jump(target);
                Ok(())
            }
            NodeKind::Continue => {
                let target = self.continue_label.expect("ICE: continue outside of a loop");
                self.builder.add_jump(target);
                Ok(())
            }
            NodeKind::Return(expr) => self.lower_return(*expr),
            NodeKind::ImplicitReturn(returns_zero) => self.lower_implicit_return(*returns_zero),
            NodeKind::Goto(_) => Err(LowerError::Unsupported("goto")),
            NodeKind::Label(name, stmt) => {
                let label = self.builder.add_label(name.as_str());
                self.builder.bind_label(label);
                self.lower_stmt(*stmt)
            }
            NodeKind::ExpressionStatement(Some(expr)) => {
                // Value not needed, only side effects.
                self.lower_expr(*expr)?;
                Ok(())
            }
            NodeKind::ExpressionStatement(None)
            | NodeKind::EmptyStatement
            | NodeKind::StaticAssert
            | NodeKind::TypedefDecl
            | NodeKind::RecordDecl
            | NodeKind::EnumDecl
            | NodeKind::FunctionProto(_)
            | NodeKind::ExternVar(_) => Ok(()),
            _ => Err(LowerError::Unsupported("statement kind")),
        }
    }

    fn lower_var_decl(&mut self, node: NodeRef, decl: &VarDeclData) -> Result<(), LowerError> {
        let ty = self.node_type(node);
        // Reject variable types lowering cannot represent before emitting.
        self.lower_type(ty)?;
        let size = self.registry.size_of(ty);
        let align = self.registry.align_of(ty);
        let slot = self.builder.add_alloc(size, align);
        self.symbols.define(decl.name, slot);
        if let Some(init) = decl.init {
            let value = self.lower_expr(init)?;
            self.builder.add_store(slot, value);
        }
        Ok(())
    }

    fn lower_if(&mut self, stmt: &IfStmt) -> Result<(), LowerError> {
        match stmt.else_branch {
            None => {
                let then_label = self.builder.add_label("if.then");
                let end_label = self.builder.add_label("if.end");
                self.lower_cond(stmt.condition, then_label, end_label)?;
                self.builder.bind_label(then_label);
                self.lower_stmt(stmt.then_branch)?;
                self.builder.bind_label(end_label);
            }
            Some(else_branch) => {
                let then_label = self.builder.add_label("if.then");
                let else_label = self.builder.add_label("if.else");
                let end_label = self.builder.add_label("if.end");
                self.lower_cond(stmt.condition, then_label, else_label)?;
                self.builder.bind_label(then_label);
                self.lower_stmt(stmt.then_branch)?;
                self.builder.add_jump(end_label);
                self.builder.bind_label(else_label);
                self.lower_stmt(else_branch)?;
                self.builder.bind_label(end_label);
            }
        }
        Ok(())
    }

    fn lower_while(&mut self, stmt: &WhileStmt) -> Result<(), LowerError> {
        let cond_label = self.builder.add_label("while.cond");
        let then_label = self.builder.add_label("while.then");
        let end_label = self.builder.add_label("while.end");

        self.builder.bind_label(cond_label);
        self.lower_cond(stmt.condition, then_label, end_label)?;
        self.builder.bind_label(then_label);
        let body = stmt.body;
        self.with_loop(cond_label, end_label, |this| this.lower_stmt(body))?;
        self.builder.add_jump(cond_label);
        self.builder.bind_label(end_label);
        Ok(())
    }

    fn lower_do_while(&mut self, body: NodeRef, condition: NodeRef) -> Result<(), LowerError> {
        let then_label = self.builder.add_label("do.then");
        let cond_label = self.builder.add_label("do.cond");
        let end_label = self.builder.add_label("do.end");

        self.builder.bind_label(then_label);
        self.with_loop(cond_label, end_label, |this| this.lower_stmt(body))?;
        self.builder.bind_label(cond_label);
        self.lower_cond(condition, then_label, end_label)?;
        self.builder.bind_label(end_label);
        Ok(())
    }

    fn lower_for(&mut self, stmt: &ForStmt) -> Result<(), LowerError> {
        if let Some(init) = stmt.init {
            match self.kind(init) {
                NodeKind::VarDecl(_) => self.lower_stmt(init)?,
                _ => {
                    self.lower_expr(init)?;
                }
            }
        }

        if stmt.condition.is_none() && stmt.increment.is_none() {
            // for (;;)
            let then_label = self.builder.add_label("for.then");
            let end_label = self.builder.add_label("for.end");
            self.builder.bind_label(then_label);
            let body = stmt.body;
            self.with_loop(then_label, end_label, |this| this.lower_stmt(body))?;
            self.builder.add_jump(then_label);
            self.builder.bind_label(end_label);
            return Ok(());
        }

        let cond_label = stmt.condition.map(|_| self.builder.add_label("for.cond"));
        let then_label = self.builder.add_label("for.then");
        let cont_label = self.builder.add_label("for.cont");
        let end_label = self.builder.add_label("for.end");

        if let Some(condition) = stmt.condition {
            let cond_label = cond_label.unwrap();
            self.builder.bind_label(cond_label);
            self.lower_cond(condition, then_label, end_label)?;
        }
        self.builder.bind_label(then_label);
        let body = stmt.body;
        self.with_loop(cont_label, end_label, |this| this.lower_stmt(body))?;
        self.builder.bind_label(cont_label);
        if let Some(increment) = stmt.increment {
            // Result discarded.
            self.lower_expr(increment)?;
        }
        self.builder.add_jump(cond_label.unwrap_or(then_label));
        self.builder.bind_label(end_label);
        Ok(())
    }

    fn lower_switch(&mut self, condition: NodeRef, body: NodeRef) -> Result<(), LowerError> {
        let target = self.lower_expr(condition)?;
        let end_label = self.builder.add_label("switch.end");

        // Reserve the switch slot; cases are patched in after the body.
        let switch_inst = self.builder.add_inst(
            Opcode::Switch,
            InstData::Switch(Box::new(SwitchData {
                target,
                cases: Vec::new(),
                default: end_label,
            })),
            self.pool.type_void,
        );

        let saved_break = self.break_label.replace(end_label);
        let saved_ctx = self.switch_ctx.replace(SwitchCtx::default());
        let result = self.lower_stmt(body);
        let ctx = std::mem::replace(&mut self.switch_ctx, saved_ctx)
            .expect("ICE: switch context dropped during body lowering");
        self.break_label = saved_break;
        result?;

        self.builder.bind_label(end_label);
        self.builder.patch(
            switch_inst,
            InstData::Switch(Box::new(SwitchData {
                target,
                cases: ctx.cases,
                default: ctx.default.unwrap_or(end_label),
            })),
        );
        Ok(())
    }

    fn lower_case(&mut self, expr: NodeRef, stmt: NodeRef) -> Result<(), LowerError> {
        let value = self
            .value_of(expr)
            .expect("ICE: case expression without a computed constant value");
        let key = match value {
            ConstValue::Int(v) => PoolKey::IntValue(*v),
            _ => panic!("ICE: case value is not an integer"),
        };
        let interned = self.pool.intern(key);
        let label = self.builder.add_label("case");
        self.builder.bind_label(label);
        let ctx = self
            .switch_ctx
            .as_mut()
            .expect("ICE: case outside of a switch");
        ctx.cases.push((interned, label));
        self.lower_stmt(stmt)
    }

    fn lower_default(&mut self, stmt: NodeRef) -> Result<(), LowerError> {
        let label = self.builder.add_label("default");
        self.builder.bind_label(label);
        let ctx = self
            .switch_ctx
            .as_mut()
            .expect("ICE: default outside of a switch");
        ctx.default = Some(label);
        self.lower_stmt(stmt)
    }

    fn lower_return(&mut self, expr: Option<NodeRef>) -> Result<(), LowerError> {
        if let Some(expr) = expr {
            let value = self.lower_expr(expr)?;
            self.builder.add_ret_value(value);
        }
        let target = self.return_label.expect("ICE: return outside of a function");
        self.builder.add_jump(target);
        Ok(())
    }

    fn lower_implicit_return(&mut self, returns_zero: bool) -> Result<(), LowerError> {
        if returns_zero {
            let ret_ty = self
                .return_type
                .expect("ICE: implicit return outside of a function");
            let ty = self.lower_type(ret_ty)?;
            let zero = self.zero_constant(ty);
            self.builder.add_ret_value(zero);
        }
        // Otherwise the trailing ret at the return label suffices.
        Ok(())
    }

    /// Run `f` with the loop's continue/break labels installed, restoring
    /// the enclosing labels on every exit path.
    fn with_loop<F>(
        &mut self,
        continue_label: IrRef,
        break_label: IrRef,
        f: F,
    ) -> Result<(), LowerError>
    where
        F: FnOnce(&mut Self) -> Result<(), LowerError>,
    {
        let saved_break = self.break_label.replace(break_label);
        let saved_continue = self.continue_label.replace(continue_label);
        let result = f(self);
        self.break_label = saved_break;
        self.continue_label = saved_continue;
        result
    }
}
