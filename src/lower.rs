//! AST-to-IR lowering.
//!
//! Consumes the typed, semantically analyzed AST and emits the linear IR:
//! the driver iterates top-level declarations, function lowering seeds the
//! argument slots and parameter cells, and the statement/expression
//! submodules translate bodies using the builder's label primitives.

use hashbrown::HashMap;
use log::debug;

use crate::ast::{Ast, ConstValue, FunctionDefData, NodeKind, NodeRef, VarDeclData};
use crate::diagnostic::LowerError;
use crate::ir::pool::{Pool, PoolKey, PoolRef};
use crate::ir::{IrBuilder, IrFunction, IrGlobal, IrModule, IrRef};
use crate::semantic::{ArraySizeType, TypeKind, TypeRef, TypeRegistry};

mod expressions;
mod statements;
pub mod symbols;

#[cfg(test)]
mod tests_lowering;

use symbols::SymbolStack;

/// Case list and default label accumulated for the innermost switch.
#[derive(Debug, Default)]
struct SwitchCtx {
    cases: Vec<(PoolRef, IrRef)>,
    default: Option<IrRef>,
}

/// The lowering pass. One instance lowers a whole translation unit; the
/// per-function state (builder, symbol stack, label slots) is reset on
/// every function boundary.
pub struct Lowerer<'a> {
    ast: &'a Ast,
    registry: &'a TypeRegistry,
    pool: &'a mut Pool,
    builder: IrBuilder,
    symbols: SymbolStack,
    type_cache: HashMap<TypeRef, PoolRef>,
    return_label: Option<IrRef>,
    return_type: Option<TypeRef>,
    break_label: Option<IrRef>,
    continue_label: Option<IrRef>,
    switch_ctx: Option<SwitchCtx>,
    cond_dummy_ref: Option<IrRef>,
}

/// Lower every declaration of the translation unit.
pub fn lower_translation_unit(
    ast: &Ast,
    registry: &TypeRegistry,
    pool: &mut Pool,
) -> Result<IrModule, LowerError> {
    debug!("lowering translation unit to IR");
    let root = ast.root().expect("ICE: AST has no root");
    let NodeKind::TranslationUnit(decls) = ast.get_kind(root) else {
        panic!("ICE: AST root is not a translation unit");
    };

    let mut lowerer = Lowerer::new(ast, registry, pool);
    let mut module = IrModule::default();
    for &decl in decls.iter() {
        match ast.get_kind(decl) {
            NodeKind::FunctionDef(def) => {
                module.functions.push(lowerer.lower_function(decl, def)?);
            }
            NodeKind::VarDecl(var) => {
                module.globals.push(lowerer.lower_variable(decl, var)?);
            }
            // Declarative nodes carry no runtime effect.
            _ => {}
        }
    }
    debug!(
        "lowered {} functions, {} globals",
        module.functions.len(),
        module.globals.len()
    );
    Ok(module)
}

impl<'a> Lowerer<'a> {
    pub fn new(ast: &'a Ast, registry: &'a TypeRegistry, pool: &'a mut Pool) -> Self {
        let builder = IrBuilder::new(pool);
        Lowerer {
            ast,
            registry,
            pool,
            builder,
            symbols: SymbolStack::new(),
            type_cache: HashMap::new(),
            return_label: None,
            return_type: None,
            break_label: None,
            continue_label: None,
            switch_ctx: None,
            cond_dummy_ref: None,
        }
    }

    #[inline]
    fn kind(&self, node: NodeRef) -> &'a NodeKind {
        self.ast.get_kind(node)
    }

    #[inline]
    fn node_type(&self, node: NodeRef) -> TypeRef {
        self.ast.get_type(node)
    }

    #[inline]
    fn value_of(&self, node: NodeRef) -> Option<&'a ConstValue> {
        self.ast.value(node)
    }

    /// Lower one function definition.
    fn lower_function(
        &mut self,
        node: NodeRef,
        def: &FunctionDefData,
    ) -> Result<IrFunction, LowerError> {
        debug!("lowering function '{}'", def.name);

        self.builder = IrBuilder::new(self.pool);
        self.symbols.clear();
        self.break_label = None;
        self.continue_label = None;
        self.switch_ctx = None;
        self.cond_dummy_ref = None;

        let fn_ty = self.node_type(node);
        let ret_ty = self
            .registry
            .return_type(fn_ty)
            .expect("ICE: function definition without a function type");
        self.return_type = Some(ret_ty);

        // Argument slots occupy the first instruction slots, in order.
        let mut params = Vec::with_capacity(def.params.len());
        let mut arg_refs = Vec::with_capacity(def.params.len());
        for (slot, param) in def.params.iter().enumerate() {
            let ty = self.lower_type(param.ty)?;
            params.push(ty);
            arg_refs.push(self.builder.add_arg(slot as u32, ty));
        }
        // Each parameter is bound to a memory cell by an alloc+store pair.
        for (param, &arg) in def.params.iter().zip(&arg_refs) {
            let size = self.registry.size_of(param.ty);
            let align = self.registry.align_of(param.ty);
            let slot = self.builder.add_alloc(size, align);
            self.builder.add_store(slot, arg);
            self.symbols.define(param.name, slot);
        }

        let return_label = self.builder.add_label("return");
        self.return_label = Some(return_label);

        self.lower_stmt(def.body)?;

        self.builder.bind_label(return_label);
        self.builder.add_ret();

        let builder = std::mem::replace(&mut self.builder, IrBuilder::new(self.pool));
        Ok(builder.finish(def.name, params))
    }

    /// Record a file-scope variable definition. Data emission is not
    /// implemented; only the name and lowered type survive.
    fn lower_variable(&mut self, node: NodeRef, var: &VarDeclData) -> Result<IrGlobal, LowerError> {
        let ty = self.lower_type(self.node_type(node))?;
        debug!("recording global variable '{}'", var.name);
        Ok(IrGlobal { name: var.name, ty })
    }

    /// Map a C type to an interned IR type reference.
    fn lower_type(&mut self, ty: TypeRef) -> Result<PoolRef, LowerError> {
        if let Some(&cached) = self.type_cache.get(&ty) {
            return Ok(cached);
        }
        let key = match &self.registry.get(ty).kind {
            TypeKind::Void => PoolKey::Void,
            TypeKind::Bool => PoolKey::I1,
            TypeKind::Char { .. }
            | TypeKind::Short { .. }
            | TypeKind::Int { .. }
            | TypeKind::Long { .. } => PoolKey::Int {
                width: self.registry.bit_size(ty),
            },
            TypeKind::Enum { base_type } => PoolKey::Int {
                width: self.registry.bit_size(*base_type),
            },
            TypeKind::Float | TypeKind::Double { .. } => PoolKey::Float {
                width: self.registry.bit_size(ty),
            },
            TypeKind::Pointer { .. } => PoolKey::Ptr,
            TypeKind::Function { .. } => PoolKey::Func,
            TypeKind::Array { element_type, size } => {
                let len = match size {
                    ArraySizeType::Constant(len) => *len as u64,
                    ArraySizeType::Incomplete => {
                        return Err(LowerError::Unsupported("array type without a constant length"))
                    }
                };
                let child = self.lower_type(*element_type)?;
                PoolKey::Array { child, len }
            }
            TypeKind::Vector { element_type, len } => {
                let (element_type, len) = (*element_type, *len);
                let child = self.lower_type(element_type)?;
                PoolKey::Vector { child, len }
            }
            TypeKind::Complex { .. } => return Err(LowerError::Unsupported("complex arithmetic")),
            TypeKind::Record { .. } => return Err(LowerError::Unsupported("record type")),
            TypeKind::Error => panic!("ICE: error type reached lowering"),
        };
        let lowered = self.pool.intern(key);
        self.type_cache.insert(ty, lowered);
        Ok(lowered)
    }

    /// Emit a constant carrying an analyzer-computed value.
    fn add_constant_value(&mut self, value: &ConstValue, ty: PoolRef) -> IrRef {
        let key = match value {
            ConstValue::Int(v) => PoolKey::IntValue(*v),
            ConstValue::Float(v) => PoolKey::float_value(*v),
            ConstValue::Bytes(bytes) => PoolKey::Bytes(bytes.clone()),
        };
        let interned = self.pool.intern(key);
        self.builder.add_constant(interned, ty)
    }

    /// Zero constant of the given IR type.
    fn zero_constant(&mut self, ty: PoolRef) -> IrRef {
        let key = match self.pool.get(ty) {
            PoolKey::Float { .. } => PoolKey::float_value(0.0),
            _ => PoolKey::IntValue(0),
        };
        let interned = self.pool.intern(key);
        self.builder.add_constant(interned, ty)
    }

    /// One constant of the given IR type.
    fn one_constant(&mut self, ty: PoolRef) -> IrRef {
        let key = match self.pool.get(ty) {
            PoolKey::Float { .. } => PoolKey::float_value(1.0),
            _ => PoolKey::IntValue(1),
        };
        let interned = self.pool.intern(key);
        self.builder.add_constant(interned, ty)
    }
}
