//! Semantic analysis: symbol tables, the expression type map, and the
//! control-flow and typing checks of the narrow `int`/`void` core.
//!
//! Two passes: the first records every function's return type so calls can
//! resolve regardless of definition order; the second analyzes each body in a
//! fresh scope. Compound statements share the function scope (the design is
//! effectively flat per function); only `for` introduces a child scope so its
//! init declaration is visible to the condition, post, and body without
//! leaking out.

use crate::ast::{
    Decl, Expr, ExprId, ExprKind, ForInit, FunctionDef, InitList, Initializer, Param, Stmt,
    TranslationUnit, TypeSpec,
};
use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SemaError {
    pub message: String,
}

impl SemaError {
    fn new(message: impl Into<String>) -> Self {
        SemaError {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarSymbol {
    pub name: String,
    pub type_: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    pub name: String,
    pub return_type: Type,
    pub locals: HashMap<String, VarSymbol>,
}

/// Expression types keyed by node identity.
#[derive(Debug, Default)]
pub struct TypeMap {
    map: HashMap<ExprId, Type>,
}

impl TypeMap {
    pub fn set(&mut self, expr: &Expr, type_: Type) {
        self.map.insert(expr.id, type_);
    }

    pub fn get(&self, expr: &Expr) -> Option<&Type> {
        self.map.get(&expr.id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Debug)]
pub struct SemaUnit {
    pub functions: HashMap<String, FunctionSymbol>,
    pub type_map: TypeMap,
}

struct Scope<'p> {
    symbols: HashMap<String, VarSymbol>,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    fn new() -> Self {
        Scope {
            symbols: HashMap::new(),
            parent: None,
        }
    }

    fn child(parent: &'p Scope<'p>) -> Self {
        Scope {
            symbols: HashMap::new(),
            parent: Some(parent),
        }
    }

    fn define(&mut self, symbol: VarSymbol) -> Result<(), SemaError> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(SemaError::new(format!(
                "Duplicate declaration: {}",
                symbol.name
            )));
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&VarSymbol> {
        match self.symbols.get(name) {
            Some(symbol) => Some(symbol),
            None => self.parent.and_then(|parent| parent.lookup(name)),
        }
    }
}

/// Analyze a parsed translation unit.
pub fn analyze(unit: &TranslationUnit) -> Result<SemaUnit, SemaError> {
    Analyzer::new().analyze(unit)
}

pub struct Analyzer {
    functions: HashMap<String, FunctionSymbol>,
    type_map: TypeMap,
    function_return_types: HashMap<String, Type>,
    loop_depth: usize,
    switch_depth: usize,
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer {
            functions: HashMap::new(),
            type_map: TypeMap::default(),
            function_return_types: HashMap::new(),
            loop_depth: 0,
            switch_depth: 0,
        }
    }

    pub fn analyze(mut self, unit: &TranslationUnit) -> Result<SemaUnit, SemaError> {
        for proto in &unit.externals {
            let return_type = resolve_type(&proto.return_type);
            if let Some(existing) = self.function_return_types.get(&proto.name) {
                if *existing != return_type {
                    return Err(SemaError::new(format!(
                        "Conflicting declaration: {}",
                        proto.name
                    )));
                }
                continue;
            }
            self.function_return_types
                .insert(proto.name.clone(), return_type);
        }
        for func in &unit.functions {
            let return_type = resolve_type(&func.return_type);
            if self.functions.contains_key(&func.name) {
                return Err(SemaError::new(format!(
                    "Duplicate function definition: {}",
                    func.name
                )));
            }
            if let Some(existing) = self.function_return_types.get(&func.name) {
                if *existing != return_type {
                    return Err(SemaError::new(format!(
                        "Conflicting declaration: {}",
                        func.name
                    )));
                }
            }
            self.function_return_types
                .insert(func.name.clone(), return_type.clone());
            // Mark the name as defined; the symbol is completed after the body
            // pass fills in the locals.
            self.functions.insert(
                func.name.clone(),
                FunctionSymbol {
                    name: func.name.clone(),
                    return_type,
                    locals: HashMap::new(),
                },
            );
        }
        for stmt in &unit.declarations {
            self.analyze_file_scope_decl(stmt)?;
        }
        for func in &unit.functions {
            self.analyze_function(func)?;
        }
        Ok(SemaUnit {
            functions: self.functions,
            type_map: self.type_map,
        })
    }

    fn analyze_file_scope_decl(&mut self, stmt: &Stmt) -> Result<(), SemaError> {
        match stmt {
            Stmt::DeclGroup(_) | Stmt::Typedef { .. } => Ok(()),
            Stmt::StaticAssert { .. } => Ok(()),
            _ => Err(SemaError::new("Unsupported statement")),
        }
    }

    fn analyze_function(&mut self, func: &FunctionDef) -> Result<(), SemaError> {
        let return_type = self.function_return_types[&func.name].clone();
        let mut scope = Scope::new();
        self.define_params(&func.params, &mut scope)?;
        let body = func.body.as_ref().expect("definition has a body");
        for stmt in body {
            self.analyze_stmt(stmt, &mut scope, &return_type)?;
        }
        self.functions.insert(
            func.name.clone(),
            FunctionSymbol {
                name: func.name.clone(),
                return_type,
                locals: scope.symbols,
            },
        );
        Ok(())
    }

    fn define_params(&mut self, params: &[Param], scope: &mut Scope<'_>) -> Result<(), SemaError> {
        for param in params {
            let param_type = resolve_type(&param.type_spec);
            if param_type.is_void() {
                return Err(SemaError::new("Invalid parameter type: void"));
            }
            let name = param
                .name
                .clone()
                .ok_or_else(|| SemaError::new("Expected parameter name"))?;
            scope.define(VarSymbol {
                name,
                type_: param_type.decay_parameter_array(),
            })?;
        }
        Ok(())
    }

    fn analyze_stmt(
        &mut self,
        stmt: &Stmt,
        scope: &mut Scope<'_>,
        return_type: &Type,
    ) -> Result<(), SemaError> {
        match stmt {
            Stmt::Null | Stmt::Goto { .. } | Stmt::Typedef { .. } => Ok(()),
            Stmt::Compound(statements) => {
                for item in statements {
                    self.analyze_stmt(item, scope, return_type)?;
                }
                Ok(())
            }
            Stmt::DeclGroup(decls) => {
                for decl in decls {
                    self.analyze_decl(decl, scope)?;
                }
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.analyze_expr(expr, scope)?;
                Ok(())
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.analyze_condition(condition, scope)?;
                self.analyze_stmt(then_body, scope, return_type)?;
                if let Some(else_body) = else_body {
                    self.analyze_stmt(else_body, scope, return_type)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.analyze_condition(condition, scope)?;
                self.loop_depth += 1;
                let result = self.analyze_stmt(body, scope, return_type);
                self.loop_depth -= 1;
                result
            }
            Stmt::DoWhile { body, condition } => {
                self.loop_depth += 1;
                let result = self.analyze_stmt(body, scope, return_type);
                self.loop_depth -= 1;
                result?;
                self.analyze_condition(condition, scope)
            }
            Stmt::For {
                init,
                condition,
                post,
                body,
            } => {
                let mut for_scope = Scope::child(scope);
                match init {
                    Some(ForInit::Decl(decls)) => {
                        for decl in decls {
                            self.analyze_decl(decl, &mut for_scope)?;
                        }
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.analyze_expr(expr, &for_scope)?;
                    }
                    None => {}
                }
                if let Some(condition) = condition {
                    self.analyze_condition(condition, &for_scope)?;
                }
                if let Some(post) = post {
                    self.analyze_expr(post, &for_scope)?;
                }
                self.loop_depth += 1;
                let result = self.analyze_stmt(body, &mut for_scope, return_type);
                self.loop_depth -= 1;
                result
            }
            Stmt::Switch { condition, body } => {
                self.analyze_condition(condition, scope)?;
                self.switch_depth += 1;
                let result = self.analyze_stmt(body, scope, return_type);
                self.switch_depth -= 1;
                result
            }
            Stmt::Case { value, body } => {
                self.analyze_expr(value, scope)?;
                self.analyze_stmt(body, scope, return_type)
            }
            Stmt::Default { body } => self.analyze_stmt(body, scope, return_type),
            Stmt::Label { body, .. } => self.analyze_stmt(body, scope, return_type),
            Stmt::IndirectGoto { target } => {
                self.analyze_expr(target, scope)?;
                Ok(())
            }
            Stmt::Break => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    return Err(SemaError::new("Break outside of loop or switch"));
                }
                Ok(())
            }
            Stmt::Continue => {
                if self.loop_depth == 0 {
                    return Err(SemaError::new("Continue outside of loop"));
                }
                Ok(())
            }
            Stmt::Return { value } => match value {
                None => {
                    if !return_type.is_void() {
                        return Err(SemaError::new("Non-void function must return a value"));
                    }
                    Ok(())
                }
                Some(value) => {
                    if return_type.is_void() {
                        return Err(SemaError::new("Void function should not return a value"));
                    }
                    self.analyze_expr(value, scope)?;
                    Ok(())
                }
            },
            Stmt::StaticAssert { condition, .. } => {
                self.analyze_expr(condition, scope)?;
                Ok(())
            }
        }
    }

    fn analyze_decl(&mut self, decl: &Decl, scope: &mut Scope<'_>) -> Result<(), SemaError> {
        let var_type = resolve_type(&decl.type_spec);
        if var_type.is_void() {
            return Err(SemaError::new("Invalid object type: void"));
        }
        scope.define(VarSymbol {
            name: decl.name.clone(),
            type_: var_type,
        })?;
        match &decl.init {
            Some(Initializer::Expr(expr)) => {
                self.analyze_expr(expr, scope)?;
            }
            Some(Initializer::List(list)) => {
                self.analyze_init_list(list, scope)?;
            }
            None => {}
        }
        Ok(())
    }

    fn analyze_init_list(&mut self, list: &InitList, scope: &Scope<'_>) -> Result<(), SemaError> {
        for item in &list.items {
            for designator in &item.designators {
                if let crate::ast::Designator::Index(index) = designator {
                    self.analyze_expr(index, scope)?;
                }
            }
            match &item.initializer {
                Initializer::Expr(expr) => {
                    self.analyze_expr(expr, scope)?;
                }
                Initializer::List(nested) => {
                    self.analyze_init_list(nested, scope)?;
                }
            }
        }
        Ok(())
    }

    fn analyze_condition(&mut self, condition: &Expr, scope: &Scope<'_>) -> Result<(), SemaError> {
        let condition_type = self.analyze_expr(condition, scope)?;
        if condition_type.is_void() {
            return Err(SemaError::new("Void condition is not allowed"));
        }
        Ok(())
    }

    fn analyze_expr(&mut self, expr: &Expr, scope: &Scope<'_>) -> Result<Type, SemaError> {
        let type_ = match &expr.kind {
            ExprKind::IntLiteral(_)
            | ExprKind::FloatLiteral(_)
            | ExprKind::CharLiteral(_)
            | ExprKind::StringLiteral(_) => Type::int(),
            ExprKind::Identifier(name) => match scope.lookup(name) {
                Some(symbol) => symbol.type_.clone(),
                None => {
                    return Err(SemaError::new(format!("Undeclared identifier: {}", name)));
                }
            },
            ExprKind::Unary { operand, .. } => {
                self.analyze_expr(operand, scope)?;
                Type::int()
            }
            ExprKind::Update { operand, .. } => {
                self.analyze_expr(operand, scope)?;
                Type::int()
            }
            ExprKind::Binary { left, right, .. } => {
                self.analyze_expr(left, scope)?;
                self.analyze_expr(right, scope)?;
                Type::int()
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let condition_type = self.analyze_expr(condition, scope)?;
                if condition_type.is_void() {
                    return Err(SemaError::new("Void condition is not allowed"));
                }
                self.analyze_expr(then_expr, scope)?;
                self.analyze_expr(else_expr, scope)?;
                Type::int()
            }
            ExprKind::Comma { left, right } => {
                self.analyze_expr(left, scope)?;
                self.analyze_expr(right, scope)?;
                Type::int()
            }
            ExprKind::Assign { target, value, .. } => {
                if !matches!(target.kind, ExprKind::Identifier(_)) {
                    return Err(SemaError::new("Assignment target is not assignable"));
                }
                self.analyze_expr(target, scope)?;
                self.analyze_expr(value, scope)?;
                Type::int()
            }
            ExprKind::Call { callee, args } => {
                let name = match &callee.kind {
                    ExprKind::Identifier(name) => name.clone(),
                    _ => return Err(SemaError::new("Call target is not a function")),
                };
                let return_type = match self.function_return_types.get(&name) {
                    Some(return_type) => return_type.clone(),
                    None => {
                        return Err(SemaError::new(format!("Undeclared function: {}", name)));
                    }
                };
                for arg in args {
                    self.analyze_expr(arg, scope)?;
                }
                return_type
            }
            ExprKind::Subscript { base, index } => {
                self.analyze_expr(base, scope)?;
                self.analyze_expr(index, scope)?;
                Type::int()
            }
            ExprKind::Member { base, .. } => {
                self.analyze_expr(base, scope)?;
                Type::int()
            }
            ExprKind::Sizeof { expr: operand, .. } => {
                if let Some(operand) = operand {
                    self.analyze_expr(operand, scope)?;
                }
                Type::int()
            }
            ExprKind::Alignof { .. } => Type::int(),
            ExprKind::Cast { expr: operand, .. } => {
                self.analyze_expr(operand, scope)?;
                Type::int()
            }
            ExprKind::CompoundLiteral { initializer, .. } => {
                self.analyze_init_list(initializer, scope)?;
                Type::int()
            }
            ExprKind::StatementExpr { .. } => Type::int(),
            ExprKind::Generic {
                control,
                associations,
            } => {
                self.analyze_expr(control, scope)?;
                for association in associations {
                    self.analyze_expr(&association.expr, scope)?;
                }
                Type::int()
            }
            ExprKind::LabelAddress(_) => Type::int(),
            ExprKind::BuiltinOffsetof { .. } => Type::int(),
        };
        self.type_map.set(expr, type_.clone());
        Ok(type_)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::new()
    }
}

fn resolve_type(type_spec: &TypeSpec) -> Type {
    let base = if type_spec.name == "int" {
        Type::int()
    } else {
        Type::void()
    };
    Type::with_ops(base.name, type_spec.declarator_ops.clone())
}
