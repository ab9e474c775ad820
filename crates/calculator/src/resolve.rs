//! Static name resolution.
//!
//! Every identifier a program reads or writes must be the `state` parameter or
//! a local declared in an enclosing block. This keeps the only run-time
//! failures data-dependent. `var` is block-scoped like `let`.

use std::collections::HashMap;

use crate::ast::{Binding, DeclKind, Expr, Program, Stmt};
use crate::error::CompileError;

/// The function parameter.
pub const STATE: &str = "state";

/// Names that cannot be declared or assigned.
pub const RESERVED: &[&str] = &[STATE, "Math", "Number", "Boolean", "undefined", "NaN", "Infinity"];

#[derive(Default)]
pub struct Resolver {
    scopes: Vec<HashMap<String, DeclKind>>,
}

impl Resolver {
    pub fn resolve(program: &Program) -> Result<(), CompileError> {
        let mut resolver = Resolver::default();
        resolver.block(&program.body)
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        self.scopes.push(HashMap::new());
        let result = body.iter().try_for_each(|stmt| self.stmt(stmt));
        self.scopes.pop();
        result
    }

    fn declare(&mut self, name: &str, kind: DeclKind) -> Result<(), CompileError> {
        if RESERVED.contains(&name) {
            return Err(CompileError::ReservedName(name.to_string()));
        }
        let Some(scope) = self.scopes.last_mut() else {
            return Err(CompileError::UnknownIdentifier(name.to_string()));
        };
        if scope.contains_key(name) {
            return Err(CompileError::Redeclared(name.to_string()));
        }
        scope.insert(name.to_string(), kind);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<DeclKind> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Decl { kind, bindings } => {
                for Binding { name, init } in bindings {
                    if let Some(init) = init {
                        self.expr(init)?;
                    }
                    self.declare(name, *kind)?;
                }
                Ok(())
            }
            Stmt::Assign { name, value, .. } => {
                if RESERVED.contains(&name.as_str()) {
                    return Err(CompileError::AssignToConstant(name.clone()));
                }
                match self.lookup(name) {
                    None => return Err(CompileError::UnknownIdentifier(name.clone())),
                    Some(DeclKind::Const) => return Err(CompileError::AssignToConstant(name.clone())),
                    Some(_) => {}
                }
                self.expr(value)
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                self.expr(test)?;
                self.nested(then)?;
                match otherwise {
                    Some(otherwise) => self.nested(otherwise),
                    None => Ok(()),
                }
            }
            Stmt::Block(body) => self.block(body),
            Stmt::ForIn {
                kind,
                name,
                object,
                body,
            } => {
                self.expr(object)?;
                self.scopes.push(HashMap::new());
                let result = self.declare(name, *kind).and_then(|()| self.nested(body));
                self.scopes.pop();
                result
            }
            Stmt::Return(Some(expr)) | Stmt::Expr(expr) => self.expr(expr),
            Stmt::Return(None) | Stmt::Empty => Ok(()),
        }
    }

    /// A single statement used as a branch or loop body gets its own scope.
    fn nested(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.block(std::slice::from_ref(stmt))
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Undefined => Ok(()),
            Expr::Ident(name) => {
                if name == STATE || self.lookup(name).is_some() {
                    Ok(())
                } else {
                    Err(CompileError::UnknownIdentifier(name.clone()))
                }
            }
            Expr::Member {
                object, property, ..
            } => {
                self.expr(object)?;
                self.expr(property)
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                self.expr(test)?;
                self.expr(then)?;
                self.expr(otherwise)
            }
            Expr::Call { args, .. } => args.iter().try_for_each(|arg| self.expr(arg)),
        }
    }
}
