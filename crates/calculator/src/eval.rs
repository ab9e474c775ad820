//! Tree-walking evaluator with JavaScript value semantics.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, Binding, Builtin, Expr, LogicalOp, Program, Stmt, UnaryOp,
};
use crate::error::CalculationError;
use crate::resolve::STATE;

/// Default evaluation budget; one step per statement executed or expression evaluated.
pub const DEFAULT_STEP_LIMIT: u64 = 100_000;

/// A run-time value. Objects are immutable snapshots shared by reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(Rc<BTreeMap<String, Value>>),
}

impl Value {
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
        }
    }

    fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined | Value::Object(_) => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
        }
    }

    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.to_string(),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Object(_), Value::Object(_)) => self.strict_eq(other),
            (Value::Object(_), prim) | (prim, Value::Object(_)) => {
                Value::Str(Rc::from("[object Object]")).loose_eq(prim)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (a, b) => a.to_number() == b.to_number(),
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts spellings JavaScript does not.
        t if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        t => t.parse().unwrap_or(f64::NAN),
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

/// JavaScript `**`, which differs from `powf` for NaN exponents and `(+-1) ** +-Infinity`.
fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// `Math.round`: rounds half toward positive infinity.
fn js_round(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}

enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    scopes: Vec<Vec<(String, Value)>>,
    steps: u64,
    step_limit: u64,
}

impl Interpreter {
    pub fn new(state: Value, step_limit: u64) -> Self {
        Self {
            scopes: vec![vec![(STATE.to_string(), state)]],
            steps: 0,
            step_limit,
        }
    }

    /// Run a program to completion and return the value it produced.
    pub fn run(mut self, program: &Program) -> Result<Value, CalculationError> {
        match self.block(&program.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Undefined),
        }
    }

    fn tick(&mut self) -> Result<(), CalculationError> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(CalculationError::StepLimitExceeded(self.step_limit));
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&Value, CalculationError> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| CalculationError::Type(format!("{name} is not defined")))
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<(), CalculationError> {
        let slot = self
            .scopes
            .iter_mut()
            .rev()
            .flat_map(|scope| scope.iter_mut().rev())
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| CalculationError::Type(format!("{name} is not defined")))?;
        *slot = value;
        Ok(())
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), value));
        }
    }

    fn scoped<T>(
        &mut self,
        bindings: Vec<(String, Value)>,
        f: impl FnOnce(&mut Self) -> Result<T, CalculationError>,
    ) -> Result<T, CalculationError> {
        self.scopes.push(bindings);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn block(&mut self, body: &[Stmt]) -> Result<Flow, CalculationError> {
        self.scoped(Vec::new(), |this| {
            for stmt in body {
                if let Flow::Return(value) = this.stmt(stmt)? {
                    return Ok(Flow::Return(value));
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<Flow, CalculationError> {
        self.tick()?;
        match stmt {
            Stmt::Decl { bindings, .. } => {
                for Binding { name, init } in bindings {
                    let value = match init {
                        Some(init) => self.expr(init)?,
                        None => Value::Undefined,
                    };
                    self.declare(name, value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Assign { name, op, value } => {
                let rhs = self.expr(value)?;
                let new = match op {
                    AssignOp::Set => rhs,
                    AssignOp::Add => add(self.lookup(name)?.clone(), rhs),
                    AssignOp::Sub => Value::Number(self.lookup(name)?.to_number() - rhs.to_number()),
                    AssignOp::Mul => Value::Number(self.lookup(name)?.to_number() * rhs.to_number()),
                    AssignOp::Div => Value::Number(self.lookup(name)?.to_number() / rhs.to_number()),
                };
                self.assign(name, new)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.expr(test)?.truthy() {
                    self.block(std::slice::from_ref(&**then))
                } else if let Some(otherwise) = otherwise {
                    self.block(std::slice::from_ref(&**otherwise))
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(body) => self.block(body),
            Stmt::ForIn {
                name, object, body, ..
            } => {
                let keys: Vec<String> = match self.expr(object)? {
                    Value::Object(map) => map.keys().cloned().collect(),
                    Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
                    _ => Vec::new(),
                };
                for key in keys {
                    let binding = vec![(name.clone(), Value::Str(Rc::from(key)))];
                    let flow = self.scoped(binding, |this| this.block(std::slice::from_ref(&**body)))?;
                    if let Flow::Return(value) = flow {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.expr(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Expr(expr) => {
                self.expr(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<Value, CalculationError> {
        self.tick()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(Rc::from(s.as_str()))),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => self.lookup(name).cloned(),
            Expr::Member { .. } => Ok(self.chain(expr)?.unwrap_or(Value::Undefined)),
            Expr::Unary { op, operand } => {
                let value = self.expr(operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Typeof => Value::Str(Rc::from(value.type_of())),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                Ok(binary(*op, left, right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.expr(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.expr(right)
                }
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.expr(test)?.truthy() {
                    self.expr(then)
                } else {
                    self.expr(otherwise)
                }
            }
            Expr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(call(*callee, &args))
            }
        }
    }

    /// Evaluate a member chain; `None` means an optional link short-circuited.
    fn chain(&mut self, expr: &Expr) -> Result<Option<Value>, CalculationError> {
        let Expr::Member {
            object,
            property,
            optional,
        } = expr
        else {
            return self.expr(expr).map(Some);
        };

        let Some(base) = self.chain(object)? else {
            return Ok(None);
        };
        if *optional && base.is_nullish() {
            return Ok(None);
        }
        let key = self.expr(property)?.to_js_string();
        get_property(&base, &key).map(Some)
    }
}

fn get_property(base: &Value, key: &str) -> Result<Value, CalculationError> {
    match base {
        Value::Undefined | Value::Null => Err(CalculationError::Type(format!(
            "cannot read property '{key}' of {}",
            base.to_js_string()
        ))),
        Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Undefined)),
        Value::Str(s) if key == "length" => Ok(Value::Number(s.chars().count() as f64)),
        Value::Str(s) => Ok(key
            .parse::<usize>()
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(Rc::from(c.to_string())))
            .unwrap_or(Value::Undefined)),
        Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
    }
}

fn add(left: Value, right: Value) -> Value {
    let is_text = |v: &Value| matches!(v, Value::Str(_) | Value::Object(_));
    if is_text(&left) || is_text(&right) {
        let mut s = left.to_js_string();
        s.push_str(&right.to_js_string());
        Value::Str(Rc::from(s))
    } else {
        Value::Number(left.to_number() + right.to_number())
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::LtEq => a <= b,
            BinaryOp::Gt => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (left.to_number(), right.to_number());
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Value {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Pow => Value::Number(js_pow(left.to_number(), right.to_number())),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Value::Bool(compare(op, &left, &right))
        }
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(&right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(&right)),
        BinaryOp::LooseEq => Value::Bool(left.loose_eq(&right)),
        BinaryOp::LooseNotEq => Value::Bool(!left.loose_eq(&right)),
    }
}

fn call(callee: Builtin, args: &[Value]) -> Value {
    let arg = |i: usize| args.get(i).map(Value::to_number).unwrap_or(f64::NAN);
    match callee {
        Builtin::Floor => Value::Number(arg(0).floor()),
        Builtin::Ceil => Value::Number(arg(0).ceil()),
        Builtin::Round => Value::Number(js_round(arg(0))),
        Builtin::Trunc => Value::Number(arg(0).trunc()),
        Builtin::Abs => Value::Number(arg(0).abs()),
        Builtin::Pow => Value::Number(js_pow(arg(0), arg(1))),
        Builtin::Min => Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) }
        })),
        Builtin::Max => Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) }
        })),
        Builtin::Number => Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)),
        Builtin::Boolean => Value::Bool(args.first().is_some_and(Value::truthy)),
    }
}
