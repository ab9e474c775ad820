//! Syntax tree for calculator programs.
//!
//! The tree only holds owned, immutable data so a compiled program can be
//! shared across threads.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Decl {
        kind: DeclKind,
        bindings: Vec<Binding>,
    },
    Assign {
        name: String,
        op: AssignOp,
        value: Expr,
    },
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    ForIn {
        kind: DeclKind,
        name: String,
        object: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Expr(Expr),
    Empty,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    Typeof,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    LtEq,
    Gt,
    GtEq,
    StrictEq,
    StrictNotEq,
    LooseEq,
    LooseNotEq,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

/// Pure functions a calculator may call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Builtin {
    Floor,
    Ceil,
    Round,
    Trunc,
    Abs,
    Min,
    Max,
    Pow,
    Number,
    Boolean,
}

impl Builtin {
    pub fn math(name: &str) -> Option<Self> {
        Some(match name {
            "floor" => Builtin::Floor,
            "ceil" => Builtin::Ceil,
            "round" => Builtin::Round,
            "trunc" => Builtin::Trunc,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "pow" => Builtin::Pow,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
        optional: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Builtin,
        args: Vec<Expr>,
    },
}

/// A parsed function body.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}
