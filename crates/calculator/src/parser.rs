//! Recursive-descent parser producing [`Program`].

use crate::ast::{
    AssignOp, BinaryOp, Binding, Builtin, DeclKind, Expr, LogicalOp, Program, Stmt, UnaryOp,
};
use crate::error::{CompileError, Position};
use crate::lexer::{Spanned, Token};

/// Maximum nesting of statements/expressions accepted by the parser.
pub const MAX_DEPTH: usize = 64;

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse_program(mut self) -> Result<Program, CompileError> {
        let mut body = Vec::new();
        while !self.check(&Token::Eof) {
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        // `tokenize` always terminates the stream with Eof.
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens
            .get(self.pos + 1)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn at(&self) -> Position {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.at)
            .unwrap_or(Position { line: 1, column: 1 })
    }

    fn previous_line(&self) -> u32 {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|s| s.at.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), CompileError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, CompileError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        CompileError::Syntax {
            at: self.at(),
            message: format!("expected {expected}, found {}", self.peek().describe()),
        }
    }

    fn syntax(&self, message: &str) -> CompileError {
        CompileError::Syntax {
            at: self.at(),
            message: message.to_string(),
        }
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CompileError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// A simple statement ends at `;`, before `}`, at end of input, or at a line break.
    fn end_statement(&mut self) -> Result<(), CompileError> {
        if self.eat(&Token::Semicolon) {
            return Ok(());
        }
        if matches!(self.peek(), Token::RBrace | Token::Eof) || self.at().line > self.previous_line() {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            Token::LBrace => {
                self.advance();
                let mut body = Vec::new();
                while !self.eat(&Token::RBrace) {
                    if self.check(&Token::Eof) {
                        return Err(self.unexpected("'}'"));
                    }
                    body.push(self.statement()?);
                }
                Ok(Stmt::Block(body))
            }
            Token::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Token::Let | Token::Const | Token::Var => {
                let stmt = self.declaration()?;
                self.end_statement()?;
                Ok(stmt)
            }
            Token::If => self.if_statement(),
            Token::For => self.for_in(),
            Token::Return => {
                self.advance();
                let value = if matches!(self.peek(), Token::Semicolon | Token::RBrace | Token::Eof)
                    || self.at().line > self.previous_line()
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            Token::Ident(_) if assign_op(self.peek_next()).is_some() => {
                let name = self.expect_ident("identifier")?;
                let op = assign_op(&self.advance()).unwrap_or(AssignOp::Set);
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Assign { name, op, value })
            }
            _ => {
                let expr = self.expression()?;
                if assign_op(self.peek()).is_some() {
                    return Err(self.syntax("only local variables can be assigned"));
                }
                self.end_statement()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn decl_kind(&mut self) -> Result<DeclKind, CompileError> {
        let kind = match self.peek() {
            Token::Let => DeclKind::Let,
            Token::Const => DeclKind::Const,
            Token::Var => DeclKind::Var,
            _ => return Err(self.unexpected("'let', 'const' or 'var'")),
        };
        self.advance();
        Ok(kind)
    }

    fn declaration(&mut self) -> Result<Stmt, CompileError> {
        let kind = self.decl_kind()?;
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_ident("variable name")?;
            let init = if self.eat(&Token::Assign) {
                Some(self.expression()?)
            } else if kind == DeclKind::Const {
                return Err(self.syntax("missing initializer in const declaration"));
            } else {
                None
            };
            bindings.push(Binding { name, init });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::Decl { kind, bindings })
    }

    fn if_statement(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::If, "'if'")?;
        self.expect(Token::LParen, "'('")?;
        let test = self.expression()?;
        self.expect(Token::RParen, "')'")?;
        let then = Box::new(self.statement()?);
        let otherwise = if self.eat(&Token::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn for_in(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::For, "'for'")?;
        self.expect(Token::LParen, "'('")?;
        if !matches!(self.peek(), Token::Let | Token::Const | Token::Var) {
            return Err(self.syntax("only `for (const key in object)` loops are supported"));
        }
        let kind = self.decl_kind()?;
        let name = self.expect_ident("loop variable")?;
        if !self.eat(&Token::In) {
            return Err(self.syntax("only `for (const key in object)` loops are supported"));
        }
        let object = self.expression()?;
        self.expect(Token::RParen, "')'")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::ForIn {
            kind,
            name,
            object,
            body,
        })
    }

    // ---- expressions ----

    pub fn expression(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let expr = self.conditional();
        self.leave();
        expr
    }

    fn conditional(&mut self) -> Result<Expr, CompileError> {
        let test = self.logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(test);
        }
        let then = self.expression()?;
        self.expect(Token::Colon, "':'")?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.logical_and()?;
        loop {
            let op = match self.peek() {
                Token::OrOr => LogicalOp::Or,
                Token::QuestionQuestion => LogicalOp::Coalesce,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, CompileError>,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, CompileError> {
        let mut left = next(self)?;
        while let Some(op) = op_for(self.peek()) {
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::relational, |t| match t {
            Token::EqEqEq => Some(BinaryOp::StrictEq),
            Token::NotEqEq => Some(BinaryOp::StrictNotEq),
            Token::EqEq => Some(BinaryOp::LooseEq),
            Token::NotEq => Some(BinaryOp::LooseNotEq),
            _ => None,
        })
    }

    fn relational(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::exponent, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// `**` is right-associative and may not follow a bare unary operator.
    fn exponent(&mut self) -> Result<Expr, CompileError> {
        let starts_with_unary = unary_op(self.peek()).is_some();
        let base = self.unary()?;
        if !self.check(&Token::StarStar) {
            return Ok(base);
        }
        if starts_with_unary {
            return Err(self.syntax("unary operator before '**' needs parentheses"));
        }
        self.advance();
        self.enter()?;
        let power = self.exponent();
        self.leave();
        Ok(Expr::Binary {
            op: BinaryOp::Pow,
            left: Box::new(base),
            right: Box::new(power?),
        })
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let Some(op) = unary_op(self.peek()) else {
            return self.postfix();
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.property_name()?;
                    expr = member(expr, Expr::Str(name), false);
                }
                Token::QuestionDot => {
                    self.advance();
                    if self.eat(&Token::LBracket) {
                        let property = self.expression()?;
                        self.expect(Token::RBracket, "']'")?;
                        expr = member(expr, property, true);
                    } else if self.check(&Token::LParen) {
                        return Err(CompileError::UnsupportedCall(describe_callee(&expr)));
                    } else {
                        let name = self.property_name()?;
                        expr = member(expr, Expr::Str(name), true);
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let property = self.expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = member(expr, property, false);
                }
                Token::LParen => return Err(CompileError::UnsupportedCall(describe_callee(&expr))),
                _ => return Ok(expr),
            }
        }
    }

    /// Identifier or keyword after `.` (`state.in` is a valid property access).
    fn property_name(&mut self) -> Result<String, CompileError> {
        let name = match self.peek() {
            Token::Ident(name) => name.clone(),
            Token::Let => "let".into(),
            Token::Const => "const".into(),
            Token::Var => "var".into(),
            Token::If => "if".into(),
            Token::Else => "else".into(),
            Token::For => "for".into(),
            Token::In => "in".into(),
            Token::Return => "return".into(),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::Null => "null".into(),
            Token::Undefined => "undefined".into(),
            Token::Typeof => "typeof".into(),
            _ => return Err(self.unexpected("property name")),
        };
        self.advance();
        Ok(name)
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::Undefined => Ok(Expr::Undefined),
            Token::LParen => {
                let expr = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::Ident(name) => match name.as_str() {
                "Math" => {
                    self.expect(Token::Dot, "'.' after Math")?;
                    let function = self.property_name()?;
                    let callee = Builtin::math(&function)
                        .ok_or_else(|| CompileError::UnsupportedCall(format!("Math.{function}")))?;
                    self.call(callee)
                }
                "Number" => self.call(Builtin::Number),
                "Boolean" => self.call(Builtin::Boolean),
                "NaN" => Ok(Expr::Number(f64::NAN)),
                "Infinity" => Ok(Expr::Number(f64::INFINITY)),
                _ => Ok(Expr::Ident(name)),
            },
            other => {
                // Rewind so the error points at the offending token.
                self.pos -= 1;
                Err(self.unexpected(&format!("expression (not {})", other.describe())))
            }
        }
    }

    fn call(&mut self, callee: Builtin) -> Result<Expr, CompileError> {
        self.expect(Token::LParen, "'(' (built-ins can only be called)")?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma, "',' or ')'")?;
                // Trailing comma.
                if self.eat(&Token::RParen) {
                    break;
                }
            }
        }
        Ok(Expr::Call { callee, args })
    }
}

fn member(object: Expr, property: Expr, optional: bool) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: Box::new(property),
        optional,
    }
}

fn assign_op(token: &Token) -> Option<AssignOp> {
    match token {
        Token::Assign => Some(AssignOp::Set),
        Token::PlusAssign => Some(AssignOp::Add),
        Token::MinusAssign => Some(AssignOp::Sub),
        Token::StarAssign => Some(AssignOp::Mul),
        Token::SlashAssign => Some(AssignOp::Div),
        _ => None,
    }
}

fn unary_op(token: &Token) -> Option<UnaryOp> {
    match token {
        Token::Minus => Some(UnaryOp::Neg),
        Token::Plus => Some(UnaryOp::Plus),
        Token::Bang => Some(UnaryOp::Not),
        Token::Typeof => Some(UnaryOp::Typeof),
        _ => None,
    }
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object, property, ..
        } => match property.as_ref() {
            Expr::Str(name) => format!("{}.{name}", describe_callee(object)),
            _ => format!("{}[...]", describe_callee(object)),
        },
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Result<Program, CompileError> {
        Parser::new(Lexer::new(src).tokenize()?).parse_program()
    }

    fn parse_expr(src: &str) -> Expr {
        match parse(&format!("return {src};")).unwrap().body.remove(0) {
            Stmt::Return(Some(expr)) => expr,
            other => panic!("expected return, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse_expr("1 + 2 * 3");
        match expr {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. })),
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn exponent_is_right_associative() {
        match parse_expr("2 ** 3 ** 2") {
            Expr::Binary {
                op: BinaryOp::Pow,
                left,
                right,
            } => {
                assert_eq!(*left, Expr::Number(2.0));
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn unary_before_exponent_is_rejected() {
        assert!(matches!(parse("return -2 ** 2"), Err(CompileError::Syntax { .. })));
        assert!(parse("return (-2) ** 2").is_ok());
    }

    #[test]
    fn math_calls_resolve_to_builtins() {
        assert_eq!(
            parse_expr("Math.max(1, 2,)"),
            Expr::Call {
                callee: Builtin::Max,
                args: vec![Expr::Number(1.0), Expr::Number(2.0)],
            }
        );
    }

    #[test]
    fn arbitrary_calls_are_unsupported() {
        assert_eq!(
            parse("return fetch('x')"),
            Err(CompileError::UnsupportedCall("fetch".into()))
        );
        assert_eq!(
            parse("return state.A.toString()"),
            Err(CompileError::UnsupportedCall("state.A.toString".into()))
        );
        assert_eq!(
            parse("return Math.random()"),
            Err(CompileError::UnsupportedCall("Math.random".into()))
        );
    }

    #[test]
    fn member_assignment_is_rejected() {
        assert!(matches!(
            parse("state.A = 1"),
            Err(CompileError::Syntax { .. })
        ));
    }

    #[test]
    fn statements_on_one_line_need_semicolons() {
        assert!(matches!(parse("let a = 1 let b = 2"), Err(CompileError::Syntax { .. })));
        assert!(parse("let a = 1\nlet b = 2\nreturn a + b").is_ok());
    }

    #[test]
    fn declarations_may_bind_several_names() {
        let program = parse("let a = 1, b;").unwrap();
        match &program.body[0] {
            Stmt::Decl { kind, bindings } => {
                assert_eq!(*kind, DeclKind::Let);
                assert_eq!(bindings.len(), 2);
                assert!(bindings[1].init.is_none());
            }
            other => panic!("unexpected statement: {other:?}"),
        }
        assert!(matches!(parse("const c;"), Err(CompileError::Syntax { .. })));
    }

    #[test]
    fn only_for_in_loops_are_supported() {
        assert!(parse("for (const k in state) { }").is_ok());
        assert!(matches!(
            parse("for (let i = 0; i < 3; i += 1) {}"),
            Err(CompileError::Syntax { .. })
        ));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let src = format!("return {}1{};", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&src), Err(CompileError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn syntax_errors_carry_positions() {
        match parse("let a = 1;\nreturn a +;") {
            Err(CompileError::Syntax { at, .. }) => assert_eq!(at.line, 2),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
