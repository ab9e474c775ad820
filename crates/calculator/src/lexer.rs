//! Tokenizer for calculator source.

use crate::error::{CompileError, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),

    // Keywords
    Let,
    Const,
    Var,
    If,
    Else,
    For,
    In,
    Return,
    True,
    False,
    Null,
    Undefined,
    Typeof,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    QuestionDot,
    Question,
    Colon,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    QuestionQuestion,

    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Str(_) => "string".to_string(),
            Token::Ident(name) => format!("'{name}'"),
            Token::Eof => "end of input".to_string(),
            other => format!("{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub at: Position,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input; the last token is always [`Token::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, CompileError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia()?;
            let at = self.position();
            let Some(c) = self.peek() else {
                out.push(Spanned { token: Token::Eof, at });
                return Ok(out);
            };

            let token = if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
                self.number(at)?
            } else if c == b'"' || c == b'\'' {
                self.string(at)?
            } else if is_ident_start(c) {
                self.ident_or_keyword()
            } else {
                self.punct(at)?
            };
            out.push(Spanned { token, at });
        }
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if c & 0xC0 != 0x80 {
            // Count columns in characters, not UTF-8 continuation bytes.
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let at = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(CompileError::Lex {
                                    at,
                                    message: "unterminated block comment".to_string(),
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self, at: Position) -> Result<Token, CompileError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.bump();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(CompileError::Lex {
                    at,
                    message: "malformed exponent".to_string(),
                });
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(CompileError::Lex {
                at,
                message: "identifier starts immediately after number".to_string(),
            });
        }

        // The slice is ASCII digits/./e/sign only.
        let text = String::from_utf8_lossy(&self.src[start..self.pos]);
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|e| CompileError::Lex {
                at,
                message: format!("invalid number '{text}': {e}"),
            })
    }

    fn string(&mut self, at: Position) -> Result<Token, CompileError> {
        let quote = self.bump().unwrap_or(b'"');
        let mut bytes = Vec::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(CompileError::Lex {
                    at,
                    message: "unterminated string".to_string(),
                });
            };
            match c {
                b'\n' => {
                    return Err(CompileError::Lex {
                        at,
                        message: "newline in string".to_string(),
                    });
                }
                b'\\' => {
                    let escaped = self.bump().ok_or_else(|| CompileError::Lex {
                        at,
                        message: "unterminated string".to_string(),
                    })?;
                    bytes.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'0' => b'\0',
                        other => other,
                    });
                }
                c if c == quote => break,
                c => bytes.push(c),
            }
        }
        String::from_utf8(bytes)
            .map(Token::Str)
            .map_err(|_| CompileError::Lex {
                at,
                message: "string is not valid UTF-8".to_string(),
            })
    }

    fn ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let word = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        match word.as_str() {
            "let" => Token::Let,
            "const" => Token::Const,
            "var" => Token::Var,
            "if" => Token::If,
            "else" => Token::Else,
            "for" => Token::For,
            "in" => Token::In,
            "return" => Token::Return,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            "typeof" => Token::Typeof,
            _ => Token::Ident(word),
        }
    }

    fn punct(&mut self, at: Position) -> Result<Token, CompileError> {
        let c = self.bump().unwrap_or(0);
        let token = match c {
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b';' => Token::Semicolon,
            b',' => Token::Comma,
            b'.' => Token::Dot,
            b':' => Token::Colon,
            b'?' => {
                if self.peek() == Some(b'?') {
                    self.bump();
                    Token::QuestionQuestion
                } else if self.peek() == Some(b'.')
                    && !self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                {
                    // `a ? .5 : 1` is a conditional, not optional chaining.
                    self.bump();
                    Token::QuestionDot
                } else {
                    Token::Question
                }
            }
            b'+' => {
                if self.eat(b'=') {
                    Token::PlusAssign
                } else {
                    Token::Plus
                }
            }
            b'-' => {
                if self.eat(b'=') {
                    Token::MinusAssign
                } else {
                    Token::Minus
                }
            }
            b'*' => {
                if self.eat(b'*') {
                    Token::StarStar
                } else if self.eat(b'=') {
                    Token::StarAssign
                } else {
                    Token::Star
                }
            }
            b'/' => {
                if self.eat(b'=') {
                    Token::SlashAssign
                } else {
                    Token::Slash
                }
            }
            b'%' => Token::Percent,
            b'!' => {
                if self.eat(b'=') {
                    if self.eat(b'=') {
                        Token::NotEqEq
                    } else {
                        Token::NotEq
                    }
                } else {
                    Token::Bang
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    if self.eat(b'=') {
                        Token::EqEqEq
                    } else {
                        Token::EqEq
                    }
                } else if self.peek() == Some(b'>') {
                    return Err(CompileError::Lex {
                        at,
                        message: "arrow functions are not supported".to_string(),
                    });
                } else {
                    Token::Assign
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    Token::LtEq
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Token::GtEq
                } else {
                    Token::Gt
                }
            }
            b'&' if self.eat(b'&') => Token::AndAnd,
            b'|' if self.eat(b'|') => Token::OrOr,
            other => {
                return Err(CompileError::Lex {
                    at,
                    message: format!("unexpected character {:?}", other as char),
                });
            }
        };
        Ok(token)
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_ident_continue(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn tokenizes_member_access_and_numbers() {
        assert_eq!(
            tokens("return state.A.count * 1.5e2;"),
            vec![
                Token::Return,
                Token::Ident("state".into()),
                Token::Dot,
                Token::Ident("A".into()),
                Token::Dot,
                Token::Ident("count".into()),
                Token::Star,
                Token::Number(150.0),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_optional_chaining_from_conditional_fraction() {
        assert_eq!(
            tokens("a?.b ?? c ? .5 : 1"),
            vec![
                Token::Ident("a".into()),
                Token::QuestionDot,
                Token::Ident("b".into()),
                Token::QuestionQuestion,
                Token::Ident("c".into()),
                Token::Question,
                Token::Number(0.5),
                Token::Colon,
                Token::Number(1.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let spanned = Lexer::new("// header\n/* block\n */ return 0")
            .tokenize()
            .unwrap();
        assert_eq!(spanned[0].token, Token::Return);
        assert_eq!(spanned[0].at, Position { line: 3, column: 5 });
    }

    #[test]
    fn decodes_string_escapes() {
        assert_eq!(
            tokens(r#"'it\'s' "a\tb""#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\tb".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn rejects_unterminated_input() {
        assert!(matches!(
            Lexer::new("\"abc").tokenize(),
            Err(CompileError::Lex { .. })
        ));
        assert!(matches!(
            Lexer::new("/* never closed").tokenize(),
            Err(CompileError::Lex { .. })
        ));
        assert!(matches!(
            Lexer::new("a # b").tokenize(),
            Err(CompileError::Lex { .. })
        ));
    }
}
