// ABOUTME: Pratt parser building the expression tree from the token stream,
// with precedence/associativity lookups and flag-controlled infix context

use crate::ast::{Expr, ExprKind};
use crate::error::ParseError;
use crate::lexer::{Lexer, Source};
use crate::token::{Token, TokenKind};
use std::rc::Rc;

/// Binding strength ladder, weakest first. `Stop` is the sentinel for
/// tokens that never bind as infix operators (and for infix tokens
/// disabled by a context flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Stop,
    Lowest,
    Assign,
    Pipe,
    Function,
    Tuple,
    Ternary,
    LOr,
    LAnd,
    BOr,
    Xor,
    BAnd,
    Equals,
    Shift,
    Append,
    Sum,
    Product,
    Prefix,
    Index,
    Compose,
    Call,
    Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
    None,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        Assign | ColonColon => Precedence::Assign,
        LPipe | RPipe => Precedence::Pipe,
        Arrow => Precedence::Function,
        Comma | Colon => Precedence::Tuple,
        Question => Precedence::Ternary,
        LOr => Precedence::LOr,
        LAnd => Precedence::LAnd,
        BOr => Precedence::BOr,
        Caret => Precedence::Xor,
        BAnd => Precedence::BAnd,
        Lt | Gt | LtEq | GtEq | Eq | NotEq => Precedence::Equals,
        Shl | Shr => Precedence::Shift,
        PlusPlus => Precedence::Append,
        Plus | Minus => Precedence::Sum,
        Asterisk | Slash | Percent => Precedence::Product,
        LBracket => Precedence::Index,
        LCompose | RCompose => Precedence::Compose,
        LParen => Precedence::Call,
        Dot => Precedence::Field,
        _ => Precedence::Stop,
    }
}

fn assoc_of(kind: TokenKind) -> Assoc {
    use TokenKind::*;
    match kind {
        Assign | ColonColon | Arrow | Comma | Colon | Question | LCompose => Assoc::Right,
        LPipe | RPipe | LOr | LAnd | BOr | Caret | BAnd | Lt | Gt | LtEq | GtEq | Eq | NotEq
        | Shl | Shr | PlusPlus | Plus | Minus | Asterisk | Slash | Percent | LBracket
        | RCompose | LParen | Dot => Assoc::Left,
        _ => Assoc::None,
    }
}

/// Context flags inhibiting specific infix tokens. Passed by value and
/// saved/restored implicitly through the call stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Context(u8);

impl Context {
    const COLON: u8 = 1 << 0; // inside a ternary consequence
    const TUPLE: u8 = 1 << 1; // inside call arguments / list literals
    const BOR: u8 = 1 << 2; // inside a case result

    fn with(self, flag: u8) -> Context {
        Context(self.0 | flag)
    }

    fn disables(self, kind: TokenKind) -> bool {
        match kind {
            TokenKind::Colon => self.0 & Context::COLON != 0,
            TokenKind::Comma => self.0 & Context::TUPLE != 0,
            TokenKind::BOr => self.0 & Context::BOR != 0,
            _ => false,
        }
    }
}

pub struct Parser {
    lexer: Lexer,
    src: Rc<Source>,
    cur: Token,
    peek: Token,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Parser {
        let src = lexer.source().clone();
        let mut p = Parser {
            lexer,
            src,
            cur: Token {
                kind: TokenKind::Eof,
                offset: 0,
                len: 0,
                line: 1,
                col: 1,
            },
            peek: Token {
                kind: TokenKind::Eof,
                offset: 0,
                len: 0,
                line: 1,
                col: 1,
            },
        };
        p.next_token();
        p.next_token();
        p
    }

    pub fn parse_program(&mut self) -> Result<Rc<Expr>, ParseError> {
        let start = self.cur;
        let mut expressions = Vec::new();

        while self.cur.kind != TokenKind::Eof {
            expressions.push(self.parse_expression(Precedence::Lowest, Context::default())?);
            if self.peek.kind == TokenKind::Semicolon {
                self.next_token();
            }
            self.next_token();
        }

        Ok(Expr::new(start, self.cur, ExprKind::Program(expressions)))
    }

    fn parse_expression(
        &mut self,
        precedence: Precedence,
        ctx: Context,
    ) -> Result<Rc<Expr>, ParseError> {
        let mut left = self.parse_prefix(ctx)?;

        loop {
            let kind = self.peek.kind;
            let peek_precedence = if ctx.disables(kind) {
                Precedence::Stop
            } else {
                precedence_of(kind)
            };
            let proceed = match assoc_of(kind) {
                Assoc::Left => peek_precedence > precedence,
                Assoc::Right => peek_precedence >= precedence,
                Assoc::None => false,
            };
            if !proceed || peek_precedence == Precedence::Stop {
                break;
            }

            self.next_token();
            left = self.parse_infix(left, ctx)?;
        }

        Ok(left)
    }

    // ========================================================================
    // Prefix handlers
    // ========================================================================

    fn parse_prefix(&mut self, ctx: Context) -> Result<Rc<Expr>, ParseError> {
        let tok = self.cur;
        match tok.kind {
            TokenKind::Ident => Ok(Expr::new(
                tok,
                tok,
                ExprKind::Identifier(tok.text(&self.src.text).to_string()),
            )),
            TokenKind::Int => {
                // oversized literals wrap rather than error
                let mut value: i64 = 0;
                for b in tok.text(&self.src.text).bytes() {
                    value = value.wrapping_mul(10).wrapping_add((b - b'0') as i64);
                }
                Ok(Expr::new(tok, tok, ExprKind::IntLiteral(value)))
            }
            TokenKind::Float => {
                let value = tok
                    .text(&self.src.text)
                    .parse()
                    .expect("float literal scanned by the lexer");
                Ok(Expr::new(tok, tok, ExprKind::FloatLiteral(value)))
            }
            TokenKind::Str => {
                let text = tok.text(&self.src.text);
                let content = text[1..text.len() - 1].replace("\\\"", "\"");
                Ok(Expr::new(tok, tok, ExprKind::StringLiteral(content)))
            }
            TokenKind::Char => {
                let c = self.parse_char_literal(tok)?;
                Ok(Expr::new(tok, tok, ExprKind::CharLiteral(c)))
            }
            TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Tilde
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus
            | TokenKind::ColonColon => {
                self.next_token();
                let right = self.parse_expression(Precedence::Prefix, ctx)?;
                let end = right.end;
                Ok(Expr::new(tok, end, ExprKind::Prefix { op: tok, right }))
            }
            TokenKind::LParen => self.parse_group(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::LBracket => self.parse_list_literal(ctx),
            TokenKind::BOr => self.parse_case(ctx),
            TokenKind::Plus => self.parse_import(),
            _ => Err(ParseError::unexpected(tok, self.src.clone())),
        }
    }

    fn parse_char_literal(&self, tok: Token) -> Result<char, ParseError> {
        let text = tok.text(&self.src.text);
        let inner = &text[1..text.len() - 1];
        let mut chars = inner.chars();
        match chars.next() {
            Some('\\') => match chars.next() {
                Some('n') => Ok('\n'),
                Some('r') => Ok('\r'),
                Some('t') => Ok('\t'),
                Some('b') => Ok('\u{8}'),
                Some('f') => Ok('\u{c}'),
                Some('v') => Ok('\u{b}'),
                Some('\\') => Ok('\\'),
                Some('\'') => Ok('\''),
                _ => Err(ParseError::unexpected(tok, self.src.clone())),
            },
            Some(c) => Ok(c),
            None => Err(ParseError::unexpected(tok, self.src.clone())),
        }
    }

    /// `(` expr `)` yields the inner expression; `()` is Unit. All
    /// context flags reset inside the parentheses.
    fn parse_group(&mut self) -> Result<Rc<Expr>, ParseError> {
        let start = self.cur;
        if self.peek.kind == TokenKind::RParen {
            self.next_token();
            return Ok(Expr::new(start, self.cur, ExprKind::Unit));
        }

        self.next_token();
        let expr = self.parse_expression(Precedence::Lowest, Context::default())?;
        self.expect_peek(TokenKind::RParen)?;
        Ok(expr)
    }

    /// `{` expressions, optionally `;`-separated, `}`. Flags reset.
    fn parse_block(&mut self) -> Result<Rc<Expr>, ParseError> {
        let start = self.cur;
        let mut expressions = Vec::new();

        self.next_token();
        while self.cur.kind != TokenKind::RBrace {
            if self.cur.kind == TokenKind::Eof {
                return Err(ParseError::expected(
                    TokenKind::RBrace,
                    self.cur,
                    self.src.clone(),
                ));
            }
            expressions.push(self.parse_expression(Precedence::Lowest, Context::default())?);
            if self.peek.kind == TokenKind::Semicolon {
                self.next_token();
            }
            self.next_token();
        }

        Ok(Expr::new(start, self.cur, ExprKind::Block(expressions)))
    }

    /// `[` comma-separated expressions `]`; elements parse with the
    /// tuple flag so `,` separates instead of binding.
    fn parse_list_literal(&mut self, ctx: Context) -> Result<Rc<Expr>, ParseError> {
        let start = self.cur;
        let mut values = Vec::new();

        self.next_token();
        while self.cur.kind != TokenKind::RBracket {
            if self.cur.kind == TokenKind::Eof {
                return Err(ParseError::expected(
                    TokenKind::RBracket,
                    self.cur,
                    self.src.clone(),
                ));
            }
            values.push(self.parse_expression(Precedence::Lowest, ctx.with(Context::TUPLE))?);

            if self.peek.kind == TokenKind::RBracket {
                self.next_token();
                break;
            }
            self.expect_peek(TokenKind::Comma)?;
            self.next_token();
        }

        Ok(Expr::new(start, self.cur, ExprKind::ListLiteral(values)))
    }

    /// `|` cond `=>` result, repeating; inside each result the `|`
    /// infix is disabled so the next `|` starts the next arm.
    fn parse_case(&mut self, ctx: Context) -> Result<Rc<Expr>, ParseError> {
        let start = self.cur;
        let mut conditions = Vec::new();
        let mut results = Vec::new();

        loop {
            self.next_token();
            conditions.push(self.parse_expression(Precedence::Lowest, ctx)?);

            self.expect_peek(TokenKind::FatArrow)?;
            self.next_token();
            results.push(self.parse_expression(Precedence::Lowest, ctx.with(Context::BOR))?);

            if self.peek.kind == TokenKind::BOr {
                self.next_token();
            } else {
                break;
            }
        }

        Ok(Expr::new(
            start,
            self.cur,
            ExprKind::Case {
                conditions,
                results,
            },
        ))
    }

    /// `+` followed by a single string literal.
    fn parse_import(&mut self) -> Result<Rc<Expr>, ParseError> {
        let start = self.cur;
        self.expect_peek(TokenKind::Str)?;
        let text = self.cur.text(&self.src.text);
        let path = text[1..text.len() - 1].replace("\\\"", "\"");
        Ok(Expr::new(start, self.cur, ExprKind::Import(path)))
    }

    // ========================================================================
    // Infix handlers
    // ========================================================================

    fn parse_infix(&mut self, left: Rc<Expr>, ctx: Context) -> Result<Rc<Expr>, ParseError> {
        match self.cur.kind {
            TokenKind::Question => self.parse_ternary(left, ctx),
            TokenKind::LParen => self.parse_call(left, ctx),
            TokenKind::LBracket => self.parse_index(left),
            _ => {
                let op = self.cur;
                let precedence = precedence_of(op.kind);
                self.next_token();
                let right = self.parse_expression(precedence, ctx)?;
                let (start, end) = (left.start, right.end);
                Ok(Expr::new(start, end, ExprKind::Infix { op, left, right }))
            }
        }
    }

    /// `cond ? consequence : alternative`; the consequence parses with
    /// the colon flag so `:` closes the ternary instead of binding.
    fn parse_ternary(&mut self, condition: Rc<Expr>, ctx: Context) -> Result<Rc<Expr>, ParseError> {
        self.next_token();
        let consequence = self.parse_expression(Precedence::Ternary, ctx.with(Context::COLON))?;

        self.expect_peek(TokenKind::Colon)?;
        self.next_token();
        let alternative = self.parse_expression(Precedence::Lowest, ctx)?;

        let (start, end) = (condition.start, alternative.end);
        Ok(Expr::new(
            start,
            end,
            ExprKind::Ternary {
                condition,
                consequence,
                alternative,
            },
        ))
    }

    fn parse_call(&mut self, callee: Rc<Expr>, ctx: Context) -> Result<Rc<Expr>, ParseError> {
        let start = callee.start;
        let mut args = Vec::new();

        self.next_token();
        while self.cur.kind != TokenKind::RParen {
            if self.cur.kind == TokenKind::Eof {
                return Err(ParseError::expected(
                    TokenKind::RParen,
                    self.cur,
                    self.src.clone(),
                ));
            }
            args.push(self.parse_expression(Precedence::Lowest, ctx.with(Context::TUPLE))?);

            if self.peek.kind == TokenKind::RParen {
                self.next_token();
                break;
            }
            self.expect_peek(TokenKind::Comma)?;
            self.next_token();
        }

        Ok(Expr::new(start, self.cur, ExprKind::Call { callee, args }))
    }

    fn parse_index(&mut self, list: Rc<Expr>) -> Result<Rc<Expr>, ParseError> {
        let start = list.start;
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest, Context::default())?;
        self.expect_peek(TokenKind::RBracket)?;
        Ok(Expr::new(start, self.cur, ExprKind::Index { list, index }))
    }

    // ========================================================================
    // Token plumbing
    // ========================================================================

    fn next_token(&mut self) {
        self.cur = self.peek;
        self.peek = self.lexer.next_token();
    }

    fn expect_peek(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.peek.kind == kind {
            self.next_token();
            Ok(())
        } else {
            Err(ParseError::expected(kind, self.peek, self.src.clone()))
        }
    }
}

/// Lex and parse a whole source buffer.
pub fn parse_source(src: &Rc<Source>) -> Result<Rc<Expr>, ParseError> {
    Parser::new(Lexer::new(src.clone())).parse_program()
}
