// ABOUTME: Typed parse and eval error records carrying source spans,
// and the ANSI-colored diagnostic rendering they share

use crate::lexer::Source;
use crate::token::Token;
use std::fmt::Write;
use std::rc::Rc;
use thiserror::Error;

const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// A byte span within a source buffer plus the line/column of its
/// first character.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub line: u32,
    pub col: u32,
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn from_token(tok: Token) -> Span {
        Span {
            line: tok.line,
            col: tok.col,
            offset: tok.offset,
            len: tok.len,
        }
    }

    /// Span covering everything from the first byte of `start` through
    /// the last byte of `end`.
    pub fn from_tokens(start: Token, end: Token) -> Span {
        let last = end.offset + end.len;
        Span {
            line: start.line,
            col: start.col,
            offset: start.offset,
            len: last.saturating_sub(start.offset).max(1),
        }
    }
}

// ============================================================================
// Parse errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum ParseErrorKind {
    /// No prefix handler for this token (also covers `ILLEGAL`).
    #[error("unexpected token {0}")]
    Unexpected(&'static str),

    /// The next token did not match what the grammar requires.
    #[error("expected {0}")]
    Expected(&'static str),
}

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub token: Token,
    pub src: Rc<Source>,
}

impl ParseError {
    pub fn unexpected(token: Token, src: Rc<Source>) -> ParseError {
        ParseError {
            kind: ParseErrorKind::Unexpected(token.kind.literal()),
            token,
            src,
        }
    }

    pub fn expected(expected: crate::token::TokenKind, got: Token, src: Rc<Source>) -> ParseError {
        ParseError {
            kind: ParseErrorKind::Expected(expected.literal()),
            token: got,
            src,
        }
    }

    /// The REPL keeps reading when a parse failed only because the
    /// buffer ended too early.
    pub fn is_incomplete(&self) -> bool {
        self.token.kind == crate::token::TokenKind::Eof
    }

    /// Full colored diagnostic: header line, source line, underline.
    pub fn report(&self) -> String {
        render(&self.src, Span::from_token(self.token), &self.to_string())
    }
}

// ============================================================================
// Eval errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum EvalErrorKind {
    #[error("'{0}' undefined")]
    Undefined(String),

    /// Operand or value type does not support the operation.
    #[error("{0}")]
    Type(String),

    #[error("too few arguments: expected {expected}, got {got}")]
    TooFewArguments { expected: usize, got: usize },

    #[error("too many arguments: expected {expected}, got {got}")]
    TooManyArguments { expected: usize, got: usize },

    #[error("index {index} out of bounds for list of length {len}")]
    OutOfBounds { index: i64, len: usize },

    #[error("cannot assign to constant '{0}'")]
    AssignToConst(String),

    #[error("cannot bind constant value to mutable '{0}'")]
    ConstToMutable(String),

    #[error("cannot redefine '{0}' as constant")]
    ConstRedefine(String),

    /// Destructuring length or shape mismatch.
    #[error("{0}")]
    Destructure(String),

    #[error("expression is not assignable")]
    NotAssignable,

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0}")]
    Import(String),
}

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Span,
    pub src: Rc<Source>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, span: Span, src: Rc<Source>) -> EvalError {
        EvalError { kind, span, src }
    }

    pub fn report(&self) -> String {
        render(&self.src, self.span, &self.to_string())
    }
}

// ============================================================================
// Diagnostic rendering
// ============================================================================

/// `<file>:<line>:<col>: error: <message>` plus the source line with
/// the offending span in red and a `^~~` underline beneath it.
fn render(src: &Source, span: Span, message: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{BOLD}{}:{}:{}: {RED}error:{RESET} {message}",
        src.name, span.line, span.col
    );

    let line_start = span.offset.saturating_sub(span.col.saturating_sub(1) as usize);
    let line_start = line_start.min(src.text.len());
    let line_end = src.text[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(src.text.len());

    let offset = span.offset.clamp(line_start, line_end);
    let span_end = (offset + span.len.max(1)).min(line_end.max(offset + 1));

    let before = src.text.get(line_start..offset).unwrap_or("");
    let spanned = src.text.get(offset..span_end).unwrap_or("");
    let after = src.text.get(span_end..line_end).unwrap_or("");

    let _ = writeln!(
        out,
        "{:>4} | {before}{RED}{spanned}{RESET}{after}",
        span.line
    );

    let underline_len = span_end.saturating_sub(offset).max(1);
    let _ = writeln!(
        out,
        "     | {}{RED}^{}{RESET}",
        " ".repeat(before.len()),
        "~".repeat(underline_len - 1)
    );

    out
}
