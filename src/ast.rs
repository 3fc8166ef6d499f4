// ABOUTME: Expression tree built by the parser and walked by the evaluator,
// plus the indented tree dump behind the --ast flag

use crate::token::Token;
use std::fmt::Write;
use std::rc::Rc;

/// An expression node. Every node records the first and last token of
/// its source span so diagnostics can underline the full expression.
/// Nodes are shared via `Rc`: the tree lives for the session, and
/// function values keep their bodies (including call trees synthesized
/// by compose/pipe) alive for as long as they are callable.
#[derive(Debug)]
pub struct Expr {
    pub start: Token,
    pub end: Token,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Program(Vec<Rc<Expr>>),
    Block(Vec<Rc<Expr>>),
    ListLiteral(Vec<Rc<Expr>>),

    Unit,
    Identifier(String),
    CharLiteral(char),
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    Import(String),

    Prefix {
        op: Token,
        right: Rc<Expr>,
    },
    Infix {
        op: Token,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Ternary {
        condition: Rc<Expr>,
        consequence: Rc<Expr>,
        alternative: Rc<Expr>,
    },
    Call {
        callee: Rc<Expr>,
        args: Vec<Rc<Expr>>,
    },
    Index {
        list: Rc<Expr>,
        index: Rc<Expr>,
    },
    Case {
        conditions: Vec<Rc<Expr>>,
        results: Vec<Rc<Expr>>,
    },
}

impl Expr {
    pub fn new(start: Token, end: Token, kind: ExprKind) -> Rc<Expr> {
        Rc::new(Expr { start, end, kind })
    }
}

/// Render the tree in the indented uppercase style of the `--ast` dump.
pub fn dump_ast(expr: &Expr) -> String {
    let mut out = String::new();
    dump_expr(expr, 0, &mut out);
    out
}

fn dump_expr(expr: &Expr, indent: usize, out: &mut String) {
    let pad = "    ".repeat(indent);
    match &expr.kind {
        ExprKind::Program(exprs) => {
            let _ = writeln!(out, "{pad}PROGRAM({})", exprs.len());
            dump_list(exprs, indent + 1, out);
        }
        ExprKind::Block(exprs) => {
            let _ = writeln!(out, "{pad}BLOCK({}):", exprs.len());
            dump_list(exprs, indent + 1, out);
        }
        ExprKind::ListLiteral(values) => {
            let _ = writeln!(out, "{pad}LIST LITERAL({}):", values.len());
            dump_list(values, indent + 1, out);
        }
        ExprKind::Unit => {
            let _ = writeln!(out, "{pad}UNIT");
        }
        ExprKind::Identifier(name) => {
            let _ = writeln!(out, "{pad}IDENTIFIER {name}");
        }
        ExprKind::CharLiteral(c) => {
            let _ = writeln!(out, "{pad}CHAR LITERAL {c:?}");
        }
        ExprKind::IntLiteral(value) => {
            let _ = writeln!(out, "{pad}INT LITERAL {value}");
        }
        ExprKind::FloatLiteral(value) => {
            let _ = writeln!(out, "{pad}FLOAT LITERAL {value}");
        }
        ExprKind::StringLiteral(value) => {
            let _ = writeln!(out, "{pad}STRING LITERAL {value:?}");
        }
        ExprKind::Import(path) => {
            let _ = writeln!(out, "{pad}IMPORT {path:?}");
        }
        ExprKind::Prefix { op, right } => {
            let _ = writeln!(out, "{pad}PREFIX EXPRESSION");
            let _ = writeln!(out, "{pad}    OP: {}", op.kind.literal());
            let _ = writeln!(out, "{pad}    RIGHT:");
            dump_expr(right, indent + 2, out);
        }
        ExprKind::Infix { op, left, right } => {
            let _ = writeln!(out, "{pad}INFIX EXPRESSION");
            let _ = writeln!(out, "{pad}    OP: {}", op.kind.literal());
            let _ = writeln!(out, "{pad}    LEFT:");
            dump_expr(left, indent + 2, out);
            let _ = writeln!(out, "{pad}    RIGHT:");
            dump_expr(right, indent + 2, out);
        }
        ExprKind::Ternary {
            condition,
            consequence,
            alternative,
        } => {
            let _ = writeln!(out, "{pad}TERNARY EXPRESSION");
            let _ = writeln!(out, "{pad}    CONDITION:");
            dump_expr(condition, indent + 2, out);
            let _ = writeln!(out, "{pad}    CONSEQUENCE:");
            dump_expr(consequence, indent + 2, out);
            let _ = writeln!(out, "{pad}    ALTERNATIVE:");
            dump_expr(alternative, indent + 2, out);
        }
        ExprKind::Call { callee, args } => {
            let _ = writeln!(out, "{pad}CALL EXPRESSION");
            let _ = writeln!(out, "{pad}    FUNCTION:");
            dump_expr(callee, indent + 2, out);
            let _ = writeln!(out, "{pad}    ARGUMENTS({}):", args.len());
            dump_list(args, indent + 2, out);
        }
        ExprKind::Index { list, index } => {
            let _ = writeln!(out, "{pad}INDEX EXPRESSION");
            let _ = writeln!(out, "{pad}    LIST:");
            dump_expr(list, indent + 2, out);
            let _ = writeln!(out, "{pad}    INDEX:");
            dump_expr(index, indent + 2, out);
        }
        ExprKind::Case {
            conditions,
            results,
        } => {
            let _ = writeln!(out, "{pad}CASE EXPRESSION({})", conditions.len());
            for (condition, result) in conditions.iter().zip(results) {
                let _ = writeln!(out, "{pad}    CONDITION:");
                dump_expr(condition, indent + 2, out);
                let _ = writeln!(out, "{pad}    RESULT:");
                dump_expr(result, indent + 2, out);
            }
        }
    }
}

fn dump_list(exprs: &[Rc<Expr>], indent: usize, out: &mut String) {
    for expr in exprs {
        dump_expr(expr, indent, out);
    }
}
