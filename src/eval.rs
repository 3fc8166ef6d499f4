// ABOUTME: Tree-walking evaluator: expression dispatch, arithmetic and
// truthiness, assignment/destructuring, closures, compose/pipe rewriting,
// case selection and module import

use crate::ast::{Expr, ExprKind};
use crate::config::Options;
use crate::env::Environment;
use crate::error::{EvalError, EvalErrorKind, Span};
use crate::ffi;
use crate::lexer::Source;
use crate::parser::parse_source;
use crate::symbol_table::BindError;
use crate::token::{Token, TokenKind};
use crate::value::{Function, List, Param, Value};
use std::rc::Rc;

/// Interprets expression trees against an environment. One evaluator
/// serves one source buffer; imports recurse with a nested evaluator
/// over the imported file.
pub struct Evaluator {
    src: Rc<Source>,
    options: Rc<Options>,
}

impl Evaluator {
    pub fn new(src: Rc<Source>, options: Rc<Options>) -> Evaluator {
        Evaluator { src, options }
    }

    pub fn source(&self) -> &Rc<Source> {
        &self.src
    }

    pub fn options(&self) -> &Rc<Options> {
        &self.options
    }

    pub fn eval(&self, expr: &Rc<Expr>, env: &Rc<Environment>) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Program(exprs) | ExprKind::Block(exprs) => {
                let mut result = Value::Unit;
                for e in exprs {
                    result = self.eval(e, env)?;
                }
                Ok(result)
            }
            ExprKind::Unit => Ok(Value::Unit),
            ExprKind::Identifier(name) => match env.get(name) {
                Some((slot, is_const)) => Ok(Value::Lvalue { slot, is_const }),
                None => Err(self.error(expr, EvalErrorKind::Undefined(name.clone()))),
            },
            ExprKind::CharLiteral(c) => Ok(Value::Char(*c)),
            ExprKind::IntLiteral(n) => Ok(Value::Int(*n)),
            ExprKind::FloatLiteral(f) => Ok(Value::Float(*f)),
            ExprKind::StringLiteral(s) => {
                Ok(Value::List(List::from_values(s.chars().map(Value::Char))))
            }
            ExprKind::ListLiteral(values) => {
                let list = List::new();
                for value in values {
                    list.push(self.eval(value, env)?.to_binding());
                }
                Ok(Value::List(list))
            }
            ExprKind::Import(path) => self.eval_import(expr, path, env),
            ExprKind::Prefix { op, right } => self.eval_prefix(expr, *op, right, env),
            ExprKind::Infix { op, left, right } => self.eval_infix(expr, *op, left, right, env),
            ExprKind::Ternary {
                condition,
                consequence,
                alternative,
            } => {
                if self.eval_strict(condition, env)?.is_truthy() {
                    self.eval(consequence, env)
                } else {
                    self.eval(alternative, env)
                }
            }
            ExprKind::Call { callee, args } => self.eval_call(expr, callee, args, env),
            ExprKind::Index { list, index } => self.eval_index(expr, list, index, env),
            ExprKind::Case {
                conditions,
                results,
            } => {
                for (condition, result) in conditions.iter().zip(results) {
                    if self.eval_strict(condition, env)?.is_truthy() {
                        return self.eval(result, env);
                    }
                }
                Ok(Value::Unit)
            }
        }
    }

    /// Evaluate and flatten any L-value to its referent. Used wherever
    /// an assignable reference is not wanted.
    pub fn eval_strict(
        &self,
        expr: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        Ok(self.eval(expr, env)?.flatten())
    }

    pub fn error(&self, expr: &Expr, kind: EvalErrorKind) -> EvalError {
        EvalError::new(kind, Span::from_tokens(expr.start, expr.end), self.src.clone())
    }

    fn type_error(&self, expr: &Expr, message: String) -> EvalError {
        self.error(expr, EvalErrorKind::Type(message))
    }

    fn expr_text(&self, expr: &Expr) -> String {
        let start = expr.start.offset.min(self.src.text.len());
        let end = (expr.end.offset + expr.end.len).min(self.src.text.len());
        self.src.text.get(start..end).unwrap_or_default().to_string()
    }

    fn bind_error(&self, at: &Expr, err: BindError) -> EvalError {
        let kind = match err {
            BindError::AssignToConst(name) => EvalErrorKind::AssignToConst(name),
            BindError::ConstRedefine(name) => EvalErrorKind::ConstRedefine(name),
            BindError::NameTooLong(_) => EvalErrorKind::Type(err.to_string()),
        };
        self.error(at, kind)
    }

    // ========================================================================
    // Prefix expressions
    // ========================================================================

    fn eval_prefix(
        &self,
        expr: &Rc<Expr>,
        op: Token,
        right: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        match op.kind {
            TokenKind::Minus | TokenKind::Bang | TokenKind::Tilde => {
                let value = self.eval_strict(right, env)?;
                match (op.kind, &value) {
                    (TokenKind::Minus, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
                    (TokenKind::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (TokenKind::Bang, Value::Int(n)) => Ok(Value::Int((*n == 0) as i64)),
                    (TokenKind::Bang, Value::Float(f)) => Ok(Value::Int((*f == 0.0) as i64)),
                    (TokenKind::Tilde, Value::Int(n)) => Ok(Value::Int(!n)),
                    (TokenKind::Tilde, Value::Float(f)) => Ok(Value::Int(!(*f as i64))),
                    _ => Err(self.type_error(
                        expr,
                        format!(
                            "prefix {} requires a numeric operand, got {}",
                            op.kind.literal(),
                            value.type_name()
                        ),
                    )),
                }
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let value = self.eval(right, env)?;
                let Value::Lvalue { slot, is_const } = value else {
                    return Err(self.error(expr, EvalErrorKind::NotAssignable));
                };
                if is_const {
                    return Err(self.error(
                        expr,
                        EvalErrorKind::AssignToConst(self.expr_text(right)),
                    ));
                }

                let step = if op.kind == TokenKind::PlusPlus { 1 } else { -1 };
                let current = slot.borrow().clone();
                let updated = match current {
                    Value::Int(n) => Value::Int(n.wrapping_add(step)),
                    Value::Float(f) => Value::Float(f + step as f64),
                    other => {
                        return Err(self.type_error(
                            expr,
                            format!(
                                "{} requires a numeric operand, got {}",
                                op.kind.literal(),
                                other.type_name()
                            ),
                        ))
                    }
                };
                *slot.borrow_mut() = updated;
                Ok(Value::Lvalue {
                    slot,
                    is_const: false,
                })
            }
            // `::x` only means something inside a parameter pattern
            TokenKind::ColonColon => Err(self.type_error(
                expr,
                "const marker is only valid in function parameters".to_string(),
            )),
            _ => Err(self.type_error(
                expr,
                format!("unknown prefix operator {}", op.kind.literal()),
            )),
        }
    }

    // ========================================================================
    // Infix expressions
    // ========================================================================

    fn eval_infix(
        &self,
        expr: &Rc<Expr>,
        op: Token,
        left: &Rc<Expr>,
        right: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        match op.kind {
            TokenKind::Assign => self.eval_assign(left, right, false, env),
            TokenKind::ColonColon => self.eval_assign(left, right, true, env),
            TokenKind::Arrow => self.make_function(left, right, env),
            TokenKind::LCompose => self.eval_compose(expr, left, right, env),
            TokenKind::RCompose => self.eval_compose(expr, right, left, env),
            TokenKind::RPipe | TokenKind::Dot => self.eval_pipe(expr, left, right, env),
            TokenKind::LPipe => self.eval_pipe(expr, right, left, env),
            TokenKind::Colon | TokenKind::Comma => Err(self.type_error(
                expr,
                format!(
                    "{} is only valid in an assignment pattern",
                    op.kind.literal()
                ),
            )),
            _ => {
                let l = self.eval_strict(left, env)?;
                let r = self.eval_strict(right, env)?;

                if matches!(op.kind, TokenKind::Plus | TokenKind::PlusPlus) {
                    if let (Value::List(a), Value::List(b)) = (&l, &r) {
                        return Ok(concat_lists(a, b));
                    }
                }
                if op.kind == TokenKind::PlusPlus {
                    return Err(self.type_error(
                        expr,
                        format!(
                            "'++' requires list operands, got {} and {}",
                            l.type_name(),
                            r.type_name()
                        ),
                    ));
                }

                self.numeric_infix(expr, op, l, r)
            }
        }
    }

    fn numeric_infix(
        &self,
        expr: &Rc<Expr>,
        op: Token,
        l: Value,
        r: Value,
    ) -> Result<Value, EvalError> {
        let (Some(ln), Some(rn)) = (Num::of(&l), Num::of(&r)) else {
            return Err(self.type_error(
                expr,
                format!(
                    "{} requires numeric operands, got {} and {}",
                    op.kind.literal(),
                    l.type_name(),
                    r.type_name()
                ),
            ));
        };

        match op.kind {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Asterisk | TokenKind::Slash => {
                self.arithmetic(expr, op.kind, ln, rn)
            }
            TokenKind::Percent => {
                let (a, b) = (ln.as_i64(), rn.as_i64());
                if b == 0 {
                    return Err(self.error(expr, EvalErrorKind::DivisionByZero));
                }
                // Euclidean: the result carries the divisor's sign
                Ok(Value::Int(
                    a.wrapping_rem(b).wrapping_add(b).wrapping_rem(b),
                ))
            }
            TokenKind::Lt => Ok(bool_int(ln.as_f64() < rn.as_f64())),
            TokenKind::Gt => Ok(bool_int(ln.as_f64() > rn.as_f64())),
            TokenKind::LtEq => Ok(bool_int(ln.as_f64() <= rn.as_f64())),
            TokenKind::GtEq => Ok(bool_int(ln.as_f64() >= rn.as_f64())),
            TokenKind::Eq => Ok(bool_int(ln.as_f64() == rn.as_f64())),
            TokenKind::NotEq => Ok(bool_int(ln.as_f64() != rn.as_f64())),
            TokenKind::LAnd => Ok(bool_int(ln.as_f64() != 0.0 && rn.as_f64() != 0.0)),
            TokenKind::LOr => Ok(bool_int(ln.as_f64() != 0.0 || rn.as_f64() != 0.0)),
            TokenKind::BAnd => Ok(Value::Int(ln.as_i64() & rn.as_i64())),
            TokenKind::BOr => Ok(Value::Int(ln.as_i64() | rn.as_i64())),
            TokenKind::Caret => Ok(Value::Int(ln.as_i64() ^ rn.as_i64())),
            TokenKind::Shl => Ok(Value::Int(ln.as_i64().wrapping_shl(rn.as_i64() as u32))),
            TokenKind::Shr => Ok(Value::Int(ln.as_i64().wrapping_shr(rn.as_i64() as u32))),
            _ => Err(self.type_error(
                expr,
                format!("unknown infix operator {}", op.kind.literal()),
            )),
        }
    }

    /// Float contagion: the result is float iff either operand is.
    fn arithmetic(
        &self,
        expr: &Rc<Expr>,
        op: TokenKind,
        l: Num,
        r: Num,
    ) -> Result<Value, EvalError> {
        if let (Num::Int(a), Num::Int(b)) = (l, r) {
            let value = match op {
                TokenKind::Plus => a.wrapping_add(b),
                TokenKind::Minus => a.wrapping_sub(b),
                TokenKind::Asterisk => a.wrapping_mul(b),
                _ => {
                    if b == 0 {
                        return Err(self.error(expr, EvalErrorKind::DivisionByZero));
                    }
                    a.wrapping_div(b)
                }
            };
            return Ok(Value::Int(value));
        }

        let (a, b) = (l.as_f64(), r.as_f64());
        let value = match op {
            TokenKind::Plus => a + b,
            TokenKind::Minus => a - b,
            TokenKind::Asterisk => a * b,
            _ => a / b,
        };
        Ok(Value::Float(value))
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    fn eval_assign(
        &self,
        left: &Rc<Expr>,
        right: &Rc<Expr>,
        constant: bool,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        let rhs = self.eval(right, env)?;

        // a const value may not flow into a mutable binding
        if !constant {
            if let Value::Lvalue { is_const: true, .. } = &rhs {
                return Err(self.error(
                    right,
                    EvalErrorKind::ConstToMutable(self.expr_text(left)),
                ));
            }
        }

        let value = rhs.to_binding();
        self.assign(left, value.clone(), constant, env)?;
        Ok(value)
    }

    /// The assignment protocol: the left-hand shape decides how the
    /// (already flattened) right-hand value binds.
    fn assign(
        &self,
        lhs: &Rc<Expr>,
        value: Value,
        constant: bool,
        env: &Rc<Environment>,
    ) -> Result<(), EvalError> {
        match &lhs.kind {
            ExprKind::Identifier(name) => env
                .set_local(name, value, constant)
                .map_err(|e| self.bind_error(lhs, e)),
            ExprKind::ListLiteral(patterns) => {
                let Value::List(list) = &value else {
                    return Err(self.error(
                        lhs,
                        EvalErrorKind::Destructure(format!(
                            "cannot destructure {} into a list pattern",
                            value.type_name()
                        )),
                    ));
                };
                if patterns.len() != list.len() {
                    return Err(self.error(
                        lhs,
                        EvalErrorKind::Destructure(format!(
                            "cannot destructure list of length {} into {} patterns",
                            list.len(),
                            patterns.len()
                        )),
                    ));
                }
                for (pattern, node) in patterns.iter().zip(list.iter()) {
                    let element = node.value.borrow().to_binding();
                    self.assign(pattern, element, constant, env)?;
                }
                Ok(())
            }
            ExprKind::Index { list, index } => {
                if constant {
                    return Err(self.type_error(
                        lhs,
                        "cannot const-assign to an indexed slot".to_string(),
                    ));
                }

                let collection = self.eval(list, env)?;
                if let Value::Lvalue { is_const: true, .. } = &collection {
                    return Err(self.error(
                        list,
                        EvalErrorKind::AssignToConst(self.expr_text(list)),
                    ));
                }
                let Value::List(target) = collection.flatten() else {
                    return Err(self
                        .type_error(list, "cannot index-assign into a non-list".to_string()));
                };

                let node = self.index_node(lhs, &target, index, env)?;
                *node.value.borrow_mut() = value;
                Ok(())
            }
            // `head : tail` splits off the first element
            ExprKind::Infix {
                op:
                    Token {
                        kind: TokenKind::Colon,
                        ..
                    },
                left: head_pattern,
                right: tail_pattern,
            } => {
                let Value::List(list) = &value else {
                    return Err(self.error(
                        lhs,
                        EvalErrorKind::Destructure(format!(
                            "cannot split {} into head and tail",
                            value.type_name()
                        )),
                    ));
                };
                let Some(first) = list.node_at(0) else {
                    return Err(self.error(
                        lhs,
                        EvalErrorKind::Destructure(
                            "cannot split an empty list into head and tail".to_string(),
                        ),
                    ));
                };

                let head = first.value.borrow().to_binding();
                self.assign(head_pattern, head, constant, env)?;
                self.assign(tail_pattern, Value::List(list.rest()), constant, env)
            }
            // right-leaning `a, b, c` spine; element counts must match
            ExprKind::Infix {
                op:
                    Token {
                        kind: TokenKind::Comma,
                        ..
                    },
                ..
            } => {
                let mut patterns = Vec::new();
                flatten_tuple(lhs, &mut patterns);

                let Value::List(list) = &value else {
                    return Err(self.error(
                        lhs,
                        EvalErrorKind::Destructure(format!(
                            "cannot unpack {} into a tuple pattern",
                            value.type_name()
                        )),
                    ));
                };
                if list.len() < patterns.len() {
                    return Err(self.error(
                        lhs,
                        EvalErrorKind::Destructure(format!(
                            "too few values to unpack: expected {}, got {}",
                            patterns.len(),
                            list.len()
                        )),
                    ));
                }
                if list.len() > patterns.len() {
                    return Err(self.error(
                        lhs,
                        EvalErrorKind::Destructure(format!(
                            "too many values to unpack: expected {}, got {}",
                            patterns.len(),
                            list.len()
                        )),
                    ));
                }

                for (pattern, node) in patterns.iter().zip(list.iter()) {
                    let element = node.value.borrow().to_binding();
                    self.assign(pattern, element, constant, env)?;
                }
                Ok(())
            }
            _ => Err(self.error(lhs, EvalErrorKind::NotAssignable)),
        }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// `params -> body`: normalize the parameter pattern and capture
    /// the defining frame.
    fn make_function(
        &self,
        params_expr: &Rc<Expr>,
        body: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        let mut params = Vec::new();
        self.normalize_params(params_expr, &mut params)?;
        Ok(Value::Function(Rc::new(Function::User {
            params,
            body: body.clone(),
            env: env.clone(),
        })))
    }

    /// Accepts Unit, an identifier, `::identifier`, or a right-leaning
    /// comma spine of those.
    fn normalize_params(&self, expr: &Rc<Expr>, out: &mut Vec<Param>) -> Result<(), EvalError> {
        match &expr.kind {
            ExprKind::Unit => Ok(()),
            ExprKind::Identifier(name) => {
                out.push(Param {
                    name: name.clone(),
                    is_const: false,
                });
                Ok(())
            }
            ExprKind::Prefix {
                op:
                    Token {
                        kind: TokenKind::ColonColon,
                        ..
                    },
                right,
            } => match &right.kind {
                ExprKind::Identifier(name) => {
                    out.push(Param {
                        name: name.clone(),
                        is_const: true,
                    });
                    Ok(())
                }
                _ => Err(self.type_error(
                    expr,
                    "function parameters must be identifiers".to_string(),
                )),
            },
            ExprKind::Infix {
                op:
                    Token {
                        kind: TokenKind::Comma,
                        ..
                    },
                left,
                right,
            } => {
                self.normalize_params(left, out)?;
                self.normalize_params(right, out)
            }
            _ => Err(self.type_error(
                expr,
                "function parameters must be identifiers".to_string(),
            )),
        }
    }

    fn eval_call(
        &self,
        expr: &Rc<Expr>,
        callee: &Rc<Expr>,
        args: &[Rc<Expr>],
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        let callee_value = self.eval_strict(callee, env)?;
        let func = match callee_value {
            Value::Function(func) => func,
            other => {
                return Err(
                    self.type_error(callee, format!("cannot call {}", other.type_name()))
                )
            }
        };

        let arity = func.arity();
        if args.len() < arity {
            return Err(self.error(
                expr,
                EvalErrorKind::TooFewArguments {
                    expected: arity,
                    got: args.len(),
                },
            ));
        }
        if args.len() > arity {
            return Err(self.error(
                expr,
                EvalErrorKind::TooManyArguments {
                    expected: arity,
                    got: args.len(),
                },
            ));
        }

        match &*func {
            Function::Builtin { func, .. } => func(self, args, expr, env),
            Function::Native { name, func, .. } => {
                self.call_native(expr, name, *func, args, env)
            }
            Function::User {
                params,
                body,
                env: captured,
            } => {
                // arguments evaluate in the caller's frame, bind in the
                // callee's fresh frame through the assignment protocol
                let frame = Environment::child(captured);
                for (param, arg) in params.iter().zip(args) {
                    let value = self.eval(arg, env)?;
                    if !param.is_const {
                        if let Value::Lvalue { is_const: true, .. } = &value {
                            return Err(self.error(
                                arg,
                                EvalErrorKind::ConstToMutable(param.name.clone()),
                            ));
                        }
                    }
                    frame
                        .set_local(&param.name, value.to_binding(), param.is_const)
                        .map_err(|e| self.bind_error(arg, e))?;
                }
                self.eval(body, &frame)
            }
        }
    }

    /// Apply an already-built user function to evaluated values. Used
    /// by builtins that call back into user code (`foreach`).
    pub fn apply_user_function(
        &self,
        func: &Function,
        args: Vec<Value>,
        at: &Expr,
    ) -> Result<Value, EvalError> {
        let Function::User { params, body, env } = func else {
            return Err(self.type_error(at, "expected a user-defined function".to_string()));
        };
        if args.len() < params.len() {
            return Err(self.error(
                at,
                EvalErrorKind::TooFewArguments {
                    expected: params.len(),
                    got: args.len(),
                },
            ));
        }
        if args.len() > params.len() {
            return Err(self.error(
                at,
                EvalErrorKind::TooManyArguments {
                    expected: params.len(),
                    got: args.len(),
                },
            ));
        }

        let frame = Environment::child(env);
        for (param, value) in params.iter().zip(args) {
            frame
                .set_local(&param.name, value.to_binding(), param.is_const)
                .map_err(|e| self.bind_error(at, e))?;
        }
        self.eval(body, &frame)
    }

    fn call_native(
        &self,
        expr: &Rc<Expr>,
        name: &str,
        func: ffi::RawBuiltinFn,
        args: &[Rc<Expr>],
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        let mut raw_args = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval_strict(arg, env)?;
            let raw = ffi::marshal(&value).ok_or_else(|| {
                self.type_error(
                    arg,
                    format!(
                        "native builtin '{name}' supports only scalar arguments, got {}",
                        value.type_name()
                    ),
                )
            })?;
            raw_args.push(raw);
        }

        let mut result = ffi::RawValue::unit();
        // SAFETY: the pointer comes from a pack kept loaded for the
        // session; args/result follow the pack ABI.
        let ok = unsafe { func(raw_args.as_ptr(), raw_args.len(), &mut result) };
        if !ok {
            return Err(self.error(
                expr,
                EvalErrorKind::Import(format!("native builtin '{name}' failed")),
            ));
        }
        Ok(ffi::unmarshal(&result))
    }

    // ========================================================================
    // Composition and pipelining
    // ========================================================================

    /// `f <<< g` / `g >>> f`: a synthetic function with g's parameters
    /// and body `f(g(params…))`. Construction only; nothing runs until
    /// the result is called.
    fn eval_compose(
        &self,
        expr: &Rc<Expr>,
        outer_expr: &Rc<Expr>,
        inner_expr: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        let outer_func = match self.eval_strict(outer_expr, env)? {
            Value::Function(func) => func,
            other => {
                return Err(self.type_error(
                    outer_expr,
                    format!("composition requires functions, got {}", other.type_name()),
                ))
            }
        };
        let inner_func = match self.eval_strict(inner_expr, env)? {
            Value::Function(func) => func,
            other => {
                return Err(self.type_error(
                    inner_expr,
                    format!("composition requires functions, got {}", other.type_name()),
                ))
            }
        };

        if outer_func.arity() != 1 {
            return Err(self.type_error(
                outer_expr,
                format!(
                    "outer function of a composition must take exactly one argument, takes {}",
                    outer_func.arity()
                ),
            ));
        }

        let params = synthetic_params(&inner_func);
        let syn = Token::synthetic(expr.start);
        let inner_call = Expr::new(
            syn,
            syn,
            ExprKind::Call {
                callee: inner_expr.clone(),
                args: params.iter().map(|p| ident_expr(syn, &p.name)).collect(),
            },
        );
        let body = Expr::new(
            syn,
            syn,
            ExprKind::Call {
                callee: outer_expr.clone(),
                args: vec![inner_call],
            },
        );

        Ok(Value::Function(Rc::new(Function::User {
            params,
            body,
            env: env.clone(),
        })))
    }

    /// `x |> f`, `f <| x`, `x . f`: a synthetic function with f's
    /// remaining parameters and body `f(x, rest…)`.
    fn eval_pipe(
        &self,
        expr: &Rc<Expr>,
        value_expr: &Rc<Expr>,
        func_expr: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        let func = match self.eval_strict(func_expr, env)? {
            Value::Function(func) => func,
            other => {
                return Err(self.type_error(
                    func_expr,
                    format!("cannot pipe into {}", other.type_name()),
                ))
            }
        };
        if func.arity() < 1 {
            return Err(self.type_error(
                func_expr,
                "cannot pipe into a function taking no arguments".to_string(),
            ));
        }

        let remaining = synthetic_params(&func)[1..].to_vec();
        let syn = Token::synthetic(expr.start);
        let mut args = vec![value_expr.clone()];
        args.extend(remaining.iter().map(|p| ident_expr(syn, &p.name)));
        let body = Expr::new(
            syn,
            syn,
            ExprKind::Call {
                callee: func_expr.clone(),
                args,
            },
        );

        Ok(Value::Function(Rc::new(Function::User {
            params: remaining,
            body,
            env: env.clone(),
        })))
    }

    // ========================================================================
    // Index
    // ========================================================================

    fn eval_index(
        &self,
        expr: &Rc<Expr>,
        list_expr: &Rc<Expr>,
        index_expr: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        let collection = self.eval(list_expr, env)?;
        let assignable = matches!(&collection, Value::Lvalue { .. });
        // an indexed slot is const iff the containing binding is const
        let is_const = matches!(&collection, Value::Lvalue { is_const: true, .. });

        let list = match collection.flatten() {
            Value::List(list) => list,
            other => {
                return Err(self.type_error(
                    list_expr,
                    format!("cannot index into {}", other.type_name()),
                ))
            }
        };

        let node = self.index_node(expr, &list, index_expr, env)?;
        if assignable {
            Ok(Value::Lvalue {
                slot: node.value.clone(),
                is_const,
            })
        } else {
            Ok(node.value.borrow().to_binding())
        }
    }

    /// Bounds-checked walk to the indexed node.
    fn index_node(
        &self,
        at: &Expr,
        list: &Rc<List>,
        index_expr: &Rc<Expr>,
        env: &Rc<Environment>,
    ) -> Result<Rc<crate::value::ListNode>, EvalError> {
        let index = match self.eval_strict(index_expr, env)? {
            Value::Int(index) => index,
            other => {
                return Err(self.type_error(
                    index_expr,
                    format!("list index must be an int, got {}", other.type_name()),
                ))
            }
        };

        if index < 0 || index as usize >= list.len() {
            return Err(self.error(
                at,
                EvalErrorKind::OutOfBounds {
                    index,
                    len: list.len(),
                },
            ));
        }
        list.node_at(index as usize).ok_or_else(|| {
            self.error(
                at,
                EvalErrorKind::OutOfBounds {
                    index,
                    len: list.len(),
                },
            )
        })
    }

    // ========================================================================
    // Import
    // ========================================================================

    /// `.so` paths load a native builtin pack; anything else is read as
    /// source and evaluated into the current environment.
    fn eval_import(
        &self,
        expr: &Rc<Expr>,
        path: &str,
        env: &Rc<Environment>,
    ) -> Result<Value, EvalError> {
        if path.ends_with(".so") {
            let entries = ffi::load_pack(path)
                .map_err(|msg| self.error(expr, EvalErrorKind::Import(msg)))?;
            for entry in entries {
                let func = Function::Native {
                    name: entry.name.clone(),
                    arity: entry.arity,
                    func: entry.func,
                };
                env.set_local(&entry.name, Value::Function(Rc::new(func)), true)
                    .map_err(|e| self.error(expr, EvalErrorKind::Import(e.to_string())))?;
            }
            return Ok(Value::Unit);
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| self.error(expr, EvalErrorKind::Import(format!("{path}: {e}"))))?;
        let src = Source::new(path, text);

        let program = parse_source(&src).map_err(|e| {
            EvalError::new(
                EvalErrorKind::Import(e.to_string()),
                Span::from_token(e.token),
                e.src.clone(),
            )
        })?;

        let mut options = (*self.options).clone();
        options.file_name = path.to_string();
        let nested = Evaluator::new(src, Rc::new(options));
        nested.eval(&program, env)?;
        Ok(Value::Unit)
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Int(n) => Some(Num::Int(*n)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Num::Int(n) => n,
            Num::Float(f) => f as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }
}

fn bool_int(b: bool) -> Value {
    Value::Int(b as i64)
}

/// Fresh list over both inputs; scalars copy, everything else shares.
fn concat_lists(a: &Rc<List>, b: &Rc<List>) -> Value {
    let out = List::new();
    for node in a.iter().chain(b.iter()) {
        out.push(node.value.borrow().to_binding());
    }
    Value::List(out)
}

fn flatten_tuple(expr: &Rc<Expr>, out: &mut Vec<Rc<Expr>>) {
    if let ExprKind::Infix {
        op:
            Token {
                kind: TokenKind::Comma,
                ..
            },
        left,
        right,
    } = &expr.kind
    {
        out.push(left.clone());
        flatten_tuple(right, out);
    } else {
        out.push(expr.clone());
    }
}

/// Parameter list for a synthetic compose/pipe function: a user
/// function contributes its own parameters, a builtin gets generated
/// names matching its arity.
fn synthetic_params(func: &Function) -> Vec<Param> {
    match func {
        Function::User { params, .. } => params.clone(),
        _ => (0..func.arity())
            .map(|i| Param {
                name: format!("__arg{i}"),
                is_const: false,
            })
            .collect(),
    }
}

fn ident_expr(tok: Token, name: &str) -> Rc<Expr> {
    Expr::new(tok, tok, ExprKind::Identifier(name.to_string()))
}
