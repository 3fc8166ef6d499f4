//! Console output: `__builtin_println`
//!
//! Prints the print form of its argument (chars bare, char lists as
//! raw strings) followed by a newline.

use crate::ast::Expr;
use crate::env::Environment;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::Value;
use std::rc::Rc;

/// Print the argument in print form with a trailing newline; yields
/// Unit.
pub fn builtin_println(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    _call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval_strict(&args[0], env)?;
    println!("{value}");
    Ok(Value::Unit)
}

pub fn register(env: &Rc<Environment>) {
    super::define(env, "__builtin_println", 1, builtin_println);
}
