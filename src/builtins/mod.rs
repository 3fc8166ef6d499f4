//! # Builtin pack
//!
//! The `__builtin_*` functions registered in the top environment:
//!
//! - **[console]** (1): `__builtin_println`
//! - **[lists]** (7): `__builtin_len`, `__builtin_head`, `__builtin_tail`,
//!   `__builtin_copy`, `__builtin_foreach`, `__builtin_append`,
//!   `__builtin_remove`
//!
//! Builtins receive their argument expressions unevaluated and decide
//! for themselves how strictly to evaluate them (`head` keeps the
//! L-value, everything else flattens). All are bound const.

use crate::env::Environment;
use crate::value::{BuiltinFn, Function, Value};
use std::rc::Rc;

pub mod console;
pub mod lists;

/// Register every builtin in the given (top) environment.
pub fn register_builtins(env: &Rc<Environment>) {
    console::register(env);
    lists::register(env);
}

pub(crate) fn define(env: &Rc<Environment>, name: &'static str, arity: usize, func: BuiltinFn) {
    let function = Function::Builtin { name, arity, func };
    env.set_local(name, Value::Function(Rc::new(function)), true)
        .expect("builtin names are unique and within bounds");
}
