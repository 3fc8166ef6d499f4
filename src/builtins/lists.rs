//! List builtins: `__builtin_len`, `__builtin_head`, `__builtin_tail`,
//! `__builtin_copy`, `__builtin_foreach`, `__builtin_append`,
//! `__builtin_remove`
//!
//! `head` yields an L-value into the list so callers can mutate through
//! it; `tail` shares the node chain; `append` and `remove` mutate the
//! list itself and hand it back.

use crate::ast::Expr;
use crate::env::Environment;
use crate::error::{EvalError, EvalErrorKind};
use crate::eval::Evaluator;
use crate::value::{Function, List, Value};
use std::rc::Rc;

fn expect_list(
    ev: &Evaluator,
    arg: &Rc<Expr>,
    value: &Value,
    builtin: &str,
) -> Result<Rc<List>, EvalError> {
    match value {
        Value::List(list) => Ok(list.clone()),
        other => Err(ev.error(
            arg,
            EvalErrorKind::Type(format!(
                "{builtin} requires a list, got {}",
                other.type_name()
            )),
        )),
    }
}

/// Int length of the list.
pub fn builtin_len(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    _call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval_strict(&args[0], env)?;
    let list = expect_list(ev, &args[0], &value, "len")?;
    Ok(Value::Int(list.len() as i64))
}

/// L-value of the first element; const iff the list binding is const.
pub fn builtin_head(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    _call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval(&args[0], env)?;
    let is_const = matches!(&value, Value::Lvalue { is_const: true, .. });
    let list = expect_list(ev, &args[0], &value.clone().flatten(), "head")?;

    match list.node_at(0) {
        Some(node) => Ok(Value::Lvalue {
            slot: node.value.clone(),
            is_const,
        }),
        None => Err(ev.error(
            &args[0],
            EvalErrorKind::Type("head of an empty list".to_string()),
        )),
    }
}

/// Fresh list sharing every node after the first.
pub fn builtin_tail(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    _call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval_strict(&args[0], env)?;
    let list = expect_list(ev, &args[0], &value, "tail")?;

    if list.is_empty() {
        return Err(ev.error(
            &args[0],
            EvalErrorKind::Type("tail of an empty list".to_string()),
        ));
    }
    Ok(Value::List(list.rest()))
}

/// Copy of a list into fresh slots: scalar elements are cloned, the
/// rest share their strong reference. Identity on non-lists.
pub fn builtin_copy(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    _call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval_strict(&args[0], env)?;
    match value {
        Value::List(list) => {
            let copy = List::new();
            for node in list.iter() {
                copy.push(node.value.borrow().to_binding());
            }
            Ok(Value::List(copy))
        }
        other => Ok(other),
    }
}

/// Map in place: each element is replaced by `f(element)`. `f` must be
/// a user function of one argument.
pub fn builtin_foreach(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval_strict(&args[0], env)?;
    let list = expect_list(ev, &args[0], &value, "foreach")?;

    let func_value = ev.eval_strict(&args[1], env)?;
    let func = match &func_value {
        Value::Function(func) => func.clone(),
        other => {
            return Err(ev.error(
                &args[1],
                EvalErrorKind::Type(format!(
                    "foreach requires a function, got {}",
                    other.type_name()
                )),
            ))
        }
    };
    if !matches!(&*func, Function::User { .. }) || func.arity() != 1 {
        return Err(ev.error(
            &args[1],
            EvalErrorKind::Type(
                "foreach requires a user-defined function taking one argument".to_string(),
            ),
        ));
    }

    for node in list.iter() {
        let current = node.value.borrow().clone();
        let mapped = ev.apply_user_function(&func, vec![current], call)?;
        *node.value.borrow_mut() = mapped.to_binding();
    }
    Ok(Value::List(list))
}

/// Append an element; mutates the list and returns it.
pub fn builtin_append(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    _call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval_strict(&args[0], env)?;
    let list = expect_list(ev, &args[0], &value, "append")?;

    let element = ev.eval(&args[1], env)?;
    list.push(element.to_binding());
    Ok(Value::List(list))
}

/// Remove the element at an index; mutates the list and returns it.
pub fn builtin_remove(
    ev: &Evaluator,
    args: &[Rc<Expr>],
    call: &Expr,
    env: &Rc<Environment>,
) -> Result<Value, EvalError> {
    let value = ev.eval_strict(&args[0], env)?;
    let list = expect_list(ev, &args[0], &value, "remove")?;

    let index = match ev.eval_strict(&args[1], env)? {
        Value::Int(index) => index,
        other => {
            return Err(ev.error(
                &args[1],
                EvalErrorKind::Type(format!(
                    "remove requires an int index, got {}",
                    other.type_name()
                )),
            ))
        }
    };

    if index < 0 || index as usize >= list.len() {
        return Err(ev.error(
            call,
            EvalErrorKind::OutOfBounds {
                index,
                len: list.len(),
            },
        ));
    }
    list.remove_at(index as usize);
    Ok(Value::List(list))
}

pub fn register(env: &Rc<Environment>) {
    super::define(env, "__builtin_len", 1, builtin_len);
    super::define(env, "__builtin_head", 1, builtin_head);
    super::define(env, "__builtin_tail", 1, builtin_tail);
    super::define(env, "__builtin_copy", 1, builtin_copy);
    super::define(env, "__builtin_foreach", 2, builtin_foreach);
    super::define(env, "__builtin_append", 2, builtin_append);
    super::define(env, "__builtin_remove", 2, builtin_remove);
}

#[cfg(test)]
mod tests {
    use crate::builtins::register_builtins;
    use crate::config::Options;
    use crate::env::Environment;
    use crate::error::{EvalError, EvalErrorKind};
    use crate::eval::Evaluator;
    use crate::lexer::Source;
    use crate::parser::parse_source;
    use crate::value::Value;
    use std::rc::Rc;

    fn run(input: &str) -> Result<Value, EvalError> {
        let src = Source::new("test", input);
        let program = parse_source(&src).expect("parse failed");
        let env = Environment::global();
        register_builtins(&env);
        Evaluator::new(src, Rc::new(Options::default())).eval(&program, &env)
    }

    fn eval_repr(input: &str) -> String {
        run(input).expect("eval failed").flatten().repr()
    }

    fn eval_err(input: &str) -> EvalError {
        run(input).expect_err("expected eval error")
    }

    #[test]
    fn test_len() {
        assert_eq!(eval_repr("__builtin_len([1, 2, 3])"), "3");
        assert_eq!(eval_repr("__builtin_len([])"), "0");
        assert_eq!(eval_repr("__builtin_len(\"hello\")"), "5");
        assert!(matches!(
            eval_err("__builtin_len(5)").kind,
            EvalErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_head_is_assignable() {
        assert_eq!(eval_repr("__builtin_head([7, 8])"), "7");
        assert_eq!(
            eval_repr("x = [7, 8]; ++__builtin_head(x); x"),
            "[8, 8]"
        );
        assert!(matches!(
            eval_err("__builtin_head([])").kind,
            EvalErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_head_of_const_list_is_const() {
        assert!(matches!(
            eval_err("k :: [1, 2]; ++__builtin_head(k)").kind,
            EvalErrorKind::AssignToConst(_)
        ));
    }

    #[test]
    fn test_tail_shares_nodes() {
        assert_eq!(eval_repr("__builtin_tail([1, 2, 3])"), "[2, 3]");
        assert_eq!(
            eval_repr("x = [1, 2, 3]; t = __builtin_tail(x); t[0] = 9; x"),
            "[1, 9, 3]"
        );
        assert!(matches!(
            eval_err("__builtin_tail([])").kind,
            EvalErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_copy_detaches_slots_but_shares_sublists() {
        assert_eq!(
            eval_repr("x = [1, 2]; c = __builtin_copy(x); c[0] = 9; x"),
            "[1, 2]"
        );
        // a nested list is shared, not cloned
        assert_eq!(
            eval_repr("x = [[1], 2]; c = __builtin_copy(x); __builtin_append(c[0], 9); x"),
            "[[1, 9], 2]"
        );
        // identity on non-lists
        assert_eq!(eval_repr("__builtin_copy(5)"), "5");
    }

    #[test]
    fn test_foreach_maps_in_place() {
        assert_eq!(
            eval_repr("x = [1, 2, 3]; __builtin_foreach(x, n -> n * 2); x"),
            "[2, 4, 6]"
        );
    }

    #[test]
    fn test_foreach_requires_unary_user_function() {
        assert!(matches!(
            eval_err("__builtin_foreach([1], (a, b) -> a)").kind,
            EvalErrorKind::Type(_)
        ));
        assert!(matches!(
            eval_err("__builtin_foreach([1], __builtin_len)").kind,
            EvalErrorKind::Type(_)
        ));
        assert!(matches!(
            eval_err("__builtin_foreach([1], 5)").kind,
            EvalErrorKind::Type(_)
        ));
    }

    #[test]
    fn test_append_mutates_and_returns() {
        assert_eq!(eval_repr("x = [1]; __builtin_append(x, 2)"), "[1, 2]");
        assert_eq!(eval_repr("x = [1]; __builtin_append(x, 2); x"), "[1, 2]");
        assert_eq!(eval_repr("x = []; __builtin_append(x, [2]); x"), "[[2]]");
    }

    #[test]
    fn test_remove() {
        assert_eq!(eval_repr("x = [1, 2, 3]; __builtin_remove(x, 1); x"), "[1, 3]");
        assert!(matches!(
            eval_err("__builtin_remove([1], 5)").kind,
            EvalErrorKind::OutOfBounds { index: 5, len: 1 }
        ));
        assert!(matches!(
            eval_err("__builtin_remove([1], -1)").kind,
            EvalErrorKind::OutOfBounds { .. }
        ));
    }

    #[test]
    fn test_builtins_are_const_bindings() {
        assert!(matches!(
            eval_err("__builtin_len = 5").kind,
            EvalErrorKind::AssignToConst(_)
        ));
    }

    #[test]
    fn test_builtin_repr() {
        assert_eq!(eval_repr("__builtin_append"), "function(2)");
    }
}
