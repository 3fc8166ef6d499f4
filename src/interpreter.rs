// ABOUTME: Orchestrates one source buffer through lex, parse and eval,
// honoring the token/tree dump flags and the post-run debug dump

use crate::ast::dump_ast;
use crate::config::Options;
use crate::env::Environment;
use crate::error::{EvalError, ParseError};
use crate::eval::Evaluator;
use crate::lexer::{dump_tokens, Source};
use crate::parser::parse_source;
use crate::value::Value;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Eval(#[from] EvalError),
}

impl InterpretError {
    /// Full colored diagnostic for the terminal.
    pub fn report(&self) -> String {
        match self {
            InterpretError::Parse(e) => e.report(),
            InterpretError::Eval(e) => e.report(),
        }
    }

    /// True when the parse failed only because input ended early; the
    /// REPL responds by reading more lines into the same buffer.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, InterpretError::Parse(e) if e.is_incomplete())
    }
}

/// Run one source buffer against an environment. With `--lex` or
/// `--ast` the respective dump is printed instead of evaluating.
pub fn interpret(
    src: &Rc<Source>,
    options: &Rc<Options>,
    env: &Rc<Environment>,
) -> Result<Value, InterpretError> {
    if options.lex {
        print!("{}", dump_tokens(src));
        return Ok(Value::Unit);
    }

    let program = parse_source(src)?;

    if options.ast {
        print!("{}", dump_ast(&program));
        return Ok(Value::Unit);
    }

    let evaluator = Evaluator::new(src.clone(), options.clone());
    let result = evaluator.eval(&program, env)?;

    if options.verbose {
        print!("{}", env.table().borrow().stats());
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::register_builtins;

    fn setup() -> Rc<Environment> {
        let env = Environment::global();
        register_builtins(&env);
        env
    }

    #[test]
    fn test_interpret_program() {
        let env = setup();
        let src = Source::new("test", "x = 20; x + 1");
        let options = Rc::new(Options::default());
        let value = interpret(&src, &options, &env).unwrap();
        assert_eq!(value.flatten().repr(), "21");
    }

    #[test]
    fn test_definitions_persist_across_buffers() {
        let env = setup();
        let options = Rc::new(Options::default());

        let first = Source::new("interactive", "x = 5");
        interpret(&first, &options, &env).unwrap();

        let second = Source::new("interactive", "x * 2");
        let value = interpret(&second, &options, &env).unwrap();
        assert_eq!(value.flatten().repr(), "10");
    }

    #[test]
    fn test_lex_flag_skips_evaluation() {
        let env = setup();
        let options = Rc::new(Options {
            lex: true,
            ..Options::default()
        });
        // would be an eval error if it ran
        let src = Source::new("test", "undefined_name");
        let value = interpret(&src, &options, &env).unwrap();
        assert!(value.is_unit());
    }

    #[test]
    fn test_ast_flag_skips_evaluation() {
        let env = setup();
        let options = Rc::new(Options {
            ast: true,
            ..Options::default()
        });
        let src = Source::new("test", "undefined_name");
        let value = interpret(&src, &options, &env).unwrap();
        assert!(value.is_unit());
    }

    #[test]
    fn test_parse_error_propagates() {
        let env = setup();
        let options = Rc::new(Options::default());
        let src = Source::new("test", "a ? b");
        let err = interpret(&src, &options, &env).unwrap_err();
        assert!(matches!(err, InterpretError::Parse(_)));
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_eval_error_propagates() {
        let env = setup();
        let options = Rc::new(Options::default());
        let src = Source::new("test", "1 + ()");
        let err = interpret(&src, &options, &env).unwrap_err();
        assert!(matches!(err, InterpretError::Eval(_)));
        assert!(!err.is_incomplete());
    }
}
