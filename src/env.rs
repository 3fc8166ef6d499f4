// ABOUTME: Environment frames chained for lexical scoping, all sharing one
// process-wide symbol table keyed by (name, scope-id)

use crate::symbol_table::{BindError, SymbolTable};
use crate::value::{new_slot, Slot, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// One scope frame. Frames share the session's symbol table and are
/// distinguished by their scope-id; the parent pointer gives lookup
/// its lexical chain. Closures hold frames alive by strong reference.
pub struct Environment {
    table: Rc<RefCell<SymbolTable>>,
    scope: usize,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    /// Fresh top-level frame with its own symbol table.
    pub fn global() -> Rc<Environment> {
        let table = Rc::new(RefCell::new(SymbolTable::new()));
        let scope = table.borrow_mut().fresh_scope();
        Rc::new(Environment {
            table,
            scope,
            parent: None,
        })
    }

    /// New frame under `parent`, drawing a fresh scope-id from the
    /// shared counter. Used for every function invocation.
    pub fn child(parent: &Rc<Environment>) -> Rc<Environment> {
        let table = parent.table.clone();
        let scope = table.borrow_mut().fresh_scope();
        Rc::new(Environment {
            table,
            scope,
            parent: Some(parent.clone()),
        })
    }

    pub fn scope(&self) -> usize {
        self.scope
    }

    pub fn table(&self) -> &Rc<RefCell<SymbolTable>> {
        &self.table
    }

    /// Walk the frame chain for a binding; innermost scope wins.
    pub fn get(&self, name: &str) -> Option<(Slot, bool)> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            if let Some(found) = env.table.borrow().get(name, env.scope) {
                return Some(found);
            }
            frame = env.parent.as_deref();
        }
        None
    }

    pub fn get_local(&self, name: &str) -> Option<(Slot, bool)> {
        self.table.borrow().get(name, self.scope)
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.table.borrow().contains(name, self.scope)
    }

    /// Bind in this frame only. The displaced slot (if any) drops after
    /// the table borrow is released.
    pub fn set_local(&self, name: &str, value: Value, is_const: bool) -> Result<(), BindError> {
        let displaced = self
            .table
            .borrow_mut()
            .set(name, self.scope, new_slot(value), is_const)?;
        drop(displaced);
        Ok(())
    }
}

impl Drop for Environment {
    /// Releasing a frame tombstones all of its bindings. The released
    /// slots drop outside the table borrow: one of them may hold the
    /// last reference to a closure whose environment tears down in
    /// turn.
    fn drop(&mut self) {
        let released = self.table.borrow_mut().remove_scope(self.scope);
        drop(released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_int(env: &Environment, name: &str) -> Option<i64> {
        env.get(name).map(|(slot, _)| match &*slot.borrow() {
            Value::Int(n) => *n,
            other => panic!("expected int, got {other:?}"),
        })
    }

    #[test]
    fn test_set_and_get() {
        let env = Environment::global();
        env.set_local("x", Value::Int(42), false).unwrap();
        assert_eq!(get_int(&env, "x"), Some(42));
    }

    #[test]
    fn test_undefined_name() {
        let env = Environment::global();
        assert!(env.get("missing").is_none());
    }

    #[test]
    fn test_child_sees_parent_bindings() {
        let parent = Environment::global();
        parent.set_local("x", Value::Int(1), false).unwrap();

        let child = Environment::child(&parent);
        assert_eq!(get_int(&child, "x"), Some(1));
        assert!(!child.contains_local("x"));
    }

    #[test]
    fn test_shadowing() {
        let parent = Environment::global();
        parent.set_local("x", Value::Int(1), false).unwrap();

        let child = Environment::child(&parent);
        child.set_local("x", Value::Int(2), false).unwrap();

        assert_eq!(get_int(&child, "x"), Some(2));
        assert_eq!(get_int(&parent, "x"), Some(1));
    }

    #[test]
    fn test_scope_ids_are_unique() {
        let parent = Environment::global();
        let a = Environment::child(&parent);
        let b = Environment::child(&parent);
        assert_ne!(a.scope(), b.scope());
    }

    #[test]
    fn test_frame_drop_releases_bindings() {
        let parent = Environment::global();
        {
            let child = Environment::child(&parent);
            child.set_local("tmp", Value::Int(9), false).unwrap();
            assert_eq!(parent.table().borrow().len(), 1);
        }
        assert_eq!(parent.table().borrow().len(), 0);
    }

    #[test]
    fn test_const_binding_rejected_on_overwrite() {
        let env = Environment::global();
        env.set_local("k", Value::Int(1), true).unwrap();
        assert!(env.set_local("k", Value::Int(2), false).is_err());
    }

    #[test]
    fn test_dropping_frame_with_closure_chain() {
        // a frame binding a function that captures a child frame must
        // tear down without re-entering the table borrow
        use crate::ast::{Expr, ExprKind};
        use crate::token::{Token, TokenKind};
        use crate::value::Function;

        let global = Environment::global();
        {
            let outer = Environment::child(&global);
            let inner = Environment::child(&outer);
            let tok = Token {
                kind: TokenKind::Int,
                offset: 0,
                len: 1,
                line: 1,
                col: 1,
            };
            let body = Expr::new(tok, tok, ExprKind::IntLiteral(1));
            let f = Function::User {
                params: vec![],
                body,
                env: inner,
            };
            outer
                .set_local("f", Value::Function(Rc::new(f)), false)
                .unwrap();
        }
        assert_eq!(global.table().borrow().len(), 0);
    }
}
