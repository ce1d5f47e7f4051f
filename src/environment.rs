//! Lexical environment frames: declaration, lookup, assignment, and the
//! observer list attached to each binding.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::DeclKind;
use crate::value::Value;

/// `{name, value, kind, mutable, observers}`.
#[derive(Debug)]
pub struct Binding {
    pub value: Value,
    pub kind: DeclKind,
    /// `let`/`const` bindings start uninitialized until their declaration's
    /// initializer runs; reading one before that is a temporal-dead-zone
    /// error.
    pub initialized: bool,
    pub observers: Vec<Value>,
}

impl Binding {
    fn new(kind: DeclKind, value: Value, initialized: bool) -> Self {
        Self { value, kind, initialized, observers: Vec::new() }
    }
}

/// Errors raised by environment operations, converted to `RuntimeError` by
/// the evaluator (which has the AST span to attach).
#[derive(Debug, Clone)]
pub enum EnvError {
    NotDeclared(String),
    AlreadyDeclared(String),
    AssignToConst(String),
    UseBeforeInit(String),
}

/// A binding map plus a link to an enclosing frame. Frames are opened for
/// the global scope, each function invocation, each block, and each
/// `for`/`catch` head.
#[derive(Debug)]
pub struct Frame {
    bindings: IndexMap<String, Binding>,
    parent: Option<Rc<RefCell<Frame>>>,
    /// `var` declarations hoist to the nearest frame with this flag set
    /// (a function body or the global frame), not to intervening blocks.
    is_function_boundary: bool,
}

impl Frame {
    pub fn new_global() -> Rc<RefCell<Frame>> {
        Rc::new(RefCell::new(Frame {
            bindings: IndexMap::new(),
            parent: None,
            is_function_boundary: true,
        }))
    }

    /// A block scope.
    pub fn child_block(parent: &Rc<RefCell<Frame>>) -> Rc<RefCell<Frame>> {
        Rc::new(RefCell::new(Frame {
            bindings: IndexMap::new(),
            parent: Some(parent.clone()),
            is_function_boundary: false,
        }))
    }

    /// A function-call scope; `var` declarations made directly inside it
    /// (or inside nested blocks) hoist here.
    pub fn child_function(parent: &Rc<RefCell<Frame>>) -> Rc<RefCell<Frame>> {
        Rc::new(RefCell::new(Frame {
            bindings: IndexMap::new(),
            parent: Some(parent.clone()),
            is_function_boundary: true,
        }))
    }

    fn nearest_function_boundary(frame: &Rc<RefCell<Frame>>) -> Rc<RefCell<Frame>> {
        let mut current = frame.clone();
        loop {
            let is_boundary = current.borrow().is_function_boundary;
            if is_boundary {
                return current;
            }
            let parent = current.borrow().parent.clone().expect("global frame is always a boundary");
            current = parent;
        }
    }

    /// `var` creates a binding in the nearest function or global frame
    ///. Duplicate declaration in that frame is a runtime error.
    pub fn declare_var(frame: &Rc<RefCell<Frame>>, name: &str, value: Option<Value>) -> Result<(), EnvError> {
        let target = Self::nearest_function_boundary(frame);
        let mut target_mut = target.borrow_mut();
        match target_mut.bindings.get_mut(name) {
            Some(existing) if existing.kind == DeclKind::Var => {
                if let Some(v) = value {
                    existing.value = v;
                }
                Ok(())
            }
            Some(_) => Err(EnvError::AlreadyDeclared(name.to_string())),
            None => {
                target_mut.bindings.insert(
                    name.to_string(),
                    Binding::new(DeclKind::Var, value.unwrap_or(Value::Undefined), true),
                );
                Ok(())
            }
        }
    }

    /// `let`/`const` create a binding in the current block frame
    ///; `const` must carry an initializer.
    pub fn declare_lexical(
        frame: &Rc<RefCell<Frame>>,
        kind: DeclKind,
        name: &str,
        value: Option<Value>,
    ) -> Result<(), EnvError> {
        let mut frame_mut = frame.borrow_mut();
        if frame_mut.bindings.contains_key(name) {
            return Err(EnvError::AlreadyDeclared(name.to_string()));
        }
        let initialized = value.is_some();
        frame_mut.bindings.insert(name.to_string(), Binding::new(kind, value.unwrap_or(Value::Undefined), initialized));
        Ok(())
    }

    /// Walks from innermost frame outward; first hit wins.
    pub fn lookup(frame: &Rc<RefCell<Frame>>, name: &str) -> Result<Value, EnvError> {
        let mut current = Some(frame.clone());
        while let Some(f) = current {
            let f_ref = f.borrow();
            if let Some(binding) = f_ref.bindings.get(name) {
                if !binding.initialized {
                    return Err(EnvError::UseBeforeInit(name.to_string()));
                }
                return Ok(binding.value.clone());
            }
            current = f_ref.parent.clone();
        }
        Err(EnvError::NotDeclared(name.to_string()))
    }

    pub fn is_declared(frame: &Rc<RefCell<Frame>>, name: &str) -> bool {
        let mut current = Some(frame.clone());
        while let Some(f) = current {
            let f_ref = f.borrow();
            if f_ref.bindings.contains_key(name) {
                return true;
            }
            current = f_ref.parent.clone();
        }
        false
    }

    /// Assignment follows the same lookup as `lookup`, writing back into the
    /// discovered frame. Returns the old value and a snapshot of the
    /// observer list so the evaluator can fan out notifications after the
    /// write completes.
    pub fn assign(frame: &Rc<RefCell<Frame>>, name: &str, value: Value) -> Result<(Value, Vec<Value>), EnvError> {
        let mut current = Some(frame.clone());
        while let Some(f) = current {
            let mut f_mut = f.borrow_mut();
            if let Some(binding) = f_mut.bindings.get_mut(name) {
                if binding.kind == DeclKind::Const && binding.initialized {
                    return Err(EnvError::AssignToConst(name.to_string()));
                }
                let old = std::mem::replace(&mut binding.value, value);
                binding.initialized = true;
                // An observer added by another observer during this fan-out
                // is not invoked until the *next* assignment, so only call
                // as many observers as existed at assignment time.
                let observers = binding.observers.clone();
                return Ok((old, observers));
            }
            current = f_mut.parent.clone();
        }
        Err(EnvError::NotDeclared(name.to_string()))
    }

    /// Appends an observer to a binding's list, preserving registration
    /// order.
    pub fn add_observer(frame: &Rc<RefCell<Frame>>, name: &str, observer: Value) -> Result<(), EnvError> {
        let mut current = Some(frame.clone());
        while let Some(f) = current {
            let mut f_mut = f.borrow_mut();
            if let Some(binding) = f_mut.bindings.get_mut(name) {
                binding.observers.push(observer);
                return Ok(());
            }
            current = f_mut.parent.clone();
        }
        Err(EnvError::NotDeclared(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_hoists_through_block_to_function_boundary() {
        let global = Frame::new_global();
        let func = Frame::child_function(&global);
        let block = Frame::child_block(&func);
        Frame::declare_var(&block, "x", Some(Value::Number(1.0))).unwrap();
        assert_eq!(Frame::lookup(&func, "x").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn let_is_block_scoped() {
        let global = Frame::new_global();
        let block = Frame::child_block(&global);
        Frame::declare_lexical(&block, DeclKind::Let, "y", Some(Value::Number(2.0))).unwrap();
        assert!(Frame::lookup(&global, "y").is_err());
        assert_eq!(Frame::lookup(&block, "y").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn const_reassignment_is_an_error() {
        let global = Frame::new_global();
        Frame::declare_lexical(&global, DeclKind::Const, "z", Some(Value::Number(1.0))).unwrap();
        let result = Frame::assign(&global, "z", Value::Number(2.0));
        assert!(matches!(result, Err(EnvError::AssignToConst(_))));
    }

    #[test]
    fn assign_to_undeclared_name_is_an_error() {
        let global = Frame::new_global();
        let result = Frame::assign(&global, "nope", Value::Number(1.0));
        assert!(matches!(result, Err(EnvError::NotDeclared(_))));
    }

    #[test]
    fn lookup_before_initializer_is_temporal_dead_zone_error() {
        let global = Frame::new_global();
        Frame::declare_lexical(&global, DeclKind::Let, "w", None).unwrap();
        assert!(matches!(Frame::lookup(&global, "w"), Err(EnvError::UseBeforeInit(_))));
    }

    #[test]
    fn assign_returns_old_value_and_observer_snapshot() {
        let global = Frame::new_global();
        Frame::declare_lexical(&global, DeclKind::Let, "c", Some(Value::Number(0.0))).unwrap();
        Frame::add_observer(&global, "c", Value::Number(999.0)).unwrap();
        let (old, observers) = Frame::assign(&global, "c", Value::Number(5.0)).unwrap();
        assert_eq!(old, Value::Number(0.0));
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn nested_function_frames_chain_to_global() {
        let global = Frame::new_global();
        Frame::declare_lexical(&global, DeclKind::Var, "g", Some(Value::Number(7.0))).unwrap();
        let inner = Frame::child_function(&global);
        assert_eq!(Frame::lookup(&inner, "g").unwrap(), Value::Number(7.0));
    }
}
