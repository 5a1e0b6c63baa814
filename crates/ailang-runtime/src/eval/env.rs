//! Evaluation environments
//!
//! A chain of frames with `Rc` parent links. Closures capture their
//! defining environment by cloning the chain head. `LetRec` frames are
//! created with placeholder slots first and filled in after each binding
//! evaluates, so self and mutual references resolve.

use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One scope frame
#[derive(Debug)]
struct Frame {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Frame>>,
}

/// An environment: a shared chain of frames
#[derive(Debug, Clone)]
pub struct Env {
    head: Rc<Frame>,
}

impl Env {
    /// Create an empty root environment
    pub fn new() -> Self {
        Self {
            head: Rc::new(Frame {
                vars: RefCell::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// Create a child environment with a fresh frame
    pub fn child(&self) -> Env {
        Env {
            head: Rc::new(Frame {
                vars: RefCell::new(HashMap::new()),
                parent: Some(Rc::clone(&self.head)),
            }),
        }
    }

    /// Bind a name in the current frame
    pub fn bind(&self, name: impl Into<String>, value: Value) {
        self.head.vars.borrow_mut().insert(name.into(), value);
    }

    /// Look up a name, walking outward through parent frames
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = Some(&self.head);
        while let Some(current) = frame {
            if let Some(value) = current.vars.borrow().get(name) {
                return Some(value.clone());
            }
            frame = current.parent.as_ref();
        }
        None
    }

    /// Overwrite a binding in the current frame; used to fill `LetRec`
    /// placeholder slots
    pub fn fill(&self, name: &str, value: Value) {
        self.head.vars.borrow_mut().insert(name.to_string(), value);
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
