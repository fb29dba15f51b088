use std::cell::{Cell, RefCell};
use std::rc::Rc;

use permissive_core::evaluation::EvaluationResult;
use permissive_core::types::ResultType;

use super::permissive::Permissive;

/// A named AND-group of permissives.
///
/// Permissives are checked in order and evaluation stops at the first one
/// that is not met; that one is remembered as the first-out until the next
/// call to [`Interlock::is_active`].
#[derive(Debug)]
pub struct Interlock {
    name: String,
    permissives: Vec<Rc<Permissive>>,
    status: RefCell<EvaluationResult<bool>>,
    first_out: Cell<Option<usize>>,
}

impl Interlock {
    pub fn new<P>(name: impl Into<String>, permissives: impl IntoIterator<Item = P>) -> Self
    where
        P: Into<Rc<Permissive>>,
    {
        Self {
            name: name.into(),
            permissives: permissives.into_iter().map(Into::into).collect(),
            status: RefCell::new(EvaluationResult::new(false)),
            first_out: Cell::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        for (index, permissive) in self.permissives.iter().enumerate() {
            if !permissive.get() {
                self.first_out.set(Some(index));
                *self.status.borrow_mut() = EvaluationResult::new(false);
                return false;
            }
        }
        self.first_out.set(None);
        *self.status.borrow_mut() = EvaluationResult::new(true);
        true
    }

    /// The permissive that failed during the most recent evaluation.
    pub fn first_out(&self) -> Option<&Permissive> {
        self.first_out
            .get()
            .and_then(|index| self.permissives.get(index))
            .map(Rc::as_ref)
    }

    pub fn extend<P>(&mut self, permissives: impl IntoIterator<Item = P>)
    where
        P: Into<Rc<Permissive>>,
    {
        self.permissives
            .extend(permissives.into_iter().map(Into::into));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permissives(&self) -> &[Rc<Permissive>] {
        &self.permissives
    }

    pub fn result_type(&self) -> ResultType {
        self.status.borrow().result_type()
    }
}
