use std::cell::{Ref, RefCell};
use std::fmt;

use permissive_core::errors::{guarded, Evaluation};
use permissive_core::evaluation::EvaluationResult;

type Predicate = Box<dyn Fn() -> anyhow::Result<bool>>;

/// A named boolean condition over game state.
///
/// Every call to [`Permissive::evaluate`] runs the predicate again and
/// replaces the cached [`EvaluationResult`]. A faulted predicate counts as
/// not met.
pub struct Permissive {
    name: String,
    predicate: Predicate,
    last_result: RefCell<EvaluationResult<bool>>,
}

impl Permissive {
    pub fn new(name: impl Into<String>, predicate: impl Fn() -> bool + 'static) -> Self {
        Self::fallible(name, move || Ok(predicate()))
    }

    pub fn fallible(
        name: impl Into<String>,
        predicate: impl Fn() -> anyhow::Result<bool> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            last_result: RefCell::new(EvaluationResult::new(false)),
        }
    }

    pub fn evaluate(&self) -> Evaluation {
        let evaluation = Evaluation::from(guarded(|| (self.predicate)()));
        if let Evaluation::Faulted(fault) = &evaluation {
            tracing::warn!(
                permissive = %self.name,
                kind = %fault.kind,
                error = %fault.detail,
                "predicate faulted, treating as not met"
            );
        }
        *self.last_result.borrow_mut() = EvaluationResult::new(evaluation.is_satisfied());
        evaluation
    }

    /// Evaluate and collapse to `bool`.
    pub fn get(&self) -> bool {
        self.evaluate().is_satisfied()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_result(&self) -> Ref<'_, EvaluationResult<bool>> {
        self.last_result.borrow()
    }
}

impl fmt::Debug for Permissive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permissive")
            .field("name", &self.name)
            .field("last", self.last_result.borrow().value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permissive_core::types::ResultType;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn get_recomputes_every_call() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let p = Permissive::new("has_logs", move || {
            counter.set(counter.get() + 1);
            counter.get() % 2 == 0
        });

        assert!(!p.get());
        assert!(p.get());
        assert!(!p.get());
        assert_eq!(calls.get(), 3);
        assert_eq!(p.last_result().result_type(), ResultType::NotMet);
    }

    #[test]
    fn error_is_reported_as_fault_and_false() {
        let p = Permissive::fallible("bank_open", || anyhow::bail!("interface not loaded"));
        let evaluation = p.evaluate();
        assert!(!evaluation.is_satisfied());
        assert_eq!(
            evaluation.fault().map(|f| f.message.as_str()),
            Some("interface not loaded")
        );
        assert!(!*p.last_result().value());
    }

    #[test]
    fn panic_is_swallowed() {
        let p = Permissive::new("npc_visible", || panic!("scene graph gone"));
        assert!(!p.get());
    }

    #[test]
    fn legitimate_false_is_not_a_fault() {
        let p = Permissive::new("in_combat", || false);
        assert_eq!(p.evaluate(), Evaluation::NotSatisfied);
    }
}
