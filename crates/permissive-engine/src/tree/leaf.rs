use std::cell::{Cell, RefCell};

use permissive_core::errors::{guarded, Fault};

type Action = Box<dyn FnMut() -> anyhow::Result<bool>>;

/// Terminal node performing one side effect per execution.
///
/// The outcome of the last execution is what [`LeafNode::validate`] reports;
/// it is not time-boxed.
pub struct LeafNode {
    action: RefCell<Action>,
    succeeded: Cell<bool>,
}

impl LeafNode {
    pub fn new(mut action: impl FnMut() -> bool + 'static) -> Self {
        Self::fallible(move || Ok(action()))
    }

    pub fn fallible(action: impl FnMut() -> anyhow::Result<bool> + 'static) -> Self {
        Self {
            action: RefCell::new(Box::new(action)),
            succeeded: Cell::new(false),
        }
    }

    pub fn unit(mut action: impl FnMut() + 'static) -> Self {
        Self::fallible(move || {
            action();
            Ok(true)
        })
    }

    pub(crate) fn execute(&self, desc: &str) {
        let outcome = guarded(|| {
            let mut action = self
                .action
                .try_borrow_mut()
                .map_err(|_| anyhow::anyhow!("leaf re-entered while executing"))?;
            (*action)()
        });
        match outcome {
            Ok(succeeded) => self.succeeded.set(succeeded),
            Err(fault) => {
                log_action_fault(desc, &fault);
                self.succeeded.set(false);
            }
        }
    }

    pub fn validate(&self) -> bool {
        self.succeeded.get()
    }
}

pub(crate) fn log_action_fault(desc: &str, fault: &Fault) {
    tracing::error!(
        node = desc,
        kind = %fault.kind,
        error = %fault.message,
        detail = %fault.detail,
        "leaf action faulted"
    );
}
