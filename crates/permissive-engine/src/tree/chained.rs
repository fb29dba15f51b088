use std::cell::{Cell, RefCell};

use permissive_core::errors::guarded;

use super::leaf::log_action_fault;
use super::node::{NodeKind, NodeRef, TreeNode};

type StepAction = Box<dyn FnMut() -> anyhow::Result<bool>>;

/// One step of a chain: an action polled once per tick until it reports
/// success, allowed `timeout_ticks` failed polls.
pub struct ChainStep {
    action: StepAction,
    timeout_ticks: u32,
}

impl ChainStep {
    pub fn new(action: impl FnMut() -> anyhow::Result<bool> + 'static, timeout_ticks: u32) -> Self {
        Self {
            action: Box::new(action),
            timeout_ticks,
        }
    }

    pub fn timeout_ticks(&self) -> u32 {
        self.timeout_ticks
    }
}

/// A multi-tick transaction over an ordered list of steps.
///
/// Each execution polls the current step. Success advances to the next step;
/// failure uses up one tick of the step's budget. When a step exhausts its
/// budget, or faults, the whole chain restarts from the first step.
pub struct ChainedActionLeaf {
    steps: RefCell<Vec<ChainStep>>,
    len: usize,
    current: Cell<usize>,
    waited: Cell<u32>,
    completed: Cell<bool>,
}

impl ChainedActionLeaf {
    pub fn new(steps: Vec<ChainStep>) -> Self {
        Self {
            len: steps.len(),
            steps: RefCell::new(steps),
            current: Cell::new(0),
            waited: Cell::new(0),
            completed: Cell::new(false),
        }
    }

    pub fn builder(desc: impl Into<String>) -> ChainBuilder {
        ChainBuilder {
            desc: desc.into(),
            defined_in: None,
            steps: Vec::new(),
        }
    }

    pub(crate) fn execute(&self, desc: &str) {
        let index = self.current.get();
        if index >= self.len {
            self.completed.set(true);
            return;
        }

        let outcome = guarded(|| {
            let mut steps = self
                .steps
                .try_borrow_mut()
                .map_err(|_| anyhow::anyhow!("chain re-entered while executing"))?;
            let step = &mut steps[index];
            (step.action)()
        });

        match outcome {
            Ok(true) => {
                self.current.set(index + 1);
                self.waited.set(0);
                self.completed.set(index + 1 >= self.len);
                tracing::debug!(node = desc, progress = %self.progress(), "chain step succeeded");
            }
            Ok(false) => {
                let waited = self.waited.get() + 1;
                self.waited.set(waited);
                self.completed.set(false);
                if waited >= self.timeout_of(index) {
                    tracing::info!(node = desc, step = index, waited, "chain step timed out, restarting chain");
                    self.reset();
                }
            }
            Err(fault) => {
                log_action_fault(desc, &fault);
                self.reset();
            }
        }
    }

    fn timeout_of(&self, index: usize) -> u32 {
        self.steps
            .try_borrow()
            .ok()
            .and_then(|steps| steps.get(index).map(|s| s.timeout_ticks))
            .unwrap_or(0)
    }

    /// True exactly while the whole chain has finished.
    pub fn validate(&self) -> bool {
        self.completed.get()
    }

    /// Discard all progress and start again from the first step.
    pub fn reset(&self) {
        self.current.set(0);
        self.waited.set(0);
        self.completed.set(false);
    }

    pub fn current_index(&self) -> usize {
        self.current.get()
    }

    pub fn ticks_waited(&self) -> u32 {
        self.waited.get()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `"<completed steps>/<total steps>"`.
    pub fn progress(&self) -> String {
        format!("{}/{}", self.current.get().min(self.len), self.len)
    }
}

pub struct ChainBuilder {
    desc: String,
    defined_in: Option<String>,
    steps: Vec<ChainStep>,
}

impl ChainBuilder {
    pub fn defined_in(mut self, location: impl Into<String>) -> Self {
        self.defined_in = Some(location.into());
        self
    }

    pub fn step(self, mut action: impl FnMut() -> bool + 'static, timeout_ticks: u32) -> Self {
        self.fallible_step(move || Ok(action()), timeout_ticks)
    }

    pub fn fallible_step(
        mut self,
        action: impl FnMut() -> anyhow::Result<bool> + 'static,
        timeout_ticks: u32,
    ) -> Self {
        self.steps.push(ChainStep::new(action, timeout_ticks));
        self
    }

    pub fn build(self) -> NodeRef {
        let kind = NodeKind::Chained(ChainedActionLeaf::new(self.steps));
        match self.defined_in {
            Some(location) => TreeNode::with_origin(self.desc, location, kind),
            None => TreeNode::new(self.desc, kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn chain(node: &NodeRef) -> &ChainedActionLeaf {
        node.as_chained().unwrap()
    }

    #[test]
    fn advances_through_steps_across_ticks() {
        let polls = Rc::new(Cell::new(0));
        let second = Rc::clone(&polls);
        let node = ChainedActionLeaf::builder("bank_trip")
            .step(|| true, 1)
            .step(
                move || {
                    second.set(second.get() + 1);
                    second.get() >= 2
                },
                3,
            )
            .build();

        node.execute();
        assert_eq!(chain(&node).current_index(), 1);
        assert!(!node.validate());

        node.execute();
        assert_eq!(chain(&node).current_index(), 1);
        assert_eq!(chain(&node).ticks_waited(), 1);
        assert!(!node.validate());

        node.execute();
        assert!(node.validate());
        assert_eq!(chain(&node).progress(), "2/2");
    }

    #[test]
    fn timeout_resets_whole_chain() {
        let node = ChainedActionLeaf::builder("stuck")
            .step(|| true, 1)
            .step(|| false, 2)
            .build();

        node.execute();
        assert_eq!(chain(&node).current_index(), 1);
        node.execute();
        assert_eq!(chain(&node).ticks_waited(), 1);
        node.execute();
        assert_eq!(chain(&node).current_index(), 0);
        assert_eq!(chain(&node).ticks_waited(), 0);
        assert!(!node.validate());
    }

    #[test]
    fn always_false_step_never_completes() {
        let node = ChainedActionLeaf::builder("never").step(|| false, 2).build();
        node.execute();
        assert_eq!(chain(&node).ticks_waited(), 1);
        node.execute();
        assert_eq!(chain(&node).current_index(), 0);
        assert_eq!(chain(&node).ticks_waited(), 0);
        for _ in 0..10 {
            node.execute();
            assert!(!node.validate());
            assert_eq!(chain(&node).current_index(), 0);
        }
    }

    #[test]
    fn fault_resets_like_timeout() {
        let node = ChainedActionLeaf::builder("faulty")
            .step(|| true, 5)
            .fallible_step(|| anyhow::bail!("dialog closed"), 5)
            .build();
        node.execute();
        assert_eq!(chain(&node).current_index(), 1);
        node.execute();
        assert_eq!(chain(&node).current_index(), 0);
        assert!(!node.validate());
    }

    #[test]
    fn empty_chain_completes_on_first_execute() {
        let node = ChainedActionLeaf::builder("nothing").build();
        assert!(!node.validate());
        node.execute();
        assert!(node.validate());
        assert!(chain(&node).is_empty());
    }

    #[test]
    fn completed_chain_stays_completed_until_reset() {
        let node = ChainedActionLeaf::builder("once").step(|| true, 1).build();
        node.execute();
        assert!(node.validate());
        node.execute();
        assert!(node.validate());
        chain(&node).reset();
        assert!(!node.validate());
        assert_eq!(chain(&node).progress(), "0/1");
    }
}
