use std::cell::{Cell, RefCell};
use std::rc::Rc;

use permissive_core::errors::guarded;

use super::node::{NodeKind, NodeRef, TreeNode};
use crate::condition::Interlock;

type NodeSupplier = Rc<dyn Fn() -> anyhow::Result<NodeRef>>;
type InterlockSupplier = Rc<dyn Fn() -> anyhow::Result<Vec<Rc<Interlock>>>>;

/// A child reference: either fixed at construction or resolved by a
/// supplier on every access.
#[derive(Clone)]
enum Link {
    Fixed(Option<NodeRef>),
    Lazy {
        supplier: NodeSupplier,
        resolved: Option<NodeRef>,
    },
}

impl Link {
    fn resolve(&mut self, branch: &str, side: &str) -> Option<NodeRef> {
        match self {
            Link::Fixed(node) => node.clone(),
            Link::Lazy { supplier, resolved } => {
                match guarded(|| (**supplier)()) {
                    Ok(node) => *resolved = Some(node),
                    Err(fault) => tracing::warn!(
                        branch,
                        side,
                        error = %fault.detail,
                        "child supplier faulted, keeping previous node"
                    ),
                }
                resolved.clone()
            }
        }
    }
}

/// The interlock and permissive that stopped a branch from validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstOut {
    pub interlock: String,
    pub permissive: Option<String>,
}

/// A decision node. It is satisfied when any one of its interlocks is
/// fully active and routes to its success or failure child accordingly.
pub struct Branch {
    interlocks: RefCell<Vec<Rc<Interlock>>>,
    interlock_supplier: Option<InterlockSupplier>,
    active: Cell<Option<usize>>,
    last_evaluated: Cell<Option<usize>>,
    success: RefCell<Link>,
    failure: RefCell<Link>,
}

impl Branch {
    pub fn builder(desc: impl Into<String>) -> BranchBuilder {
        BranchBuilder {
            desc: desc.into(),
            defined_in: None,
            interlocks: Vec::new(),
            interlock_supplier: None,
            success: Link::Fixed(None),
            failure: Link::Fixed(None),
        }
    }

    /// Re-resolve interlocks, then take the first fully active one.
    ///
    /// Interlocks after the first active one are not evaluated.
    pub(crate) fn validate(&self, desc: &str) -> bool {
        let interlocks = self.refresh_interlocks(desc);
        self.active.set(None);
        self.last_evaluated.set(None);
        for (index, interlock) in interlocks.iter().enumerate() {
            self.last_evaluated.set(Some(index));
            if interlock.is_active() {
                self.active.set(Some(index));
                return true;
            }
        }
        false
    }

    fn refresh_interlocks(&self, desc: &str) -> Vec<Rc<Interlock>> {
        if let Some(supplier) = &self.interlock_supplier {
            match guarded(|| (**supplier)()) {
                Ok(fresh) => *self.interlocks.borrow_mut() = fresh,
                Err(fault) => tracing::warn!(
                    branch = desc,
                    error = %fault.detail,
                    "interlock supplier faulted, keeping previous interlocks"
                ),
            }
        }
        self.interlocks.borrow().clone()
    }

    pub(crate) fn success_node(&self, desc: &str) -> Option<NodeRef> {
        self.success.borrow_mut().resolve(desc, "success")
    }

    pub(crate) fn failure_node(&self, desc: &str) -> Option<NodeRef> {
        self.failure.borrow_mut().resolve(desc, "failure")
    }

    /// Interlocks as of the last validation.
    pub fn interlocks(&self) -> Vec<Rc<Interlock>> {
        self.interlocks.borrow().clone()
    }

    /// The interlock that satisfied the last validation, if any.
    pub fn active_interlock(&self) -> Option<Rc<Interlock>> {
        let index = self.active.get()?;
        self.interlocks.borrow().get(index).cloned()
    }

    /// The last interlock evaluated, when the last validation failed.
    pub fn first_out(&self) -> Option<FirstOut> {
        if self.active.get().is_some() {
            return None;
        }
        let index = self.last_evaluated.get()?;
        let interlocks = self.interlocks.borrow();
        let interlock = interlocks.get(index)?;
        Some(FirstOut {
            interlock: interlock.name().to_string(),
            permissive: interlock.first_out().map(|p| p.name().to_string()),
        })
    }

    /// Point this branch at new fixed children in place.
    pub fn set_children(&self, success: NodeRef, failure: NodeRef) {
        *self.success.borrow_mut() = Link::Fixed(Some(success));
        *self.failure.borrow_mut() = Link::Fixed(Some(failure));
    }

    pub(crate) fn rewired(&self, success: Option<NodeRef>, failure: Option<NodeRef>) -> Branch {
        let keep = |link: &RefCell<Link>, node: Option<NodeRef>| match node {
            Some(node) => Link::Fixed(Some(node)),
            None => link.borrow().clone(),
        };
        Branch {
            interlocks: RefCell::new(self.interlocks.borrow().clone()),
            interlock_supplier: self.interlock_supplier.clone(),
            active: Cell::new(None),
            last_evaluated: Cell::new(None),
            success: RefCell::new(keep(&self.success, success)),
            failure: RefCell::new(keep(&self.failure, failure)),
        }
    }
}

/// Builds a [`Branch`] node. Children and interlocks may be given directly
/// or as suppliers that are called again on every access.
pub struct BranchBuilder {
    desc: String,
    defined_in: Option<String>,
    interlocks: Vec<Rc<Interlock>>,
    interlock_supplier: Option<InterlockSupplier>,
    success: Link,
    failure: Link,
}

impl BranchBuilder {
    pub fn defined_in(mut self, location: impl Into<String>) -> Self {
        self.defined_in = Some(location.into());
        self
    }

    pub fn interlock(mut self, interlock: impl Into<Rc<Interlock>>) -> Self {
        self.interlocks.push(interlock.into());
        self
    }

    pub fn interlocks<I>(mut self, interlocks: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<Rc<Interlock>>,
    {
        self.interlocks
            .extend(interlocks.into_iter().map(Into::into));
        self
    }

    /// Replace the static interlocks with a supplier consulted on every validation.
    pub fn interlocks_with(
        mut self,
        supplier: impl Fn() -> anyhow::Result<Vec<Rc<Interlock>>> + 'static,
    ) -> Self {
        self.interlock_supplier = Some(Rc::new(supplier));
        self
    }

    pub fn on_success(mut self, node: NodeRef) -> Self {
        self.success = Link::Fixed(Some(node));
        self
    }

    pub fn on_success_with(
        mut self,
        supplier: impl Fn() -> anyhow::Result<NodeRef> + 'static,
    ) -> Self {
        self.success = Link::Lazy {
            supplier: Rc::new(supplier),
            resolved: None,
        };
        self
    }

    pub fn on_failure(mut self, node: NodeRef) -> Self {
        self.failure = Link::Fixed(Some(node));
        self
    }

    pub fn on_failure_with(
        mut self,
        supplier: impl Fn() -> anyhow::Result<NodeRef> + 'static,
    ) -> Self {
        self.failure = Link::Lazy {
            supplier: Rc::new(supplier),
            resolved: None,
        };
        self
    }

    pub fn build(self) -> NodeRef {
        let branch = Branch {
            interlocks: RefCell::new(self.interlocks),
            interlock_supplier: self.interlock_supplier,
            active: Cell::new(None),
            last_evaluated: Cell::new(None),
            success: RefCell::new(self.success),
            failure: RefCell::new(self.failure),
        };
        match self.defined_in {
            Some(location) => TreeNode::with_origin(self.desc, location, NodeKind::Branch(branch)),
            None => TreeNode::new(self.desc, NodeKind::Branch(branch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Permissive;
    use std::cell::Cell;

    fn flag_interlock(name: &str, value: bool, calls: &Rc<Cell<u32>>) -> Interlock {
        let calls = Rc::clone(calls);
        Interlock::new(
            name,
            [Permissive::new(format!("{name}_flag"), move || {
                calls.set(calls.get() + 1);
                value
            })],
        )
    }

    #[test]
    fn validates_when_any_interlock_is_active() {
        let calls = Rc::new(Cell::new(0));
        let node = Branch::builder("should_bank")
            .interlock(flag_interlock("full", false, &calls))
            .interlock(flag_interlock("low_hp", true, &calls))
            .build();

        assert!(node.validate());
        assert!(node.last_validation());
        let branch = node.as_branch().unwrap();
        assert_eq!(branch.active_interlock().unwrap().name(), "low_hp");
        assert!(branch.first_out().is_none());
    }

    #[test]
    fn stops_at_first_active_interlock() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let node = Branch::builder("b")
            .interlock(flag_interlock("a", true, &first))
            .interlock(flag_interlock("b", true, &second))
            .build();
        assert!(node.validate());
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
    }

    #[test]
    fn no_interlocks_never_validates() {
        let node = Branch::builder("empty").build();
        assert!(!node.validate());
        assert!(node.as_branch().unwrap().first_out().is_none());
    }

    #[test]
    fn first_out_reports_last_evaluated_interlock() {
        let calls = Rc::new(Cell::new(0));
        let node = Branch::builder("b")
            .interlock(flag_interlock("first", false, &calls))
            .interlock(flag_interlock("second", false, &calls))
            .build();
        assert!(!node.validate());
        let out = node.as_branch().unwrap().first_out().unwrap();
        assert_eq!(out.interlock, "second");
        assert_eq!(out.permissive.as_deref(), Some("second_flag"));
    }

    #[test]
    fn lazy_children_are_resolved_on_every_call() {
        let counter = Rc::new(Cell::new(0u32));
        let supplier_count = Rc::clone(&counter);
        let node = Branch::builder("nearest_target")
            .on_success_with(move || {
                supplier_count.set(supplier_count.get() + 1);
                Ok(TreeNode::leaf(
                    format!("target_{}", supplier_count.get()),
                    || true,
                ))
            })
            .build();

        assert_eq!(node.success_node().unwrap().desc(), "target_1");
        assert_eq!(node.success_node().unwrap().desc(), "target_2");
        assert_eq!(counter.get(), 2);
        assert!(node.failure_node().is_none());
    }

    #[test]
    fn failed_supplier_keeps_previous_child() {
        let fail = Rc::new(Cell::new(false));
        let should_fail = Rc::clone(&fail);
        let node = Branch::builder("b")
            .on_failure_with(move || {
                if should_fail.get() {
                    anyhow::bail!("pathfinder offline");
                }
                Ok(TreeNode::leaf("walk", || true))
            })
            .build();

        assert_eq!(node.failure_node().unwrap().desc(), "walk");
        fail.set(true);
        assert_eq!(node.failure_node().unwrap().desc(), "walk");
    }

    #[test]
    fn lazy_interlocks_are_rebuilt_each_validation() {
        let open = Rc::new(Cell::new(false));
        let reader = Rc::clone(&open);
        let node = Branch::builder("door")
            .interlocks_with(move || {
                let value = reader.get();
                Ok(vec![Rc::new(Interlock::new(
                    "door_open",
                    [Permissive::new("open", move || value)],
                ))])
            })
            .build();

        assert!(!node.validate());
        open.set(true);
        assert!(node.validate());
    }

    #[test]
    fn rewired_copies_share_interlocks() {
        let calls = Rc::new(Cell::new(0));
        let node = Branch::builder("b")
            .defined_in("woodcutting.rs")
            .interlock(flag_interlock("ok", true, &calls))
            .on_success(TreeNode::leaf("old", || true))
            .on_failure(TreeNode::leaf("fallback", || true))
            .build();

        let copy = node.with_success(TreeNode::leaf("new", || true)).unwrap();
        assert_eq!(copy.desc(), "b");
        assert_eq!(copy.defined_in(), Some("woodcutting.rs"));
        assert_eq!(copy.success_node().unwrap().desc(), "new");
        assert_eq!(copy.failure_node().unwrap().desc(), "fallback");
        assert!(copy.validate());
        assert_eq!(node.success_node().unwrap().desc(), "old");

        assert!(TreeNode::leaf("leaf", || true)
            .with_failure(TreeNode::leaf("x", || true))
            .is_none());
    }

    #[test]
    fn set_children_repoints_in_place() {
        let node = Branch::builder("b").build();
        node.as_branch().unwrap().set_children(
            TreeNode::leaf("yes", || true),
            TreeNode::leaf("no", || true),
        );
        assert_eq!(node.success_node().unwrap().desc(), "yes");
        assert_eq!(node.failure_node().unwrap().desc(), "no");
    }

    #[test]
    fn execute_on_branch_is_a_no_op() {
        let calls = Rc::new(Cell::new(0));
        let node = Branch::builder("b")
            .interlock(flag_interlock("a", true, &calls))
            .build();
        node.execute();
        assert_eq!(calls.get(), 0);
        assert!(!node.is_leaf());
    }
}
