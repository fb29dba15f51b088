use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::branch::Branch;
use super::chained::ChainedActionLeaf;
use super::leaf::LeafNode;

/// Shared handle to a node. Trees may be DAGs, so nodes are reference counted.
pub type NodeRef = Rc<TreeNode>;

/// The closed set of node variants the traversal engine understands.
pub enum NodeKind {
    Branch(Branch),
    Leaf(LeafNode),
    Chained(ChainedActionLeaf),
}

/// A node of the decision tree: a description, where it was defined, the
/// result of its last validation, and its variant.
pub struct TreeNode {
    desc: String,
    defined_in: Option<String>,
    last_validation: Cell<bool>,
    kind: NodeKind,
}

impl TreeNode {
    pub fn new(desc: impl Into<String>, kind: NodeKind) -> NodeRef {
        Rc::new(Self {
            desc: desc.into(),
            defined_in: None,
            last_validation: Cell::new(false),
            kind,
        })
    }

    pub fn with_origin(
        desc: impl Into<String>,
        defined_in: impl Into<String>,
        kind: NodeKind,
    ) -> NodeRef {
        Rc::new(Self {
            desc: desc.into(),
            defined_in: Some(defined_in.into()),
            last_validation: Cell::new(false),
            kind,
        })
    }

    /// A leaf whose action reports success as `bool`.
    pub fn leaf(desc: impl Into<String>, action: impl FnMut() -> bool + 'static) -> NodeRef {
        Self::new(desc, NodeKind::Leaf(LeafNode::new(action)))
    }

    /// A leaf whose action can fail with an error.
    pub fn fallible_leaf(
        desc: impl Into<String>,
        action: impl FnMut() -> anyhow::Result<bool> + 'static,
    ) -> NodeRef {
        Self::new(desc, NodeKind::Leaf(LeafNode::fallible(action)))
    }

    /// A leaf whose action returns nothing and always counts as success.
    pub fn unit_leaf(desc: impl Into<String>, action: impl FnMut() + 'static) -> NodeRef {
        Self::new(desc, NodeKind::Leaf(LeafNode::unit(action)))
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn defined_in(&self) -> Option<&str> {
        self.defined_in.as_deref()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, NodeKind::Branch(_))
    }

    pub fn as_branch(&self) -> Option<&Branch> {
        match &self.kind {
            NodeKind::Branch(branch) => Some(branch),
            _ => None,
        }
    }

    pub fn as_chained(&self) -> Option<&ChainedActionLeaf> {
        match &self.kind {
            NodeKind::Chained(chain) => Some(chain),
            _ => None,
        }
    }

    /// Branches re-evaluate their interlocks; leaves report their last
    /// execution; chained leaves report whether the whole chain completed.
    pub fn validate(&self) -> bool {
        let valid = match &self.kind {
            NodeKind::Branch(branch) => branch.validate(&self.desc),
            NodeKind::Leaf(leaf) => leaf.validate(),
            NodeKind::Chained(chain) => chain.validate(),
        };
        self.last_validation.set(valid);
        valid
    }

    /// Perform this node's side effect. Branches have none.
    pub fn execute(&self) {
        match &self.kind {
            NodeKind::Branch(_) => {}
            NodeKind::Leaf(leaf) => leaf.execute(&self.desc),
            NodeKind::Chained(chain) => chain.execute(&self.desc),
        }
    }

    pub fn last_validation(&self) -> bool {
        self.last_validation.get()
    }

    pub fn success_node(&self) -> Option<NodeRef> {
        self.as_branch()
            .and_then(|branch| branch.success_node(&self.desc))
    }

    pub fn failure_node(&self) -> Option<NodeRef> {
        self.as_branch()
            .and_then(|branch| branch.failure_node(&self.desc))
    }

    /// Copy of this branch (same interlocks) routing to new children.
    pub fn with_children(&self, success: NodeRef, failure: NodeRef) -> Option<NodeRef> {
        let branch = self.as_branch()?.rewired(Some(success), Some(failure));
        Some(self.derive(NodeKind::Branch(branch)))
    }

    pub fn with_success(&self, success: NodeRef) -> Option<NodeRef> {
        let branch = self.as_branch()?.rewired(Some(success), None);
        Some(self.derive(NodeKind::Branch(branch)))
    }

    pub fn with_failure(&self, failure: NodeRef) -> Option<NodeRef> {
        let branch = self.as_branch()?.rewired(None, Some(failure));
        Some(self.derive(NodeKind::Branch(branch)))
    }

    fn derive(&self, kind: NodeKind) -> NodeRef {
        Rc::new(Self {
            desc: self.desc.clone(),
            defined_in: self.defined_in.clone(),
            last_validation: Cell::new(false),
            kind,
        })
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self.kind {
            NodeKind::Branch(_) => "branch",
            NodeKind::Leaf(_) => "leaf",
            NodeKind::Chained(_) => "chained",
        };
        f.debug_struct("TreeNode")
            .field("desc", &self.desc)
            .field("kind", &variant)
            .field("defined_in", &self.defined_in)
            .finish()
    }
}
