pub mod branch;
pub mod chained;
pub mod leaf;
pub mod node;

pub use branch::{Branch, BranchBuilder, FirstOut};
pub use chained::{ChainBuilder, ChainStep, ChainedActionLeaf};
pub use leaf::LeafNode;
pub use node::{NodeKind, NodeRef, TreeNode};
