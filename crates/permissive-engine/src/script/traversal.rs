use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use permissive_core::errors::{guarded, Fault, TraversalError};
use permissive_core::traits::Runnable;

use crate::tree::{NodeKind, NodeRef};

/// Nodes visited in one traversal before it is abandoned as cyclic.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// A named, switchable root of the decision tree with a free-text status.
#[derive(Debug, Clone)]
pub struct State {
    name: String,
    status: String,
    root: Option<NodeRef>,
}

impl State {
    pub fn new(name: impl Into<String>, root: NodeRef) -> Self {
        Self {
            name: name.into(),
            status: String::new(),
            root: Some(root),
        }
    }

    /// A state with no tree yet; ticks in it do nothing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: String::new(),
            root: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn root(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    pub fn set_root(&mut self, root: NodeRef) {
        self.root = Some(root);
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// The pre-tick hook declined (or faulted); nothing else ran.
    PreTickSkipped,
    /// No current state, or the current state has no root.
    NoRoot,
    /// The in-flight chain ran one step and is still going.
    ChainAdvanced { desc: String, progress: String },
    ChainCompleted { desc: String },
    /// The in-flight chain faulted outside its own steps and was dropped.
    ChainAbandoned { desc: String, fault: Fault },
    /// Traversal reached an incomplete chain; it is driven from the next tick.
    ChainActivated { desc: String },
    LeafExecuted { desc: String, succeeded: bool },
    /// A branch routed to a child that does not exist.
    DeadEnd { desc: String },
    Faulted(TraversalError),
}

impl TickReport {
    pub fn executed_leaf(&self) -> Option<&str> {
        match self {
            TickReport::LeafExecuted { desc, .. } => Some(desc),
            _ => None,
        }
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickReport::PreTickSkipped => write!(f, "pre-tick skipped"),
            TickReport::NoRoot => write!(f, "no root"),
            TickReport::ChainAdvanced { desc, progress } => write!(f, "chain '{desc}' ({progress})"),
            TickReport::ChainCompleted { desc } => write!(f, "chain '{desc}' completed"),
            TickReport::ChainAbandoned { desc, fault } => {
                write!(f, "chain '{desc}' abandoned: {fault}")
            }
            TickReport::ChainActivated { desc } => write!(f, "chain '{desc}' activated"),
            TickReport::LeafExecuted { desc, succeeded } => {
                let outcome = if *succeeded { "ok" } else { "failed" };
                write!(f, "leaf '{desc}' {outcome}")
            }
            TickReport::DeadEnd { desc } => write!(f, "dead end at '{desc}'"),
            TickReport::Faulted(err) => write!(f, "{err}"),
        }
    }
}

enum Walk {
    Activated(NodeRef),
    Executed { desc: String, succeeded: bool },
    DeadEnd(String),
}

/// Per-tick traversal engine over a set of named states.
///
/// Each tick either drives the in-flight chained action or walks the current
/// root until exactly one leaf runs.
pub struct PermissiveScript {
    states: HashMap<String, State>,
    current: Option<String>,
    active_chain: Option<NodeRef>,
    pre_tick: Option<Box<dyn FnMut() -> bool>>,
    max_depth: usize,
    ticks: u64,
    last_report: Option<TickReport>,
}

impl Default for PermissiveScript {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissiveScript {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            current: None,
            active_chain: None,
            pre_tick: None,
            max_depth: DEFAULT_MAX_DEPTH,
            ticks: 0,
            last_report: None,
        }
    }

    /// Register `states` and make the first one current.
    pub fn init_states(&mut self, states: impl IntoIterator<Item = State>) {
        let mut first = None;
        for state in states {
            if first.is_none() {
                first = Some(state.name.clone());
            }
            self.states.insert(state.name.clone(), state);
        }
        if first.is_some() {
            self.current = first;
        }
    }

    pub fn add_state(&mut self, state: State) {
        self.states.insert(state.name.clone(), state);
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn state_mut(&mut self, name: &str) -> Option<&mut State> {
        self.states.get_mut(name)
    }

    /// Switch to a registered state. Unknown names leave the current state alone.
    pub fn set_current_state(&mut self, name: &str) -> bool {
        if !self.states.contains_key(name) {
            tracing::warn!(state = name, "unknown state, keeping current");
            return false;
        }
        tracing::debug!(from = ?self.current, to = name, "switching state");
        self.current = Some(name.to_string());
        true
    }

    pub fn current_state(&self) -> Option<&State> {
        self.current.as_deref().and_then(|name| self.states.get(name))
    }

    pub fn status(&self) -> Option<&str> {
        self.current_state().map(State::status)
    }

    /// Set the current state's status. False when there is no current state.
    pub fn set_status(&mut self, status: impl Into<String>) -> bool {
        let Some(name) = self.current.as_deref() else {
            return false;
        };
        match self.states.get_mut(name) {
            Some(state) => {
                state.set_status(status);
                true
            }
            None => false,
        }
    }

    /// Runs at the start of every tick; returning false skips the tick.
    pub fn set_pre_tick(&mut self, hook: impl FnMut() -> bool + 'static) {
        self.pre_tick = Some(Box::new(hook));
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth.max(1);
    }

    pub fn active_chain(&self) -> Option<&NodeRef> {
        self.active_chain.as_ref()
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let report = self.run_tick();
        tracing::debug!(tick = self.ticks, state = ?self.current, "{report}");
        self.last_report = Some(report.clone());
        report
    }

    fn run_tick(&mut self) -> TickReport {
        if !self.pre_tick_passes() {
            return TickReport::PreTickSkipped;
        }

        if let Some(chain) = self.active_chain.clone() {
            return self.drive_chain(&chain);
        }

        let Some(root) = self.current_state().and_then(|s| s.root.clone()) else {
            return TickReport::NoRoot;
        };

        let max_depth = self.max_depth;
        match guarded(|| Ok(walk(&root, max_depth))) {
            Ok(Ok(Walk::Activated(node))) => {
                let desc = node.desc().to_string();
                tracing::debug!(node = %desc, "activating chained action");
                self.active_chain = Some(node);
                TickReport::ChainActivated { desc }
            }
            Ok(Ok(Walk::Executed { desc, succeeded })) => TickReport::LeafExecuted { desc, succeeded },
            Ok(Ok(Walk::DeadEnd(desc))) => TickReport::DeadEnd { desc },
            Ok(Err(err)) => {
                tracing::error!(error = %err, "traversal failed");
                TickReport::Faulted(err)
            }
            Err(fault) => {
                tracing::error!(kind = %fault.kind, error = %fault.message, detail = %fault.detail, "traversal faulted");
                TickReport::Faulted(TraversalError::Faulted(fault))
            }
        }
    }

    fn pre_tick_passes(&mut self) -> bool {
        let Some(hook) = self.pre_tick.as_mut() else {
            return true;
        };
        match guarded(|| Ok(hook())) {
            Ok(proceed) => proceed,
            Err(fault) => {
                tracing::warn!(kind = %fault.kind, error = %fault.message, "pre-tick hook faulted, skipping tick");
                false
            }
        }
    }

    fn drive_chain(&mut self, chain: &NodeRef) -> TickReport {
        let desc = chain.desc().to_string();
        let outcome = guarded(|| {
            chain.execute();
            Ok(chain.validate())
        });
        match outcome {
            Ok(true) => {
                self.active_chain = None;
                TickReport::ChainCompleted { desc }
            }
            Ok(false) => {
                let progress = chain
                    .as_chained()
                    .map(|c| c.progress())
                    .unwrap_or_default();
                TickReport::ChainAdvanced { desc, progress }
            }
            Err(fault) => {
                tracing::error!(node = %desc, kind = %fault.kind, error = %fault.message, "chained action faulted, abandoning");
                self.active_chain = None;
                TickReport::ChainAbandoned { desc, fault }
            }
        }
    }
}

fn walk(root: &NodeRef, max_depth: usize) -> Result<Walk, TraversalError> {
    let mut node = root.clone();
    for _ in 0..max_depth {
        match node.kind() {
            NodeKind::Chained(_) if !node.validate() => return Ok(Walk::Activated(Rc::clone(&node))),
            NodeKind::Chained(_) | NodeKind::Leaf(_) => {
                node.execute();
                return Ok(Walk::Executed {
                    desc: node.desc().to_string(),
                    succeeded: node.validate(),
                });
            }
            NodeKind::Branch(branch) => {
                let next = if node.validate() {
                    tracing::debug!(node = node.desc(), "validated, taking success path");
                    node.success_node()
                } else {
                    if let Some(out) = branch.first_out() {
                        tracing::debug!(
                            node = node.desc(),
                            interlock = %out.interlock,
                            permissive = ?out.permissive,
                            "failed validation, taking failure path"
                        );
                    }
                    node.failure_node()
                };
                match next {
                    Some(child) => node = child,
                    None => return Ok(Walk::DeadEnd(node.desc().to_string())),
                }
            }
        }
    }
    Err(TraversalError::DepthExceeded {
        limit: max_depth,
        desc: node.desc().to_string(),
    })
}

impl Runnable for PermissiveScript {
    fn do_run(&mut self) {
        self.tick();
    }
}
