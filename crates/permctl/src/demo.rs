//! Simulated woodcutting agent used by `permctl simulate`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use permissive_core::traits::SessionControl;
use permissive_engine::condition::{Interlock, Permissive};
use permissive_engine::script::{DelayHandle, PermissiveScript, State};
use permissive_engine::tree::{Branch, ChainedActionLeaf, NodeRef, TreeNode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Game state the demo tree reads and mutates.
pub struct World {
    pub logs: Cell<u32>,
    pub capacity: u32,
    pub trees_nearby: Cell<u32>,
    pub logs_banked: Cell<u32>,
    pub bank_trips: Cell<u32>,
    rng: RefCell<StdRng>,
}

impl World {
    pub fn new(seed: u64, capacity: u32) -> Rc<Self> {
        Rc::new(Self {
            logs: Cell::new(0),
            capacity: capacity.max(1),
            trees_nearby: Cell::new(0),
            logs_banked: Cell::new(0),
            bank_trips: Cell::new(0),
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        })
    }

    fn chance(&self, p: f64) -> bool {
        self.rng.borrow_mut().gen_bool(p)
    }

    fn roll(&self, lo: u32, hi: u32) -> u32 {
        self.rng.borrow_mut().gen_range(lo..=hi)
    }
}

fn bank_trip(world: &Rc<World>) -> NodeRef {
    let walking = Rc::clone(world);
    let depositing = Rc::clone(world);
    ChainedActionLeaf::builder("bank_trip")
        .defined_in("demo::bank_trip")
        .step(move || walking.chance(0.6), 4)
        .step(|| true, 2)
        .step(
            move || {
                let logs = depositing.logs.replace(0);
                depositing.logs_banked.set(depositing.logs_banked.get() + logs);
                depositing.bank_trips.set(depositing.bank_trips.get() + 1);
                true
            },
            2,
        )
        .build()
}

fn chop(world: &Rc<World>, delays: &DelayHandle, bank: &NodeRef) -> NodeRef {
    let world = Rc::clone(world);
    let delays = delays.clone();
    let bank = Rc::clone(bank);
    TreeNode::leaf("chop_tree", move || {
        if let Some(chain) = bank.as_chained() {
            chain.reset();
        }
        delays.delay(world.roll(0, 2));
        if !world.chance(0.7) {
            return false;
        }
        world.logs.set(world.logs.get() + 1);
        if world.chance(0.25) {
            world.trees_nearby.set(world.trees_nearby.get().saturating_sub(1));
        }
        true
    })
}

/// Build the woodcutting script. The returned handle is the one its leaves delay through.
pub fn woodcutting(world: &Rc<World>) -> (PermissiveScript, DelayHandle) {
    let delays = DelayHandle::new();
    let bank = bank_trip(world);

    let full = {
        let w = Rc::clone(world);
        Permissive::new("backpack_full", move || w.logs.get() >= w.capacity)
    };
    let space = {
        let w = Rc::clone(world);
        Permissive::new("backpack_has_space", move || w.logs.get() < w.capacity)
    };
    let tree = {
        let w = Rc::clone(world);
        Permissive::new("tree_nearby", move || w.trees_nearby.get() > 0)
    };

    let finder = Rc::clone(world);
    let gather = Branch::builder("can_chop")
        .defined_in("demo::woodcutting")
        .interlock(Interlock::new("ready_to_chop", [space, tree]))
        .on_success(chop(world, &delays, &bank))
        .on_failure_with(move || {
            let spot = finder.roll(1, 3);
            let w = Rc::clone(&finder);
            Ok(TreeNode::unit_leaf(format!("walk_to_grove_{spot}"), move || {
                w.trees_nearby.set(spot);
            }))
        })
        .build();

    let root = Branch::builder("should_bank")
        .defined_in("demo::woodcutting")
        .interlock(Interlock::new("inventory_full", [full]))
        .on_success(bank)
        .on_failure(gather)
        .build();

    let mut script = PermissiveScript::new();
    script.init_states([
        State::new("woodcutting", root),
        State::empty("paused"),
    ]);
    script.set_status("gathering logs");
    (script, delays)
}

/// Session collaborator that only logs what a real client would do.
#[derive(Debug)]
pub struct ConsoleSession {
    logged_in: AtomicBool,
    auto_login: AtomicBool,
}

impl Default for ConsoleSession {
    fn default() -> Self {
        Self {
            logged_in: AtomicBool::new(true),
            auto_login: AtomicBool::new(true),
        }
    }
}

impl ConsoleSession {
    pub fn auto_login(&self) -> bool {
        self.auto_login.load(Ordering::SeqCst)
    }
}

impl SessionControl for ConsoleSession {
    fn set_auto_login(&self, enabled: bool) -> anyhow::Result<()> {
        self.auto_login.store(enabled, Ordering::SeqCst);
        if enabled {
            self.logged_in.store(true, Ordering::SeqCst);
        }
        tracing::info!(enabled, "session: auto-login");
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn in_combat(&self) -> bool {
        false
    }

    fn logout(&self) -> anyhow::Result<()> {
        self.logged_in.store(false, Ordering::SeqCst);
        tracing::info!("session: logged out");
        Ok(())
    }
}
