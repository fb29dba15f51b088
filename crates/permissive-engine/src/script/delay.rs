use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use permissive_core::errors::guarded;
use permissive_core::traits::{Runnable, TickingScript};
use rand::Rng;

type Condition = Box<dyn FnMut() -> anyhow::Result<bool>>;

/// What the gate is currently waiting on. At most one at a time.
enum Pending {
    Idle,
    Fixed(u32),
    Until { cond: Condition, remaining: u32 },
    While { cond: Condition, remaining: u32 },
}

impl Pending {
    /// Advance by one tick. Returns the state to keep and whether this tick is suppressed.
    fn step(self) -> (Pending, bool) {
        match self {
            Pending::Idle => (Pending::Idle, false),
            Pending::Fixed(0) => (Pending::Idle, false),
            Pending::Fixed(1) => (Pending::Idle, true),
            Pending::Fixed(n) => (Pending::Fixed(n - 1), true),
            Pending::Until { mut cond, remaining } => {
                if check(&mut cond, "delay_until", false) {
                    return (Pending::Idle, false);
                }
                countdown(remaining, |remaining| Pending::Until { cond, remaining })
            }
            Pending::While { mut cond, remaining } => {
                if !check(&mut cond, "delay_while", true) {
                    return (Pending::Idle, false);
                }
                countdown(remaining, |remaining| Pending::While { cond, remaining })
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Pending::Idle => "idle",
            Pending::Fixed(_) => "fixed",
            Pending::Until { .. } => "until",
            Pending::While { .. } => "while",
        }
    }
}

/// Evaluate a wait condition; a fault yields `on_fault`, which keeps the wait going.
fn check(cond: &mut Condition, wait: &str, on_fault: bool) -> bool {
    match guarded(|| cond()) {
        Ok(value) => value,
        Err(fault) => {
            tracing::warn!(wait, kind = %fault.kind, error = %fault.detail, "wait condition faulted");
            on_fault
        }
    }
}

fn countdown(remaining: u32, keep: impl FnOnce(u32) -> Pending) -> (Pending, bool) {
    if remaining == 0 {
        tracing::debug!("wait timed out");
        (Pending::Idle, false)
    } else {
        (keep(remaining - 1), true)
    }
}

/// Shared handle for scheduling tick delays.
///
/// Cloned into whatever code wants to pause the script: leaf actions, the
/// runnable itself, or the host. Setting a new delay replaces the pending one.
#[derive(Clone)]
pub struct DelayHandle {
    pending: Rc<RefCell<Pending>>,
    generation: Rc<Cell<u64>>,
}

impl Default for DelayHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayHandle {
    pub fn new() -> Self {
        Self {
            pending: Rc::new(RefCell::new(Pending::Idle)),
            generation: Rc::new(Cell::new(0)),
        }
    }

    /// Suppress the next `ticks` ticks.
    pub fn delay(&self, ticks: u32) {
        self.replace(Pending::Fixed(ticks));
    }

    /// Suppress a uniformly random number of ticks in `[min, max]`.
    pub fn delay_between(&self, min: u32, max: u32) {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let ticks = rand::thread_rng().gen_range(lo..=hi);
        self.delay(ticks);
    }

    /// Suppress until `cond` holds, for at most `timeout_ticks` ticks.
    pub fn delay_until(&self, mut cond: impl FnMut() -> bool + 'static, timeout_ticks: u32) {
        self.try_delay_until(move || Ok(cond()), timeout_ticks);
    }

    pub fn try_delay_until(
        &self,
        cond: impl FnMut() -> anyhow::Result<bool> + 'static,
        timeout_ticks: u32,
    ) {
        self.replace(Pending::Until {
            cond: Box::new(cond),
            remaining: timeout_ticks,
        });
    }

    /// Suppress while `cond` holds, for at most `timeout_ticks` ticks.
    pub fn delay_while(&self, mut cond: impl FnMut() -> bool + 'static, timeout_ticks: u32) {
        self.try_delay_while(move || Ok(cond()), timeout_ticks);
    }

    pub fn try_delay_while(
        &self,
        cond: impl FnMut() -> anyhow::Result<bool> + 'static,
        timeout_ticks: u32,
    ) {
        self.replace(Pending::While {
            cond: Box::new(cond),
            remaining: timeout_ticks,
        });
    }

    pub fn cancel(&self) {
        self.replace(Pending::Idle);
    }

    pub fn is_delaying(&self) -> bool {
        !matches!(*self.pending.borrow(), Pending::Idle)
    }

    /// Advance the pending delay by one tick; true if this tick is suppressed.
    ///
    /// The slot is emptied while a wait condition runs, so the condition may
    /// itself schedule a new delay or cancel; either one wins over the
    /// stepped wait.
    pub fn poll(&self) -> bool {
        let generation = self.generation.get();
        let current = mem::replace(&mut *self.pending.borrow_mut(), Pending::Idle);
        let (next, suppressed) = current.step();
        if self.generation.get() == generation {
            *self.pending.borrow_mut() = next;
        }
        suppressed
    }

    fn replace(&self, next: Pending) {
        self.generation.set(self.generation.get().wrapping_add(1));
        *self.pending.borrow_mut() = next;
    }
}

impl fmt::Debug for DelayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.pending.borrow();
        let mut s = f.debug_struct("DelayHandle");
        s.field("pending", &pending.label());
        match &*pending {
            Pending::Fixed(n) => s.field("remaining", n),
            Pending::Until { remaining, .. } | Pending::While { remaining, .. } => {
                s.field("remaining", remaining)
            }
            Pending::Idle => &mut s,
        };
        s.finish()
    }
}

/// Tick gate in front of a [`Runnable`].
///
/// Each tick first resolves the pending delay; only an unsuppressed tick
/// reaches `do_run`. Wait timeouts release on the tick they run out: a wait
/// with `timeout_ticks = n` suppresses at most `n` ticks and the next tick runs.
pub struct DelayableScript<R: Runnable> {
    delays: DelayHandle,
    inner: R,
}

impl<R: Runnable> DelayableScript<R> {
    pub fn new(inner: R) -> Self {
        Self::with_handle(inner, DelayHandle::new())
    }

    /// Use a handle the runnable already holds a clone of.
    pub fn with_handle(inner: R, delays: DelayHandle) -> Self {
        Self { delays, inner }
    }

    pub fn delays(&self) -> &DelayHandle {
        &self.delays
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Run one tick. Returns true if `do_run` was invoked.
    pub fn tick(&mut self) -> bool {
        if self.delays.poll() {
            return false;
        }
        let inner = &mut self.inner;
        if let Err(fault) = guarded(|| {
            inner.do_run();
            Ok(())
        }) {
            tracing::error!(kind = %fault.kind, error = %fault.message, detail = %fault.detail, "tick faulted");
        }
        true
    }
}

impl<R: Runnable> TickingScript for DelayableScript<R> {
    fn on_tick(&mut self) {
        self.tick();
    }
}
