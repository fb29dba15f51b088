/// Login-state side effects the break worker performs on the host session.
///
/// Implementations are called from the background worker thread.
pub trait SessionControl: Send + Sync {
    fn set_auto_login(&self, enabled: bool) -> anyhow::Result<()>;
    fn is_logged_in(&self) -> bool;
    fn in_combat(&self) -> bool;
    fn logout(&self) -> anyhow::Result<()>;
}

/// Work performed on a tick that no delay suppressed.
pub trait Runnable {
    fn do_run(&mut self);
}

/// The host's once-per-tick entry point. Must not panic or block.
pub trait TickingScript {
    fn on_tick(&mut self);
}
