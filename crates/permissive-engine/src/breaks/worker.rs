use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use permissive_core::errors::guarded;
use permissive_core::traits::SessionControl;

/// What a break worker reports back to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    LoggedOut,
    /// The break elapsed and auto-login is back on.
    Finished,
    Cancelled,
    Failed(String),
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::LoggedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerMessage {
    pub break_id: u64,
    pub event: WorkerEvent,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BreakPlan {
    pub break_id: u64,
    pub duration: Duration,
    pub poll_interval: Duration,
}

/// Owner side of a running break worker.
#[derive(Debug)]
pub struct WorkerHandle {
    break_id: u64,
    cancel: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn break_id(&self) -> u64 {
        self.break_id
    }

    /// Wake the worker and make it stop. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel and wait for the thread to exit.
    pub fn join(mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!(break_id = self.break_id, "break worker thread panicked");
            }
        }
    }
}

pub(crate) fn spawn(
    plan: BreakPlan,
    session: Arc<dyn SessionControl>,
    events: Sender<WorkerMessage>,
) -> std::io::Result<WorkerHandle> {
    let (cancel_tx, cancel_rx) = mpsc::channel();
    let join = thread::Builder::new()
        .name(format!("break-{}", plan.break_id))
        .spawn(move || {
            let event = match guarded(|| run_break(&plan, session.as_ref(), &cancel_rx, &events)) {
                Ok(event) => event,
                Err(fault) => {
                    tracing::error!(
                        break_id = plan.break_id,
                        kind = %fault.kind,
                        error = %fault.detail,
                        "break worker failed, re-enabling auto-login"
                    );
                    if let Err(retry) = guarded(|| session.set_auto_login(true)) {
                        tracing::error!(
                            break_id = plan.break_id,
                            error = %retry.message,
                            "failed to re-enable auto-login after error"
                        );
                    }
                    WorkerEvent::Failed(fault.message)
                }
            };
            let _ = events.send(WorkerMessage {
                break_id: plan.break_id,
                event,
            });
        })?;
    Ok(WorkerHandle {
        break_id: plan.break_id,
        cancel: Some(cancel_tx),
        join: Some(join),
    })
}

fn run_break(
    plan: &BreakPlan,
    session: &dyn SessionControl,
    cancel: &Receiver<()>,
    events: &Sender<WorkerMessage>,
) -> anyhow::Result<WorkerEvent> {
    let id = plan.break_id;
    if cancel_pending(cancel) {
        tracing::info!(break_id = id, "break cancelled before it started");
        return Ok(WorkerEvent::Cancelled);
    }
    session
        .set_auto_login(false)
        .context("failed to disable auto-login")?;
    tracing::info!(break_id = id, "auto-login disabled");

    if session.is_logged_in() {
        while session.in_combat() {
            tracing::info!(break_id = id, "in combat, waiting before logout");
            if cancelled(cancel, plan.poll_interval) {
                tracing::info!(break_id = id, "break cancelled while waiting for combat to end");
                return abandon(id, session);
            }
        }
        if cancel_pending(cancel) {
            tracing::info!(break_id = id, "break cancelled before logout");
            return abandon(id, session);
        }
        session.logout().context("logout failed")?;
        tracing::info!(break_id = id, "logged out");
        let _ = events.send(WorkerMessage {
            break_id: id,
            event: WorkerEvent::LoggedOut,
        });
    }

    let deadline = Instant::now() + plan.duration;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if cancelled(cancel, plan.poll_interval.min(deadline - now)) {
            tracing::info!(break_id = id, "break cancelled");
            return abandon(id, session);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            tracing::info!(break_id = id, remaining_minutes = remaining.as_secs() / 60, "break in progress");
        }
    }

    session
        .set_auto_login(true)
        .context("failed to re-enable auto-login")?;
    tracing::info!(break_id = id, "break completed, auto-login enabled");
    Ok(WorkerEvent::Finished)
}

/// Undo this worker's auto-login change after a cancel.
///
/// The scheduler may already have re-enabled it, but this write lands after
/// the worker's own disable, so the session never stays locked out.
fn abandon(id: u64, session: &dyn SessionControl) -> anyhow::Result<WorkerEvent> {
    session
        .set_auto_login(true)
        .context("failed to re-enable auto-login after cancel")?;
    tracing::info!(break_id = id, "auto-login re-enabled after cancel");
    Ok(WorkerEvent::Cancelled)
}

/// Sleep up to `wait`; true if a cancel arrived or the owner went away.
fn cancelled(cancel: &Receiver<()>, wait: Duration) -> bool {
    match cancel.recv_timeout(wait) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

fn cancel_pending(cancel: &Receiver<()>) -> bool {
    !matches!(cancel.try_recv(), Err(TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Session that records calls and can fire the cancel from inside one.
    #[derive(Default)]
    struct ScriptedSession {
        calls: Mutex<Vec<String>>,
        cancel_on_disable: Mutex<Option<Sender<()>>>,
    }

    impl ScriptedSession {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SessionControl for ScriptedSession {
        fn set_auto_login(&self, enabled: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("auto_login({enabled})"));
            if !enabled {
                if let Some(tx) = self.cancel_on_disable.lock().unwrap().take() {
                    tx.send(()).unwrap();
                }
            }
            Ok(())
        }

        fn is_logged_in(&self) -> bool {
            true
        }

        fn in_combat(&self) -> bool {
            false
        }

        fn logout(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("logout".to_string());
            Ok(())
        }
    }

    fn plan() -> BreakPlan {
        BreakPlan {
            break_id: 1,
            duration: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn cancel_before_start_has_no_side_effects() {
        let session = ScriptedSession::default();
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();
        cancel_tx.send(()).unwrap();

        let event = run_break(&plan(), &session, &cancel_rx, &events_tx).unwrap();
        assert_eq!(event, WorkerEvent::Cancelled);
        assert!(session.calls().is_empty());
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn cancel_after_disable_skips_logout_and_restores_auto_login() {
        let session = ScriptedSession::default();
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();
        *session.cancel_on_disable.lock().unwrap() = Some(cancel_tx);

        let event = run_break(&plan(), &session, &cancel_rx, &events_tx).unwrap();
        assert_eq!(event, WorkerEvent::Cancelled);
        assert_eq!(session.calls(), vec!["auto_login(false)", "auto_login(true)"]);
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn cancel_during_sleep_restores_auto_login() {
        let session = ScriptedSession::default();
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel::<WorkerMessage>();

        let waker = thread::spawn(move || {
            let message = events_rx.recv().unwrap();
            assert_eq!(message.event, WorkerEvent::LoggedOut);
            cancel_tx.send(()).unwrap();
        });
        let event = run_break(&plan(), &session, &cancel_rx, &events_tx).unwrap();
        waker.join().unwrap();

        assert_eq!(event, WorkerEvent::Cancelled);
        assert_eq!(
            session.calls(),
            vec!["auto_login(false)", "logout", "auto_login(true)"]
        );
    }
}
