use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use permissive_core::errors::guarded;
use permissive_core::settings::{ApplyOutcome, BreakSettings};
use permissive_core::state::{BreakPhase, BreakSnapshot};
use permissive_core::traits::SessionControl;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use super::timer::Countdown;
use super::worker::{self, BreakPlan, WorkerEvent, WorkerHandle, WorkerMessage};

/// How often the worker wakes to re-check combat and log break progress.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Run/break duty cycle.
///
/// All state is owned here and only mutated from [`BreakScheduler::update`]
/// and the operator methods. The background worker reports back over a
/// channel; messages carry the id of the break they belong to and anything
/// from an earlier break is ignored.
pub struct BreakScheduler {
    settings: BreakSettings,
    session: Arc<dyn SessionControl>,
    rng: StdRng,
    run_timer: Countdown,
    break_timer: Option<Countdown>,
    in_break: bool,
    break_id: u64,
    worker: Option<WorkerHandle>,
    worker_done: bool,
    retired: Vec<WorkerHandle>,
    events_tx: Sender<WorkerMessage>,
    events_rx: Receiver<WorkerMessage>,
    poll_interval: Duration,
    last_break_started: Option<DateTime<Utc>>,
}

impl BreakScheduler {
    pub fn new(session: Arc<dyn SessionControl>, settings: BreakSettings) -> Self {
        Self::with_rng(session, settings, StdRng::from_entropy())
    }

    /// Deterministic durations, for simulations and tests.
    pub fn with_seed(session: Arc<dyn SessionControl>, settings: BreakSettings, seed: u64) -> Self {
        Self::with_rng(session, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(session: Arc<dyn SessionControl>, settings: BreakSettings, mut rng: StdRng) -> Self {
        let run = draw(
            &mut rng,
            settings.min_run_duration_minutes,
            settings.max_run_duration_minutes,
        );
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            settings,
            session,
            rng,
            run_timer: Countdown::new(run),
            break_timer: None,
            in_break: false,
            break_id: 0,
            worker: None,
            worker_done: false,
            retired: Vec::new(),
            events_tx,
            events_rx,
            poll_interval: DEFAULT_POLL_INTERVAL,
            last_break_started: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll once per host tick. Returns true when normal per-tick logic
    /// should run.
    pub fn update(&mut self) -> bool {
        self.drain_events();
        if !self.settings.enabled {
            return true;
        }

        if !self.in_break {
            if self.run_timer.has_expired() {
                self.start_break();
                return false;
            }
            return true;
        }

        let worker_alive = self.worker.as_ref().is_some_and(|w| !w.is_finished());
        if worker_alive && !self.worker_done {
            return false;
        }
        self.end_break();
        true
    }

    /// Start a break now. No-op when disabled or already on break.
    pub fn force_break(&mut self) -> bool {
        if self.in_break || !self.settings.enabled {
            return false;
        }
        self.run_timer.set_expired();
        self.start_break();
        true
    }

    /// End the current break and cancel its worker. No-op when not on break.
    pub fn end_break_early(&mut self) -> bool {
        if !self.in_break {
            return false;
        }
        self.end_break();
        true
    }

    fn start_break(&mut self) {
        self.in_break = true;
        self.break_id += 1;
        self.worker_done = false;

        let duration = draw(
            &mut self.rng,
            self.settings.min_break_duration_minutes,
            self.settings.max_break_duration_minutes,
        );
        self.break_timer = Some(Countdown::new(duration));
        self.settings.total_breaks_taken += 1;
        self.settings.total_break_time_ms += millis(duration);
        self.last_break_started = Some(Utc::now());

        tracing::info!(
            break_id = self.break_id,
            minutes = duration.as_secs() / 60,
            "starting break"
        );

        let plan = BreakPlan {
            break_id: self.break_id,
            duration,
            poll_interval: self.poll_interval,
        };
        match worker::spawn(plan, Arc::clone(&self.session), self.events_tx.clone()) {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => {
                tracing::error!(break_id = self.break_id, error = %err, "failed to spawn break worker");
                self.worker = None;
                self.worker_done = true;
            }
        }
    }

    fn end_break(&mut self) {
        self.in_break = false;
        if let Some(mut handle) = self.worker.take() {
            handle.cancel();
            self.retired.push(handle);
        }
        self.run_timer = Countdown::new(self.draw_run());

        if let Err(fault) = guarded(|| self.session.set_auto_login(true)) {
            tracing::warn!(error = %fault.message, "failed to enable auto-login");
        }
        tracing::info!(
            break_id = self.break_id,
            next_break_minutes = self.run_timer.duration().as_secs() / 60,
            "break ended"
        );
    }

    fn drain_events(&mut self) {
        while let Ok(message) = self.events_rx.try_recv() {
            if message.break_id != self.break_id || !self.in_break {
                tracing::debug!(break_id = message.break_id, event = ?message.event, "ignoring stale worker event");
                continue;
            }
            match &message.event {
                WorkerEvent::LoggedOut => tracing::debug!(break_id = message.break_id, "worker logged out"),
                WorkerEvent::Finished => tracing::debug!(break_id = message.break_id, "worker finished"),
                WorkerEvent::Cancelled => tracing::debug!(break_id = message.break_id, "worker cancelled"),
                WorkerEvent::Failed(reason) => {
                    tracing::warn!(break_id = message.break_id, reason = %reason, "worker failed")
                }
            }
            if message.event.is_terminal() {
                self.worker_done = true;
            }
        }
        self.retired.retain(|w| !w.is_finished());
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Disabling during a break ends it; enabling starts a fresh run timer.
    pub fn set_enabled(&mut self, enabled: bool) {
        let was = self.settings.enabled;
        self.settings.enabled = enabled;
        if enabled && !was && !self.in_break {
            self.run_timer = Countdown::new(self.draw_run());
        }
        if !enabled && self.in_break {
            self.end_break();
        }
    }

    pub fn set_min_break_minutes(&mut self, minutes: i64) {
        self.settings.set_min_break_minutes(minutes);
    }

    pub fn set_max_break_minutes(&mut self, minutes: i64) {
        self.settings.set_max_break_minutes(minutes);
    }

    pub fn set_min_run_minutes(&mut self, minutes: i64) {
        self.settings.set_min_run_minutes(minutes);
        self.revalidate_run_timer();
    }

    pub fn set_max_run_minutes(&mut self, minutes: i64) {
        self.settings.set_max_run_minutes(minutes);
        self.revalidate_run_timer();
    }

    /// Apply a settings document (see [`BreakSettings::apply_json`]) and
    /// bring the live timers in line with it.
    pub fn apply_settings_json(&mut self, document: &Value) -> ApplyOutcome {
        let was = self.settings.enabled;
        let outcome = self.settings.apply_json(document);
        let now = self.settings.enabled;
        self.settings.enabled = was;
        self.set_enabled(now);
        self.revalidate_run_timer();
        outcome
    }

    fn revalidate_run_timer(&mut self) {
        if !self.settings.enabled || self.in_break {
            return;
        }
        let current = self.run_timer.duration();
        let min = minutes(self.settings.min_run_duration_minutes);
        let max = minutes(self.settings.max_run_duration_minutes);
        if current < min || current > max {
            tracing::info!(
                current_minutes = current.as_secs() / 60,
                min = self.settings.min_run_duration_minutes,
                max = self.settings.max_run_duration_minutes,
                "pending run duration outside new range"
            );
            self.regenerate_run_duration();
        }
    }

    /// Draw a new run duration. Refused while on break.
    pub fn regenerate_run_duration(&mut self) -> bool {
        if self.in_break {
            tracing::warn!("cannot regenerate run duration while on break");
            return false;
        }
        self.run_timer = Countdown::new(self.draw_run());
        tracing::info!(minutes = self.run_timer.duration().as_secs() / 60, "new run duration");
        true
    }

    fn draw_run(&mut self) -> Duration {
        draw(
            &mut self.rng,
            self.settings.min_run_duration_minutes,
            self.settings.max_run_duration_minutes,
        )
    }

    pub fn settings(&self) -> &BreakSettings {
        &self.settings
    }

    pub fn is_in_break(&self) -> bool {
        self.in_break
    }

    pub fn break_id(&self) -> u64 {
        self.break_id
    }

    pub fn run_duration(&self) -> Duration {
        self.run_timer.duration()
    }

    pub fn remaining_run_time(&self) -> Duration {
        if self.in_break {
            Duration::ZERO
        } else {
            self.run_timer.remaining()
        }
    }

    pub fn remaining_break_time(&self) -> Duration {
        match (&self.break_timer, self.in_break) {
            (Some(timer), true) => timer.remaining(),
            _ => Duration::ZERO,
        }
    }

    pub fn reset_stats(&mut self) {
        self.settings.total_breaks_taken = 0;
        self.settings.total_break_time_ms = 0;
    }

    pub fn status(&self) -> String {
        if !self.settings.enabled {
            return "Disabled".to_string();
        }
        if self.in_break {
            format!("On Break ({} remaining)", min_sec(self.remaining_break_time()))
        } else {
            format!("Running ({} until break)", min_sec(self.remaining_run_time()))
        }
    }

    pub fn snapshot(&self) -> BreakSnapshot {
        BreakSnapshot {
            enabled: self.settings.enabled,
            phase: if self.in_break {
                BreakPhase::OnBreak
            } else {
                BreakPhase::Running
            },
            status: self.status(),
            remaining_run_ms: millis(self.remaining_run_time()),
            remaining_break_ms: millis(self.remaining_break_time()),
            total_breaks_taken: self.settings.total_breaks_taken,
            total_break_time_ms: self.settings.total_break_time_ms,
            break_id: (self.break_id > 0).then_some(self.break_id),
            last_break_started: self.last_break_started,
            taken_at: Utc::now(),
        }
    }

    /// Cancel every outstanding worker and wait for the threads to exit.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.worker.take() {
            handle.join();
        }
        for handle in self.retired.drain(..) {
            handle.join();
        }
    }
}

impl Drop for BreakScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn draw(rng: &mut impl Rng, min_minutes: u32, max_minutes: u32) -> Duration {
    let (lo, hi) = if min_minutes <= max_minutes {
        (min_minutes, max_minutes)
    } else {
        (max_minutes, min_minutes)
    };
    minutes(rng.gen_range(lo..=hi))
}

fn minutes(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 60)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn min_sec(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}
