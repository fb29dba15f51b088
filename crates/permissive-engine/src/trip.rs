use std::time::Duration;

use permissive_core::errors::guarded;
use permissive_core::evaluation::EvaluationResult;

/// Trips after `required` pulses that each arrive within `window` of the
/// previous one. A late pulse starts the count again at one.
pub struct PulseToTrip {
    count: EvaluationResult<u32>,
    required: u32,
    window: Duration,
    tripped: bool,
    action: Box<dyn FnMut() -> anyhow::Result<()>>,
}

impl PulseToTrip {
    pub fn new(required: u32, window: Duration, mut action: impl FnMut() + 'static) -> Self {
        Self::fallible(required, window, move || {
            action();
            Ok(())
        })
    }

    pub fn fallible(
        required: u32,
        window: Duration,
        action: impl FnMut() -> anyhow::Result<()> + 'static,
    ) -> Self {
        Self {
            count: EvaluationResult::with_ttl(0, window),
            required: required.max(1),
            window,
            tripped: false,
            action: Box::new(action),
        }
    }

    pub fn send_pulse(&mut self) {
        let next = if self.count.is_valid() {
            self.count.value().saturating_add(1)
        } else {
            1
        };
        self.count = EvaluationResult::with_ttl(next, self.window);
        if next >= self.required {
            self.tripped = true;
        }
    }

    pub fn has_tripped(&self) -> bool {
        self.tripped
    }

    pub fn pulses(&self) -> u32 {
        if self.count.is_valid() {
            *self.count.value()
        } else {
            0
        }
    }

    /// Run the trip action. Returns false if it faulted.
    pub fn run_trip_action(&mut self) -> bool {
        let action = &mut self.action;
        match guarded(|| action()) {
            Ok(()) => true,
            Err(fault) => {
                tracing::error!(kind = %fault.kind, error = %fault.detail, "trip action faulted");
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.count = EvaluationResult::with_ttl(0, self.window);
        self.tripped = false;
    }
}
