use std::cell::Cell;
use std::time::{Duration, Instant};

use crate::types::ResultType;

/// Freshness window used when no ttl is given.
pub const DEFAULT_TTL: Duration = Duration::from_millis(3000);

/// A time-boxed cache of one outcome.
///
/// The value is never mutated; callers replace the whole result on every
/// evaluation. While `holding` is set, [`EvaluationResult::result_type`]
/// returns the last classification it produced without checking freshness.
#[derive(Debug, Clone)]
pub struct EvaluationResult<T> {
    value: T,
    created_at: Instant,
    ttl: Duration,
    holding: Cell<bool>,
    last_type: Cell<ResultType>,
}

impl<T> EvaluationResult<T> {
    pub fn new(value: T) -> Self {
        Self::with_ttl(value, DEFAULT_TTL)
    }

    pub fn with_ttl(value: T, ttl: Duration) -> Self {
        Self::at(value, ttl, Instant::now())
    }

    /// Build a result stamped at an explicit instant.
    pub fn at(value: T, ttl: Duration, created_at: Instant) -> Self {
        Self {
            value,
            created_at,
            ttl,
            holding: Cell::new(false),
            last_type: Cell::new(ResultType::Expired),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.created_at.elapsed() <= self.ttl
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_holding(&self) -> bool {
        self.holding.get()
    }

    pub fn set_holding(&self, holding: bool) {
        self.holding.set(holding);
    }
}

impl EvaluationResult<bool> {
    pub fn result_type(&self) -> ResultType {
        if self.holding.get() {
            return self.last_type.get();
        }
        let classified = if self.is_valid() {
            ResultType::from_bool(self.value)
        } else {
            ResultType::Expired
        };
        self.last_type.set(classified);
        classified
    }
}
