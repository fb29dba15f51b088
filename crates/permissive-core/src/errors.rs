use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// How a collaborator call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    Error,
    Panic,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Error => write!(f, "error"),
            FaultKind::Panic => write!(f, "panic"),
        }
    }
}

/// A failure captured at the boundary of a predicate, leaf action, or chained step.
///
/// `message` is the top-level description; `detail` holds the full error chain,
/// or for a panic its location and backtrace (when one was captured), for the log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub detail: String,
}

impl Fault {
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            kind: FaultKind::Error,
            message: err.to_string(),
            detail: format!("{err:?}"),
        }
    }

    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            kind: FaultKind::Panic,
            detail: message.clone(),
            message,
        }
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_CAPTURE: Once = Once::new();

/// Chain a panic hook that records where the panic happened (and the
/// backtrace, when `RUST_BACKTRACE` enables one) for [`guarded`].
fn install_panic_capture() {
    PANIC_CAPTURE.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let mut trace = match info.location() {
                Some(location) => format!("panicked at {location}"),
                None => "panicked at unknown location".to_string(),
            };
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                trace.push('\n');
                trace.push_str(&backtrace.to_string());
            }
            let _ = PANIC_TRACE.try_with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Run collaborator code, turning both `Err` and panics into a [`Fault`].
pub fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Fault> {
    install_panic_capture();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Fault::from_error(&err)),
        Err(payload) => {
            let mut fault = Fault::from_panic(payload.as_ref());
            if let Some(trace) = PANIC_TRACE.with(|slot| slot.borrow_mut().take()) {
                fault.detail = format!("{}\n{trace}", fault.message);
            }
            Err(fault)
        }
    }
}

/// Three-way outcome of a condition check.
///
/// Keeps a faulted predicate distinguishable from one that legitimately
/// returned `false`, while [`Evaluation::is_satisfied`] collapses both to `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Satisfied,
    NotSatisfied,
    Faulted(Fault),
}

impl Evaluation {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Evaluation::Satisfied)
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Evaluation::Faulted(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Result<bool, Fault>> for Evaluation {
    fn from(outcome: Result<bool, Fault>) -> Self {
        match outcome {
            Ok(true) => Evaluation::Satisfied,
            Ok(false) => Evaluation::NotSatisfied,
            Err(fault) => Evaluation::Faulted(fault),
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Satisfied => write!(f, "Satisfied"),
            Evaluation::NotSatisfied => write!(f, "NotSatisfied"),
            Evaluation::Faulted(fault) => write!(f, "Faulted: {fault}"),
        }
    }
}

/// Failure that ended a traversal before a leaf ran.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraversalError {
    #[error("traversal exceeded depth {limit} at node '{desc}'")]
    DepthExceeded { limit: usize, desc: String },
    #[error("traversal faulted: {0}")]
    Faulted(Fault),
}

/// Settings file problems that stop loading outright.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{path}: settings document must be a JSON object")]
    NotAnObject { path: String },
}

/// One problem found while applying a settings document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SettingsIssue {
    pub field: String,
    pub message: String,
}

/// Structured result for `permctl config check --json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SettingsReport {
    pub file: String,
    pub pass: bool,
    pub applied: Vec<String>,
    pub warnings: Vec<SettingsIssue>,
}
