pub mod scheduler;
pub mod timer;
pub mod worker;

pub use scheduler::{BreakScheduler, DEFAULT_POLL_INTERVAL};
pub use timer::Countdown;
pub use worker::{WorkerEvent, WorkerHandle, WorkerMessage};
