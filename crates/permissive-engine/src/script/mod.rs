pub mod delay;
pub mod traversal;

pub use delay::{DelayHandle, DelayableScript};
pub use traversal::{PermissiveScript, State, TickReport, DEFAULT_MAX_DEPTH};
