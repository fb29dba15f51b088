#![forbid(unsafe_code)]

pub mod errors;
pub mod evaluation;
pub mod settings;
pub mod state;
pub mod traits;
pub mod types;
