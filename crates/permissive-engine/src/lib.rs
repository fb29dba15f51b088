#![forbid(unsafe_code)]

pub mod breaks;
pub mod condition;
pub mod script;
pub mod state;
pub mod tree;
pub mod trip;
