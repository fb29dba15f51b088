pub mod interlock;
pub mod permissive;

pub use interlock::Interlock;
pub use permissive::Permissive;
