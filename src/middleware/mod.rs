pub mod actor;
pub mod tracing;

pub use actor::{ActingUser, Capability, Operation};
