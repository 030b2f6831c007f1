//! Follow-up subsystem — reminder policy and the durable-aware scheduler.

pub mod engine;
pub mod policy;

pub use engine::{FollowupEngine, task_key};
pub use policy::ReminderPolicy;
