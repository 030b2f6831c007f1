//! Lead domain — the durable per-user record and its derived lifecycle phase.

pub mod model;

pub use model::{Lead, LeadPatch, LeadPhase};
