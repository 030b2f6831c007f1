//! Leadflow — lead-qualification chat bot.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod followup;
pub mod leads;
pub mod sheets;
pub mod store;
pub mod templates;
