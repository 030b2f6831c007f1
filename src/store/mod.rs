//! Persistence layer — libSQL-backed storage for leads.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::LeadStore;
