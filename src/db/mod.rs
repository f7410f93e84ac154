//! Database module: a single-writer queue over SQLite plus the typed repositories on top.
//!
//! Layout:
//! - `queue.rs`: the store actor and `StoreHandle::submit`
//! - `connect.rs`: startup connection with linear backoff
//! - `schema.rs`: SQL DDL run at startup
//! - `models.rs`: row structs and the integer-backed enums
//! - `users.rs` / `hosts.rs`: repositories

pub mod connect;
pub mod hosts;
pub mod models;
pub mod queue;
pub mod schema;
pub mod users;

pub use hosts::HostStore;
pub use models::{DbHost, DbUser, Health, RedfishVersion};
pub use queue::{Operation, Outcome, Param, StoreHandle};
pub use users::{UserStore, normalize_email};
