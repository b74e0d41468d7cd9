//! Shared infrastructure clients.
//!
//! - `postgres`: PostgreSQL connection pool

pub mod postgres;
