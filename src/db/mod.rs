//! SQLite persistence for referrals and deals.
//!
//! This module provides:
//! - Database initialization, pragmas and idempotent migrations
//! - The `Repository`, which also serves as the server-side deal store

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
