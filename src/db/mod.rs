//! SQLite persistence for the tree, PV ledger, wallets, and review queues.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer with the atomic write paths

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
