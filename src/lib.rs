//! Fluent relational-data access over a server driver and an embedded
//! file driver, behind one handle.
//!
//! A [`Db`] is built from a [`config::DbConfig`], accumulates one query at
//! a time through `open(table)` plus fluent setters, and runs exactly one
//! terminal CRUD call per query. Results come back as an
//! [`envelope::Envelope`] whose payload is shaped (associative, numeric,
//! single-row, lazy) by the same fluent calls.

pub mod builder;
pub mod config;
pub mod crud;
pub mod db;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod materialize;
pub mod mysql;
pub mod pool;
pub mod results;
pub mod sqlite;
pub mod transaction;
pub mod types;

pub mod prelude;

pub use db::Db;
pub use error::DbError;
