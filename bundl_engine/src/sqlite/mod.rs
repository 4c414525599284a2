//! `SqliteDatabase` is the concrete relational backend for the Bundl engine.
//!
//! It implements the [`CreditLedger`](crate::traits::CreditLedger), [`UserDirectory`](crate::traits::UserDirectory)
//! and [`OrderArchive`](crate::traits::OrderArchive) traits over a single connection pool.
pub mod db;
mod sqlite_impl;

pub use sqlite_impl::SqliteDatabase;
