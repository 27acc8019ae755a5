//! Store access layer.
//!
//! A bounded connection pool, a scoped statement executor and a transaction
//! coordinator, over PostgreSQL (diesel_async + bb8) or an in-memory store.

mod connection;
mod executor;
pub mod memory;
mod pool;
mod statement;
mod transaction;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub use connection::DbConnection;
pub use memory::{MemoryStats, MemoryStore, MemoryTables};
pub use pool::{DbPool, PoolStatus, establish_async_connection_pool};
pub use statement::{Ping, Statement};
pub use transaction::TransactionState;

/// SQL migrations embedded at compile time.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
