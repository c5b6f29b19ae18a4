//! Storage layer: the store traits the domain services depend on, and the
//! SQLite implementation behind them.
//!
//! The domain layer only ever sees `Arc<dyn ...Store>` handles, so tests can
//! substitute a store (e.g. one that fails on purpose) without touching the
//! services.

pub mod sqlite;
pub mod traits;

pub use sqlite::DbConnection;
pub use traits::*;
