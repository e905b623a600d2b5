//! Database backend implementations.
//!
//! Each backend is gated behind a feature flag.
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | SQLite | `sqlite` | Embedded database with JSON1, in-memory or file-backed |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use cfgstore_persistence::backends::sqlite::SqliteBackend;
//! # #[cfg(feature = "sqlite")]
//! use cfgstore_persistence::model::catalog;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory SQLite backend
//! let backend = SqliteBackend::in_memory(catalog::registry()?)?;
//!
//! // Or use a file-based database
//! let backend = SqliteBackend::open("./data/config.db", catalog::registry()?)?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;
