//! User infrastructure module
//!
//! Owner lookups for API keys. Users themselves are managed elsewhere; this
//! crate only needs to know whether an owner exists.

mod postgres_repository;
mod repository;

pub use postgres_repository::PostgresUserDirectory;
pub use repository::InMemoryUserDirectory;
