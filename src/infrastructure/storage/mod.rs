//! Storage infrastructure - connection pooling and migrations

pub mod migrations;
mod postgres;

pub use migrations::{
    api_key_migrations, Migration, Migrator, PostgresMigrator, SchemaOperation,
};
pub use postgres::{connect_pool, PostgresConfig};
