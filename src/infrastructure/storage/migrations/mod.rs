//! Database migrations infrastructure

mod schema;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::domain::acl::{ResourceKind, MAX_PERMISSION_LEVEL};
use crate::domain::api_key::{IDENTIFIER_LENGTH, MAX_MEMO_LENGTH};
use crate::domain::DomainError;

pub use schema::{ColumnDef, ColumnType, Schema, SchemaOperation, TableSchema};

/// Table holding API keys
pub const API_KEYS_TABLE: &str = "api_keys";

/// Trait for running database migrations
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Runs all pending migrations, returning how many were applied
    async fn run(&self) -> Result<usize, DomainError>;

    /// Reverts the last applied migration, returning its version
    async fn revert(&self) -> Result<Option<i64>, DomainError>;

    /// Returns the current migration version
    async fn version(&self) -> Result<Option<i64>, DomainError>;

    /// Returns all applied migration versions
    async fn applied_versions(&self) -> Result<Vec<i64>, DomainError>;
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version, ascending
    pub version: i64,
    /// Human-readable description
    pub description: String,
    /// Operations applied when migrating forward
    pub up: Vec<SchemaOperation>,
    /// Operations applied when reverting
    pub down: Vec<SchemaOperation>,
}

impl Migration {
    pub fn new(
        version: i64,
        description: impl Into<String>,
        up: Vec<SchemaOperation>,
        down: Vec<SchemaOperation>,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            up,
            down,
        }
    }

    pub fn up_sql(&self) -> Vec<String> {
        self.up.iter().map(SchemaOperation::to_sql).collect()
    }

    pub fn down_sql(&self) -> Vec<String> {
        self.down.iter().map(SchemaOperation::to_sql).collect()
    }
}

/// PostgreSQL migrator. Each migration runs in its own transaction together
/// with its bookkeeping row in `_migrations`.
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
    migrations: Vec<Migration>,
}

impl PostgresMigrator {
    /// Migrator over this crate's migrations
    pub fn new(pool: PgPool) -> Self {
        Self::with_migrations(pool, api_key_migrations())
    }

    pub fn with_migrations(pool: PgPool, mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { pool, migrations }
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    async fn is_applied(&self, version: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))
    }

    /// Runs a single migration. Already applied migrations are skipped.
    pub async fn run_migration(&self, migration: &Migration) -> Result<bool, DomainError> {
        self.ensure_migrations_table().await?;

        if self.is_applied(migration.version).await? {
            debug!(version = migration.version, "Migration already applied");
            return Ok(false);
        }

        let fail = |e: sqlx::Error| {
            DomainError::storage(format!(
                "Failed to run migration {}: {}",
                migration.version, e
            ))
        };

        let mut tx = self.pool.begin().await.map_err(fail)?;

        for statement in migration.up_sql() {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
        }

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

        tx.commit().await.map_err(fail)?;

        info!(
            version = migration.version,
            description = %migration.description,
            "Migration applied"
        );

        Ok(true)
    }

    /// Reverts a single migration. Unapplied migrations are skipped.
    pub async fn revert_migration(&self, migration: &Migration) -> Result<bool, DomainError> {
        self.ensure_migrations_table().await?;

        if !self.is_applied(migration.version).await? {
            return Ok(false);
        }

        let fail = |e: sqlx::Error| {
            DomainError::storage(format!(
                "Failed to revert migration {}: {}",
                migration.version, e
            ))
        };

        let mut tx = self.pool.begin().await.map_err(fail)?;

        for statement in migration.down_sql() {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
        }

        sqlx::query("DELETE FROM _migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

        tx.commit().await.map_err(fail)?;

        info!(
            version = migration.version,
            description = %migration.description,
            "Migration reverted"
        );

        Ok(true)
    }
}

#[async_trait]
impl Migrator for PostgresMigrator {
    async fn run(&self) -> Result<usize, DomainError> {
        let mut applied = 0;

        for migration in &self.migrations {
            if self.run_migration(migration).await? {
                applied += 1;
            }
        }

        Ok(applied)
    }

    async fn revert(&self) -> Result<Option<i64>, DomainError> {
        let Some(version) = self.version().await? else {
            return Ok(None);
        };

        let migration = self
            .migrations
            .iter()
            .find(|m| m.version == version)
            .ok_or_else(|| {
                DomainError::not_found(format!("Migration {} is not known to this build", version))
            })?;

        self.revert_migration(migration).await?;

        Ok(Some(version))
    }

    async fn version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT MAX(version) FROM _migrations WHERE success = TRUE")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))
    }

    async fn applied_versions(&self) -> Result<Vec<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT version FROM _migrations WHERE success = TRUE ORDER BY version")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get applied migrations: {}", e)))
    }
}

fn permission_column(kind: ResourceKind) -> ColumnDef {
    ColumnDef::new(kind.column(), ColumnType::SmallInt)
        .default_value("0")
        .constraint(format!(
            "CHECK ({} BETWEEN 0 AND {})",
            kind.column(),
            MAX_PERMISSION_LEVEL
        ))
}

fn last_used_at_column() -> ColumnDef {
    ColumnDef::new("last_used_at", ColumnType::Timestamptz).nullable()
}

fn expires_at_column() -> ColumnDef {
    ColumnDef::new("expires_at", ColumnType::Timestamptz).nullable()
}

/// `api_keys` as first created, before the last-used evolution
fn api_keys_table() -> TableSchema {
    let mut columns = vec![
        ColumnDef::new("id", ColumnType::BigSerial).constraint("PRIMARY KEY"),
        ColumnDef::new("identifier", ColumnType::Char(IDENTIFIER_LENGTH as u16))
            .constraint("UNIQUE"),
        ColumnDef::new("token", ColumnType::Bytea),
        ColumnDef::new("user_id", ColumnType::BigInt)
            .constraint("REFERENCES users(id) ON DELETE CASCADE"),
        ColumnDef::new("allowed_ips", ColumnType::Jsonb).nullable(),
        ColumnDef::new("memo", ColumnType::Varchar(MAX_MEMO_LENGTH as u16)),
        expires_at_column(),
    ];

    columns.extend(ResourceKind::ALL.into_iter().map(permission_column));

    columns.push(ColumnDef::new("created_at", ColumnType::Timestamptz).default_value("NOW()"));
    columns.push(ColumnDef::new("updated_at", ColumnType::Timestamptz).default_value("NOW()"));

    TableSchema::new(API_KEYS_TABLE, columns)
}

/// Migrations owned by this crate. The `users` table belongs to the host
/// application and must exist before version 1 runs.
pub fn api_key_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create api_keys table",
            vec![SchemaOperation::CreateTable(api_keys_table())],
            vec![SchemaOperation::drop_table(API_KEYS_TABLE)],
        ),
        Migration::new(
            2,
            "Replace api_keys.expires_at with last_used_at",
            vec![
                SchemaOperation::add_column(API_KEYS_TABLE, last_used_at_column(), Some("memo")),
                SchemaOperation::drop_column(API_KEYS_TABLE, "expires_at"),
            ],
            vec![
                SchemaOperation::add_column(API_KEYS_TABLE, expires_at_column(), Some("memo")),
                SchemaOperation::drop_column(API_KEYS_TABLE, "last_used_at"),
            ],
        ),
    ]
}
