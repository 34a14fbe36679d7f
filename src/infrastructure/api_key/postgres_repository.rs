//! PostgreSQL API key repository implementation

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::acl::ResourceKind;
use crate::domain::api_key::{ApiKey, ApiKeyRecord, ApiKeyRepository, KeyChanges, KeyIdentifier};
use crate::domain::{DomainError, UserId};

/// PostgreSQL implementation of ApiKeyRepository.
///
/// Each resource kind has its own `r_<kind>` column; the column list is
/// derived from `ResourceKind::ALL`.
#[derive(Debug, Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn permission_columns() -> String {
    ResourceKind::ALL
        .iter()
        .map(|kind| kind.column())
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_columns() -> String {
    format!(
        "identifier, token, user_id, allowed_ips, memo, {}, last_used_at, created_at, updated_at",
        permission_columns()
    )
}

/// `UPDATE` touching `updated_at` ($2) and the changed columns only, in
/// the order memo, allowed_ips, then the listed permissions
fn update_statement(changes: &KeyChanges) -> String {
    let mut assignments = vec!["updated_at = $2".to_string()];
    let mut next = 3;

    let mut assign = |column: &str| {
        assignments.push(format!("{} = ${}", column, next));
        next += 1;
    };

    if changes.memo {
        assign("memo");
    }
    if changes.allowed_ips {
        assign("allowed_ips");
    }
    for kind in &changes.permissions {
        assign(kind.column());
    }

    format!(
        "UPDATE api_keys SET {} WHERE identifier = $1 RETURNING {}",
        assignments.join(", "),
        select_columns()
    )
}

fn map_write_error(action: &str, identifier: &KeyIdentifier, e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return DomainError::conflict(format!(
                "API key with identifier '{}' already exists",
                identifier
            ));
        }
        if db.is_foreign_key_violation() {
            return DomainError::integrity("owner_id", "user does not exist");
        }
        if db.is_check_violation() {
            return DomainError::integrity("permissions", db.message().to_string());
        }
    }

    DomainError::storage(format!("Failed to {} API key: {}", action, e))
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn get(&self, identifier: &KeyIdentifier) -> Result<Option<ApiKey>, DomainError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE identifier = $1",
            select_columns()
        );

        let row = sqlx::query(&sql)
            .bind(identifier.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get API key: {}", e)))?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        // 5 leading columns, one per resource kind, 3 timestamps
        let placeholders: Vec<String> = (1..=5 + ResourceKind::COUNT + 3)
            .map(|i| format!("${}", i))
            .collect();

        let sql = format!(
            "INSERT INTO api_keys ({}) VALUES ({})",
            select_columns(),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql)
            .bind(api_key.identifier().as_str())
            .bind(api_key.token().as_bytes())
            .bind(api_key.owner_id().as_i64())
            .bind(api_key.allowed_ips().map(|ips| ips.to_json()))
            .bind(api_key.memo());

        for kind in ResourceKind::ALL {
            query = query.bind(i16::from(api_key.permission(kind).as_u8()));
        }

        query
            .bind(api_key.last_used_at())
            .bind(api_key.created_at())
            .bind(api_key.updated_at())
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error("create", api_key.identifier(), e))?;

        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey, changes: &KeyChanges) -> Result<ApiKey, DomainError> {
        let sql = update_statement(changes);

        let mut query = sqlx::query(&sql)
            .bind(api_key.identifier().as_str())
            .bind(api_key.updated_at());

        if changes.memo {
            query = query.bind(api_key.memo());
        }
        if changes.allowed_ips {
            query = query.bind(api_key.allowed_ips().map(|ips| ips.to_json()));
        }
        for kind in &changes.permissions {
            query = query.bind(i16::from(api_key.permission(*kind).as_u8()));
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error("update", api_key.identifier(), e))?
            .ok_or_else(|| {
                DomainError::not_found(format!("API key '{}' not found", api_key.identifier()))
            })?;

        row_to_api_key(&row)
    }

    async fn delete(&self, identifier: &KeyIdentifier) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE identifier = $1")
            .bind(identifier.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete API key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, owner: Option<UserId>) -> Result<Vec<ApiKey>, DomainError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE ($1::BIGINT IS NULL OR user_id = $1) \
             ORDER BY created_at, identifier",
            select_columns()
        );

        let rows = sqlx::query(&sql)
            .bind(owner.map(|o| o.as_i64()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list API keys: {}", e)))?;

        rows.iter().map(row_to_api_key).collect()
    }

    async fn count(&self, owner: Option<UserId>) -> Result<usize, DomainError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM api_keys WHERE ($1::BIGINT IS NULL OR user_id = $1)",
        )
        .bind(owner.map(|o| o.as_i64()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to count API keys: {}", e)))?;

        Ok(count as usize)
    }

    async fn exists(&self, identifier: &KeyIdentifier) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM api_keys WHERE identifier = $1)")
            .bind(identifier.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check API key: {}", e)))
    }

    async fn record_usage(
        &self,
        identifier: &KeyIdentifier,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE identifier = $1")
            .bind(identifier.as_str())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to record API key usage: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                identifier
            )));
        }

        Ok(())
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DomainError::storage(format!("Failed to read column {}: {}", name, e)))
}

fn row_to_api_key(row: &PgRow) -> Result<ApiKey, DomainError> {
    let mut permissions = BTreeMap::new();

    for kind in ResourceKind::ALL {
        let level: i16 = column(row, kind.column())?;
        permissions.insert(kind.as_str().to_string(), i64::from(level));
    }

    let record = ApiKeyRecord {
        identifier: Some(column(row, "identifier")?),
        token: Some(column(row, "token")?),
        owner_id: Some(column(row, "user_id")?),
        allowed_ips: column(row, "allowed_ips")?,
        memo: column(row, "memo")?,
        permissions,
        last_used_at: column(row, "last_used_at")?,
        created_at: Some(column(row, "created_at")?),
        updated_at: Some(column(row, "updated_at")?),
    };

    ApiKey::restore(record)
}
