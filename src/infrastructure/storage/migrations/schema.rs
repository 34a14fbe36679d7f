//! Structural schema operations
//!
//! A migration is a list of `SchemaOperation` values. Each operation can be
//! rendered as PostgreSQL DDL or applied to an in-memory `Schema`, which is
//! how reversibility is checked without a database.
//!
//! Every operation is idempotent: adding a column that exists, dropping one
//! that does not, creating an existing table or dropping a missing one all
//! leave the schema unchanged.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::DomainError;

/// Column storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigSerial,
    BigInt,
    SmallInt,
    Char(u16),
    Varchar(u16),
    Bytea,
    Jsonb,
    Timestamptz,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigSerial => f.write_str("BIGSERIAL"),
            Self::BigInt => f.write_str("BIGINT"),
            Self::SmallInt => f.write_str("SMALLINT"),
            Self::Char(n) => write!(f, "CHAR({})", n),
            Self::Varchar(n) => write!(f, "VARCHAR({})", n),
            Self::Bytea => f.write_str("BYTEA"),
            Self::Jsonb => f.write_str("JSONB"),
            Self::Timestamptz => f.write_str("TIMESTAMPTZ"),
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<String>,
    /// Trailing constraint clause (`PRIMARY KEY`, `UNIQUE`, `CHECK (..)`, `REFERENCES ..`)
    pub constraint: Option<String>,
}

impl ColumnDef {
    /// A NOT NULL column with no default
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
            constraint: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Column definition as it appears inside `CREATE TABLE` / `ADD COLUMN`
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.column_type);

        if !self.nullable && self.column_type != ColumnType::BigSerial {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some(constraint) = &self.constraint {
            sql.push(' ');
            sql.push_str(constraint);
        }

        sql
    }
}

/// Table in the in-memory schema model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn add_column(&mut self, column: &ColumnDef, after: Option<&str>) {
        if self.has_column(&column.name) {
            return;
        }

        let position = after
            .and_then(|name| self.columns.iter().position(|c| c.name == name))
            .map(|index| index + 1)
            .unwrap_or(self.columns.len());

        self.columns.insert(position, column.clone());
    }

    fn drop_column(&mut self, name: &str) {
        self.columns.retain(|c| c.name != name);
    }
}

/// One reversible structural change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOperation {
    CreateTable(TableSchema),
    DropTable {
        table: String,
    },
    /// `after` positions the column in the model. PostgreSQL always appends,
    /// so it does not appear in the rendered DDL.
    AddColumn {
        table: String,
        column: ColumnDef,
        after: Option<String>,
    },
    DropColumn {
        table: String,
        column: String,
    },
}

impl SchemaOperation {
    pub fn add_column(table: impl Into<String>, column: ColumnDef, after: Option<&str>) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
            after: after.map(str::to_string),
        }
    }

    pub fn drop_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DropColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn drop_table(table: impl Into<String>) -> Self {
        Self::DropTable {
            table: table.into(),
        }
    }

    /// Render as a single PostgreSQL statement
    pub fn to_sql(&self) -> String {
        match self {
            Self::CreateTable(table) => {
                let columns: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| format!("    {}", c.to_sql()))
                    .collect();

                format!(
                    "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
                    table.name,
                    columns.join(",\n")
                )
            }
            Self::DropTable { table } => format!("DROP TABLE IF EXISTS {}", table),
            Self::AddColumn { table, column, .. } => format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                table,
                column.to_sql()
            ),
            Self::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN IF EXISTS {}", table, column)
            }
        }
    }
}

/// In-memory model of a set of tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Apply one operation. Column changes on a missing table fail.
    pub fn apply(&mut self, operation: &SchemaOperation) -> Result<(), DomainError> {
        match operation {
            SchemaOperation::CreateTable(table) => {
                self.tables
                    .entry(table.name.clone())
                    .or_insert_with(|| table.clone());
            }
            SchemaOperation::DropTable { table } => {
                self.tables.remove(table);
            }
            SchemaOperation::AddColumn {
                table,
                column,
                after,
            } => {
                self.table_mut(table)?.add_column(column, after.as_deref());
            }
            SchemaOperation::DropColumn { table, column } => {
                self.table_mut(table)?.drop_column(column);
            }
        }

        Ok(())
    }

    pub fn apply_all(&mut self, operations: &[SchemaOperation]) -> Result<(), DomainError> {
        operations.iter().try_for_each(|op| self.apply(op))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableSchema, DomainError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DomainError::not_found(format!("Table '{}' does not exist", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widgets() -> TableSchema {
        TableSchema::new(
            "widgets",
            vec![
                ColumnDef::new("id", ColumnType::BigSerial).constraint("PRIMARY KEY"),
                ColumnDef::new("name", ColumnType::Varchar(50)),
                ColumnDef::new("size", ColumnType::SmallInt).default_value("0"),
            ],
        )
    }

    #[test]
    fn test_column_sql() {
        let column = ColumnDef::new("r_nodes", ColumnType::SmallInt)
            .default_value("0")
            .constraint("CHECK (r_nodes BETWEEN 0 AND 3)");

        assert_eq!(
            column.to_sql(),
            "r_nodes SMALLINT NOT NULL DEFAULT 0 CHECK (r_nodes BETWEEN 0 AND 3)"
        );
        assert_eq!(
            ColumnDef::new("seen_at", ColumnType::Timestamptz)
                .nullable()
                .to_sql(),
            "seen_at TIMESTAMPTZ"
        );
        assert_eq!(
            ColumnDef::new("id", ColumnType::BigSerial)
                .constraint("PRIMARY KEY")
                .to_sql(),
            "id BIGSERIAL PRIMARY KEY"
        );
    }

    #[test]
    fn test_operation_sql_is_guarded() {
        let add = SchemaOperation::add_column(
            "widgets",
            ColumnDef::new("seen_at", ColumnType::Timestamptz).nullable(),
            Some("name"),
        );
        let drop = SchemaOperation::drop_column("widgets", "size");

        assert_eq!(
            add.to_sql(),
            "ALTER TABLE widgets ADD COLUMN IF NOT EXISTS seen_at TIMESTAMPTZ"
        );
        assert_eq!(drop.to_sql(), "ALTER TABLE widgets DROP COLUMN IF EXISTS size");
        assert_eq!(
            SchemaOperation::drop_table("widgets").to_sql(),
            "DROP TABLE IF EXISTS widgets"
        );

        let create = SchemaOperation::CreateTable(widgets()).to_sql();
        assert!(create.starts_with("CREATE TABLE IF NOT EXISTS widgets ("));
        assert!(create.contains("    name VARCHAR(50) NOT NULL,\n"));
    }

    #[test]
    fn test_add_column_after() {
        let mut schema = Schema::new();
        schema
            .apply(&SchemaOperation::CreateTable(widgets()))
            .unwrap();

        schema
            .apply(&SchemaOperation::add_column(
                "widgets",
                ColumnDef::new("seen_at", ColumnType::Timestamptz).nullable(),
                Some("name"),
            ))
            .unwrap();

        assert_eq!(
            schema.table("widgets").unwrap().column_names(),
            vec!["id", "name", "seen_at", "size"]
        );
    }

    #[test]
    fn test_add_column_after_missing_column_appends() {
        let mut schema = Schema::new();
        schema
            .apply(&SchemaOperation::CreateTable(widgets()))
            .unwrap();

        schema
            .apply(&SchemaOperation::add_column(
                "widgets",
                ColumnDef::new("extra", ColumnType::BigInt),
                Some("nope"),
            ))
            .unwrap();

        assert_eq!(
            schema.table("widgets").unwrap().column_names().last(),
            Some(&"extra")
        );
    }

    #[test]
    fn test_operations_are_idempotent() {
        let ops = vec![
            SchemaOperation::CreateTable(widgets()),
            SchemaOperation::add_column(
                "widgets",
                ColumnDef::new("seen_at", ColumnType::Timestamptz).nullable(),
                None,
            ),
            SchemaOperation::drop_column("widgets", "size"),
        ];

        let mut once = Schema::new();
        once.apply_all(&ops).unwrap();

        let mut twice = once.clone();
        twice.apply_all(&ops).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_column_change_on_missing_table_fails() {
        let mut schema = Schema::new();

        let err = schema
            .apply(&SchemaOperation::drop_column("widgets", "size"))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}
