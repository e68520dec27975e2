//! Schema change descriptors and the built-in registry

use serde::Serialize;
use std::fmt;

use crate::util::{quote_identifier, validate_identifier, validate_name, NameError};

/// One named schema alteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    /// Stable name, also used in the backup tag `before_<name>`
    pub name: String,
    pub change: SchemaChange,
}

/// The alteration a descriptor performs.
///
/// Only `AddColumn` and `CreateTable` are ever applied; the other variants
/// exist so callers can describe them and get a refusal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaChange {
    AddColumn {
        table: String,
        column: String,
        sql_type: String,
        /// SQL literal used as the column default
        default: Option<String>,
        /// Statement run in the same transaction after the column is added
        backfill: Option<String>,
    },
    CreateTable {
        table: String,
        /// Column and constraint list between the parentheses
        definition: String,
    },
    DropColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    DropTable {
        table: String,
    },
    RenameTable {
        from: String,
        to: String,
    },
}

impl SchemaChange {
    /// Whether the change only adds structure
    #[must_use]
    pub fn is_additive(&self) -> bool {
        matches!(self, Self::AddColumn { .. } | Self::CreateTable { .. })
    }

    /// Table the change targets
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::AddColumn { table, .. }
            | Self::CreateTable { table, .. }
            | Self::DropColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::DropTable { table } => table,
            Self::RenameTable { from, .. } => from,
        }
    }

    /// Default value, for changes that declare one
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        match self {
            Self::AddColumn { default, .. } => default.as_deref(),
            _ => None,
        }
    }

    /// Column added by the change, if any
    #[must_use]
    pub fn added_column(&self) -> Option<&str> {
        match self {
            Self::AddColumn { column, .. } => Some(column),
            _ => None,
        }
    }

    pub(crate) fn backfill(&self) -> Option<&str> {
        match self {
            Self::AddColumn { backfill, .. } => backfill.as_deref(),
            _ => None,
        }
    }

    /// Why a change is refused. Non-additive kinds always are; additive
    /// ones are when their SQL fragments could reach past the new structure.
    #[must_use]
    pub fn refusal_reason(&self) -> Option<String> {
        match self {
            Self::AddColumn {
                table,
                default,
                backfill,
                ..
            } => {
                if default.as_deref().is_some_and(has_statement_break) {
                    return Some("column default must be a single SQL expression".to_string());
                }
                match backfill {
                    Some(sql) if !is_update_of(sql, table) => Some(format!(
                        "backfill must be a single UPDATE of table '{table}'"
                    )),
                    _ => None,
                }
            }
            Self::CreateTable { definition, .. } => has_statement_break(definition)
                .then(|| "table definition must not contain further statements".to_string()),
            Self::DropColumn { table, column } => {
                Some(format!("would drop column '{column}' from table '{table}'"))
            }
            Self::RenameColumn { table, from, to } => Some(format!(
                "would rename column '{from}' to '{to}' in table '{table}'"
            )),
            Self::DropTable { table } => Some(format!("would drop table '{table}'")),
            Self::RenameTable { from, to } => {
                Some(format!("would rename table '{from}' to '{to}'"))
            }
        }
    }

    /// DDL statement for an additive change
    ///
    /// # Errors
    /// Returns an error if an identifier or type is not plain SQL
    pub(crate) fn statement(&self) -> Result<String, NameError> {
        match self {
            Self::AddColumn {
                table,
                column,
                sql_type,
                default,
                ..
            } => {
                validate_identifier(table)?;
                validate_identifier(column)?;
                validate_type(sql_type)?;
                let mut sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {sql_type}",
                    quote_identifier(table),
                    quote_identifier(column)
                );
                if let Some(default) = default {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(default);
                }
                Ok(sql)
            }
            Self::CreateTable { table, definition } => {
                validate_identifier(table)?;
                Ok(format!(
                    "CREATE TABLE {} ({definition})",
                    quote_identifier(table)
                ))
            }
            _ => Err(NameError::NotIdentifier(self.table().to_string())),
        }
    }
}

/// Whether `sql` has a `;` outside quoted text or a comment marker, i.e.
/// anything that could end one statement and start another
fn has_statement_break(sql: &str) -> bool {
    if sql.contains("--") || sql.contains("/*") {
        return true;
    }
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if matches!(c, '\'' | '"' | '`') => quote = Some(c),
            None if c == ';' => return true,
            None => {}
        }
    }
    false
}

/// Whether `sql` is one `UPDATE` statement targeting `table`
fn is_update_of(sql: &str, table: &str) -> bool {
    let sql = sql.trim();
    let sql = sql.strip_suffix(';').unwrap_or(sql);
    if has_statement_break(sql) {
        return false;
    }

    let mut words = sql.split_whitespace();
    if !words
        .next()
        .is_some_and(|w| w.eq_ignore_ascii_case("UPDATE"))
    {
        return false;
    }
    let mut target = words.next();
    if target.is_some_and(|w| w.eq_ignore_ascii_case("OR")) {
        words.next();
        target = words.next();
    }
    target.is_some_and(|w| {
        w.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
            .eq_ignore_ascii_case(table)
    })
}

fn validate_type(sql_type: &str) -> Result<(), NameError> {
    let ok = !sql_type.trim().is_empty()
        && sql_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '(' | ')' | ',' | '_'));
    if ok {
        Ok(())
    } else {
        Err(NameError::NotIdentifier(sql_type.to_string()))
    }
}

impl Descriptor {
    /// Descriptor adding `column` of `sql_type` to `table`
    #[must_use]
    pub fn add_column(name: &str, table: &str, column: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            change: SchemaChange::AddColumn {
                table: table.to_string(),
                column: column.to_string(),
                sql_type: sql_type.to_string(),
                default: None,
                backfill: None,
            },
        }
    }

    /// Descriptor creating a new table
    #[must_use]
    pub fn create_table(name: &str, table: &str, definition: &str) -> Self {
        Self {
            name: name.to_string(),
            change: SchemaChange::CreateTable {
                table: table.to_string(),
                definition: definition.to_string(),
            },
        }
    }

    /// Set the column default (no effect on other change kinds)
    #[must_use]
    pub fn with_default(mut self, value: &str) -> Self {
        if let SchemaChange::AddColumn { default, .. } = &mut self.change {
            *default = Some(value.to_string());
        }
        self
    }

    /// Set the backfill statement (no effect on other change kinds)
    #[must_use]
    pub fn with_backfill(mut self, sql: &str) -> Self {
        if let SchemaChange::AddColumn { backfill, .. } = &mut self.change {
            *backfill = Some(sql.to_string());
        }
        self
    }

    /// Check the descriptor name is usable in a backup tag
    ///
    /// # Errors
    /// Returns an error if the name is empty or has unsafe characters
    pub fn validate(&self) -> Result<(), NameError> {
        validate_name(&self.name)
    }

    /// Message shown when the change is already present
    #[must_use]
    pub fn already_applied_message(&self) -> String {
        match &self.change {
            SchemaChange::AddColumn { table, column, .. } => {
                format!("Column '{column}' already exists in table '{table}'")
            }
            other => format!("Table '{}' already exists", other.table()),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            SchemaChange::AddColumn {
                table,
                column,
                sql_type,
                default,
                ..
            } => {
                write!(f, "{}: add {table}.{column} {sql_type}", self.name)?;
                if let Some(default) = default {
                    write!(f, " DEFAULT {default}")?;
                }
                Ok(())
            }
            SchemaChange::CreateTable { table, .. } => {
                write!(f, "{}: create table {table}", self.name)
            }
            other => write!(
                f,
                "{}: {}",
                self.name,
                other.refusal_reason().unwrap_or_default()
            ),
        }
    }
}

const DATE_EST_END_BACKFILL: &str = "UPDATE \"read\" \
     SET date_est_end = date(date_started, '+' || days_estimate || ' days') \
     WHERE date_started IS NOT NULL \
       AND days_estimate IS NOT NULL \
       AND date_finished_actual IS NULL";

/// The reading-list schema changes, in the order they were introduced
#[must_use]
pub fn builtin_descriptors() -> Vec<Descriptor> {
    vec![
        Descriptor::add_column("date_est_start", "read", "date_est_start", "DATE"),
        Descriptor::add_column("date_est_end", "read", "date_est_end", "DATE")
            .with_backfill(DATE_EST_END_BACKFILL),
        Descriptor::add_column(
            "days_estimate_override",
            "read",
            "days_estimate_override",
            "BOOLEAN",
        )
        .with_default("FALSE"),
    ]
}

/// Look up a built-in descriptor by name
#[must_use]
pub fn find_builtin(name: &str) -> Option<Descriptor> {
    builtin_descriptors().into_iter().find(|d| d.name == name)
}
