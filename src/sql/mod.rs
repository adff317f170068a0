//! SQL text generation.
//!
//! Statements are built as structured values that snapshot every bound
//! `Value` at construction time; `sql()` renders dialect-correct text on
//! demand. The `MemoryBackend` executes the structured form directly, a
//! real connection would be handed the rendered text.

use crate::core::{DbType, Value};

/// Quote an identifier for the target dialect.
pub fn quote(ident: &str) -> String {
    format!("[{}]", ident)
}

/// Render a value as a SQL literal. Strings double embedded quotes,
/// booleans render as 1/0, binaries as hex.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Binary(b) => {
            let mut out = String::with_capacity(2 + b.len() * 2);
            out.push_str("0x");
            for byte in b {
                out.push_str(&format!("{:02X}", byte));
            }
            out
        }
    }
}

/// SQL column type for a core or side-table column.
pub fn sql_type(db_type: DbType, size: Option<usize>) -> String {
    match db_type {
        DbType::Boolean => "BIT".to_string(),
        DbType::Int8 => "TINYINT".to_string(),
        DbType::Int16 => "SMALLINT".to_string(),
        DbType::Int32 => "INT".to_string(),
        DbType::Int64 => "BIGINT".to_string(),
        DbType::Float => "REAL".to_string(),
        DbType::Double | DbType::Decimal => "FLOAT".to_string(),
        DbType::DateTime => "DATETIME".to_string(),
        DbType::Char => format!("NCHAR({})", size.unwrap_or(1)),
        DbType::String => format!("NVARCHAR({})", size.unwrap_or(2048)),
        DbType::Binary => "IMAGE".to_string(),
        DbType::Guid => "UNIQUEIDENTIFIER".to_string(),
    }
}

fn render_filter(filter: &[(String, Value)]) -> String {
    filter
        .iter()
        .map(|(col, val)| format!("{} = {}", quote(col), literal(val)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// One executable SQL operation with its values snapshotted at
/// construction time.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },

    Update {
        table: String,
        set: Vec<(String, Value)>,
        filter: Vec<(String, Value)>,
    },

    Delete {
        table: String,
        filter: Vec<(String, Value)>,
    },

    /// Conditional upsert of one extended value row: inserts when the
    /// `(key, Name)` row does not exist yet, updates otherwise. One
    /// round trip either way.
    UpsertExtendedRow {
        table: String,
        key: Vec<(String, Value)>,
        property: String,
        value_column: String,
        value: Value,
    },

    /// DDL for the extended value side table of one entity type.
    CreateExtendedTable {
        table: String,
        key_columns: Vec<(String, DbType, Option<usize>)>,
        name_size: usize,
        string_size: usize,
    },
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. }
            | Self::UpsertExtendedRow { table, .. }
            | Self::CreateExtendedTable { table, .. } => table,
        }
    }

    pub fn is_ddl(&self) -> bool {
        matches!(self, Self::CreateExtendedTable { .. })
    }

    /// Bind a store-generated key into the statement.
    ///
    /// A new entity with an auto-increment key snapshots `Null` in the
    /// key positions of its extended-row units; once the core insert has
    /// reported the generated id, the save pipeline rebinds those
    /// positions before executing the remaining units.
    pub fn bind_generated_key(&self, column: &str, id: i64) -> Statement {
        let bind = |pairs: &[(String, Value)]| -> Vec<(String, Value)> {
            pairs
                .iter()
                .map(|(col, val)| {
                    if col == column && val.is_null() {
                        (col.clone(), Value::Int(id))
                    } else {
                        (col.clone(), val.clone())
                    }
                })
                .collect()
        };
        match self {
            Self::Insert {
                table,
                columns,
                values,
            } => Self::Insert {
                table: table.clone(),
                columns: columns.clone(),
                values: columns
                    .iter()
                    .zip(values.iter())
                    .map(|(col, val)| {
                        if col == column && val.is_null() {
                            Value::Int(id)
                        } else {
                            val.clone()
                        }
                    })
                    .collect(),
            },
            Self::Update { table, set, filter } => Self::Update {
                table: table.clone(),
                set: set.clone(),
                filter: bind(filter),
            },
            Self::Delete { table, filter } => Self::Delete {
                table: table.clone(),
                filter: bind(filter),
            },
            Self::UpsertExtendedRow {
                table,
                key,
                property,
                value_column,
                value,
            } => Self::UpsertExtendedRow {
                table: table.clone(),
                key: bind(key),
                property: property.clone(),
                value_column: value_column.clone(),
                value: value.clone(),
            },
            ddl @ Self::CreateExtendedTable { .. } => ddl.clone(),
        }
    }

    /// Render the statement as dialect-correct SQL text.
    pub fn sql(&self) -> String {
        match self {
            Self::Insert {
                table,
                columns,
                values,
            } => {
                let cols = columns.iter().map(|c| quote(c)).collect::<Vec<_>>();
                let vals = values.iter().map(literal).collect::<Vec<_>>();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote(table),
                    cols.join(", "),
                    vals.join(", ")
                )
            }

            Self::Update { table, set, filter } => {
                let assignments = set
                    .iter()
                    .map(|(col, val)| format!("{} = {}", quote(col), literal(val)))
                    .collect::<Vec<_>>();
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    quote(table),
                    assignments.join(", "),
                    render_filter(filter)
                )
            }

            Self::Delete { table, filter } => {
                format!("DELETE FROM {} WHERE {}", quote(table), render_filter(filter))
            }

            Self::UpsertExtendedRow {
                table,
                key,
                property,
                value_column,
                value,
            } => {
                let mut constraint: Vec<(String, Value)> = key.clone();
                constraint.push(("Name".to_string(), Value::Text(property.clone())));
                let where_clause = render_filter(&constraint);

                let mut insert_cols: Vec<String> =
                    key.iter().map(|(col, _)| quote(col)).collect();
                insert_cols.push(quote("Name"));
                insert_cols.push(quote(value_column));
                let mut insert_vals: Vec<String> =
                    key.iter().map(|(_, val)| literal(val)).collect();
                insert_vals.push(literal(&Value::Text(property.clone())));
                insert_vals.push(literal(value));

                format!(
                    "IF (SELECT COUNT(*) FROM {table} WHERE {cond}) = 0 \
                     INSERT INTO {table} ({cols}) VALUES ({vals}) \
                     ELSE UPDATE {table} SET {col} = {val} WHERE {cond}",
                    table = quote(table),
                    cond = where_clause,
                    cols = insert_cols.join(", "),
                    vals = insert_vals.join(", "),
                    col = quote(value_column),
                    val = literal(value),
                )
            }

            Self::CreateExtendedTable {
                table,
                key_columns,
                name_size,
                string_size,
            } => {
                let mut columns = Vec::new();
                let mut pk = Vec::new();
                for (col, db_type, size) in key_columns {
                    columns.push(format!(
                        "{} {} NOT NULL",
                        quote(col),
                        sql_type(*db_type, *size)
                    ));
                    pk.push(quote(col));
                }
                columns.push(format!("{} NVARCHAR({}) NOT NULL", quote("Name"), name_size));
                pk.push(quote("Name"));
                columns.push(format!("{} BIGINT NULL", quote("Int64")));
                columns.push(format!("{} FLOAT NULL", quote("Decimal")));
                columns.push(format!("{} DATETIME NULL", quote("DateTime")));
                columns.push(format!(
                    "{} NVARCHAR({}) NULL",
                    quote("String"),
                    string_size
                ));
                columns.push(format!("{} IMAGE NULL", quote("Binary")));
                format!(
                    "CREATE TABLE {} ({}, PRIMARY KEY ({}))",
                    quote(table),
                    columns.join(", "),
                    pk.join(", ")
                )
            }
        }
    }
}

/// One projected column of a select statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column {
        column: String,
        alias: Option<String>,
    },

    /// Correlated scalar subquery pulling one extended property out of the
    /// side table, surfaced as a pseudo-column of the outer select.
    ExtendedScalar {
        side_table: String,
        value_column: String,
        property: String,
        /// `(side column, outer column)` join pairs over the entity key.
        key_join: Vec<(String, String)>,
        alias: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    pub items: Vec<SelectItem>,
    pub filter: Vec<(String, Value)>,
    pub top: Option<usize>,
}

impl SelectStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            items: Vec::new(),
            filter: Vec::new(),
            top: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.items.push(SelectItem::Column {
            column: column.into(),
            alias: None,
        });
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: Value) -> Self {
        self.filter.push((column.into(), value));
        self
    }

    pub fn top(mut self, n: usize) -> Self {
        self.top = Some(n);
        self
    }

    pub fn sql(&self) -> String {
        let mut items = Vec::new();
        for item in &self.items {
            match item {
                SelectItem::Column { column, alias } => {
                    let mut text = quote(column);
                    if let Some(alias) = alias {
                        text = format!("{} AS {}", text, quote(alias));
                    }
                    items.push(text);
                }
                SelectItem::ExtendedScalar {
                    side_table,
                    value_column,
                    property,
                    key_join,
                    alias,
                } => {
                    let join = key_join
                        .iter()
                        .map(|(side, outer)| {
                            format!(
                                "{}.{} = {}.{}",
                                quote(side_table),
                                quote(side),
                                quote(&self.table),
                                quote(outer)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    items.push(format!(
                        "(SELECT {col} FROM {side} WHERE {join} AND {side}.{name} = {prop}) AS {alias}",
                        col = quote(value_column),
                        side = quote(side_table),
                        join = join,
                        name = quote("Name"),
                        prop = literal(&Value::Text(property.clone())),
                        alias = quote(alias),
                    ));
                }
            }
        }

        let top = match self.top {
            Some(n) => format!("TOP {} ", n),
            None => String::new(),
        };
        let mut sql = format!("SELECT {}{} FROM {}", top, items.join(", "), quote(&self.table));
        if !self.filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_filter(&self.filter));
        }
        sql
    }
}

/// Rewrite a constraint on an extended field into a key-membership
/// subquery against the side table.
pub fn extended_filter_constraint(
    key_column: &str,
    side_table: &str,
    property: &str,
    value_column: &str,
    op: &str,
    value: &Value,
) -> String {
    format!(
        "{key} IN (SELECT {key} FROM {side} WHERE {name} = {prop} AND {col} {op} {val})",
        key = quote(key_column),
        side = quote(side_table),
        name = quote("Name"),
        prop = literal(&Value::Text(property.to_string())),
        col = quote(value_column),
        op = op,
        val = literal(value),
    )
}
