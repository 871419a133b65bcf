//! Table and result-set schemas

use serde::{Deserialize, Serialize};
use std::fmt;

use super::data_type::DataType;
use crate::error::{Error, Result};
use crate::expr::Expression;

/// A column of a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// The table this column originated from, if any.
    pub source: Option<String>,
    /// The DEFAULT expression, if declared.
    #[serde(skip)]
    pub default: Option<Expression>,
    pub auto_increment: bool,
    /// Position within the primary key, if the column is part of it.
    pub primary_key_position: Option<usize>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Column {
        Column {
            name: name.into(),
            data_type,
            nullable: true,
            source: None,
            default: None,
            auto_increment: false,
            primary_key_position: None,
        }
    }

    pub fn not_null(mut self) -> Column {
        self.nullable = false;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Column {
        self.source = Some(source.into());
        self
    }

    pub fn with_default(mut self, default: Expression) -> Column {
        self.default = Some(default);
        self
    }

    pub fn primary_key(mut self, position: usize) -> Column {
        self.primary_key_position = Some(position);
        self.nullable = false;
        self
    }
}

/// An ordered list of columns. Column names are unique case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Schema> {
        for (i, col) in columns.iter().enumerate() {
            let lower = col.name.to_lowercase();
            if columns[..i].iter().any(|c| c.name.to_lowercase() == lower) {
                return Err(Error::InvalidValue(format!(
                    "duplicate column name: {}",
                    col.name
                )));
            }
        }
        Ok(Schema { columns })
    }

    pub fn empty() -> Schema {
        Schema { columns: vec![] }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Find a column by name, case-insensitively. Returns its ordinal.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Find a column by name and optional source table.
    pub fn index_of_qualified(&self, table: Option<&str>, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| {
            c.name.eq_ignore_ascii_case(name)
                && match (table, &c.source) {
                    (Some(t), Some(s)) => s.eq_ignore_ascii_case(t),
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        })
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// The primary-key columns in key order.
    pub fn primary_key(&self) -> Vec<&Column> {
        let mut cols: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| c.primary_key_position.is_some())
            .collect();
        cols.sort_by_key(|c| c.primary_key_position);
        cols
    }

    /// Concatenate two schemas, as a join does.
    pub fn join(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema { columns }
    }

    /// Rename every column's source, as a subquery alias does.
    pub fn with_source(&self, source: &str) -> Schema {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.source = Some(source.to_string());
                c
            })
            .collect();
        Schema { columns }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", c.name, c.data_type)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Column>> for Schema {
    /// Build a schema without uniqueness validation; used for derived
    /// schemas whose names were already checked upstream.
    fn from(columns: Vec<Column>) -> Schema {
        Schema { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected_case_insensitively() {
        let r = Schema::new(vec![
            Column::new("id", DataType::I64),
            Column::new("ID", DataType::I32),
        ]);
        assert!(r.is_err());
    }

    #[test]
    fn test_qualified_lookup() -> Result<()> {
        let schema = Schema::new(vec![
            Column::new("id", DataType::I64).with_source("t1"),
            Column::new("id2", DataType::I64).with_source("t2"),
        ])?;
        assert_eq!(schema.index_of_qualified(Some("t2"), "ID2"), Some(1));
        assert_eq!(schema.index_of_qualified(Some("t1"), "id2"), None);
        assert_eq!(schema.index_of("id2"), Some(1));
        Ok(())
    }

    #[test]
    fn test_primary_key_order() -> Result<()> {
        let schema = Schema::new(vec![
            Column::new("b", DataType::I64).primary_key(1),
            Column::new("a", DataType::I64).primary_key(0),
        ])?;
        let pk: Vec<&str> = schema
            .primary_key()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(pk, vec!["a", "b"]);
        Ok(())
    }
}
