//! Schema derivation for plan nodes

use super::{JoinType, Node};
use crate::types::{Column, DataType, Schema};

impl Node {
    /// The schema of the rows this node produces.
    pub fn schema(&self) -> Schema {
        use Node::*;
        match self {
            ResolvedTable { table, .. } => table.schema(),
            TableFunctionCall { schema, name, .. } => schema.with_source(name),
            Values { rows } => match rows.first() {
                Some(row) => Schema::from(
                    row.iter()
                        .enumerate()
                        .map(|(i, e)| {
                            let mut c = Column::new(format!("column_{i}"), e.data_type());
                            c.nullable = e.nullable();
                            c
                        })
                        .collect::<Vec<_>>(),
                ),
                None => Schema::empty(),
            },
            SubqueryAlias { name, child } => child.schema().with_source(name),
            RecursiveCte {
                name,
                column_names,
                anchor,
                ..
            } => {
                let anchor_schema = anchor.schema();
                let columns = anchor_schema
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        let mut c = c.clone();
                        if let Some(renamed) = column_names.get(i) {
                            c.name = renamed.clone();
                        }
                        c.source = Some(name.clone());
                        c
                    })
                    .collect::<Vec<_>>();
                Schema::from(columns)
            }
            Project { expressions, .. } | Window { expressions, .. } => {
                schema_of_expressions(expressions)
            }
            GroupBy { selected, .. } => schema_of_expressions(selected),
            Filter { child, .. }
            | Having { child, .. }
            | Sort { child, .. }
            | Limit { child, .. }
            | Offset { child, .. }
            | Distinct { child }
            | QueryProcess { child } => child.schema(),
            Generate { column, child } => {
                let child_schema = child.schema();
                let columns = child_schema
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        if i == column.index {
                            let mut c = c.clone();
                            c.name = column.name.clone();
                            c.data_type = column.data_type.clone();
                            c.nullable = column.nullable;
                            c
                        } else {
                            c.clone()
                        }
                    })
                    .collect::<Vec<_>>();
                Schema::from(columns)
            }
            Join {
                join_type,
                left,
                right,
                ..
            } => match join_type {
                JoinType::Semi | JoinType::Anti => left.schema(),
                _ => left.schema().join(&right.schema()),
            },
            Insert { .. } | Update { .. } | Delete { .. } => Schema::from(vec![Column::new(
                "count",
                DataType::U64,
            )
            .not_null()]),
            TriggeredStatement { child, .. } => child.schema(),
            Call { body, .. } => body.as_ref().map(|b| b.schema()).unwrap_or_else(Schema::empty),
            ShowProcessList => Schema::from(vec![
                Column::new("Id", DataType::I64).not_null(),
                Column::new("User", DataType::varchar(96)),
                Column::new("Host", DataType::varchar(261)),
                Column::new("db", DataType::varchar(64)),
                Column::new("Command", DataType::varchar(16)).not_null(),
                Column::new("Time", DataType::I64).not_null(),
                Column::new("State", DataType::text()),
                Column::new("Info", DataType::text()),
            ]),
            ShowWarnings => Schema::from(vec![
                Column::new("Level", DataType::varchar(7)).not_null(),
                Column::new("Code", DataType::U16).not_null(),
                Column::new("Message", DataType::varchar(512)).not_null(),
            ]),
            ShowVariables { .. } => Schema::from(vec![
                Column::new("Variable_name", DataType::varchar(64)).not_null(),
                Column::new("Value", DataType::text()),
            ]),
            ShowCharset => Schema::from(vec![
                Column::new("Charset", DataType::varchar(64)).not_null(),
                Column::new("Description", DataType::varchar(512)).not_null(),
                Column::new("Default collation", DataType::varchar(64)).not_null(),
                Column::new("Maxlen", DataType::U64).not_null(),
            ]),
            _ => Schema::empty(),
        }
    }
}

/// Derive a schema from a projection list.
fn schema_of_expressions(expressions: &[crate::expr::Expression]) -> Schema {
    Schema::from(
        expressions
            .iter()
            .map(|e| {
                let mut c = Column::new(e.result_name(), e.data_type());
                c.nullable = e.nullable();
                c.source = e.source_table();
                c
            })
            .collect::<Vec<_>>(),
    )
}
