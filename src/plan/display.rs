//! Plan tree rendering

use std::fmt;

use super::Node;

impl Node {
    /// The one-line header for this node.
    fn header(&self) -> String {
        use Node::*;
        match self {
            UnresolvedTable {
                database,
                name,
                as_of,
            } => {
                let mut out = String::from("UnresolvedTable(");
                if let Some(db) = database {
                    out.push_str(db);
                    out.push('.');
                }
                out.push_str(name);
                if let Some(as_of) = as_of {
                    out.push_str(&format!(" AS OF {as_of}"));
                }
                out.push(')');
                out
            }
            ResolvedTable {
                database,
                table,
                as_of,
                tracked,
            } => {
                let mut out = format!("Table({}.{}", database, table.name());
                if let Some(as_of) = as_of {
                    out.push_str(&format!(" AS OF {as_of}"));
                }
                if *tracked {
                    out.push_str(", tracked");
                }
                out.push(')');
                out
            }
            Values { rows } => format!("Values({} rows)", rows.len()),
            TableFunctionCall { name, args, .. } => {
                format!("TableFunction({}({}))", name, join(args))
            }
            SubqueryAlias { name, .. } => format!("SubqueryAlias({name})"),
            RecursiveCte { name, distinct, .. } => format!(
                "RecursiveCte({name}, union {})",
                if *distinct { "distinct" } else { "all" }
            ),
            Project { expressions, .. } => format!("Project({})", join(expressions)),
            Filter { predicate, .. } => format!("Filter({predicate})"),
            Having { predicate, .. } => format!("Having({predicate})"),
            Sort { fields, .. } => format!("Sort({})", join(fields)),
            Limit { limit, .. } => format!("Limit({limit})"),
            Offset { offset, .. } => format!("Offset({offset})"),
            GroupBy {
                selected, grouping, ..
            } => format!(
                "GroupBy(Aggregate({}), Grouping({}))",
                join(selected),
                join(grouping)
            ),
            Window { expressions, .. } => format!("Window({})", join(expressions)),
            Join {
                join_type,
                condition,
                ..
            } => match condition {
                Some(c) => format!("{}({c})", join_type.name()),
                None => format!("{}", join_type.name()),
            },
            Generate { column, .. } => format!("Generate({})", column.name),
            Insert { columns, .. } => format!("Insert({})", columns.join(", ")),
            Update { assignments, .. } => format!(
                "Update({})",
                assignments
                    .iter()
                    .map(|(n, e)| format!("{n} = {e}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            CreateTable { name, .. } => format!("CreateTable({name})"),
            DropTable { name, .. } => format!("DropTable({name})"),
            CreateIndex { name, .. } => format!("CreateIndex({name})"),
            DropIndex { name, .. } => format!("DropIndex({name})"),
            Set { assignments } => format!(
                "Set({})",
                assignments
                    .iter()
                    .map(|a| format!("{} = {}", a.name, a.value))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Use { database } => format!("Use({database})"),
            ShowVariables { pattern: Some(p) } => format!("ShowVariables(LIKE {p})"),
            LockTables { locks } => format!(
                "LockTables({})",
                locks
                    .iter()
                    .map(|l| format!(
                        "{} {}",
                        l.table.header(),
                        if l.write { "WRITE" } else { "READ" }
                    ))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Kill {
                connection_id,
                query_only,
            } => format!(
                "Kill({}{connection_id})",
                if *query_only { "QUERY " } else { "" }
            ),
            Prepare { name, .. } => format!("Prepare({name})"),
            ExecutePrepared { name, bindings } => {
                format!("Execute({name}, {})", join(bindings))
            }
            Deallocate { name } => format!("Deallocate({name})"),
            Call {
                procedure,
                args,
                as_of,
                ..
            } => {
                let mut out = format!("Call({}({})", procedure, join(args));
                if let Some(as_of) = as_of {
                    out.push_str(&format!(" AS OF {as_of}"));
                }
                out.push(')');
                out
            }
            other => other.name().to_string(),
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        writeln!(f, "{}", self.header())?;
        let children = self.children();
        // LockTables renders its tables inline in the header.
        let children = if matches!(self, Node::LockTables { .. }) {
            vec![]
        } else {
            children
        };
        for (i, child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            write!(f, "{}{}", prefix, if last { " └─ " } else { " ├─ " })?;
            let child_prefix = format!("{}{}", prefix, if last { "    " } else { " │  " });
            child.fmt_tree(f, &child_prefix)?;
        }
        Ok(())
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, "")
    }
}
