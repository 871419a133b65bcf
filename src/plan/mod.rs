//! Logical plan nodes
//!
//! Plan nodes form an immutable tree. Each node exposes its children and
//! expressions through uniform accessors; rewriting builds new nodes that
//! share unchanged subtrees. `with_children(children())` always rebuilds an
//! equivalent node, and the traversals in [`transform`] rely on that.

mod display;
mod schema;
mod transform;

pub use transform::{transform_down, transform_expressions, transform_up};

use std::sync::Arc;

use crate::catalog::{Table, TableFunction};
use crate::error::{Error, Result};
use crate::expr::{ColumnRef, Expression, SortField};
use crate::session::VariableScope;
use crate::types::{Schema, Value};

/// Join flavours. The group-by variant exists for planner-internal use when
/// an aggregation is pushed into a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
    FullOuter,
    Semi,
    Anti,
    GroupBy,
}

impl JoinType {
    pub fn name(&self) -> &'static str {
        match self {
            JoinType::Cross => "CrossJoin",
            JoinType::Inner => "InnerJoin",
            JoinType::Left => "LeftJoin",
            JoinType::Right => "RightJoin",
            JoinType::FullOuter => "FullOuterJoin",
            JoinType::Semi => "SemiJoin",
            JoinType::Anti => "AntiJoin",
            JoinType::GroupBy => "GroupByJoin",
        }
    }
}

/// One table referenced by LOCK TABLES, with its requested mode.
#[derive(Debug, Clone)]
pub struct TableLock {
    pub table: Node,
    pub write: bool,
}

/// One assignment of a SET statement.
#[derive(Debug, Clone)]
pub struct SetAssignment {
    pub scope: VariableScope,
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub enum Node {
    /// A table reference by name, before resolution.
    UnresolvedTable {
        database: Option<String>,
        name: String,
        as_of: Option<Expression>,
    },
    /// A bound table. `tracked` scans report progress to the process list.
    ResolvedTable {
        database: String,
        table: Arc<dyn Table>,
        as_of: Option<Value>,
        tracked: bool,
    },
    /// Literal rows.
    Values { rows: Vec<Vec<Expression>> },
    /// A lateral table-valued function call.
    TableFunctionCall {
        name: String,
        args: Vec<Expression>,
        function: Option<Arc<dyn TableFunction>>,
        schema: Schema,
    },
    /// A derived table with its own name scope.
    SubqueryAlias { name: String, child: Box<Node> },
    /// WITH RECURSIVE name AS (anchor UNION [ALL] recursive).
    RecursiveCte {
        name: String,
        column_names: Vec<String>,
        anchor: Box<Node>,
        recursive: Box<Node>,
        distinct: bool,
    },
    /// The empty relation.
    Nothing,

    Project {
        expressions: Vec<Expression>,
        child: Box<Node>,
    },
    Filter {
        predicate: Expression,
        child: Box<Node>,
    },
    /// A filter over aggregated output.
    Having {
        predicate: Expression,
        child: Box<Node>,
    },
    Sort {
        fields: Vec<SortField>,
        child: Box<Node>,
    },
    Limit {
        limit: Expression,
        child: Box<Node>,
    },
    Offset {
        offset: Expression,
        child: Box<Node>,
    },
    Distinct { child: Box<Node> },
    GroupBy {
        selected: Vec<Expression>,
        grouping: Vec<Expression>,
        child: Box<Node>,
    },
    /// Window-function evaluation over the child's rows.
    Window {
        expressions: Vec<Expression>,
        child: Box<Node>,
    },
    Join {
        join_type: JoinType,
        condition: Option<Expression>,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// Array explosion: one output row per element of the generator column.
    Generate { column: ColumnRef, child: Box<Node> },
    /// Wraps the root of every tracked query; registration and teardown of
    /// the process entry hang off this node's iterator.
    QueryProcess { child: Box<Node> },

    Insert {
        table: Box<Node>,
        columns: Vec<String>,
        source: Box<Node>,
    },
    /// A write wrapped with the statement-level triggers it fires; the
    /// triggers run after the wrapped statement completes.
    TriggeredStatement {
        child: Box<Node>,
        triggers: Vec<Node>,
    },
    Update {
        table: Box<Node>,
        assignments: Vec<(String, Expression)>,
        filter: Option<Expression>,
    },
    Delete {
        table: Box<Node>,
        filter: Option<Expression>,
    },
    CreateTable {
        database: Option<String>,
        name: String,
        schema: Schema,
        if_not_exists: bool,
    },
    DropTable {
        database: Option<String>,
        name: String,
        if_exists: bool,
    },
    CreateIndex {
        table: Box<Node>,
        name: String,
        expressions: Vec<Expression>,
        comment: String,
    },
    DropIndex { table: Box<Node>, name: String },

    Set { assignments: Vec<SetAssignment> },
    Use { database: String },
    ShowProcessList,
    ShowWarnings,
    ShowVariables { pattern: Option<String> },
    ShowCharset,
    LockTables { locks: Vec<TableLock> },
    UnlockTables,
    Kill {
        connection_id: u32,
        query_only: bool,
    },
    Prepare {
        name: String,
        statement_text: String,
        statement: Box<Node>,
    },
    ExecutePrepared {
        name: String,
        bindings: Vec<Expression>,
    },
    Deallocate { name: String },
    Call {
        database: Option<String>,
        procedure: String,
        args: Vec<Expression>,
        as_of: Option<Expression>,
        body: Option<Box<Node>>,
    },
    ChangeReplicationSource { options: Vec<(String, Value)> },
    StartReplica,
    StopReplica,
}

impl Node {
    pub fn project(expressions: Vec<Expression>, child: Node) -> Node {
        Node::Project {
            expressions,
            child: Box::new(child),
        }
    }

    pub fn filter(predicate: Expression, child: Node) -> Node {
        Node::Filter {
            predicate,
            child: Box::new(child),
        }
    }

    pub fn table(name: &str) -> Node {
        Node::UnresolvedTable {
            database: None,
            name: name.to_string(),
            as_of: None,
        }
    }

    pub fn resolved_table(database: &str, table: Arc<dyn Table>) -> Node {
        Node::ResolvedTable {
            database: database.to_string(),
            table,
            as_of: None,
            tracked: false,
        }
    }

    pub fn group_by(selected: Vec<Expression>, grouping: Vec<Expression>, child: Node) -> Node {
        Node::GroupBy {
            selected,
            grouping,
            child: Box::new(child),
        }
    }

    pub fn join(join_type: JoinType, condition: Option<Expression>, left: Node, right: Node) -> Node {
        Node::Join {
            join_type,
            condition,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A short name for error messages and plan printing.
    pub fn name(&self) -> &'static str {
        use Node::*;
        match self {
            UnresolvedTable { .. } => "UnresolvedTable",
            ResolvedTable { .. } => "Table",
            Values { .. } => "Values",
            TableFunctionCall { .. } => "TableFunction",
            SubqueryAlias { .. } => "SubqueryAlias",
            RecursiveCte { .. } => "RecursiveCte",
            Nothing => "Nothing",
            Project { .. } => "Project",
            Filter { .. } => "Filter",
            Having { .. } => "Having",
            Sort { .. } => "Sort",
            Limit { .. } => "Limit",
            Offset { .. } => "Offset",
            Distinct { .. } => "Distinct",
            GroupBy { .. } => "GroupBy",
            Window { .. } => "Window",
            Join { join_type, .. } => join_type.name(),
            Generate { .. } => "Generate",
            QueryProcess { .. } => "QueryProcess",
            Insert { .. } => "Insert",
            TriggeredStatement { .. } => "TriggeredStatement",
            Update { .. } => "Update",
            Delete { .. } => "Delete",
            CreateTable { .. } => "CreateTable",
            DropTable { .. } => "DropTable",
            CreateIndex { .. } => "CreateIndex",
            DropIndex { .. } => "DropIndex",
            Set { .. } => "Set",
            Use { .. } => "Use",
            ShowProcessList => "ShowProcessList",
            ShowWarnings => "ShowWarnings",
            ShowVariables { .. } => "ShowVariables",
            ShowCharset => "ShowCharset",
            LockTables { .. } => "LockTables",
            UnlockTables => "UnlockTables",
            Kill { .. } => "Kill",
            Prepare { .. } => "Prepare",
            ExecutePrepared { .. } => "Execute",
            Deallocate { .. } => "Deallocate",
            Call { .. } => "Call",
            ChangeReplicationSource { .. } => "ChangeReplicationSource",
            StartReplica => "StartReplica",
            StopReplica => "StopReplica",
        }
    }

    /// Direct children, in a stable order matching `with_children`.
    pub fn children(&self) -> Vec<&Node> {
        use Node::*;
        match self {
            SubqueryAlias { child, .. }
            | Project { child, .. }
            | Filter { child, .. }
            | Having { child, .. }
            | Sort { child, .. }
            | Limit { child, .. }
            | Offset { child, .. }
            | Distinct { child }
            | GroupBy { child, .. }
            | Window { child, .. }
            | Generate { child, .. }
            | QueryProcess { child } => vec![child],
            RecursiveCte {
                anchor, recursive, ..
            } => vec![anchor, recursive],
            Join { left, right, .. } => vec![left, right],
            Insert { table, source, .. } => vec![table, source],
            TriggeredStatement { child, triggers } => {
                let mut out: Vec<&Node> = vec![child];
                out.extend(triggers.iter());
                out
            }
            Update { table, .. } | Delete { table, .. } => vec![table],
            CreateIndex { table, .. } | DropIndex { table, .. } => vec![table],
            Prepare { statement, .. } => vec![statement],
            Call { body, .. } => body.iter().map(|b| b.as_ref()).collect(),
            LockTables { locks } => locks.iter().map(|l| &l.table).collect(),
            _ => vec![],
        }
    }

    /// Rebuild this node with new children. The child count must match
    /// `children()`.
    pub fn with_children(&self, children: Vec<Node>) -> Result<Node> {
        use Node::*;
        let expected = self.children().len();
        if children.len() != expected {
            return Err(Error::InvalidChildCount {
                node: self.name().to_string(),
                expected,
                actual: children.len(),
            });
        }
        let mut it = children.into_iter();
        let mut next = || Box::new(it.next().expect("arity checked above"));
        Ok(match self {
            SubqueryAlias { name, .. } => SubqueryAlias {
                name: name.clone(),
                child: next(),
            },
            Project { expressions, .. } => Project {
                expressions: expressions.clone(),
                child: next(),
            },
            Filter { predicate, .. } => Filter {
                predicate: predicate.clone(),
                child: next(),
            },
            Having { predicate, .. } => Having {
                predicate: predicate.clone(),
                child: next(),
            },
            Sort { fields, .. } => Sort {
                fields: fields.clone(),
                child: next(),
            },
            Limit { limit, .. } => Limit {
                limit: limit.clone(),
                child: next(),
            },
            Offset { offset, .. } => Offset {
                offset: offset.clone(),
                child: next(),
            },
            Distinct { .. } => Distinct { child: next() },
            GroupBy {
                selected, grouping, ..
            } => GroupBy {
                selected: selected.clone(),
                grouping: grouping.clone(),
                child: next(),
            },
            Window { expressions, .. } => Window {
                expressions: expressions.clone(),
                child: next(),
            },
            Generate { column, .. } => Generate {
                column: column.clone(),
                child: next(),
            },
            QueryProcess { .. } => QueryProcess { child: next() },
            RecursiveCte {
                name,
                column_names,
                distinct,
                ..
            } => RecursiveCte {
                name: name.clone(),
                column_names: column_names.clone(),
                anchor: next(),
                recursive: next(),
                distinct: *distinct,
            },
            Join {
                join_type,
                condition,
                ..
            } => Join {
                join_type: *join_type,
                condition: condition.clone(),
                left: next(),
                right: next(),
            },
            Insert { columns, .. } => Insert {
                table: next(),
                columns: columns.clone(),
                source: next(),
            },
            TriggeredStatement { triggers, .. } => TriggeredStatement {
                child: next(),
                triggers: (0..triggers.len()).map(|_| *next()).collect(),
            },
            Update {
                assignments,
                filter,
                ..
            } => Update {
                table: next(),
                assignments: assignments.clone(),
                filter: filter.clone(),
            },
            Delete { filter, .. } => Delete {
                table: next(),
                filter: filter.clone(),
            },
            CreateIndex {
                name,
                expressions,
                comment,
                ..
            } => CreateIndex {
                table: next(),
                name: name.clone(),
                expressions: expressions.clone(),
                comment: comment.clone(),
            },
            DropIndex { name, .. } => DropIndex {
                table: next(),
                name: name.clone(),
            },
            Prepare {
                name,
                statement_text,
                ..
            } => Prepare {
                name: name.clone(),
                statement_text: statement_text.clone(),
                statement: next(),
            },
            Call {
                database,
                procedure,
                args,
                as_of,
                body,
            } => Call {
                database: database.clone(),
                procedure: procedure.clone(),
                args: args.clone(),
                as_of: as_of.clone(),
                body: body.as_ref().map(|_| next()),
            },
            LockTables { locks } => LockTables {
                locks: locks
                    .iter()
                    .map(|l| TableLock {
                        table: *next(),
                        write: l.write,
                    })
                    .collect(),
            },
            other => other.clone(),
        })
    }

    /// The expressions this node owns, in a stable order matching
    /// `with_expressions`.
    pub fn expressions(&self) -> Vec<&Expression> {
        use Node::*;
        match self {
            UnresolvedTable { as_of, .. } => as_of.iter().collect(),
            Values { rows } => rows.iter().flatten().collect(),
            TableFunctionCall { args, .. } => args.iter().collect(),
            Project { expressions, .. } | Window { expressions, .. } => {
                expressions.iter().collect()
            }
            Filter { predicate, .. } | Having { predicate, .. } => vec![predicate],
            Sort { fields, .. } => fields.iter().map(|f| &f.expr).collect(),
            Limit { limit, .. } => vec![limit],
            Offset { offset, .. } => vec![offset],
            GroupBy {
                selected, grouping, ..
            } => selected.iter().chain(grouping.iter()).collect(),
            Join { condition, .. } => condition.iter().collect(),
            Update {
                assignments,
                filter,
                ..
            } => assignments
                .iter()
                .map(|(_, e)| e)
                .chain(filter.iter())
                .collect(),
            Delete { filter, .. } => filter.iter().collect(),
            CreateIndex { expressions, .. } => expressions.iter().collect(),
            Set { assignments } => assignments.iter().map(|a| &a.value).collect(),
            ExecutePrepared { bindings, .. } => bindings.iter().collect(),
            Call { args, as_of, .. } => args.iter().chain(as_of.iter()).collect(),
            _ => vec![],
        }
    }

    /// Rebuild this node with new expressions. The count must match
    /// `expressions()`.
    pub fn with_expressions(&self, exprs: Vec<Expression>) -> Result<Node> {
        use Node::*;
        let expected = self.expressions().len();
        if exprs.len() != expected {
            return Err(Error::InvalidExpressionCount {
                node: self.name().to_string(),
                expected,
                actual: exprs.len(),
            });
        }
        let mut it = exprs.into_iter();
        let mut next = || it.next().expect("arity checked above");
        Ok(match self {
            UnresolvedTable {
                database,
                name,
                as_of,
            } => UnresolvedTable {
                database: database.clone(),
                name: name.clone(),
                as_of: as_of.as_ref().map(|_| next()),
            },
            Values { rows } => Values {
                rows: rows
                    .iter()
                    .map(|row| (0..row.len()).map(|_| next()).collect())
                    .collect(),
            },
            TableFunctionCall {
                name,
                args,
                function,
                schema,
            } => TableFunctionCall {
                name: name.clone(),
                args: (0..args.len()).map(|_| next()).collect(),
                function: function.clone(),
                schema: schema.clone(),
            },
            Project { child, expressions } => Project {
                expressions: (0..expressions.len()).map(|_| next()).collect(),
                child: child.clone(),
            },
            Window { child, expressions } => Window {
                expressions: (0..expressions.len()).map(|_| next()).collect(),
                child: child.clone(),
            },
            Filter { child, .. } => Filter {
                predicate: next(),
                child: child.clone(),
            },
            Having { child, .. } => Having {
                predicate: next(),
                child: child.clone(),
            },
            Sort { fields, child } => Sort {
                fields: fields
                    .iter()
                    .map(|f| SortField {
                        expr: next(),
                        ascending: f.ascending,
                        nulls_first: f.nulls_first,
                    })
                    .collect(),
                child: child.clone(),
            },
            Limit { child, .. } => Limit {
                limit: next(),
                child: child.clone(),
            },
            Offset { child, .. } => Offset {
                offset: next(),
                child: child.clone(),
            },
            GroupBy {
                selected,
                grouping,
                child,
            } => GroupBy {
                selected: (0..selected.len()).map(|_| next()).collect(),
                grouping: (0..grouping.len()).map(|_| next()).collect(),
                child: child.clone(),
            },
            Join {
                join_type,
                condition,
                left,
                right,
            } => Join {
                join_type: *join_type,
                condition: condition.as_ref().map(|_| next()),
                left: left.clone(),
                right: right.clone(),
            },
            Update {
                table,
                assignments,
                filter,
            } => Update {
                table: table.clone(),
                assignments: assignments
                    .iter()
                    .map(|(name, _)| (name.clone(), next()))
                    .collect(),
                filter: filter.as_ref().map(|_| next()),
            },
            Delete { table, filter } => Delete {
                table: table.clone(),
                filter: filter.as_ref().map(|_| next()),
            },
            CreateIndex {
                table,
                name,
                expressions,
                comment,
            } => CreateIndex {
                table: table.clone(),
                name: name.clone(),
                expressions: (0..expressions.len()).map(|_| next()).collect(),
                comment: comment.clone(),
            },
            Set { assignments } => Set {
                assignments: assignments
                    .iter()
                    .map(|a| SetAssignment {
                        scope: a.scope,
                        name: a.name.clone(),
                        value: next(),
                    })
                    .collect(),
            },
            ExecutePrepared { name, bindings } => ExecutePrepared {
                name: name.clone(),
                bindings: (0..bindings.len()).map(|_| next()).collect(),
            },
            Call {
                database,
                procedure,
                args,
                as_of,
                body,
            } => Call {
                database: database.clone(),
                procedure: procedure.clone(),
                args: (0..args.len()).map(|_| next()).collect(),
                as_of: as_of.as_ref().map(|_| next()),
                body: body.clone(),
            },
            other => other.clone(),
        })
    }

    /// Whether this node and its whole subtree have been resolved.
    pub fn resolved(&self) -> bool {
        use Node::*;
        match self {
            UnresolvedTable { .. } => false,
            TableFunctionCall { function, args, .. } => {
                function.is_some() && args.iter().all(|a| a.resolved())
            }
            // A prepared statement's body legitimately keeps placeholders.
            Prepare { .. } => true,
            Call { body, args, .. } => {
                body.as_ref().is_some_and(|b| b.resolved())
                    && args.iter().all(|a| a.resolved())
            }
            _ => {
                self.children().iter().all(|c| c.resolved())
                    && self.expressions().iter().all(|e| e.resolved())
            }
        }
    }
}
