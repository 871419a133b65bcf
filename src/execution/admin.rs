//! Administrative statements: SHOW, SET, USE, KILL, and DDL

use super::{BoxedRowIter, RowIter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::like_match;
use crate::plan::Node;
use crate::process::ProcessCommand;
use crate::session::VariableScope;
use crate::types::{CharacterSet, Row, Value};

pub fn build_admin(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    let rows: Vec<Row> = match node {
        Node::ShowProcessList => {
            let Some(list) = ctx.process_list() else {
                return Ok(Box::new(Materialised::empty()));
            };
            list.processes()
                .into_iter()
                .map(|p| {
                    let progress = p.progress_text();
                    vec![
                        Value::I64(p.connection as i64),
                        Value::Str(p.user.clone()),
                        Value::Str(p.host.clone()),
                        Value::Null,
                        Value::Str(p.command.name().to_string()),
                        Value::I64(p.seconds()),
                        if progress.is_empty() {
                            Value::Null
                        } else {
                            Value::Str(progress)
                        },
                        if p.command == ProcessCommand::Query {
                            Value::Str(p.query.clone())
                        } else {
                            Value::Null
                        },
                    ]
                })
                .collect()
        }
        Node::ShowWarnings => ctx
            .session()
            .warnings()
            .into_iter()
            .map(|w| {
                vec![
                    Value::Str(w.level.to_string()),
                    Value::U16(w.code),
                    Value::Str(w.message),
                ]
            })
            .collect(),
        Node::ShowVariables { pattern } => ctx
            .session()
            .variables()
            .into_iter()
            .filter(|(name, _)| match pattern {
                Some(p) => like_match(name, p, true),
                None => true,
            })
            .map(|(name, value)| vec![Value::Str(name), Value::Str(value.to_display_string())])
            .collect(),
        Node::ShowCharset => CharacterSet::all()
            .iter()
            .map(|cs| {
                vec![
                    Value::Str(cs.name().to_string()),
                    Value::Str(cs.description().to_string()),
                    Value::Str(cs.default_collation().name().to_string()),
                    Value::U64(cs.max_char_length() as u64),
                ]
            })
            .collect(),
        Node::Set { assignments } => {
            for assignment in assignments {
                let value = assignment.value.eval(ctx, &vec![])?;
                match assignment.scope {
                    VariableScope::Session => {
                        ctx.session().set_variable(&assignment.name, value)?;
                    }
                    VariableScope::User => {
                        ctx.session().set_user_variable(&assignment.name, value);
                    }
                    VariableScope::Global => {
                        return Err(Error::Unsupported(format!(
                            "SET GLOBAL {}; use the persisted-variables hook",
                            assignment.name
                        )));
                    }
                }
            }
            vec![]
        }
        Node::Use { database } => {
            let catalog = ctx.catalog()?;
            if !catalog.has_database(database) {
                return Err(Error::DatabaseNotFound(database.clone()));
            }
            ctx.session().set_current_database(database.clone());
            vec![]
        }
        Node::Kill {
            connection_id,
            query_only,
        } => {
            let Some(list) = ctx.process_list() else {
                return Err(Error::ConnectionNotFound(*connection_id));
            };
            list.kill(*connection_id);
            if !query_only {
                list.remove_connection(*connection_id);
            }
            vec![]
        }
        other => {
            return Err(Error::Internal(format!(
                "build_admin on {} node",
                other.name()
            )))
        }
    };
    Ok(Box::new(Materialised { rows, pos: 0 }))
}

pub fn build_ddl(ctx: &Context, node: &Node) -> Result<BoxedRowIter> {
    match node {
        Node::CreateTable {
            database,
            name,
            schema,
            if_not_exists,
        } => {
            let db = resolve_database(ctx, database.as_deref())?;
            match db.table_insensitive(ctx, name)? {
                Some(_) if *if_not_exists => {}
                Some(_) => {
                    return Err(Error::InvalidValue(format!("table exists: {name}")));
                }
                None => db.create_table(ctx, name, schema.clone())?,
            }
        }
        Node::DropTable {
            database,
            name,
            if_exists,
        } => {
            let db = resolve_database(ctx, database.as_deref())?;
            match db.table_insensitive(ctx, name)? {
                Some(_) => db.drop_table(ctx, name)?,
                None if *if_exists => {}
                None => return Err(Error::TableNotFound(name.clone())),
            }
        }
        Node::CreateIndex {
            table,
            name,
            expressions,
            comment,
        } => {
            let Node::ResolvedTable { table, .. } = table.as_ref() else {
                return Err(Error::Internal("CREATE INDEX over unresolved table".into()));
            };
            let indexable = table.as_indexable().ok_or_else(|| {
                Error::Unsupported(format!("table {} is not indexable", table.name()))
            })?;
            let exprs: Vec<String> = expressions.iter().map(|e| e.to_string()).collect();
            indexable.create_index(ctx, name, exprs, comment)?;
        }
        Node::DropIndex { table, name } => {
            let Node::ResolvedTable { table, .. } = table.as_ref() else {
                return Err(Error::Internal("DROP INDEX over unresolved table".into()));
            };
            table.as_indexable().ok_or_else(|| {
                Error::Unsupported(format!("table {} is not indexable", table.name()))
            })?;
            return Err(Error::Unsupported(format!("DROP INDEX {name}")));
        }
        other => {
            return Err(Error::Internal(format!(
                "build_ddl on {} node",
                other.name()
            )))
        }
    }
    Ok(Box::new(Materialised::empty()))
}

fn resolve_database(
    ctx: &Context,
    database: Option<&str>,
) -> Result<std::sync::Arc<dyn crate::catalog::Database>> {
    let name = match database {
        Some(name) => name.to_string(),
        None => ctx
            .session()
            .current_database()
            .ok_or_else(|| Error::DatabaseNotFound("no database selected".into()))?,
    };
    ctx.catalog()?.database(ctx, &name)
}

pub(crate) struct Materialised {
    rows: Vec<Row>,
    pos: usize,
}

impl Materialised {
    pub(crate) fn empty() -> Materialised {
        Materialised {
            rows: vec![],
            pos: 0,
        }
    }

    pub(crate) fn of(rows: Vec<Row>) -> Materialised {
        Materialised { rows, pos: 0 }
    }
}

impl RowIter for Materialised {
    fn next(&mut self, _ctx: &Context) -> Option<Result<Row>> {
        let row = self.rows.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(row))
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        self.rows = Vec::new();
        Ok(())
    }
}
