//! Process list
//!
//! Every query runs as a tracked process bound to its connection. The list
//! records per-table and per-partition progress, exposes snapshots for SHOW
//! PROCESSLIST, and owns the kill callback: `begin_query` installs a
//! cancellation token into the context, and `kill` trips it so the running
//! iterator observes cancellation between rows. One read/write lock guards
//! all operations and is held only for the duration of each call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::session::Session;

/// What a connection is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCommand {
    /// Connected but not yet authenticated.
    Connect,
    /// Idle between queries.
    Sleep,
    /// Executing a query.
    Query,
}

impl ProcessCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessCommand::Connect => "Connect",
            ProcessCommand::Sleep => "Sleep",
            ProcessCommand::Query => "Query",
        }
    }
}

/// Progress of one unit of work: done count against an optional total.
/// A total of -1 means unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub name: String,
    pub done: i64,
    pub total: i64,
}

impl Progress {
    fn total_text(&self) -> String {
        if self.total < 0 {
            "?".to_string()
        } else {
            self.total.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionProgress {
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableProgress {
    pub progress: Progress,
    pub partitions: HashMap<String, PartitionProgress>,
}

impl TableProgress {
    fn new(name: &str, total: i64) -> TableProgress {
        TableProgress {
            progress: Progress {
                name: name.to_string(),
                done: 0,
                total,
            },
            partitions: HashMap::new(),
        }
    }
}

/// The engine-visible record of a connection and its running query.
#[derive(Debug, Clone)]
pub struct Process {
    pub connection: u32,
    pub query_pid: u64,
    pub command: ProcessCommand,
    pub user: String,
    pub host: String,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub progress: HashMap<String, TableProgress>,
    kill: Option<CancellationToken>,
}

impl Process {
    pub fn seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// The progress tree rendered for SHOW PROCESSLIST, one table per
    /// paragraph with its partitions underneath.
    pub fn progress_text(&self) -> String {
        if self.progress.is_empty() {
            return String::new();
        }
        let mut tables: Vec<&TableProgress> = self.progress.values().collect();
        tables.sort_by(|a, b| a.progress.name.cmp(&b.progress.name));

        let mut out = String::new();
        for table in tables {
            out.push('\n');
            out.push_str(&format!(
                "{} ({}/{} partitions)\n",
                table.progress.name,
                table.progress.done,
                table.progress.total_text()
            ));
            let mut partitions: Vec<&PartitionProgress> = table.partitions.values().collect();
            partitions.sort_by(|a, b| a.progress.name.cmp(&b.progress.name));
            for (i, partition) in partitions.iter().enumerate() {
                let branch = if i + 1 == partitions.len() {
                    " └─ "
                } else {
                    " ├─ "
                };
                out.push_str(&format!(
                    "{}{} ({}/{} rows)\n",
                    branch,
                    partition.progress.name,
                    partition.progress.done,
                    partition.progress.total_text()
                ));
            }
        }
        out
    }
}

#[derive(Default)]
struct Inner {
    procs: HashMap<u32, Process>,
    by_query_pid: HashMap<u64, u32>,
}

/// Tracks all connections and their in-flight queries.
#[derive(Default)]
pub struct ProcessList {
    inner: RwLock<Inner>,
    next_pid: AtomicU64,
}

impl ProcessList {
    pub fn new() -> Arc<ProcessList> {
        Arc::new(ProcessList::default())
    }

    /// Reserve a fresh query pid, unique for the lifetime of the list.
    pub fn reserve_pid(&self) -> u64 {
        self.next_pid.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a connection before authentication completes.
    pub fn add_connection(&self, id: u32, addr: &str) {
        self.inner.write().procs.insert(
            id,
            Process {
                connection: id,
                query_pid: 0,
                command: ProcessCommand::Connect,
                user: "unauthenticated user".to_string(),
                host: addr.to_string(),
                query: String::new(),
                started_at: Utc::now(),
                progress: HashMap::new(),
                kill: None,
            },
        );
    }

    /// Transition a connection to idle once its session is established.
    pub fn connection_ready(&self, session: &Session) {
        self.inner.write().procs.insert(
            session.id(),
            Process {
                connection: session.id(),
                query_pid: 0,
                command: ProcessCommand::Sleep,
                user: session.client().user.clone(),
                host: session.client().address.clone(),
                query: String::new(),
                started_at: Utc::now(),
                progress: HashMap::new(),
                kill: None,
            },
        );
    }

    /// Kill the in-flight query, then drop the connection entry.
    pub fn remove_connection(&self, id: u32) {
        let mut inner = self.inner.write();
        if let Some(p) = inner.procs.remove(&id) {
            if let Some(kill) = &p.kill {
                kill.cancel();
            }
            inner.by_query_pid.remove(&p.query_pid);
        }
    }

    /// Mark the connection as executing `query` and install the kill
    /// callback into the returned context. Fails with `PidAlreadyUsed` if
    /// the context's pid collides with a live query.
    pub fn begin_query(self: &Arc<Self>, ctx: Context, query: &str) -> Result<Context> {
        let mut inner = self.inner.write();
        let id = ctx.session().id();
        let pid = ctx.pid();
        if inner.by_query_pid.contains_key(&pid) {
            return Err(Error::PidAlreadyUsed(pid));
        }
        let proc = inner
            .procs
            .get_mut(&id)
            .ok_or_else(|| Error::Internal("connection not registered with process list".into()))?;

        let token = CancellationToken::new();
        proc.command = ProcessCommand::Query;
        proc.query = query.to_string();
        proc.query_pid = pid;
        proc.started_at = Utc::now();
        proc.kill = Some(token.clone());
        proc.progress = HashMap::new();
        inner.by_query_pid.insert(pid, id);

        Ok(ctx
            .with_query(query)
            .with_cancel(token)
            .with_process_list(Arc::clone(self)))
    }

    /// Return the connection to Sleep and cancel the query's token so any
    /// orphaned iterator work stops.
    pub fn end_query(&self, ctx: &Context) {
        let mut inner = self.inner.write();
        let id = ctx.session().id();
        let pid = ctx.pid();
        inner.by_query_pid.remove(&pid);
        if let Some(p) = inner.procs.get_mut(&id) {
            if p.query_pid == pid {
                p.command = ProcessCommand::Sleep;
                p.query = String::new();
                p.started_at = Utc::now();
                if let Some(kill) = p.kill.take() {
                    kill.cancel();
                }
                p.query_pid = 0;
                p.progress = HashMap::new();
            }
        }
    }

    /// Kill the query running on the given connection.
    pub fn kill(&self, connection_id: u32) {
        let inner = self.inner.read();
        if let Some(p) = inner.procs.get(&connection_id) {
            if let Some(kill) = &p.kill {
                tracing::info!(pid = p.query_pid, "kill query");
                kill.cancel();
            }
        }
    }

    /// A snapshot of all current processes.
    pub fn processes(&self) -> Vec<Process> {
        let inner = self.inner.read();
        let mut procs: Vec<Process> = inner.procs.values().cloned().collect();
        procs.sort_by_key(|p| p.connection);
        procs
    }

    pub fn add_table_progress(&self, pid: u64, name: &str, total: i64) {
        let mut inner = self.inner.write();
        if let Some(p) = Self::proc_by_pid(&mut inner, pid) {
            p.progress
                .entry(name.to_string())
                .and_modify(|t| t.progress.total = total)
                .or_insert_with(|| TableProgress::new(name, total));
        }
    }

    pub fn update_table_progress(&self, pid: u64, name: &str, delta: i64) {
        let mut inner = self.inner.write();
        if let Some(p) = Self::proc_by_pid(&mut inner, pid) {
            p.progress
                .entry(name.to_string())
                .or_insert_with(|| TableProgress::new(name, -1))
                .progress
                .done += delta;
        }
    }

    pub fn remove_table_progress(&self, pid: u64, name: &str) {
        let mut inner = self.inner.write();
        if let Some(p) = Self::proc_by_pid(&mut inner, pid) {
            p.progress.remove(name);
        }
    }

    pub fn add_partition_progress(&self, pid: u64, table: &str, partition: &str, total: i64) {
        let mut inner = self.inner.write();
        if let Some(p) = Self::proc_by_pid(&mut inner, pid) {
            if let Some(t) = p.progress.get_mut(table) {
                t.partitions
                    .entry(partition.to_string())
                    .and_modify(|pp| pp.progress.total = total)
                    .or_insert_with(|| PartitionProgress {
                        progress: Progress {
                            name: partition.to_string(),
                            done: 0,
                            total,
                        },
                    });
            }
        }
    }

    pub fn update_partition_progress(&self, pid: u64, table: &str, partition: &str, delta: i64) {
        let mut inner = self.inner.write();
        if let Some(p) = Self::proc_by_pid(&mut inner, pid) {
            if let Some(t) = p.progress.get_mut(table) {
                t.partitions
                    .entry(partition.to_string())
                    .or_insert_with(|| PartitionProgress {
                        progress: Progress {
                            name: partition.to_string(),
                            done: 0,
                            total: -1,
                        },
                    })
                    .progress
                    .done += delta;
            }
        }
    }

    pub fn remove_partition_progress(&self, pid: u64, table: &str, partition: &str) {
        let mut inner = self.inner.write();
        if let Some(p) = Self::proc_by_pid(&mut inner, pid) {
            if let Some(t) = p.progress.get_mut(table) {
                t.partitions.remove(partition);
            }
        }
    }

    fn proc_by_pid<'a>(inner: &'a mut Inner, pid: u64) -> Option<&'a mut Process> {
        let id = *inner.by_query_pid.get(&pid)?;
        inner.procs.get_mut(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Client;

    fn ready_session(list: &Arc<ProcessList>, id: u32, addr: &str) -> Arc<Session> {
        list.add_connection(id, addr);
        let session = Session::new(
            id,
            Client {
                user: "foo".into(),
                address: addr.into(),
                capabilities: 0,
            },
        );
        list.connection_ready(&session);
        session
    }

    #[test]
    fn test_begin_query_tracks_and_end_query_sleeps() -> crate::error::Result<()> {
        let list = ProcessList::new();
        let session = ready_session(&list, 1, "127.0.0.1:34567");

        let ctx = Context::new(Arc::clone(&session)).with_pid(list.reserve_pid());
        let ctx = list.begin_query(ctx, "SELECT foo")?;

        let procs = list.processes();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].command, ProcessCommand::Query);
        assert_eq!(procs[0].query, "SELECT foo");

        list.end_query(&ctx);
        let procs = list.processes();
        assert_eq!(procs[0].command, ProcessCommand::Sleep);
        assert!(ctx.check_cancelled().is_err());
        Ok(())
    }

    #[test]
    fn test_duplicate_pid_rejected() -> crate::error::Result<()> {
        let list = ProcessList::new();
        let s1 = ready_session(&list, 1, "a");
        let s2 = ready_session(&list, 2, "b");

        let ctx1 = Context::new(s1).with_pid(7);
        let _ctx1 = list.begin_query(ctx1, "SELECT 1")?;

        let ctx2 = Context::new(s2).with_pid(7);
        assert_eq!(
            list.begin_query(ctx2, "SELECT 2").unwrap_err(),
            Error::PidAlreadyUsed(7)
        );
        Ok(())
    }

    #[test]
    fn test_kill_cancels_context() -> crate::error::Result<()> {
        let list = ProcessList::new();
        let session = ready_session(&list, 1, "a");
        let ctx = Context::new(session).with_pid(list.reserve_pid());
        let ctx = list.begin_query(ctx, "SELECT SLEEP(10)")?;

        assert!(ctx.check_cancelled().is_ok());
        list.kill(1);
        assert_eq!(ctx.check_cancelled(), Err(Error::Cancelled));
        Ok(())
    }

    #[test]
    fn test_progress_text_rendering() -> crate::error::Result<()> {
        let list = ProcessList::new();
        let session = ready_session(&list, 1, "127.0.0.1:34567");
        let ctx = Context::new(session).with_pid(1);
        let _ctx = list.begin_query(ctx, "SELECT foo")?;

        list.add_table_progress(1, "a", 5);
        list.add_table_progress(1, "b", 6);
        list.update_table_progress(1, "a", 3);
        list.update_table_progress(1, "a", 1);
        list.add_partition_progress(1, "a", "a-1", -1);
        list.update_partition_progress(1, "a", "a-1", 7);
        list.add_partition_progress(1, "a", "a-2", -1);
        list.update_partition_progress(1, "a", "a-2", 9);
        list.update_table_progress(1, "b", 2);

        let procs = list.processes();
        assert_eq!(
            procs[0].progress_text(),
            "\na (4/5 partitions)\n ├─ a-1 (7/? rows)\n └─ a-2 (9/? rows)\n\nb (2/6 partitions)\n"
        );
        Ok(())
    }

    #[test]
    fn test_remove_connection_kills_in_flight_query() -> crate::error::Result<()> {
        let list = ProcessList::new();
        let session = ready_session(&list, 1, "a");
        let ctx = Context::new(session).with_pid(list.reserve_pid());
        let ctx = list.begin_query(ctx, "SELECT 1")?;

        list.remove_connection(1);
        assert_eq!(ctx.check_cancelled(), Err(Error::Cancelled));
        assert!(list.processes().is_empty());
        Ok(())
    }
}
