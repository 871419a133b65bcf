//! Session state
//!
//! A session is created when a connection is established and lives until
//! disconnect. It carries the current database, system-variable overlay,
//! user variables, the warnings list, prepared statements, and a transaction
//! state stub. Sessions are shared as `Arc`s; interior state sits behind a
//! read/write lock that is never held across an iterator step.

pub mod locks;
pub mod memory;
pub mod variables;

pub use locks::LockRegistry;
pub use memory::{CacheHandle, Disposable, MemoryManager};
pub use variables::{
    global_default, InMemoryPersistedVariables, PersistedVariables, SessionVariables,
    VariableScope,
};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::Result;
use crate::types::{CharacterSet, CollationId, Value};

/// The client identity attached to a session.
#[derive(Debug, Clone, Default)]
pub struct Client {
    pub user: String,
    pub address: String,
    /// Client capability flags, as negotiated by the wire layer.
    pub capabilities: u32,
}

/// A warning attached to the session, surfaced by SHOW WARNINGS.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub level: &'static str,
    pub code: u16,
    pub message: String,
}

impl Warning {
    pub fn new(code: u16, message: impl Into<String>) -> Warning {
        Warning {
            level: "Warning",
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    current_database: Option<String>,
    variables: SessionVariables,
    user_variables: HashMap<String, Value>,
    warnings: Vec<Warning>,
    in_transaction: bool,
    collation_results: CollationId,
}

pub struct Session {
    id: u32,
    client: Client,
    created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(id: u32, client: Client) -> Arc<Session> {
        Arc::new(Session {
            id,
            client,
            created_at: Utc::now(),
            state: RwLock::new(SessionState {
                collation_results: CollationId::DEFAULT,
                ..SessionState::default()
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn current_database(&self) -> Option<String> {
        self.state.read().current_database.clone()
    }

    pub fn set_current_database(&self, name: impl Into<String>) {
        self.state.write().current_database = Some(name.into());
    }

    pub fn get_variable(&self, name: &str) -> Result<Value> {
        self.state.read().variables.get(name)
    }

    pub fn set_variable(&self, name: &str, value: Value) -> Result<()> {
        self.state.write().variables.set(name, value)
    }

    /// Snapshot of all visible system variables.
    pub fn variables(&self) -> Vec<(String, Value)> {
        self.state.read().variables.all()
    }

    pub fn get_user_variable(&self, name: &str) -> Option<Value> {
        self.state.read().user_variables.get(&name.to_lowercase()).cloned()
    }

    pub fn set_user_variable(&self, name: &str, value: Value) {
        self.state
            .write()
            .user_variables
            .insert(name.to_lowercase(), value);
    }

    pub fn warn(&self, warning: Warning) {
        self.state.write().warnings.push(warning);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.state.read().warnings.clone()
    }

    /// Cleared at the start of the next statement.
    pub fn clear_warnings(&self) {
        self.state.write().warnings.clear();
    }

    pub fn in_transaction(&self) -> bool {
        self.state.read().in_transaction
    }

    pub fn set_in_transaction(&self, active: bool) {
        self.state.write().in_transaction = active;
    }

    pub fn collation_results(&self) -> CollationId {
        self.state.read().collation_results
    }

    pub fn character_set_results(&self) -> CharacterSet {
        self.collation_results().character_set()
    }

    /// The session read timeout, from `net_read_timeout`, in seconds.
    pub fn read_timeout_secs(&self) -> u64 {
        self.get_variable("net_read_timeout")
            .ok()
            .and_then(|v| v.to_i128().ok())
            .map(|v| v.max(0) as u64)
            .unwrap_or(30)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.client.user)
            .field("address", &self.client.address)
            .finish()
    }
}

/// Factory used by the connection layer to build sessions.
pub trait SessionBuilder: Send + Sync {
    fn build(&self, id: u32, client: Client) -> Arc<Session>;
}

/// The stock builder; embedders provide their own to attach auth state.
#[derive(Default)]
pub struct DefaultSessionBuilder;

impl SessionBuilder for DefaultSessionBuilder {
    fn build(&self, id: u32, client: Client) -> Arc<Session> {
        Session::new(id, client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_accumulate_and_clear() {
        let session = Session::new(1, Client::default());
        session.warn(Warning::new(1264, "out of range"));
        session.warn(Warning::new(1292, "truncated"));
        assert_eq!(session.warnings().len(), 2);
        session.clear_warnings();
        assert!(session.warnings().is_empty());
    }

    #[test]
    fn test_user_variables_are_case_insensitive() {
        let session = Session::new(1, Client::default());
        session.set_user_variable("Foo", Value::I64(1));
        assert_eq!(session.get_user_variable("foo"), Some(Value::I64(1)));
    }

    #[test]
    fn test_current_database() {
        let session = Session::new(1, Client::default());
        assert_eq!(session.current_database(), None);
        session.set_current_database("mydb");
        assert_eq!(session.current_database(), Some("mydb".into()));
    }
}
