//! System variables
//!
//! Process-wide defaults are initialised once at startup and never mutated
//! afterwards except through the persisted-variables admin path. Sessions
//! overlay their own values on top of the defaults.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::types::Value;

/// Scope of a SET statement target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    Session,
    Global,
    /// An `@name` user variable.
    User,
}

/// The process-wide system variable defaults, in SHOW VARIABLES order.
static DEFAULTS: LazyLock<Vec<(&'static str, Value)>> = LazyLock::new(|| {
    vec![
        ("autocommit", Value::I64(1)),
        ("character_set_results", Value::Str("utf8mb4".into())),
        ("collation_connection", Value::Str("utf8mb4_0900_ai_ci".into())),
        ("cte_max_recursion_depth", Value::I64(1000)),
        // Aggregation and sort buffers are asked to dispose past this size.
        ("max_memory", Value::I64(512 * 1024 * 1024)),
        ("max_sp_recursion_depth", Value::I64(0)),
        ("net_read_timeout", Value::I64(30)),
        ("net_write_timeout", Value::I64(60)),
        ("sql_mode", Value::Str("".into())),
        ("sql_select_limit", Value::I64(i64::MAX)),
        ("version", Value::Str("8.0.33-opalsql".into())),
    ]
});

/// Durable storage for global defaults set with SET PERSIST.
pub trait PersistedVariables: Send + Sync {
    fn persist(&self, name: &str, value: Value);
    fn reset_persisted(&self, name: &str);
    fn get_persisted_map(&self) -> HashMap<String, Value>;
}

/// An in-process persisted-variable store; embedders swap in a durable one.
#[derive(Default)]
pub struct InMemoryPersistedVariables {
    values: RwLock<HashMap<String, Value>>,
}

impl PersistedVariables for InMemoryPersistedVariables {
    fn persist(&self, name: &str, value: Value) {
        self.values.write().insert(name.to_lowercase(), value);
    }

    fn reset_persisted(&self, name: &str) {
        self.values.write().remove(&name.to_lowercase());
    }

    fn get_persisted_map(&self) -> HashMap<String, Value> {
        self.values.read().clone()
    }
}

/// The session-scope overlay over the process-wide defaults.
#[derive(Debug, Default, Clone)]
pub struct SessionVariables {
    overrides: HashMap<String, Value>,
}

impl SessionVariables {
    /// Read a variable: session override first, then the global default.
    pub fn get(&self, name: &str) -> Result<Value> {
        let lower = name.to_lowercase();
        if let Some(v) = self.overrides.get(&lower) {
            return Ok(v.clone());
        }
        global_default(&lower)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let lower = name.to_lowercase();
        // Unknown variables are rejected; MySQL does the same.
        global_default(&lower)?;
        self.overrides.insert(lower, value);
        Ok(())
    }

    /// All visible variables, defaults overlaid with session values.
    pub fn all(&self) -> Vec<(String, Value)> {
        DEFAULTS
            .iter()
            .map(|(name, default)| {
                let value = self
                    .overrides
                    .get(*name)
                    .cloned()
                    .unwrap_or_else(|| default.clone());
                (name.to_string(), value)
            })
            .collect()
    }
}

/// The startup default for a system variable.
pub fn global_default(name: &str) -> Result<Value> {
    DEFAULTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| Error::InvalidValue(format!("unknown system variable: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_visible() -> Result<()> {
        let vars = SessionVariables::default();
        assert_eq!(vars.get("cte_max_recursion_depth")?, Value::I64(1000));
        assert_eq!(vars.get("CTE_MAX_RECURSION_DEPTH")?, Value::I64(1000));
        Ok(())
    }

    #[test]
    fn test_session_override_shadows_default() -> Result<()> {
        let mut vars = SessionVariables::default();
        vars.set("sql_select_limit", Value::I64(10))?;
        assert_eq!(vars.get("sql_select_limit")?, Value::I64(10));
        assert_eq!(global_default("sql_select_limit")?, Value::I64(i64::MAX));
        Ok(())
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let mut vars = SessionVariables::default();
        assert!(vars.set("no_such_variable", Value::I64(1)).is_err());
        assert!(vars.get("no_such_variable").is_err());
    }

    #[test]
    fn test_persisted_map_round_trip() {
        let store = InMemoryPersistedVariables::default();
        store.persist("max_memory", Value::I64(1024));
        assert_eq!(
            store.get_persisted_map().get("max_memory"),
            Some(&Value::I64(1024))
        );
        store.reset_persisted("max_memory");
        assert!(store.get_persisted_map().is_empty());
    }
}
