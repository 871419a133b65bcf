//! Error types for the SQL engine
//!
//! Every failure surfaced by the engine falls into one of the kinds below.
//! Cancellation has its own kind so connection handlers can tell a killed
//! query apart from a business error. Each kind maps to a MySQL error number
//! and SQLSTATE; kinds without a published mapping surface as 1105/HY000.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Parse errors are produced by the external parser and passed through.
    #[error("syntax error: {0}")]
    Parse(String),

    // Resolution errors
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("ambiguous column name: {0}")]
    AmbiguousColumn(String),

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("table function not found: {0}")]
    TableFunctionNotFound(String),

    #[error("procedure not found: {0}")]
    ProcedureNotFound(String),

    #[error("prepared statement not found: {0}")]
    PreparedStatementNotFound(String),

    #[error("recursive definition of {kind} {name}")]
    RecursiveDefinition { kind: &'static str, name: String },

    // Type errors
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("value out of range for {data_type}: {value}")]
    OutOfRange { data_type: String, value: String },

    #[error("invalid cast from {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    // Semantic errors
    #[error("there can't be more than 1 instance of EXPLODE in a SELECT")]
    MultipleGenerators,

    #[error("argument of type {0} given to EXPLODE, expecting array")]
    ExplodeNotArray(String),

    #[error("expression {0} is not in the GROUP BY clause and is not functionally dependent on it")]
    NotGrouped(String),

    #[error("invalid default value for column {0}")]
    InvalidDefault(String),

    #[error("wrong number of arguments to {name}: expected {expected}, got {actual}")]
    InvalidArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    // Constraint violations
    #[error("duplicate primary key entry: {0}")]
    PrimaryKeyViolation(String),

    #[error("duplicate unique key entry: {0}")]
    UniqueKeyViolation(String),

    #[error("column {0} cannot be null")]
    NotNullViolation(String),

    #[error("check constraint {0} violated")]
    CheckViolation(String),

    #[error("foreign key constraint {0} violated")]
    ForeignKeyViolation(String),

    // Runtime errors
    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid JSON path expression: {0}")]
    JsonPath(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    // Storage driver errors
    #[error("io error: {0}")]
    Io(String),

    // Process & session errors
    #[error("query pid {0} is already in use")]
    PidAlreadyUsed(u64),

    #[error("connection not found: {0}")]
    ConnectionNotFound(u32),

    #[error("table {0} was not locked with LOCK TABLES")]
    TableNotLocked(String),

    #[error("table {0} does not support locking")]
    TableNotLockable(String),

    #[error("query was killed")]
    Cancelled,

    #[error("query exceeded its deadline")]
    DeadlineExceeded,

    #[error("replication not supported")]
    ReplicationUnsupported,

    // Invariant breaches; never expected to surface from a correct engine.
    #[error("internal error: invalid child count for {node}: expected {expected}, got {actual}")]
    InvalidChildCount {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("internal error: invalid expression count for {node}: expected {expected}, got {actual}")]
    InvalidExpressionCount {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The MySQL error number for this error.
    pub fn number(&self) -> u16 {
        use Error::*;
        match self {
            Parse(_) => 1064,
            DatabaseNotFound(_) => 1049,
            TableNotFound(_) => 1146,
            ColumnNotFound(_) => 1054,
            AmbiguousColumn(_) => 1052,
            FunctionNotFound(_) | TableFunctionNotFound(_) => 1305,
            ProcedureNotFound(_) => 1305,
            PreparedStatementNotFound(_) => 1243,
            RecursiveDefinition { .. } => 1462,
            TypeMismatch { .. } | InvalidValue(_) | InvalidCast { .. } => 1366,
            OutOfRange { .. } => 1264,
            MultipleGenerators | ExplodeNotArray(_) => 3156,
            NotGrouped(_) => 1055,
            InvalidDefault(_) => 1067,
            InvalidArgumentCount { .. } => 1582,
            PrimaryKeyViolation(_) | UniqueKeyViolation(_) => 1062,
            NotNullViolation(_) => 1048,
            CheckViolation(_) => 3819,
            ForeignKeyViolation(_) => 1452,
            DivisionByZero => 1365,
            JsonPath(_) => 3143,
            ConnectionNotFound(_) => 1094,
            TableNotLocked(_) | TableNotLockable(_) => 1100,
            Cancelled | DeadlineExceeded => 1317,
            ReplicationUnsupported => 3021,
            _ => 1105,
        }
    }

    /// The SQLSTATE for this error.
    pub fn sql_state(&self) -> &'static str {
        use Error::*;
        match self {
            Parse(_) => "42000",
            DatabaseNotFound(_) => "42000",
            TableNotFound(_) => "42S02",
            ColumnNotFound(_) | AmbiguousColumn(_) => "42S22",
            FunctionNotFound(_) | TableFunctionNotFound(_) | ProcedureNotFound(_) => "42000",
            NotGrouped(_) | InvalidDefault(_) => "42000",
            OutOfRange { .. } => "22003",
            MultipleGenerators | ExplodeNotArray(_) => "22018",
            PrimaryKeyViolation(_) | UniqueKeyViolation(_) | NotNullViolation(_)
            | ForeignKeyViolation(_) => "23000",
            DivisionByZero => "22012",
            Cancelled | DeadlineExceeded => "70100",
            _ => "HY000",
        }
    }

    /// Whether the error came from cancellation rather than query logic.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}
