//! Character sets, collations and coercibility
//!
//! Collations are identified by their MySQL numeric id. The table below is
//! the subset of the server's collation registry that the engine implements;
//! lookups outside it fall back to the binary collation. Coercibility
//! follows the published MySQL rules: every string expression carries a
//! `(collation, coercibility)` pair, lower coercibility wins in mixed
//! comparisons, and an unresolvable tie degrades to `binary` with the
//! weakest coercibility.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A character set known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterSet {
    Utf8mb4,
    Utf8mb3,
    Latin1,
    Ascii,
    Binary,
}

impl CharacterSet {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterSet::Utf8mb4 => "utf8mb4",
            CharacterSet::Utf8mb3 => "utf8mb3",
            CharacterSet::Latin1 => "latin1",
            CharacterSet::Ascii => "ascii",
            CharacterSet::Binary => "binary",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CharacterSet::Utf8mb4 => "UTF-8 Unicode",
            CharacterSet::Utf8mb3 => "UTF-8 Unicode (BMP only)",
            CharacterSet::Latin1 => "cp1252 West European",
            CharacterSet::Ascii => "US ASCII",
            CharacterSet::Binary => "Binary pseudo charset",
        }
    }

    /// Maximum encoded length of a single character, in bytes.
    pub fn max_char_length(&self) -> usize {
        match self {
            CharacterSet::Utf8mb4 => 4,
            CharacterSet::Utf8mb3 => 3,
            CharacterSet::Latin1 | CharacterSet::Ascii | CharacterSet::Binary => 1,
        }
    }

    pub fn default_collation(&self) -> CollationId {
        match self {
            CharacterSet::Utf8mb4 => CollationId::UTF8MB4_0900_AI_CI,
            CharacterSet::Utf8mb3 => CollationId::UTF8MB3_GENERAL_CI,
            CharacterSet::Latin1 => CollationId::LATIN1_SWEDISH_CI,
            CharacterSet::Ascii => CollationId::ASCII_GENERAL_CI,
            CharacterSet::Binary => CollationId::BINARY,
        }
    }

    /// All character sets, in SHOW CHARACTER SET order.
    pub fn all() -> &'static [CharacterSet] {
        &[
            CharacterSet::Ascii,
            CharacterSet::Binary,
            CharacterSet::Latin1,
            CharacterSet::Utf8mb3,
            CharacterSet::Utf8mb4,
        ]
    }
}

/// A collation id, matching the MySQL collation registry numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollationId(pub u16);

impl CollationId {
    pub const LATIN1_SWEDISH_CI: CollationId = CollationId(8);
    pub const ASCII_GENERAL_CI: CollationId = CollationId(11);
    pub const UTF8MB3_GENERAL_CI: CollationId = CollationId(33);
    pub const UTF8MB4_GENERAL_CI: CollationId = CollationId(45);
    pub const UTF8MB4_BIN: CollationId = CollationId(46);
    pub const BINARY: CollationId = CollationId(63);
    pub const UTF8MB4_0900_AI_CI: CollationId = CollationId(255);
    pub const UTF8MB4_0900_BIN: CollationId = CollationId(309);

    /// The server default collation.
    pub const DEFAULT: CollationId = CollationId::UTF8MB4_0900_AI_CI;

    pub fn name(&self) -> &'static str {
        match *self {
            CollationId::LATIN1_SWEDISH_CI => "latin1_swedish_ci",
            CollationId::ASCII_GENERAL_CI => "ascii_general_ci",
            CollationId::UTF8MB3_GENERAL_CI => "utf8mb3_general_ci",
            CollationId::UTF8MB4_GENERAL_CI => "utf8mb4_general_ci",
            CollationId::UTF8MB4_BIN => "utf8mb4_bin",
            CollationId::BINARY => "binary",
            CollationId::UTF8MB4_0900_AI_CI => "utf8mb4_0900_ai_ci",
            CollationId::UTF8MB4_0900_BIN => "utf8mb4_0900_bin",
            _ => "binary",
        }
    }

    pub fn character_set(&self) -> CharacterSet {
        match *self {
            CollationId::LATIN1_SWEDISH_CI => CharacterSet::Latin1,
            CollationId::ASCII_GENERAL_CI => CharacterSet::Ascii,
            CollationId::UTF8MB3_GENERAL_CI => CharacterSet::Utf8mb3,
            CollationId::BINARY => CharacterSet::Binary,
            _ => CharacterSet::Utf8mb4,
        }
    }

    /// Look up a collation by name, case-insensitively.
    pub fn from_name(name: &str) -> Result<CollationId> {
        let lower = name.to_ascii_lowercase();
        let id = match lower.as_str() {
            "latin1_swedish_ci" => CollationId::LATIN1_SWEDISH_CI,
            "ascii_general_ci" => CollationId::ASCII_GENERAL_CI,
            "utf8_general_ci" | "utf8mb3_general_ci" => CollationId::UTF8MB3_GENERAL_CI,
            "utf8mb4_general_ci" => CollationId::UTF8MB4_GENERAL_CI,
            "utf8mb4_bin" => CollationId::UTF8MB4_BIN,
            "binary" => CollationId::BINARY,
            "utf8mb4_0900_ai_ci" => CollationId::UTF8MB4_0900_AI_CI,
            "utf8mb4_0900_bin" => CollationId::UTF8MB4_0900_BIN,
            _ => return Err(Error::InvalidValue(format!("unknown collation: {name}"))),
        };
        Ok(id)
    }

    /// Whether this collation compares case-insensitively.
    pub fn is_case_insensitive(&self) -> bool {
        !matches!(
            *self,
            CollationId::BINARY | CollationId::UTF8MB4_BIN | CollationId::UTF8MB4_0900_BIN
        )
    }

    /// Compare two strings under this collation.
    pub fn compare(&self, a: &str, b: &str) -> std::cmp::Ordering {
        if self.is_case_insensitive() {
            a.to_lowercase().cmp(&b.to_lowercase())
        } else {
            a.cmp(b)
        }
    }

    /// Whether two strings are equal under this collation.
    pub fn equals(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == std::cmp::Ordering::Equal
    }
}

impl Default for CollationId {
    fn default() -> CollationId {
        CollationId::DEFAULT
    }
}

impl fmt::Display for CollationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How strongly an expression's collation dominates in mixed-collation
/// operations. Lower values dominate higher ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Coercibility {
    /// An explicit COLLATE clause.
    Explicit = 0,
    /// Concatenation of two strings with different collations.
    None = 1,
    /// A column reference or routine parameter.
    Implicit = 2,
    /// A system constant such as USER() or VERSION().
    SystemConstant = 3,
    /// A string literal.
    Coercible = 4,
    /// A numeric or temporal value.
    Numeric = 5,
    /// NULL or an expression derived from NULL.
    Ignorable = 6,
    /// No collation applies at all; only binary remains.
    ImplicitBinary = 7,
}

impl Coercibility {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }
}

/// The `(collation, coercibility)` pair every expression evaluates to.
pub type Coercion = (CollationId, Coercibility);

/// Resolve the collation of an operation over two operands.
///
/// Lower coercibility dominates. An equal coercibility requires equal
/// collations; otherwise the result degrades to `(binary, ImplicitBinary)`,
/// except that two Ignorable operands stay Ignorable.
pub fn merge_coercion(left: Coercion, right: Coercion) -> Coercion {
    use std::cmp::Ordering::*;
    match left.1.cmp(&right.1) {
        Less => left,
        Greater => right,
        Equal => {
            if left.0 == right.0 {
                left
            } else if left.1 == Coercibility::Ignorable {
                (CollationId::BINARY, Coercibility::Ignorable)
            } else {
                (CollationId::BINARY, Coercibility::ImplicitBinary)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collation_names_round_trip() {
        for id in [
            CollationId::LATIN1_SWEDISH_CI,
            CollationId::UTF8MB4_BIN,
            CollationId::BINARY,
            CollationId::UTF8MB4_0900_AI_CI,
        ] {
            assert_eq!(CollationId::from_name(id.name()).unwrap(), id);
        }
        assert!(CollationId::from_name("klingon_ci").is_err());
    }

    #[test]
    fn test_case_insensitive_compare() {
        let ci = CollationId::UTF8MB4_0900_AI_CI;
        assert!(ci.equals("Abc", "aBC"));
        let bin = CollationId::UTF8MB4_BIN;
        assert!(!bin.equals("Abc", "aBC"));
    }

    #[test]
    fn test_merge_lower_coercibility_dominates() {
        let column = (CollationId::LATIN1_SWEDISH_CI, Coercibility::Implicit);
        let literal = (CollationId::UTF8MB4_0900_AI_CI, Coercibility::Coercible);
        assert_eq!(merge_coercion(column, literal), column);
        assert_eq!(merge_coercion(literal, column), column);
    }

    #[test]
    fn test_merge_equal_coercibility_conflict_degrades() {
        let a = (CollationId::LATIN1_SWEDISH_CI, Coercibility::Implicit);
        let b = (CollationId::UTF8MB4_BIN, Coercibility::Implicit);
        assert_eq!(
            merge_coercion(a, b),
            (CollationId::BINARY, Coercibility::ImplicitBinary)
        );
    }

    #[test]
    fn test_merge_ignorable_stays_ignorable() {
        let a = (CollationId::UTF8MB4_0900_AI_CI, Coercibility::Ignorable);
        let b = (CollationId::LATIN1_SWEDISH_CI, Coercibility::Ignorable);
        assert_eq!(merge_coercion(a, b).1, Coercibility::Ignorable);
    }
}
