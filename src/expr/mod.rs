//! Expression trees
//!
//! An expression produces a value per input row. Expressions are immutable;
//! rewriting builds new instances that share unchanged subtrees. Every
//! variant exposes its children through `children` / `with_children` so the
//! analyzer can traverse uniformly, and declares a static `data_type`,
//! nullability, and `(collation, coercibility)` pair.

mod eval;
pub mod aggregate;
pub mod window;

pub(crate) use eval::like_match;

pub use aggregate::{AggregateBuffer, AggregateExpr, AggregateOp};
pub use window::{FrameBound, FrameUnit, WindowExpr, WindowFrame, WindowFunc};

use std::fmt;

use crate::error::{Error, Result};
use crate::types::{
    merge_coercion, Coercibility, Coercion, CollationId, DataType, Value,
};

/// A resolved reference to a column of the input row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Ordinal within the input schema.
    pub index: usize,
    pub name: String,
    /// Source table, when the column comes straight from a relation.
    pub table: Option<String>,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnRef {
    pub fn new(index: usize, name: impl Into<String>, data_type: DataType) -> ColumnRef {
        ColumnRef {
            index,
            name: name.into(),
            table: None,
            data_type,
            nullable: true,
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    /// The null-safe `<=>` operator; the only comparison where NULL equals NULL.
    NullSafeEqual,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::NullSafeEqual => "<=>",
            CompareOp::NotEqual => "!=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEqual => ">=",
            CompareOp::Less => "<",
            CompareOp::LessEqual => "<=",
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Remainder => "%",
        }
    }
}

/// Bit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
}

impl BitOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BitOp::And => "&",
            BitOp::Or => "|",
            BitOp::Xor => "^",
            BitOp::ShiftLeft => "<<",
            BitOp::ShiftRight => ">>",
        }
    }
}

/// INTERVAL units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Microsecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// A sort key: expression, direction, and null placement.
#[derive(Debug, Clone)]
pub struct SortField {
    pub expr: Expression,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortField {
    pub fn asc(expr: Expression) -> SortField {
        SortField {
            expr,
            ascending: true,
            nulls_first: true,
        }
    }

    pub fn desc(expr: Expression) -> SortField {
        SortField {
            expr,
            ascending: false,
            nulls_first: false,
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.expr,
            if self.ascending { "ASC" } else { "DESC" }
        )
    }
}

/// How a subquery expression is consumed.
#[derive(Debug, Clone)]
pub enum SubqueryKind {
    /// A scalar subquery producing at most one value.
    Scalar,
    /// EXISTS (...) / NOT EXISTS (...)
    Exists { negated: bool },
    /// expr IN (...) / expr NOT IN (...)
    In {
        operand: Box<Expression>,
        negated: bool,
    },
}

/// A subquery embedded in an expression, carrying its own plan.
#[derive(Debug, Clone)]
pub struct SubqueryExpr {
    pub plan: crate::plan::Node,
    pub kind: SubqueryKind,
}

#[derive(Debug, Clone)]
pub enum Expression {
    /// A constant value.
    Literal(Value),
    /// A resolved column reference, looked up by ordinal.
    Column(ColumnRef),
    /// A column of an enclosing query, resolved through the scope chain.
    /// `depth` counts outward: 0 is the nearest enclosing row.
    OuterColumn { depth: usize, column: ColumnRef },
    /// An unresolved column name; removed by the analyzer.
    UnresolvedColumn {
        table: Option<String>,
        name: String,
    },
    /// A prepared-statement placeholder (0-indexed); bound at EXECUTE time.
    Parameter(usize),
    /// `*` or `t.*`; expanded by the analyzer.
    Star { table: Option<String> },
    /// expr AS name
    Alias(String, Box<Expression>),

    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Xor(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),

    Compare(CompareOp, Box<Expression>, Box<Expression>),
    /// expr IS [NOT] NULL
    IsNull(Box<Expression>, bool),

    Arithmetic(ArithmeticOp, Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
    Bit(BitOp, Box<Expression>, Box<Expression>),
    BitNot(Box<Expression>),

    /// expr LIKE pattern, under the operands' collation.
    Like(Box<Expression>, Box<Expression>),
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    Case {
        operand: Option<Box<Expression>>,
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },

    Cast(Box<Expression>, DataType),
    /// expr COLLATE collation
    Collate(Box<Expression>, CollationId),
    /// INTERVAL expr unit, only valid as a temporal-arithmetic operand.
    Interval(Box<Expression>, IntervalUnit),

    /// A function call before registry resolution.
    UnresolvedFunction {
        name: String,
        args: Vec<Expression>,
    },
    /// A resolved scalar function call with its validated return type.
    Function {
        name: String,
        args: Vec<Expression>,
        return_type: DataType,
    },
    /// An aggregate over the rows of a group.
    Aggregate(AggregateExpr),
    /// A window function over a partitioned frame.
    Window(Box<WindowExpr>),
    /// A subquery producing a value, an existence test, or a membership test.
    Subquery(Box<SubqueryExpr>),
    /// EXPLODE(array); lifted into a Generate node by the analyzer.
    Explode(Box<Expression>),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Expression {
        Expression::Literal(value.into())
    }

    pub fn column(name: &str) -> Expression {
        Expression::UnresolvedColumn {
            table: None,
            name: name.to_string(),
        }
    }

    pub fn qualified_column(table: &str, name: &str) -> Expression {
        Expression::UnresolvedColumn {
            table: Some(table.to_string()),
            name: name.to_string(),
        }
    }

    pub fn alias(self, name: &str) -> Expression {
        Expression::Alias(name.to_string(), Box::new(self))
    }

    pub fn equals(self, other: Expression) -> Expression {
        Expression::Compare(CompareOp::Equal, Box::new(self), Box::new(other))
    }

    /// The display name of this expression when it becomes a result column.
    pub fn result_name(&self) -> String {
        match self {
            Expression::Alias(name, _) => name.clone(),
            Expression::Column(c) => c.name.clone(),
            Expression::UnresolvedColumn { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }

    /// The source table of this expression, if it is a bare column.
    pub fn source_table(&self) -> Option<String> {
        match self {
            Expression::Column(c) => c.table.clone(),
            Expression::Alias(_, child) => child.source_table(),
            _ => None,
        }
    }

    /// Direct children, in a stable order matching `with_children`.
    pub fn children(&self) -> Vec<&Expression> {
        use Expression::*;
        match self {
            Literal(_) | Column(_) | OuterColumn { .. } | UnresolvedColumn { .. }
            | Parameter(_) | Star { .. } => vec![],
            Alias(_, c) | Not(c) | Negate(c) | BitNot(c) | IsNull(c, _) | Cast(c, _)
            | Collate(c, _) | Interval(c, _) | Explode(c) => vec![c],
            And(l, r) | Or(l, r) | Xor(l, r) | Like(l, r) => vec![l, r],
            Compare(_, l, r) | Arithmetic(_, l, r) | Bit(_, l, r) => vec![l, r],
            InList { expr, list, .. } => {
                let mut out: Vec<&Expression> = vec![expr];
                out.extend(list.iter());
                out
            }
            Between {
                expr, low, high, ..
            } => vec![expr, low, high],
            Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut out: Vec<&Expression> = vec![];
                if let Some(op) = operand {
                    out.push(op);
                }
                for (w, t) in when_clauses {
                    out.push(w);
                    out.push(t);
                }
                if let Some(e) = else_clause {
                    out.push(e);
                }
                out
            }
            UnresolvedFunction { args, .. } | Function { args, .. } => args.iter().collect(),
            Aggregate(agg) => agg.args.iter().collect(),
            Window(w) => w.children(),
            Subquery(sq) => match &sq.kind {
                SubqueryKind::In { operand, .. } => vec![operand],
                _ => vec![],
            },
        }
    }

    /// Rebuild this expression with new children. The child count must match
    /// `children()`.
    pub fn with_children(&self, children: Vec<Expression>) -> Result<Expression> {
        use Expression::*;
        let expected = self.children().len();
        if children.len() != expected {
            return Err(Error::InvalidExpressionCount {
                node: self.to_string(),
                expected,
                actual: children.len(),
            });
        }
        let mut it = children.into_iter();
        let mut next = || it.next().expect("arity checked above");
        Ok(match self {
            Literal(_) | Column(_) | OuterColumn { .. } | UnresolvedColumn { .. }
            | Parameter(_) | Star { .. } => self.clone(),
            Alias(name, _) => Alias(name.clone(), Box::new(next())),
            Not(_) => Not(Box::new(next())),
            Negate(_) => Negate(Box::new(next())),
            BitNot(_) => BitNot(Box::new(next())),
            IsNull(_, negated) => IsNull(Box::new(next()), *negated),
            Cast(_, t) => Cast(Box::new(next()), t.clone()),
            Collate(_, c) => Collate(Box::new(next()), *c),
            Interval(_, unit) => Interval(Box::new(next()), *unit),
            Explode(_) => Explode(Box::new(next())),
            And(..) => And(Box::new(next()), Box::new(next())),
            Or(..) => Or(Box::new(next()), Box::new(next())),
            Xor(..) => Xor(Box::new(next()), Box::new(next())),
            Like(..) => Like(Box::new(next()), Box::new(next())),
            Compare(op, ..) => Compare(*op, Box::new(next()), Box::new(next())),
            Arithmetic(op, ..) => Arithmetic(*op, Box::new(next()), Box::new(next())),
            Bit(op, ..) => Bit(*op, Box::new(next()), Box::new(next())),
            InList { negated, list, .. } => {
                let expr = Box::new(next());
                let list = (0..list.len()).map(|_| next()).collect();
                InList {
                    expr,
                    list,
                    negated: *negated,
                }
            }
            Between { negated, .. } => Between {
                expr: Box::new(next()),
                low: Box::new(next()),
                high: Box::new(next()),
                negated: *negated,
            },
            Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand = operand.as_ref().map(|_| Box::new(next()));
                let when_clauses = (0..when_clauses.len()).map(|_| (next(), next())).collect();
                let else_clause = else_clause.as_ref().map(|_| Box::new(next()));
                Case {
                    operand,
                    when_clauses,
                    else_clause,
                }
            }
            UnresolvedFunction { name, args } => UnresolvedFunction {
                name: name.clone(),
                args: (0..args.len()).map(|_| next()).collect(),
            },
            Function {
                name,
                args,
                return_type,
            } => Function {
                name: name.clone(),
                args: (0..args.len()).map(|_| next()).collect(),
                return_type: return_type.clone(),
            },
            Aggregate(agg) => Aggregate(AggregateExpr {
                op: agg.op,
                args: (0..agg.args.len()).map(|_| next()).collect(),
                distinct: agg.distinct,
            }),
            Window(w) => {
                let n = w.children().len();
                Window(Box::new(
                    w.with_children((0..n).map(|_| next()).collect())?,
                ))
            }
            Subquery(sq) => match &sq.kind {
                SubqueryKind::In { negated, .. } => Subquery(Box::new(SubqueryExpr {
                    plan: sq.plan.clone(),
                    kind: SubqueryKind::In {
                        operand: Box::new(next()),
                        negated: *negated,
                    },
                })),
                _ => self.clone(),
            },
        })
    }

    /// Bottom-up rewrite. The closure returns `Some` for a replacement and
    /// `None` to keep the node; unchanged subtrees are shared, and the method
    /// itself returns `None` when nothing in the tree changed.
    pub fn transform_up(
        &self,
        f: &mut dyn FnMut(&Expression) -> Result<Option<Expression>>,
    ) -> Result<Option<Expression>> {
        let mut new_children = Vec::new();
        let mut changed = false;
        for child in self.children() {
            match child.transform_up(f)? {
                Some(new_child) => {
                    new_children.push(new_child);
                    changed = true;
                }
                None => new_children.push(child.clone()),
            }
        }
        let node = if changed {
            self.with_children(new_children)?
        } else {
            self.clone()
        };
        match f(&node)? {
            Some(replaced) => Ok(Some(replaced)),
            None if changed => Ok(Some(node)),
            None => Ok(None),
        }
    }

    /// Whether this expression and everything under it has been resolved.
    pub fn resolved(&self) -> bool {
        match self {
            Expression::UnresolvedColumn { .. }
            | Expression::UnresolvedFunction { .. }
            | Expression::Star { .. }
            | Expression::Parameter(_) => false,
            Expression::Subquery(sq) => {
                sq.plan.resolved()
                    && match &sq.kind {
                        SubqueryKind::In { operand, .. } => operand.resolved(),
                        _ => true,
                    }
            }
            other => other.children().iter().all(|c| c.resolved()),
        }
    }

    /// Whether the tree contains an aggregate outside of a window spec.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expression::Aggregate(_) => true,
            Expression::Window(_) => false,
            other => other.children().iter().any(|c| c.contains_aggregate()),
        }
    }

    /// The declared type of the produced value.
    pub fn data_type(&self) -> DataType {
        use Expression::*;
        match self {
            Literal(v) => DataType::of_value(v),
            Column(c) => c.data_type.clone(),
            OuterColumn { column, .. } => column.data_type.clone(),
            UnresolvedColumn { .. } | Parameter(_) | Star { .. } | UnresolvedFunction { .. } => {
                DataType::Null
            }
            Alias(_, c) => c.data_type(),
            And(..) | Or(..) | Xor(..) | Not(_) | Compare(..) | IsNull(..) | Like(..)
            | InList { .. } | Between { .. } => DataType::I8,
            Arithmetic(op, l, r) => {
                let promoted = l.data_type().promote(&r.data_type());
                if *op == ArithmeticOp::Divide && promoted.is_integer() {
                    DataType::Decimal(65, 4)
                } else {
                    promoted
                }
            }
            Negate(c) => c.data_type(),
            Bit(..) | BitNot(_) => DataType::U64,
            Case {
                when_clauses,
                else_clause,
                ..
            } => when_clauses
                .first()
                .map(|(_, t)| t.data_type())
                .or_else(|| else_clause.as_ref().map(|e| e.data_type()))
                .unwrap_or(DataType::Null),
            Cast(_, t) => t.clone(),
            Collate(c, collation) => match c.data_type() {
                DataType::Char(n, _) => DataType::Char(n, *collation),
                DataType::VarChar(n, _) => DataType::VarChar(n, *collation),
                DataType::Text(tier, _) => DataType::Text(tier, *collation),
                other => other,
            },
            Interval(c, _) => c.data_type(),
            Function { return_type, .. } => return_type.clone(),
            Aggregate(agg) => agg.data_type(),
            Window(w) => w.data_type(),
            Subquery(sq) => match &sq.kind {
                SubqueryKind::Scalar => sq
                    .plan
                    .schema()
                    .columns()
                    .first()
                    .map(|c| c.data_type.clone())
                    .unwrap_or(DataType::Null),
                _ => DataType::I8,
            },
            Explode(c) => match c.data_type() {
                DataType::Array(elem) => *elem,
                _ => DataType::Null,
            },
        }
    }

    /// Whether the produced value may be NULL.
    pub fn nullable(&self) -> bool {
        use Expression::*;
        match self {
            Literal(v) => v.is_null(),
            Column(c) => c.nullable,
            OuterColumn { column, .. } => column.nullable,
            Alias(_, c) => c.nullable(),
            Compare(CompareOp::NullSafeEqual, ..) | IsNull(..) => false,
            Aggregate(agg) => agg.nullable(),
            Window(w) => w.nullable(),
            Cast(c, _) | Collate(c, _) | Negate(c) | Not(c) => c.nullable(),
            Subquery(sq) => match &sq.kind {
                SubqueryKind::Scalar => true,
                _ => false,
            },
            other => other.children().iter().any(|c| c.nullable()),
        }
    }

    /// The `(collation, coercibility)` pair of this expression, per the
    /// MySQL coercibility rules.
    pub fn coercion(&self) -> Coercion {
        use Expression::*;
        match self {
            Literal(Value::Null) => (CollationId::BINARY, Coercibility::Ignorable),
            Literal(Value::Str(_)) => (CollationId::DEFAULT, Coercibility::Coercible),
            Literal(Value::Bytes(_)) => (CollationId::BINARY, Coercibility::Coercible),
            Literal(_) => (CollationId::BINARY, Coercibility::Numeric),
            Column(c) | OuterColumn { column: c, .. } => match c.data_type.collation() {
                Some(CollationId::BINARY) if !c.data_type.is_text() && !c.data_type.is_binary() => {
                    (CollationId::BINARY, Coercibility::Numeric)
                }
                Some(collation) => (collation, Coercibility::Implicit),
                None => (CollationId::BINARY, Coercibility::Numeric),
            },
            Alias(_, c) => c.coercion(),
            Collate(_, collation) => (*collation, Coercibility::Explicit),
            Cast(_, t) => match t.collation() {
                Some(collation) => (collation, Coercibility::Implicit),
                None => (CollationId::BINARY, Coercibility::Numeric),
            },
            Function { name, args, .. } => match name.to_uppercase().as_str() {
                // System constants carry their own coercibility class.
                "USER" | "CURRENT_USER" | "VERSION" | "DATABASE" | "SCHEMA" => {
                    (CollationId::DEFAULT, Coercibility::SystemConstant)
                }
                _ => {
                    if self.data_type().is_text() {
                        args.iter()
                            .map(|a| a.coercion())
                            .reduce(merge_coercion)
                            .unwrap_or((CollationId::DEFAULT, Coercibility::Coercible))
                    } else {
                        (CollationId::BINARY, Coercibility::Numeric)
                    }
                }
            },
            Aggregate(agg) if agg.data_type().is_text() => agg
                .args
                .iter()
                .map(|a| a.coercion())
                .reduce(merge_coercion)
                .unwrap_or((CollationId::BINARY, Coercibility::ImplicitBinary)),
            Subquery(sq) if matches!(sq.kind, SubqueryKind::Scalar) => {
                match self.data_type().collation() {
                    Some(collation) => (collation, Coercibility::Implicit),
                    None => (CollationId::BINARY, Coercibility::Numeric),
                }
            }
            other => {
                if other.data_type().is_text() {
                    other
                        .children()
                        .iter()
                        .map(|c| c.coercion())
                        .reduce(merge_coercion)
                        .unwrap_or((CollationId::BINARY, Coercibility::ImplicitBinary))
                } else {
                    (CollationId::BINARY, Coercibility::Numeric)
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Expression::*;
        match self {
            Literal(v) => write!(f, "{v}"),
            Column(c) => match &c.table {
                Some(t) => write!(f, "{}.{}", t, c.name),
                None => write!(f, "{}", c.name),
            },
            OuterColumn { depth, column } => write!(f, "outer({}).{}", depth, column.name),
            UnresolvedColumn { table, name } => match table {
                Some(t) => write!(f, "?{t}.{name}"),
                None => write!(f, "?{name}"),
            },
            Parameter(i) => write!(f, "?{i}"),
            Star { table } => match table {
                Some(t) => write!(f, "{t}.*"),
                None => write!(f, "*"),
            },
            Alias(name, c) => write!(f, "{c} AS {name}"),
            And(l, r) => write!(f, "({l} AND {r})"),
            Or(l, r) => write!(f, "({l} OR {r})"),
            Xor(l, r) => write!(f, "({l} XOR {r})"),
            Not(c) => write!(f, "(NOT {c})"),
            Compare(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            IsNull(c, false) => write!(f, "({c} IS NULL)"),
            IsNull(c, true) => write!(f, "({c} IS NOT NULL)"),
            Arithmetic(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            Negate(c) => write!(f, "(-{c})"),
            Bit(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            BitNot(c) => write!(f, "(~{c})"),
            Like(l, r) => write!(f, "({l} LIKE {r})"),
            InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{expr}")?;
                if *negated {
                    write!(f, " NOT")?;
                }
                write!(f, " IN (")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Between {
                expr,
                low,
                high,
                negated,
            } => {
                write!(f, "{expr}")?;
                if *negated {
                    write!(f, " NOT")?;
                }
                write!(f, " BETWEEN {low} AND {high}")
            }
            Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                write!(f, "CASE")?;
                if let Some(op) = operand {
                    write!(f, " {op}")?;
                }
                for (w, t) in when_clauses {
                    write!(f, " WHEN {w} THEN {t}")?;
                }
                if let Some(e) = else_clause {
                    write!(f, " ELSE {e}")?;
                }
                write!(f, " END")
            }
            Cast(c, t) => write!(f, "CAST({c} AS {t})"),
            Collate(c, collation) => write!(f, "({c} COLLATE {collation})"),
            Interval(c, unit) => write!(f, "INTERVAL {c} {unit:?}"),
            UnresolvedFunction { name, args } | Function { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Aggregate(agg) => write!(f, "{agg}"),
            Window(w) => write!(f, "{w}"),
            Subquery(sq) => match &sq.kind {
                SubqueryKind::Scalar => write!(f, "(subquery)"),
                SubqueryKind::Exists { negated: false } => write!(f, "EXISTS (subquery)"),
                SubqueryKind::Exists { negated: true } => write!(f, "NOT EXISTS (subquery)"),
                SubqueryKind::In { operand, negated } => {
                    write!(f, "{operand}")?;
                    if *negated {
                        write!(f, " NOT")?;
                    }
                    write!(f, " IN (subquery)")
                }
            },
            Explode(c) => write!(f, "EXPLODE({c})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expression {
        Expression::Arithmetic(
            ArithmeticOp::Add,
            Box::new(Expression::Column(ColumnRef::new(0, "a", DataType::I64))),
            Box::new(Expression::literal(1i64)),
        )
    }

    #[test]
    fn test_with_children_identity() -> Result<()> {
        let expr = sample();
        let children: Vec<Expression> = expr.children().into_iter().cloned().collect();
        let rebuilt = expr.with_children(children)?;
        assert_eq!(format!("{expr:?}"), format!("{rebuilt:?}"));
        Ok(())
    }

    #[test]
    fn test_with_children_arity_mismatch() {
        let expr = sample();
        let r = expr.with_children(vec![Expression::literal(1i64)]);
        assert!(matches!(r, Err(Error::InvalidExpressionCount { .. })));
    }

    #[test]
    fn test_transform_up_short_circuits_when_unchanged() -> Result<()> {
        let expr = sample();
        let unchanged = expr.transform_up(&mut |_| Ok(None))?;
        assert!(unchanged.is_none());
        Ok(())
    }

    #[test]
    fn test_transform_up_rewrites_leaves() -> Result<()> {
        let expr = sample();
        let rewritten = expr
            .transform_up(&mut |e| match e {
                Expression::Literal(Value::I64(1)) => Ok(Some(Expression::literal(2i64))),
                _ => Ok(None),
            })?
            .expect("tree changed");
        assert_eq!(rewritten.to_string(), "(a + 2)");
        Ok(())
    }

    #[test]
    fn test_divide_of_integers_is_decimal() {
        let expr = Expression::Arithmetic(
            ArithmeticOp::Divide,
            Box::new(Expression::literal(7i64)),
            Box::new(Expression::literal(2i64)),
        );
        assert_eq!(expr.data_type(), DataType::Decimal(65, 4));
    }

    #[test]
    fn test_coercibility_of_literals_and_columns() {
        let s = Expression::literal("abc");
        assert_eq!(s.coercion().1, Coercibility::Coercible);

        let null = Expression::Literal(Value::Null);
        assert_eq!(null.coercion().1, Coercibility::Ignorable);

        let n = Expression::literal(5i64);
        assert_eq!(n.coercion().1, Coercibility::Numeric);

        let col = Expression::Column(ColumnRef::new(
            0,
            "s",
            DataType::VarChar(10, CollationId::UTF8MB4_BIN),
        ));
        assert_eq!(
            col.coercion(),
            (CollationId::UTF8MB4_BIN, Coercibility::Implicit)
        );

        let collated = Expression::Collate(Box::new(s), CollationId::UTF8MB4_BIN);
        assert_eq!(collated.coercion().1, Coercibility::Explicit);
    }
}
