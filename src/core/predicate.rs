//! Composable boolean conditions over entity attributes
//!
//! A [`Predicate`] is an immutable tree of comparisons joined by `and`,
//! `or` and `not`. It is built with the typed constructors below, or
//! compiled from a format string by [`Predicate::format`].
//!
//! ```rust,ignore
//! let fire_evolutions = Predicate::and([
//!     Predicate::eq("type.name", "Fire"),
//!     Predicate::gt("level", 5),
//! ]);
//! ```

use crate::core::error::QueryError;
use crate::core::field::{FieldPath, FieldSource, FieldValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison operators supported by [`Predicate::Comparison`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOperator {
    /// Canonical token, as used by `Display` and the format compiler
    pub fn token(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
        }
    }

    /// Apply the operator to a resolved value.
    ///
    /// Any null operand yields false, for every operator.
    pub fn apply(&self, lhs: &FieldValue, rhs: &FieldValue) -> bool {
        if lhs.is_null() || rhs.is_null() {
            return false;
        }
        let ordering = lhs.compare(rhs);
        match self {
            ComparisonOperator::Equal => ordering == Some(Ordering::Equal),
            ComparisonOperator::NotEqual => ordering != Some(Ordering::Equal),
            ComparisonOperator::LessThan => ordering == Some(Ordering::Less),
            ComparisonOperator::LessThanOrEqual => {
                matches!(ordering, Some(Ordering::Less | Ordering::Equal))
            }
            ComparisonOperator::GreaterThan => ordering == Some(Ordering::Greater),
            ComparisonOperator::GreaterThanOrEqual => {
                matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = QueryError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim() {
            "=" | "==" => Ok(ComparisonOperator::Equal),
            "!=" | "<>" => Ok(ComparisonOperator::NotEqual),
            "<" => Ok(ComparisonOperator::LessThan),
            "<=" | "=<" => Ok(ComparisonOperator::LessThanOrEqual),
            ">" => Ok(ComparisonOperator::GreaterThan),
            ">=" | "=>" => Ok(ComparisonOperator::GreaterThanOrEqual),
            other => Err(QueryError::InvalidOperator {
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A boolean filter expression over entity fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `path op value`
    Comparison {
        path: FieldPath,
        operator: ComparisonOperator,
        value: FieldValue,
    },
    /// True iff every child is true; empty is true
    And(Vec<Predicate>),
    /// True iff any child is true; empty is false
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn comparison(
        path: impl Into<FieldPath>,
        operator: ComparisonOperator,
        value: impl Into<FieldValue>,
    ) -> Self {
        Predicate::Comparison {
            path: path.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(path: impl Into<FieldPath>, value: impl Into<FieldValue>) -> Self {
        Self::comparison(path, ComparisonOperator::Equal, value)
    }

    pub fn ne(path: impl Into<FieldPath>, value: impl Into<FieldValue>) -> Self {
        Self::comparison(path, ComparisonOperator::NotEqual, value)
    }

    pub fn lt(path: impl Into<FieldPath>, value: impl Into<FieldValue>) -> Self {
        Self::comparison(path, ComparisonOperator::LessThan, value)
    }

    pub fn le(path: impl Into<FieldPath>, value: impl Into<FieldValue>) -> Self {
        Self::comparison(path, ComparisonOperator::LessThanOrEqual, value)
    }

    pub fn gt(path: impl Into<FieldPath>, value: impl Into<FieldValue>) -> Self {
        Self::comparison(path, ComparisonOperator::GreaterThan, value)
    }

    pub fn ge(path: impl Into<FieldPath>, value: impl Into<FieldValue>) -> Self {
        Self::comparison(path, ComparisonOperator::GreaterThanOrEqual, value)
    }

    pub fn and(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(children.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Predicate) -> Self {
        Predicate::Not(Box::new(child))
    }

    /// Build a comparison from a `(field, value, operator)` triple.
    ///
    /// Returns `Ok(None)` when no value is given so the caller decides what
    /// an absent filter means, and `InvalidOperator` for unknown tokens.
    pub fn build(
        field: &str,
        value: Option<FieldValue>,
        operator: &str,
    ) -> Result<Option<Self>, QueryError> {
        let operator: ComparisonOperator = operator.parse()?;
        let path = FieldPath::parse(field)?;
        Ok(value.map(|value| Predicate::Comparison {
            path,
            operator,
            value,
        }))
    }

    /// Evaluate against one entity. Never fails: unresolvable paths make
    /// their comparison false.
    pub fn evaluate(&self, source: &dyn FieldSource) -> bool {
        match self {
            Predicate::Comparison {
                path,
                operator,
                value,
            } => source
                .resolve(path)
                .is_some_and(|actual| operator.apply(&actual, value)),
            Predicate::And(children) => children.iter().all(|c| c.evaluate(source)),
            Predicate::Or(children) => children.iter().any(|c| c.evaluate(source)),
            Predicate::Not(child) => !child.evaluate(source),
        }
    }

    /// Every field path the predicate reads, in tree order
    pub fn paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Predicate::Comparison { path, .. } => out.push(path),
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().for_each(|c| c.collect_paths(out))
            }
            Predicate::Not(child) => child.collect_paths(out),
        }
    }
}

/// Format-string rendering; it parses back with [`Predicate::format`] unless
/// a comparison holds a reference, a collection or a non-finite float.
impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[Predicate], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")
        }

        match self {
            Predicate::Comparison {
                path,
                operator,
                value,
            } => write!(f, "{} {} {}", path, operator, value),
            Predicate::And(children) if children.is_empty() => write!(f, "TRUEPREDICATE"),
            Predicate::Or(children) if children.is_empty() => write!(f, "FALSEPREDICATE"),
            Predicate::And(children) => join(f, children, "AND"),
            Predicate::Or(children) => join(f, children, "OR"),
            Predicate::Not(child) => write!(f, "NOT {}", child),
        }
    }
}
