//! Sort and group specifications

use crate::core::error::QueryError;
use crate::core::field::{FieldPath, FieldSource, FieldValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One ordering rule: a field path and a direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRule {
    pub path: FieldPath,
    pub ascending: bool,
}

impl SortRule {
    pub fn new(path: impl Into<FieldPath>, ascending: bool) -> Self {
        Self {
            path: path.into(),
            ascending,
        }
    }

    /// Parse a `field:asc` / `field:desc` expression (`field` alone is ascending)
    pub fn parse(expr: &str) -> Result<Self, QueryError> {
        let (field, direction) = match expr.split_once(':') {
            Some((field, direction)) => (field, direction.trim()),
            None => (expr, "asc"),
        };
        let ascending = match direction.to_ascii_lowercase().as_str() {
            "asc" => true,
            "desc" => false,
            other => {
                return Err(QueryError::Parse {
                    format: expr.to_string(),
                    offset: field.len() + 1,
                    message: format!("unknown sort direction '{}'", other),
                });
            }
        };
        Ok(Self {
            path: FieldPath::parse(field.trim())?,
            ascending,
        })
    }

    fn compare(&self, a: &dyn FieldSource, b: &dyn FieldSource) -> Ordering {
        let left = a.resolve(&self.path).unwrap_or(FieldValue::Null);
        let right = b.resolve(&self.path).unwrap_or(FieldValue::Null);
        let ordering = FieldValue::sort_order(&left, &right);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Ordered list of sort rules applied lexicographically
///
/// An empty spec keeps the store's native (insertion) order. Sorting is
/// stable, so entities tied on every rule keep that order too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    rules: Vec<SortRule>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(path: impl Into<FieldPath>) -> Self {
        Self::new().then_by(path, true)
    }

    pub fn descending(path: impl Into<FieldPath>) -> Self {
        Self::new().then_by(path, false)
    }

    /// Append a tie-breaking rule
    pub fn then_by(mut self, path: impl Into<FieldPath>, ascending: bool) -> Self {
        self.rules.push(SortRule::new(path, ascending));
        self
    }

    /// Parse a comma separated list such as `"type.name:asc,level:desc"`
    pub fn parse(expr: &str) -> Result<Self, QueryError> {
        let rules = expr
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| SortRule::parse(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[SortRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Compare two entities rule by rule
    pub fn compare(&self, a: &dyn FieldSource, b: &dyn FieldSource) -> Ordering {
        self.rules
            .iter()
            .map(|rule| rule.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Stable in-place sort of any slice of field sources
    pub fn sort<T: FieldSource>(&self, items: &mut [T]) {
        if self.rules.is_empty() {
            return;
        }
        items.sort_by(|a, b| self.compare(a, b));
    }
}

impl From<SortRule> for SortSpec {
    fn from(rule: SortRule) -> Self {
        Self { rules: vec![rule] }
    }
}

impl FromIterator<SortRule> for SortSpec {
    fn from_iter<I: IntoIterator<Item = SortRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// Fields whose distinct value tuples partition a result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    paths: Vec<FieldPath>,
}

impl GroupSpec {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<FieldPath>,
    {
        let mut spec = Self::default();
        for path in paths {
            let path = path.into();
            // ordered set: repeated fields add nothing to the key
            if !spec.paths.contains(&path) {
                spec.paths.push(path);
            }
        }
        spec
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Grouping key of one entity; unresolvable fields contribute `Null`
    pub fn key(&self, source: &dyn FieldSource) -> Vec<FieldValue> {
        self.paths
            .iter()
            .map(|path| source.resolve(path).unwrap_or(FieldValue::Null))
            .collect()
    }

    /// Key equality: values that compare equal, with `Null` equal to `Null`
    pub fn same_key(a: &[FieldValue], b: &[FieldValue]) -> bool {
        a.len() == b.len()
            && a.iter()
                .zip(b)
                .all(|(x, y)| (x.is_null() && y.is_null()) || x.matches(y))
    }
}
