//! Sum, min, max, average and count over matching entities
//!
//! An [`AggregateRequest`] names a function, one or more fields, an optional
//! predicate and optional group-by fields. [`Repository::aggregate`] fetches
//! the matching entities through the store, projects the needed paths and
//! folds them as `f64`:
//!
//! - one field, no grouping: [`AggregateResult::Scalar`]
//! - several fields, no grouping: [`AggregateResult::Scalars`], in request order
//! - with grouping: [`AggregateResult::Grouped`], one [`GroupRow`] per distinct
//!   key tuple, ordered by first appearance in store order
//!
//! Null values are skipped. A sum over nothing is `0`; min, max and average
//! over nothing are `None`. Groups only exist for observed keys, so a group
//! is never empty.

use crate::core::completion::Fetched;
use crate::core::entity::Entity;
use crate::core::error::{QueryError, RecordError};
use crate::core::field::{FieldPath, FieldValue};
use crate::core::predicate::Predicate;
use crate::core::repository::Repository;
use crate::core::sort::GroupSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fold applied to every requested field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Min,
    Max,
    Avg,
    /// Number of non-null values; accepts any attribute kind
    Count,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Count => "count",
        }
    }

    fn needs_numbers(&self) -> bool {
        !matches!(self, AggregateFunction::Count)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of one aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub function: AggregateFunction,
    pub fields: Vec<FieldPath>,
    pub predicate: Option<Predicate>,
    pub group_by: GroupSpec,
    /// Set by [`AggregateRequest::fields`]: answer with one value per field
    /// even when only one field was named
    pub per_field: bool,
}

impl AggregateRequest {
    pub fn new(function: AggregateFunction) -> Self {
        Self {
            function,
            fields: Vec::new(),
            predicate: None,
            group_by: GroupSpec::default(),
            per_field: false,
        }
    }

    /// Add one field
    pub fn field(mut self, field: impl Into<FieldPath>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Add several fields and ask for one result per field
    pub fn fields<I, P>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<FieldPath>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self.per_field = true;
        self
    }

    pub fn predicate(mut self, predicate: Option<&Predicate>) -> Self {
        self.predicate = predicate.cloned();
        self
    }

    pub fn group_by<I, P>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<FieldPath>,
    {
        self.group_by = GroupSpec::new(fields);
        self
    }
}

/// One partition of a grouped aggregation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    /// Group-by field values, keyed by field path
    pub key: IndexMap<String, FieldValue>,
    /// Aggregate per requested field, keyed by field path
    pub values: IndexMap<String, Option<f64>>,
    /// Number of entities in the group
    pub count: usize,
}

impl GroupRow {
    pub fn key_value(&self, field: &str) -> Option<&FieldValue> {
        self.key.get(field)
    }

    pub fn value(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied().flatten()
    }
}

/// Shape of an aggregation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AggregateResult {
    Scalar(Option<f64>),
    Scalars(Vec<Option<f64>>),
    Grouped(Vec<GroupRow>),
}

impl AggregateResult {
    /// The single value of an ungrouped, single-field aggregation
    pub fn scalar(&self) -> Option<f64> {
        match self {
            AggregateResult::Scalar(value) => *value,
            _ => None,
        }
    }

    pub fn scalars(&self) -> &[Option<f64>] {
        match self {
            AggregateResult::Scalars(values) => values,
            _ => &[],
        }
    }

    pub fn rows(&self) -> &[GroupRow] {
        match self {
            AggregateResult::Grouped(rows) => rows,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    function: AggregateFunction,
    sum: f64,
    seen: usize,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn new(function: AggregateFunction) -> Self {
        Self {
            function,
            sum: 0.0,
            seen: 0,
            min: None,
            max: None,
        }
    }

    fn push(&mut self, value: &FieldValue) {
        if value.is_null() {
            return;
        }
        if self.function == AggregateFunction::Count {
            self.seen += 1;
            return;
        }
        let Some(x) = value.as_f64() else {
            return;
        };
        self.seen += 1;
        self.sum += x;
        self.min = Some(self.min.map_or(x, |m| m.min(x)));
        self.max = Some(self.max.map_or(x, |m| m.max(x)));
    }

    fn finish(&self) -> Option<f64> {
        match self.function {
            AggregateFunction::Sum => Some(self.sum),
            AggregateFunction::Count => Some(self.seen as f64),
            AggregateFunction::Avg if self.seen == 0 => None,
            AggregateFunction::Avg => Some(self.sum / self.seen as f64),
            AggregateFunction::Min => self.min,
            AggregateFunction::Max => self.max,
        }
    }
}

struct Partition {
    key: Vec<FieldValue>,
    accumulators: Vec<Accumulator>,
    count: usize,
}

impl<'s, E: Entity> Repository<'s, E> {
    /// Run an aggregation.
    ///
    /// Fields and group-by paths are checked against the schema first:
    /// unknown paths fail with [`QueryError::UnknownField`], non-numeric
    /// attributes with [`QueryError::NonNumericField`] (except for
    /// [`AggregateFunction::Count`]).
    pub fn aggregate(
        &self,
        request: &AggregateRequest,
    ) -> Result<Fetched<AggregateResult>, RecordError> {
        if request.fields.is_empty() {
            return Err(QueryError::EmptyAggregate.into());
        }
        let entity_type = E::entity_name();
        let store = self.store();

        for field in &request.fields {
            let attribute = store.attribute_at(entity_type, field)?;
            if request.function.needs_numbers() && !attribute.kind.is_numeric() {
                return Err(QueryError::NonNumericField {
                    entity_type: entity_type.to_string(),
                    field: field.to_string(),
                }
                .into());
            }
        }
        for path in request.group_by.paths() {
            store.attribute_at(entity_type, path)?;
        }

        let ids = store.execute(
            &self
                .request()
                .with_optional_predicate(request.predicate.as_ref()),
        )?;
        let group_width = request.group_by.paths().len();
        let columns: Vec<FieldPath> = request
            .group_by
            .paths()
            .iter()
            .chain(&request.fields)
            .cloned()
            .collect();
        let rows = store.project(&ids, &columns)?;

        let fresh = || vec![Accumulator::new(request.function); request.fields.len()];
        let mut partitions: Vec<Partition> = Vec::new();
        for row in &rows {
            let (key, values) = row.split_at(group_width);
            let index = match partitions
                .iter()
                .position(|p| GroupSpec::same_key(&p.key, key))
            {
                Some(index) => index,
                None => {
                    partitions.push(Partition {
                        key: key.to_vec(),
                        accumulators: fresh(),
                        count: 0,
                    });
                    partitions.len() - 1
                }
            };
            let partition = &mut partitions[index];
            partition.count += 1;
            for (accumulator, value) in partition.accumulators.iter_mut().zip(values) {
                accumulator.push(value);
            }
        }

        let result = if request.group_by.is_empty() {
            let totals: Vec<Option<f64>> = match partitions.first() {
                Some(all) => all.accumulators.iter().map(Accumulator::finish).collect(),
                None => fresh().iter().map(Accumulator::finish).collect(),
            };
            if request.per_field || totals.len() > 1 {
                AggregateResult::Scalars(totals)
            } else {
                AggregateResult::Scalar(totals.into_iter().next().flatten())
            }
        } else {
            AggregateResult::Grouped(
                partitions
                    .into_iter()
                    .map(|partition| GroupRow {
                        key: request
                            .group_by
                            .paths()
                            .iter()
                            .map(ToString::to_string)
                            .zip(partition.key)
                            .collect(),
                        values: request
                            .fields
                            .iter()
                            .map(ToString::to_string)
                            .zip(partition.accumulators.iter().map(Accumulator::finish))
                            .collect(),
                        count: partition.count,
                    })
                    .collect(),
            )
        };

        tracing::debug!(
            entity_type,
            function = %request.function,
            matched = ids.len(),
            groups = result.rows().len(),
            "aggregate"
        );
        Ok(Fetched::new(result, self.completion()))
    }

    /// Sum of one field; `0` when nothing matches
    pub fn sum(
        &self,
        field: &str,
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<f64>, RecordError> {
        Ok(self
            .scalar(AggregateFunction::Sum, field, predicate)?
            .map(|v| v.unwrap_or(0.0)))
    }

    pub fn min(
        &self,
        field: &str,
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Option<f64>>, RecordError> {
        self.scalar(AggregateFunction::Min, field, predicate)
    }

    pub fn max(
        &self,
        field: &str,
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Option<f64>>, RecordError> {
        self.scalar(AggregateFunction::Max, field, predicate)
    }

    pub fn avg(
        &self,
        field: &str,
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Option<f64>>, RecordError> {
        self.scalar(AggregateFunction::Avg, field, predicate)
    }

    pub fn sum_fields(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Vec<Option<f64>>>, RecordError> {
        self.per_field(AggregateFunction::Sum, fields, predicate)
    }

    pub fn min_fields(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Vec<Option<f64>>>, RecordError> {
        self.per_field(AggregateFunction::Min, fields, predicate)
    }

    pub fn max_fields(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Vec<Option<f64>>>, RecordError> {
        self.per_field(AggregateFunction::Max, fields, predicate)
    }

    pub fn avg_fields(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Vec<Option<f64>>>, RecordError> {
        self.per_field(AggregateFunction::Avg, fields, predicate)
    }

    pub fn sum_grouped(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
        group_by: &[&str],
    ) -> Result<Fetched<Vec<GroupRow>>, RecordError> {
        self.grouped(AggregateFunction::Sum, fields, predicate, group_by)
    }

    pub fn min_grouped(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
        group_by: &[&str],
    ) -> Result<Fetched<Vec<GroupRow>>, RecordError> {
        self.grouped(AggregateFunction::Min, fields, predicate, group_by)
    }

    pub fn max_grouped(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
        group_by: &[&str],
    ) -> Result<Fetched<Vec<GroupRow>>, RecordError> {
        self.grouped(AggregateFunction::Max, fields, predicate, group_by)
    }

    pub fn avg_grouped(
        &self,
        fields: &[&str],
        predicate: Option<&Predicate>,
        group_by: &[&str],
    ) -> Result<Fetched<Vec<GroupRow>>, RecordError> {
        self.grouped(AggregateFunction::Avg, fields, predicate, group_by)
    }

    fn scalar(
        &self,
        function: AggregateFunction,
        field: &str,
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Option<f64>>, RecordError> {
        let request = AggregateRequest::new(function)
            .field(field)
            .predicate(predicate);
        Ok(self.aggregate(&request)?.map(|result| result.scalar()))
    }

    fn per_field(
        &self,
        function: AggregateFunction,
        fields: &[&str],
        predicate: Option<&Predicate>,
    ) -> Result<Fetched<Vec<Option<f64>>>, RecordError> {
        let request = AggregateRequest::new(function)
            .fields(fields.iter().copied())
            .predicate(predicate);
        Ok(self
            .aggregate(&request)?
            .map(|result| result.scalars().to_vec()))
    }

    fn grouped(
        &self,
        function: AggregateFunction,
        fields: &[&str],
        predicate: Option<&Predicate>,
        group_by: &[&str],
    ) -> Result<Fetched<Vec<GroupRow>>, RecordError> {
        let request = AggregateRequest::new(function)
            .fields(fields.iter().copied())
            .predicate(predicate)
            .group_by(group_by.iter().copied());
        Ok(self.aggregate(&request)?.map(|result| match result {
            AggregateResult::Grouped(rows) => rows,
            _ => Vec::new(),
        }))
    }
}
