//! Predicate compiler: DNF filter specifications to executable predicates.
//!
//! # Grammar
//!
//! A filter is a list of clauses, implicitly OR'd. Each clause is either a
//! comparison `(field, operator, value)` or `(AND, clause, clause, ...)`.
//! Nested AND clauses flatten into their parent, so a compiled [`Predicate`]
//! is always an OR of conjunctions of [`Term`]s.
//!
//! In JSON:
//!
//! ```text
//! [
//!   ["device", "=", "watch"],
//!   ["AND", ["date", ">=", "2026-01-01"], ["hr", ">", 120]]
//! ]
//! ```
//!
//! # Evaluation
//!
//! Terms over partition columns are decided from partition directory values
//! (see [`Predicate::residual`]); whatever remains is evaluated row by row
//! with Arrow compute kernels. A comparison involving null is unknown, and
//! rows whose result is unknown are excluded.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use arrow::array::{Array, BooleanArray, Scalar as ArrowScalar};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::boolean::{and_kleene, or_kleene};
use arrow::compute::kernels::cmp;
use arrow::record_batch::RecordBatch;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::partition::PartitionValues;
use crate::scalar::Scalar;
use crate::schema::TableSchema;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl Operator {
    /// Whether `lhs <op> rhs` holds, given `lhs.cmp(rhs)`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::NotEq => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::LtEq => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Operator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::NotEq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::LtEq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::GtEq),
            other => Err(StoreError::MalformedFilter(format!(
                "unsupported operator '{}'",
                other
            ))),
        }
    }
}

/// One uncompiled clause of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Compare {
        field: String,
        op: Operator,
        value: Value,
    },
    And(Vec<Clause>),
}

impl Clause {
    pub fn compare(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Clause::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Eq, value)
    }

    pub fn and(clauses: impl IntoIterator<Item = Clause>) -> Self {
        Clause::And(clauses.into_iter().collect())
    }

    fn from_json(value: &Value) -> Result<Self> {
        let malformed = |reason: &str| StoreError::MalformedFilter(format!("{}: {}", reason, value));

        let items = value
            .as_array()
            .ok_or_else(|| malformed("clause must be a list"))?;

        let is_and = items
            .first()
            .and_then(Value::as_str)
            .is_some_and(|head| head.eq_ignore_ascii_case("and"))
            && items.iter().skip(1).all(Value::is_array);

        if is_and {
            let children = items
                .iter()
                .skip(1)
                .map(Clause::from_json)
                .collect::<Result<Vec<_>>>()?;
            if children.is_empty() {
                return Err(malformed("AND clause has no children"));
            }
            return Ok(Clause::And(children));
        }

        match items.as_slice() {
            [field, op, literal] => {
                let field = field
                    .as_str()
                    .ok_or_else(|| malformed("field name must be a string"))?;
                let op = op
                    .as_str()
                    .ok_or_else(|| malformed("operator must be a string"))?
                    .parse::<Operator>()?;
                Ok(Clause::compare(field, op, literal.clone()))
            }
            _ => Err(malformed("expected (field, operator, value) or (AND, clause, ...)")),
        }
    }

    /// Flatten into `terms`, compiling each comparison against `schema`.
    fn compile_into(&self, schema: &TableSchema, terms: &mut Vec<Term>) -> Result<()> {
        match self {
            Clause::Compare { field, op, value } => {
                let ty = schema.field_type(field).ok_or_else(|| {
                    StoreError::MalformedFilter(format!(
                        "unknown field '{}' in table '{}'",
                        field,
                        schema.name()
                    ))
                })?;
                let value = Scalar::from_json(value, ty).map_err(|reason| {
                    StoreError::MalformedFilter(format!("field '{}': {}", field, reason))
                })?;
                terms.push(Term {
                    column: field.clone(),
                    op: *op,
                    value,
                });
                Ok(())
            }
            Clause::And(children) => {
                if children.is_empty() {
                    return Err(StoreError::MalformedFilter(
                        "AND clause has no children".to_string(),
                    ));
                }
                children
                    .iter()
                    .try_for_each(|child| child.compile_into(schema, terms))
            }
        }
    }
}

/// A DNF filter: clauses OR'd together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSpec {
    clauses: Vec<Clause>,
}

impl FilterSpec {
    pub fn new(clauses: impl IntoIterator<Item = Clause>) -> Self {
        Self {
            clauses: clauses.into_iter().collect(),
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Parse the JSON list form.
    pub fn from_json(value: &Value) -> Result<Self> {
        let items = value.as_array().ok_or_else(|| {
            StoreError::MalformedFilter(format!("filter must be a list of clauses: {}", value))
        })?;
        let clauses = items.iter().map(Clause::from_json).collect::<Result<_>>()?;
        Ok(Self { clauses })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| StoreError::MalformedFilter(format!("invalid JSON: {}", e)))?;
        Self::from_json(&value)
    }

    /// OR of per-partition AND clauses selecting exactly `partitions`.
    pub fn partition_selection<'a>(
        schema: &TableSchema,
        partitions: impl IntoIterator<Item = &'a PartitionValues>,
    ) -> Result<Self> {
        let clauses = partitions
            .into_iter()
            .map(|values| {
                let terms = values
                    .pairs()
                    .iter()
                    .map(|(column, _)| {
                        let value = values.typed(schema, column).ok_or_else(|| {
                            StoreError::MissingPartitionColumn {
                                column: column.clone(),
                                row: None,
                            }
                        })?;
                        Ok(Clause::equals(column.clone(), value.to_json()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Clause::and(terms))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { clauses })
    }
}

/// A single compiled comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub column: String,
    pub op: Operator,
    pub value: Scalar,
}

impl Term {
    /// Decide the term from a partition's directory values.
    ///
    /// `None` when the column is not a partition column of this partition or
    /// its directory value cannot be read under the schema.
    fn decide(&self, schema: &TableSchema, partition: &PartitionValues) -> Option<bool> {
        let actual = partition.typed(schema, &self.column)?;
        actual
            .partial_cmp(&self.value)
            .map(|ordering| self.op.holds(ordering))
    }

    fn evaluate(&self, table: &str, batch: &RecordBatch) -> Result<BooleanArray> {
        let column = batch
            .column_by_name(&self.column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: table.to_string(),
                column: self.column.clone(),
            })?;
        let literal = ArrowScalar::new(self.value.to_array());
        let mask = match self.op {
            Operator::Eq => cmp::eq(column, &literal)?,
            Operator::NotEq => cmp::neq(column, &literal)?,
            Operator::Lt => cmp::lt(column, &literal)?,
            Operator::LtEq => cmp::lt_eq(column, &literal)?,
            Operator::Gt => cmp::gt(column, &literal)?,
            Operator::GtEq => cmp::gt_eq(column, &literal)?,
        };
        Ok(mask)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// What a predicate still requires of one partition's rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Residual {
    /// Every row matches.
    All,
    /// No row can match; skip the partition.
    Nothing,
    /// Rows must be filtered with this predicate.
    Filter(Predicate),
}

/// Compiled OR-of-ANDs predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    table: String,
    disjuncts: Vec<Vec<Term>>,
}

impl Predicate {
    /// Compile `spec` against `schema`.
    pub fn compile(spec: &FilterSpec, schema: &TableSchema) -> Result<Self> {
        if spec.clauses.is_empty() {
            return Err(StoreError::MalformedFilter(
                "filter has no clauses".to_string(),
            ));
        }

        let disjuncts = spec
            .clauses
            .iter()
            .map(|clause| {
                let mut terms = Vec::new();
                clause.compile_into(schema, &mut terms)?;
                Ok(terms)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            table: schema.name().to_string(),
            disjuncts,
        })
    }

    pub fn disjuncts(&self) -> &[Vec<Term>] {
        &self.disjuncts
    }

    /// Columns referenced by any term.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.disjuncts
            .iter()
            .flatten()
            .map(|t| t.column.as_str())
            .collect()
    }

    /// Whether every term is over a partition column.
    pub fn is_partition_only(&self, schema: &TableSchema) -> bool {
        self.disjuncts
            .iter()
            .flatten()
            .all(|t| schema.is_partition_column(&t.column))
    }

    /// The exact partitions selected, when every disjunct pins each partition
    /// column with `=` and nothing else.
    pub fn exact_partitions(&self, schema: &TableSchema) -> Option<Vec<PartitionValues>> {
        let columns = schema.partition_columns();
        if columns.is_empty() {
            return None;
        }

        let mut selected = BTreeSet::new();
        for terms in &self.disjuncts {
            if terms.len() != columns.len() || terms.iter().any(|t| t.op != Operator::Eq) {
                return None;
            }
            let mut pairs = Vec::with_capacity(columns.len());
            for column in columns {
                let mut matching = terms.iter().filter(|t| &t.column == column);
                let term = matching.next()?;
                if matching.next().is_some() {
                    return None;
                }
                pairs.push((column.clone(), term.value.to_partition_string()));
            }
            selected.insert(PartitionValues::new(pairs));
        }
        Some(selected.into_iter().collect())
    }

    /// Reduce the predicate for one partition.
    pub fn residual(&self, schema: &TableSchema, partition: &PartitionValues) -> Residual {
        let mut remaining = Vec::new();

        for terms in &self.disjuncts {
            let mut undecided = Vec::new();
            let mut satisfiable = true;
            for term in terms {
                match term.decide(schema, partition) {
                    Some(true) => {}
                    Some(false) => {
                        satisfiable = false;
                        break;
                    }
                    None => undecided.push(term.clone()),
                }
            }
            if !satisfiable {
                continue;
            }
            if undecided.is_empty() {
                return Residual::All;
            }
            remaining.push(undecided);
        }

        if remaining.is_empty() {
            Residual::Nothing
        } else {
            Residual::Filter(Predicate {
                table: self.table.clone(),
                disjuncts: remaining,
            })
        }
    }

    /// Row mask; null (unknown) entries mean "does not match".
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        let mut result: Option<BooleanArray> = None;
        for terms in &self.disjuncts {
            let mut conjunct: Option<BooleanArray> = None;
            for term in terms {
                let mask = term.evaluate(&self.table, batch)?;
                conjunct = Some(match conjunct {
                    Some(acc) => and_kleene(&acc, &mask)?,
                    None => mask,
                });
            }
            let conjunct = conjunct.unwrap_or_else(|| BooleanArray::from(vec![true; batch.num_rows()]));
            result = Some(match result {
                Some(acc) => or_kleene(&acc, &conjunct)?,
                None => conjunct,
            });
        }
        Ok(result.unwrap_or_else(|| BooleanArray::from(vec![false; batch.num_rows()])))
    }

    /// Keep only matching rows.
    pub fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mask = self.evaluate(batch)?;
        if mask.null_count() == 0 && mask.true_count() == batch.num_rows() {
            return Ok(batch.clone());
        }
        Ok(filter_record_batch(batch, &mask)?)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .disjuncts
            .iter()
            .map(|terms| {
                let terms: Vec<String> = terms.iter().map(Term::to_string).collect();
                format!("({})", terms.join(" AND "))
            })
            .collect();
        write!(f, "{}", parts.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use serde_json::json;
    use std::sync::Arc;
    use strata_common::{FieldSpec, FieldType};

    fn schema() -> Arc<TableSchema> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                "hr",
                vec![
                    FieldSpec::required("id", FieldType::Integer),
                    FieldSpec::new("device", FieldType::String),
                    FieldSpec::new("date", FieldType::Date),
                    FieldSpec::new("bpm", FieldType::Float),
                ],
                &["device", "date"],
                &["id"],
            )
            .unwrap()
    }

    fn compile(json: Value) -> Result<Predicate> {
        Predicate::compile(&FilterSpec::from_json(&json)?, &schema())
    }

    fn partition(device: &str, date: &str) -> PartitionValues {
        PartitionValues::new([("device", device), ("date", date)])
    }

    #[test]
    fn test_parse_and_flatten() {
        let p = compile(json!([
            ["id", "=", 1],
            ["AND", ["device", "=", "watch"], ["AND", ["bpm", ">", 100.5], ["id", "!=", 3]]]
        ]))
        .unwrap();
        assert_eq!(p.disjuncts().len(), 2);
        assert_eq!(p.disjuncts()[1].len(), 3);
        assert_eq!(p.to_string(), "(id = 1) OR (device = watch AND bpm > 100.5 AND id != 3)");
    }

    #[test]
    fn test_malformed_filters() {
        let cases = [
            json!({"id": 1}),
            json!([]),
            json!([["id", "=", 1, 2]]),
            json!([["id", "~", 1]]),
            json!([["nope", "=", 1]]),
            json!([["id", "=", "one"]]),
            json!([["id", "=", null]]),
            json!([["AND"]]),
            json!([[1, "=", 1]]),
            json!(["id"]),
        ];
        for case in cases {
            let err = compile(case.clone()).unwrap_err();
            assert!(
                matches!(err, StoreError::MalformedFilter(_)),
                "expected MalformedFilter for {case}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_typed_builder_matches_json() {
        let typed = FilterSpec::new([Clause::and([
            Clause::equals("device", "watch"),
            Clause::compare("date", Operator::GtEq, "2026-01-01"),
        ])]);
        let parsed = FilterSpec::from_json_str(
            r#"[["AND", ["device", "=", "watch"], ["date", ">=", "2026-01-01"]]]"#,
        )
        .unwrap();
        assert_eq!(typed, parsed);
    }

    #[test]
    fn test_residual_partition_only() {
        let p = compile(json!([["AND", ["device", "=", "watch"], ["date", ">=", "2026-01-10"]]])).unwrap();
        let s = schema();
        assert!(p.is_partition_only(&s));
        assert_eq!(p.residual(&s, &partition("watch", "2026-01-15")), Residual::All);
        assert_eq!(p.residual(&s, &partition("watch", "2026-01-01")), Residual::Nothing);
        assert_eq!(p.residual(&s, &partition("ring", "2026-01-15")), Residual::Nothing);
    }

    #[test]
    fn test_residual_keeps_row_terms() {
        let p = compile(json!([["AND", ["device", "=", "watch"], ["bpm", ">", 120]]])).unwrap();
        let s = schema();
        assert!(!p.is_partition_only(&s));
        match p.residual(&s, &partition("watch", "2026-01-15")) {
            Residual::Filter(rest) => assert_eq!(rest.to_string(), "(bpm > 120)"),
            other => panic!("unexpected residual {other:?}"),
        }
        assert_eq!(p.residual(&s, &partition("ring", "2026-01-15")), Residual::Nothing);
    }

    #[test]
    fn test_exact_partitions() {
        let s = schema();
        let p = compile(json!([
            ["AND", ["date", "=", "2026-01-02"], ["device", "=", "watch"]],
            ["AND", ["device", "=", "ring"], ["date", "=", "2026-01-01"]]
        ]))
        .unwrap();
        let exact = p.exact_partitions(&s).unwrap();
        assert_eq!(exact.len(), 2);
        assert!(exact.contains(&partition("watch", "2026-01-02")));
        assert!(exact.contains(&partition("ring", "2026-01-01")));

        let ranged = compile(json!([["AND", ["date", ">", "2026-01-02"], ["device", "=", "watch"]]])).unwrap();
        assert!(ranged.exact_partitions(&s).is_none());

        let partial = compile(json!([["device", "=", "watch"]])).unwrap();
        assert!(partial.exact_partitions(&s).is_none());
    }

    #[test]
    fn test_partition_selection_round_trip() {
        let s = schema();
        let wanted = [partition("watch", "2026-01-02"), partition("ring", "2026-01-01")];
        let spec = FilterSpec::partition_selection(&s, wanted.iter()).unwrap();
        let p = Predicate::compile(&spec, &s).unwrap();
        let mut exact = p.exact_partitions(&s).unwrap();
        exact.sort();
        let mut expected = wanted.to_vec();
        expected.sort();
        assert_eq!(exact, expected);
    }

    #[test]
    fn test_row_evaluation_with_nulls() {
        let mut registry = SchemaRegistry::new();
        let s = registry
            .register(
                "rows",
                vec![
                    FieldSpec::required("id", FieldType::Integer),
                    FieldSpec::new("name", FieldType::String),
                    FieldSpec::new("bpm", FieldType::Float),
                ],
                &[],
                &["id"],
            )
            .unwrap();
        let batch = RecordBatch::try_new(
            s.arrow_schema().clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(StringArray::from(vec![Some("a"), Some("b"), None, Some("a")])),
                Arc::new(Float64Array::from(vec![Some(90.0), Some(130.0), Some(150.0), None])),
            ],
        )
        .unwrap();

        let spec = FilterSpec::from_json(&json!([
            ["AND", ["name", "=", "a"], ["bpm", "<", 100]],
            ["bpm", ">", 140]
        ]))
        .unwrap();
        let p = Predicate::compile(&spec, &s).unwrap();
        let out = p.filter(&batch).unwrap();
        let ids = out
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_missing_column_names_table() {
        let s = schema();
        let p = compile(json!([["bpm", ">", 100]])).unwrap();
        let projected = Arc::new(s.arrow_schema().project(&[0]).unwrap());
        let batch = RecordBatch::try_new(projected, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();

        match p.evaluate(&batch).unwrap_err() {
            StoreError::UnknownColumn { table, column } => {
                assert_eq!(table, "hr");
                assert_eq!(column, "bpm");
            }
            other => panic!("expected UnknownColumn, got {other:?}"),
        }
    }
}
