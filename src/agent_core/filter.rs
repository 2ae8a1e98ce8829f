//! Filter Compiler/Evaluator.
//!
//! Listing tools accept ad-hoc filters from the LLM. A filter is parsed into
//! [`FilterSpec`]s, compiled once against a [`FieldCatalog`] into a
//! [`CompiledFilter`] (every type and shape check happens here), and then
//! evaluated over records as a pure, order-preserving selection.
//!
//! Two wire forms are accepted:
//! - dictionary form: `{"campaign_budget_total": {"min": 100000}, "campaign_objective": ["awareness", "conversion"]}`
//! - list form: `[{"field": "campaign_name", "operator": "regex", "value": "^Summer"}]`

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use super::errors::AgentError;

/// Example payloads appended to filter errors so the model can correct itself.
pub const FILTER_EXAMPLES: &str = concat!(
    r#"exact {"campaign_objective": "awareness"}; "#,
    r#"list {"campaign_objective": ["awareness", "consideration"]}; "#,
    r#"range {"campaign_budget_total": {"min": 50000, "max": 200000}}; "#,
    r#"regex {"campaign_name": {"regex": "Summer"}}; "#,
    r#"date range {"campaign_start_date": {"min": "2025-01-01", "max": "2025-12-31"}}"#,
);

/// Attach [`FILTER_EXAMPLES`] to a filter validation error.
pub fn with_examples(err: AgentError) -> AgentError {
    match err {
        AgentError::Validation { reason } => AgentError::Validation {
            reason: format!("{reason}. Filter examples: {FILTER_EXAMPLES}"),
        },
        other => other,
    }
}

// ─── Field Catalogs ─────────────────────────────────────────────────────────

/// Value type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Date,
    Boolean,
}

impl FieldType {
    fn is_ordered(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Date)
    }

    fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
        }
    }
}

/// The set of fields a listing exposes to filters.
#[derive(Debug, Clone, Copy)]
pub struct FieldCatalog {
    entity: &'static str,
    fields: &'static [(&'static str, FieldType)],
}

const MEDIA_PLAN_FIELDS: &[(&str, FieldType)] = &[
    ("meta_id", FieldType::Text),
    ("meta_schema_version", FieldType::Text),
    ("meta_created_by_name", FieldType::Text),
    ("meta_created_at", FieldType::Date),
    ("meta_comments", FieldType::Text),
    ("campaign_id", FieldType::Text),
    ("campaign_name", FieldType::Text),
    ("campaign_objective", FieldType::Text),
    ("campaign_start_date", FieldType::Date),
    ("campaign_end_date", FieldType::Date),
    ("campaign_budget_total", FieldType::Number),
    ("campaign_product_name", FieldType::Text),
    ("campaign_product_description", FieldType::Text),
    ("campaign_audience_name", FieldType::Text),
    ("stat_lineitem_count", FieldType::Number),
    ("stat_total_cost", FieldType::Number),
    ("stat_remaining_budget", FieldType::Number),
    ("stat_distinct_channel_count", FieldType::Number),
    ("stat_distinct_vehicle_count", FieldType::Number),
    ("stat_min_start_date", FieldType::Date),
    ("stat_max_end_date", FieldType::Date),
];

const CAMPAIGN_FIELDS: &[(&str, FieldType)] = &[
    ("campaign_id", FieldType::Text),
    ("campaign_name", FieldType::Text),
    ("campaign_objective", FieldType::Text),
    ("campaign_start_date", FieldType::Date),
    ("campaign_end_date", FieldType::Date),
    ("campaign_budget_total", FieldType::Number),
    ("campaign_product_name", FieldType::Text),
    ("campaign_audience_name", FieldType::Text),
    ("stat_media_plan_count", FieldType::Number),
    ("stat_lineitem_count", FieldType::Number),
    ("stat_total_cost", FieldType::Number),
    ("stat_last_updated", FieldType::Date),
];

impl FieldCatalog {
    pub fn media_plans() -> Self {
        Self {
            entity: "media plan",
            fields: MEDIA_PLAN_FIELDS,
        }
    }

    pub fn campaigns() -> Self {
        Self {
            entity: "campaign",
            fields: CAMPAIGN_FIELDS,
        }
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(n, _)| *n).collect()
    }

    /// Whether `name` is a computed statistic rather than a stored field.
    pub fn is_stat(name: &str) -> bool {
        name.starts_with("stat_")
    }
}

// ─── Filter Specs ───────────────────────────────────────────────────────────

/// Operator and raw payload of one filter, before type checking.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Exact(Value),
    InList(Vec<Value>),
    Range { min: Option<Value>, max: Option<Value> },
    Regex(String),
}

/// One parsed filter: a field plus an operator payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub field: String,
    pub op: FilterOp,
}

impl FilterSpec {
    /// Parse the `filters` tool argument. `null` means no filters.
    pub fn parse_many(raw: &Value) -> Result<Vec<FilterSpec>, AgentError> {
        match raw {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) => map
                .iter()
                .map(|(field, payload)| Self::from_dict_entry(field, payload))
                .collect(),
            Value::Array(items) => items.iter().map(Self::from_explicit).collect(),
            other => Err(AgentError::validation(format!(
                "filters must be an object or a list, got {}",
                json_type_name(other)
            ))),
        }
    }

    /// `{"field": payload}` form. The payload's shape selects the operator.
    fn from_dict_entry(field: &str, payload: &Value) -> Result<FilterSpec, AgentError> {
        let op = match payload {
            Value::Null => {
                return Err(AgentError::validation(format!(
                    "filter on '{field}' has a null payload"
                )))
            }
            Value::Array(values) => FilterOp::InList(values.clone()),
            Value::Object(obj) => {
                let has_range = obj.contains_key("min") || obj.contains_key("max");
                let has_regex = obj.contains_key("regex");
                let unknown: Vec<&String> = obj
                    .keys()
                    .filter(|k| !matches!(k.as_str(), "min" | "max" | "regex"))
                    .collect();
                if !unknown.is_empty() || has_range == has_regex {
                    return Err(AgentError::validation(format!(
                        "filter on '{field}' must be {{\"min\"/\"max\"}} or {{\"regex\"}}, got keys {:?}",
                        obj.keys().collect::<Vec<_>>()
                    )));
                }
                if has_regex {
                    FilterOp::Regex(regex_payload(field, &obj["regex"])?)
                } else {
                    FilterOp::Range {
                        min: obj.get("min").filter(|v| !v.is_null()).cloned(),
                        max: obj.get("max").filter(|v| !v.is_null()).cloned(),
                    }
                }
            }
            scalar => FilterOp::Exact(scalar.clone()),
        };
        Ok(FilterSpec {
            field: field.to_string(),
            op,
        })
    }

    /// `{"field": .., "operator": .., "value": ..}` form.
    fn from_explicit(item: &Value) -> Result<FilterSpec, AgentError> {
        let field = item
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::validation("filter entry is missing a string 'field'"))?;
        let operator = item
            .get("operator")
            .and_then(Value::as_str)
            .unwrap_or("exact");
        let value = item.get("value").cloned().unwrap_or(Value::Null);

        let op = match (operator, value) {
            (_, Value::Null) => {
                return Err(AgentError::validation(format!(
                    "filter on '{field}' is missing a value"
                )))
            }
            ("exact", Value::Array(values)) => FilterOp::InList(values),
            ("exact", Value::Object(_)) => {
                return Err(AgentError::validation(format!(
                    "exact filter on '{field}' needs a scalar value"
                )))
            }
            ("exact", scalar) => FilterOp::Exact(scalar),
            ("in_list", Value::Array(values)) => FilterOp::InList(values),
            ("range", Value::Object(obj)) => {
                if obj.keys().any(|k| k != "min" && k != "max") {
                    return Err(AgentError::validation(format!(
                        "range filter on '{field}' accepts only 'min' and 'max'"
                    )));
                }
                FilterOp::Range {
                    min: obj.get("min").filter(|v| !v.is_null()).cloned(),
                    max: obj.get("max").filter(|v| !v.is_null()).cloned(),
                }
            }
            ("regex", v) => FilterOp::Regex(regex_payload(field, &v)?),
            (op @ ("in_list" | "range"), v) => {
                return Err(AgentError::validation(format!(
                    "{op} filter on '{field}' got a {} payload",
                    json_type_name(&v)
                )))
            }
            (other, _) => {
                return Err(AgentError::validation(format!(
                    "unknown filter operator '{other}' (expected exact, in_list, range or regex)"
                )))
            }
        };
        Ok(FilterSpec {
            field: field.to_string(),
            op,
        })
    }
}

fn regex_payload(field: &str, v: &Value) -> Result<String, AgentError> {
    v.as_str().map(str::to_string).ok_or_else(|| {
        AgentError::validation(format!("regex filter on '{field}' needs a string pattern"))
    })
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Typed Values ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Scalar {
    fn partial_cmp(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => write!(f, "'{s}'"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Date(d) => write!(f, "{d}"),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Parse `YYYY-MM-DD`, also accepting a timestamp whose first ten
/// characters are a date.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Interpret a record or payload value as the field's type.
fn coerce(value: &Value, ty: FieldType) -> Option<Scalar> {
    match (ty, value) {
        (FieldType::Text, Value::String(s)) => Some(Scalar::Text(s.clone())),
        (FieldType::Number, Value::Number(n)) => n.as_f64().map(Scalar::Number),
        (FieldType::Number, Value::String(s)) => s.trim().parse::<f64>().ok().map(Scalar::Number),
        (FieldType::Date, Value::String(s)) => parse_date(s).map(Scalar::Date),
        (FieldType::Boolean, Value::Bool(b)) => Some(Scalar::Bool(*b)),
        _ => None,
    }
}

fn coerce_payload(
    field: &str,
    ty: FieldType,
    value: &Value,
) -> Result<Scalar, AgentError> {
    coerce(value, ty).ok_or_else(|| {
        AgentError::validation(format!(
            "filter value {value} does not fit {} field '{field}'",
            ty.as_str()
        ))
    })
}

/// String form used by regex matching.
fn string_form(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ─── Compiled Filter ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Predicate {
    Equals {
        field: String,
        ty: FieldType,
        value: Scalar,
    },
    OneOf {
        field: String,
        ty: FieldType,
        values: Vec<Scalar>,
    },
    Between {
        field: String,
        ty: FieldType,
        min: Option<Scalar>,
        max: Option<Scalar>,
    },
    Matches {
        field: String,
        pattern: Regex,
    },
}

impl Predicate {
    fn eval(&self, record: &Value) -> bool {
        match self {
            Predicate::Equals { field, ty, value } => {
                typed_field(record, field, *ty).is_some_and(|v| &v == value)
            }
            Predicate::OneOf { field, ty, values } => {
                typed_field(record, field, *ty).is_some_and(|v| values.contains(&v))
            }
            Predicate::Between { field, ty, min, max } => {
                let Some(v) = typed_field(record, field, *ty) else {
                    return false;
                };
                let above_min = min.as_ref().map_or(true, |m| {
                    matches!(v.partial_cmp(m), Some(Ordering::Greater | Ordering::Equal))
                });
                let below_max = max.as_ref().map_or(true, |m| {
                    matches!(v.partial_cmp(m), Some(Ordering::Less | Ordering::Equal))
                });
                above_min && below_max
            }
            Predicate::Matches { field, pattern } => record
                .get(field)
                .and_then(string_form)
                .is_some_and(|s| pattern.is_match(&s)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Predicate::Equals { field, value, .. } => format!("{field} == {value}"),
            Predicate::OneOf { field, values, .. } => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                format!("{field} in [{}]", list.join(", "))
            }
            Predicate::Between { field, min, max, .. } => match (min, max) {
                (Some(lo), Some(hi)) => format!("{lo} <= {field} <= {hi}"),
                (Some(lo), None) => format!("{field} >= {lo}"),
                (None, Some(hi)) => format!("{field} <= {hi}"),
                (None, None) => format!("{field} (unbounded)"),
            },
            Predicate::Matches { field, pattern } => format!("{field} ~ /{}/", pattern.as_str()),
        }
    }
}

fn typed_field(record: &Value, field: &str, ty: FieldType) -> Option<Scalar> {
    record.get(field).and_then(|v| coerce(v, ty))
}

/// A conjunction of type-checked predicates.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    predicates: Vec<Predicate>,
}

impl CompiledFilter {
    /// Type-check `specs` against `catalog`. Fails before any record is seen.
    pub fn compile(specs: &[FilterSpec], catalog: &FieldCatalog) -> Result<Self, AgentError> {
        let mut predicates = Vec::with_capacity(specs.len());

        for spec in specs {
            let field = spec.field.as_str();
            let ty = catalog.field_type(field).ok_or_else(|| {
                AgentError::validation(format!(
                    "unknown {} field '{field}' (filterable: {})",
                    catalog.entity,
                    catalog.field_names().join(", ")
                ))
            })?;

            let predicate = match &spec.op {
                FilterOp::Exact(v) => Predicate::Equals {
                    field: field.to_string(),
                    ty,
                    value: coerce_payload(field, ty, v)?,
                },
                FilterOp::InList(values) => {
                    if values.is_empty() {
                        return Err(AgentError::validation(format!(
                            "in-list filter on '{field}' has no values"
                        )));
                    }
                    Predicate::OneOf {
                        field: field.to_string(),
                        ty,
                        values: values
                            .iter()
                            .map(|v| coerce_payload(field, ty, v))
                            .collect::<Result<_, _>>()?,
                    }
                }
                FilterOp::Range { min, max } => {
                    if !ty.is_ordered() {
                        return Err(AgentError::validation(format!(
                            "range filter needs a number or date field, '{field}' is {}",
                            ty.as_str()
                        )));
                    }
                    if min.is_none() && max.is_none() {
                        return Err(AgentError::validation(format!(
                            "range filter on '{field}' needs 'min' or 'max'"
                        )));
                    }
                    let min = min.as_ref().map(|v| coerce_payload(field, ty, v)).transpose()?;
                    let max = max.as_ref().map(|v| coerce_payload(field, ty, v)).transpose()?;
                    if let (Some(lo), Some(hi)) = (&min, &max) {
                        if lo.partial_cmp(hi) == Some(Ordering::Greater) {
                            return Err(AgentError::validation(format!(
                                "range filter on '{field}' has min {lo} greater than max {hi}"
                            )));
                        }
                    }
                    Predicate::Between {
                        field: field.to_string(),
                        ty,
                        min,
                        max,
                    }
                }
                FilterOp::Regex(pattern) => {
                    let compiled = Regex::new(pattern).map_err(|e| {
                        AgentError::validation(format!(
                            "invalid regex for '{field}': {e}"
                        ))
                    })?;
                    Predicate::Matches {
                        field: field.to_string(),
                        pattern: compiled,
                    }
                }
            };
            predicates.push(predicate);
        }

        Ok(Self { predicates })
    }

    /// Parse and compile the raw `filters` argument in one step.
    pub fn from_json(raw: &Value, catalog: &FieldCatalog) -> Result<Self, AgentError> {
        FilterSpec::parse_many(raw)
            .and_then(|specs| Self::compile(&specs, catalog))
            .map_err(with_examples)
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Whether any predicate reads a computed statistic.
    pub fn references_stats(&self) -> bool {
        self.predicates.iter().any(|p| {
            let field = match p {
                Predicate::Equals { field, .. }
                | Predicate::OneOf { field, .. }
                | Predicate::Between { field, .. }
                | Predicate::Matches { field, .. } => field,
            };
            FieldCatalog::is_stat(field)
        })
    }

    /// All predicates hold for `record`. Missing or null fields never match.
    pub fn matches(&self, record: &Value) -> bool {
        self.predicates.iter().all(|p| p.eval(record))
    }

    /// The matching records, in input order. The input is left untouched.
    pub fn apply(&self, records: &[Value]) -> Vec<Value> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }

    pub fn describe(&self) -> Vec<String> {
        self.predicates.iter().map(Predicate::describe).collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
