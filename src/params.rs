//! Parameter Set - the query compiler's input
//!
//! Planner output and chart requests arrive as loose JSON objects. They are
//! normalized here exactly once into typed optional fields, so the compiler
//! never has to ask "is this key present and well-formed" again.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    Sum,
    Count,
    Average,
    #[default]
    None,
}

impl Aggregation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            "average" | "avg" => Some(Self::Average),
            "none" | "" => Some(Self::None),
            _ => None,
        }
    }

    /// SQL aggregate function, `None` for raw rows
    pub fn sql_function(&self) -> Option<&'static str> {
        match self {
            Self::Sum => Some("SUM"),
            Self::Count => Some("COUNT"),
            Self::Average => Some("AVG"),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Value side of the equality filter. Always bound, never interpolated.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl FilterValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Real)),
            Value::Null => None,
            Value::Array(_) | Value::Object(_) => {
                warn!(filter_value = %value, "Unsupported filter_value shape. Ignoring filter.");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    /// Grouping / category column
    pub x_axis: Option<String>,

    /// Measure column, or the derived `total_sales`
    pub y_axis: Option<String>,

    pub aggregation: Aggregation,

    pub filter_column: Option<String>,
    pub filter_value: Option<FilterValue>,

    pub sort_by: Option<String>,
    pub sort_order: SortOrder,

    /// Row cap, only ever a valid non-negative integer
    pub limit: Option<u64>,

    /// Raw period token, resolved by the time-window resolver at compile time
    pub time_period: Option<String>,
}

/// Mirror of the wire shape; every key optional and untyped.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParameterSet {
    x_axis: Option<Value>,
    y_axis: Option<Value>,
    aggregation: Option<Value>,
    filter_column: Option<Value>,
    filter_value: Option<Value>,
    sort_by: Option<Value>,
    sort_order: Option<Value>,
    limit: Option<Value>,
    time_period: Option<Value>,
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawParameterSet::deserialize(deserializer).map(ParameterSet::from)
    }
}

impl From<RawParameterSet> for ParameterSet {
    fn from(raw: RawParameterSet) -> Self {
        let aggregation = match raw.aggregation.as_ref().and_then(text) {
            Some(value) => Aggregation::parse(&value).unwrap_or_else(|| {
                warn!(aggregation = %value, "Unknown aggregation. Falling back to none.");
                Aggregation::None
            }),
            None => Aggregation::None,
        };

        let sort_order = match raw.sort_order.as_ref().and_then(text) {
            Some(value) => SortOrder::parse(&value).unwrap_or_else(|| {
                warn!(sort_order = %value, "Unknown sort_order. Falling back to desc.");
                SortOrder::Desc
            }),
            None => SortOrder::Desc,
        };

        let limit = match raw.limit.as_ref() {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = parse_limit(value);
                if parsed.is_none() {
                    warn!(limit = %value, "Invalid limit value. Ignoring limit.");
                }
                parsed
            }
        };

        Self {
            x_axis: raw.x_axis.as_ref().and_then(name),
            y_axis: raw.y_axis.as_ref().and_then(name),
            aggregation,
            filter_column: raw.filter_column.as_ref().and_then(name),
            filter_value: raw.filter_value.as_ref().and_then(FilterValue::from_json),
            sort_by: raw.sort_by.as_ref().and_then(name),
            sort_order,
            limit,
            time_period: raw.time_period.as_ref().and_then(name),
        }
    }
}

impl ParameterSet {
    /// Normalize a loose JSON payload. Anything that is not an object yields
    /// the empty parameter set ("no constraint").
    pub fn from_json(value: &Value) -> Self {
        if !value.is_object() {
            if !value.is_null() {
                warn!(payload = %value, "Parameter set is not a JSON object. Treating as empty.");
            }
            return Self::default();
        }
        match serde_json::from_value::<RawParameterSet>(value.clone()) {
            Ok(raw) => raw.into(),
            Err(e) => {
                warn!(error = %e, "Could not read parameter set. Treating as empty.");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Non-negative integer, integral float, or numeric string
pub fn parse_limit(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Column names and period tokens: non-empty trimmed strings only
fn name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::String(_) | Value::Null => None,
        other => {
            warn!(value = %other, "Expected a string parameter. Ignoring.");
            None
        }
    }
}
