//! Type and format inference for table columns
//!
//! Each sampled value is classified as year, datetime, date, time or
//! integer. Once `threshold` values have been inspected, the leading type is
//! accepted as soon as it accounts for at least `confidence` of the values
//! seen so far. Columns that never reach that share are `any`.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::InferSettings;
use crate::defaults::DEFAULT_FIELD_FORMAT;
use crate::table::Table;

/// Field type the interpreter can infer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    Year,
    Datetime,
    Date,
    Time,
    Integer,
    Any,
}

impl InferredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferredType::Year => "year",
            InferredType::Datetime => "datetime",
            InferredType::Date => "date",
            InferredType::Time => "time",
            InferredType::Integer => "integer",
            InferredType::Any => "any",
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `type` and `format` of a table schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeAndFormat {
    #[serde(rename = "type")]
    pub field_type: InferredType,
    pub format: &'static str,
}

impl TypeAndFormat {
    fn of(field_type: InferredType) -> Self {
        Self {
            field_type,
            format: DEFAULT_FIELD_FORMAT,
        }
    }

    /// Fallback when nothing is confident enough
    pub fn any() -> Self {
        Self::of(InferredType::Any)
    }

    /// Table schema field descriptor named `name`
    pub fn to_field(&self, name: &str) -> Value {
        json!({
            "name": name,
            "type": self.field_type.as_str(),
            "format": self.format,
        })
    }
}

struct Patterns {
    year: Regex,
    datetime: Regex,
    date: Regex,
    time: Regex,
    integer: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        year: Regex::new(r"[12]\d{3}").unwrap(),
        datetime: Regex::new(r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|\d{4}[-/]\d{1,2}[-/]\d{1,2}).\d{1,2}:\d{2}").unwrap(),
        date: Regex::new(r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})|(\d{4}[-/]\d{1,2}[-/]\d{1,2})").unwrap(),
        time: Regex::new(r"^\d{1,2}((:\d{1,2})|(am|pm|AM|PM))$").unwrap(),
        integer: Regex::new(r"^\d+$").unwrap(),
    })
}

/// Classify a single value. Non-strings are `any`.
pub fn inspect_value(value: &Value) -> TypeAndFormat {
    let Value::String(value) = value else {
        return TypeAndFormat::any();
    };
    let p = patterns();

    // Year is checked on 4-character values only
    if value.chars().count() == 4 && p.year.is_match(value) {
        TypeAndFormat::of(InferredType::Year)
    } else if p.datetime.is_match(value) {
        TypeAndFormat::of(InferredType::Datetime)
    } else if p.date.is_match(value) {
        TypeAndFormat::of(InferredType::Date)
    } else if p.time.is_match(value) {
        TypeAndFormat::of(InferredType::Time)
    } else if p.integer.is_match(value) {
        TypeAndFormat::of(InferredType::Integer)
    } else {
        TypeAndFormat::any()
    }
}

/// Column classifier over a loaded [`Table`]
pub struct Interpreter<'t> {
    table: &'t Table,
    threshold: usize,
    confidence: f64,
}

impl<'t> Interpreter<'t> {
    pub fn new(table: &'t Table) -> Self {
        Self::with_settings(table, &InferSettings::default())
    }

    pub fn with_settings(table: &'t Table, settings: &InferSettings) -> Self {
        Self {
            table,
            threshold: table.rows().len().min(settings.threshold),
            confidence: settings.confidence,
        }
    }

    /// Number of values that must be inspected before a verdict
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Inferred type of the column named `header`; `any` for unknown headers
    pub fn type_and_format_at(&self, header: &str) -> TypeAndFormat {
        let Some(index) = self.table.headers().iter().position(|h| h == header) else {
            return TypeAndFormat::any();
        };
        self.classify(self.table.column(index))
    }

    /// Schema fields for every column, in header order
    pub fn fields(&self) -> Vec<Value> {
        self.table
            .headers()
            .iter()
            .map(|h| self.type_and_format_at(h).to_field(h))
            .collect()
    }

    fn classify<'v>(&self, values: impl Iterator<Item = &'v Value>) -> TypeAndFormat {
        let mut counts: HashMap<TypeAndFormat, usize> = HashMap::new();
        let mut first_seen: Vec<TypeAndFormat> = Vec::new();

        for (i, value) in values.enumerate() {
            let inspected = i + 1;
            let inspection = inspect_value(value);
            let count = counts.entry(inspection).or_insert(0);
            if *count == 0 {
                first_seen.push(inspection);
            }
            *count += 1;

            if inspected < self.threshold {
                continue;
            }

            // Leading candidate; ties go to whichever type appeared first
            let leader = first_seen
                .iter()
                .copied()
                .max_by(|a, b| counts[a].cmp(&counts[b]).then(std::cmp::Ordering::Greater))
                .unwrap_or_else(TypeAndFormat::any);
            let share = counts[&leader] as f64 / inspected as f64;
            if share >= self.confidence {
                return leader;
            }
        }

        TypeAndFormat::any()
    }
}
