//! Tabular reader over CSV bytes or inline rows

use csv::{ReaderBuilder, Terminator, Trim};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ResourceError;
use crate::fetch::Fetch;
use crate::resource::Source;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Rows of a tabular resource, fully loaded
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
    missing_values: Vec<String>,
}

impl Table {
    /// Load the table behind `source`.
    ///
    /// `dialect` controls CSV parsing; `schema` supplies `missingValues` and,
    /// for header-less data, the column names.
    pub fn open(
        source: &Source,
        dialect: Option<&Map<String, Value>>,
        schema: Option<&Value>,
        fetcher: &dyn Fetch,
    ) -> Result<Self, ResourceError> {
        let missing_values = missing_values(schema);
        let (headers, rows) = match source {
            Source::Inline(data) => read_inline(data, schema)?,
            Source::Local(path) => {
                let location = path.to_string_lossy();
                let bytes = fetcher.fetch(&location)?;
                read_csv(&bytes, &location, dialect, schema)?
            }
            Source::Remote(url) => {
                let bytes = fetcher.fetch(url)?;
                read_csv(&bytes, url, dialect, schema)?
            }
        };

        debug!(columns = headers.len(), rows = rows.len(), "loaded table");
        Ok(Self {
            headers,
            rows,
            missing_values,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Raw cell values, without missing-value handling
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Raw values of one column; short rows are skipped
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Rows as arrays, or as objects keyed by header when `keyed`.
    /// Cells matching a missing value become `null`.
    pub fn iter(&self, keyed: bool) -> impl Iterator<Item = Value> + '_ {
        self.rows.iter().map(move |row| {
            let cells = row.iter().map(|cell| self.cast_missing(cell));
            if keyed {
                let mut object = Map::new();
                for (header, cell) in self.headers.iter().zip(cells) {
                    object.insert(header.clone(), cell);
                }
                Value::Object(object)
            } else {
                Value::Array(cells.collect())
            }
        })
    }

    pub fn read(&self, keyed: bool) -> Vec<Value> {
        self.iter(keyed).collect()
    }

    fn cast_missing(&self, cell: &Value) -> Value {
        match cell {
            Value::String(s) if self.missing_values.iter().any(|m| m == s) => Value::Null,
            other => other.clone(),
        }
    }
}

fn missing_values(schema: Option<&Value>) -> Vec<String> {
    match schema.and_then(|s| s.get("missingValues")).and_then(Value::as_array) {
        Some(values) => values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        None => vec![String::new()],
    }
}

fn schema_field_names(schema: Option<&Value>) -> Option<Vec<String>> {
    let fields = schema?.get("fields")?.as_array()?;
    Some(
        fields
            .iter()
            .filter_map(|f| f.get("name").and_then(Value::as_str).map(str::to_string))
            .collect(),
    )
}

fn read_inline(data: &Value, schema: Option<&Value>) -> Result<(Vec<String>, Vec<Vec<Value>>), ResourceError> {
    let Value::Array(items) = data else {
        return Err(ResourceError::InlineNotTabular(data.to_string()));
    };

    match items.first() {
        None => Ok((schema_field_names(schema).unwrap_or_default(), Vec::new())),
        // First row is the header
        Some(Value::Array(first)) => {
            let headers = first.iter().map(cell_to_header).collect();
            let rows = items
                .iter()
                .skip(1)
                .map(|row| match row {
                    Value::Array(cells) => Ok(cells.clone()),
                    other => Err(ResourceError::InlineNotTabular(other.to_string())),
                })
                .collect::<Result<_, _>>()?;
            Ok((headers, rows))
        }
        Some(Value::Object(first)) => {
            let headers: Vec<String> =
                schema_field_names(schema).unwrap_or_else(|| first.keys().cloned().collect());
            let rows = items
                .iter()
                .map(|row| match row {
                    Value::Object(map) => Ok(headers
                        .iter()
                        .map(|h| map.get(h).cloned().unwrap_or(Value::Null))
                        .collect()),
                    other => Err(ResourceError::InlineNotTabular(other.to_string())),
                })
                .collect::<Result<_, _>>()?;
            Ok((headers, rows))
        }
        Some(other) => Err(ResourceError::InlineNotTabular(other.to_string())),
    }
}

fn cell_to_header(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn dialect_byte(dialect: Option<&Map<String, Value>>, key: &str) -> Option<u8> {
    dialect?
        .get(key)?
        .as_str()?
        .as_bytes()
        .first()
        .copied()
}

fn dialect_flag(dialect: Option<&Map<String, Value>>, key: &str, default: bool) -> bool {
    dialect
        .and_then(|d| d.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn read_csv(
    bytes: &[u8],
    location: &str,
    dialect: Option<&Map<String, Value>>,
    schema: Option<&Value>,
) -> Result<(Vec<String>, Vec<Vec<Value>>), ResourceError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let double_quote = dialect_flag(dialect, "doubleQuote", true);
    let header = dialect_flag(dialect, "header", true);

    let mut builder = ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .delimiter(dialect_byte(dialect, "delimiter").unwrap_or(b','))
        .quote(dialect_byte(dialect, "quoteChar").unwrap_or(b'"'))
        .double_quote(double_quote)
        .comment(dialect_byte(dialect, "commentChar"));

    if !double_quote {
        builder.escape(dialect_byte(dialect, "escapeChar"));
    }
    if dialect_flag(dialect, "skipInitialSpace", false) {
        builder.trim(Trim::All);
    }
    match dialect
        .and_then(|d| d.get("lineTerminator"))
        .and_then(Value::as_str)
    {
        Some(t) if t.len() == 1 => {
            builder.terminator(Terminator::Any(t.as_bytes()[0]));
        }
        _ => {
            builder.terminator(Terminator::CRLF);
        }
    }

    let mut reader = builder.from_reader(bytes);
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| ResourceError::Csv {
            location: location.to_string(),
            source,
        })?;
        records.push(record.iter().map(|cell| Value::String(cell.to_string())).collect::<Vec<_>>());
    }

    let mut records = records.into_iter();
    let headers = if header {
        records
            .next()
            .map(|first| first.iter().map(cell_to_header).collect())
            .unwrap_or_default()
    } else {
        schema_field_names(schema).unwrap_or_default()
    };

    Ok((headers, records.collect()))
}
