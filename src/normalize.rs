//! Column typing and deduplication of raw query results.
//!
//! A dashboard describes its columns as a list of [`ColumnRule`]s. The
//! normalizer applies them in order, then drops rows that are exact
//! duplicates of an earlier row and renumbers what is left from zero.
use crate::core::db::{RawTable, Value};
use crate::core::{DashError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use tracing::debug;

/// Format used when a date cell is turned back into text
pub const DATE_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Semantic type a column is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnKind {
    /// Date/time; unparseable values become "no value"
    Date,
    /// Whole number; unparseable or missing values become 0
    Integer,
    /// Floating point; unparseable or missing values become 0.0
    Float,
    /// Trimmed, title-cased text
    TitleText,
}

/// How one column of a result table is typed.
///
/// `target` equals `source` for in-place typing. A different `target` adds
/// a derived column (or replaces it, if a column of that name exists).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnRule {
    pub source: &'static str,
    pub target: &'static str,
    pub kind: ColumnKind,
}

impl ColumnRule {
    pub const fn new(column: &'static str, kind: ColumnKind) -> Self {
        ColumnRule {
            source: column,
            target: column,
            kind,
        }
    }

    pub const fn derived(source: &'static str, target: &'static str, kind: ColumnKind) -> Self {
        ColumnRule {
            source,
            target,
            kind,
        }
    }
}

/// A typed value in a normalized table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// `None` is the explicit "no value" marker for unparseable dates
    Date(Option<NaiveDateTime>),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Column without a typing rule, passed through untouched
    Raw(Value),
}

impl Cell {
    /// Numeric view used by aggregations; non-numeric cells count as zero
    pub fn as_f64(&self) -> f64 {
        match self {
            Cell::Integer(i) | Cell::Raw(Value::Integer(i)) => *i as f64,
            Cell::Float(f) | Cell::Raw(Value::Real(f)) => *f,
            _ => 0.0,
        }
    }

    /// The untyped value this cell would have come from
    pub fn to_value(&self) -> Value {
        match self {
            Cell::Date(Some(d)) => Value::Text(d.format(DATE_TEXT_FORMAT).to_string()),
            Cell::Date(None) => Value::Null,
            Cell::Integer(i) => Value::Integer(*i),
            Cell::Float(f) => Value::Real(*f),
            Cell::Text(s) => Value::Text(s.clone()),
            Cell::Raw(v) => v.clone(),
        }
    }

    fn key(&self) -> CellKey {
        match self {
            Cell::Date(d) => CellKey::Date(*d),
            Cell::Integer(i) | Cell::Raw(Value::Integer(i)) => CellKey::Integer(*i),
            Cell::Float(f) | Cell::Raw(Value::Real(f)) => CellKey::Float(float_bits(*f)),
            Cell::Text(s) | Cell::Raw(Value::Text(s)) => CellKey::Text(s.clone()),
            Cell::Raw(Value::Blob(b)) => CellKey::Blob(b.clone()),
            Cell::Raw(Value::Null) => CellKey::Null,
        }
    }
}

/// Hashable identity of a cell for duplicate detection
#[derive(Debug, PartialEq, Eq, Hash)]
enum CellKey {
    Null,
    Date(Option<NaiveDateTime>),
    Integer(i64),
    Float(u64),
    Text(String),
    Blob(Vec<u8>),
}

fn float_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

/// Typed, de-duplicated rows ready for display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub columns: Vec<String>,
    /// Kind per column, `None` for passthrough columns
    pub kinds: Vec<Option<ColumnKind>>,
    pub rows: Vec<Vec<Cell>>,
}

impl NormalizedTable {
    /// Zero rows and no schema
    pub fn empty() -> Self {
        NormalizedTable::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row labels; always contiguous from zero
    pub fn index(&self) -> Range<usize> {
        0..self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.column_index(name).and_then(|i| self.kinds[i])
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Sum of a numeric column; missing columns sum to zero
    pub fn sum(&self, column: &str) -> f64 {
        let Some(idx) = self.column_index(column) else {
            return 0.0;
        };
        self.rows.iter().map(|row| row[idx].as_f64()).sum()
    }

    /// Converts back into untyped rows, e.g. to normalize again
    pub fn to_raw(&self) -> RawTable {
        RawTable::new(
            self.columns.clone(),
            self.rows
                .iter()
                .map(|row| row.iter().map(Cell::to_value).collect())
                .collect(),
        )
    }

    /// Exports rows as a JSON array of column-name keyed objects
    pub fn to_json(&self) -> Result<String> {
        let rows: Vec<BTreeMap<&str, &Cell>> = self
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter())
                    .collect()
            })
            .collect();
        Ok(serde_json::to_string(&rows)?)
    }
}

/// Types `raw` according to `rules`, then removes duplicate rows.
///
/// An empty input yields an empty table carrying whatever schema can be
/// derived from it. A rule naming a column that is absent from a non-empty
/// input is an error.
pub fn normalize(raw: &RawTable, rules: &[ColumnRule]) -> Result<NormalizedTable> {
    let mut table = NormalizedTable {
        columns: raw.columns.clone(),
        kinds: vec![None; raw.columns.len()],
        rows: raw
            .rows
            .iter()
            .map(|row| row.iter().cloned().map(Cell::Raw).collect())
            .collect(),
    };

    for rule in rules {
        let Some(src) = table.column_index(rule.source) else {
            if raw.is_empty() {
                continue;
            }
            return Err(DashError::Normalize(format!(
                "column '{}' not found in result",
                rule.source
            )));
        };
        let typed: Vec<Cell> = table
            .rows
            .iter()
            .map(|row| coerce(&row[src].to_value(), rule.kind))
            .collect();

        match table.column_index(rule.target) {
            Some(dst) => {
                table.kinds[dst] = Some(rule.kind);
                for (row, cell) in table.rows.iter_mut().zip(typed) {
                    row[dst] = cell;
                }
            }
            None => {
                table.columns.push(rule.target.to_string());
                table.kinds.push(Some(rule.kind));
                for (row, cell) in table.rows.iter_mut().zip(typed) {
                    row.push(cell);
                }
            }
        }
    }

    let before = table.rows.len();
    let mut seen = HashSet::with_capacity(before);
    table
        .rows
        .retain(|row| seen.insert(row.iter().map(Cell::key).collect::<Vec<_>>()));
    if table.rows.len() < before {
        debug!(dropped = before - table.rows.len(), "removed duplicate rows");
    }
    Ok(table)
}

/// Coerces one untyped value to `kind`
pub fn coerce(value: &Value, kind: ColumnKind) -> Cell {
    match kind {
        ColumnKind::Date => Cell::Date(parse_date(value)),
        ColumnKind::Integer => Cell::Integer(coerce_integer(value)),
        ColumnKind::Float => Cell::Float(coerce_float(value)),
        ColumnKind::TitleText => Cell::Text(title_case(value_text(value).trim())),
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn coerce_integer(value: &Value) -> i64 {
    match value {
        Value::Integer(i) => *i,
        Value::Real(f) if f.is_finite() => f.trunc() as i64,
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| parse_finite(s).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

pub fn coerce_float(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Real(f) if f.is_finite() => *f,
        Value::Text(s) => parse_finite(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Parses a date/time value; `None` when it cannot be interpreted.
///
/// Numbers are taken as Unix seconds.
pub fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Text(s) => parse_date_str(s.trim()),
        Value::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|d| d.naive_utc()),
        Value::Real(f) if f.is_finite() => {
            let secs = f.floor();
            let nanos = ((f - secs) * 1e9) as u32;
            DateTime::from_timestamp(secs as i64, nanos).map(|d| d.naive_utc())
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

/// Uppercases the first letter of every word and lowercases the rest.
///
/// A word starts at any letter that does not follow another letter, so
/// `"o'neil-SMITH"` becomes `"O'Neil-Smith"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if !c.is_alphabetic() {
            out.push(c);
            in_word = false;
            continue;
        }
        if in_word {
            out.extend(c.to_lowercase());
        } else {
            // multi-char uppercase forms keep only their first char upper
            let mut upper = c.to_uppercase();
            if let Some(first) = upper.next() {
                out.push(first);
            }
            out.extend(upper.flat_map(char::to_lowercase));
        }
        in_word = true;
    }
    out
}
