//! Result tables
//!
//! Canonicalized query results. Every value read from the engine is converted
//! into a [`Cell`] at the boundary so comparisons never depend on driver types,
//! locale or wall-clock.

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};

/// A column of a result header
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name as reported by the engine
    pub name: String,

    /// Upper-cased engine type name, e.g. `INT4` or `VARCHAR`
    pub type_tag: String,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            type_tag: type_tag.into().to_uppercase(),
        }
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.name, self.type_tag)
    }
}

/// A canonicalized scalar value
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Cell {
    /// Integer value
    Int(i64),

    /// Exact decimal rendering without trailing fractional zeros
    Decimal(String),

    /// Text value
    Text(String),

    /// Date, time or timestamp in a fixed ISO-8601 form
    Date(String),

    /// SQL NULL
    Null,

    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Cell {
    /// Build a decimal cell from an exact textual rendering
    pub fn decimal(raw: &str) -> Self {
        Cell::Decimal(canonical_decimal(raw))
    }

    /// Build a text cell
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Whether this cell is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl Debug for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Cell::Int(v) => write!(f, "Int({})", v),
            Cell::Decimal(v) => write!(f, "Decimal({})", v),
            Cell::Text(v) => write!(f, "Text({:?})", v),
            Cell::Date(v) => write!(f, "Date({})", v),
            Cell::Null => write!(f, "Null"),
            Cell::Bytes(v) => {
                if v.len() > 16 {
                    write!(f, "Bytes({} bytes)", v.len())
                } else {
                    write!(f, "Bytes({:?})", v)
                }
            }
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Decimal(v) | Cell::Text(v) | Cell::Date(v) => write!(f, "{}", v),
            Cell::Null => write!(f, "NULL"),
            Cell::Bytes(v) => {
                write!(f, "\\x")?;
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Normalize an exact decimal string.
///
/// Trailing fractional zeros and a dangling point are removed and negative
/// zero becomes `0`, so `1.50`, `1.5` and `+1.5` all compare equal.
pub fn canonical_decimal(raw: &str) -> String {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    // NaN, Infinity and exponent forms are kept verbatim
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return trimmed.to_string();
    }

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part.trim_end_matches('0')),
        None => (digits, ""),
    };
    let int_part = int_part.trim_start_matches('0');
    let int_part = if int_part.is_empty() { "0" } else { int_part };

    let mut out = String::with_capacity(digits.len() + 1);
    if negative && !(int_part == "0" && frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// A row of cells
pub type Row = Vec<Cell>;

/// A materialized result with its header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Column names and type tags, in order
    pub header: Vec<Column>,

    /// Rows in the order the engine returned them
    pub rows: Vec<Row>,
}

impl ResultTable {
    /// Create a table from a header and rows
    pub fn new(header: Vec<Column>, rows: Vec<Row>) -> Self {
        ResultTable { header, rows }
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    /// Header rendered as `(NAME: TYPE, ...)`
    pub fn signature(&self) -> String {
        let columns: Vec<String> = self.header.iter().map(|c| c.to_string()).collect();
        format!("({})", columns.join(", "))
    }
}
