//! Datasets threaded between pipeline stages
//!
//! Every stage accepts any [`StageResult`] variant and degrades to "no data"
//! when the shape does not fit, so consumers go through [`StageResult::records`]
//! instead of matching on a single expected variant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row keyed by column name
pub type Record = Map<String, Value>;

/// Headers plus positional rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column names
    pub headers: Vec<String>,
    /// Row values, positionally aligned with `headers`
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create new table
    #[inline]
    #[must_use]
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { headers, rows }
    }

    /// Convert rows into records; missing cells become null, extra cells are dropped
    #[must_use]
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }

    /// Whether the table has no data rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Output of the scraper: page text plus extracted tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    /// Visible text of the page
    pub text: String,
    /// Tables in document order
    pub tables: Vec<Table>,
}

impl ScrapedPage {
    /// The table most likely to hold the data: the one with the most rows,
    /// earliest wins on ties
    #[must_use]
    pub fn primary_table(&self) -> Option<&Table> {
        self.tables
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.rows.len().cmp(&b.rows.len()).then(ib.cmp(ia)))
            .map(|(_, t)| t)
    }
}

/// Output of the query engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Row values
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Number of returned rows
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl From<QueryResult> for Table {
    fn from(result: QueryResult) -> Self {
        Table::new(result.columns, result.rows)
    }
}

/// Dataset handed from one stage to the next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum StageResult {
    /// Nothing acquired
    #[default]
    None,
    /// Headers and rows
    Tabular(Table),
    /// Sequence of key/value records
    Records(Vec<Record>),
    /// Scraped page bundle
    Scraped(ScrapedPage),
}

impl StageResult {
    /// Records view of any variant; empty for `None` and for scraped pages
    /// without tables
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        match self {
            Self::None => Vec::new(),
            Self::Tabular(table) => table.to_records(),
            Self::Records(records) => records.clone(),
            Self::Scraped(page) => page.primary_table().map(Table::to_records).unwrap_or_default(),
        }
    }

    /// Raw text carried by the dataset, if any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Scraped(page) if !page.text.trim().is_empty() => Some(page.text.as_str()),
            _ => None,
        }
    }

    /// Column names in first-seen order
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::Tabular(table) => table.headers.clone(),
            Self::Scraped(page) => page
                .primary_table()
                .map(|t| t.headers.clone())
                .unwrap_or_default(),
            Self::Records(records) => {
                let mut cols: Vec<String> = Vec::new();
                for record in records {
                    for key in record.keys() {
                        if !cols.contains(key) {
                            cols.push(key.clone());
                        }
                    }
                }
                cols
            }
        }
    }

    /// Whether there is nothing usable in the dataset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Tabular(table) => table.is_empty(),
            Self::Records(records) => records.is_empty(),
            Self::Scraped(page) => page.text.trim().is_empty() && page.tables.iter().all(Table::is_empty),
        }
    }

    /// Short variant name for logs
    #[inline]
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tabular(_) => "tabular",
            Self::Records(_) => "records",
            Self::Scraped(_) => "scraped",
        }
    }
}

/// Case-insensitive field lookup: exact match first, then first key containing `needle`
#[must_use]
pub fn find_field<'a>(record: &'a Record, needle: &str) -> Option<&'a Value> {
    let needle = needle.to_lowercase();
    record
        .iter()
        .find(|(k, _)| k.to_lowercase() == needle)
        .or_else(|| record.iter().find(|(k, _)| k.to_lowercase().contains(&needle)))
        .map(|(_, v)| v)
}

/// Render a value the way a person would read it in a cell
#[must_use]
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
