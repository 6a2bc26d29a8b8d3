//! Computed paradigmatic results and their sort/page views.
//!
//! A `PQueryResult` is immutable once produced. Sorting yields a new
//! ordering of the same rows and paging slices it; neither touches the
//! frequency service.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use concordia_core::{Error, ParadigmaticResultRow, Result, SubQueryItem};

/// Column a result can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Value,
    TotalFreq,
    /// Frequency in the sub-query at this position.
    Subquery(usize),
}

impl SortColumn {
    /// Direction a column starts in when first selected.
    pub fn initial_direction(&self) -> SortDirection {
        match self {
            SortColumn::Value => SortDirection::Ascending,
            SortColumn::TotalFreq | SortColumn::Subquery(_) => SortDirection::Descending,
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortColumn::Value => write!(f, "value"),
            SortColumn::TotalFreq => write!(f, "total"),
            SortColumn::Subquery(i) => write!(f, "sub{}", i),
        }
    }
}

impl std::str::FromStr for SortColumn {
    type Err = Error;

    /// Accepts `value`, `total`, or `subN` / a bare sub-query index.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "value" => Ok(SortColumn::Value),
            "total" | "total_freq" | "freq" => Ok(SortColumn::TotalFreq),
            other => other
                .strip_prefix("sub")
                .unwrap_or(other)
                .parse::<usize>()
                .map(SortColumn::Subquery)
                .map_err(|_| Error::InvalidInput(format!("unknown sort column: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Current ordering of a result view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: SortColumn::TotalFreq,
            direction: SortDirection::Descending,
        }
    }
}

impl SortState {
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    /// Click on a column header: the active column flips direction, any
    /// other column becomes active in its initial direction.
    pub fn toggle(self, column: SortColumn) -> Self {
        if self.column == column {
            Self::new(column, self.direction.flipped())
        } else {
            Self::new(column, column.initial_direction())
        }
    }

    fn compare(&self, a: &ParadigmaticResultRow, b: &ParadigmaticResultRow) -> Ordering {
        let primary = match self.column {
            SortColumn::Value => a.value.cmp(&b.value),
            SortColumn::TotalFreq => a.total_freq.cmp(&b.total_freq),
            SortColumn::Subquery(i) => {
                let fa = a.per_subquery_freq.get(i).copied().unwrap_or(0);
                let fb = b.per_subquery_freq.get(i).copied().unwrap_or(0);
                fa.cmp(&fb)
            }
        };
        let primary = match self.direction {
            SortDirection::Ascending => primary,
            SortDirection::Descending => primary.reverse(),
        };
        primary.then_with(|| a.value.cmp(&b.value))
    }
}

/// One page of a sorted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PQueryPage {
    pub rows: Vec<ParadigmaticResultRow>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_rows: usize,
}

impl PQueryPage {
    /// Pagination indicator, e.g. `"2 / 11"`.
    pub fn indicator(&self) -> String {
        format!("{} / {}", self.page, self.total_pages)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Rows of one finished paradigmatic evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PQueryResult {
    subqueries: Vec<SubQueryItem>,
    rows: Vec<ParadigmaticResultRow>,
    sort: SortState,
}

impl PQueryResult {
    /// Wrap combined rows, ordered by the default sort.
    pub fn new(subqueries: Vec<SubQueryItem>, mut rows: Vec<ParadigmaticResultRow>) -> Self {
        let sort = SortState::default();
        rows.sort_by(|a, b| sort.compare(a, b));
        Self {
            subqueries,
            rows,
            sort,
        }
    }

    pub fn subqueries(&self) -> &[SubQueryItem] {
        &self.subqueries
    }

    pub fn rows(&self) -> &[ParadigmaticResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sort_state(&self) -> SortState {
        self.sort
    }

    /// Same rows in another order.
    pub fn sorted(&self, sort: SortState) -> Result<Self> {
        if let SortColumn::Subquery(i) = sort.column {
            if i >= self.subqueries.len() {
                return Err(Error::IndexOutOfRange {
                    index: i,
                    len: self.subqueries.len(),
                });
            }
        }
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| sort.compare(a, b));
        Ok(Self {
            subqueries: self.subqueries.clone(),
            rows,
            sort,
        })
    }

    /// Apply a header click; see [`SortState::toggle`].
    pub fn toggled(&self, column: SortColumn) -> Result<Self> {
        self.sorted(self.sort.toggle(column))
    }

    /// Number of pages at `page_size`; an empty result has one empty page.
    pub fn total_pages(&self, page_size: usize) -> usize {
        if page_size == 0 {
            return 0;
        }
        self.rows.len().div_ceil(page_size).max(1)
    }

    /// Slice out page `page` (1-based).
    pub fn page(&self, page: usize, page_size: usize) -> Result<PQueryPage> {
        if page == 0 || page_size == 0 {
            return Err(Error::InvalidInput(
                "page and page size must be positive".to_string(),
            ));
        }
        let total_pages = self.total_pages(page_size);
        if page > total_pages {
            return Err(Error::IndexOutOfRange {
                index: page,
                len: total_pages,
            });
        }
        let rows = self
            .rows
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();
        Ok(PQueryPage {
            rows,
            page,
            page_size,
            total_pages,
            total_rows: self.rows.len(),
        })
    }

    /// CSV with header `value,<cql>...,total`, rows in the current order.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let mut header = vec![csv_field("value")];
        header.extend(self.subqueries.iter().map(|s| {
            if s.negated {
                csv_field(&format!("!{}", s.cql))
            } else {
                csv_field(&s.cql)
            }
        }));
        header.push(csv_field("total"));
        out.push_str(&header.join(","));
        out.push('\n');

        for row in &self.rows {
            let mut fields = vec![csv_field(&row.value)];
            fields.extend(row.per_subquery_freq.iter().map(|f| f.to_string()));
            fields.push(row.total_freq.to_string());
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
