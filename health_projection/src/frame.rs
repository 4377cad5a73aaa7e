//! Row-per-period tables used for lag construction and model input.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{MetricSeries, PredictionRow};

/// Identity columns of a frame row. Ordering sorts by organization, then time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeriodKey {
    pub organization: String,
    pub year: i32,
    pub quarter: Option<u8>,
    pub month: Option<u8>,
}

impl PeriodKey {
    pub fn annual(organization: &str, year: i32) -> Self {
        Self {
            organization: organization.to_string(),
            year,
            quarter: None,
            month: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRow {
    pub key: PeriodKey,
    pub values: BTreeMap<String, Option<f64>>,
}

impl FrameRow {
    pub fn new(key: PeriodKey) -> Self {
        Self {
            key,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: Option<f64>) -> Self {
        self.values.insert(column.to_string(), value);
        self
    }

    /// Returns the value of `column`, treating absent columns as missing.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

/// A table of rows keyed by [`PeriodKey`], held in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    rows: Vec<FrameRow>,
}

impl Frame {
    /// Builds a frame, merging rows that share a key (later values win) and sorting by key.
    pub fn new(rows: Vec<FrameRow>) -> Self {
        let mut merged: BTreeMap<PeriodKey, BTreeMap<String, Option<f64>>> = BTreeMap::new();
        for row in rows {
            merged.entry(row.key).or_default().extend(row.values);
        }
        Self {
            rows: merged
                .into_iter()
                .map(|(key, values)| FrameRow { key, values })
                .collect(),
        }
    }

    /// Pivots long-form records to one row per (organization, year) and one column per metric.
    pub fn from_long(records: &[MetricSeries]) -> Self {
        Frame::new(
            records
                .iter()
                .map(|r| {
                    FrameRow::new(PeriodKey::annual(&r.organization, r.year))
                        .with(&r.metric, Some(r.value))
                })
                .collect(),
        )
    }

    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All non-identity column names appearing in any row.
    pub fn columns(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|r| r.values.keys().cloned())
            .collect()
    }

    pub fn row(&self, organization: &str, year: i32) -> Option<&FrameRow> {
        self.rows
            .iter()
            .find(|r| r.key.organization == organization && r.key.year == year)
    }

    /// Keeps rows whose year satisfies `keep`.
    pub fn filter_years<F: Fn(i32) -> bool>(&self, keep: F) -> Frame {
        Frame {
            rows: self
                .rows
                .iter()
                .filter(|r| keep(r.key.year))
                .cloned()
                .collect(),
        }
    }

    /// Drops every column for which `keep` returns false.
    pub fn retain_columns<F: Fn(&str) -> bool>(&self, keep: F) -> Frame {
        Frame {
            rows: self
                .rows
                .iter()
                .map(|r| FrameRow {
                    key: r.key.clone(),
                    values: r
                        .values
                        .iter()
                        .filter(|(c, _)| keep(c))
                        .map(|(c, v)| (c.clone(), *v))
                        .collect(),
                })
                .collect(),
        }
    }

    /// Adds empty annual rows for `organization` up to and including `last_year`.
    pub fn extend_to(&self, organization: &str, last_year: i32) -> Frame {
        let existing: BTreeSet<i32> = self
            .rows
            .iter()
            .filter(|r| r.key.organization == organization)
            .map(|r| r.key.year)
            .collect();
        let Some(&max_year) = existing.iter().next_back() else {
            return self.clone();
        };
        let mut rows = self.rows.clone();
        rows.extend(
            (max_year + 1..=last_year).map(|y| FrameRow::new(PeriodKey::annual(organization, y))),
        );
        Frame::new(rows)
    }

    /// Writes `updates` into cells that are currently missing.
    ///
    /// Present values (observed, edited or previously predicted) are preserved, and updates
    /// with no matching `(organization, year)` row are ignored.
    pub fn fill_missing(&self, updates: &[PredictionRow]) -> Frame {
        let mut rows = self.rows.clone();
        for update in updates {
            if let Some(row) = rows
                .iter_mut()
                .find(|r| r.key.organization == update.organization && r.key.year == update.year)
            {
                let cell = row.values.entry(update.metric.clone()).or_insert(None);
                if cell.is_none() {
                    *cell = Some(update.value);
                }
            }
        }
        Frame { rows }
    }

    /// Converts the given columns back to long-form rows, skipping missing cells.
    pub fn to_long(&self, columns: &BTreeSet<String>) -> Vec<PredictionRow> {
        let mut out = Vec::new();
        for row in &self.rows {
            for column in columns {
                if let Some(value) = row.get(column) {
                    out.push(PredictionRow {
                        metric: column.clone(),
                        organization: row.key.organization.clone(),
                        year: row.key.year,
                        value,
                    });
                }
            }
        }
        out.sort_by(|a, b| {
            (&a.metric, &a.organization, a.year).cmp(&(&b.metric, &b.organization, b.year))
        });
        out
    }
}
