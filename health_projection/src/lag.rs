//! Lagged feature construction.

use std::collections::BTreeMap;

use crate::frame::{Frame, FrameRow};

/// Number of prior periods exposed as predictors unless configured otherwise.
pub const DEFAULT_LAG_DEPTH: usize = 2;

const LAG_PREFIX: &str = "lag_";

/// Name of the `k`-period lag of `column`, e.g. `lag_1_Bed occupancy`.
pub fn lag_column(k: usize, column: &str) -> String {
    format!("{}{}_{}", LAG_PREFIX, k, column)
}

fn split_lag(column: &str) -> Option<&str> {
    column
        .strip_prefix(LAG_PREFIX)
        .and_then(|rest| rest.split_once('_'))
        .filter(|(k, _)| !k.is_empty() && k.chars().all(|c| c.is_ascii_digit()))
        .map(|(_, base)| base)
}

fn is_lag_column(column: &str) -> bool {
    split_lag(column).is_some()
}

/// The column a lag feature was built from; other columns are returned unchanged.
pub fn base_column(column: &str) -> &str {
    split_lag(column).unwrap_or(column)
}

/// Augments `frame` with `lag_1_<col>` .. `lag_<depth>_<col>` for every value column.
///
/// Rows are partitioned by organization and ordered by year, quarter and month within each
/// partition. The `k`-lag of a row is the value `k` rows earlier in its own partition, so the
/// first `k` rows of every organization are missing. Existing lag columns are dropped first,
/// which makes rebuilding on an already-lagged frame a no-op.
pub fn build_lags(frame: &Frame, depth: usize) -> Frame {
    let base = frame.retain_columns(|c| !is_lag_column(c));
    let columns = base.columns();

    let mut partitions: BTreeMap<&str, Vec<&FrameRow>> = BTreeMap::new();
    for row in base.rows() {
        partitions
            .entry(row.key.organization.as_str())
            .or_default()
            .push(row);
    }

    let mut out = Vec::with_capacity(base.len());
    for rows in partitions.values() {
        // Frame rows are key-ordered, so each partition is already in time order.
        for (i, row) in rows.iter().enumerate() {
            let mut lagged = (*row).clone();
            for k in 1..=depth {
                let source = i.checked_sub(k).map(|j| rows[j]);
                for column in &columns {
                    lagged
                        .values
                        .insert(lag_column(k, column), source.and_then(|s| s.get(column)));
                }
            }
            out.push(lagged);
        }
    }
    Frame::new(out)
}
