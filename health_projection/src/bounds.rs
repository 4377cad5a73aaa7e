//! Clamping of scenario values to valid numeric ranges and historical envelopes.

use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::scenario::ScenarioTable;
use crate::types::MetricHistory;

/// Upper bound applied to proportion and percentage metrics.
const PROPORTION_CEILING: f64 = 100.0;

/// Historic `[min, max]` of each metric across the supplied history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricRanges {
    ranges: BTreeMap<String, (f64, f64)>,
}

impl HistoricRanges {
    pub fn from_history(history: &MetricHistory) -> Self {
        let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for r in history.records() {
            if r.value.is_finite() {
                values.entry(r.metric.clone()).or_default().push(r.value);
            }
        }
        let ranges = values
            .into_iter()
            .map(|(metric, v)| {
                let lo = Statistics::min(v.iter());
                let hi = Statistics::max(v.iter());
                (metric, (lo, hi))
            })
            .collect();
        Self { ranges }
    }

    pub fn insert(&mut self, metric: &str, min: f64, max: f64) -> &mut Self {
        self.ranges.insert(metric.to_string(), (min, max));
        self
    }

    pub fn get(&self, metric: &str) -> Option<(f64, f64)> {
        self.ranges.get(metric).copied()
    }
}

/// True when the metric name marks a proportion (case-insensitive `proportion|prevalence|%`).
pub fn is_proportion(metric: &str) -> bool {
    let lower = metric.to_lowercase();
    lower.contains("proportion") || lower.contains("prevalence") || lower.contains('%')
}

/// Clamps a single value. `range` is `None` for metrics without history or overridden cells.
///
/// The historic range can narrow the valid interval but never widen it: the result always
/// lies in `[0, ∞)`, or `[0, 100]` for proportions.
pub fn clamp_value(value: f64, proportion: bool, range: Option<(f64, f64)>) -> f64 {
    let ceiling = if proportion {
        PROPORTION_CEILING
    } else {
        f64::INFINITY
    };
    let mut v = value.max(0.0).min(ceiling);
    if let Some((lo, hi)) = range {
        v = v.min(hi).max(lo);
    }
    v.max(0.0).min(ceiling)
}

/// Applies the bounds rules to every cell of `table`.
///
/// Rules, in order: negatives become 0; proportion metrics are capped at 100; values are
/// clamped into the metric's historic range. The historic clamp is skipped for cells the
/// user has explicitly edited, but those still respect the first two rules.
pub fn enforce(table: &ScenarioTable, ranges: &HistoricRanges) -> ScenarioTable {
    let mut out = table.clone();
    for ((_, metric), values) in out.rows_mut() {
        let proportion = is_proportion(metric);
        let range = ranges.get(metric);
        for (year, value) in values.iter_mut() {
            let overridden = table.is_overridden(metric, *year);
            *value = clamp_value(*value, proportion, if overridden { None } else { range });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Domain, MetricSeries};

    #[test]
    fn test_proportion_pattern() {
        assert!(is_proportion("Proportion of patients seen"));
        assert!(is_proportion("Obesity PREVALENCE"));
        assert!(is_proportion("% within 4 hours"));
        assert!(!is_proportion("Bed occupancy"));
    }

    #[test]
    fn test_historic_bound_is_applied_after_proportion_cap() {
        assert_eq!(clamp_value(140.0, true, Some((10.0, 80.0))), 80.0);
        assert_eq!(clamp_value(140.0, true, Some((10.0, 300.0))), 100.0);
        assert_eq!(clamp_value(-3.0, false, Some((5.0, 10.0))), 5.0);
        assert_eq!(clamp_value(-3.0, false, None), 0.0);
    }

    #[test]
    fn test_historic_bound_never_widens_valid_interval() {
        assert_eq!(clamp_value(50.0, true, Some((105.0, 120.0))), 100.0);
        assert_eq!(clamp_value(3.0, false, Some((-10.0, -5.0))), 0.0);
        assert_eq!(clamp_value(3.0, true, Some((-10.0, -5.0))), 0.0);
    }

    #[test]
    fn test_ranges_from_history() {
        let history = MetricHistory::new(vec![
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2020, 7.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2021, 3.0),
            MetricSeries::new("QHM", "Beds", Domain::Capacity, 2021, 11.0),
        ]);
        let ranges = HistoricRanges::from_history(&history);
        assert_eq!(ranges.get("Beds"), Some((3.0, 11.0)));
        assert_eq!(ranges.get("Staff"), None);
    }
}
