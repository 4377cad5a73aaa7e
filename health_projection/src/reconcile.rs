//! Merges observed, back-fitted and projected values into one display-ready series.

use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::types::{Domain, MetricHistory, PredictionRow, ScenarioName};
use crate::ProjectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Observed,
    Fitted,
    Predicted,
}

/// Provenance of a reconciled value, rendered as `observed`, `fitted_<label>` or
/// `predicted_<label>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueType {
    pub quantity: Quantity,
    pub scenario: Option<ScenarioName>,
}

impl ValueType {
    pub fn observed() -> Self {
        Self {
            quantity: Quantity::Observed,
            scenario: None,
        }
    }

    pub fn fitted(scenario: ScenarioName) -> Self {
        Self {
            quantity: Quantity::Fitted,
            scenario: Some(scenario),
        }
    }

    pub fn predicted(scenario: ScenarioName) -> Self {
        Self {
            quantity: Quantity::Predicted,
            scenario: Some(scenario),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.quantity {
            Quantity::Observed => "observed",
            Quantity::Fitted => "fitted",
            Quantity::Predicted => "predicted",
        };
        match self.scenario {
            Some(name) => write!(f, "{}_{}", prefix, name.label()),
            None => f.write_str(prefix),
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRow {
    pub value_type: ValueType,
    pub metric: String,
    pub year: i32,
    pub organization: String,
    pub value: f64,
}

/// Combines the three sources for one organization.
///
/// Modelled metrics are those appearing in `backfit` or in any scenario's predictions; only
/// their observed performance values are kept. Back-fitted rows are repeated for every scenario
/// in `scenarios`. Scenario predictions for a `(year, metric)` that has observed data are
/// dropped. Rows are unique on `(value_type, metric, year, organization)` and sorted by that key.
pub fn reconcile(
    observed: &MetricHistory,
    backfit: &[PredictionRow],
    scenarios: &BTreeMap<ScenarioName, Vec<PredictionRow>>,
) -> Vec<ReconciledRow> {
    let modelled: BTreeSet<&str> = backfit
        .iter()
        .chain(scenarios.values().flatten())
        .map(|r| r.metric.as_str())
        .collect();
    let observed_rows: Vec<_> = observed
        .records()
        .iter()
        .filter(|r| r.domain == Domain::Performance && modelled.contains(r.metric.as_str()))
        .collect();
    let observed_keys: BTreeSet<(i32, &str)> = observed_rows
        .iter()
        .map(|r| (r.year, r.metric.as_str()))
        .collect();

    let mut merged: BTreeMap<(ValueType, String, i32, String), f64> = BTreeMap::new();
    for r in &observed_rows {
        merged.insert(
            (ValueType::observed(), r.metric.clone(), r.year, r.organization.clone()),
            r.value,
        );
    }
    for &name in scenarios.keys() {
        for r in backfit {
            merged.insert(
                (ValueType::fitted(name), r.metric.clone(), r.year, r.organization.clone()),
                r.value,
            );
        }
    }
    for (&name, predictions) in scenarios {
        for r in predictions
            .iter()
            .filter(|r| !observed_keys.contains(&(r.year, r.metric.as_str())))
        {
            merged.insert(
                (ValueType::predicted(name), r.metric.clone(), r.year, r.organization.clone()),
                r.value,
            );
        }
    }

    merged
        .into_iter()
        .map(|((value_type, metric, year, organization), value)| ReconciledRow {
            value_type,
            metric,
            year,
            organization,
            value,
        })
        .collect()
}

/// Long-form DataFrame with `value_type, metric, year, organization, value` columns.
pub fn to_dataframe(rows: &[ReconciledRow]) -> Result<DataFrame, ProjectionError> {
    let value_types: Vec<String> = rows.iter().map(|r| r.value_type.to_string()).collect();
    let metrics: Vec<&str> = rows.iter().map(|r| r.metric.as_str()).collect();
    let years: Vec<i32> = rows.iter().map(|r| r.year).collect();
    let organizations: Vec<&str> = rows.iter().map(|r| r.organization.as_str()).collect();
    let values: Vec<f64> = rows.iter().map(|r| r.value).collect();

    let df = df!(
        "value_type" => value_types,
        "metric" => metrics,
        "year" => years,
        "organization" => organizations,
        "value" => values
    )?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricSeries;

    fn row(metric: &str, year: i32, value: f64) -> PredictionRow {
        PredictionRow {
            metric: metric.to_string(),
            organization: "QAB".to_string(),
            year,
            value,
        }
    }

    fn observed() -> MetricHistory {
        MetricHistory::new(vec![
            MetricSeries::new("QAB", "Occupancy", Domain::Performance, 2020, 80.0),
            MetricSeries::new("QAB", "Occupancy", Domain::Performance, 2021, 81.0),
            MetricSeries::new("QAB", "Waits", Domain::Performance, 2021, 5.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2021, 100.0),
        ])
    }

    #[test]
    fn test_value_type_labels() {
        assert_eq!(ValueType::observed().to_string(), "observed");
        assert_eq!(
            ValueType::fitted(ScenarioName::LastKnown).to_string(),
            "fitted_last_known"
        );
        assert_eq!(
            ValueType::predicted(ScenarioName::PercentChange).to_string(),
            "predicted_percent_change"
        );
    }

    #[test]
    fn test_predictions_for_observed_years_are_dropped() {
        let mut scenarios = BTreeMap::new();
        scenarios.insert(
            ScenarioName::Linear,
            vec![row("Occupancy", 2021, 99.0), row("Occupancy", 2022, 83.0)],
        );
        let out = reconcile(&observed(), &[row("Occupancy", 2021, 80.5)], &scenarios);

        let predicted: Vec<i32> = out
            .iter()
            .filter(|r| r.value_type.quantity == Quantity::Predicted)
            .map(|r| r.year)
            .collect();
        assert_eq!(predicted, vec![2022]);
        // Unmodelled metrics and input domains are not reported.
        assert!(out.iter().all(|r| r.metric == "Occupancy"));
    }

    #[test]
    fn test_backfit_is_repeated_per_scenario() {
        let mut scenarios = BTreeMap::new();
        scenarios.insert(ScenarioName::LastKnown, vec![]);
        scenarios.insert(ScenarioName::Custom, vec![]);
        let out = reconcile(&observed(), &[row("Occupancy", 2021, 80.5)], &scenarios);
        let fitted: Vec<String> = out
            .iter()
            .filter(|r| r.value_type.quantity == Quantity::Fitted)
            .map(|r| r.value_type.to_string())
            .collect();
        assert_eq!(fitted, vec!["fitted_last_known", "fitted_custom"]);
    }

    #[test]
    fn test_to_dataframe_columns() {
        let mut scenarios = BTreeMap::new();
        scenarios.insert(ScenarioName::Linear, vec![row("Occupancy", 2022, 83.0)]);
        let out = reconcile(&observed(), &[], &scenarios);
        let df = to_dataframe(&out).unwrap();
        let names: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            vec!["value_type", "metric", "year", "organization", "value"]
        );
        assert_eq!(df.height(), 3);
    }
}
