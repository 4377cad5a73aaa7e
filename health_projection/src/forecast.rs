//! Iterative, lag-aware forecasting of performance metrics for a scenario.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::frame::Frame;
use crate::lag::{build_lags, DEFAULT_LAG_DEPTH};
use crate::model::ModelStore;
use crate::predict::predict;
use crate::scenario::ScenarioTable;
use crate::types::{Domain, MetricHistory, MetricSeries, PredictionRow};
use crate::ProjectionError;

/// Tunables of a forecast run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// First year whose performance values are derived from models rather than trusted.
    pub cutover_year: i32,
    /// Number of lagged copies of every column exposed to the models.
    pub lag_depth: usize,
    /// Empty years appended past the year being predicted.
    pub extension_years: i32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            cutover_year: 2021,
            lag_depth: DEFAULT_LAG_DEPTH,
            extension_years: 3,
        }
    }
}

/// Drives the prediction engine year by year over a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioForecaster<'a> {
    models: &'a ModelStore,
    config: ForecastConfig,
}

impl<'a> ScenarioForecaster<'a> {
    pub fn new(models: &'a ModelStore) -> Self {
        Self::with_config(models, ForecastConfig::default())
    }

    pub fn with_config(models: &'a ModelStore, config: ForecastConfig) -> Self {
        Self { models, config }
    }

    pub fn cutover_year(&mut self, year: i32) -> &mut Self {
        self.config.cutover_year = year;
        self
    }

    pub fn lag_depth(&mut self, depth: usize) -> &mut Self {
        self.config.lag_depth = depth;
        self
    }

    pub fn extension_years(&mut self, years: i32) -> &mut Self {
        self.config.extension_years = years;
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Projects every modelled performance metric of `organization` through the scenario.
    ///
    /// Years from the cutover onwards that have no observed performance data are predicted
    /// in ascending order. Each year's predictions are merged into the working table before
    /// the next year is lagged, so later years see earlier predictions through their lag
    /// features. Observed, edited and previously predicted values are never overwritten.
    /// The result holds observed and predicted target values from the cutover year on,
    /// sorted by metric and year.
    pub fn forecast(
        &self,
        scenario: &ScenarioTable,
        organization: &str,
        history: &MetricHistory,
    ) -> Result<Vec<PredictionRow>, ProjectionError> {
        if scenario.rows().is_empty() {
            return Err(ProjectionError::InvalidParameter(format!(
                "Scenario for '{}' has no rows to forecast from",
                organization
            )));
        }
        let cutover = self.config.cutover_year;
        if let Some(anchor) = scenario.anchor_year() {
            if *anchor != cutover {
                warn!(
                    anchor,
                    cutover, "scenario anchor year differs from the forecast cutover year"
                );
            }
        }

        let observed = history.filter(organization, Some(Domain::Performance));
        let observed_years = observed.years();

        let inputs: Vec<MetricSeries> = scenario
            .to_long()
            .into_iter()
            .filter(|r| r.domain.is_input())
            .map(|r| MetricSeries {
                organization: organization.to_string(),
                ..r
            })
            .collect();
        let input_metrics: BTreeSet<&str> = inputs.iter().map(|r| r.metric.as_str()).collect();
        let targets: BTreeSet<String> = self
            .models
            .targets()
            .filter(|t| !input_metrics.contains(t))
            .map(str::to_string)
            .collect();

        let mut records = inputs.clone();
        records.extend(observed.records().iter().cloned());
        let working = Frame::from_long(&records);

        let years: Vec<i32> = scenario
            .years()
            .into_iter()
            .filter(|y| *y >= cutover && !observed_years.contains(y))
            .collect();
        info!(
            organization,
            years = years.len(),
            models = self.models.len(),
            "forecasting scenario"
        );

        let working = years
            .iter()
            .fold(working, |acc, &year| self.step(acc, organization, year));

        Ok(working.filter_years(|y| y >= cutover).to_long(&targets))
    }

    /// One iteration: predict `year` from the current snapshot and return the next snapshot.
    ///
    /// Models see every row up to `year`, so a difference model predicting the cutover year
    /// starts from the last observed level before it.
    fn step(&self, acc: Frame, organization: &str, year: i32) -> Frame {
        let lagged = build_lags(&acc, self.config.lag_depth).filter_years(|y| y <= year);

        let predictions: Vec<PredictionRow> = self
            .models
            .iter()
            .flat_map(|model| predict(model, &lagged))
            .filter(|r| r.year == year && r.organization == organization)
            .collect();
        debug!(year, predicted = predictions.len(), "forecast year resolved");

        acc.extend_to(organization, year + self.config.extension_years)
            .fill_missing(&predictions)
    }

    /// Fitted values for every year with observed ground truth, from observed inputs.
    ///
    /// Unlike [`forecast`](Self::forecast) this is a single batch pass: every predictor is
    /// observed, so no year depends on another year's prediction.
    pub fn backfit(
        &self,
        organization: &str,
        history: &MetricHistory,
    ) -> Result<Vec<PredictionRow>, ProjectionError> {
        let own = history.filter(organization, None);
        let lagged = build_lags(&Frame::from_long(own.records()), self.config.lag_depth);
        let truth: BTreeSet<(&str, i32)> = own
            .records()
            .iter()
            .filter(|r| r.domain == Domain::Performance)
            .map(|r| (r.metric.as_str(), r.year))
            .collect();

        let mut out: Vec<PredictionRow> = self
            .models
            .iter()
            .flat_map(|model| predict(model, &lagged))
            .filter(|r| truth.contains(&(r.metric.as_str(), r.year)))
            .collect();
        out.sort_by(|a, b| (&a.metric, a.year).cmp(&(&b.metric, b.year)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FittedModel, ModelKind};

    fn history() -> MetricHistory {
        MetricHistory::new(vec![
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2019, 100.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2020, 100.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2021, 110.0),
            MetricSeries::new("QAB", "Occupancy", Domain::Performance, 2019, 80.0),
            MetricSeries::new("QAB", "Occupancy", Domain::Performance, 2020, 82.0),
        ])
    }

    fn scenario() -> ScenarioTable {
        let mut table = ScenarioTable::new("QAB");
        table.insert_row(
            Domain::Capacity,
            "Beds",
            [(2019, 100.0), (2020, 100.0), (2021, 110.0), (2022, 120.0), (2023, 120.0)]
                .into_iter()
                .collect(),
        );
        table
    }

    /// occupancy(t) = occupancy(t-1) + 1, a level model on the lag feature.
    fn store() -> ModelStore {
        let mut store = ModelStore::new();
        store.insert(
            FittedModel::linear(
                "Occupancy",
                ModelKind::Level,
                &["lag_1_Occupancy"],
                1.0,
                &[1.0],
            )
            .unwrap(),
        );
        store
    }

    #[test]
    fn test_predictions_chain_through_lags() {
        let models = store();
        let out = ScenarioForecaster::new(&models)
            .cutover_year(2020)
            .forecast(&scenario(), "QAB", &history())
            .unwrap();
        let values: Vec<(i32, f64)> = out.iter().map(|r| (r.year, r.value)).collect();
        assert_eq!(
            values,
            vec![(2020, 82.0), (2021, 83.0), (2022, 84.0), (2023, 85.0)]
        );
    }

    #[test]
    fn test_observed_performance_years_are_not_predicted() {
        let models = store();
        let out = ScenarioForecaster::new(&models)
            .cutover_year(2019)
            .forecast(&scenario(), "QAB", &history())
            .unwrap();
        assert_eq!(out[0].value, 80.0);
        assert_eq!(out[1].value, 82.0);
    }

    #[test]
    fn test_difference_model_starts_from_last_observed_level() {
        // Occupancy is observed through 2020 only, so 2021 builds on the 2020 level.
        let mut models = ModelStore::new();
        models.insert(
            FittedModel::linear("Occupancy", ModelKind::Difference, &["Beds"], 0.0, &[0.1])
                .unwrap(),
        );
        let out = ScenarioForecaster::new(&models)
            .cutover_year(2021)
            .forecast(&scenario(), "QAB", &history())
            .unwrap();
        let values: Vec<(i32, f64)> = out.iter().map(|r| (r.year, r.value)).collect();
        assert_eq!(values, vec![(2021, 83.0), (2022, 84.0), (2023, 84.0)]);
    }

    #[test]
    fn test_empty_scenario_is_rejected() {
        let models = store();
        let result =
            ScenarioForecaster::new(&models).forecast(&ScenarioTable::new("QAB"), "QAB", &history());
        assert!(matches!(result, Err(ProjectionError::InvalidParameter(_))));
    }

    #[test]
    fn test_backfit_covers_observed_years_only() {
        let models = store();
        let out = ScenarioForecaster::new(&models)
            .backfit("QAB", &history())
            .unwrap();
        // 2019 has no lag, 2020 is fitted from 2019.
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].year, out[0].value), (2020, 81.0));
    }
}
