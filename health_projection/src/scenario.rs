//! Template scenarios: candidate future trajectories for demand and capacity inputs.

use comfy_table::{Cell, Table};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::bounds::{enforce, HistoricRanges};
use crate::math::ols::linear_trend;
use crate::types::{Domain, MetricHistory, MetricSeries, ScenarioName, YearValues};
use crate::ProjectionError;

/// How future input values are extrapolated from history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// Hold every metric flat at its last observed value.
    LastKnownYear,
    /// Compound the last observed value by `percent` per year (may be negative).
    PercentChange { percent: f64 },
    /// Extend an OLS trend fitted to each metric's most recent `years` observations.
    Linear { years: usize },
}

impl Strategy {
    /// Builds a strategy from its name and the optional parameters supplied by a caller.
    pub fn from_parts(
        name: &str,
        percent: Option<f64>,
        linear_years: Option<usize>,
    ) -> Result<Strategy, ProjectionError> {
        let strategy = match name.trim() {
            "last_known" | "last_known_year" => Strategy::LastKnownYear,
            "percent_change" => Strategy::PercentChange {
                percent: percent.ok_or_else(|| {
                    ProjectionError::InvalidParameter(
                        "The percent_change strategy requires a percent".to_string(),
                    )
                })?,
            },
            "linear" => Strategy::Linear {
                years: linear_years.ok_or_else(|| {
                    ProjectionError::InvalidParameter(
                        "The linear strategy requires the number of trend years".to_string(),
                    )
                })?,
            },
            other => {
                return Err(ProjectionError::InvalidParameter(format!(
                    "Unknown scenario strategy '{}'",
                    other
                )))
            }
        };
        strategy.validate()?;
        Ok(strategy)
    }

    /// The session scenario this strategy produces.
    pub fn scenario_name(&self) -> ScenarioName {
        match self {
            Strategy::LastKnownYear => ScenarioName::LastKnown,
            Strategy::PercentChange { .. } => ScenarioName::PercentChange,
            Strategy::Linear { .. } => ScenarioName::Linear,
        }
    }

    fn validate(&self) -> Result<(), ProjectionError> {
        match self {
            Strategy::PercentChange { percent } if !percent.is_finite() => Err(
                ProjectionError::InvalidParameter(format!("Percent must be finite, got {}", percent)),
            ),
            Strategy::Linear { years } if *years < 2 => {
                Err(ProjectionError::InvalidParameter(format!(
                    "A linear trend needs at least 2 years of history, got {}",
                    years
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Wide scenario table: one row per `(domain, metric)`, one value per year.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct ScenarioTable {
    #[getset(get = "pub")]
    organization: String,
    /// First year from which the strategy generated values, when the table was generated.
    #[getset(get = "pub")]
    anchor_year: Option<i32>,
    #[getset(get = "pub")]
    rows: BTreeMap<(Domain, String), YearValues>,
    overrides: BTreeSet<(String, i32)>,
}

impl ScenarioTable {
    pub fn new(organization: &str) -> Self {
        Self {
            organization: organization.to_string(),
            anchor_year: None,
            rows: BTreeMap::new(),
            overrides: BTreeSet::new(),
        }
    }

    /// Builds a table from long-form records, e.g. an imported custom scenario.
    pub fn from_long(organization: &str, records: &[MetricSeries]) -> Self {
        let mut table = ScenarioTable::new(organization);
        for r in records.iter().filter(|r| r.organization == organization) {
            table
                .rows
                .entry((r.domain, r.metric.clone()))
                .or_default()
                .insert(r.year, r.value);
        }
        table
    }

    pub fn insert_row(&mut self, domain: Domain, metric: &str, values: YearValues) -> &mut Self {
        self.rows.insert((domain, metric.to_string()), values);
        self
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = (&(Domain, String), &mut YearValues)> {
        self.rows.iter_mut()
    }

    pub fn is_overridden(&self, metric: &str, year: i32) -> bool {
        self.overrides.contains(&(metric.to_string(), year))
    }

    pub fn value(&self, metric: &str, year: i32) -> Option<f64> {
        self.rows
            .iter()
            .find(|((_, m), _)| m == metric)
            .and_then(|(_, values)| values.get(&year).copied())
    }

    /// Every year column present in any row, ascending.
    pub fn years(&self) -> BTreeSet<i32> {
        self.rows.values().flat_map(|v| v.keys().copied()).collect()
    }

    /// Sets one cell as a user edit. Edited cells are exempt from the historic-range clamp.
    pub fn set_cell(&mut self, metric: &str, year: i32, value: f64) -> Result<(), ProjectionError> {
        let values = self
            .rows
            .iter_mut()
            .find(|((_, m), _)| m == metric)
            .map(|(_, values)| values)
            .ok_or_else(|| {
                ProjectionError::InvalidParameter(format!(
                    "Metric '{}' is not part of the scenario",
                    metric
                ))
            })?;
        values.insert(year, value);
        self.overrides.insert((metric.to_string(), year));
        Ok(())
    }

    pub fn with_organization(mut self, organization: &str) -> Self {
        self.organization = organization.to_string();
        self
    }

    /// Long-form records for every non-missing cell.
    pub fn to_long(&self) -> Vec<MetricSeries> {
        self.rows
            .iter()
            .flat_map(|((domain, metric), values)| {
                values.iter().map(move |(year, value)| {
                    MetricSeries::new(&self.organization, metric, *domain, *year, *value)
                })
            })
            .collect()
    }

    /// Exports the table as long-form JSON records.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_long())
    }

    /// Prints the table to the console, one column per year.
    pub fn summary(&self) {
        println!("Scenario for {}", self.organization);
        if let Some(anchor) = self.anchor_year {
            println!("Anchor year: {}", anchor);
        }
        let years = self.years();
        let mut table = Table::new();
        let mut header = vec!["Domain".to_string(), "Metric".to_string()];
        header.extend(years.iter().map(|y| y.to_string()));
        table.set_header(header);
        for ((domain, metric), values) in &self.rows {
            let mut row = vec![Cell::new(domain), Cell::new(metric)];
            row.extend(years.iter().map(|y| {
                Cell::new(values.get(y).map_or(String::new(), |v| format!("{:.2}", v)))
            }));
            table.add_row(row);
        }
        println!("{}", table);
    }
}

/// Longest horizon, in years, a scenario may extend beyond its anchor.
pub const MAX_HORIZON: i32 = 50;

/// Builds a scenario for `organization` over `horizon` years beyond the anchor.
///
/// Trajectories come from the organization's demand and capacity history; the historic
/// ranges used for clamping come from the whole of `history`, so other organizations widen
/// the envelope.
///
/// The end year depends on the strategy. `LastKnownYear` and `PercentChange` run to
/// `anchor + horizon`, where the anchor is the earliest last-observed year across metrics.
/// `Linear` runs to the latest last-observed year plus `horizon`, so for an organization
/// whose metrics stop in different years it covers more years than the other two.
/// `horizon` above [`MAX_HORIZON`] is an `InvalidParameter` error.
pub fn generate(
    history: &MetricHistory,
    organization: &str,
    horizon: u32,
    strategy: &Strategy,
) -> Result<ScenarioTable, ProjectionError> {
    strategy.validate()?;
    let horizon = i32::try_from(horizon)
        .ok()
        .filter(|h| *h <= MAX_HORIZON)
        .ok_or_else(|| {
            ProjectionError::InvalidParameter(format!(
                "Horizon must be at most {} years, got {}",
                MAX_HORIZON, horizon
            ))
        })?;

    let inputs: BTreeMap<(Domain, String), YearValues> = history
        .filter(organization, None)
        .by_metric()
        .into_iter()
        .filter(|((domain, _), values)| domain.is_input() && !values.is_empty())
        .collect();
    if inputs.is_empty() {
        return Err(ProjectionError::InvalidParameter(format!(
            "No demand or capacity history for organization '{}'",
            organization
        )));
    }

    let last_years: Vec<i32> = inputs
        .values()
        .filter_map(|v| v.keys().next_back().copied())
        .collect();
    let anchor = last_years.iter().copied().min().unwrap_or_default();
    let latest = last_years.iter().copied().max().unwrap_or_default();
    let end_year = |from: i32| {
        from.checked_add(horizon).ok_or_else(|| {
            ProjectionError::InvalidParameter(format!("Year {} + {} overflows", from, horizon))
        })
    };

    let mut table = ScenarioTable::new(organization);
    table.anchor_year = Some(anchor);
    for ((domain, metric), observed) in &inputs {
        let values = match strategy {
            Strategy::LastKnownYear => compound(observed, 1.0, end_year(anchor)?),
            Strategy::PercentChange { percent } => {
                compound(observed, 1.0 + percent / 100.0, end_year(anchor)?)
            }
            Strategy::Linear { years } => {
                extend_trend(metric, observed, *years, end_year(latest)?)?
            }
        };
        table.rows.insert((*domain, metric.clone()), values);
    }

    info!(
        organization,
        ?strategy,
        anchor,
        metrics = table.rows.len(),
        "generated scenario"
    );
    Ok(enforce(&table, &HistoricRanges::from_history(history)))
}

/// Walks from the first observation to `end`, filling each missing year with the prior
/// year's value times `factor`.
fn compound(observed: &YearValues, factor: f64, end: i32) -> YearValues {
    let mut out = YearValues::new();
    let Some(&start) = observed.keys().next() else {
        return out;
    };
    let mut previous: Option<f64> = None;
    for year in start..=end {
        let value = observed
            .get(&year)
            .copied()
            .or_else(|| previous.map(|p| p * factor));
        if let Some(v) = value {
            out.insert(year, v);
        }
        previous = value;
    }
    out
}

/// Keeps every observation up to `end` and fills the gaps of the trend window and the
/// extrapolated years from a fitted line.
fn extend_trend(
    metric: &str,
    observed: &YearValues,
    window: usize,
    end: i32,
) -> Result<YearValues, ProjectionError> {
    let points: Vec<(i32, f64)> = observed
        .iter()
        .rev()
        .take(window)
        .map(|(y, v)| (*y, *v))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if points.len() < 2 {
        debug!(metric, "single observation in trend window, holding flat");
        return Ok(compound(observed, 1.0, end));
    }

    let trend = linear_trend(&points)?;
    let window_start = points[0].0;

    let mut out: YearValues = observed
        .range(..=end)
        .map(|(y, v)| (*y, *v))
        .collect();
    for year in window_start..=end {
        out.entry(year).or_insert_with(|| trend.at(year));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(points: &[(i32, f64)]) -> YearValues {
        points.iter().copied().collect()
    }

    #[test]
    fn test_compound_forward_fills_gaps() {
        let out = compound(&observed(&[(2019, 5.0), (2021, 7.0)]), 1.0, 2023);
        assert_eq!(out[&2020], 5.0);
        assert_eq!(out[&2021], 7.0);
        assert_eq!(out[&2023], 7.0);
    }

    #[test]
    fn test_compound_truncates_at_end() {
        let out = compound(&observed(&[(2019, 5.0), (2020, 6.0), (2021, 7.0)]), 1.0, 2020);
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![2019, 2020]);
    }

    #[test]
    fn test_trend_window_counts_from_own_last_year() {
        // Last two observations are 2018 and 2020, so the window starts in 2018.
        let out = extend_trend("m", &observed(&[(2015, 1.0), (2018, 4.0), (2020, 6.0)]), 2, 2022)
            .unwrap();
        assert_eq!(out[&2015], 1.0);
        assert!(!out.contains_key(&2016));
        assert!((out[&2019] - 5.0).abs() < 1e-9);
        assert!((out[&2022] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_with_single_point_holds_flat() {
        let out = extend_trend("m", &observed(&[(2020, 6.0)]), 3, 2022).unwrap();
        assert_eq!(out[&2022], 6.0);
    }

    #[test]
    fn test_strategy_from_parts_requires_parameters() {
        assert!(matches!(
            Strategy::from_parts("percent_change", None, None),
            Err(ProjectionError::InvalidParameter(_))
        ));
        assert!(matches!(
            Strategy::from_parts("linear", None, Some(1)),
            Err(ProjectionError::InvalidParameter(_))
        ));
        assert!(matches!(
            Strategy::from_parts("seasonal", None, None),
            Err(ProjectionError::InvalidParameter(_))
        ));
        assert_eq!(
            Strategy::from_parts("linear", None, Some(3)).unwrap(),
            Strategy::Linear { years: 3 }
        );
    }

    #[test]
    fn test_horizon_beyond_limit_is_rejected() {
        let history = MetricHistory::new(vec![MetricSeries::new(
            "QAB",
            "Beds",
            Domain::Capacity,
            2022,
            90.0,
        )]);
        for horizon in [MAX_HORIZON as u32 + 1, i32::MAX as u32, u32::MAX] {
            assert!(matches!(
                generate(&history, "QAB", horizon, &Strategy::LastKnownYear),
                Err(ProjectionError::InvalidParameter(_))
            ));
        }
        let table = generate(&history, "QAB", MAX_HORIZON as u32, &Strategy::LastKnownYear)
            .unwrap();
        assert_eq!(table.value("Beds", 2022 + MAX_HORIZON), Some(90.0));
    }

    #[test]
    fn test_set_cell_marks_override() {
        let mut table = ScenarioTable::new("QAB");
        table.insert_row(Domain::Capacity, "Beds", observed(&[(2021, 10.0)]));
        table.set_cell("Beds", 2022, 12.0).unwrap();
        assert!(table.is_overridden("Beds", 2022));
        assert!(!table.is_overridden("Beds", 2021));
        assert!(table.set_cell("Staff", 2022, 1.0).is_err());
    }
}
