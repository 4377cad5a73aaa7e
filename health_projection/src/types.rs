//! Core record types shared by every stage of the projection pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::ProjectionError;

/// Ordered mapping from year to value for a single metric.
pub type YearValues = BTreeMap<i32, f64>;

/// Category of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Demand,
    Capacity,
    Performance,
}

impl Domain {
    /// Demand and capacity metrics are the scenario inputs; performance metrics are modelled.
    pub fn is_input(&self) -> bool {
        matches!(self, Domain::Demand | Domain::Capacity)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Demand => "Demand",
            Domain::Capacity => "Capacity",
            Domain::Performance => "Performance",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demand" => Ok(Domain::Demand),
            "capacity" => Ok(Domain::Capacity),
            "performance" => Ok(Domain::Performance),
            other => Err(ProjectionError::InvalidParameter(format!(
                "Unknown domain '{}'",
                other
            ))),
        }
    }
}

/// One observed value of a metric for an organization in a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub organization: String,
    pub metric: String,
    pub domain: Domain,
    pub year: i32,
    pub value: f64,
}

impl MetricSeries {
    pub fn new(organization: &str, metric: &str, domain: Domain, year: i32, value: f64) -> Self {
        Self {
            organization: organization.to_string(),
            metric: metric.to_string(),
            domain,
            year,
            value,
        }
    }
}

/// Long-form historic store for a session.
///
/// Duplicate `(organization, metric, year)` records are collapsed on construction,
/// keeping the last one seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricHistory {
    records: Vec<MetricSeries>,
}

impl MetricHistory {
    pub fn new(records: Vec<MetricSeries>) -> Self {
        let mut unique: BTreeMap<(String, String, i32), MetricSeries> = BTreeMap::new();
        for record in records {
            unique.insert(
                (record.organization.clone(), record.metric.clone(), record.year),
                record,
            );
        }
        Self {
            records: unique.into_values().collect(),
        }
    }

    pub fn records(&self) -> &[MetricSeries] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Restricts the history to one organization and, optionally, one domain.
    pub fn filter(&self, organization: &str, domain: Option<Domain>) -> MetricHistory {
        MetricHistory {
            records: self
                .records
                .iter()
                .filter(|r| r.organization == organization)
                .filter(|r| domain.map_or(true, |d| r.domain == d))
                .cloned()
                .collect(),
        }
    }

    pub fn organizations(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.organization.clone()).collect()
    }

    /// Groups values by `(domain, metric)` into year-ordered series.
    pub fn by_metric(&self) -> BTreeMap<(Domain, String), YearValues> {
        let mut grouped: BTreeMap<(Domain, String), YearValues> = BTreeMap::new();
        for r in &self.records {
            grouped
                .entry((r.domain, r.metric.clone()))
                .or_default()
                .insert(r.year, r.value);
        }
        grouped
    }

    /// Years in which at least one value is present.
    pub fn years(&self) -> BTreeSet<i32> {
        self.records.iter().map(|r| r.year).collect()
    }

    pub fn domain_of(&self, metric: &str) -> Option<Domain> {
        self.records
            .iter()
            .find(|r| r.metric == metric)
            .map(|r| r.domain)
    }
}

/// A single model output for a metric, organization and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub metric: String,
    pub organization: String,
    pub year: i32,
    pub value: f64,
}

/// The named scenario variants held in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioName {
    LastKnown,
    PercentChange,
    Linear,
    Custom,
}

impl ScenarioName {
    pub const ALL: [ScenarioName; 4] = [
        ScenarioName::LastKnown,
        ScenarioName::PercentChange,
        ScenarioName::Linear,
        ScenarioName::Custom,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ScenarioName::LastKnown => "last_known",
            ScenarioName::PercentChange => "percent_change",
            ScenarioName::Linear => "linear",
            ScenarioName::Custom => "custom",
        }
    }
}

impl fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ScenarioName {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioName::ALL
            .into_iter()
            .find(|n| n.label() == s.trim())
            .ok_or_else(|| ProjectionError::InvalidParameter(format!("Unknown scenario '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_collapses_duplicate_years() {
        let history = MetricHistory::new(vec![
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2021, 10.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2021, 12.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2022, 14.0),
        ]);
        assert_eq!(history.records().len(), 2);
        let series = &history.by_metric()[&(Domain::Capacity, "Beds".to_string())];
        assert_eq!(series[&2021], 12.0);
    }

    #[test]
    fn test_domain_parsing_is_case_insensitive() {
        assert_eq!("performance".parse::<Domain>().unwrap(), Domain::Performance);
        assert_eq!(" Demand ".parse::<Domain>().unwrap(), Domain::Demand);
        assert!("supply".parse::<Domain>().is_err());
    }

    #[test]
    fn test_scenario_name_labels_round_trip() {
        for name in ScenarioName::ALL {
            assert_eq!(name.label().parse::<ScenarioName>().unwrap(), name);
        }
    }
}
