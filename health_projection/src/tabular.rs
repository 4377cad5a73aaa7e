//! Conversions between polars tables and the core's typed records.
//!
//! Year columns of wide scenario tables are named by their year (`"2021"`, `"2022"`, ...);
//! those names are parsed to integers here and never travel further into the core.

use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::scenario::ScenarioTable;
use crate::types::{Domain, MetricHistory, MetricSeries, PredictionRow, YearValues};
use crate::ProjectionError;

const HISTORY_COLUMNS: [&str; 5] = ["organization", "metric", "domain", "year", "value"];
const PREDICTION_COLUMNS: [&str; 4] = ["metric", "organization", "year", "value"];
const SCENARIO_COLUMNS: [&str; 2] = ["metric", "domain"];

/// A provider of historic metric values.
pub trait HistoricSource {
    fn fetch(
        &self,
        organization: &str,
        domain: Option<Domain>,
    ) -> Result<MetricHistory, ProjectionError>;
}

impl HistoricSource for MetricHistory {
    fn fetch(
        &self,
        organization: &str,
        domain: Option<Domain>,
    ) -> Result<MetricHistory, ProjectionError> {
        Ok(self.filter(organization, domain))
    }
}

fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), ProjectionError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|c| df.column(c).is_err())
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProjectionError::MissingColumns(missing))
    }
}

fn strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, ProjectionError> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn years(df: &DataFrame, name: &str) -> Result<Vec<Option<i32>>, ProjectionError> {
    let column = df.column(name)?.cast(&DataType::Int32)?;
    Ok(column.i32()?.into_iter().collect())
}

fn floats(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, ProjectionError> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Reads a long-form history table (`organization, metric, domain, year, value`).
///
/// Rows with a null in any of the five columns are skipped.
pub fn history_from_frame(df: &DataFrame) -> Result<MetricHistory, ProjectionError> {
    require_columns(df, &HISTORY_COLUMNS)?;
    let organizations = strings(df, "organization")?;
    let metrics = strings(df, "metric")?;
    let domains = strings(df, "domain")?;
    let year_values = years(df, "year")?;
    let values = floats(df, "value")?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(org), Some(metric), Some(domain), Some(year), Some(value)) = (
            &organizations[i],
            &metrics[i],
            &domains[i],
            year_values[i],
            values[i],
        ) else {
            continue;
        };
        records.push(MetricSeries::new(org, metric, domain.parse()?, year, value));
    }
    debug!(rows = records.len(), skipped = df.height() - records.len(), "history loaded");
    Ok(MetricHistory::new(records))
}

pub fn read_history_csv(path: impl AsRef<Path>) -> Result<MetricHistory, ProjectionError> {
    let df = LazyCsvReader::new(path.as_ref())
        .with_has_header(true)
        .finish()?
        .collect()?;
    history_from_frame(&df)
}

/// Wide form: `metric`, `domain`, then one `Float64` column per year.
pub fn scenario_to_frame(table: &ScenarioTable) -> Result<DataFrame, ProjectionError> {
    let years = table.years();
    let mut columns: Vec<Column> = vec![
        Column::new(
            "metric".into(),
            table.rows().keys().map(|(_, m)| m.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "domain".into(),
            table
                .rows()
                .keys()
                .map(|(d, _)| d.as_str())
                .collect::<Vec<_>>(),
        ),
    ];
    for year in &years {
        let values: Vec<Option<f64>> = table
            .rows()
            .values()
            .map(|v| v.get(year).copied())
            .collect();
        columns.push(Column::new(year.to_string().into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Parses a wide scenario table, e.g. an uploaded custom scenario.
///
/// Columns other than `metric` and `domain` whose name is not a year are ignored.
pub fn scenario_from_frame(
    organization: &str,
    df: &DataFrame,
) -> Result<ScenarioTable, ProjectionError> {
    require_columns(df, &SCENARIO_COLUMNS)?;
    let metrics = strings(df, "metric")?;
    let domains = strings(df, "domain")?;

    let mut year_columns: BTreeMap<i32, Vec<Option<f64>>> = BTreeMap::new();
    for name in df.get_column_names() {
        if let Ok(year) = name.as_str().trim().parse::<i32>() {
            year_columns.insert(year, floats(df, name.as_str())?);
        }
    }

    let mut table = ScenarioTable::new(organization);
    for i in 0..df.height() {
        let (Some(metric), Some(domain)) = (&metrics[i], &domains[i]) else {
            continue;
        };
        let values: YearValues = year_columns
            .iter()
            .filter_map(|(year, column)| column[i].map(|v| (*year, v)))
            .collect();
        table.insert_row(domain.parse()?, metric, values);
    }
    Ok(table)
}

/// Reads prediction rows (`metric, organization, year, value`), skipping rows with nulls.
pub fn predictions_from_frame(df: &DataFrame) -> Result<Vec<PredictionRow>, ProjectionError> {
    require_columns(df, &PREDICTION_COLUMNS)?;
    let metrics = strings(df, "metric")?;
    let organizations = strings(df, "organization")?;
    let year_values = years(df, "year")?;
    let values = floats(df, "value")?;

    Ok((0..df.height())
        .filter_map(|i| {
            Some(PredictionRow {
                metric: metrics[i].clone()?,
                organization: organizations[i].clone()?,
                year: year_values[i]?,
                value: values[i]?,
            })
        })
        .collect())
}

pub fn predictions_to_frame(rows: &[PredictionRow]) -> Result<DataFrame, ProjectionError> {
    let df = df!(
        "metric" => rows.iter().map(|r| r.metric.as_str()).collect::<Vec<_>>(),
        "organization" => rows.iter().map(|r| r.organization.as_str()).collect::<Vec<_>>(),
        "year" => rows.iter().map(|r| r.year).collect::<Vec<_>>(),
        "value" => rows.iter().map(|r| r.value).collect::<Vec<_>>()
    )?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_df() -> DataFrame {
        df!(
            "organization" => &["QAB", "QAB", "QAB", "QHM"],
            "metric" => &["Beds", "Beds", "Occupancy", "Beds"],
            "domain" => &["capacity", "Capacity", "performance", "CAPACITY"],
            "year" => &[2020i64, 2021, 2021, 2021],
            "value" => &[Some(100.0), Some(110.0), None, Some(50.0)]
        )
        .unwrap()
    }

    #[test]
    fn test_history_from_frame_skips_nulls() {
        let history = history_from_frame(&history_df()).unwrap();
        assert_eq!(history.records().len(), 3);
        assert_eq!(history.domain_of("Beds"), Some(Domain::Capacity));
        let qab = history.fetch("QAB", Some(Domain::Capacity)).unwrap();
        assert_eq!(qab.years().into_iter().collect::<Vec<_>>(), vec![2020, 2021]);
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let df = df!("organization" => &["QAB"], "metric" => &["Beds"]).unwrap();
        match history_from_frame(&df) {
            Err(ProjectionError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["domain", "year", "value"]);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
        assert!(matches!(
            predictions_from_frame(&df),
            Err(ProjectionError::MissingColumns(_))
        ));
    }

    #[test]
    fn test_unknown_domain_is_rejected() {
        let df = df!(
            "organization" => &["QAB"],
            "metric" => &["Beds"],
            "domain" => &["supply"],
            "year" => &[2020i64],
            "value" => &[1.0]
        )
        .unwrap();
        assert!(matches!(
            history_from_frame(&df),
            Err(ProjectionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_prediction_frame_columns() {
        let rows = vec![PredictionRow {
            metric: "Occupancy".to_string(),
            organization: "QAB".to_string(),
            year: 2023,
            value: 88.5,
        }];
        let df = predictions_to_frame(&rows).unwrap();
        let names: Vec<&str> = df.get_column_names().iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["metric", "organization", "year", "value"]);
        assert_eq!(predictions_from_frame(&df).unwrap(), rows);
    }

    #[test]
    fn test_wide_scenario_frame() {
        let df = df!(
            "metric" => &["Beds", "Attendances"],
            "domain" => &["Capacity", "Demand"],
            "2022" => &[Some(100.0), Some(900.0)],
            "2023" => &[Some(105.0), None],
            "notes" => &["a", "b"]
        )
        .unwrap();
        let table = scenario_from_frame("QAB", &df).unwrap();
        assert_eq!(table.value("Beds", 2023), Some(105.0));
        assert_eq!(table.value("Attendances", 2023), None);

        let back = scenario_to_frame(&table).unwrap();
        assert_eq!(back.width(), 4);
        // Rows are ordered by (domain, metric): Demand before Capacity.
        let metrics = back.column("metric").unwrap().str().unwrap().get(0);
        assert_eq!(metrics, Some("Attendances"));
    }
}
