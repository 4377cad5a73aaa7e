use crate::types::*;
use health_projection::{
    enforce, generate, history_from_frame, reconcile, Domain, ForecastConfig, HistoricRanges,
    MetricHistory, MetricSeries, ModelStore, ScenarioForecaster, ScenarioTable, Strategy,
};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::debug;

fn load_history(csv_data: &[u8]) -> Result<MetricHistory, String> {
    let cursor = Cursor::new(csv_data);
    let df = CsvReader::new(cursor).finish().map_err(|e| e.to_string())?;
    let history = history_from_frame(&df).map_err(|e| e.to_string())?;
    if history.is_empty() {
        return Err("The history contains no usable rows.".to_string());
    }
    Ok(history)
}

fn cells_of(table: &ScenarioTable) -> Vec<ScenarioCell> {
    table
        .rows()
        .iter()
        .flat_map(|((domain, metric), values)| {
            values.iter().map(move |(year, value)| ScenarioCell {
                metric: metric.clone(),
                domain: domain.to_string(),
                year: *year,
                value: *value,
                overridden: table.is_overridden(metric, *year),
            })
        })
        .collect()
}

/// Rebuilds a table from cells, re-applying the edits flagged as overridden.
fn table_from_cells(organization: &str, cells: &[ScenarioCell]) -> Result<ScenarioTable, String> {
    let records = cells
        .iter()
        .map(|c| {
            let domain: Domain = c.domain.parse().map_err(|e| format!("{}", e))?;
            Ok(MetricSeries::new(organization, &c.metric, domain, c.year, c.value))
        })
        .collect::<Result<Vec<_>, String>>()?;
    let mut table = ScenarioTable::from_long(organization, &records);
    for cell in cells.iter().filter(|c| c.overridden) {
        table
            .set_cell(&cell.metric, cell.year, cell.value)
            .map_err(|e| e.to_string())?;
    }
    Ok(table)
}

pub fn generate_inner(req: GenerateRequest) -> Result<GenerateResponse, String> {
    let history = load_history(&req.csv_data)?;
    let strategy = Strategy::from_parts(&req.strategy, req.percent, req.linear_years)
        .map_err(|e| e.to_string())?;
    let table = generate(&history, &req.organization, req.horizon, &strategy)
        .map_err(|e| e.to_string())?;

    Ok(GenerateResponse {
        organization: req.organization,
        scenario: strategy.scenario_name().to_string(),
        anchor_year: *table.anchor_year(),
        years: table.years().into_iter().collect(),
        cells: cells_of(&table),
    })
}

pub fn forecast_inner(req: ForecastRequest) -> Result<ForecastResponse, String> {
    let history = load_history(&req.csv_data)?;
    let models = ModelStore::from_json(&req.models_json).map_err(|e| e.to_string())?;
    if models.is_empty() {
        return Err("No models were supplied.".to_string());
    }
    let strategy = Strategy::from_parts(&req.strategy, req.percent, req.linear_years)
        .map_err(|e| e.to_string())?;
    let organization = req.organization.as_str();

    let table = match &req.scenario_cells {
        Some(cells) => {
            let table = table_from_cells(organization, cells)?;
            enforce(&table, &HistoricRanges::from_history(&history))
        }
        None => generate(&history, organization, req.horizon, &strategy)
            .map_err(|e| e.to_string())?,
    };

    let defaults = ForecastConfig::default();
    let config = ForecastConfig {
        cutover_year: req.cutover_year.unwrap_or(defaults.cutover_year),
        lag_depth: req.lag_depth.unwrap_or(defaults.lag_depth),
        ..defaults
    };
    let forecaster = ScenarioForecaster::with_config(&models, config);
    let predictions = forecaster
        .forecast(&table, organization, &history)
        .map_err(|e| e.to_string())?;
    let backfit = forecaster
        .backfit(organization, &history)
        .map_err(|e| e.to_string())?;
    debug!(
        predictions = predictions.len(),
        backfit = backfit.len(),
        "forecast request resolved"
    );

    let name = strategy.scenario_name();
    let mut scenarios = BTreeMap::new();
    scenarios.insert(name, predictions);
    let observed = history.filter(organization, Some(Domain::Performance));
    let rows = reconcile(&observed, &backfit, &scenarios)
        .into_iter()
        .map(|r| ProjectionRow {
            value_type: r.value_type.to_string(),
            metric: r.metric,
            year: r.year,
            organization: r.organization,
            value: r.value,
        })
        .collect();

    Ok(ForecastResponse {
        scenario: name.to_string(),
        cutover_year: config.cutover_year,
        rows,
        relevant_inputs: models.relevant_inputs(req.relevant_inputs.unwrap_or(10)),
    })
}

pub fn enforce_inner(req: EnforceRequest) -> Result<EnforceResponse, String> {
    let history = load_history(&req.csv_data)?;
    let table = table_from_cells(&req.organization, &req.cells)?;
    let bounded = enforce(&table, &HistoricRanges::from_history(&history));

    let cells = cells_of(&bounded);
    let before = cells_of(&table);
    let adjusted = cells
        .iter()
        .zip(before.iter())
        .filter(|(a, b)| a.value != b.value)
        .count();
    Ok(EnforceResponse { cells, adjusted })
}
