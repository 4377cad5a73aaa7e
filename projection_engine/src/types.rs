use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct GenerateRequest {
    /// Long-form history CSV: organization, metric, domain, year, value
    pub csv_data: Vec<u8>,
    pub organization: String,
    pub horizon: u32,
    pub strategy: String, // "last_known", "percent_change", "linear"
    pub percent: Option<f64>,
    pub linear_years: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScenarioCell {
    pub metric: String,
    pub domain: String,
    pub year: i32,
    pub value: f64,
    #[serde(default)]
    pub overridden: bool,
}

#[derive(Serialize, Debug)]
pub struct GenerateResponse {
    pub organization: String,
    pub scenario: String,
    pub anchor_year: Option<i32>,
    pub years: Vec<i32>,
    pub cells: Vec<ScenarioCell>,
}

#[derive(Deserialize, Debug)]
pub struct ForecastRequest {
    pub csv_data: Vec<u8>,
    /// Model artifact file contents (`{"models": [...]}`)
    pub models_json: String,
    pub organization: String,
    pub horizon: u32,
    pub strategy: String,
    pub percent: Option<f64>,
    pub linear_years: Option<usize>,
    /// Replaces the generated scenario, e.g. after edits in the front end
    pub scenario_cells: Option<Vec<ScenarioCell>>,
    pub cutover_year: Option<i32>,
    pub lag_depth: Option<usize>,
    pub relevant_inputs: Option<usize>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProjectionRow {
    pub value_type: String,
    pub metric: String,
    pub year: i32,
    pub organization: String,
    pub value: f64,
}

#[derive(Serialize, Debug)]
pub struct ForecastResponse {
    pub scenario: String,
    pub cutover_year: i32,
    pub rows: Vec<ProjectionRow>,
    pub relevant_inputs: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct EnforceRequest {
    /// History the historic ranges are taken from
    pub csv_data: Vec<u8>,
    pub organization: String,
    pub cells: Vec<ScenarioCell>,
}

#[derive(Serialize, Debug)]
pub struct EnforceResponse {
    pub cells: Vec<ScenarioCell>,
    pub adjusted: usize,
}
