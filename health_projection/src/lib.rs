//! Scenario-driven projection of health-system performance metrics.
//!
//! This library turns assumptions about future demand and capacity into projected
//! values of performance metrics using pre-fitted regression models. The pipeline is:
//!
//! 1. [`generate`] builds a candidate input trajectory ([`ScenarioTable`]) for an
//!    organization under a [`Strategy`] (carry-forward, percentage growth or linear trend),
//!    clamped by the [`enforce`] bounds rules.
//! 2. [`ScenarioForecaster`] merges the scenario with observed performance values and
//!    predicts each future year in ascending order, feeding predictions back as lagged
//!    features for later years.
//! 3. [`reconcile`] combines back-fitted, observed and projected values into one long table
//!    ready for charting.
//!
//! # Example
//!
//! ```ignore
//! use health_projection::{generate, MetricHistory, ModelStore, ScenarioForecaster, Strategy};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let history = health_projection::read_history_csv("history.csv")?;
//!     let models = ModelStore::from_json(&std::fs::read_to_string("models.json")?)?;
//!
//!     let scenario = generate(&history, "QAB", 3, &Strategy::PercentChange { percent: 2.5 })?;
//!     let predictions = ScenarioForecaster::new(&models)
//!         .cutover_year(2021)
//!         .forecast(&scenario, "QAB", &history)?;
//!
//!     for row in predictions {
//!         println!("{} {} {:.2}", row.metric, row.year, row.value);
//!     }
//!     Ok(())
//! }
//! ```

use polars::prelude::PolarsError;
use thiserror::Error;

pub mod bounds;
pub mod forecast;
pub mod frame;
pub mod lag;
mod math;
pub mod model;
pub mod predict;
pub mod reconcile;
pub mod scenario;
pub mod session;
pub mod tabular;
pub mod types;

pub use crate::bounds::{enforce, HistoricRanges};
pub use crate::forecast::{ForecastConfig, ScenarioForecaster};
pub use crate::frame::{Frame, FrameRow, PeriodKey};
pub use crate::lag::{build_lags, lag_column, DEFAULT_LAG_DEPTH};
pub use crate::model::{
    EngineKind, FittedModel, JsonModelSource, ModelKind, ModelSource, ModelStore,
    PermutationImportance,
};
pub use crate::predict::predict;
pub use crate::reconcile::{reconcile, Quantity, ReconciledRow, ValueType};
pub use crate::scenario::{generate, ScenarioTable, Strategy};
pub use crate::session::{Session, SessionContext, SessionEvent};
pub use crate::tabular::{history_from_frame, read_history_csv, HistoricSource};
pub use crate::types::{
    Domain, MetricHistory, MetricSeries, PredictionRow, ScenarioName, YearValues,
};

/// Error type for the `health_projection` library.
///
/// Every variant is fatal for the operation that raised it: no partial results are returned.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Wraps a `PolarsError` raised while converting tables at the boundary.
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    /// A model artifact or exported result could not be (de)serialized.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// A required argument is missing or out of range, e.g. a percent for `percent_change`.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// The model artifact names an engine this library cannot evaluate.
    #[error("Unrecognized engine kind '{engine}' for metric '{metric}'; the model artifact is corrupted or incompatible")]
    UnknownEngine { metric: String, engine: String },
    /// The model artifact is structurally unusable.
    #[error("Invalid model for metric '{metric}': {reason}")]
    InvalidModel { metric: String, reason: String },
    /// A table handed to a merge lacks its identity columns.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    /// Occurs when there is an issue with linear algebra operations, such as a singular matrix.
    #[error("Nalgebra error: {0}")]
    NalgebraError(String),
}
