//! Pre-fitted per-metric models and the artifact store they are loaded from.

use getset::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::lag::base_column;
use crate::ProjectionError;

pub mod forest;
pub mod penalized;

use self::forest::{ForestParams, RandomForest};
use self::penalized::{PenalizedLinear, PenalizedParams, PathPoint};

/// A fitted regression function over an ordered predictor vector.
pub trait Regressor: fmt::Debug + Send + Sync {
    fn predict_row(&self, features: &[f64]) -> f64;
}

/// The estimation engine that produced a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    PenalizedLinear,
    RandomForest,
}

impl EngineKind {
    fn parse(engine: &str) -> Option<EngineKind> {
        match engine.trim().to_ascii_lowercase().as_str() {
            "penalized_linear" | "glmnet" | "elastic_net" => Some(EngineKind::PenalizedLinear),
            "random_forest" | "ranger" | "randomforest" => Some(EngineKind::RandomForest),
            _ => None,
        }
    }
}

/// Whether a model predicts absolute levels or year-over-year differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Level,
    Difference,
}

impl ModelKind {
    /// Derives the kind of an untagged artifact from its training predictors.
    ///
    /// Only a model trained on deltas sees negative predictor values.
    pub fn derive_from_training(sample: &[Vec<f64>]) -> ModelKind {
        if sample.iter().flatten().any(|v| *v < 0.0) {
            ModelKind::Difference
        } else {
            ModelKind::Level
        }
    }
}

/// One row of a permutation-importance table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationImportance {
    pub variable: String,
    pub importance: f64,
    pub stdev: f64,
}

/// A read-only model bound to one target metric.
#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct FittedModel {
    target: String,
    engine: EngineKind,
    kind: ModelKind,
    /// Frame columns fed to the regressor, in order.
    predictors: Vec<String>,
    importance: Vec<PermutationImportance>,
    #[getset(skip)]
    regressor: Box<dyn Regressor>,
}

impl FittedModel {
    pub fn new(
        target: &str,
        engine: EngineKind,
        kind: ModelKind,
        predictors: Vec<String>,
        regressor: Box<dyn Regressor>,
    ) -> Self {
        Self {
            target: target.to_string(),
            engine,
            kind,
            predictors,
            importance: Vec::new(),
            regressor,
        }
    }

    /// A penalized-linear model with a single fitted coefficient vector.
    pub fn linear(
        target: &str,
        kind: ModelKind,
        predictors: &[&str],
        intercept: f64,
        coefficients: &[f64],
    ) -> Result<Self, ProjectionError> {
        let params = PenalizedParams {
            lambda: 0.0,
            path: vec![PathPoint {
                lambda: 0.0,
                intercept,
                coefficients: coefficients.to_vec(),
            }],
        };
        let regressor = PenalizedLinear::from_params(&params, predictors.len()).map_err(|reason| {
            ProjectionError::InvalidModel {
                metric: target.to_string(),
                reason,
            }
        })?;
        Ok(Self::new(
            target,
            EngineKind::PenalizedLinear,
            kind,
            predictors.iter().map(|s| s.to_string()).collect(),
            Box::new(regressor),
        ))
    }

    pub fn with_importance(mut self, importance: Vec<PermutationImportance>) -> Self {
        self.importance = importance;
        self
    }

    /// Raw regressor output for an ordered feature vector.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        self.regressor.predict_row(features)
    }

    /// Predictors ordered by decreasing permutation importance.
    pub fn ranked_predictors(&self) -> Vec<&PermutationImportance> {
        let mut ranked: Vec<&PermutationImportance> = self.importance.iter().collect();
        ranked.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| a.variable.cmp(&b.variable))
        });
        ranked
    }
}

/// Serialized model as written by the training pipeline.
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    target: String,
    engine: String,
    #[serde(default)]
    kind: Option<ModelKind>,
    predictors: Vec<String>,
    #[serde(default)]
    training_sample: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    importance: Vec<PermutationImportance>,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    models: Vec<ModelArtifact>,
}

impl ModelArtifact {
    fn into_model(self) -> Result<FittedModel, ProjectionError> {
        let engine =
            EngineKind::parse(&self.engine).ok_or_else(|| ProjectionError::UnknownEngine {
                metric: self.target.clone(),
                engine: self.engine.clone(),
            })?;
        let invalid = |reason: String| ProjectionError::InvalidModel {
            metric: self.target.clone(),
            reason,
        };

        let kind = match (self.kind, &self.training_sample) {
            (Some(kind), _) => kind,
            (None, Some(sample)) => {
                let kind = ModelKind::derive_from_training(sample);
                debug!(metric = %self.target, ?kind, "derived model kind from training sample");
                kind
            }
            (None, None) => {
                warn!(metric = %self.target, "model artifact has no kind tag or training sample, assuming level");
                ModelKind::Level
            }
        };

        let n = self.predictors.len();
        let regressor: Box<dyn Regressor> = match engine {
            EngineKind::PenalizedLinear => {
                let params: PenalizedParams = serde_json::from_value(self.params.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                Box::new(PenalizedLinear::from_params(&params, n).map_err(&invalid)?)
            }
            EngineKind::RandomForest => {
                let params: ForestParams = serde_json::from_value(self.params.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                Box::new(RandomForest::from_params(params, n).map_err(&invalid)?)
            }
        };

        Ok(FittedModel {
            target: self.target,
            engine,
            kind,
            predictors: self.predictors,
            importance: self.importance,
            regressor,
        })
    }
}

/// Mapping from target metric to its fitted model. Loaded once per session.
#[derive(Debug, Default)]
pub struct ModelStore {
    models: BTreeMap<String, FittedModel>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `{"models": [...]}` artifact file.
    ///
    /// Any unknown engine or malformed model fails the whole load.
    pub fn from_json(json: &str) -> Result<Self, ProjectionError> {
        let file: ArtifactFile = serde_json::from_str(json)?;
        let mut store = ModelStore::new();
        for artifact in file.models {
            store.insert(artifact.into_model()?);
        }
        Ok(store)
    }

    pub fn insert(&mut self, model: FittedModel) -> &mut Self {
        self.models.insert(model.target.clone(), model);
        self
    }

    pub fn get(&self, metric: &str) -> Option<&FittedModel> {
        self.models.get(metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FittedModel> {
        self.models.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The `n` input metrics with the highest permutation importance across all models.
    ///
    /// Lagged predictors count towards the metric they lag. Modelled targets are excluded.
    pub fn relevant_inputs(&self, n: usize) -> Vec<String> {
        let mut best: BTreeMap<String, f64> = BTreeMap::new();
        for model in self.models.values() {
            for row in &model.importance {
                let metric = base_column(&row.variable);
                if self.models.contains_key(metric) {
                    continue;
                }
                let entry = best.entry(metric.to_string()).or_insert(f64::NEG_INFINITY);
                *entry = entry.max(row.importance);
            }
        }
        let mut ranked: Vec<(String, f64)> = best.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(n).map(|(m, _)| m).collect()
    }
}

/// Source of fitted models for a session.
pub trait ModelSource {
    fn load(&self) -> Result<ModelStore, ProjectionError>;
}

/// Reads a JSON artifact file from disk.
#[derive(Debug, Clone)]
pub struct JsonModelSource {
    path: PathBuf,
}

impl JsonModelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelSource for JsonModelSource {
    fn load(&self) -> Result<ModelStore, ProjectionError> {
        let json = std::fs::read_to_string(&self.path)?;
        ModelStore::from_json(&json)
    }
}
