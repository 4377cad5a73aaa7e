//! Applies one fitted model to the rows of a (lagged) frame.

use std::collections::BTreeMap;
use tracing::trace;

use crate::frame::{Frame, FrameRow};
use crate::model::{FittedModel, ModelKind};
use crate::types::PredictionRow;

/// Predicts the model's target for every row of `frame` where its inputs are available.
///
/// Level models are evaluated on each row's predictors directly. Difference models are
/// evaluated on the change of each predictor from the organization's preceding row (the
/// first row is differenced against zero), and the output is added to the preceding row's
/// value of the target. Rows with a missing predictor, or a difference row without a
/// previous target level, produce no prediction.
pub fn predict(model: &FittedModel, frame: &Frame) -> Vec<PredictionRow> {
    let mut partitions: BTreeMap<&str, Vec<&FrameRow>> = BTreeMap::new();
    for row in frame.rows() {
        partitions
            .entry(row.key.organization.as_str())
            .or_default()
            .push(row);
    }

    let mut out = Vec::new();
    for rows in partitions.values() {
        for (i, row) in rows.iter().enumerate() {
            let previous = i.checked_sub(1).map(|j| rows[j]);
            let value = match model.kind() {
                ModelKind::Level => level_features(model, row).map(|f| model.evaluate(&f)),
                ModelKind::Difference => difference_features(model, row, previous)
                    .zip(previous.and_then(|p| p.get(model.target())))
                    .map(|(f, base)| base + model.evaluate(&f)),
            };
            match value {
                Some(value) => out.push(PredictionRow {
                    metric: model.target().clone(),
                    organization: row.key.organization.clone(),
                    year: row.key.year,
                    value,
                }),
                None => trace!(
                    metric = %model.target(),
                    organization = %row.key.organization,
                    year = row.key.year,
                    "inputs incomplete, no prediction"
                ),
            }
        }
    }
    out
}

fn level_features(model: &FittedModel, row: &FrameRow) -> Option<Vec<f64>> {
    model.predictors().iter().map(|p| row.get(p)).collect()
}

fn difference_features(
    model: &FittedModel,
    row: &FrameRow,
    previous: Option<&FrameRow>,
) -> Option<Vec<f64>> {
    model
        .predictors()
        .iter()
        .map(|p| {
            let current = row.get(p)?;
            let prior = match previous {
                Some(prev) => prev.get(p)?,
                None => 0.0,
            };
            Some(current - prior)
        })
        .collect()
}
