//! Explicit per-session scenario state and its transitions.

use getset::Getters;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::bounds::{enforce, HistoricRanges};
use crate::forecast::{ForecastConfig, ScenarioForecaster};
use crate::model::ModelStore;
use crate::reconcile::{reconcile, ReconciledRow};
use crate::scenario::{generate, ScenarioTable, Strategy};
use crate::types::{Domain, MetricHistory, ScenarioName};
use crate::ProjectionError;

/// Read-only collaborators shared by every transition of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub history: &'a MetricHistory,
    pub models: &'a ModelStore,
    pub config: ForecastConfig,
}

/// A user action.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SelectOrganization(String),
    SetHorizon(u32),
    SetPercent(f64),
    SetLinearYears(usize),
    Generate(ScenarioName),
    ImportCustom(ScenarioTable),
    CopyToCustom(ScenarioName),
    EditCell {
        scenario: ScenarioName,
        metric: String,
        year: i32,
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Session {
    organization: Option<String>,
    horizon: u32,
    percent: f64,
    linear_years: usize,
    scenarios: BTreeMap<ScenarioName, ScenarioTable>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            organization: None,
            horizon: 3,
            percent: 0.0,
            linear_years: 3,
            scenarios: BTreeMap::new(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scenario(&self, name: ScenarioName) -> Option<&ScenarioTable> {
        self.scenarios.get(&name)
    }

    /// The strategy a template scenario is generated with; `None` for `custom`.
    pub fn strategy(&self, name: ScenarioName) -> Option<Strategy> {
        match name {
            ScenarioName::LastKnown => Some(Strategy::LastKnownYear),
            ScenarioName::PercentChange => Some(Strategy::PercentChange {
                percent: self.percent,
            }),
            ScenarioName::Linear => Some(Strategy::Linear {
                years: self.linear_years,
            }),
            ScenarioName::Custom => None,
        }
    }

    fn selected(&self) -> Result<&str, ProjectionError> {
        self.organization
            .as_deref()
            .ok_or_else(|| ProjectionError::InvalidParameter("No organization selected".into()))
    }

    fn regenerate(
        mut self,
        name: ScenarioName,
        ctx: &SessionContext,
    ) -> Result<Session, ProjectionError> {
        let strategy = self.strategy(name).ok_or_else(|| {
            ProjectionError::InvalidParameter(
                "The custom scenario is imported or copied, not generated".into(),
            )
        })?;
        let table = generate(ctx.history, self.selected()?, self.horizon, &strategy)?;
        self.scenarios.insert(name, table);
        Ok(self)
    }

    /// Regenerates `names` that are already present.
    fn refresh(self, names: &[ScenarioName], ctx: &SessionContext) -> Result<Session, ProjectionError> {
        names.iter().try_fold(self, |session, &name| {
            if session.scenarios.contains_key(&name) {
                session.regenerate(name, ctx)
            } else {
                Ok(session)
            }
        })
    }

    /// Returns the state after `event`. `self` is left untouched, also on error.
    ///
    /// Selecting an organization discards every scenario and generates the three templates.
    /// Parameter changes regenerate only the templates they control. Imported and edited tables
    /// are passed through the bounds rules; edited cells keep their value against the historic
    /// range.
    pub fn apply(
        &self,
        event: SessionEvent,
        ctx: &SessionContext,
    ) -> Result<Session, ProjectionError> {
        debug!(?event, "applying session event");
        let mut next = self.clone();
        match event {
            SessionEvent::SelectOrganization(organization) => {
                info!(%organization, "organization selected, scenarios reset");
                next.organization = Some(organization);
                next.scenarios.clear();
                [
                    ScenarioName::LastKnown,
                    ScenarioName::PercentChange,
                    ScenarioName::Linear,
                ]
                .into_iter()
                .try_fold(next, |session, name| session.regenerate(name, ctx))
            }
            SessionEvent::SetHorizon(horizon) => {
                next.horizon = horizon;
                next.refresh(
                    &[
                        ScenarioName::LastKnown,
                        ScenarioName::PercentChange,
                        ScenarioName::Linear,
                    ],
                    ctx,
                )
            }
            SessionEvent::SetPercent(percent) => {
                next.percent = percent;
                next.refresh(&[ScenarioName::PercentChange], ctx)
            }
            SessionEvent::SetLinearYears(years) => {
                next.linear_years = years;
                next.refresh(&[ScenarioName::Linear], ctx)
            }
            SessionEvent::Generate(name) => next.regenerate(name, ctx),
            SessionEvent::ImportCustom(table) => {
                let table = table.with_organization(next.selected()?);
                let table = enforce(&table, &HistoricRanges::from_history(ctx.history));
                next.scenarios.insert(ScenarioName::Custom, table);
                Ok(next)
            }
            SessionEvent::CopyToCustom(name) => {
                let table = next.scenarios.get(&name).cloned().ok_or_else(|| {
                    ProjectionError::InvalidParameter(format!("Scenario '{}' does not exist", name))
                })?;
                next.scenarios.insert(ScenarioName::Custom, table);
                Ok(next)
            }
            SessionEvent::EditCell {
                scenario,
                metric,
                year,
                value,
            } => {
                let table = next.scenarios.get_mut(&scenario).ok_or_else(|| {
                    ProjectionError::InvalidParameter(format!(
                        "Scenario '{}' does not exist",
                        scenario
                    ))
                })?;
                table.set_cell(&metric, year, value)?;
                *table = enforce(table, &HistoricRanges::from_history(ctx.history));
                Ok(next)
            }
        }
    }

    /// Forecasts every scenario held and reconciles them with observed and back-fitted values.
    pub fn project(&self, ctx: &SessionContext) -> Result<Vec<ReconciledRow>, ProjectionError> {
        let organization = self.selected()?;
        let forecaster = ScenarioForecaster::with_config(ctx.models, ctx.config);

        let mut predictions = BTreeMap::new();
        for (&name, table) in &self.scenarios {
            predictions.insert(name, forecaster.forecast(table, organization, ctx.history)?);
        }
        let backfit = forecaster.backfit(organization, ctx.history)?;
        let observed = ctx.history.filter(organization, Some(Domain::Performance));
        Ok(reconcile(&observed, &backfit, &predictions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FittedModel, ModelKind};
    use crate::reconcile::Quantity;
    use crate::types::MetricSeries;

    fn history() -> MetricHistory {
        MetricHistory::new(vec![
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2019, 100.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2020, 110.0),
            MetricSeries::new("QAB", "Beds", Domain::Capacity, 2021, 120.0),
            MetricSeries::new("QAB", "Occupancy", Domain::Performance, 2019, 80.0),
            MetricSeries::new("QAB", "Occupancy", Domain::Performance, 2020, 82.0),
            MetricSeries::new("QHM", "Beds", Domain::Capacity, 2021, 300.0),
        ])
    }

    fn models() -> ModelStore {
        let mut store = ModelStore::new();
        store.insert(
            FittedModel::linear("Occupancy", ModelKind::Level, &["Beds"], 30.0, &[0.5]).unwrap(),
        );
        store
    }

    fn context<'a>(history: &'a MetricHistory, models: &'a ModelStore) -> SessionContext<'a> {
        SessionContext {
            history,
            models,
            config: ForecastConfig {
                cutover_year: 2021,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_select_organization_generates_templates() {
        let (history, models) = (history(), models());
        let ctx = context(&history, &models);
        let session = Session::new()
            .apply(SessionEvent::SelectOrganization("QAB".into()), &ctx)
            .unwrap();
        assert_eq!(session.scenarios().len(), 3);
        assert!(session.scenario(ScenarioName::Custom).is_none());
        let last_known = session.scenario(ScenarioName::LastKnown).unwrap();
        assert_eq!(last_known.value("Beds", 2024), Some(120.0));
    }

    #[test]
    fn test_parameter_change_recomputes_only_its_scenario() {
        let (history, models) = (history(), models());
        let ctx = context(&history, &models);
        let before = Session::new()
            .apply(SessionEvent::SelectOrganization("QAB".into()), &ctx)
            .unwrap()
            .apply(SessionEvent::CopyToCustom(ScenarioName::LastKnown), &ctx)
            .unwrap();
        let after = before.apply(SessionEvent::SetPercent(-5.0), &ctx).unwrap();

        assert_eq!(*after.percent(), -5.0);
        assert_ne!(
            after.scenario(ScenarioName::PercentChange),
            before.scenario(ScenarioName::PercentChange)
        );
        for name in [ScenarioName::LastKnown, ScenarioName::Linear, ScenarioName::Custom] {
            assert_eq!(after.scenario(name), before.scenario(name));
        }
    }

    #[test]
    fn test_edit_cell_survives_historic_clamp() {
        let (history, models) = (history(), models());
        let ctx = context(&history, &models);
        let session = Session::new()
            .apply(SessionEvent::SelectOrganization("QAB".into()), &ctx)
            .unwrap()
            .apply(
                SessionEvent::EditCell {
                    scenario: ScenarioName::LastKnown,
                    metric: "Beds".into(),
                    year: 2023,
                    value: 500.0,
                },
                &ctx,
            )
            .unwrap();
        let table = session.scenario(ScenarioName::LastKnown).unwrap();
        assert_eq!(table.value("Beds", 2023), Some(500.0));
        assert!(table.is_overridden("Beds", 2023));
    }

    #[test]
    fn test_reselecting_resets_custom() {
        let (history, models) = (history(), models());
        let ctx = context(&history, &models);
        let session = Session::new()
            .apply(SessionEvent::SelectOrganization("QAB".into()), &ctx)
            .unwrap()
            .apply(SessionEvent::CopyToCustom(ScenarioName::Linear), &ctx)
            .unwrap()
            .apply(SessionEvent::SelectOrganization("QHM".into()), &ctx)
            .unwrap();
        assert!(session.scenario(ScenarioName::Custom).is_none());
        assert_eq!(session.organization().as_deref(), Some("QHM"));
    }

    #[test]
    fn test_events_without_organization_fail() {
        let (history, models) = (history(), models());
        let ctx = context(&history, &models);
        let session = Session::new();
        assert!(session
            .apply(SessionEvent::Generate(ScenarioName::Linear), &ctx)
            .is_err());
        assert!(session.project(&ctx).is_err());
    }

    #[test]
    fn test_project_reconciles_every_scenario() {
        let (history, models) = (history(), models());
        let ctx = context(&history, &models);
        let session = Session::new()
            .apply(SessionEvent::SelectOrganization("QAB".into()), &ctx)
            .unwrap();
        let rows = session.project(&ctx).unwrap();

        let observed = rows
            .iter()
            .filter(|r| r.value_type.quantity == Quantity::Observed)
            .count();
        assert_eq!(observed, 2);
        let predicted_last_known: Vec<(i32, f64)> = rows
            .iter()
            .filter(|r| r.value_type.to_string() == "predicted_last_known")
            .map(|r| (r.year, r.value))
            .collect();
        // 30 + 0.5 * 120 for every year from the cutover.
        assert_eq!(predicted_last_known.first(), Some(&(2021, 90.0)));
        assert!(predicted_last_known.iter().all(|(_, v)| *v == 90.0));
    }
}
