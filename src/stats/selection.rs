//! Covariate selection: each candidate is tried against the baseline with a
//! nested F-test and then screened by the sparse-level rule.

use log::{debug, info, warn};
use serde::Serialize;

use super::design::{complete_rows, Design, LevelCount, Predictor};
use super::ftest::{compare_nested, NestedModelComparison};
use super::ols::{fit_ols, FittedModel};
use crate::config::PipelineConfig;
use crate::data::model::{Dataset, Field};
use crate::error::Result;

/// The response every model explains.
pub const RESPONSE: Field = Field::NetProfit;

/// Rejects a categorical candidate when one of its observed levels rests on
/// too few rows for its coefficient to mean anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SparseLevelRule {
    pub min_observations: usize,
}

impl SparseLevelRule {
    /// The sparsest offending level of `predictor` in `model`, if any.
    pub fn violation<'a>(&self, model: &'a FittedModel, predictor: Predictor) -> Option<&'a LevelCount> {
        model
            .level_counts
            .iter()
            .filter(|c| c.predictor == predictor && c.count < self.min_observations)
            .min_by_key(|c| c.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Accepted,
    NotSignificant,
    /// Significant, but rejected by [`SparseLevelRule`].
    SparseLevel { level: String, count: usize },
    /// The baseline or extended fit could not be produced.
    FitFailed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub predictor: Predictor,
    pub comparison: Option<NestedModelComparison>,
    pub outcome: CandidateOutcome,
}

/// Outcome of covariate selection. A model that could not be fitted is
/// `None`, with the reason in the matching `*_error` field.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub baseline: Option<FittedModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_error: Option<String>,
    /// In candidate-list order.
    pub candidates: Vec<CandidateResult>,
    /// Accepted predictors, in candidate-list order.
    pub accepted: Vec<Predictor>,
    /// Baseline plus every accepted candidate.
    pub extended: Option<FittedModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_error: Option<String>,
}

impl Selection {
    /// Predictor set of the final fixed-effects model, if it was fitted.
    pub fn final_predictors(&self) -> Option<&[Predictor]> {
        self.extended.as_ref().map(|m| m.predictors.as_slice())
    }
}

fn split_fit(label: &str, fit: Result<FittedModel>) -> (Option<FittedModel>, Option<String>) {
    match fit {
        Ok(model) => (Some(model), None),
        Err(err) => {
            warn!("{label} model not fitted: {err}");
            (None, Some(err.to_string()))
        }
    }
}

fn model_name(predictors: &[Predictor]) -> String {
    let terms: Vec<&str> = predictors.iter().map(|p| p.name()).collect();
    format!("{} ~ {}", RESPONSE, terms.join(" + "))
}

/// Fit `predictors` over every row complete for them.
pub fn fit_predictors(dataset: &Dataset, predictors: &[Predictor], config: &PipelineConfig) -> Result<FittedModel> {
    let rows = complete_rows(dataset, RESPONSE, predictors);
    fit_on_rows(dataset, &rows, predictors, config)
}

fn fit_on_rows(
    dataset: &Dataset,
    rows: &[usize],
    predictors: &[Predictor],
    config: &PipelineConfig,
) -> Result<FittedModel> {
    let design = Design::build(dataset, rows, RESPONSE, predictors, &config.leveling());
    fit_ols(&model_name(predictors), &design, predictors, config.confidence_level)
}

/// Test one candidate. Both models share the rows complete for the extended
/// predictor set, so the comparison is between nested fits of the same data.
fn evaluate_candidate(
    dataset: &Dataset,
    candidate: Predictor,
    config: &PipelineConfig,
) -> Result<(NestedModelComparison, CandidateOutcome)> {
    let mut extended = config.baseline.clone();
    extended.push(candidate);
    let rows = complete_rows(dataset, RESPONSE, &extended);

    let reduced = fit_on_rows(dataset, &rows, &config.baseline, config)?;
    let full = fit_on_rows(dataset, &rows, &extended, config)?;
    let comparison = compare_nested(&reduced, &full)?;

    let outcome = if comparison.p_value >= config.significance_level {
        CandidateOutcome::NotSignificant
    } else {
        let rule = SparseLevelRule {
            min_observations: config.min_level_observations,
        };
        match rule.violation(&full, candidate) {
            Some(sparse) => CandidateOutcome::SparseLevel {
                level: sparse.level.clone(),
                count: sparse.count,
            },
            None => CandidateOutcome::Accepted,
        }
    };
    Ok((comparison, outcome))
}

/// Fit the baseline, test every candidate against it, and fit the model
/// extended by the accepted candidates.
///
/// Every fit failure is recorded in the returned [`Selection`]; the remaining
/// fits still run.
pub fn select_covariates(dataset: &Dataset, config: &PipelineConfig) -> Selection {
    let (baseline, baseline_error) = split_fit("baseline", fit_predictors(dataset, &config.baseline, config));

    let mut candidates = Vec::with_capacity(config.candidates.len());
    let mut accepted = Vec::new();
    for &predictor in &config.candidates {
        if config.baseline.contains(&predictor) {
            debug!("candidate {predictor} is already in the baseline");
            continue;
        }
        let result = match evaluate_candidate(dataset, predictor, config) {
            Ok((comparison, outcome)) => {
                debug!(
                    "candidate {predictor}: F={:.4} on ({}, {}) df, p={:.4} → {outcome:?}",
                    comparison.f_statistic, comparison.df_difference, comparison.df_full, comparison.p_value
                );
                if outcome == CandidateOutcome::Accepted {
                    accepted.push(predictor);
                }
                CandidateResult {
                    predictor,
                    comparison: Some(comparison),
                    outcome,
                }
            }
            Err(err) => {
                debug!("candidate {predictor}: {err}");
                CandidateResult {
                    predictor,
                    comparison: None,
                    outcome: CandidateOutcome::FitFailed {
                        message: err.to_string(),
                    },
                }
            }
        };
        candidates.push(result);
    }

    let mut predictors = config.baseline.clone();
    predictors.extend(&accepted);
    let (extended, extended_error) = split_fit("extended", fit_predictors(dataset, &predictors, config));
    if let Some(model) = &extended {
        info!(
            "selection: accepted [{}], extended model R²={:.4} on {} rows",
            accepted.iter().map(|p| p.name()).collect::<Vec<_>>().join(", "),
            model.r_squared,
            model.n_obs
        );
    }

    Selection {
        baseline,
        baseline_error,
        candidates,
        accepted,
        extended,
        extended_error,
    }
}
