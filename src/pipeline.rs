//! Stage orchestration.
//!
//! ```text
//!  load ─► augment ─► quality filter ─┬─► describe / correlate
//!                                     └─► select covariates (OLS + F-tests)
//!                                              │
//!                                              ▼
//!                                     mixed variants (intercept, slope)
//! ```
//!
//! Each stage reads the previous snapshot and returns a new one; nothing is
//! mutated in place, so every intermediate artifact stays inspectable. Only
//! loading and filtering errors abort a run; model fit failures are recorded
//! in the output.

use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::data::augment::augment;
use crate::data::filter::{quality_filter, FilterReport};
use crate::data::loader::load_file;
use crate::data::model::{Dataset, Field, FieldSummary, RawDataset};
use crate::data::sentiment::SentimentScorer;
use crate::error::Result;
use crate::stats::correlation::{correlation_matrix, CorrelationMatrix};
use crate::stats::design::Predictor;
use crate::stats::mixed::{fit_variant, MixedVariant};
use crate::stats::ols::FittedModel;
use crate::stats::selection::{select_covariates, Selection, RESPONSE};

/// One mixed-effects variant: its fit, or why it could not be produced.
#[derive(Debug, Clone, Serialize)]
pub struct MixedOutcome {
    pub variant: MixedVariant,
    pub model: Option<FittedModel>,
    pub error: Option<String>,
}

/// Every artifact the pipeline produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub raw: RawDataset,
    pub augmented: Dataset,
    pub filtered: Dataset,
    pub filter_report: FilterReport,
    pub summary: Vec<FieldSummary>,
    pub correlations: CorrelationMatrix,
    pub selection: Selection,
    /// In [`MixedVariant::SEQUENCE`] order.
    pub mixed: Vec<MixedOutcome>,
    pub adopted: MixedVariant,
}

impl PipelineOutput {
    /// The configured final model, if that variant could be fitted.
    pub fn adopted_model(&self) -> Option<&FittedModel> {
        self.mixed
            .iter()
            .find(|m| m.variant == self.adopted)
            .and_then(|m| m.model.as_ref())
    }
}

/// Run every stage on the file at `path`.
pub fn run<S>(path: &Path, config: &PipelineConfig, scorer: &S) -> Result<PipelineOutput>
where
    S: SentimentScorer + ?Sized,
{
    let raw = load_file(path)?;
    run_dataset(raw, config, scorer)
}

/// Run every stage after loading.
pub fn run_dataset<S>(raw: RawDataset, config: &PipelineConfig, scorer: &S) -> Result<PipelineOutput>
where
    S: SentimentScorer + ?Sized,
{
    let augmented = augment(&raw, scorer);
    let (filtered, filter_report) = quality_filter(&augmented, &config.exclusion, &config.required_fields)?;

    let summary = filtered.describe();
    let correlations = correlation_matrix(&filtered, &Field::NUMERIC);

    let selection = select_covariates(&filtered, config);
    let mixed = match selection.final_predictors() {
        Some(predictors) => fit_mixed_variants(&filtered, predictors, config),
        None => skip_mixed_variants(selection.extended_error.as_deref().unwrap_or("unknown error")),
    };

    Ok(PipelineOutput {
        raw,
        augmented,
        filtered,
        filter_report,
        summary,
        correlations,
        selection,
        mixed,
        adopted: config.mixed.adopted_variant,
    })
}

/// Record every variant as not fitted when no final fixed-effects model exists.
fn skip_mixed_variants(reason: &str) -> Vec<MixedOutcome> {
    warn!("mixed models skipped: no final fixed-effects model");
    MixedVariant::SEQUENCE
        .iter()
        .map(|&variant| MixedOutcome {
            variant,
            model: None,
            error: Some(format!("no final fixed-effects model ({reason})")),
        })
        .collect()
}

/// Attempt every variant in order. A failing variant is recorded and the
/// next one still runs.
pub fn fit_mixed_variants(
    dataset: &Dataset,
    predictors: &[Predictor],
    config: &PipelineConfig,
) -> Vec<MixedOutcome> {
    let leveling = config.leveling();
    MixedVariant::SEQUENCE
        .iter()
        .map(|&variant| {
            let term = match variant {
                MixedVariant::RandomIntercept => "1".to_string(),
                MixedVariant::RandomSlope => format!("0 + {}", config.mixed.slope_predictor),
            };
            let name = format!("{}: ({term} | release_month)", variant.label());
            match fit_variant(
                &name,
                dataset,
                RESPONSE,
                predictors,
                variant,
                &leveling,
                config.confidence_level,
                &config.mixed,
            ) {
                Ok(model) => {
                    for warning in &model.warnings {
                        info!("{name}: flagged, {warning}");
                    }
                    MixedOutcome {
                        variant,
                        model: Some(model),
                        error: None,
                    }
                }
                Err(err) => {
                    warn!("{name}: {err}");
                    MixedOutcome {
                        variant,
                        model: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}
