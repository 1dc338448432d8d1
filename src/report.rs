//! Read-only views of the pipeline artifacts for downstream rendering.

use std::fmt;

use serde::Serialize;

use crate::data::filter::FilterReport;
use crate::data::model::FieldSummary;
use crate::error::FieldParseWarning;
use crate::pipeline::{MixedOutcome, PipelineOutput};
use crate::stats::correlation::CorrelationMatrix;
use crate::stats::design::Predictor;
use crate::stats::mixed::MixedVariant;
use crate::stats::ols::FittedModel;
use crate::stats::selection::{CandidateOutcome, CandidateResult};

/// Everything a reporting tool needs, borrowed from a [`PipelineOutput`].
#[derive(Debug, Serialize)]
pub struct PipelineReport<'a> {
    pub rows_loaded: usize,
    pub parse_warnings: &'a [FieldParseWarning],
    pub filter: &'a FilterReport,
    pub summary: &'a [FieldSummary],
    pub correlations: &'a CorrelationMatrix,
    pub baseline: Option<&'a FittedModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_error: Option<&'a str>,
    pub candidates: &'a [CandidateResult],
    pub accepted: &'a [Predictor],
    pub extended: Option<&'a FittedModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_error: Option<&'a str>,
    pub mixed: &'a [MixedOutcome],
    pub adopted: MixedVariant,
}

impl<'a> PipelineReport<'a> {
    pub fn new(output: &'a PipelineOutput) -> Self {
        PipelineReport {
            rows_loaded: output.raw.len(),
            parse_warnings: &output.raw.warnings,
            filter: &output.filter_report,
            summary: &output.summary,
            correlations: &output.correlations,
            baseline: output.selection.baseline.as_ref(),
            baseline_error: output.selection.baseline_error.as_deref(),
            candidates: &output.selection.candidates,
            accepted: &output.selection.accepted,
            extended: output.selection.extended.as_ref(),
            extended_error: output.selection.extended_error.as_deref(),
            mixed: &output.mixed,
            adopted: output.adopted,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Plain-text overview of a pipeline run.
pub fn render_summary(output: &PipelineOutput) -> String {
    Summary(output).to_string()
}

struct Summary<'a>(&'a PipelineOutput);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = self.0;
        let report = &out.filter_report;

        writeln!(f, "== Data ==")?;
        writeln!(
            f,
            "{} rows loaded, {} cell parse warnings",
            out.raw.len(),
            out.raw.warnings.len()
        )?;
        writeln!(
            f,
            "{} → {} rows after filtering ({} streaming, {} outliers, {} incomplete)",
            report.rows_before,
            report.rows_after,
            report.streaming_dropped(),
            report.outliers_dropped(),
            report.incomplete_dropped()
        )?;
        for m in report.missing_before.iter().filter(|m| m.missing > 0) {
            writeln!(f, "  missing {:<18} {:>4} ({:.1}%)", m.field, m.missing, 100.0 * m.fraction)?;
        }

        writeln!(f, "\n== Covariate selection ==")?;
        for c in &out.selection.candidates {
            let verdict = match &c.outcome {
                CandidateOutcome::Accepted => "accepted".to_string(),
                CandidateOutcome::NotSignificant => "not significant".to_string(),
                CandidateOutcome::SparseLevel { level, count } => {
                    format!("rejected: level {level} has {count} row(s)")
                }
                CandidateOutcome::FitFailed { message } => format!("failed: {message}"),
            };
            match &c.comparison {
                Some(cmp) => writeln!(
                    f,
                    "  {:<16} F({}, {}) = {:>9.4}  p = {:.4}  {verdict}",
                    c.predictor, cmp.df_difference, cmp.df_full, cmp.f_statistic, cmp.p_value
                )?,
                None => writeln!(f, "  {:<16} {verdict}", c.predictor)?,
            }
        }

        let selection = &out.selection;
        write_fit(f, "Baseline", selection.baseline.as_ref(), selection.baseline_error.as_deref())?;
        write_fit(f, "Extended", selection.extended.as_ref(), selection.extended_error.as_deref())?;

        for m in &out.mixed {
            let title = if m.variant == out.adopted {
                format!("Mixed {} (adopted)", m.variant.label())
            } else {
                format!("Mixed {}", m.variant.label())
            };
            write_fit(f, &title, m.model.as_ref(), m.error.as_deref())?;
        }
        Ok(())
    }
}

fn write_fit(f: &mut fmt::Formatter<'_>, title: &str, model: Option<&FittedModel>, error: Option<&str>) -> fmt::Result {
    match model {
        Some(model) => write_model(f, title, model),
        None => {
            writeln!(f, "\n== {title} ==")?;
            writeln!(f, "  not fitted: {}", error.unwrap_or("unknown error"))
        }
    }
}

fn write_model(f: &mut fmt::Formatter<'_>, title: &str, model: &FittedModel) -> fmt::Result {
    writeln!(f, "\n== {title}: {} ==", model.name)?;
    writeln!(
        f,
        "  n = {}, residual SE = {:.4e} on {} df, R² = {:.4}{}",
        model.n_obs,
        model.residual_std_error,
        model.df_residual,
        model.r_squared,
        model
            .adj_r_squared
            .map(|a| format!(", adj. R² = {a:.4}"))
            .unwrap_or_default()
    )?;
    writeln!(
        f,
        "  {:<28} {:>12} {:>12} {:>8} {:>12} {:>12}",
        "term", "estimate", "std. error", "p", "lower", "upper"
    )?;
    for c in &model.coefficients {
        writeln!(
            f,
            "  {:<28} {:>12.4e} {:>12.4e} {:>8.4} {:>12.4e} {:>12.4e}",
            c.name, c.estimate, c.std_error, c.p_value, c.ci_lower, c.ci_upper
        )?;
    }
    if !model.absent_levels.is_empty() {
        writeln!(f, "  absent levels: {}", model.absent_levels.join(", "))?;
    }

    if let Some(re) = &model.random_effects {
        writeln!(
            f,
            "  random {} by {}: sd = {:.4e}, residual sd = {:.4e}, REML = {:.3}, conditional R² = {:.4}",
            re.term,
            re.grouping,
            re.group_std_dev,
            re.residual_variance.sqrt(),
            re.reml_criterion,
            re.conditional_r_squared
        )?;
        for g in &re.groups {
            writeln!(
                f,
                "    {:<10} n={:<3} {:>12.4e} ± {:.4e}  [{:.4e}, {:.4e}]",
                g.group, g.n_obs, g.estimate, g.std_error, g.ci_lower, g.ci_upper
            )?;
        }
    }
    for warning in &model.warnings {
        writeln!(f, "  warning: {warning}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::loader::load_reader;
    use crate::data::sentiment::LexiconScorer;
    use crate::data::synthetic::{generate_films, write_csv, SimpleRng, SyntheticSpec};
    use crate::pipeline::run_dataset;

    fn output() -> PipelineOutput {
        let films = generate_films(&SyntheticSpec::default(), &mut SimpleRng::new(42));
        let mut buf = Vec::new();
        write_csv(&films, &mut buf).unwrap();
        let raw = load_reader(buf.as_slice(), b',').unwrap();
        run_dataset(raw, &PipelineConfig::default(), &LexiconScorer::default()).unwrap()
    }

    #[test]
    fn test_json_exposes_every_artifact() {
        let out = output();
        let json = PipelineReport::new(&out).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["rows_loaded"], 120);
        assert_eq!(value["filter"]["rows_before"], 120);
        assert_eq!(value["adopted"], "random_slope");
        assert_eq!(value["candidates"].as_array().unwrap().len(), 4);
        assert_eq!(value["mixed"].as_array().unwrap().len(), 2);
        assert_eq!(value["baseline"]["kind"]["type"], "ols");
        assert!(value["baseline"]["coefficients"][0]["name"]
            .as_str()
            .unwrap()
            .contains("Intercept"));
        assert!(value["baseline"].get("residuals").is_none());
    }

    #[test]
    fn test_summary_lists_each_stage() {
        let out = output();
        let text = render_summary(&out);
        assert!(text.contains("== Data =="));
        assert!(text.contains("120 rows loaded"));
        assert!(text.contains("== Baseline"));
        assert!(text.contains("(adopted)"));
        for c in &out.selection.candidates {
            assert!(text.contains(c.predictor.name()));
        }
    }

    #[test]
    fn test_model_failures_are_reported() {
        let csv = "Title,Release Date,Box Office,Budget,Critic Score\n\
                   Alpha,01/04/2019,$500,$100,60\n\
                   Beta,02/01/2019,$900,$300,75\n";
        let raw = load_reader(csv.as_bytes(), b',').unwrap();
        let out = run_dataset(raw, &PipelineConfig::default(), &LexiconScorer::default()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&PipelineReport::new(&out).to_json().unwrap()).unwrap();
        assert!(value["baseline"].is_null());
        assert!(value["baseline_error"].is_string());
        assert!(value["extended_error"].is_string());
        assert!(value["mixed"][0]["error"].is_string());

        let text = render_summary(&out);
        assert!(text.contains("2 → 2 rows after filtering"));
        assert!(text.contains("== Baseline ==\n  not fitted:"));
        assert!(text.contains("no final fixed-effects model"));
    }
}
