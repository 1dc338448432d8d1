use serde::Serialize;

use super::ols::{f_upper_tail, FittedModel};
use crate::error::{PipelineError, Result};

/// Extra-sum-of-squares F test between a model and a nested extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedModelComparison {
    pub reduced: String,
    pub full: String,
    pub df_reduced: usize,
    pub df_full: usize,
    pub rss_reduced: f64,
    pub rss_full: f64,
    /// Extra parameters in the full model.
    pub df_difference: usize,
    pub ss_reduction: f64,
    pub f_statistic: f64,
    pub p_value: f64,
}

/// Compare two OLS fits on the same rows where `full` adds terms to
/// `reduced`.
pub fn compare_nested(reduced: &FittedModel, full: &FittedModel) -> Result<NestedModelComparison> {
    let not_nested = |reason: &str| PipelineError::NotNested {
        reduced: reduced.name.clone(),
        full: full.name.clone(),
        reason: reason.to_string(),
    };
    if reduced.rows != full.rows {
        return Err(not_nested("models were fitted on different rows"));
    }
    if full.df_residual >= reduced.df_residual {
        return Err(not_nested("full model does not add parameters"));
    }
    if !reduced
        .coefficients
        .iter()
        .all(|c| full.coefficient(&c.name).is_some())
    {
        return Err(not_nested("reduced model has terms the full model lacks"));
    }

    let df_difference = reduced.df_residual - full.df_residual;
    let ss_reduction = (reduced.rss - full.rss).max(0.0);
    let f_statistic = if full.rss > 0.0 {
        (ss_reduction / df_difference as f64) / (full.rss / full.df_residual as f64)
    } else if ss_reduction > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    let p_value = f_upper_tail(f_statistic, df_difference as f64, full.df_residual as f64)?;

    Ok(NestedModelComparison {
        reduced: reduced.name.clone(),
        full: full.name.clone(),
        df_reduced: reduced.df_residual,
        df_full: full.df_residual,
        rss_reduced: reduced.rss,
        rss_full: full.rss,
        df_difference,
        ss_reduction,
        f_statistic,
        p_value,
    })
}
