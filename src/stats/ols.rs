use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use super::design::{Design, LevelCount, Predictor};
use super::mixed::{MixedVariant, RandomEffects};
use crate::error::{FitWarning, PipelineError, Result};

/// Relative tolerance on `|R[j,j]| / ‖x_j‖` below which a column is
/// treated as collinear with the ones before it.
const RANK_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// FittedModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "variant", rename_all = "snake_case")]
pub enum ModelKind {
    Ols,
    Mixed(MixedVariant),
}

/// One row of a coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Result of a regression fit. Read-only once produced.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    pub name: String,
    pub kind: ModelKind,
    pub predictors: Vec<Predictor>,
    pub coefficients: Vec<Coefficient>,
    pub n_obs: usize,
    pub df_residual: usize,
    pub residual_std_error: f64,
    pub rss: f64,
    /// Marginal R² for mixed models.
    pub r_squared: f64,
    pub adj_r_squared: Option<f64>,
    /// Overall regression F statistic and its p-value (OLS only).
    pub f_statistic: Option<f64>,
    pub f_p_value: Option<f64>,
    pub level_counts: Vec<LevelCount>,
    pub absent_levels: Vec<String>,
    pub random_effects: Option<RandomEffects>,
    pub warnings: Vec<FitWarning>,
    #[serde(skip)]
    pub fitted: Vec<f64>,
    #[serde(skip)]
    pub residuals: Vec<f64>,
    /// Dataset indices of the rows used.
    #[serde(skip)]
    pub rows: Vec<usize>,
}

impl FittedModel {
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    pub fn n_params(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_flagged(&self) -> bool {
        !self.warnings.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Shared inference helpers
// ---------------------------------------------------------------------------

/// Student t for `df` degrees of freedom.
pub fn students_t(df: f64) -> Result<StudentsT> {
    StudentsT::new(0.0, 1.0, df).map_err(|e| PipelineError::Distribution(e.to_string()))
}

/// Upper-tail probability of an F statistic.
pub fn f_upper_tail(f: f64, df1: f64, df2: f64) -> Result<f64> {
    if f.is_infinite() {
        return Ok(0.0);
    }
    let dist = FisherSnedecor::new(df1, df2).map_err(|e| PipelineError::Distribution(e.to_string()))?;
    Ok(dist.sf(f.max(0.0)).clamp(0.0, 1.0))
}

/// Coefficient table with two-sided t tests and `confidence` intervals on
/// `df` degrees of freedom.
pub fn coefficient_table(
    names: &[String],
    estimates: &DVector<f64>,
    covariance: &DMatrix<f64>,
    df: f64,
    confidence: f64,
) -> Result<Vec<Coefficient>> {
    let t = students_t(df)?;
    let critical = t.inverse_cdf(1.0 - (1.0 - confidence) / 2.0);

    Ok(names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let estimate = estimates[j];
            let std_error = covariance[(j, j)].max(0.0).sqrt();
            let t_value = if std_error > 0.0 {
                estimate / std_error
            } else if estimate == 0.0 {
                0.0
            } else {
                estimate.signum() * f64::INFINITY
            };
            let p_value = if t_value.is_infinite() {
                0.0
            } else {
                (2.0 * t.sf(t_value.abs())).clamp(0.0, 1.0)
            };
            Coefficient {
                name: name.clone(),
                estimate,
                std_error,
                t_value,
                p_value,
                ci_lower: estimate - critical * std_error,
                ci_upper: estimate + critical * std_error,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// OLS via QR
// ---------------------------------------------------------------------------

/// Least-squares solution of a design: coefficients and `(XᵀX)⁻¹`.
pub(crate) struct QrSolution {
    pub beta: DVector<f64>,
    pub xtx_inv: DMatrix<f64>,
}

pub(crate) fn solve_qr(model: &str, design: &Design) -> Result<QrSolution> {
    let n = design.n_obs();
    let p = design.n_params();
    if n <= p {
        return Err(PipelineError::InsufficientData {
            model: model.to_string(),
            rows: n,
            params: p,
        });
    }

    let qr = design.x.clone().qr();
    let r = qr.r();
    for j in 0..p {
        let norm = design.x.column(j).norm();
        if norm == 0.0 || r[(j, j)].abs() <= RANK_TOLERANCE * norm {
            return Err(PipelineError::RankDeficient {
                model: model.to_string(),
                column: design.columns[j].clone(),
            });
        }
    }

    let rank_deficient = || PipelineError::RankDeficient {
        model: model.to_string(),
        column: design.columns[p - 1].clone(),
    };
    let qty = qr.q().tr_mul(&design.y);
    let beta = r.solve_upper_triangular(&qty).ok_or_else(rank_deficient)?;
    let r_inv = r
        .solve_upper_triangular(&DMatrix::identity(p, p))
        .ok_or_else(rank_deficient)?;
    let xtx_inv = &r_inv * r_inv.transpose();
    Ok(QrSolution { beta, xtx_inv })
}

/// Fit `response ~ predictors` by ordinary least squares.
pub fn fit_ols(
    name: &str,
    design: &Design,
    predictors: &[Predictor],
    confidence: f64,
) -> Result<FittedModel> {
    let QrSolution { beta, xtx_inv } = solve_qr(name, design)?;
    let n = design.n_obs();
    let p = design.n_params();
    let df = n - p;

    let fitted = &design.x * &beta;
    let residuals = &design.y - &fitted;
    let rss = residuals.norm_squared();
    let sigma2 = rss / df as f64;

    let mean_y = design.y.mean();
    let tss = design.y.iter().map(|v| (v - mean_y).powi(2)).sum::<f64>();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df as f64;

    let (f_statistic, f_p_value) = if p > 1 && tss > 0.0 {
        let f = if rss > 0.0 {
            ((tss - rss) / (p - 1) as f64) / sigma2
        } else {
            f64::INFINITY
        };
        (Some(f), Some(f_upper_tail(f, (p - 1) as f64, df as f64)?))
    } else {
        (None, None)
    };

    let covariance = xtx_inv * sigma2;
    let coefficients = coefficient_table(&design.columns, &beta, &covariance, df as f64, confidence)?;
    debug!("{name}: n={n} p={p} rss={rss:.4e} R²={r_squared:.4}");

    Ok(FittedModel {
        name: name.to_string(),
        kind: ModelKind::Ols,
        predictors: predictors.to_vec(),
        coefficients,
        n_obs: n,
        df_residual: df,
        residual_std_error: sigma2.sqrt(),
        rss,
        r_squared,
        adj_r_squared: Some(adj_r_squared),
        f_statistic,
        f_p_value,
        level_counts: design.level_counts.clone(),
        absent_levels: design.absent_levels.clone(),
        random_effects: None,
        warnings: Vec::new(),
        fitted: fitted.iter().copied().collect(),
        residuals: residuals.iter().copied().collect(),
        rows: design.rows.clone(),
    })
}
