//! Linear mixed models with one scalar random term grouped by release month.
//!
//! Model: `y = Xβ + z ∘ b[g] + ε` with `b ~ N(0, σ_b²)` per group and
//! `ε ~ N(0, σ²)`.  For the random-intercept variant `z = 1`; for the
//! random-slope variant `z` is the slope predictor and there is no random
//! intercept.
//!
//! The relative scale `θ = σ_b / σ` (on `z` normalised to unit mean square)
//! is chosen by minimising the profiled REML criterion: a coarse log grid
//! followed by golden-section refinement.  Because each group contributes a
//! rank-one term, `V = I + θ² Z Zᵀ` is inverted group by group.

use std::cell::Cell;

use log::{debug, info, warn};
use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::design::{complete_rows, Design, Leveling, Predictor, INTERCEPT};
use super::ols::{coefficient_table, FittedModel, ModelKind};
use crate::data::model::{Dataset, Field, MONTHS};
use crate::error::{FitWarning, PipelineError, Result};

const GRID_LOG10_MIN: f64 = -4.0;
const GRID_LOG10_MAX: f64 = 2.0;
const GRID_STEPS: usize = 24;
const GOLDEN: f64 = 0.618_033_988_749_894_9;
const THETA_TOLERANCE: f64 = 1e-7;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which random term the grouping contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedVariant {
    /// Per-group additive shift.
    RandomIntercept,
    /// Per-group coefficient on the slope predictor, no random intercept.
    RandomSlope,
}

impl MixedVariant {
    /// The order in which the pipeline attempts the variants.
    pub const SEQUENCE: [MixedVariant; 2] = [MixedVariant::RandomIntercept, MixedVariant::RandomSlope];

    pub fn label(self) -> &'static str {
        match self {
            MixedVariant::RandomIntercept => "random_intercept",
            MixedVariant::RandomSlope => "random_slope",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixedConfig {
    /// Variant reported as the final model.
    pub adopted_variant: MixedVariant,
    /// Numeric predictor carrying the random slope.
    pub slope_predictor: Predictor,
    /// `θ` at or below this marks a boundary (singular) fit.
    pub singular_tolerance: f64,
    /// Criterion evaluations allowed per fit.
    pub max_evaluations: usize,
}

impl Default for MixedConfig {
    fn default() -> Self {
        MixedConfig {
            adopted_variant: MixedVariant::RandomSlope,
            slope_predictor: Predictor::CriticScore,
            singular_tolerance: 1e-4,
            max_evaluations: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Conditional mode of one group's random coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEffect {
    pub group: String,
    pub n_obs: usize,
    pub estimate: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Fixed coefficient of the same term plus this group's deviation.
    pub combined: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RandomEffects {
    pub grouping: Field,
    /// `(Intercept)` or the slope predictor's name.
    pub term: String,
    pub group_variance: f64,
    pub group_std_dev: f64,
    pub residual_variance: f64,
    pub reml_criterion: f64,
    pub conditional_r_squared: f64,
    pub evaluations: usize,
    pub groups: Vec<GroupEffect>,
}

// ---------------------------------------------------------------------------
// Profiled REML
// ---------------------------------------------------------------------------

/// Per-group sufficient statistics for the rank-one updates.
struct GroupBlock {
    /// Index into [`MONTHS`].
    index: usize,
    label: String,
    n_obs: usize,
    /// zᵀz
    zz: f64,
    /// Xᵀz
    xz: DVector<f64>,
    /// zᵀy
    zy: f64,
}

struct Problem {
    n: usize,
    p: usize,
    xtx: DMatrix<f64>,
    xty: DVector<f64>,
    yty: f64,
    groups: Vec<GroupBlock>,
}

/// Everything that depends on `θ`.
struct Evaluation {
    criterion: f64,
    beta: DVector<f64>,
    sigma2: f64,
    xvx_inv: DMatrix<f64>,
}

impl Problem {
    fn new(design: &Design, z: &[f64], groups: &[usize], labels: &[String]) -> Problem {
        let (n, p) = (design.n_obs(), design.n_params());
        let x = &design.x;
        let y = &design.y;

        let mut blocks: Vec<GroupBlock> = labels
            .iter()
            .enumerate()
            .map(|(index, label)| GroupBlock {
                index,
                label: label.clone(),
                n_obs: 0,
                zz: 0.0,
                xz: DVector::zeros(p),
                zy: 0.0,
            })
            .collect();
        for i in 0..n {
            let block = &mut blocks[groups[i]];
            block.n_obs += 1;
            block.zz += z[i] * z[i];
            block.zy += z[i] * y[i];
            for j in 0..p {
                block.xz[j] += x[(i, j)] * z[i];
            }
        }
        blocks.retain(|b| b.n_obs > 0);

        Problem {
            n,
            p,
            xtx: x.tr_mul(x),
            xty: x.tr_mul(y),
            yty: y.norm_squared(),
            groups: blocks,
        }
    }

    /// REML criterion `-2 ℓ_R` at `θ`, with β and σ² profiled out.
    fn evaluate(&self, theta: f64) -> Option<Evaluation> {
        let t2 = theta * theta;
        let mut xvx = self.xtx.clone();
        let mut xvy = self.xty.clone();
        let mut yvy = self.yty;
        let mut log_det_v = 0.0;

        for g in &self.groups {
            let w = t2 / (1.0 + t2 * g.zz);
            xvx -= (&g.xz * g.xz.transpose()) * w;
            xvy -= &g.xz * (w * g.zy);
            yvy -= w * g.zy * g.zy;
            log_det_v += (t2 * g.zz).ln_1p();
        }

        let chol = Cholesky::new(xvx)?;
        let beta = chol.solve(&xvy);
        let pwrss = (yvy - beta.dot(&xvy)).max(0.0);
        let dof = (self.n - self.p) as f64;
        let sigma2 = pwrss / dof;
        if sigma2 <= 0.0 || !sigma2.is_finite() {
            return None;
        }
        let log_det_xvx: f64 = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        let criterion = dof * (1.0 + (2.0 * std::f64::consts::PI * sigma2).ln()) + log_det_v + log_det_xvx;

        Some(Evaluation {
            criterion,
            beta,
            sigma2,
            xvx_inv: chol.inverse(),
        })
    }
}

/// Outcome of the one-dimensional search over `θ`.
struct ThetaSearch {
    theta: f64,
    evaluations: usize,
    converged: bool,
}

/// Minimise the criterion over `θ ≥ 0`. `None` when no `θ` on the grid
/// yields a positive-definite system.
fn optimise_theta(problem: &Problem, max_evaluations: usize) -> Option<ThetaSearch> {
    let evaluations = Cell::new(0usize);
    let criterion = |theta: f64| {
        evaluations.set(evaluations.get() + 1);
        problem
            .evaluate(theta)
            .map(|e| e.criterion)
            .unwrap_or(f64::INFINITY)
    };

    let step = (GRID_LOG10_MAX - GRID_LOG10_MIN) / GRID_STEPS as f64;
    let grid: Vec<f64> = std::iter::once(0.0)
        .chain((0..=GRID_STEPS).map(|k| 10f64.powf(GRID_LOG10_MIN + step * k as f64)))
        .collect();
    let values: Vec<f64> = grid.iter().map(|&t| criterion(t)).collect();
    let best = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)?;
    let last = grid.len() - 1;
    debug!("θ grid minimum at {:.3e} (criterion {:.6})", grid[best], values[best]);

    // Golden-section search on the bracket around the grid minimum.
    let mut lo = grid[best.saturating_sub(1)];
    let mut hi = grid[(best + 1).min(last)];
    let mut a = hi - GOLDEN * (hi - lo);
    let mut b = lo + GOLDEN * (hi - lo);
    let mut fa = criterion(a);
    let mut fb = criterion(b);
    let mut converged = false;
    while evaluations.get() < max_evaluations {
        if hi - lo <= THETA_TOLERANCE * (1.0 + lo) {
            converged = true;
            break;
        }
        if fa <= fb {
            hi = b;
            b = a;
            fb = fa;
            a = hi - GOLDEN * (hi - lo);
            fa = criterion(a);
        } else {
            lo = a;
            a = b;
            fa = fb;
            b = lo + GOLDEN * (hi - lo);
            fb = criterion(b);
        }
    }

    let (mut theta, interior) = if fa <= fb { (a, fa) } else { (b, fb) };
    if best == 0 && values[0] <= interior {
        theta = 0.0;
    }
    Some(ThetaSearch {
        theta,
        evaluations: evaluations.get(),
        converged: converged && best != last,
    })
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Fit a mixed model over `design`, grouping rows by release month.
///
/// `months` holds each design row's month index (0 = January), `slope`
/// the raw slope-predictor values (ignored for the intercept variant).
#[allow(clippy::too_many_arguments)]
pub fn fit_mixed(
    name: &str,
    design: &Design,
    predictors: &[Predictor],
    variant: MixedVariant,
    months: &[usize],
    slope: Option<(&str, &[f64])>,
    confidence: f64,
    config: &MixedConfig,
) -> Result<FittedModel> {
    let invalid = |reason: String| PipelineError::InvalidModel {
        model: name.to_string(),
        reason,
    };
    let n = design.n_obs();
    let p = design.n_params();
    if n <= p {
        return Err(PipelineError::InsufficientData {
            model: name.to_string(),
            rows: n,
            params: p,
        });
    }
    if months.len() != n || months.iter().any(|&m| m >= MONTHS.len()) {
        return Err(invalid(format!("expected {n} month indices below {}", MONTHS.len())));
    }

    let (term, z_raw): (String, Vec<f64>) = match (variant, slope) {
        (MixedVariant::RandomIntercept, _) => (INTERCEPT.to_string(), vec![1.0; n]),
        (MixedVariant::RandomSlope, Some((term, values))) if values.len() == n => {
            (term.to_string(), values.to_vec())
        }
        (MixedVariant::RandomSlope, _) => {
            return Err(invalid("random slope needs one slope value per row".into()))
        }
    };
    let scale = (z_raw.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt();
    if scale <= 0.0 || !scale.is_finite() {
        return Err(invalid(format!("random term `{term}` is identically zero")));
    }
    let z: Vec<f64> = z_raw.iter().map(|v| v / scale).collect();

    let labels: Vec<String> = MONTHS.iter().map(|m| m.name().to_string()).collect();
    let problem = Problem::new(design, &z, months, &labels);
    if problem.groups.len() < 2 {
        return Err(invalid(format!("{} release-month group(s) observed", problem.groups.len())));
    }

    let rank_deficient = || PipelineError::RankDeficient {
        model: name.to_string(),
        column: design.columns.last().cloned().unwrap_or_default(),
    };
    let ThetaSearch {
        theta,
        evaluations,
        converged,
    } = optimise_theta(&problem, config.max_evaluations).ok_or_else(rank_deficient)?;
    let fit = problem.evaluate(theta).ok_or_else(rank_deficient)?;

    let sigma2 = fit.sigma2;
    let t2 = theta * theta;
    // Variance of the random coefficient in the slope predictor's own units.
    let group_variance = t2 * sigma2 / (scale * scale);

    let mut warnings = Vec::new();
    if theta <= config.singular_tolerance {
        warn!("{name}: boundary (singular) fit, θ = {theta:.3e}");
        warnings.push(FitWarning::Singular {
            variance: group_variance,
        });
    }
    if !converged {
        warn!("{name}: variance search did not converge ({evaluations} evaluations)");
        warnings.push(FitWarning::NotConverged { evaluations });
    }

    // Fixed effects.
    let df = (n - p) as f64;
    let covariance = &fit.xvx_inv * sigma2;
    let coefficients = coefficient_table(&design.columns, &fit.beta, &covariance, df, confidence)?;

    // Conditional modes: b_j = θ² zⱼᵀrⱼ / (1 + θ² zⱼᵀzⱼ), in normalised z units.
    let marginal = &design.x * &fit.beta;
    let residual = &design.y - &marginal;
    let mut zr = vec![0.0; MONTHS.len()];
    for i in 0..n {
        zr[months[i]] += z[i] * residual[i];
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| PipelineError::Distribution(e.to_string()))?;
    let critical = normal.inverse_cdf(1.0 - (1.0 - confidence) / 2.0);
    let fixed_same_term = coefficients.iter().find(|c| c.name == term).map(|c| c.estimate);

    let mut modes = vec![0.0; MONTHS.len()];
    let groups: Vec<GroupEffect> = problem
        .groups
        .iter()
        .map(|g| {
            let j = g.index;
            let shrink = t2 / (1.0 + t2 * g.zz);
            modes[j] = shrink * zr[j];
            let estimate = modes[j] / scale;
            let std_error = (sigma2 * shrink).sqrt() / scale;
            GroupEffect {
                group: g.label.clone(),
                n_obs: g.n_obs,
                estimate,
                std_error,
                ci_lower: estimate - critical * std_error,
                ci_upper: estimate + critical * std_error,
                combined: fixed_same_term.map(|f| f + estimate),
            }
        })
        .collect();

    let fitted: Vec<f64> = (0..n).map(|i| marginal[i] + z[i] * modes[months[i]]).collect();
    let residuals: Vec<f64> = (0..n).map(|i| design.y[i] - fitted[i]).collect();
    let rss = residuals.iter().map(|r| r * r).sum::<f64>();

    // Nakagawa R²; the random variance is t2·σ² because z has unit mean square.
    let mean_fixed = marginal.mean();
    let var_fixed = marginal.iter().map(|v| (v - mean_fixed).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let var_random = t2 * sigma2;
    let total = var_fixed + var_random + sigma2;
    let r_squared = var_fixed / total;
    let conditional_r_squared = (var_fixed + var_random) / total;

    let criterion = fit.criterion;
    info!(
        "{name}: θ={theta:.4e}, σ_b={:.4e}, σ={:.4e}, REML={criterion:.3}",
        group_variance.sqrt(),
        sigma2.sqrt()
    );

    Ok(FittedModel {
        name: name.to_string(),
        kind: ModelKind::Mixed(variant),
        predictors: predictors.to_vec(),
        coefficients,
        n_obs: n,
        df_residual: n - p,
        residual_std_error: sigma2.sqrt(),
        rss,
        r_squared,
        adj_r_squared: None,
        f_statistic: None,
        f_p_value: None,
        level_counts: design.level_counts.clone(),
        absent_levels: design.absent_levels.clone(),
        random_effects: Some(RandomEffects {
            grouping: Field::ReleaseMonth,
            term,
            group_variance,
            group_std_dev: group_variance.sqrt(),
            residual_variance: sigma2,
            reml_criterion: criterion,
            conditional_r_squared,
            evaluations,
            groups,
        }),
        warnings,
        fitted,
        residuals,
        rows: design.rows.clone(),
    })
}

/// Fit one variant of `response ~ predictors + (term | release_month)` on the
/// rows of `dataset` complete for every field involved.
#[allow(clippy::too_many_arguments)]
pub fn fit_variant(
    name: &str,
    dataset: &Dataset,
    response: Field,
    predictors: &[Predictor],
    variant: MixedVariant,
    leveling: &Leveling,
    confidence: f64,
    config: &MixedConfig,
) -> Result<FittedModel> {
    let slope_predictor = config.slope_predictor;
    if variant == MixedVariant::RandomSlope && slope_predictor.is_categorical() {
        return Err(PipelineError::InvalidModel {
            model: name.to_string(),
            reason: format!("random slope on categorical `{slope_predictor}`"),
        });
    }

    let mut required = predictors.to_vec();
    required.push(Predictor::ReleaseMonth);
    if variant == MixedVariant::RandomSlope {
        required.push(slope_predictor);
    }
    let rows = complete_rows(dataset, response, &required);
    let design = Design::build(dataset, &rows, response, predictors, leveling);

    let films: Vec<_> = design.rows.iter().map(|&i| &dataset.films[i]).collect();
    let months: Vec<usize> = films
        .iter()
        .map(|f| f.release_month.map(|m| m.number_from_month() as usize - 1).unwrap_or(0))
        .collect();
    let slope_values: Vec<f64> = films
        .iter()
        .map(|f| f.numeric(slope_predictor.field()).unwrap_or(0.0))
        .collect();

    fit_mixed(
        name,
        &design,
        predictors,
        variant,
        &months,
        Some((slope_predictor.name(), &slope_values)),
        confidence,
        config,
    )
}
