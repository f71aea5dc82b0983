//! Logistic regression by maximum likelihood, with post-fit diagnostics.
//!
//! Fitting goes through two steps. [`ModelFrame::new`] drops incomplete cases one predictor at
//! a time, recording how many rows each predictor removed, and [`fit`] runs Newton-Raphson on
//! what remains. Numerical trouble (separation, a singular information matrix, no convergence)
//! is reported as [`FitOutcome::Failed`].
use crate::{linalg, Result};
use ndarray::{Array1, Array2, Axis};
use qu::ick_use::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::{fmt, iter};
use term_data_table as tdt;

pub const MAX_ITERATIONS: usize = 35;
/// Convergence tolerance on the largest parameter change of a Newton step.
pub const TOLERANCE: f64 = 1e-8;
pub const VIF_THRESHOLD: f64 = 5.;
/// Pearson residuals beyond this (in absolute value) are outliers.
pub const OUTLIER_THRESHOLD: f64 = 2.5;
/// Minimum observations per predictor.
pub const MIN_EVENTS_PER_VARIABLE: usize = 10;
/// Observations per predictor for a comfortably sized sample.
pub const CONSERVATIVE_EVENTS_PER_VARIABLE: usize = 20;
/// Name of the intercept term.
pub const INTERCEPT: &str = "const";

const Z_95: f64 = 1.96;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionStep {
    /// The predictor whose missing values were dropped in this step.
    pub variable: String,
    pub dropped: usize,
    pub remaining: usize,
    /// Rows lost since the starting population.
    pub cumulative_excluded: usize,
}

/// The complete cases of an outcome and a set of predictors.
#[derive(Debug, Clone, Serialize)]
pub struct ModelFrame {
    pub names: Vec<String>,
    /// Rows with an outcome value.
    pub starting: usize,
    pub steps: Vec<ExclusionStep>,
    /// Input positions of the rows that were kept.
    pub rows: Vec<usize>,
    #[serde(skip)]
    outcome: Array1<f64>,
    #[serde(skip)]
    predictors: Array2<f64>,
}

impl ModelFrame {
    /// Build the frame from index-aligned columns.
    ///
    /// All columns must have the length of `outcome`, and present outcome values must be 0 or 1.
    pub fn new(outcome: &[Option<f64>], predictors: &[(&str, Vec<Option<f64>>)]) -> Result<Self> {
        for (name, values) in predictors {
            ensure!(
                values.len() == outcome.len(),
                "predictor {} has {} values, outcome has {}",
                name,
                values.len(),
                outcome.len()
            );
        }
        if let Some(bad) = outcome.iter().flatten().find(|v| **v != 0. && **v != 1.) {
            bail!("outcome values must be 0 or 1, found {}", bad);
        }

        let mut keep = outcome.iter().map(Option::is_some).collect::<Vec<_>>();
        let starting = keep.iter().filter(|k| **k).count();
        let mut remaining = starting;
        let mut steps = Vec::with_capacity(predictors.len());
        for (name, values) in predictors {
            for (keep, value) in keep.iter_mut().zip(values) {
                *keep &= value.is_some();
            }
            let now = keep.iter().filter(|k| **k).count();
            steps.push(ExclusionStep {
                variable: name.to_string(),
                dropped: remaining - now,
                remaining: now,
                cumulative_excluded: starting - now,
            });
            remaining = now;
        }

        let rows = keep
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect::<Vec<_>>();
        let outcome = rows
            .iter()
            .map(|idx| outcome[*idx].unwrap_or_default())
            .collect::<Array1<_>>();
        let predictors = Array2::from_shape_fn((rows.len(), predictors.len()), |(i, j)| {
            predictors[j].1[rows[i]].unwrap_or_default()
        });
        Ok(ModelFrame {
            names: steps.iter().map(|s| s.variable.clone()).collect(),
            starting,
            steps,
            rows,
            outcome,
            predictors,
        })
    }

    /// Number of complete cases.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn design(&self) -> Array2<f64> {
        let n = self.len();
        let mut design = Array2::ones((n, self.names.len() + 1));
        design
            .slice_mut(ndarray::s![.., 1..])
            .assign(&self.predictors);
        design
    }

    pub fn exclusion_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let mut table = Table::new()
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Step"))
                    .with_cell(Cell::from("Dropped"))
                    .with_cell(Cell::from("Remaining"))
                    .with_cell(Cell::from("Excluded so far")),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("with outcome"))
                    .with_cell(Cell::from(""))
                    .with_cell(Cell::from(self.starting.to_string()))
                    .with_cell(Cell::from("0")),
            );
        for step in &self.steps {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(format!("complete {}", step.variable)))
                    .with_cell(Cell::from(step.dropped.to_string()))
                    .with_cell(Cell::from(step.remaining.to_string()))
                    .with_cell(Cell::from(step.cumulative_excluded.to_string())),
            );
        }
        table
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub coefficient: f64,
    pub std_error: f64,
    pub z: f64,
    pub p_value: f64,
    pub odds_ratio: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub significant: bool,
}

impl Coefficient {
    /// Change in the odds per unit increase of the predictor, in percent.
    pub fn odds_change_percent(&self) -> f64 {
        (self.odds_ratio - 1.) * 100.
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionResult {
    /// The intercept comes first.
    pub coefficients: Vec<Coefficient>,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    /// McFadden's pseudo R².
    pub pseudo_r_squared: f64,
    pub n: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogisticFit {
    pub result: RegressionResult,
    rows: Vec<usize>,
    predictor_names: Vec<String>,
    #[serde(skip)]
    design: Array2<f64>,
    #[serde(skip)]
    outcome: Array1<f64>,
    #[serde(skip)]
    fitted: Array1<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    Fitted(LogisticFit),
    Failed { error: String, n: usize },
}

impl FitOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, FitOutcome::Fitted(_))
    }

    pub fn fitted(&self) -> Option<&LogisticFit> {
        match self {
            FitOutcome::Fitted(fit) => Some(fit),
            FitOutcome::Failed { .. } => None,
        }
    }

    fn failed(error: impl fmt::Display, n: usize) -> Self {
        let error = error.to_string();
        event!(Level::WARN, "logistic regression failed on {} rows: {}", n, error);
        FitOutcome::Failed { error, n }
    }
}

fn sigmoid(eta: f64) -> f64 {
    if eta >= 0. {
        1. / (1. + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1. + e)
    }
}

/// `ln(1 + e^eta)` without overflow.
fn softplus(eta: f64) -> f64 {
    if eta > 0. {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}

/// Fit the outcome on an intercept plus the frame's predictors.
pub fn fit(frame: &ModelFrame) -> FitOutcome {
    let n = frame.len();
    let x = frame.design();
    let y = &frame.outcome;
    let k = x.ncols();

    let events = y.iter().filter(|v| **v == 1.).count();
    if events == 0 || events == n {
        return FitOutcome::failed("outcome has a single class", n);
    }
    if n <= k {
        return FitOutcome::failed(
            format!("{} observations for {} parameters", n, k),
            n,
        );
    }

    let mut beta = Array1::<f64>::zeros(k);
    let mut iterations = 0;
    let mut converged = false;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let p = x.dot(&beta).mapv(sigmoid);
        if p.iter().zip(y).all(|(p, y)| (p - y).abs() < 1e-6) {
            return FitOutcome::failed("perfect separation detected", n);
        }
        let gradient = x.t().dot(&(y - &p));
        let information = information_matrix(&x, &p);
        let step = match linalg::solve(&information, &gradient) {
            Ok(step) => step,
            Err(e) => return FitOutcome::failed(format!("iteration {}: {}", iterations, e), n),
        };
        beta += &step;
        if !beta.iter().all(|b| b.is_finite()) {
            return FitOutcome::failed("coefficients diverged", n);
        }
        if step.iter().all(|s| s.abs() < TOLERANCE) {
            converged = true;
            break;
        }
    }
    if !converged {
        return FitOutcome::failed(
            format!("no convergence after {} iterations", MAX_ITERATIONS),
            n,
        );
    }

    let eta = x.dot(&beta);
    let fitted = eta.mapv(sigmoid);
    let covariance = match linalg::invert(&information_matrix(&x, &fitted)) {
        Ok(cov) => cov,
        Err(e) => return FitOutcome::failed(format!("covariance: {}", e), n),
    };

    let log_likelihood = eta
        .iter()
        .zip(y)
        .map(|(eta, y)| y * eta - softplus(*eta))
        .sum::<f64>();
    let mean = events as f64 / n as f64;
    let null_log_likelihood =
        events as f64 * mean.ln() + (n - events) as f64 * (1. - mean).ln();

    let normal = match Normal::new(0., 1.) {
        Ok(normal) => normal,
        Err(e) => return FitOutcome::failed(e, n),
    };
    let names = iter::once(INTERCEPT.to_string()).chain(frame.names.iter().cloned());
    let coefficients = names
        .zip(beta.iter())
        .zip(covariance.diag())
        .map(|((name, b), var)| {
            let std_error = var.sqrt();
            let z = b / std_error;
            let p_value = 2. * (1. - normal.cdf(z.abs()));
            Coefficient {
                name,
                coefficient: *b,
                std_error,
                z,
                p_value,
                odds_ratio: b.exp(),
                ci_lower: (b - Z_95 * std_error).exp(),
                ci_upper: (b + Z_95 * std_error).exp(),
                significant: p_value < crate::stats::ALPHA,
            }
        })
        .collect();

    let k = k as f64;
    let result = RegressionResult {
        coefficients,
        log_likelihood,
        null_log_likelihood,
        aic: -2. * log_likelihood + 2. * k,
        bic: -2. * log_likelihood + k * (n as f64).ln(),
        pseudo_r_squared: 1. - log_likelihood / null_log_likelihood,
        n,
        iterations,
    };
    event!(
        Level::INFO,
        "logistic regression converged after {} iterations (n = {}, pseudo R² = {:.4})",
        iterations,
        n,
        result.pseudo_r_squared
    );
    FitOutcome::Fitted(LogisticFit {
        result,
        rows: frame.rows.clone(),
        predictor_names: frame.names.clone(),
        design: x,
        outcome: y.clone(),
        fitted,
    })
}

/// `X' W X` with `W = diag(p (1 - p))`.
fn information_matrix(x: &Array2<f64>, p: &Array1<f64>) -> Array2<f64> {
    let weights = p.mapv(|p| p * (1. - p));
    let weighted = x * &weights.insert_axis(Axis(1));
    x.t().dot(&weighted)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vif {
    pub variable: String,
    pub vif: f64,
    pub high: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub enum Adequacy {
    /// At least 20 observations per predictor.
    Adequate,
    /// At least 10 observations per predictor.
    Marginal,
    Insufficient,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct SampleSizeCheck {
    pub n: usize,
    pub predictors: usize,
    pub minimum: usize,
    pub conservative: usize,
    pub adequacy: Adequacy,
}

impl SampleSizeCheck {
    pub fn new(n: usize, predictors: usize) -> Self {
        let minimum = predictors * MIN_EVENTS_PER_VARIABLE;
        let conservative = predictors * CONSERVATIVE_EVENTS_PER_VARIABLE;
        let adequacy = if n >= conservative {
            Adequacy::Adequate
        } else if n >= minimum {
            Adequacy::Marginal
        } else {
            Adequacy::Insufficient
        };
        SampleSizeCheck {
            n,
            predictors,
            minimum,
            conservative,
            adequacy,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Residual {
    /// Input position of the observation (see [`ModelFrame::rows`]).
    pub row: usize,
    pub predicted: f64,
    pub pearson: f64,
    pub outlier: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub vif: Vec<Vif>,
    pub multicollinearity: bool,
    pub sample_size: SampleSizeCheck,
    pub residuals: Vec<Residual>,
    pub outlier_count: usize,
}

impl LogisticFit {
    pub fn diagnostics(&self) -> Diagnostics {
        let vif = iter::once(INTERCEPT)
            .chain(self.predictor_names.iter().map(String::as_str))
            .enumerate()
            .map(|(idx, name)| {
                let vif = variance_inflation(&self.design, idx);
                Vif {
                    variable: name.to_owned(),
                    vif,
                    high: vif > VIF_THRESHOLD,
                }
            })
            .collect::<Vec<_>>();
        let residuals = self
            .rows
            .iter()
            .zip(self.outcome.iter().zip(self.fitted.iter()))
            .map(|(row, (y, p))| {
                let pearson = (y - p) / (p * (1. - p)).sqrt();
                Residual {
                    row: *row,
                    predicted: *p,
                    pearson,
                    outlier: pearson.abs() > OUTLIER_THRESHOLD,
                }
            })
            .collect::<Vec<_>>();
        let diagnostics = Diagnostics {
            multicollinearity: vif.iter().any(|v| v.high),
            vif,
            sample_size: SampleSizeCheck::new(self.result.n, self.predictor_names.len()),
            outlier_count: residuals.iter().filter(|r| r.outlier).count(),
            residuals,
        };
        if diagnostics.multicollinearity {
            event!(Level::WARN, "high VIF detected, possible multicollinearity");
        }
        diagnostics
    }

    pub fn term_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Variable"))
                .with_cell(Cell::from("Coef."))
                .with_cell(Cell::from("SE"))
                .with_cell(Cell::from("p"))
                .with_cell(Cell::from("OR"))
                .with_cell(Cell::from("95% CI"))
                .with_cell(Cell::from("Odds change")),
        );
        for c in &self.result.coefficients {
            let change = if c.name == INTERCEPT {
                String::new()
            } else {
                format!("{:+.1}%", c.odds_change_percent())
            };
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(c.name.clone()))
                    .with_cell(Cell::from(format!("{:.4}", c.coefficient)))
                    .with_cell(Cell::from(format!("{:.4}", c.std_error)))
                    .with_cell(Cell::from(format!(
                        "{:.4}{}",
                        c.p_value,
                        if c.significant { " *" } else { "" }
                    )))
                    .with_cell(Cell::from(format!("{:.4}", c.odds_ratio)))
                    .with_cell(Cell::from(format!("[{:.4}, {:.4}]", c.ci_lower, c.ci_upper)))
                    .with_cell(Cell::from(change)),
            );
        }
        let r = &self.result;
        table.add_row(Row::new().with_cell(Cell::from(format!(
            "n = {}, log-likelihood = {:.4} (null {:.4}), AIC = {:.4}, BIC = {:.4}, \
             pseudo R² = {:.4}, {} iterations",
            r.n, r.log_likelihood, r.null_log_likelihood, r.aic, r.bic, r.pseudo_r_squared, r.iterations
        ))));
        table
    }
}

/// VIF of column `idx` of the design: `1 / (1 - R²)` of that column regressed on the others.
///
/// R² is centered when the other columns include a constant. Perfect collinearity gives
/// infinity.
fn variance_inflation(design: &Array2<f64>, idx: usize) -> f64 {
    let target = design.column(idx);
    let others = design.select(
        Axis(1),
        &(0..design.ncols()).filter(|j| *j != idx).collect::<Vec<_>>(),
    );
    let has_constant = others.columns().into_iter().any(|col| {
        let first = col[0];
        first != 0. && col.iter().all(|v| *v == first)
    });
    match linalg::r_squared(target, &others, has_constant) {
        Ok(r2) if r2 < 1. => 1. / (1. - r2),
        _ => f64::INFINITY,
    }
}

impl Diagnostics {
    pub fn term_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Check"))
                .with_cell(Cell::from("Result")),
        );
        for v in &self.vif {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(format!("VIF {}", v.variable)))
                    .with_cell(Cell::from(format!(
                        "{:.2}{}",
                        v.vif,
                        if v.high { " (high)" } else { "" }
                    ))),
            );
        }
        let s = &self.sample_size;
        table.add_row(
            Row::new()
                .with_cell(Cell::from("Sample size"))
                .with_cell(Cell::from(format!(
                    "{} for {} predictors (minimum {}, conservative {}): {:?}",
                    s.n, s.predictors, s.minimum, s.conservative, s.adequacy
                ))),
        );
        table.add_row(
            Row::new()
                .with_cell(Cell::from(format!(
                    "Outliers (|Pearson residual| > {})",
                    OUTLIER_THRESHOLD
                )))
                .with_cell(Cell::from(self.outlier_count.to_string())),
        );
        table
    }
}
