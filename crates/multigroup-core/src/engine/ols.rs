// =============================================================================
// Ordinary Least Squares Engine
// =============================================================================
//
// Fits `y ~ x1 + x2 + C(g)` style regressions in-process. This is the engine
// behind the per-group regression reports: one independent fit per
// demographic subgroup, then a side-by-side table of R², F tests and
// information criteria.
//
// DESIGN MATRIX:
// --------------
//   - Rows with a missing value on any model variable are dropped (listwise).
//   - Numeric predictors enter as-is.
//   - Categorical predictors are treatment coded. Levels are sorted and the
//     first one is the reference. Without an intercept the first categorical
//     predictor keeps all of its levels.
//
// REPORTED STATISTICS (regression report names):
// ----------------------------------------------
//   r.squared, adj.r.squared, sigma, statistic (F), p.value, df, df.residual,
//   logLik, AIC, BIC, deviance (residual sum of squares), nobs
//
// The overall F test is only reported when the model has predictors.
//
// WHEN A GROUP CANNOT BE FITTED:
// ------------------------------
// No complete rows, no more rows than coefficients, a categorical predictor
// observed at a single level, or a singular X'X: all are reported as a
// ConvergenceFailure for that group, so a batch carries on with the others.
//
// =============================================================================

use std::f64::consts::PI;

use ndarray::{Array1, Array2};

use super::linalg::solve_least_squares;
use super::{FitDirectives, FittedModel, ParameterEstimate, StatisticsEngine};
use crate::config::Estimator;
use crate::data::{Dataset, Value};
use crate::error::{MultiGroupError, Result};
use crate::model::{ModelSpec, RegressionSpec, Term};
use crate::stats::inference::{confidence_interval_t, pvalue_f, pvalue_t};
use crate::stats::FitStatistic;

/// Built-in linear regression engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct OlsEngine;

enum Cell {
    Number(f64),
    Level(String),
}

struct Design {
    y: Array1<f64>,
    x: Array2<f64>,
    names: Vec<String>,
}

/// Collect complete cases and build the treatment-coded design matrix.
fn build_design(label: &str, spec: &RegressionSpec, data: &Dataset) -> Result<Design> {
    let variables =
        std::iter::once(spec.response.as_str()).chain(spec.terms.iter().map(Term::variable));
    for var in variables {
        if !data.has_column(var) {
            return Err(MultiGroupError::InvalidValue(format!(
                "model variable '{var}' is not in the data"
            )));
        }
    }

    // -------------------------------------------------------------------------
    // Complete cases
    // -------------------------------------------------------------------------
    let mut responses: Vec<f64> = Vec::new();
    let mut cells: Vec<Vec<Cell>> = Vec::new();

    'rows: for row in 0..data.len() {
        let y = match data.value(row, &spec.response) {
            Value::Number(v) => *v,
            Value::Missing => continue,
            Value::Category(s) => {
                return Err(MultiGroupError::InvalidValue(format!(
                    "response '{}' must be numeric, found '{s}'",
                    spec.response
                )))
            }
        };
        let mut row_cells = Vec::with_capacity(spec.terms.len());
        for term in &spec.terms {
            let cell = match (term, data.value(row, term.variable())) {
                (_, Value::Missing) => continue 'rows,
                (Term::Numeric(_), Value::Number(v)) => Cell::Number(*v),
                (Term::Numeric(name), Value::Category(s)) => {
                    return Err(MultiGroupError::InvalidValue(format!(
                        "predictor '{name}' must be numeric, found '{s}'; \
                         use C({name}) for a categorical predictor"
                    )))
                }
                (Term::Categorical(_), v) => Cell::Level(v.to_string()),
            };
            row_cells.push(cell);
        }
        responses.push(y);
        cells.push(row_cells);
    }

    let n = responses.len();
    if n == 0 {
        return Err(MultiGroupError::convergence(label, "no complete observations"));
    }

    // -------------------------------------------------------------------------
    // Columns
    // -------------------------------------------------------------------------
    // Each design column is (name, term index, Some(level) for a dummy).
    let mut columns: Vec<(String, Option<usize>, Option<String>)> = Vec::new();
    if spec.intercept {
        columns.push(("(Intercept)".to_string(), None, None));
    }
    let mut full_coding_used = spec.intercept;
    for (t, term) in spec.terms.iter().enumerate() {
        match term {
            Term::Numeric(name) => columns.push((name.clone(), Some(t), None)),
            Term::Categorical(name) => {
                let mut levels: Vec<String> = cells
                    .iter()
                    .filter_map(|r| match &r[t] {
                        Cell::Level(l) => Some(l.clone()),
                        Cell::Number(_) => None,
                    })
                    .collect();
                levels.sort();
                levels.dedup();
                if levels.len() < 2 {
                    return Err(MultiGroupError::convergence(
                        label,
                        format!("predictor '{name}' has a single observed level"),
                    ));
                }
                let skip = if full_coding_used { 1 } else { 0 };
                full_coding_used = true;
                for level in levels.into_iter().skip(skip) {
                    columns.push((format!("{name}{level}"), Some(t), Some(level)));
                }
            }
        }
    }

    let p = columns.len();
    let mut values = Vec::with_capacity(n * p);
    for row in &cells {
        for (_, term, level) in &columns {
            let v = match (term, level) {
                (None, _) => 1.0,
                (Some(t), None) => match &row[*t] {
                    Cell::Number(v) => *v,
                    Cell::Level(_) => 0.0,
                },
                (Some(t), Some(level)) => match &row[*t] {
                    Cell::Level(l) if l == level => 1.0,
                    _ => 0.0,
                },
            };
            values.push(v);
        }
    }
    let x = Array2::from_shape_vec((n, p), values)
        .map_err(|e| MultiGroupError::DimensionMismatch(e.to_string()))?;

    Ok(Design {
        y: Array1::from_vec(responses),
        x,
        names: columns.into_iter().map(|(name, _, _)| name).collect(),
    })
}

impl OlsEngine {
    fn fit_regression(
        &self,
        label: &str,
        spec: &RegressionSpec,
        data: &Dataset,
        directives: &FitDirectives,
    ) -> Result<FittedModel> {
        let Design { y, x, names } = build_design(label, spec, data)?;
        let n = y.len();
        let p = x.ncols();

        if n <= p {
            return Err(MultiGroupError::convergence(
                label,
                format!("{n} complete observations for {p} coefficients"),
            ));
        }

        let (beta, xtx_inv) = match solve_least_squares(&x, &y) {
            Ok(solution) => solution,
            Err(MultiGroupError::LinearAlgebraError(msg)) => {
                return Err(MultiGroupError::convergence(label, msg))
            }
            Err(e) => return Err(e),
        };

        // ---------------------------------------------------------------------
        // Model-level statistics
        // ---------------------------------------------------------------------
        let resid = &y - &x.dot(&beta);
        let rss = resid.dot(&resid);
        let df_int = usize::from(spec.intercept);
        let tss = if spec.intercept {
            let mean = y.mean().unwrap_or(0.0);
            y.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        } else {
            y.dot(&y)
        };
        let df_model = p - df_int;
        let df_resid = n - p;
        let nf = n as f64;
        let sigma2 = rss / df_resid as f64;
        let r_squared = 1.0 - rss / tss;
        let adj_r_squared = 1.0 - (1.0 - r_squared) * ((n - df_int) as f64 / df_resid as f64);

        // Gaussian log-likelihood at the ML variance estimate rss / n
        let log_lik = -0.5 * nf * ((2.0 * PI).ln() + 1.0 - nf.ln() + rss.ln());
        let k = (p + 1) as f64; // coefficients + residual variance

        let mut model = FittedModel::new("ols", n)
            .with_statistic(FitStatistic::RSquared, r_squared)
            .with_statistic(FitStatistic::AdjRSquared, adj_r_squared)
            .with_statistic(FitStatistic::Sigma, sigma2.sqrt())
            .with_statistic(FitStatistic::Df, df_model as f64)
            .with_statistic(FitStatistic::DfResidual, df_resid as f64)
            .with_statistic(FitStatistic::LogLik, log_lik)
            .with_statistic(FitStatistic::Aic, -2.0 * log_lik + 2.0 * k)
            .with_statistic(FitStatistic::Bic, -2.0 * log_lik + nf.ln() * k)
            .with_statistic(FitStatistic::Deviance, rss)
            .with_statistic(FitStatistic::NObs, nf);

        if df_model > 0 {
            let f = ((tss - rss) / df_model as f64) / sigma2;
            model = model
                .with_statistic(FitStatistic::FStatistic, f)
                .with_statistic(
                    FitStatistic::FPValue,
                    pvalue_f(f, df_model as f64, df_resid as f64),
                );
        }

        // ---------------------------------------------------------------------
        // Coefficients
        // ---------------------------------------------------------------------
        let confidence = directives.config.confidence_level;
        for (j, name) in names.into_iter().enumerate() {
            let estimate = beta[j];
            let std_error = (sigma2 * xtx_inv[[j, j]]).sqrt();
            let t = estimate / std_error;
            let (ci_lower, ci_upper) =
                confidence_interval_t(estimate, std_error, df_resid as f64, confidence);
            model = model.with_estimate(ParameterEstimate {
                name,
                estimate,
                std_error,
                statistic: t,
                p_value: pvalue_t(t, df_resid as f64),
                ci_lower,
                ci_upper,
            });
        }

        Ok(model)
    }
}

impl StatisticsEngine for OlsEngine {
    fn name(&self) -> &str {
        "ols"
    }

    fn fit(
        &self,
        label: &str,
        spec: &ModelSpec,
        data: &Dataset,
        directives: &FitDirectives,
    ) -> Result<FittedModel> {
        if directives.config.estimator != Estimator::Ols {
            return Err(MultiGroupError::UnsupportedModel(format!(
                "the OLS engine cannot use the {:?} estimator",
                directives.config.estimator
            )));
        }
        if let Some(level) = directives.constraint {
            return Err(MultiGroupError::UnsupportedModel(format!(
                "the OLS engine fits independent groups only, not {level} constraints"
            )));
        }
        match spec {
            ModelSpec::Regression(reg) => self.fit_regression(label, reg, data, directives),
            ModelSpec::Measurement(_) => Err(MultiGroupError::UnsupportedModel(
                "the OLS engine cannot fit measurement models".to_string(),
            )),
        }
    }
}
