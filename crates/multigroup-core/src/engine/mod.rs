// =============================================================================
// Statistics Engines
// =============================================================================
//
// The library treats model estimation as a black box behind the
// `StatisticsEngine` trait: given a model specification, a dataset and a set
// of directives, an engine returns a `FittedModel` exposing parameter
// estimates and named fit statistics, or an error.
//
// Two engines ship with the crate:
//
//   - OlsEngine:      frequentist linear regression, fitted in-process.
//   - RecordedEngine: replays results exported from an external SEM engine
//                     (lavaan, Mplus, ...) so that per-group and invariance
//                     reports can be built from them.
//
// ENGINE CONTRACT:
// ----------------
//   - A model that could not be estimated is either an Err(ConvergenceFailure)
//     or a FittedModel with `converged == false`. The fitter treats both the
//     same way.
//   - Statistics are reported under the closed `FitStatistic` key set. A
//     statistic the engine cannot compute is simply absent.
//   - Engines must be Send + Sync: independent groups may be fitted in
//     parallel, and a fit may run on a watchdog thread when a timeout is set.
//
// =============================================================================

mod linalg;
pub mod ols;
pub mod recorded;

pub use ols::OlsEngine;
pub use recorded::RecordedEngine;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::data::Dataset;
use crate::error::Result;
use crate::model::{ConstraintLevel, ModelSpec};
use crate::stats::indices;
use crate::stats::FitStatistic;

/// What to fit, beyond the model and the data.
#[derive(Debug, Clone, PartialEq)]
pub struct FitDirectives {
    /// Cross-group equality constraints; `None` for an independent
    /// single-group fit.
    pub constraint: Option<ConstraintLevel>,
    /// Column holding group membership in a multi-group fit.
    pub group_attribute: Option<String>,
    pub config: EngineConfig,
}

impl FitDirectives {
    /// An independent fit of one subgroup.
    pub fn single_group(config: EngineConfig) -> Self {
        Self {
            constraint: None,
            group_attribute: None,
            config,
        }
    }

    /// One level of a nested multi-group comparison on the full dataset.
    pub fn nested(
        level: ConstraintLevel,
        group_attribute: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            constraint: Some(level),
            group_attribute: Some(group_attribute.into()),
            config,
        }
    }
}

/// One estimated parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// Test statistic (t or z) for H0: parameter = 0.
    pub statistic: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// The result of one engine invocation.
///
/// Opaque to the pipeline apart from `statistic()`, the convergence flag and
/// the parameter table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedModel {
    engine: String,
    n_obs: usize,
    converged: bool,
    message: Option<String>,
    estimates: Vec<ParameterEstimate>,
    statistics: BTreeMap<FitStatistic, f64>,
}

impl FittedModel {
    pub fn new(engine: impl Into<String>, n_obs: usize) -> Self {
        Self {
            engine: engine.into(),
            n_obs,
            converged: true,
            message: None,
            estimates: Vec::new(),
            statistics: BTreeMap::new(),
        }
    }

    /// Mark the result as not converged, with the engine's explanation.
    pub fn not_converged(mut self, message: impl Into<String>) -> Self {
        self.converged = false;
        self.message = Some(message.into());
        self
    }

    pub fn with_statistic(mut self, stat: FitStatistic, value: f64) -> Self {
        self.statistics.insert(stat, value);
        self
    }

    pub fn with_estimate(mut self, estimate: ParameterEstimate) -> Self {
        self.estimates.push(estimate);
        self
    }

    /// Fill in p-value, CFI, TLI and RMSEA from the model and baseline
    /// chi-square tests, where the engine did not report them itself.
    ///
    /// Needs chisq, df, baseline.chisq and baseline.df; does nothing
    /// otherwise. Indices that are undefined for the fit (df = 0 for the
    /// p-value or TLI) stay absent.
    pub fn with_derived_indices(mut self, n_groups: usize) -> Self {
        let get = |s: FitStatistic| self.statistics.get(&s).copied();
        let (Some(chisq), Some(df)) = (get(FitStatistic::ChiSquare), get(FitStatistic::Df)) else {
            return self;
        };
        let baseline = get(FitStatistic::BaselineChiSquare).zip(get(FitStatistic::BaselineDf));

        let mut derived = vec![
            (FitStatistic::PValue, indices::chisq_pvalue(chisq, df)),
            (
                FitStatistic::Rmsea,
                indices::rmsea(chisq, df, self.n_obs as f64, n_groups),
            ),
        ];
        if let Some((b_chisq, b_df)) = baseline {
            derived.push((FitStatistic::Cfi, indices::cfi(chisq, df, b_chisq, b_df)));
            derived.push((FitStatistic::Tli, indices::tli(chisq, df, b_chisq, b_df)));
        }
        for (stat, value) in derived.into_iter().filter(|(_, v)| v.is_finite()) {
            self.statistics.entry(stat).or_insert(value);
        }
        self
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn estimates(&self) -> &[ParameterEstimate] {
        &self.estimates
    }

    pub fn estimate(&self, name: &str) -> Option<&ParameterEstimate> {
        self.estimates.iter().find(|e| e.name == name)
    }

    pub fn statistic(&self, stat: FitStatistic) -> Option<f64> {
        self.statistics.get(&stat).copied()
    }

    /// All reported statistics in canonical order.
    pub fn statistics(&self) -> impl Iterator<Item = (FitStatistic, f64)> + '_ {
        self.statistics.iter().map(|(k, v)| (*k, *v))
    }
}

/// An external (or built-in) estimation backend.
pub trait StatisticsEngine: Send + Sync {
    /// Short identifier used in logs and results.
    fn name(&self) -> &str;

    /// Fit `spec` to `data`.
    ///
    /// `label` names the group or level being fitted and is used in error
    /// messages (and by engines that look results up by name).
    fn fit(
        &self,
        label: &str,
        spec: &ModelSpec,
        data: &Dataset,
        directives: &FitDirectives,
    ) -> Result<FittedModel>;
}
