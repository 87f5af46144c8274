// =============================================================================
// Configuration
// =============================================================================
//
// There are no session-wide options. Everything an engine needs to know about
// HOW to estimate (estimator, parameterization, identification) travels in an
// `EngineConfig` value inside every `FitDirectives`, and everything the
// pipeline needs (which statistics, time limits, parallelism, the invariance
// criterion) lives in a `PipelineConfig` owned by the fitter.
//
// Both derive serde so they can be stored next to an analysis as JSON.
//
// =============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::invariance::InvarianceCriterion;
use crate::stats::{FitStatistic, StatisticSet};

/// Estimation method requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Estimator {
    /// Ordinary least squares (linear regression).
    Ols,
    /// Normal-theory maximum likelihood.
    Ml,
    /// Maximum likelihood with robust (scaled) test statistics.
    Mlr,
    /// Diagonally weighted least squares with mean- and variance-adjusted tests,
    /// the usual choice for ordered-categorical indicators.
    Wlsmv,
}

impl Estimator {
    /// Robust estimators report the ".scaled" statistic variants.
    pub fn reports_scaled(self) -> bool {
        matches!(self, Estimator::Mlr | Estimator::Wlsmv)
    }
}

/// Scaling of latent responses for ordered indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameterization {
    Delta,
    Theta,
}

/// How latent variable scales are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identification {
    /// First loading of each factor fixed to 1.
    MarkerVariable,
    /// Factor variances fixed to 1.
    FixedFactorVariance,
}

/// Estimation settings passed to every engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default: OLS
    pub estimator: Estimator,
    /// Default: delta
    pub parameterization: Parameterization,
    /// Default: marker variable
    pub identification: Identification,
    /// Treat indicators as ordered categories (thresholds instead of intercepts).
    /// Default: false
    pub ordered: bool,
    /// Coverage of coefficient confidence intervals.
    /// Default: 0.95
    pub confidence_level: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            estimator: Estimator::Ols,
            parameterization: Parameterization::Delta,
            identification: Identification::MarkerVariable,
            ordered: false,
            confidence_level: 0.95,
        }
    }
}

impl EngineConfig {
    /// Settings for ordered-categorical factor models.
    pub fn ordinal_cfa() -> Self {
        Self {
            estimator: Estimator::Wlsmv,
            ordered: true,
            ..Self::default()
        }
    }
}

/// Settings for a whole analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Statistics extracted from every fitted result, in column order.
    /// Default: the factor-model set (chisq, df, pvalue, rmsea + CI, tli, cfi)
    pub statistics: StatisticSet,

    /// Per-fit time limit. A fit that runs longer is reported as a
    /// recoverable failure for that group.
    /// Default: none
    #[serde(with = "optional_seconds")]
    pub fit_timeout: Option<Duration>,

    /// Fit independent groups on the rayon thread pool.
    /// Default: false
    pub parallel: bool,

    /// Statistics for which successive-row differences are computed in
    /// nested comparisons.
    /// Default: [cfi]
    pub delta_statistics: Vec<FitStatistic>,

    /// Rule applied when reading an invariance table.
    /// Default: ΔCFI no worse than −0.010
    pub criterion: InvarianceCriterion,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            statistics: StatisticSet::cfa(),
            fit_timeout: None,
            parallel: false,
            delta_statistics: vec![FitStatistic::Cfi],
            criterion: InvarianceCriterion::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from JSON; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

mod optional_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        match secs {
            Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(serde::de::Error::custom(format!(
                "fit_timeout must be a non-negative number of seconds, got {s}"
            ))),
            None => Ok(None),
        }
    }
}
