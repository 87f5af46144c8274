// =============================================================================
// Measurement Invariance Sequence
// =============================================================================
//
// Fits one model to the full dataset at three nested levels of cross-group
// equality constraints and tabulates them:
//
//     Unfit → Configural → Metric → Scalar
//
//   Configural: same structure in every group, all parameters free.
//   Metric:     loadings (and thresholds, for ordered indicators) equal.
//   Scalar:     intercepts equal as well.
//
// Levels are fitted strictly in order, each on the full dataset. A level that
// fails to fit ends the sequence: later levels are reported as not attempted,
// since a delta against a missing predecessor is meaningless.
//
// Whether invariance "holds" is NOT decided while fitting. Every level that
// can be fitted is fitted; `InvarianceCriterion::evaluate` reads the finished
// table afterwards.
//
// =============================================================================

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::aggregate::ComparisonTable;
use crate::data::Dataset;
use crate::engine::{FitDirectives, FittedModel};
use crate::error::{MultiGroupError, Result};
use crate::extract::extract;
use crate::fitter::{failure_reason, GroupFitter};
use crate::model::{ConstraintLevel, ModelSpec};
use crate::stats::indices::chisq_pvalue;
use crate::stats::FitStatistic;

/// Tolerance for comparing a delta against the threshold.
///
/// CFI values carry rounding noise; -0.010 computed as 0.96 - 0.97 must still
/// count as within a 0.010 threshold.
const THRESHOLD_TOLERANCE: f64 = 1e-12;

/// Progress through the nested sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum InvarianceState {
    Unfit,
    Configural,
    Metric,
    Scalar,
}

impl InvarianceState {
    /// The level fitted to reach this state.
    pub fn level(self) -> Option<ConstraintLevel> {
        match self {
            InvarianceState::Unfit => None,
            InvarianceState::Configural => Some(ConstraintLevel::Configural),
            InvarianceState::Metric => Some(ConstraintLevel::Metric),
            InvarianceState::Scalar => Some(ConstraintLevel::Scalar),
        }
    }

    /// The only level that may be fitted next.
    pub fn next_level(self) -> Option<ConstraintLevel> {
        match self.level() {
            None => Some(ConstraintLevel::Configural),
            Some(level) => level.next(),
        }
    }

    /// Move to `level` after it was fitted. Skipping or repeating a level is
    /// an error.
    pub fn advance(self, level: ConstraintLevel) -> Result<Self> {
        if self.next_level() != Some(level) {
            return Err(MultiGroupError::OutOfOrder {
                expected: self
                    .next_level()
                    .map_or_else(|| "no further level".to_string(), |l| l.to_string()),
                found: level.to_string(),
            });
        }
        Ok(match level {
            ConstraintLevel::Configural => InvarianceState::Configural,
            ConstraintLevel::Metric => InvarianceState::Metric,
            ConstraintLevel::Scalar => InvarianceState::Scalar,
        })
    }
}

/// Which way a statistic moves when fit gets worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// CFI, TLI
    Decrease,
    /// RMSEA, SRMR
    Increase,
}

/// Reading rule for an invariance table: invariance holds at a level when the
/// chosen statistic worsens by no more than `threshold` against the previous
/// level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvarianceCriterion {
    /// Default: cfi
    pub statistic: FitStatistic,
    /// Default: 0.010
    pub threshold: f64,
    /// Default: decrease
    pub worsens_when: Direction,
}

impl Default for InvarianceCriterion {
    fn default() -> Self {
        Self {
            statistic: FitStatistic::Cfi,
            threshold: 0.010,
            worsens_when: Direction::Decrease,
        }
    }
}

impl InvarianceCriterion {
    pub fn holds(&self, delta: f64) -> bool {
        match self.worsens_when {
            Direction::Decrease => delta >= -self.threshold - THRESHOLD_TOLERANCE,
            Direction::Increase => delta <= self.threshold + THRESHOLD_TOLERANCE,
        }
    }

    /// One decision per row. The first row has nothing to compare with, so
    /// its delta and decision are None.
    pub fn evaluate(&self, table: &ComparisonTable) -> Result<Vec<InvarianceDecision>> {
        let column = table
            .column(self.statistic)
            .ok_or_else(|| MultiGroupError::MissingStatistic {
                label: "comparison table".to_string(),
                statistic: self.statistic.name().to_string(),
            })?;

        Ok(table
            .labels()
            .enumerate()
            .map(|(i, label)| {
                let delta = i.checked_sub(1).map(|prev| column[i] - column[prev]);
                InvarianceDecision {
                    label: label.to_string(),
                    delta,
                    holds: delta.map(|d| self.holds(d)),
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvarianceDecision {
    pub label: String,
    pub delta: Option<f64>,
    pub holds: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LevelStatus {
    Fitted,
    Failed(String),
    NotAttempted,
}

/// Naive likelihood-ratio difference test between adjacent levels.
///
/// Robust estimators need a scaled difference test; this one uses the raw
/// chi-square values and is only exact for normal-theory ML.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquareDifference {
    pub level: ConstraintLevel,
    pub delta_chisq: f64,
    pub delta_df: f64,
    pub p_value: f64,
}

/// Δχ² of `current` against the less constrained `previous`.
///
/// None unless both models report chisq and df.
pub fn chi_square_difference(
    level: ConstraintLevel,
    previous: &FittedModel,
    current: &FittedModel,
) -> Option<ChiSquareDifference> {
    let (chisq0, df0) = (
        previous.statistic(FitStatistic::ChiSquare)?,
        previous.statistic(FitStatistic::Df)?,
    );
    let (chisq1, df1) = (
        current.statistic(FitStatistic::ChiSquare)?,
        current.statistic(FitStatistic::Df)?,
    );
    let delta_chisq = chisq1 - chisq0;
    let delta_df = df1 - df0;
    Some(ChiSquareDifference {
        level,
        delta_chisq,
        delta_df,
        p_value: chisq_pvalue(delta_chisq, delta_df),
    })
}

/// Everything produced by one run of the sequence.
#[derive(Debug, Clone)]
pub struct InvarianceOutcome {
    state: InvarianceState,
    levels: Vec<(ConstraintLevel, LevelStatus)>,
    models: Vec<(ConstraintLevel, FittedModel)>,
    table: ComparisonTable,
    decisions: Vec<InvarianceDecision>,
    chi_square_tests: Vec<ChiSquareDifference>,
}

impl InvarianceOutcome {
    /// Most constrained level successfully fitted.
    pub fn state(&self) -> InvarianceState {
        self.state
    }

    /// Status of every level, in nesting order.
    pub fn levels(&self) -> &[(ConstraintLevel, LevelStatus)] {
        &self.levels
    }

    pub fn model(&self, level: ConstraintLevel) -> Option<&FittedModel> {
        self.models.iter().find(|(l, _)| *l == level).map(|(_, m)| m)
    }

    /// Rows are the fitted levels, labelled by level name, with deltas.
    pub fn table(&self) -> &ComparisonTable {
        &self.table
    }

    pub fn decisions(&self) -> &[InvarianceDecision] {
        &self.decisions
    }

    pub fn chi_square_tests(&self) -> &[ChiSquareDifference] {
        &self.chi_square_tests
    }

    /// Most constrained level at which invariance holds: the configural
    /// level if fitted, extended while each following decision holds.
    pub fn supported_level(&self) -> Option<ConstraintLevel> {
        let mut supported = None;
        for (decision, (level, _)) in self.decisions.iter().zip(&self.models) {
            if decision.holds == Some(false) {
                break;
            }
            supported = Some(*level);
        }
        supported
    }
}

/// Fit the configural, metric and scalar models of `spec` across the groups
/// in `group_attribute`, and tabulate the fit statistics configured on
/// `fitter`.
///
/// A level that fails to converge (or times out) ends the sequence; the
/// outcome then covers the levels before it. Configuration errors are
/// returned as errors.
pub fn run_invariance(
    fitter: &GroupFitter,
    spec: &ModelSpec,
    data: &Dataset,
    group_attribute: &str,
) -> Result<InvarianceOutcome> {
    let n_groups = data.distinct_values(group_attribute)?.len();
    if n_groups < 2 {
        return Err(MultiGroupError::InvalidValue(format!(
            "invariance testing needs at least two groups in '{group_attribute}', found {n_groups}"
        )));
    }

    let config = fitter.config();
    let mut state = InvarianceState::Unfit;
    let mut table = ComparisonTable::with_schema(&config.statistics);
    let mut levels = Vec::with_capacity(ConstraintLevel::ALL.len());
    let mut models: Vec<(ConstraintLevel, FittedModel)> = Vec::new();
    let mut stopped = false;

    for level in ConstraintLevel::ALL {
        if stopped {
            levels.push((level, LevelStatus::NotAttempted));
            continue;
        }

        let directives =
            FitDirectives::nested(level, group_attribute, fitter.engine_config().clone());
        match fitter.fit_one(level.name(), spec, data, &directives) {
            Ok(model) => {
                let record = extract(level.name(), &model, &config.statistics)?;
                table = table.push(record)?;
                state = state.advance(level)?;
                levels.push((level, LevelStatus::Fitted));
                models.push((level, model));
            }
            Err(err) if err.is_recoverable() => {
                warn!("{} model failed; later levels not attempted: {}", level, err);
                levels.push((level, LevelStatus::Failed(failure_reason(&err))));
                stopped = true;
            }
            Err(err) => return Err(err),
        }
    }

    let table = table.with_deltas(&config.delta_statistics)?;
    let decisions = config.criterion.evaluate(&table)?;
    let chi_square_tests = models
        .windows(2)
        .filter_map(|pair| chi_square_difference(pair[1].0, &pair[0].1, &pair[1].1))
        .collect();

    info!(
        "invariance sequence over {} groups in '{}' reached {:?}",
        n_groups, group_attribute, state
    );

    Ok(InvarianceOutcome {
        state,
        levels,
        models,
        table,
        decisions,
        chi_square_tests,
    })
}
