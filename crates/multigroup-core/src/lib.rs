// =============================================================================
// Multi-Group Fit Comparison Library
// =============================================================================
//
// Fits one statistical model separately to subgroups of a dataset (or once
// per level of a nested measurement-invariance sequence), pulls a fixed set
// of fit statistics out of each result, and assembles them into comparison
// tables ready for presentation.
//
// STRUCTURE:
// ----------
//
//   - data:       Tabular datasets, CSV loading, group partitioning
//   - model:      Model syntax (regression formulas, factor models) and
//                 constraint levels
//   - stats:      The closed set of fit statistic keys, fit indices, p-values
//   - engine:     The StatisticsEngine seam plus the built-in engines
//   - fitter:     Runs an engine over groups, applying the failure policy
//   - extract:    Fitted result → Fit Record
//   - aggregate:  Fit Records → Comparison Table, deltas, wide/long pivots
//   - invariance: Configural → Metric → Scalar sequence and its reading
//   - format:     Comparison Table → display strings / Markdown
//   - config:     Engine and pipeline settings
//   - error:      Error types used throughout the library
//
// A TYPICAL RUN:
// --------------
//
//     let groups = partition_by(&data, &["race"])?;
//     let fitter = GroupFitter::new(Arc::new(OlsEngine), EngineConfig::default(), config);
//     let batch = fitter.fit_groups(&ModelSpec::parse("y ~ x + C(sex)")?, &groups)?;
//     let table = ComparisonTable::from_batch(&batch, &StatisticSet::regression())?;
//     println!("{}", TableFormat::default().render(&table));
//
// FOR MAINTAINERS:
// ----------------
// New engines implement `engine::StatisticsEngine`. New statistics must be
// added to `stats::FitStatistic`; the key set is closed on purpose so that a
// typo is a parse error, not an empty column.
//
// =============================================================================

pub mod aggregate;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fitter;
pub mod format;
pub mod invariance;
pub mod model;
pub mod stats;

pub use aggregate::{ComparisonRow, ComparisonTable, LongEntry, WideTable};
pub use config::{EngineConfig, Estimator, Identification, Parameterization, PipelineConfig};
pub use data::{partition, partition_by, Dataset, GroupRule, Partition, Selector, Value};
pub use engine::{
    FitDirectives, FittedModel, OlsEngine, ParameterEstimate, RecordedEngine, StatisticsEngine,
};
pub use error::{MultiGroupError, Result};
pub use extract::{extract, FitRecord, GroupRecord};
pub use fitter::{BatchOutcome, BatchSummary, GroupFitter, GroupOutcome};
pub use format::{DisplayTable, TableFormat};
pub use invariance::{
    chi_square_difference, run_invariance, ChiSquareDifference, Direction, InvarianceCriterion,
    InvarianceDecision, InvarianceOutcome, InvarianceState, LevelStatus,
};
pub use model::{ConstraintLevel, ModelSpec};
pub use stats::{FitStatistic, StatisticSet};
