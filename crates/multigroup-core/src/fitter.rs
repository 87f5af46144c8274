// =============================================================================
// Model Fitter
// =============================================================================
//
// Drives a `StatisticsEngine` over one dataset, a batch of independent
// groups, or (via the invariance module) a sequence of nested levels.
//
// FAILURE POLICY:
// ---------------
//   - A fit that does not converge, produces non-finite statistics, or runs
//     past the time limit is a failure of THAT group only. In a batch it is
//     recorded in place and the remaining groups are still fitted.
//   - An empty group never reaches the engine.
//   - Anything else (bad model syntax, unknown columns, an engine that cannot
//     fit this kind of model) is a configuration problem and aborts the batch.
//
// FOR MAINTAINERS:
// ----------------
// A timed-out fit runs on a detached thread. std offers no way to cancel it;
// it finishes in the background and its result is dropped.
//
// =============================================================================

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::{EngineConfig, PipelineConfig};
use crate::data::{Dataset, Partition};
use crate::engine::{FitDirectives, FittedModel, StatisticsEngine};
use crate::error::{MultiGroupError, Result};
use crate::extract::{extract, GroupRecord};
use crate::model::ModelSpec;
use crate::stats::StatisticSet;

/// Fits models through an engine, applying the pipeline's failure policy.
#[derive(Clone)]
pub struct GroupFitter {
    engine: Arc<dyn StatisticsEngine>,
    engine_config: EngineConfig,
    config: PipelineConfig,
}

impl fmt::Debug for GroupFitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupFitter")
            .field("engine", &self.engine.name())
            .field("engine_config", &self.engine_config)
            .field("config", &self.config)
            .finish()
    }
}

impl GroupFitter {
    pub fn new(
        engine: Arc<dyn StatisticsEngine>,
        engine_config: EngineConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            engine_config,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Fit one model and check the result is usable.
    pub fn fit_one(
        &self,
        label: &str,
        spec: &ModelSpec,
        data: &Dataset,
        directives: &FitDirectives,
    ) -> Result<FittedModel> {
        if data.is_empty() {
            return Err(MultiGroupError::convergence(label, "no observations"));
        }
        debug!(
            "fitting '{}' with engine '{}' ({} rows)",
            label,
            self.engine.name(),
            data.len()
        );

        let model = match self.config.fit_timeout {
            Some(limit) => self.fit_with_timeout(label, spec, data, directives, limit)?,
            None => self.engine.fit(label, spec, data, directives)?,
        };

        if !model.converged() {
            let reason = model.message().unwrap_or("engine reported non-convergence");
            return Err(MultiGroupError::convergence(label, reason));
        }
        if let Some((stat, value)) = model.statistics().find(|(_, v)| !v.is_finite()) {
            return Err(MultiGroupError::convergence(
                label,
                format!("statistic '{stat}' is not finite ({value})"),
            ));
        }
        Ok(model)
    }

    fn fit_with_timeout(
        &self,
        label: &str,
        spec: &ModelSpec,
        data: &Dataset,
        directives: &FitDirectives,
        limit: Duration,
    ) -> Result<FittedModel> {
        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(&self.engine);
        let owned_label = label.to_string();
        let spec = spec.clone();
        let data = data.clone();
        let directives = directives.clone();

        thread::Builder::new()
            .name(format!("fit-{label}"))
            .spawn(move || {
                let result = engine.fit(&owned_label, &spec, &data, &directives);
                // the receiver is gone if we already timed out
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!("fit of '{}' exceeded {:?}; abandoning it", label, limit);
                Err(MultiGroupError::Timeout {
                    label: label.to_string(),
                    limit,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(MultiGroupError::convergence(
                label,
                "engine thread stopped without a result",
            )),
        }
    }

    /// Fit `spec` independently to every group of `partition`.
    ///
    /// Output order follows the partition, also when fitting in parallel.
    pub fn fit_groups(&self, spec: &ModelSpec, partition: &Partition) -> Result<BatchOutcome> {
        let directives = FitDirectives::single_group(self.engine_config.clone());

        let fit = |(label, data): &(String, Dataset)| -> Result<(String, GroupOutcome)> {
            match self.fit_one(label, spec, data, &directives) {
                Ok(model) => Ok((label.clone(), GroupOutcome::Fitted(model))),
                Err(err) if err.is_recoverable() => {
                    warn!("group '{}' failed: {}", label, err);
                    Ok((label.clone(), GroupOutcome::Failed(err)))
                }
                Err(err) => Err(err),
            }
        };

        let entries = if self.config.parallel {
            partition.groups().par_iter().map(fit).collect::<Result<Vec<_>>>()?
        } else {
            partition.groups().iter().map(fit).collect::<Result<Vec<_>>>()?
        };

        let outcome = BatchOutcome { entries };
        info!("batch fit finished: {}", outcome.summary());
        Ok(outcome)
    }
}

/// Result of fitting one group.
#[derive(Debug)]
pub enum GroupOutcome {
    Fitted(FittedModel),
    Failed(MultiGroupError),
}

impl GroupOutcome {
    pub fn is_fitted(&self) -> bool {
        matches!(self, GroupOutcome::Fitted(_))
    }

    pub fn model(&self) -> Option<&FittedModel> {
        match self {
            GroupOutcome::Fitted(model) => Some(model),
            GroupOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&MultiGroupError> {
        match self {
            GroupOutcome::Fitted(_) => None,
            GroupOutcome::Failed(err) => Some(err),
        }
    }
}

/// Short human-readable reason for a group failure.
pub(crate) fn failure_reason(err: &MultiGroupError) -> String {
    match err {
        MultiGroupError::ConvergenceFailure { reason, .. } => reason.clone(),
        MultiGroupError::Timeout { limit, .. } => format!("timed out after {limit:?}"),
        other => other.to_string(),
    }
}

/// Per-group outcomes of a batch, in partition order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    entries: Vec<(String, GroupOutcome)>,
}

impl BatchOutcome {
    pub fn entries(&self) -> &[(String, GroupOutcome)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&GroupOutcome> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, o)| o)
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &FittedModel)> {
        self.entries
            .iter()
            .filter_map(|(label, outcome)| outcome.model().map(|m| (label.as_str(), m)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &MultiGroupError)> {
        self.entries
            .iter()
            .filter_map(|(label, outcome)| outcome.error().map(|e| (label.as_str(), e)))
    }

    pub fn summary(&self) -> BatchSummary {
        let failed_labels: Vec<String> =
            self.failures().map(|(label, _)| label.to_string()).collect();
        BatchSummary {
            succeeded: self.entries.len() - failed_labels.len(),
            failed: failed_labels.len(),
            failed_labels,
        }
    }

    /// Extract `stats` from every fitted group. Failed groups stay failed.
    ///
    /// A fitted group missing a requested statistic aborts the extraction.
    pub fn extract(&self, stats: &StatisticSet) -> Result<Vec<GroupRecord>> {
        self.entries
            .iter()
            .map(|(label, outcome)| match outcome {
                GroupOutcome::Fitted(model) => {
                    extract(label, model, stats).map(GroupRecord::Fitted)
                }
                GroupOutcome::Failed(err) => Ok(GroupRecord::Failed {
                    label: label.clone(),
                    reason: failure_reason(err),
                }),
            })
            .collect()
    }
}

/// Counts of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_labels: Vec<String>,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} groups fitted", self.succeeded, self.succeeded + self.failed)?;
        if !self.failed_labels.is_empty() {
            write!(f, "; failed: {}", self.failed_labels.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{partition, GroupRule, Value};
    use crate::stats::FitStatistic;

    /// Reports cfi = 1 - 1/n; fails on groups smaller than two rows.
    struct CountingEngine;

    impl StatisticsEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        fn fit(
            &self,
            label: &str,
            _: &ModelSpec,
            data: &Dataset,
            _: &FitDirectives,
        ) -> Result<FittedModel> {
            if data.len() < 2 {
                return Err(MultiGroupError::convergence(label, "too few observations"));
            }
            Ok(FittedModel::new("counting", data.len())
                .with_statistic(FitStatistic::Cfi, 1.0 - 1.0 / data.len() as f64))
        }
    }

    struct SleepyEngine;

    impl StatisticsEngine for SleepyEngine {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn fit(
            &self,
            _: &str,
            _: &ModelSpec,
            data: &Dataset,
            _: &FitDirectives,
        ) -> Result<FittedModel> {
            thread::sleep(Duration::from_millis(500));
            Ok(FittedModel::new("sleepy", data.len()))
        }
    }

    /// Stalls on group C only.
    struct SlowGroupEngine;

    impl StatisticsEngine for SlowGroupEngine {
        fn name(&self) -> &str {
            "slow-group"
        }

        fn fit(
            &self,
            label: &str,
            _: &ModelSpec,
            data: &Dataset,
            _: &FitDirectives,
        ) -> Result<FittedModel> {
            if label == "C" {
                thread::sleep(Duration::from_millis(800));
            }
            Ok(FittedModel::new("slow-group", data.len()).with_statistic(FitStatistic::Cfi, 0.95))
        }
    }

    fn spec() -> ModelSpec {
        ModelSpec::parse("y ~ x").unwrap()
    }

    fn data() -> Dataset {
        let rows = ["A", "A", "A", "B", "C", "C"]
            .iter()
            .map(|g| vec![Value::from(*g), Value::from(1.0)])
            .collect();
        Dataset::from_rows(vec!["group", "x"], rows).unwrap()
    }

    fn groups() -> Partition {
        let rules: Vec<GroupRule> = ["A", "B", "C", "D"]
            .iter()
            .map(|g| GroupRule::new(*g).with("group", *g))
            .collect();
        partition(&data(), &rules).unwrap()
    }

    fn fitter(engine: Arc<dyn StatisticsEngine>, config: PipelineConfig) -> GroupFitter {
        GroupFitter::new(engine, EngineConfig::default(), config)
    }

    #[test]
    fn test_batch_records_failures_in_place() {
        let f = fitter(Arc::new(CountingEngine), PipelineConfig::default());
        let batch = f.fit_groups(&spec(), &groups()).unwrap();

        let labels: Vec<&str> = batch.entries().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
        assert!(batch.get("A").unwrap().is_fitted());
        assert!(batch.get("C").unwrap().is_fitted());

        let summary = batch.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_labels, vec!["B".to_string(), "D".to_string()]);
        assert_eq!(summary.to_string(), "2 of 4 groups fitted; failed: B, D");
    }

    #[test]
    fn test_empty_group_never_reaches_engine() {
        let f = fitter(Arc::new(CountingEngine), PipelineConfig::default());
        let batch = f.fit_groups(&spec(), &groups()).unwrap();
        match batch.get("D").unwrap().error().unwrap() {
            MultiGroupError::ConvergenceFailure { reason, .. } => {
                assert_eq!(reason, "no observations")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_parallel_preserves_order() {
        let config = PipelineConfig {
            parallel: true,
            ..PipelineConfig::default()
        };
        let f = fitter(Arc::new(CountingEngine), config);
        let batch = f.fit_groups(&spec(), &groups()).unwrap();
        let labels: Vec<&str> = batch.entries().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
        assert_eq!(batch.successes().count(), 2);
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let config = PipelineConfig {
            fit_timeout: Some(Duration::from_millis(20)),
            ..PipelineConfig::default()
        };
        let f = fitter(Arc::new(SleepyEngine), config);
        let err = f
            .fit_one("A", &spec(), &data(), &FitDirectives::single_group(EngineConfig::default()))
            .unwrap_err();
        assert!(matches!(err, MultiGroupError::Timeout { .. }));
        assert!(err.is_recoverable());
    }

    fn check_slow_group_times_out(parallel: bool) {
        let config = PipelineConfig {
            fit_timeout: Some(Duration::from_millis(200)),
            parallel,
            ..PipelineConfig::default()
        };
        let f = fitter(Arc::new(SlowGroupEngine), config);
        let batch = f.fit_groups(&spec(), &groups()).unwrap();

        let labels: Vec<&str> = batch.entries().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
        assert!(batch.get("A").unwrap().is_fitted());
        assert!(batch.get("B").unwrap().is_fitted());
        assert!(matches!(
            batch.get("C").unwrap().error(),
            Some(MultiGroupError::Timeout { .. })
        ));

        let summary = batch.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_labels, vec!["C".to_string(), "D".to_string()]);

        let records = batch.extract(&StatisticSet::parse(&["cfi"]).unwrap()).unwrap();
        match &records[2] {
            GroupRecord::Failed { label, reason } => {
                assert_eq!(label, "C");
                assert!(reason.starts_with("timed out after"));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_timed_out_group_fails_alone() {
        check_slow_group_times_out(false);
    }

    #[test]
    fn test_timed_out_group_fails_alone_in_parallel() {
        check_slow_group_times_out(true);
    }

    #[test]
    fn test_fast_fit_within_timeout() {
        let config = PipelineConfig {
            fit_timeout: Some(Duration::from_secs(5)),
            ..PipelineConfig::default()
        };
        let f = fitter(Arc::new(CountingEngine), config);
        let model = f
            .fit_one("A", &spec(), &data(), &FitDirectives::single_group(EngineConfig::default()))
            .unwrap();
        assert_eq!(model.n_obs(), 6);
    }

    #[test]
    fn test_non_finite_statistic_is_convergence_failure() {
        struct NanEngine;
        impl StatisticsEngine for NanEngine {
            fn name(&self) -> &str {
                "nan"
            }
            fn fit(
                &self,
                _: &str,
                _: &ModelSpec,
                data: &Dataset,
                _: &FitDirectives,
            ) -> Result<FittedModel> {
                Ok(FittedModel::new("nan", data.len())
                    .with_statistic(FitStatistic::Rmsea, f64::NAN))
            }
        }

        let f = fitter(Arc::new(NanEngine), PipelineConfig::default());
        let err = f
            .fit_one("A", &spec(), &data(), &FitDirectives::single_group(EngineConfig::default()))
            .unwrap_err();
        assert!(matches!(err, MultiGroupError::ConvergenceFailure { .. }));
    }

    #[test]
    fn test_extract_keeps_failures() {
        let f = fitter(Arc::new(CountingEngine), PipelineConfig::default());
        let batch = f.fit_groups(&spec(), &groups()).unwrap();
        let stats = StatisticSet::parse(&["cfi"]).unwrap();
        let records = batch.extract(&stats).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records[0].as_fitted().is_some());
        assert_eq!(
            records[1],
            GroupRecord::Failed {
                label: "B".to_string(),
                reason: "too few observations".to_string()
            }
        );
    }

    #[test]
    fn test_configuration_error_aborts_batch() {
        let f = fitter(Arc::new(CountingEngine), PipelineConfig::default());
        let batch = f.fit_groups(&spec(), &groups()).unwrap();
        // cfa statistic set asks for chisq, which this engine never reports
        assert!(matches!(
            batch.extract(&StatisticSet::cfa()),
            Err(MultiGroupError::MissingStatistic { .. })
        ));
    }
}
