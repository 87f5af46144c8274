// =============================================================================
// Recorded Results Engine
// =============================================================================
//
// Factor models with ordered indicators are estimated by dedicated SEM
// software. This engine lets the rest of the pipeline (extraction, nested
// comparison, deltas, formatting) run on results exported from such a tool.
//
// FILE FORMAT (JSON):
// -------------------
//
//   {
//     "fits": [
//       { "label": "Black", "nobs": 412,
//         "statistics": { "chisq": 48.2, "df": 20, "cfi": 0.981, "rmsea": 0.058 } },
//       { "level": "configural", "grouping": "race", "nobs": 1650, "groups": 4,
//         "statistics": { "chisq": 210.4, "df": 80,
//                         "baseline.chisq": 5120.0, "baseline.df": 112 } },
//       { "level": "metric", "converged": false, "message": "not positive definite",
//         "nobs": 1650, "statistics": {} }
//     ]
//   }
//
// - Entries without "level" answer independent single-group fits and are
//   matched by label.
// - Entries with "level" answer nested fits and carry no label. "grouping"
//   is optional there; when present it must match the grouping attribute
//   of the run, and such an entry wins over one without "grouping".
// - Statistic names are checked against the closed key set when the file is
//   loaded, so a typo fails immediately rather than at extraction time.
// - Missing p-value / CFI / TLI / RMSEA are derived from the chi-square
//   tests when those are present.
//
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::{FitDirectives, FittedModel, StatisticsEngine};
use crate::data::Dataset;
use crate::error::{MultiGroupError, Result};
use crate::model::{ConstraintLevel, ModelSpec};
use crate::stats::FitStatistic;

fn default_converged() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct RecordedFit {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    level: Option<ConstraintLevel>,
    #[serde(default)]
    grouping: Option<String>,
    #[serde(default = "default_converged")]
    converged: bool,
    #[serde(default)]
    message: Option<String>,
    nobs: usize,
    #[serde(default)]
    groups: Option<usize>,
    statistics: BTreeMap<FitStatistic, f64>,
}

impl RecordedFit {
    fn describe(&self) -> String {
        match (&self.label, self.level, &self.grouping) {
            (Some(label), _, _) => label.clone(),
            (None, Some(level), Some(grouping)) => format!("{level} by {grouping}"),
            (None, Some(level), None) => level.to_string(),
            (None, None, _) => "<unnamed>".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordedFile {
    fits: Vec<RecordedFit>,
}

/// Replays fit results exported from an external engine.
#[derive(Debug, Clone)]
pub struct RecordedEngine {
    fits: Vec<RecordedFit>,
}

impl RecordedEngine {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: RecordedFile = serde_json::from_str(json)?;

        for (i, fit) in file.fits.iter().enumerate() {
            match (&fit.label, fit.level) {
                (None, None) => {
                    return Err(MultiGroupError::InvalidValue(format!(
                        "recorded fit #{i} has neither a label nor a level"
                    )))
                }
                (Some(label), Some(_)) => {
                    return Err(MultiGroupError::InvalidValue(format!(
                        "recorded fit #{i} ('{label}') has both a label and a level; \
                         nested fits are keyed by level and grouping"
                    )))
                }
                (Some(label), None) if fit.grouping.is_some() => {
                    return Err(MultiGroupError::InvalidValue(format!(
                        "recorded fit #{i} ('{label}') has a grouping but no level"
                    )))
                }
                _ => {}
            }
            let clash = file.fits[..i].iter().any(|other| {
                other.label == fit.label
                    && other.level == fit.level
                    && other.grouping == fit.grouping
            });
            if clash {
                return Err(MultiGroupError::DuplicateLabel(fit.describe()));
            }
        }

        Ok(Self { fits: file.fits })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    fn lookup(&self, label: &str, directives: &FitDirectives) -> Option<&RecordedFit> {
        let Some(level) = directives.constraint else {
            return self
                .fits
                .iter()
                .find(|fit| fit.level.is_none() && fit.label.as_deref() == Some(label));
        };
        let at_level = || self.fits.iter().filter(move |fit| fit.level == Some(level));
        at_level()
            .find(|fit| fit.grouping.is_some() && fit.grouping == directives.group_attribute)
            .or_else(|| at_level().find(|fit| fit.grouping.is_none()))
    }
}

impl StatisticsEngine for RecordedEngine {
    fn name(&self) -> &str {
        "recorded"
    }

    fn fit(
        &self,
        label: &str,
        _spec: &ModelSpec,
        data: &Dataset,
        directives: &FitDirectives,
    ) -> Result<FittedModel> {
        let fit = self.lookup(label, directives).ok_or_else(|| {
            MultiGroupError::UnsupportedModel(match directives.constraint {
                Some(level) => format!("no recorded result for '{label}' at the {level} level"),
                None => format!("no recorded result for group '{label}'"),
            })
        })?;

        let n_groups = match (fit.groups, &directives.group_attribute) {
            (Some(g), _) => g,
            (None, Some(attr)) if data.has_column(attr) => data.distinct_values(attr)?.len().max(1),
            _ => 1,
        };

        let mut model = fit
            .statistics
            .iter()
            .fold(FittedModel::new("recorded", fit.nobs), |m, (stat, value)| {
                m.with_statistic(*stat, *value)
            });
        if !fit.converged {
            model = model.not_converged(
                fit.message
                    .clone()
                    .unwrap_or_else(|| "engine reported non-convergence".to_string()),
            );
        }
        Ok(model.with_derived_indices(n_groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use approx::assert_abs_diff_eq;

    const FILE: &str = r#"{
        "fits": [
            { "label": "A", "nobs": 200,
              "statistics": { "chisq": 30.0, "df": 20, "cfi": 0.99, "rmsea": 0.05 } },
            { "level": "configural", "nobs": 600, "groups": 3,
              "statistics": { "chisq": 110.0, "df": 50,
                              "baseline.chisq": 2050.0, "baseline.df": 60 } },
            { "level": "metric", "converged": false, "message": "not positive definite",
              "nobs": 600, "statistics": {} }
        ]
    }"#;

    fn spec() -> ModelSpec {
        ModelSpec::parse("F =~ a + b + c").unwrap()
    }

    fn single_group() -> FitDirectives {
        FitDirectives::single_group(EngineConfig::default())
    }

    #[test]
    fn test_single_group_lookup() {
        let engine = RecordedEngine::from_json_str(FILE).unwrap();
        assert_eq!(engine.len(), 3);
        let model = engine
            .fit("A", &spec(), &Dataset::default(), &single_group())
            .unwrap();
        assert_eq!(model.statistic(FitStatistic::Cfi), Some(0.99));
        assert_eq!(model.n_obs(), 200);
        // p-value derived from chisq/df
        assert!(model.statistic(FitStatistic::PValue).is_some());
    }

    #[test]
    fn test_nested_lookup_derives_indices() {
        let engine = RecordedEngine::from_json_str(FILE).unwrap();
        let directives =
            FitDirectives::nested(ConstraintLevel::Configural, "race", EngineConfig::ordinal_cfa());
        let model = engine
            .fit("configural", &spec(), &Dataset::default(), &directives)
            .unwrap();
        // CFI = 1 - 60 / 1990
        assert_abs_diff_eq!(
            model.statistic(FitStatistic::Cfi).unwrap(),
            1.0 - 60.0 / 1990.0,
            epsilon = 1e-12
        );
        // RMSEA = sqrt(60 / (50 * 600)) * sqrt(3)
        assert_abs_diff_eq!(
            model.statistic(FitStatistic::Rmsea).unwrap(),
            (60.0_f64 / 30000.0).sqrt() * 3.0_f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_non_converged_entry() {
        let engine = RecordedEngine::from_json_str(FILE).unwrap();
        let directives =
            FitDirectives::nested(ConstraintLevel::Metric, "race", EngineConfig::default());
        let model = engine.fit("metric", &spec(), &Dataset::default(), &directives).unwrap();
        assert!(!model.converged());
        assert_eq!(model.message(), Some("not positive definite"));
    }

    #[test]
    fn test_missing_entry_is_configuration_error() {
        let engine = RecordedEngine::from_json_str(FILE).unwrap();
        let err = engine
            .fit("B", &spec(), &Dataset::default(), &single_group())
            .unwrap_err();
        assert!(matches!(err, MultiGroupError::UnsupportedModel(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let typo = r#"{ "fits": [ { "label": "A", "nobs": 1, "statistics": { "cif": 0.9 } } ] }"#;
        assert!(matches!(RecordedEngine::from_json_str(typo), Err(MultiGroupError::Json(_))));

        let dup = r#"{ "fits": [
            { "label": "A", "nobs": 1, "statistics": {} },
            { "label": "A", "nobs": 2, "statistics": {} } ] }"#;
        assert!(matches!(
            RecordedEngine::from_json_str(dup),
            Err(MultiGroupError::DuplicateLabel(_))
        ));

        let anonymous = r#"{ "fits": [ { "nobs": 1, "statistics": {} } ] }"#;
        assert!(RecordedEngine::from_json_str(anonymous).is_err());

        let labelled_level = r#"{ "fits": [
            { "label": "A", "level": "metric", "nobs": 1, "statistics": {} } ] }"#;
        assert!(matches!(
            RecordedEngine::from_json_str(labelled_level),
            Err(MultiGroupError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_nested_lookup_prefers_matching_grouping() {
        let json = r#"{ "fits": [
            { "level": "configural", "nobs": 600, "statistics": { "chisq": 1.0, "df": 2 } },
            { "level": "configural", "grouping": "sex", "nobs": 600,
              "statistics": { "chisq": 2.0, "df": 2 } },
            { "level": "configural", "grouping": "race", "nobs": 600,
              "statistics": { "chisq": 3.0, "df": 2 } }
        ] }"#;
        let engine = RecordedEngine::from_json_str(json).unwrap();
        let chisq = |grouping: &str| {
            let directives = FitDirectives::nested(
                ConstraintLevel::Configural,
                grouping,
                EngineConfig::default(),
            );
            engine
                .fit("configural", &spec(), &Dataset::default(), &directives)
                .unwrap()
                .statistic(FitStatistic::ChiSquare)
        };
        assert_eq!(chisq("race"), Some(3.0));
        assert_eq!(chisq("sex"), Some(2.0));
        assert_eq!(chisq("age"), Some(1.0));
    }
}
