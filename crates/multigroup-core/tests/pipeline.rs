//! End-to-end runs: partition → fit → extract → aggregate → format.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use multigroup_core::{
    partition, run_invariance, ComparisonTable, ConstraintLevel, Dataset, EngineConfig,
    FitDirectives, FitStatistic, FittedModel, GroupFitter, GroupRecord, GroupRule,
    InvarianceState, LevelStatus, ModelSpec, MultiGroupError, OlsEngine, PipelineConfig,
    RecordedEngine, Result, StatisticSet, StatisticsEngine, TableFormat, Value,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Reports fixed fit statistics that depend only on the group label.
struct ScriptedEngine;

impl StatisticsEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fit(
        &self,
        label: &str,
        _: &ModelSpec,
        data: &Dataset,
        _: &FitDirectives,
    ) -> Result<FittedModel> {
        let offset = label.bytes().next().map_or(0.0, |b| f64::from(b - b'A'));
        Ok(FittedModel::new("scripted", data.len())
            .with_statistic(FitStatistic::ChiSquare, 30.0 + offset)
            .with_statistic(FitStatistic::Df, 20.0)
            .with_statistic(FitStatistic::Cfi, 0.99 - 0.01 * offset)
            .with_statistic(FitStatistic::Rmsea, 0.04 + 0.005 * offset)
            .with_statistic(FitStatistic::Srmr, 0.03))
    }
}

fn grouped_data(groups: &[(&str, usize)]) -> Dataset {
    let rows = groups
        .iter()
        .flat_map(|(g, n)| (0..*n).map(move |i| vec![Value::from(*g), Value::from(i as f64)]))
        .collect();
    Dataset::from_rows(vec!["group", "x"], rows).unwrap()
}

fn rules(names: &[&str]) -> Vec<GroupRule> {
    names.iter().map(|g| GroupRule::new(*g).with("group", *g)).collect()
}

fn spec() -> ModelSpec {
    ModelSpec::parse("F =~ x1 + x2 + x3").unwrap()
}

fn scripted_fitter() -> GroupFitter {
    GroupFitter::new(
        Arc::new(ScriptedEngine),
        EngineConfig::default(),
        PipelineConfig::default(),
    )
}

#[test]
fn test_four_groups_give_four_rows() {
    init_logging();
    let data = grouped_data(&[("A", 50), ("B", 60), ("C", 40), ("D", 55)]);
    let groups = partition(&data, &rules(&["A", "B", "C", "D"])).unwrap();
    let stats = StatisticSet::parse(&["chisq", "df", "cfi", "rmsea"]).unwrap();

    let fitter = GroupFitter::new(
        Arc::new(ScriptedEngine),
        EngineConfig::ordinal_cfa(),
        PipelineConfig {
            statistics: stats.clone(),
            ..PipelineConfig::default()
        },
    );
    let batch = fitter.fit_groups(&spec(), &groups).unwrap();
    let table = ComparisonTable::from_batch(&batch, &stats).unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(table.labels().collect::<Vec<_>>(), vec!["A", "B", "C", "D"]);

    let display = TableFormat::default().render(&table);
    assert_eq!(display.header, vec!["group", "chisq", "df", "cfi", "rmsea"]);
    assert_eq!(display.rows[3], vec!["D", "33.000", "20", "0.960", "0.055"]);
}

#[test]
fn test_failed_group_does_not_abort_batch() {
    init_logging();
    // group B has no rows at all
    let data = grouped_data(&[("A", 30), ("C", 30)]);
    let groups = partition(&data, &rules(&["A", "B", "C"])).unwrap();
    let stats = StatisticSet::parse(&["cfi", "rmsea"]).unwrap();
    let fitter = scripted_fitter();

    let batch = fitter.fit_groups(&spec(), &groups).unwrap();
    let summary = batch.summary();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed_labels, vec!["B".to_string()]);
    match batch.get("B").and_then(|o| o.error()) {
        Some(MultiGroupError::ConvergenceFailure { reason, .. }) => {
            assert_eq!(reason, "no observations")
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let table = ComparisonTable::from_batch(&batch, &stats).unwrap();
    assert_eq!(table.labels().collect::<Vec<_>>(), vec!["A", "C"]);

    let records = batch.extract(&stats).unwrap();
    let display = TableFormat::default().render_batch(&table, &records);
    assert_eq!(display.rows[1], vec!["B", "failed: no observations", ""]);
}

#[test]
fn test_all_groups_failed_gives_empty_table() {
    let data = grouped_data(&[("A", 10)]);
    let groups = partition(&data, &rules(&["X", "Y"])).unwrap();
    let fitter = scripted_fitter();
    let batch = fitter.fit_groups(&spec(), &groups).unwrap();
    let table = ComparisonTable::from_batch(&batch, &StatisticSet::cfa()).unwrap();
    assert!(table.is_empty());
    let records = batch.extract(&StatisticSet::cfa()).unwrap();
    assert!(records.iter().all(|r| matches!(r, GroupRecord::Failed { .. })));
}

const NESTED: &str = r#"{
    "fits": [
        { "level": "configural", "nobs": 800, "groups": 2,
          "statistics": { "chisq": 210.0, "df": 80, "cfi": 0.98, "rmsea": 0.045 } },
        { "level": "metric", "nobs": 800, "groups": 2,
          "statistics": { "chisq": 231.0, "df": 92, "cfi": 0.975, "rmsea": 0.043 } },
        { "level": "scalar", "nobs": 800, "groups": 2,
          "statistics": { "chisq": 262.0, "df": 104, "cfi": 0.968, "rmsea": 0.044 } }
    ]
}"#;

fn nested_fitter(json: &str) -> GroupFitter {
    GroupFitter::new(
        Arc::new(RecordedEngine::from_json_str(json).unwrap()),
        EngineConfig::ordinal_cfa(),
        PipelineConfig {
            statistics: StatisticSet::parse(&["chisq", "df", "cfi", "rmsea"]).unwrap(),
            ..PipelineConfig::default()
        },
    )
}

#[test]
fn test_nested_sequence_deltas_and_decisions() {
    init_logging();
    let data = grouped_data(&[("Black", 400), ("White", 400)]);
    let outcome = run_invariance(&nested_fitter(NESTED), &spec(), &data, "group").unwrap();

    assert_eq!(outcome.state(), InvarianceState::Scalar);
    let table = outcome.table();
    assert_eq!(
        table.labels().collect::<Vec<_>>(),
        vec!["configural", "metric", "scalar"]
    );
    assert_eq!(table.delta("configural", FitStatistic::Cfi), None);
    assert_abs_diff_eq!(table.delta("metric", FitStatistic::Cfi).unwrap(), -0.005, epsilon = 1e-9);
    assert_abs_diff_eq!(table.delta("scalar", FitStatistic::Cfi).unwrap(), -0.007, epsilon = 1e-9);

    let holds: Vec<Option<bool>> = outcome.decisions().iter().map(|d| d.holds).collect();
    assert_eq!(holds, vec![None, Some(true), Some(true)]);
    assert_eq!(outcome.supported_level(), Some(ConstraintLevel::Scalar));

    let tests = outcome.chi_square_tests();
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[0].delta_df, 12.0);
    assert_abs_diff_eq!(tests[1].delta_chisq, 31.0, epsilon = 1e-9);

    let display = TableFormat::apa().render(table);
    assert_eq!(display.header.last().map(String::as_str), Some("ΔCFI"));
    assert_eq!(display.rows[0].last().map(String::as_str), Some(""));
    assert_eq!(display.rows[2].last().map(String::as_str), Some("-.007"));
}

#[test]
fn test_nested_sequence_stops_at_failed_level() {
    let json = r#"{
        "fits": [
            { "level": "configural", "nobs": 800, "groups": 2,
              "statistics": { "chisq": 210.0, "df": 80, "cfi": 0.98, "rmsea": 0.045 } },
            { "level": "metric", "converged": false, "message": "not positive definite",
              "nobs": 800, "statistics": {} }
        ]
    }"#;
    let data = grouped_data(&[("Black", 400), ("White", 400)]);
    let outcome = run_invariance(&nested_fitter(json), &spec(), &data, "group").unwrap();

    assert_eq!(outcome.state(), InvarianceState::Configural);
    assert_eq!(
        outcome.levels(),
        &[
            (ConstraintLevel::Configural, LevelStatus::Fitted),
            (ConstraintLevel::Metric, LevelStatus::Failed("not positive definite".to_string())),
            (ConstraintLevel::Scalar, LevelStatus::NotAttempted),
        ]
    );
    assert_eq!(outcome.table().len(), 1);
    assert!(outcome.chi_square_tests().is_empty());
}

#[test]
fn test_saturated_configural_model_completes_sequence() {
    // df = 0 leaves the p-value and TLI undefined; they are never requested
    let json = r#"{
        "fits": [
            { "level": "configural", "nobs": 800, "groups": 2,
              "statistics": { "chisq": 0.0, "df": 0, "cfi": 1.0,
                              "baseline.chisq": 900.0, "baseline.df": 6 } },
            { "level": "metric", "nobs": 800, "groups": 2,
              "statistics": { "chisq": 4.0, "df": 2, "cfi": 0.998,
                              "baseline.chisq": 900.0, "baseline.df": 6 } },
            { "level": "scalar", "nobs": 800, "groups": 2,
              "statistics": { "chisq": 9.0, "df": 4, "cfi": 0.994,
                              "baseline.chisq": 900.0, "baseline.df": 6 } }
        ]
    }"#;
    let fitter = GroupFitter::new(
        Arc::new(RecordedEngine::from_json_str(json).unwrap()),
        EngineConfig::ordinal_cfa(),
        PipelineConfig {
            statistics: StatisticSet::parse(&["chisq", "df", "cfi"]).unwrap(),
            ..PipelineConfig::default()
        },
    );
    let data = grouped_data(&[("Black", 400), ("White", 400)]);
    let outcome = run_invariance(&fitter, &spec(), &data, "group").unwrap();

    assert_eq!(outcome.state(), InvarianceState::Scalar);
    assert!(outcome
        .levels()
        .iter()
        .all(|(_, status)| *status == LevelStatus::Fitted));
    let configural = outcome.model(ConstraintLevel::Configural).unwrap();
    assert_eq!(configural.statistic(FitStatistic::PValue), None);
    assert_eq!(configural.statistic(FitStatistic::Rmsea), Some(0.0));
    assert_abs_diff_eq!(
        outcome.table().delta("metric", FitStatistic::Cfi).unwrap(),
        -0.002,
        epsilon = 1e-9
    );
}

#[test]
fn test_invariance_needs_two_groups() {
    let data = grouped_data(&[("White", 400)]);
    let err = run_invariance(&nested_fitter(NESTED), &spec(), &data, "group").unwrap_err();
    assert!(matches!(err, MultiGroupError::InvalidValue(_)));
    assert!(run_invariance(&nested_fitter(NESTED), &spec(), &data, "race").is_err());
}

const CSV: &str = "\
group,x,y
A,1,3.1
A,2,4.8
A,3,7.0
A,4,9.2
A,5,10.9
B,1,1.6
B,2,2.3
B,3,3.5
B,4,4.7
B,5,5.4
B,6,NA
C,1,2.0
";

#[test]
fn test_ols_per_group_from_csv() {
    init_logging();
    let data = Dataset::from_csv_reader(CSV.as_bytes()).unwrap();
    let groups = partition(&data, &rules(&["A", "B", "C"])).unwrap();
    let stats = StatisticSet::parse(&["r.squared", "sigma", "df.residual", "nobs"]).unwrap();
    let fitter = GroupFitter::new(
        Arc::new(OlsEngine),
        EngineConfig::default(),
        PipelineConfig {
            statistics: stats.clone(),
            parallel: true,
            ..PipelineConfig::default()
        },
    );

    let batch = fitter.fit_groups(&ModelSpec::parse("y ~ x").unwrap(), &groups).unwrap();
    // one row cannot identify intercept and slope
    assert_eq!(batch.summary().failed_labels, vec!["C".to_string()]);

    let a = batch.get("A").and_then(|o| o.model()).unwrap();
    assert_abs_diff_eq!(a.estimate("x").unwrap().estimate, 2.0, epsilon = 1e-10);
    assert_abs_diff_eq!(
        a.statistic(FitStatistic::RSquared).unwrap(),
        1.0 - 0.1 / 40.1,
        epsilon = 1e-10
    );

    let table = ComparisonTable::from_batch(&batch, &stats).unwrap();
    // listwise deletion drops B's NA response
    assert_eq!(table.value("B", FitStatistic::NObs), Some(5.0));
    assert_eq!(table.value("A", FitStatistic::DfResidual), Some(3.0));
}

#[test]
fn test_missing_statistic_is_an_error_not_a_hole() {
    let data = grouped_data(&[("A", 10)]);
    let groups = partition(&data, &rules(&["A"])).unwrap();
    let fitter = scripted_fitter();
    let batch = fitter.fit_groups(&spec(), &groups).unwrap();
    let err = ComparisonTable::from_batch(&batch, &StatisticSet::cfa_scaled()).unwrap_err();
    assert!(matches!(err, MultiGroupError::MissingStatistic { .. }));
}
