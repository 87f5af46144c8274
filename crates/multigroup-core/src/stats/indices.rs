// =============================================================================
// Fit Indices from Chi-Square Summaries
// =============================================================================
//
// Some engines only report the model and baseline chi-square tests. The
// comparative indices can be derived from those four numbers:
//
//     RMSEA = sqrt( max(χ² − df, 0) / (df · N) ) · sqrt(G)
//     CFI   = 1 − max(χ² − df, 0) / max(χ² − df, χ²_b − df_b, 0)
//     TLI   = (χ²_b/df_b − χ²/df) / (χ²_b/df_b − 1)
//
// where N is the total sample size and G the number of groups in a
// multi-group model. These follow the usual SEM software conventions
// (N rather than N − 1 in the RMSEA denominator).
//
// =============================================================================

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Upper-tail p-value of a chi-square statistic.
///
/// # Arguments
/// * `chisq` - Model chi-square
/// * `df` - Model degrees of freedom
///
/// # Returns
/// P(X² > chisq). NaN for a saturated model (df = 0), where no test exists.
pub fn chisq_pvalue(chisq: f64, df: f64) -> f64 {
    if !chisq.is_finite() || chisq < 0.0 || !(df > 0.0) {
        return f64::NAN;
    }
    match ChiSquared::new(df) {
        Ok(dist) => dist.sf(chisq),
        Err(_) => f64::NAN,
    }
}

/// Root mean square error of approximation.
///
/// # Arguments
/// * `chisq` - Model chi-square
/// * `df` - Model degrees of freedom
/// * `n_obs` - Total sample size across groups
/// * `n_groups` - Number of groups in the model (1 for a single-group fit)
///
/// # Returns
/// RMSEA, 0 for a saturated model (df = 0), NaN for negative df or no
/// observations.
pub fn rmsea(chisq: f64, df: f64, n_obs: f64, n_groups: usize) -> f64 {
    if !chisq.is_finite() || !(n_obs > 0.0) || n_groups == 0 {
        return f64::NAN;
    }
    if df == 0.0 {
        return 0.0;
    }
    if df < 0.0 {
        return f64::NAN;
    }
    let excess = (chisq - df).max(0.0);
    (excess / (df * n_obs)).sqrt() * (n_groups as f64).sqrt()
}

/// Comparative fit index against the baseline (independence) model.
///
/// # Arguments
/// * `chisq`, `df` - Model chi-square test
/// * `baseline_chisq`, `baseline_df` - Baseline model chi-square test
///
/// # Returns
/// CFI in [0, 1]; 1 when neither model misfits beyond its df.
pub fn cfi(chisq: f64, df: f64, baseline_chisq: f64, baseline_df: f64) -> f64 {
    if ![chisq, df, baseline_chisq, baseline_df].iter().all(|v| v.is_finite()) {
        return f64::NAN;
    }
    let model = (chisq - df).max(0.0);
    let denom = model.max(baseline_chisq - baseline_df).max(0.0);
    if denom == 0.0 {
        return 1.0;
    }
    1.0 - model / denom
}

/// Tucker-Lewis index (non-normed fit index).
///
/// # Arguments
/// * `chisq`, `df` - Model chi-square test
/// * `baseline_chisq`, `baseline_df` - Baseline model chi-square test
///
/// # Returns
/// TLI, which may leave [0, 1]. NaN when either df is zero or the baseline
/// ratio equals 1.
pub fn tli(chisq: f64, df: f64, baseline_chisq: f64, baseline_df: f64) -> f64 {
    if !(df > 0.0) || !(baseline_df > 0.0) || !chisq.is_finite() || !baseline_chisq.is_finite() {
        return f64::NAN;
    }
    let baseline_ratio = baseline_chisq / baseline_df;
    if baseline_ratio == 1.0 {
        return f64::NAN;
    }
    (baseline_ratio - chisq / df) / (baseline_ratio - 1.0)
}
