// =============================================================================
// Inference Helpers
// =============================================================================
//
// Distribution tail probabilities used by the built-in regression engine and
// by the presentation layer:
//   - t tests on individual coefficients
//   - the overall F test of a regression
//   - confidence intervals for coefficients
//   - significance stars for summary tables
//
// Every function returns NaN (or a NaN pair) for inputs where the quantity is
// undefined, so callers can treat "not computable" uniformly.
//
// =============================================================================

use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

/// Two-tailed p-value of a t statistic.
///
/// # Arguments
/// * `t` - The t statistic (coefficient / standard error)
/// * `df` - Residual degrees of freedom (n - p for a regression)
///
/// # Returns
/// P(|T| > |t|), or NaN when `t` is not finite or `df` is not positive.
pub fn pvalue_t(t: f64, df: f64) -> f64 {
    if !t.is_finite() || !(df > 0.0) {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * dist.sf(t.abs()),
        Err(_) => f64::NAN,
    }
}

/// Upper-tail p-value of an F statistic.
///
/// # Arguments
/// * `f` - The F statistic of the overall regression test
/// * `df1` - Numerator degrees of freedom (number of slopes)
/// * `df2` - Denominator degrees of freedom (residual df)
///
/// # Returns
/// P(F > f), or NaN for a negative statistic or non-positive df.
pub fn pvalue_f(f: f64, df1: f64, df2: f64) -> f64 {
    if !f.is_finite() || f < 0.0 || !(df1 > 0.0) || !(df2 > 0.0) {
        return f64::NAN;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => dist.sf(f),
        Err(_) => f64::NAN,
    }
}

/// Confidence interval for a coefficient using the t distribution.
///
/// # Arguments
/// * `estimate` - Point estimate of the coefficient
/// * `std_error` - Its standard error
/// * `df` - Residual degrees of freedom
/// * `confidence` - Coverage, e.g. 0.95 for a 95% interval
///
/// # Returns
/// (lower, upper), or a NaN pair when any input is out of range.
pub fn confidence_interval_t(
    estimate: f64,
    std_error: f64,
    df: f64,
    confidence: f64,
) -> (f64, f64) {
    if !estimate.is_finite()
        || !std_error.is_finite()
        || std_error <= 0.0
        || !(df > 0.0)
        || !(confidence > 0.0 && confidence < 1.0)
    {
        return (f64::NAN, f64::NAN);
    }
    let dist = match StudentsT::new(0.0, 1.0, df) {
        Ok(d) => d,
        Err(_) => return (f64::NAN, f64::NAN),
    };
    let alpha = 1.0 - confidence;
    let margin = dist.inverse_cdf(1.0 - alpha / 2.0) * std_error;
    (estimate - margin, estimate + margin)
}

/// Significance stars for a p-value.
///
/// - "***" : p < 0.001
/// - "**"  : p < 0.01
/// - "*"   : p < 0.05
/// - "."   : p < 0.1
/// - ""    : otherwise (including NaN)
pub fn significance_stars(pvalue: f64) -> &'static str {
    if pvalue < 0.001 {
        "***"
    } else if pvalue < 0.01 {
        "**"
    } else if pvalue < 0.05 {
        "*"
    } else if pvalue < 0.1 {
        "."
    } else {
        ""
    }
}
