//! Model syntax parsing.
//!
//! Accepts either a single regression formula
//!
//! ```text
//! y ~ x1 + x2 + C(race)        # C(...) marks a categorical predictor
//! y ~ 0 + x1                   # no intercept (also: y ~ x1 - 1)
//! ```
//!
//! or a measurement model, one statement per line (or separated by `;`):
//!
//! ```text
//! Anxiety    =~ item1 + item2 + item3
//! Depression =~ item4 + item5 + 1*item6
//! Anxiety    ~~ Depression
//! ```
//!
//! Numeric or `NA` pre-multipliers on indicators are accepted and dropped;
//! fixing or freeing individual parameters is the engine's business.

use super::{Factor, MeasurementSpec, ModelSpec, RegressionSpec, Term};
use crate::error::{MultiGroupError, Result};

fn invalid(msg: impl Into<String>) -> MultiGroupError {
    MultiGroupError::InvalidSpecification(msg.into())
}

/// Variable names: letters, digits, `_` and `.`, not starting with a digit.
fn check_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(invalid(format!("'{name}' is not a valid variable name")))
    }
}

/// Split a right-hand side on '+', respecting parentheses.
fn split_terms(rhs: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;

    for c in rhs.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            '+' if depth == 0 => {
                terms.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    terms.push(current.trim().to_string());
    terms
}

/// Strip comments and split into non-empty statements.
fn statements(text: &str) -> Vec<&str> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split(';'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub(super) fn parse_model(text: &str) -> Result<ModelSpec> {
    let stmts = statements(text);
    if stmts.is_empty() {
        return Err(invalid("model syntax is empty"));
    }

    if stmts.iter().any(|s| s.contains("=~")) {
        return parse_measurement(&stmts).map(ModelSpec::Measurement);
    }

    match stmts.as_slice() {
        [formula] => parse_regression(formula).map(ModelSpec::Regression),
        _ => Err(invalid(format!(
            "expected one regression formula, found {} statements",
            stmts.len()
        ))),
    }
}

// -----------------------------------------------------------------------------
// Regression formulas
// -----------------------------------------------------------------------------

fn parse_regression(formula: &str) -> Result<RegressionSpec> {
    let parts: Vec<&str> = formula.split('~').collect();
    if parts.len() != 2 {
        return Err(invalid(format!("formula must contain exactly one '~': {formula}")));
    }

    let response = parts[0].trim().to_string();
    check_identifier(&response)?;
    let mut rhs = parts[1].trim().to_string();
    let mut intercept = true;

    // "0 + ..." at the start
    if let Some(rest) = rhs.strip_prefix('0') {
        if rest.trim_start().starts_with('+') || rest.trim().is_empty() {
            intercept = false;
            rhs = rest.trim_start().trim_start_matches('+').trim().to_string();
        }
    }

    // "... - 1" at the end
    if let Some(pos) = rhs.rfind('-') {
        if rhs[pos + 1..].trim() == "1" {
            intercept = false;
            rhs = rhs[..pos].trim().trim_end_matches('+').trim().to_string();
        }
    }

    let mut terms: Vec<Term> = Vec::new();
    if !rhs.is_empty() {
        for raw in split_terms(&rhs) {
            if raw.is_empty() {
                return Err(invalid(format!("empty term in formula: {formula}")));
            }
            if raw == "1" {
                continue;
            }
            if raw.contains('*') || raw.contains(':') {
                return Err(invalid(format!("interaction terms are not supported: '{raw}'")));
            }
            let term = match raw.strip_prefix("C(").and_then(|r| r.strip_suffix(')')) {
                Some(inner) => Term::Categorical(inner.trim().to_string()),
                None => Term::Numeric(raw),
            };
            check_identifier(term.variable())?;
            if term.variable() == response {
                return Err(invalid(format!("'{response}' appears on both sides of '~'")));
            }
            if !terms.iter().any(|t| t.variable() == term.variable()) {
                terms.push(term);
            }
        }
    }

    if terms.is_empty() && !intercept {
        return Err(invalid(format!("formula has no terms: {formula}")));
    }

    Ok(RegressionSpec {
        response,
        terms,
        intercept,
    })
}

// -----------------------------------------------------------------------------
// Measurement models
// -----------------------------------------------------------------------------

/// Drop a `1*` / `NA*` / `0.5*` pre-multiplier from an indicator.
fn strip_modifier(term: &str) -> &str {
    match term.split_once('*') {
        Some((modifier, name))
            if modifier.trim() == "NA" || modifier.trim().parse::<f64>().is_ok() =>
        {
            name.trim()
        }
        _ => term,
    }
}

fn parse_measurement(stmts: &[&str]) -> Result<MeasurementSpec> {
    let mut factors: Vec<Factor> = Vec::new();
    let mut covariances: Vec<(String, String)> = Vec::new();

    for stmt in stmts {
        if let Some((lhs, rhs)) = stmt.split_once("=~") {
            let name = lhs.trim().to_string();
            check_identifier(&name)?;
            if factors.iter().any(|f| f.name == name) {
                return Err(invalid(format!("factor '{name}' is defined twice")));
            }
            let mut indicators: Vec<String> = Vec::new();
            for raw in split_terms(rhs) {
                let ind = strip_modifier(&raw).to_string();
                check_identifier(&ind)?;
                if indicators.contains(&ind) {
                    return Err(invalid(format!("indicator '{ind}' repeated in factor '{name}'")));
                }
                indicators.push(ind);
            }
            factors.push(Factor { name, indicators });
        } else if let Some((lhs, rhs)) = stmt.split_once("~~") {
            let (a, b) = (lhs.trim().to_string(), rhs.trim().to_string());
            check_identifier(&a)?;
            check_identifier(&b)?;
            covariances.push((a, b));
        } else {
            return Err(invalid(format!(
                "unsupported statement in measurement model: '{stmt}'"
            )));
        }
    }

    for (a, b) in &covariances {
        for name in [a, b] {
            if !factors.iter().any(|f| &f.name == name) {
                return Err(invalid(format!("covariance refers to undefined factor '{name}'")));
            }
        }
    }

    Ok(MeasurementSpec {
        factors,
        covariances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regression(text: &str) -> RegressionSpec {
        match parse_model(text).unwrap() {
            ModelSpec::Regression(spec) => spec,
            other => panic!("expected regression, got {other:?}"),
        }
    }

    fn measurement(text: &str) -> MeasurementSpec {
        match parse_model(text).unwrap() {
            ModelSpec::Measurement(spec) => spec,
            other => panic!("expected measurement, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_simple_formula() {
        let spec = regression("y ~ x1 + x2");
        assert_eq!(spec.response, "y");
        assert_eq!(
            spec.terms,
            vec![Term::Numeric("x1".into()), Term::Numeric("x2".into())]
        );
        assert!(spec.intercept);
    }

    #[test]
    fn test_parse_categorical() {
        let spec = regression("wellbeing ~ age + C(race)");
        assert_eq!(spec.terms[1], Term::Categorical("race".into()));
    }

    #[test]
    fn test_no_intercept() {
        assert!(!regression("y ~ 0 + x1 + x2").intercept);
        assert!(!regression("y ~ x1 + x2 - 1").intercept);
        assert_eq!(regression("y ~ x1 + x2 - 1").terms.len(), 2);
        assert!(regression("y ~ 1").terms.is_empty());
    }

    #[test]
    fn test_regression_errors() {
        assert!(parse_model("y x1").is_err());
        assert!(parse_model("y ~ x1 ~ x2").is_err());
        assert!(parse_model("y ~ x1*x2").is_err());
        assert!(parse_model("y ~ x1 + + x2").is_err());
        assert!(parse_model("y ~ y").is_err());
        assert!(parse_model("y ~ 0").is_err());
        assert!(parse_model("y ~ x1\nz ~ x2").is_err());
        assert!(parse_model("   # only a comment").is_err());
    }

    #[test]
    fn test_parse_measurement_model() {
        let spec = measurement(
            "# two correlated factors\n\
             Anxiety =~ a1 + a2 + 1*a3\n\
             Depression =~ NA*d1 + d2 + d3; Anxiety ~~ Depression",
        );
        assert_eq!(spec.factors.len(), 2);
        assert_eq!(spec.factors[0].indicators, vec!["a1", "a2", "a3"]);
        assert_eq!(spec.factors[1].indicators, vec!["d1", "d2", "d3"]);
        assert_eq!(spec.covariances, vec![("Anxiety".into(), "Depression".into())]);
    }

    #[test]
    fn test_measurement_errors() {
        assert!(parse_model("F =~ a + b\nF =~ c").is_err());
        assert!(parse_model("F =~ a + a").is_err());
        assert!(parse_model("F =~ a + b\nF ~~ G").is_err());
        assert!(parse_model("F =~ a + b\ny ~ F").is_err());
    }
}
