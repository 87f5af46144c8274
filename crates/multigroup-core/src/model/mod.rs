// =============================================================================
// Model Specifications
// =============================================================================
//
// A model specification is declared once and shared, read-only, by every
// group and every constraint level of an analysis. Two shapes are supported:
//
//   - REGRESSION:  an outcome and its predictors   y ~ x1 + x2 + C(race)
//   - MEASUREMENT: latent factors and indicators   F =~ item1 + item2 + item3
//
// The library never estimates measurement models itself. Their specification
// is handed to an external engine together with the constraint level.
//
// INVARIANCE LEVELS:
// ------------------
// Multi-group factor models are compared under increasingly strict equality
// constraints across groups:
//
//   Configural  same factor structure, every parameter free per group
//   Metric      + loadings equal (with ordered indicators: + thresholds)
//   Scalar      + intercepts equal
//
// Each level is nested in the previous one.
//
// =============================================================================

mod syntax;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MultiGroupError, Result};

/// One predictor of a regression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Numeric(String),
    /// Treatment-coded; declared with `C(name)`.
    Categorical(String),
}

impl Term {
    pub fn variable(&self) -> &str {
        match self {
            Term::Numeric(name) | Term::Categorical(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegressionSpec {
    pub response: String,
    pub terms: Vec<Term>,
    pub intercept: bool,
}

/// A latent factor measured by observed indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factor {
    pub name: String,
    pub indicators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementSpec {
    pub factors: Vec<Factor>,
    /// Explicitly declared factor covariances (`F1 ~~ F2`).
    pub covariances: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSpec {
    Regression(RegressionSpec),
    Measurement(MeasurementSpec),
}

impl ModelSpec {
    /// Parse model syntax. See the `syntax` module for the accepted forms.
    pub fn parse(text: &str) -> Result<Self> {
        syntax::parse_model(text)
    }

    /// Every observed variable the model reads, in declaration order.
    pub fn variables(&self) -> Vec<&str> {
        let names: Vec<&str> = match self {
            ModelSpec::Regression(spec) => std::iter::once(spec.response.as_str())
                .chain(spec.terms.iter().map(Term::variable))
                .collect(),
            ModelSpec::Measurement(spec) => spec
                .factors
                .iter()
                .flat_map(|f| f.indicators.iter().map(String::as_str))
                .collect(),
        };
        let mut vars: Vec<&str> = Vec::with_capacity(names.len());
        for name in names {
            if !vars.contains(&name) {
                vars.push(name);
            }
        }
        vars
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModelSpec::Regression(_) => "regression",
            ModelSpec::Measurement(_) => "measurement",
        }
    }
}

// =============================================================================
// Constraint Levels
// =============================================================================

/// A class of parameters that can be held equal across groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterClass {
    Loadings,
    Thresholds,
    Intercepts,
}

impl ParameterClass {
    pub fn name(self) -> &'static str {
        match self {
            ParameterClass::Loadings => "loadings",
            ParameterClass::Thresholds => "thresholds",
            ParameterClass::Intercepts => "intercepts",
        }
    }
}

/// Cross-group equality constraints of a nested multi-group model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintLevel {
    Configural,
    Metric,
    Scalar,
}

impl ConstraintLevel {
    /// All levels in nesting order.
    pub const ALL: [ConstraintLevel; 3] = [
        ConstraintLevel::Configural,
        ConstraintLevel::Metric,
        ConstraintLevel::Scalar,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConstraintLevel::Configural => "configural",
            ConstraintLevel::Metric => "metric",
            ConstraintLevel::Scalar => "scalar",
        }
    }

    /// The next, more restricted level.
    pub fn next(self) -> Option<ConstraintLevel> {
        match self {
            ConstraintLevel::Configural => Some(ConstraintLevel::Metric),
            ConstraintLevel::Metric => Some(ConstraintLevel::Scalar),
            ConstraintLevel::Scalar => None,
        }
    }

    /// Parameter classes forced equal across groups at this level.
    ///
    /// With ordered indicators the metric step also equates thresholds.
    pub fn equal_parameters(self, ordered: bool) -> Vec<ParameterClass> {
        let mut classes = Vec::new();
        if self >= ConstraintLevel::Metric {
            classes.push(ParameterClass::Loadings);
            if ordered {
                classes.push(ParameterClass::Thresholds);
            }
        }
        if self >= ConstraintLevel::Scalar {
            classes.push(ParameterClass::Intercepts);
        }
        classes
    }
}

impl fmt::Display for ConstraintLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ConstraintLevel {
    type Err = MultiGroupError;

    fn from_str(s: &str) -> Result<Self> {
        ConstraintLevel::ALL
            .iter()
            .copied()
            .find(|l| l.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                MultiGroupError::InvalidSpecification(format!("unknown constraint level '{s}'"))
            })
    }
}
