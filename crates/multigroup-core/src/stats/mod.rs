// =============================================================================
// Fit Statistics
// =============================================================================
//
// Engines report goodness-of-fit numbers by name. Rather than passing string
// keys around (where a typo like "cif" silently becomes a missing column three
// steps later), every statistic the library knows about is a variant of the
// closed `FitStatistic` enum. String names are parsed exactly once, when the
// caller builds a `StatisticSet`, and rejected there if unknown.
//
// NAMING:
// -------
// Names follow the spelling used by the common SEM and regression reports:
//   - factor models:  chisq, df, pvalue, rmsea, rmsea.ci.lower, cfi, tli, ...
//   - robust variants: the same name with a ".scaled" suffix
//   - regression:     r.squared, adj.r.squared, sigma, statistic, p.value, ...
//
// =============================================================================

pub mod indices;
pub mod inference;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MultiGroupError, Result};

/// A goodness-of-fit statistic from the closed key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FitStatistic {
    ChiSquare,
    Df,
    PValue,
    ChiSquareScaled,
    DfScaled,
    PValueScaled,
    BaselineChiSquare,
    BaselineDf,
    Cfi,
    Tli,
    CfiScaled,
    TliScaled,
    Rmsea,
    RmseaCiLower,
    RmseaCiUpper,
    RmseaScaled,
    RmseaCiLowerScaled,
    RmseaCiUpperScaled,
    Srmr,
    RSquared,
    AdjRSquared,
    Sigma,
    FStatistic,
    FPValue,
    LogLik,
    Aic,
    Bic,
    Deviance,
    DfResidual,
    NObs,
}

impl FitStatistic {
    /// Every statistic, in canonical order.
    pub const ALL: [FitStatistic; 30] = [
        FitStatistic::ChiSquare,
        FitStatistic::Df,
        FitStatistic::PValue,
        FitStatistic::ChiSquareScaled,
        FitStatistic::DfScaled,
        FitStatistic::PValueScaled,
        FitStatistic::BaselineChiSquare,
        FitStatistic::BaselineDf,
        FitStatistic::Cfi,
        FitStatistic::Tli,
        FitStatistic::CfiScaled,
        FitStatistic::TliScaled,
        FitStatistic::Rmsea,
        FitStatistic::RmseaCiLower,
        FitStatistic::RmseaCiUpper,
        FitStatistic::RmseaScaled,
        FitStatistic::RmseaCiLowerScaled,
        FitStatistic::RmseaCiUpperScaled,
        FitStatistic::Srmr,
        FitStatistic::RSquared,
        FitStatistic::AdjRSquared,
        FitStatistic::Sigma,
        FitStatistic::FStatistic,
        FitStatistic::FPValue,
        FitStatistic::LogLik,
        FitStatistic::Aic,
        FitStatistic::Bic,
        FitStatistic::Deviance,
        FitStatistic::DfResidual,
        FitStatistic::NObs,
    ];

    /// The report name of this statistic.
    pub fn name(self) -> &'static str {
        match self {
            FitStatistic::ChiSquare => "chisq",
            FitStatistic::Df => "df",
            FitStatistic::PValue => "pvalue",
            FitStatistic::ChiSquareScaled => "chisq.scaled",
            FitStatistic::DfScaled => "df.scaled",
            FitStatistic::PValueScaled => "pvalue.scaled",
            FitStatistic::BaselineChiSquare => "baseline.chisq",
            FitStatistic::BaselineDf => "baseline.df",
            FitStatistic::Cfi => "cfi",
            FitStatistic::Tli => "tli",
            FitStatistic::CfiScaled => "cfi.scaled",
            FitStatistic::TliScaled => "tli.scaled",
            FitStatistic::Rmsea => "rmsea",
            FitStatistic::RmseaCiLower => "rmsea.ci.lower",
            FitStatistic::RmseaCiUpper => "rmsea.ci.upper",
            FitStatistic::RmseaScaled => "rmsea.scaled",
            FitStatistic::RmseaCiLowerScaled => "rmsea.ci.lower.scaled",
            FitStatistic::RmseaCiUpperScaled => "rmsea.ci.upper.scaled",
            FitStatistic::Srmr => "srmr",
            FitStatistic::RSquared => "r.squared",
            FitStatistic::AdjRSquared => "adj.r.squared",
            FitStatistic::Sigma => "sigma",
            FitStatistic::FStatistic => "statistic",
            FitStatistic::FPValue => "p.value",
            FitStatistic::LogLik => "logLik",
            FitStatistic::Aic => "AIC",
            FitStatistic::Bic => "BIC",
            FitStatistic::Deviance => "deviance",
            FitStatistic::DfResidual => "df.residual",
            FitStatistic::NObs => "nobs",
        }
    }

    /// Robust ("scaled") variant reported by robust/weighted estimators only.
    pub fn is_scaled(self) -> bool {
        matches!(
            self,
            FitStatistic::ChiSquareScaled
                | FitStatistic::DfScaled
                | FitStatistic::PValueScaled
                | FitStatistic::CfiScaled
                | FitStatistic::TliScaled
                | FitStatistic::RmseaScaled
                | FitStatistic::RmseaCiLowerScaled
                | FitStatistic::RmseaCiUpperScaled
        )
    }

    /// Counts rather than continuous quantities; formatted without decimals.
    pub fn is_count(self) -> bool {
        matches!(
            self,
            FitStatistic::Df
                | FitStatistic::DfScaled
                | FitStatistic::BaselineDf
                | FitStatistic::DfResidual
                | FitStatistic::NObs
        )
    }

    pub fn is_pvalue(self) -> bool {
        matches!(
            self,
            FitStatistic::PValue | FitStatistic::PValueScaled | FitStatistic::FPValue
        )
    }
}

impl fmt::Display for FitStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FitStatistic {
    type Err = MultiGroupError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        FitStatistic::ALL
            .iter()
            .copied()
            .find(|stat| stat.name() == key)
            .ok_or_else(|| MultiGroupError::UnknownStatistic(key.to_string()))
    }
}

impl TryFrom<String> for FitStatistic {
    type Error = MultiGroupError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FitStatistic> for String {
    fn from(stat: FitStatistic) -> Self {
        stat.name().to_string()
    }
}

// =============================================================================
// Statistic Sets
// =============================================================================

/// An ordered, duplicate-free list of statistics to extract.
///
/// The order is the column order of every table built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FitStatistic>", into = "Vec<FitStatistic>")]
pub struct StatisticSet {
    stats: Vec<FitStatistic>,
}

impl StatisticSet {
    pub fn new(stats: Vec<FitStatistic>) -> Result<Self> {
        if stats.is_empty() {
            return Err(MultiGroupError::EmptyInput(
                "statistic set has no statistics".to_string(),
            ));
        }
        for (i, stat) in stats.iter().enumerate() {
            if stats[..i].contains(stat) {
                return Err(MultiGroupError::InvalidValue(format!(
                    "statistic '{}' is requested more than once",
                    stat.name()
                )));
            }
        }
        Ok(Self { stats })
    }

    /// Validate a list of statistic names.
    pub fn parse(names: &[&str]) -> Result<Self> {
        let stats = names
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<_>>>()?;
        Self::new(stats)
    }

    /// Standard factor-model report: chi-square test, RMSEA with its interval, TLI, CFI.
    pub fn cfa() -> Self {
        Self {
            stats: vec![
                FitStatistic::ChiSquare,
                FitStatistic::Df,
                FitStatistic::PValue,
                FitStatistic::Rmsea,
                FitStatistic::RmseaCiLower,
                FitStatistic::RmseaCiUpper,
                FitStatistic::Tli,
                FitStatistic::Cfi,
            ],
        }
    }

    /// `cfa()` plus the robust variants reported by weighted estimators.
    pub fn cfa_scaled() -> Self {
        let mut stats = Self::cfa().stats;
        stats.extend([
            FitStatistic::ChiSquareScaled,
            FitStatistic::DfScaled,
            FitStatistic::PValueScaled,
            FitStatistic::RmseaScaled,
            FitStatistic::RmseaCiLowerScaled,
            FitStatistic::RmseaCiUpperScaled,
            FitStatistic::TliScaled,
            FitStatistic::CfiScaled,
        ]);
        Self { stats }
    }

    /// Model-level summary for linear regression.
    pub fn regression() -> Self {
        Self {
            stats: vec![
                FitStatistic::RSquared,
                FitStatistic::AdjRSquared,
                FitStatistic::Sigma,
                FitStatistic::FStatistic,
                FitStatistic::FPValue,
                FitStatistic::Df,
                FitStatistic::Aic,
                FitStatistic::Bic,
                FitStatistic::NObs,
            ],
        }
    }

    pub fn as_slice(&self) -> &[FitStatistic] {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn contains(&self, stat: FitStatistic) -> bool {
        self.stats.contains(&stat)
    }

    pub fn iter(&self) -> impl Iterator<Item = FitStatistic> + '_ {
        self.stats.iter().copied()
    }
}

impl TryFrom<Vec<FitStatistic>> for StatisticSet {
    type Error = MultiGroupError;

    fn try_from(stats: Vec<FitStatistic>) -> Result<Self> {
        Self::new(stats)
    }
}

impl From<StatisticSet> for Vec<FitStatistic> {
    fn from(set: StatisticSet) -> Self {
        set.stats
    }
}
