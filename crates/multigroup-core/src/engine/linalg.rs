// =============================================================================
// Least Squares Linear Algebra
// =============================================================================
//
// Design matrices are assembled as ndarray arrays; the solve itself runs in
// nalgebra. This module holds the conversions and the normal-equation solve
// used by the regression engine.
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::error::{MultiGroupError, Result};

/// Smallest acceptable ratio of a Cholesky pivot to its diagonal entry.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// ndarray → nalgebra. Iterates in logical order, so any memory layout works.
pub(crate) fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = a.dim();
    DMatrix::from_row_iterator(nrows, ncols, a.iter().copied())
}

pub(crate) fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

pub(crate) fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| m[(i, j)])
}

/// Solve the normal equations (X'X)β = X'y.
///
/// Returns (β, (X'X)⁻¹) via Cholesky. X'X is symmetric positive
/// semi-definite, so a failed factorisation means it is singular (collinear
/// predictors, or a dummy column with no observations) and the coefficients
/// are not identified.
pub(crate) fn solve_least_squares(
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> Result<(Array1<f64>, Array2<f64>)> {
    if x.nrows() != y.len() {
        return Err(MultiGroupError::DimensionMismatch(format!(
            "X has {} rows but y has {} elements",
            x.nrows(),
            y.len()
        )));
    }
    let p = x.ncols();
    let xm = to_dmatrix(x);
    let xtx = xm.transpose() * &xm;
    let xty = xm.transpose() * to_dvector(y);

    let singular = || {
        MultiGroupError::LinearAlgebraError(
            "X'X is singular; predictors are collinear or a level has no observations".to_string(),
        )
    };

    let chol = xtx.clone().cholesky().ok_or_else(singular)?;

    // Cholesky can succeed on a numerically singular matrix when rounding
    // leaves a tiny positive pivot. Compare each pivot to its diagonal entry.
    let l = chol.l();
    let degenerate = (0..p).any(|j| {
        let d = xtx[(j, j)];
        d <= 0.0 || l[(j, j)].powi(2) / d < PIVOT_TOLERANCE
    });
    if degenerate {
        return Err(singular());
    }

    let beta = chol.solve(&xty);
    let inv = chol.solve(&DMatrix::identity(p, p));
    if beta.iter().chain(inv.iter()).any(|v| !v.is_finite()) {
        return Err(singular());
    }

    Ok((beta.iter().copied().collect(), to_array2(&inv)))
}
