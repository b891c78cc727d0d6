/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use super::{DcError, SingularSystemSnafu};
use crate::linalg::{DMatrix, DVector, SMatrix, SVector};
use enum_iterator::Sequence;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;

/// How the normal equations are solved.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Serialize, Deserialize,
)]
pub enum SolverStrategy {
    /// LU decomposition with partial pivoting, fails on a near zero pivot
    #[default]
    Direct,
    /// Singular value decomposition, unobservable directions get a zero correction
    Robust,
}

impl fmt::Display for SolverStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "LU"),
            Self::Robust => write!(f, "SVD"),
        }
    }
}

/// The state correction and the (pseudo-)inverse of the information matrix, i.e. the formal covariance.
#[derive(Clone, Debug, PartialEq)]
pub struct Correction<const N: usize> {
    pub dx: SVector<f64, N>,
    pub inverse: SMatrix<f64, N, N>,
    pub strategy: SolverStrategy,
    /// Numerical rank of the information matrix
    pub rank: usize,
}

impl<const N: usize> Correction<N> {
    /// One sigma formal uncertainty of each component.
    pub fn sigmas(&self) -> SVector<f64, N> {
        self.inverse.diagonal().map(|var| var.max(0.0).sqrt())
    }
}

/// Relative thresholds of the solvers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolverTolerances {
    /// Smallest acceptable LU pivot, relative to the largest one
    pub pivot: f64,
    /// Singular values below this fraction of the largest one are treated as zero
    pub singular_value: f64,
}

impl Default for SolverTolerances {
    fn default() -> Self {
        Self {
            pivot: 1e-12,
            singular_value: 1e-10,
        }
    }
}

/// Solves (A^T W A) dx = (A^T W b) with the requested strategy.
///
/// Both strategies work on the Jacobi scaled system D (A^T W A) D y = D (A^T W b), with
/// D = diag(1 / sqrt(info_ii)), so that states mixing kilometers and radians are not
/// misreported as singular. The correction and the inverse are scaled back before returning.
pub fn solve<const N: usize>(
    info: &SMatrix<f64, N, N>,
    normal: &SVector<f64, N>,
    strategy: SolverStrategy,
    tolerances: &SolverTolerances,
) -> Result<Correction<N>, DcError> {
    ensure!(
        info.iter().chain(normal.iter()).all(|v| v.is_finite()),
        SingularSystemSnafu {
            details: "the normal equations contain non finite values"
        }
    );

    let scale = DVector::from_iterator(
        N,
        info.diagonal()
            .iter()
            .map(|d| if *d > 0.0 { 1.0 / d.sqrt() } else { 1.0 }),
    );
    let scaling = DMatrix::from_diagonal(&scale);
    let scaled_info = &scaling * DMatrix::from_iterator(N, N, info.iter().copied()) * &scaling;
    let scaled_normal = &scaling * DVector::from_iterator(N, normal.iter().copied());

    let (y, scaled_inverse, rank) = match strategy {
        SolverStrategy::Direct => solve_direct(scaled_info, &scaled_normal, tolerances.pivot)?,
        SolverStrategy::Robust => {
            solve_robust(scaled_info, &scaled_normal, tolerances.singular_value)?
        }
    };

    let dx = &scaling * y;
    let inverse = &scaling * scaled_inverse * &scaling;

    Ok(Correction {
        dx: SVector::<f64, N>::from_iterator(dx.iter().copied()),
        inverse: SMatrix::<f64, N, N>::from_iterator(inverse.iter().copied()),
        strategy,
        rank,
    })
}

fn solve_direct(
    info: DMatrix<f64>,
    normal: &DVector<f64>,
    pivot_tol: f64,
) -> Result<(DVector<f64>, DMatrix<f64>, usize), DcError> {
    let n = info.nrows();
    let lu = info.lu();
    let pivots = lu.u().diagonal().map(f64::abs);
    let max_pivot = pivots.max();
    let min_pivot = pivots.min();
    ensure!(
        max_pivot > 0.0 && min_pivot > pivot_tol * max_pivot,
        SingularSystemSnafu {
            details: format!(
                "LU pivot ratio {:.3e} below {pivot_tol:.1e}",
                if max_pivot > 0.0 { min_pivot / max_pivot } else { 0.0 }
            )
        }
    );

    let y = lu.solve(normal).ok_or_else(|| {
        SingularSystemSnafu {
            details: "LU back substitution failed",
        }
        .build()
    })?;
    let inverse = lu.try_inverse().ok_or_else(|| {
        SingularSystemSnafu {
            details: "information matrix is not invertible",
        }
        .build()
    })?;
    Ok((y, inverse, n))
}

fn solve_robust(
    info: DMatrix<f64>,
    normal: &DVector<f64>,
    sv_tol: f64,
) -> Result<(DVector<f64>, DMatrix<f64>, usize), DcError> {
    let svd = info.svd(true, true);
    let max_sv = svd.singular_values.max();
    ensure!(
        max_sv.is_finite() && max_sv > 0.0,
        SingularSystemSnafu {
            details: "information matrix is null"
        }
    );
    let threshold = sv_tol * max_sv;
    let rank = svd.rank(threshold);
    let n = svd.singular_values.len();
    if rank < n {
        debug!("SVD solver: {} unobservable direction(s) zeroed", n - rank);
    }

    let pseudo_inverse = svd.pseudo_inverse(threshold).map_err(|e| {
        SingularSystemSnafu {
            details: e.to_string(),
        }
        .build()
    })?;
    let y = &pseudo_inverse * normal;
    Ok((y, pseudo_inverse, rank))
}
