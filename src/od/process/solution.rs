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

use crate::cosmic::StateVector;
use crate::linalg::DMatrix;
use crate::od::msr::MeasurementKind;
use crate::od::solver::SolverStrategy;
use crate::od::DcError;
use std::collections::BTreeMap;
use std::fmt;

/// How a differential correction run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Converged,
    /// The iteration or wall clock limit was reached first: the latest state is returned
    MaxIterationsExceeded,
    /// The RMS kept increasing or the correction grew unbounded: the best state is returned
    Diverged,
    /// An unrecoverable error occurred during the iterations: the latest state is returned
    Failed(DcError),
}

impl Outcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::MaxIterationsExceeded => write!(f, "maximum iterations exceeded"),
            Self::Diverged => write!(f, "diverged"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Summary of one iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationRecord {
    /// One indexed
    pub iteration: usize,
    /// State whose residuals were computed in this iteration
    pub state: Vec<f64>,
    pub rms: f64,
    pub previous_rms: Option<f64>,
    pub correction_norm: Option<f64>,
    pub solver: Option<SolverStrategy>,
    pub used: usize,
    pub skipped: usize,
    pub rejected: usize,
    /// Set on the iteration which ended the run
    pub outcome: Option<Outcome>,
}

/// Final state and statistics of a differential correction run.
#[derive(Clone, Debug, PartialEq)]
pub struct DcSolution {
    pub state: StateVector,
    /// Formal covariance of the state, i.e. the (pseudo-)inverse of the information matrix, if it was computed
    pub covariance: Option<DMatrix<f64>>,
    /// Number of iterations run
    pub iterations: usize,
    pub outcome: Outcome,
    /// Weighted RMS of the residuals of the returned state
    pub final_rms: f64,
    pub rms_by_kind: BTreeMap<MeasurementKind, f64>,
    /// Observations which contributed to the returned state
    pub num_used: usize,
    /// Observations skipped because their prediction or partials failed
    pub num_skipped: usize,
    /// Observations rejected by the sensor bounds or the residual editing
    pub num_rejected: usize,
    pub solver: Option<SolverStrategy>,
    pub history: Vec<IterationRecord>,
}

impl DcSolution {
    pub fn is_converged(&self) -> bool {
        self.outcome.is_converged()
    }

    /// Diagonal of the covariance, empty if it was not computed.
    pub fn covariance_diagonal(&self) -> Vec<f64> {
        self.covariance
            .as_ref()
            .map(|cov| cov.diagonal().iter().copied().collect())
            .unwrap_or_default()
    }

    /// One sigma formal uncertainty of each component.
    pub fn sigmas(&self) -> Vec<f64> {
        self.covariance_diagonal()
            .into_iter()
            .map(|var| var.max(0.0).sqrt())
            .collect()
    }
}

impl fmt::Display for DcSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Outcome: {}", self.outcome)?;
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(f, "Final RMS: {:.6}", self.final_rms)?;
        for (kind, rms) in &self.rms_by_kind {
            writeln!(f, "\t{kind} RMS: {rms:.6}")?;
        }
        writeln!(
            f,
            "Observations: {} used, {} skipped, {} rejected",
            self.num_used, self.num_skipped, self.num_rejected
        )?;
        writeln!(f, "Final State: {}", self.state)?;
        match &self.covariance {
            Some(cov) => write!(f, "Final Covariance:\n{cov:.3e}"),
            None => write!(f, "Final Covariance: unavailable"),
        }
    }
}
