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

use super::msr::{MeasurementKind, Observation};
use super::{DcError, PropagationFailureSnafu};
use crate::linalg::Vector6;
use crate::propagators::Propagator;
use snafu::ResultExt;
use std::fmt;

/// The predicted measurement of one observation and its residual.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Prediction {
    pub kind: MeasurementKind,
    /// Computed measurement, the first `kind.dimension()` values are meaningful
    pub computed: Vector6<f64>,
    /// Observed minus computed, zero padded
    pub residual: Vector6<f64>,
}

impl Prediction {
    pub fn dimension(&self) -> usize {
        self.kind.dimension()
    }

    /// Residuals divided by their one sigma noise, zero padded.
    pub fn normalized(&self, sigmas: &Vector6<f64>) -> Vector6<f64> {
        let mut normalized = Vector6::zeros();
        for i in 0..self.dimension() {
            normalized[i] = self.residual[i] / sigmas[i];
        }
        normalized
    }

    /// Root mean square of the normalized residuals of this single observation.
    pub fn residual_ratio(&self, sigmas: &Vector6<f64>) -> f64 {
        (self.normalized(sigmas).norm_squared() / self.dimension() as f64).sqrt()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} residuals: [", self.kind)?;
        for i in 0..self.dimension() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.6e}", self.residual[i])?;
        }
        write!(f, "]")
    }
}

/// Propagates a state to an observation's time and projects it through that observation's measurement model.
pub struct Predictor<'a, P: Propagator> {
    pub propagator: &'a P,
}

impl<'a, P: Propagator> Clone for Predictor<'a, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, P: Propagator> Copy for Predictor<'a, P> {}

impl<'a, P: Propagator> Predictor<'a, P> {
    pub fn new(propagator: &'a P) -> Self {
        Self { propagator }
    }

    /// The computed measurement of the propagator handle's state for that (prepared) observation.
    pub fn compute(&self, handle: &P::Handle, obs: &Observation) -> Result<Vector6<f64>, DcError> {
        let state = self
            .propagator
            .propagate(handle, obs.offset)
            .context(PropagationFailureSnafu { epoch: obs.epoch })?;
        Ok(obs.kind().compute(&state, &obs.site))
    }

    /// The computed measurement and the residual (observed minus computed).
    pub fn predict(&self, handle: &P::Handle, obs: &Observation) -> Result<Prediction, DcError> {
        let kind = obs.kind();
        let computed = self.compute(handle, obs)?;
        Ok(Prediction {
            kind,
            computed,
            residual: kind.difference(&obs.data.values(), &computed),
        })
    }
}
