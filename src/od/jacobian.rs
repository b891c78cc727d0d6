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

use super::msr::Observation;
use super::{
    DcError, PartialDerivativeFailureSnafu, PropagationFailureSnafu, Predictor, StateAdapter,
};
use crate::linalg::{SMatrix, SVector, Vector6};
use crate::propagators::{NativeState, Propagator};
use crate::time::Epoch;
use serde_derive::{Deserialize, Serialize};
use snafu::ResultExt;

/// One sided or two sided finite differences.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Differencing {
    /// (f(x + h) - f(x)) / h: one extra prediction per component
    #[default]
    Forward,
    /// (f(x + h) - f(x - h)) / 2h: two extra predictions per component, second order accurate.
    /// Components whose backward step leaves their domain (e.g. a zero eccentricity or inclination)
    /// fall back to a forward difference.
    Central,
}

/// Size and kind of the state perturbations.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerturbationPolicy {
    /// Perturbation as a fraction of the component's magnitude, e.g. 1e-3 is 0.1 %
    pub percent_change: f64,
    /// Smallest perturbation, used when the component is zero or close to it
    pub absolute_floor: f64,
    pub differencing: Differencing,
}

impl PerturbationPolicy {
    pub fn step(&self, component: f64) -> f64 {
        (component.abs() * self.percent_change).max(self.absolute_floor)
    }
}

/// Propagator handles of every perturbed state of one iteration.
///
/// The perturbed states only depend on the nominal state, so they are initialized once per
/// iteration and shared by all of the observations.
pub struct Perturbations<H, const N: usize> {
    pub steps: SVector<f64, N>,
    pub differencing: Differencing,
    plus: Vec<H>,
    /// None for the components differenced forward
    minus: Vec<Option<H>>,
}

impl<H: Send + Sync, const N: usize> Perturbations<H, N> {
    /// Initializes a propagator from each perturbed copy of the nominal state `x`.
    pub fn new<P: Propagator<Handle = H>>(
        propagator: &P,
        adapter: &StateAdapter,
        x: &SVector<f64, N>,
        epoch: Epoch,
        policy: &PerturbationPolicy,
    ) -> Result<Self, DcError> {
        let steps = x.map(|xi| policy.step(xi));
        let perturbed = |i: usize, sign: f64| {
            let mut perturbed = *x;
            perturbed[i] += sign * steps[i];
            adapter.to_internal(&perturbed)
        };
        let init = |i: usize, native: NativeState| -> Result<H, DcError> {
            propagator
                .init(&native, epoch)
                .context(PropagationFailureSnafu { epoch })
                .context(PartialDerivativeFailureSnafu { component: i })
        };

        let plus = (0..N)
            .map(|i| {
                let native =
                    perturbed(i, 1.0).context(PartialDerivativeFailureSnafu { component: i })?;
                init(i, native)
            })
            .collect::<Result<Vec<H>, DcError>>()?;
        let minus = match policy.differencing {
            Differencing::Forward => Vec::new(),
            Differencing::Central => (0..N)
                .map(|i| match perturbed(i, -1.0) {
                    Ok(native) => init(i, native).map(Some),
                    Err(e) => {
                        debug!("forward difference for component #{i}: {e}");
                        Ok(None)
                    }
                })
                .collect::<Result<Vec<Option<H>>, DcError>>()?,
        };

        Ok(Self {
            steps,
            differencing: policy.differencing,
            plus,
            minus,
        })
    }

    /// Partial derivatives of the observation's computed measurement with respect to each state
    /// component, given the nominal computed measurement. Rows beyond the measurement dimension are zero.
    pub fn partials<P: Propagator<Handle = H>>(
        &self,
        predictor: &Predictor<P>,
        obs: &Observation,
        nominal: &Vector6<f64>,
    ) -> Result<SMatrix<f64, 6, N>, DcError> {
        let kind = obs.kind();
        let mut h_tilde = SMatrix::<f64, 6, N>::zeros();
        for i in 0..N {
            let plus = predictor
                .compute(&self.plus[i], obs)
                .context(PartialDerivativeFailureSnafu { component: i })?;
            let column = match self.minus.get(i).and_then(Option::as_ref) {
                Some(minus) => {
                    let minus = predictor
                        .compute(minus, obs)
                        .context(PartialDerivativeFailureSnafu { component: i })?;
                    kind.difference(&plus, &minus) / (2.0 * self.steps[i])
                }
                None => kind.difference(&plus, nominal) / self.steps[i],
            };
            h_tilde.set_column(i, &column);
        }
        Ok(h_tilde)
    }
}
