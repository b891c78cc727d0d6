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

use super::{DcError, DegenerateOrbitSnafu, InvalidRepresentationSnafu, InvalidStateSizeSnafu};
use crate::cosmic::{
    between_0_tau, CartesianState, EquinoctialElements, KeplerianElements, StateKind,
    StateVector, EARTH_GM_KM3_S2,
};
use crate::linalg::{SVector, Vector6};
use crate::propagators::NativeState;
use snafu::{ensure, ResultExt};
use std::str::FromStr;

/// Converts the caller visible state vector to and from the propagator's native state.
///
/// The first six components are interpreted according to the [`StateKind`], the optional seventh
/// component is the drag term carried unchanged by the propagator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StateAdapter {
    pub kind: StateKind,
    pub gm_km3_s2: f64,
}

impl StateAdapter {
    pub fn new(kind: StateKind) -> Self {
        Self {
            kind,
            gm_km3_s2: EARTH_GM_KM3_S2,
        }
    }

    pub fn with_gm(kind: StateKind, gm_km3_s2: f64) -> Self {
        Self { kind, gm_km3_s2 }
    }

    /// Builds an adapter from a representation name or legacy single character code.
    pub fn from_code(code: &str, gm_km3_s2: f64) -> Result<Self, DcError> {
        let kind = StateKind::from_str(code)
            .map_err(|repr| InvalidRepresentationSnafu { repr }.build())?;
        Ok(Self::with_gm(kind, gm_km3_s2))
    }

    pub fn check_size(size: usize) -> Result<(), DcError> {
        ensure!(size == 6 || size == 7, InvalidStateSizeSnafu { size });
        Ok(())
    }

    /// Copies the components of the state vector into a statically sized vector.
    pub fn to_svector<const N: usize>(state: &StateVector) -> Result<SVector<f64, N>, DcError> {
        Self::check_size(state.len())?;
        ensure!(
            state.len() == N,
            InvalidStateSizeSnafu { size: state.len() }
        );
        Ok(SVector::<f64, N>::from_column_slice(&state.components))
    }

    /// Converts the caller's components into the propagator's native state.
    pub fn to_internal<const N: usize>(&self, x: &SVector<f64, N>) -> Result<NativeState, DcError> {
        Self::check_size(N)?;
        let elements = match self.kind {
            StateKind::Cartesian => {
                let cart = CartesianState::from_vec(&x.fixed_rows::<6>(0).clone_owned());
                KeplerianElements::from_cartesian(&cart, self.gm_km3_s2)
            }
            StateKind::Classical => {
                KeplerianElements::try_new(x[0], x[1], x[2], x[3], x[4], x[5])
            }
            StateKind::Equinoctial => EquinoctialElements {
                sma_km: x[0],
                h: x[1],
                k: x[2],
                p: x[3],
                q: x[4],
                mean_lon_rad: x[5],
            }
            .to_keplerian(),
        }
        .context(DegenerateOrbitSnafu)?;

        Ok(NativeState {
            elements,
            drag_term: if N == 7 { x[6] } else { 0.0 },
        })
    }

    /// Converts the propagator's native state back into the caller's representation.
    pub fn from_internal<const N: usize>(
        &self,
        state: &NativeState,
    ) -> Result<SVector<f64, N>, DcError> {
        Self::check_size(N)?;
        let orbit: Vector6<f64> = match self.kind {
            StateKind::Cartesian => state
                .elements
                .to_cartesian(self.gm_km3_s2)
                .context(DegenerateOrbitSnafu)?
                .to_vec(),
            StateKind::Classical => {
                let kep = &state.elements;
                Vector6::new(
                    kep.sma_km,
                    kep.ecc,
                    kep.inc_rad,
                    between_0_tau(kep.raan_rad),
                    between_0_tau(kep.aop_rad),
                    between_0_tau(kep.ma_rad),
                )
            }
            StateKind::Equinoctial => {
                let equi = state.elements.to_equinoctial();
                Vector6::new(
                    equi.sma_km,
                    equi.h,
                    equi.k,
                    equi.p,
                    equi.q,
                    equi.mean_lon_rad,
                )
            }
        };

        let mut x = SVector::<f64, N>::zeros();
        x.fixed_rows_mut::<6>(0).copy_from(&orbit);
        if N == 7 {
            x[6] = state.drag_term;
        }
        Ok(x)
    }

    /// Re-expresses a state vector in another representation, keeping its drag term.
    pub fn convert(&self, state: &StateVector, into: StateKind) -> Result<StateVector, DcError> {
        let target = Self::with_gm(into, self.gm_km3_s2);
        let components = match state.len() {
            6 => {
                let native = self.to_internal(&Self::to_svector::<6>(state)?)?;
                target.from_internal::<6>(&native)?.as_slice().to_vec()
            }
            7 => {
                let native = self.to_internal(&Self::to_svector::<7>(state)?)?;
                target.from_internal::<7>(&native)?.as_slice().to_vec()
            }
            size => return InvalidStateSizeSnafu { size }.fail(),
        };
        Ok(StateVector::new(into, state.epoch, components))
    }
}
