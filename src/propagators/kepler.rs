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

use super::{
    AstroSnafu, DecayedSnafu, InvalidInitialStateSnafu, NativeState, PropagationError, Propagator,
};
use crate::cosmic::{
    CartesianState, KeplerianElements, EARTH_GM_KM3_S2, EARTH_J2, EARTH_RADIUS_KM,
    SECONDS_PER_DAY,
};
use crate::time::{Duration, Epoch};
use snafu::{ensure, ResultExt};

/// Initialized two-body or secular J2 context.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ElementsHandle {
    pub epoch: Epoch,
    pub elements: KeplerianElements,
    pub drag_term: f64,
    /// Mean motion at epoch, rad/s
    pub mean_motion: f64,
    /// Secular rates of RAAN, AoP and mean anomaly on top of the mean motion, rad/s
    pub raan_rate: f64,
    pub aop_rate: f64,
    pub ma_rate: f64,
}

/// Exact Keplerian propagation around a point mass. The drag term, if any, is ignored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TwoBody {
    pub gm_km3_s2: f64,
}

impl TwoBody {
    pub fn new(gm_km3_s2: f64) -> Self {
        Self { gm_km3_s2 }
    }
}

impl Default for TwoBody {
    fn default() -> Self {
        Self::new(EARTH_GM_KM3_S2)
    }
}

impl Propagator for TwoBody {
    type Handle = ElementsHandle;

    fn init(&self, state: &NativeState, epoch: Epoch) -> Result<ElementsHandle, PropagationError> {
        state.elements.validate().context(InvalidInitialStateSnafu)?;
        Ok(ElementsHandle {
            epoch,
            elements: state.elements,
            drag_term: state.drag_term,
            mean_motion: state.elements.mean_motion_rad_s(self.gm_km3_s2),
            raan_rate: 0.0,
            aop_rate: 0.0,
            ma_rate: 0.0,
        })
    }

    fn propagate(
        &self,
        handle: &ElementsHandle,
        elapsed: Duration,
    ) -> Result<CartesianState, PropagationError> {
        let mut elements = handle.elements;
        elements.ma_rad += handle.mean_motion * elapsed.to_seconds();
        elements.to_cartesian(self.gm_km3_s2).context(AstroSnafu)
    }
}

/// Secular first order J2 perturbations of the node, periapsis and mean anomaly, with a
/// quadratic mean anomaly drift modeling atmospheric drag.
///
/// The drag term is the fractional rate of change of the mean motion per day: the mean motion
/// evolves as n(t) = n0 (1 + c t) and the semi-major axis follows Kepler's third law.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct J2Secular {
    pub gm_km3_s2: f64,
    pub j2: f64,
    pub radius_km: f64,
}

impl Default for J2Secular {
    fn default() -> Self {
        Self {
            gm_km3_s2: EARTH_GM_KM3_S2,
            j2: EARTH_J2,
            radius_km: EARTH_RADIUS_KM,
        }
    }
}

impl Propagator for J2Secular {
    type Handle = ElementsHandle;

    fn init(&self, state: &NativeState, epoch: Epoch) -> Result<ElementsHandle, PropagationError> {
        let elements = state.elements;
        elements.validate().context(InvalidInitialStateSnafu)?;
        ensure!(
            elements.periapsis_km() > self.radius_km,
            DecayedSnafu {
                elapsed: Duration::ZERO,
                perigee_km: elements.periapsis_km()
            }
        );

        let n0 = elements.mean_motion_rad_s(self.gm_km3_s2);
        let beta2 = 1.0 - elements.ecc.powi(2);
        let semi_latus = elements.sma_km * beta2;
        let factor = 1.5 * self.j2 * (self.radius_km / semi_latus).powi(2) * n0;
        let sin2_inc = elements.inc_rad.sin().powi(2);

        Ok(ElementsHandle {
            epoch,
            elements,
            drag_term: state.drag_term,
            mean_motion: n0,
            raan_rate: -factor * elements.inc_rad.cos(),
            aop_rate: factor * (2.0 - 2.5 * sin2_inc),
            ma_rate: factor * beta2.sqrt() * (1.0 - 1.5 * sin2_inc),
        })
    }

    fn propagate(
        &self,
        handle: &ElementsHandle,
        elapsed: Duration,
    ) -> Result<CartesianState, PropagationError> {
        let dt_s = elapsed.to_seconds();
        let growth = 1.0 + handle.drag_term * dt_s / SECONDS_PER_DAY;

        let mut elements = handle.elements;
        if growth <= 0.0 {
            return Err(PropagationError::Decayed {
                elapsed,
                perigee_km: 0.0,
            });
        }
        elements.sma_km *= growth.powf(-2.0 / 3.0);
        ensure!(
            elements.periapsis_km() > self.radius_km,
            DecayedSnafu {
                elapsed,
                perigee_km: elements.periapsis_km()
            }
        );

        elements.raan_rad += handle.raan_rate * dt_s;
        elements.aop_rad += handle.aop_rate * dt_s;
        elements.ma_rad += (handle.mean_motion + handle.ma_rate) * dt_s
            + 0.5 * handle.mean_motion * handle.drag_term * dt_s.powi(2) / SECONDS_PER_DAY;

        elements.to_cartesian(self.gm_km3_s2).context(AstroSnafu)
    }
}
