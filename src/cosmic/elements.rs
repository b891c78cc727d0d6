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
    between_0_tau, AstroError, CartesianState, KeplerNoConvergenceSnafu, NonPhysicalSnafu,
};
use crate::linalg::Vector3;
use snafu::ensure;
use std::f64::consts::PI;
use std::fmt;

/// Below this eccentricity, the argument of periapsis is set to zero and the anomaly is measured from the node.
pub const ECC_EPSILON: f64 = 1e-11;
/// Below this ratio of node vector to angular momentum norms, the orbit is considered equatorial.
pub const NODE_EPSILON: f64 = 1e-11;

const KEPLER_TOL: f64 = 1e-14;
const KEPLER_MAX_ITER: usize = 50;

/// Osculating Keplerian elements of an elliptical orbit. All angles in radians.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KeplerianElements {
    pub sma_km: f64,
    pub ecc: f64,
    pub inc_rad: f64,
    pub raan_rad: f64,
    pub aop_rad: f64,
    pub ma_rad: f64,
}

/// Equinoctial elements, non singular for circular and equatorial orbits (but singular at i = 180 deg).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EquinoctialElements {
    pub sma_km: f64,
    /// e * sin(ω + Ω)
    pub h: f64,
    /// e * cos(ω + Ω)
    pub k: f64,
    /// tan(i/2) * sin(Ω)
    pub p: f64,
    /// tan(i/2) * cos(Ω)
    pub q: f64,
    /// Mean longitude M + ω + Ω
    pub mean_lon_rad: f64,
}

impl KeplerianElements {
    /// Builds and validates a set of elliptical Keplerian elements.
    pub fn try_new(
        sma_km: f64,
        ecc: f64,
        inc_rad: f64,
        raan_rad: f64,
        aop_rad: f64,
        ma_rad: f64,
    ) -> Result<Self, AstroError> {
        let me = Self {
            sma_km,
            ecc,
            inc_rad,
            raan_rad,
            aop_rad,
            ma_rad,
        };
        me.validate()?;
        Ok(me)
    }

    /// Ensures that these elements describe a bound, non-degenerate orbit.
    pub fn validate(&self) -> Result<(), AstroError> {
        ensure!(
            self.sma_km.is_finite()
                && self.ecc.is_finite()
                && self.inc_rad.is_finite()
                && self.raan_rad.is_finite()
                && self.aop_rad.is_finite()
                && self.ma_rad.is_finite(),
            NonPhysicalSnafu {
                details: format!("non finite elements {self:?}")
            }
        );
        ensure!(
            self.sma_km > 0.0,
            NonPhysicalSnafu {
                details: format!("semi-major axis must be positive, got {} km", self.sma_km)
            }
        );
        ensure!(
            (0.0..1.0).contains(&self.ecc),
            NonPhysicalSnafu {
                details: format!("eccentricity must be in [0, 1), got {}", self.ecc)
            }
        );
        ensure!(
            (0.0..=PI).contains(&self.inc_rad),
            NonPhysicalSnafu {
                details: format!("inclination must be in [0, pi], got {} rad", self.inc_rad)
            }
        );
        Ok(())
    }

    /// Converts an inertial Cartesian state into osculating Keplerian elements.
    ///
    /// Circular orbits get a zero argument of periapsis and equatorial orbits a zero RAAN, so that
    /// the conversion back to Cartesian is always continuous in position and velocity.
    pub fn from_cartesian(state: &CartesianState, gm: f64) -> Result<Self, AstroError> {
        let r = state.position_km;
        let v = state.velocity_km_s;
        let rmag = r.norm();
        let vmag = v.norm();
        ensure!(
            rmag.is_finite() && vmag.is_finite() && rmag > 0.0,
            NonPhysicalSnafu {
                details: format!("invalid position norm {rmag} km or velocity norm {vmag} km/s")
            }
        );

        let hvec = r.cross(&v);
        let hmag = hvec.norm();
        ensure!(
            hmag > 1e-10 * rmag * vmag.max(f64::EPSILON),
            NonPhysicalSnafu {
                details: format!("near zero angular momentum ({hmag:e} km^2/s), rectilinear orbit")
            }
        );

        let energy = vmag.powi(2) / 2.0 - gm / rmag;
        ensure!(
            energy < 0.0,
            NonPhysicalSnafu {
                details: format!("orbit is not bound (energy = {energy} km^2/s^2)")
            }
        );
        let sma_km = -gm / (2.0 * energy);

        let evec = ((vmag.powi(2) - gm / rmag) * r - r.dot(&v) * v) / gm;
        let ecc = evec.norm();
        ensure!(
            ecc < 1.0,
            NonPhysicalSnafu {
                details: format!("eccentricity {ecc} is not elliptical")
            }
        );

        let h_hat = hvec / hmag;
        let inc_rad = h_hat.x.hypot(h_hat.y).atan2(h_hat.z);

        let node = Vector3::new(-hvec.y, hvec.x, 0.0);
        let raan_rad = if node.norm() < NODE_EPSILON * hmag {
            0.0
        } else {
            between_0_tau(node.y.atan2(node.x))
        };

        // In-plane basis: n_hat along the line of nodes, m_hat ninety degrees ahead of it
        let n_hat = Vector3::new(raan_rad.cos(), raan_rad.sin(), 0.0);
        let m_hat = h_hat.cross(&n_hat);

        let aol = r.dot(&m_hat).atan2(r.dot(&n_hat));
        let (aop_rad, ta_rad) = if ecc < ECC_EPSILON {
            (0.0, aol)
        } else {
            let aop = evec.dot(&m_hat).atan2(evec.dot(&n_hat));
            (between_0_tau(aop), aol - aop)
        };

        let ecc_anomaly = ((1.0 - ecc.powi(2)).sqrt() * ta_rad.sin()).atan2(ecc + ta_rad.cos());
        let ma_rad = between_0_tau(ecc_anomaly - ecc * ecc_anomaly.sin());

        Ok(Self {
            sma_km,
            ecc,
            inc_rad,
            raan_rad,
            aop_rad,
            ma_rad,
        })
    }

    /// Converts these elements into an inertial Cartesian state.
    pub fn to_cartesian(&self, gm: f64) -> Result<CartesianState, AstroError> {
        self.validate()?;
        let ecc = self.ecc;
        let ecc_anomaly = solve_kepler(self.ma_rad, ecc)?;
        let (sin_e, cos_e) = ecc_anomaly.sin_cos();
        let beta = (1.0 - ecc.powi(2)).sqrt();

        let ta_rad = (beta * sin_e).atan2(cos_e - ecc);
        let rmag = self.sma_km * (1.0 - ecc * cos_e);
        let semi_latus = self.sma_km * beta.powi(2);
        let sqrt_gm_p = (gm / semi_latus).sqrt();

        let (sin_raan, cos_raan) = self.raan_rad.sin_cos();
        let (sin_inc, cos_inc) = self.inc_rad.sin_cos();
        let n_hat = Vector3::new(cos_raan, sin_raan, 0.0);
        let m_hat = Vector3::new(-sin_raan * cos_inc, cos_raan * cos_inc, sin_inc);

        let (sin_aop, cos_aop) = self.aop_rad.sin_cos();
        let p_hat = cos_aop * n_hat + sin_aop * m_hat;
        let q_hat = -sin_aop * n_hat + cos_aop * m_hat;

        let (sin_ta, cos_ta) = ta_rad.sin_cos();
        let position_km = rmag * (cos_ta * p_hat + sin_ta * q_hat);
        let velocity_km_s = sqrt_gm_p * (-sin_ta * p_hat + (ecc + cos_ta) * q_hat);

        Ok(CartesianState {
            position_km,
            velocity_km_s,
        })
    }

    /// Mean motion in rad/s
    pub fn mean_motion_rad_s(&self, gm: f64) -> f64 {
        (gm / self.sma_km.powi(3)).sqrt()
    }

    /// Radius of periapsis in km
    pub fn periapsis_km(&self) -> f64 {
        self.sma_km * (1.0 - self.ecc)
    }

    pub fn to_equinoctial(&self) -> EquinoctialElements {
        let lon_peri = self.raan_rad + self.aop_rad;
        let tan_half_inc = (self.inc_rad / 2.0).tan();
        EquinoctialElements {
            sma_km: self.sma_km,
            h: self.ecc * lon_peri.sin(),
            k: self.ecc * lon_peri.cos(),
            p: tan_half_inc * self.raan_rad.sin(),
            q: tan_half_inc * self.raan_rad.cos(),
            mean_lon_rad: between_0_tau(lon_peri + self.ma_rad),
        }
    }
}

impl EquinoctialElements {
    pub fn to_keplerian(&self) -> Result<KeplerianElements, AstroError> {
        let ecc = self.h.hypot(self.k);
        let tan_half_inc = self.p.hypot(self.q);
        let raan_rad = if tan_half_inc < NODE_EPSILON {
            0.0
        } else {
            between_0_tau(self.p.atan2(self.q))
        };
        let lon_peri = if ecc < ECC_EPSILON {
            raan_rad
        } else {
            self.h.atan2(self.k)
        };
        KeplerianElements::try_new(
            self.sma_km,
            ecc,
            2.0 * tan_half_inc.atan(),
            raan_rad,
            between_0_tau(lon_peri - raan_rad),
            between_0_tau(self.mean_lon_rad - lon_peri),
        )
    }
}

impl fmt::Display for KeplerianElements {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "sma = {:.6} km\tecc = {:.9}\tinc = {:.6} deg\traan = {:.6} deg\taop = {:.6} deg\tma = {:.6} deg",
            self.sma_km,
            self.ecc,
            self.inc_rad.to_degrees(),
            self.raan_rad.to_degrees(),
            self.aop_rad.to_degrees(),
            self.ma_rad.to_degrees()
        )
    }
}

/// Solves Kepler's equation M = E - e sin E for the eccentric anomaly E using Newton-Raphson.
pub fn solve_kepler(ma_rad: f64, ecc: f64) -> Result<f64, AstroError> {
    let ma = between_0_tau(ma_rad);
    let mut ecc_anomaly = if ecc < 0.8 { ma } else { PI };
    for _ in 0..KEPLER_MAX_ITER {
        let f = ecc_anomaly - ecc * ecc_anomaly.sin() - ma;
        let fp = 1.0 - ecc * ecc_anomaly.cos();
        let delta = f / fp;
        ecc_anomaly -= delta;
        if delta.abs() < KEPLER_TOL {
            return Ok(ecc_anomaly);
        }
    }
    KeplerNoConvergenceSnafu {
        mean_anomaly_rad: ma_rad,
        ecc,
    }
    .fail()
}
