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

use crate::linalg::{Matrix3, Vector3, Vector6};
use crate::time::Epoch;
use enum_iterator::Sequence;
use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;
use std::convert::TryFrom;
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

/// Earth orientation parameters, frame transforms and ground site geometry.
pub mod earth;

/// Keplerian and equinoctial orbital elements and their conversions.
pub mod elements;

pub use earth::{
    EarthOrientation, EopCorrections, EopProvider, EopSeries, FrameTransform, GeodeticSite,
    Interpolation, SiteState,
};
pub use elements::{EquinoctialElements, KeplerianElements};

/// Gravitational parameter of the Earth (WGS-84), in km^3/s^2
pub const EARTH_GM_KM3_S2: f64 = 398_600.441_8;
/// Equatorial radius of the Earth (WGS-84), in km
pub const EARTH_RADIUS_KM: f64 = 6_378.137;
/// Flattening of the Earth (WGS-84)
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257_223_563;
/// Nominal rotation rate of the Earth, in rad/s
pub const EARTH_ROTATION_RATE_RAD_S: f64 = 7.292_115_146_706_979e-5;
/// Second zonal harmonic of the Earth gravity field
pub const EARTH_J2: f64 = 1.082_626_68e-3;

/// Seconds in one day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AstroError {
    #[snafu(display("non-physical orbit: {details}"))]
    NonPhysical { details: String },
    #[snafu(display("Kepler's equation did not converge for M = {mean_anomaly_rad} rad, e = {ecc}"))]
    KeplerNoConvergence { mean_anomaly_rad: f64, ecc: f64 },
}

/// The representation in which the caller provides and receives the state vector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Serialize, Deserialize)]
pub enum StateKind {
    /// Position (km) and velocity (km/s)
    Cartesian,
    /// a (km), e, i, RAAN, AoP, mean anomaly (rad)
    Classical,
    /// a (km), h, k, p, q, mean longitude (rad)
    Equinoctial,
}

impl TryFrom<char> for StateKind {
    type Error = String;

    /// Legacy single character codes
    fn try_from(code: char) -> Result<Self, Self::Error> {
        match code.to_ascii_uppercase() {
            'C' | 'X' => Ok(Self::Cartesian),
            'K' => Ok(Self::Classical),
            'E' => Ok(Self::Equinoctial),
            _ => Err(code.to_string()),
        }
    }
}

impl FromStr for StateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cartesian" | "cart" => Ok(Self::Cartesian),
            "classical" | "keplerian" | "kep" => Ok(Self::Classical),
            "equinoctial" | "equi" => Ok(Self::Equinoctial),
            other if other.chars().count() == 1 => s
                .trim()
                .chars()
                .next()
                .map_or(Err(s.to_string()), Self::try_from),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cartesian => write!(f, "Cartesian"),
            Self::Classical => write!(f, "classical elements"),
            Self::Equinoctial => write!(f, "equinoctial elements"),
        }
    }
}

/// The caller visible state: 6 orbital components, optionally followed by a drag term.
#[derive(Clone, Debug, PartialEq)]
pub struct StateVector {
    pub kind: StateKind,
    pub epoch: Epoch,
    pub components: Vec<f64>,
}

impl StateVector {
    pub fn new(kind: StateKind, epoch: Epoch, components: Vec<f64>) -> Self {
        Self {
            kind,
            epoch,
            components,
        }
    }

    /// Initializes a Cartesian state, units of km and km/s.
    pub fn cartesian(position_km: Vector3<f64>, velocity_km_s: Vector3<f64>, epoch: Epoch) -> Self {
        Self::new(
            StateKind::Cartesian,
            epoch,
            vec![
                position_km.x,
                position_km.y,
                position_km.z,
                velocity_km_s.x,
                velocity_km_s.y,
                velocity_km_s.z,
            ],
        )
    }

    /// Returns a copy of this state with a drag term appended (or replaced).
    pub fn with_drag_term(mut self, drag_term: f64) -> Self {
        self.components.truncate(6);
        self.components.push(drag_term);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {} [", self.kind, self.epoch)?;
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c:.9}")?;
        }
        write!(f, "]")
    }
}

/// Inertial position and velocity as returned by a propagator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CartesianState {
    /// in km
    pub position_km: Vector3<f64>,
    /// in km/s
    pub velocity_km_s: Vector3<f64>,
}

impl CartesianState {
    pub fn new(position_km: Vector3<f64>, velocity_km_s: Vector3<f64>) -> Self {
        Self {
            position_km,
            velocity_km_s,
        }
    }

    pub fn from_vec(state: &Vector6<f64>) -> Self {
        Self {
            position_km: state.fixed_rows::<3>(0).clone_owned(),
            velocity_km_s: state.fixed_rows::<3>(3).clone_owned(),
        }
    }

    pub fn to_vec(&self) -> Vector6<f64> {
        Vector6::new(
            self.position_km.x,
            self.position_km.y,
            self.position_km.z,
            self.velocity_km_s.x,
            self.velocity_km_s.y,
            self.velocity_km_s.z,
        )
    }

    pub fn rmag_km(&self) -> f64 {
        self.position_km.norm()
    }

    pub fn vmag_km_s(&self) -> f64 {
        self.velocity_km_s.norm()
    }
}

/// Rotation about the X axis by the provided angle in radians (passive).
pub fn r1(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

/// Rotation about the Y axis by the provided angle in radians (passive).
pub fn r2(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c)
}

/// Rotation about the Z axis by the provided angle in radians (passive).
pub fn r3(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Returns the provided angle bounded between 0.0 and 2π
pub fn between_0_tau(angle_rad: f64) -> f64 {
    let wrapped = angle_rad.rem_euclid(TAU);
    // rem_euclid may round up to TAU itself
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Returns the provided angle bounded between -π and +π
pub fn between_pm_pi(angle_rad: f64) -> f64 {
    let wrapped = between_0_tau(angle_rad);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}
