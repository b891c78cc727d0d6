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

use crate::cosmic::{between_0_tau, between_pm_pi, CartesianState, FrameTransform};
use crate::io::{epoch_from_str, epoch_to_str, ConfigRepr};
use crate::linalg::Vector6;
use crate::time::{Duration, Epoch};
use enum_iterator::Sequence;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

pub use crate::cosmic::SiteState;

/// Ground sensors: site, validity bounds and noise.
pub mod sensor;
pub use sensor::{AxisBounds, Sensor};

/// The closed set of supported measurement types.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Serialize, Deserialize,
)]
pub enum MeasurementKind {
    /// Topocentric range, km
    Range,
    /// Azimuth (clockwise from North) and elevation, radians
    AzEl,
    /// Range, azimuth and elevation
    RangeAzEl,
    /// Topocentric right ascension and declination, radians
    RaDec,
    /// Inertial position and velocity, km and km/s
    Ephemeris,
}

impl MeasurementKind {
    /// Number of scalar values in this measurement, between 1 and 6.
    pub fn dimension(&self) -> usize {
        self.axes().len()
    }

    pub fn axes(&self) -> &'static [Axis] {
        match self {
            Self::Range => &[Axis::Range],
            Self::AzEl => &[Axis::Azimuth, Axis::Elevation],
            Self::RangeAzEl => &[Axis::Range, Axis::Azimuth, Axis::Elevation],
            Self::RaDec => &[Axis::RightAscension, Axis::Declination],
            Self::Ephemeris => &[Axis::X, Axis::Y, Axis::Z, Axis::Vx, Axis::Vy, Axis::Vz],
        }
    }

    /// Computes this measurement of the provided inertial state as seen from the provided site.
    /// Only the first `dimension()` values are meaningful, the rest are zero.
    pub fn compute(&self, sat: &CartesianState, site: &SiteState) -> Vector6<f64> {
        let rho_inertial = sat.position_km - site.position_km;
        let range_km = rho_inertial.norm();
        let mut values = Vector6::zeros();
        match self {
            Self::Range => values[0] = range_km,
            Self::AzEl | Self::RangeAzEl => {
                let rho_sez = site.sez_from_inertial * rho_inertial;
                let azimuth = between_0_tau(rho_sez.y.atan2(-rho_sez.x));
                let elevation = (rho_sez.z / range_km).asin();
                if *self == Self::AzEl {
                    values[0] = azimuth;
                    values[1] = elevation;
                } else {
                    values[0] = range_km;
                    values[1] = azimuth;
                    values[2] = elevation;
                }
            }
            Self::RaDec => {
                values[0] = between_0_tau(rho_inertial.y.atan2(rho_inertial.x));
                values[1] = (rho_inertial.z / range_km).asin();
            }
            Self::Ephemeris => values = sat.to_vec(),
        }
        values
    }

    /// Observed minus computed, with the angles which wrap around the circle reduced to [-π, π].
    pub fn difference(&self, observed: &Vector6<f64>, computed: &Vector6<f64>) -> Vector6<f64> {
        let mut delta = observed - computed;
        for (i, axis) in self.axes().iter().enumerate() {
            if axis.is_wrapped_angle() {
                delta[i] = between_pm_pi(delta[i]);
            }
        }
        delta
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Range => write!(f, "range"),
            Self::AzEl => write!(f, "az/el"),
            Self::RangeAzEl => write!(f, "range/az/el"),
            Self::RaDec => write!(f, "RA/Dec"),
            Self::Ephemeris => write!(f, "ephemeris"),
        }
    }
}

/// A single measurement axis, used to key the sensor noise and validity bounds.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Serialize, Deserialize,
)]
pub enum Axis {
    Range,
    Azimuth,
    Elevation,
    RightAscension,
    Declination,
    X,
    Y,
    Z,
    Vx,
    Vy,
    Vz,
}

impl Axis {
    /// Azimuth and right ascension wrap around at 2π.
    pub fn is_wrapped_angle(&self) -> bool {
        matches!(self, Self::Azimuth | Self::RightAscension)
    }
}

/// The measured values, tagged by their kind.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MeasurementData {
    Range {
        range_km: f64,
    },
    AzEl {
        azimuth_rad: f64,
        elevation_rad: f64,
    },
    RangeAzEl {
        range_km: f64,
        azimuth_rad: f64,
        elevation_rad: f64,
    },
    RaDec {
        right_ascension_rad: f64,
        declination_rad: f64,
    },
    Ephemeris {
        position_km: [f64; 3],
        velocity_km_s: [f64; 3],
    },
}

impl MeasurementData {
    pub fn kind(&self) -> MeasurementKind {
        match self {
            Self::Range { .. } => MeasurementKind::Range,
            Self::AzEl { .. } => MeasurementKind::AzEl,
            Self::RangeAzEl { .. } => MeasurementKind::RangeAzEl,
            Self::RaDec { .. } => MeasurementKind::RaDec,
            Self::Ephemeris { .. } => MeasurementKind::Ephemeris,
        }
    }

    /// Values in the order of `kind().axes()`, zero padded.
    pub fn values(&self) -> Vector6<f64> {
        match *self {
            Self::Range { range_km } => Vector6::new(range_km, 0.0, 0.0, 0.0, 0.0, 0.0),
            Self::AzEl {
                azimuth_rad,
                elevation_rad,
            } => Vector6::new(azimuth_rad, elevation_rad, 0.0, 0.0, 0.0, 0.0),
            Self::RangeAzEl {
                range_km,
                azimuth_rad,
                elevation_rad,
            } => Vector6::new(range_km, azimuth_rad, elevation_rad, 0.0, 0.0, 0.0),
            Self::RaDec {
                right_ascension_rad,
                declination_rad,
            } => Vector6::new(right_ascension_rad, declination_rad, 0.0, 0.0, 0.0, 0.0),
            Self::Ephemeris {
                position_km: r,
                velocity_km_s: v,
            } => Vector6::new(r[0], r[1], r[2], v[0], v[1], v[2]),
        }
    }

    /// Builds the data of the provided kind from its values, in the order of `kind.axes()`.
    pub fn from_values(kind: MeasurementKind, values: &Vector6<f64>) -> Self {
        match kind {
            MeasurementKind::Range => Self::Range {
                range_km: values[0],
            },
            MeasurementKind::AzEl => Self::AzEl {
                azimuth_rad: values[0],
                elevation_rad: values[1],
            },
            MeasurementKind::RangeAzEl => Self::RangeAzEl {
                range_km: values[0],
                azimuth_rad: values[1],
                elevation_rad: values[2],
            },
            MeasurementKind::RaDec => Self::RaDec {
                right_ascension_rad: values[0],
                declination_rad: values[1],
            },
            MeasurementKind::Ephemeris => Self::Ephemeris {
                position_km: [values[0], values[1], values[2]],
                velocity_km_s: [values[3], values[4], values[5]],
            },
        }
    }
}

fn zero_offset() -> Duration {
    Duration::ZERO
}

/// A time tagged measurement of one target by one sensor.
///
/// The site state and the offset from the estimated state's epoch are derived once by [`Observation::prepare`]
/// before the iterations start, and are not part of the serialized record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sensor_id: u32,
    #[serde(default)]
    pub target_id: u32,
    #[serde(serialize_with = "epoch_to_str", deserialize_with = "epoch_from_str")]
    pub epoch: Epoch,
    pub data: MeasurementData,
    #[serde(skip)]
    pub site: SiteState,
    #[serde(skip, default = "zero_offset")]
    pub offset: Duration,
}

impl Observation {
    pub fn new(sensor_id: u32, target_id: u32, epoch: Epoch, data: MeasurementData) -> Self {
        Self {
            sensor_id,
            target_id,
            epoch,
            data,
            site: SiteState::default(),
            offset: Duration::ZERO,
        }
    }

    pub fn kind(&self) -> MeasurementKind {
        self.data.kind()
    }

    /// Derives the sensor site geometry at the observation epoch and the offset from the state epoch.
    pub fn prepare(&mut self, sensor: &Sensor, earth: &dyn FrameTransform, state_epoch: Epoch) {
        self.site = earth.site_state(&sensor.site, self.epoch);
        self.offset = self.epoch - state_epoch;
    }
}

impl ConfigRepr for Observation {}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let values = self.data.values();
        write!(
            f,
            "{} {} of #{} by sensor #{}: [",
            self.epoch,
            self.kind(),
            self.target_id,
            self.sensor_id
        )?;
        for i in 0..self.kind().dimension() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.6}", values[i])?;
        }
        write!(f, "]")
    }
}
