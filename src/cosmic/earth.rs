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
    between_0_tau, r1, r2, r3, EARTH_FLATTENING, EARTH_RADIUS_KM, EARTH_ROTATION_RATE_RAD_S,
    SECONDS_PER_DAY,
};
use crate::io::{ConfigError, InvalidConfigSnafu};
use crate::linalg::{Matrix3, Vector3};
use crate::time::Epoch;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::sync::Arc;

/// Julian date of the J2000 reference epoch
const J2000_JD: f64 = 2_451_545.0;
/// Mean obliquity of the ecliptic at J2000, in radians
const MEAN_OBLIQUITY_J2000_RAD: f64 = 0.409_092_804_222_328_9;

/// Earth orientation corrections applicable at a given epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EopCorrections {
    /// UT1 - UTC, in seconds
    pub ut1_utc_s: f64,
    /// TAI - UTC (leap second count), in seconds
    pub tai_utc_s: f64,
    /// Excess length of day, in seconds
    pub lod_s: f64,
    /// Polar motion, in radians
    pub x_pole_rad: f64,
    /// Polar motion, in radians
    pub y_pole_rad: f64,
    /// Nutation correction in longitude, in radians
    pub dpsi_rad: f64,
    /// Nutation correction in obliquity, in radians
    pub deps_rad: f64,
}

impl EopCorrections {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self.combine(other, |a, b| a + (b - a) * t)
    }

    fn combine(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            ut1_utc_s: f(self.ut1_utc_s, other.ut1_utc_s),
            tai_utc_s: f(self.tai_utc_s, other.tai_utc_s),
            lod_s: f(self.lod_s, other.lod_s),
            x_pole_rad: f(self.x_pole_rad, other.x_pole_rad),
            y_pole_rad: f(self.y_pole_rad, other.y_pole_rad),
            dpsi_rad: f(self.dpsi_rad, other.dpsi_rad),
            deps_rad: f(self.deps_rad, other.deps_rad),
        }
    }

    fn scaled(&self, k: f64) -> Self {
        self.combine(self, |a, _| a * k)
    }
}

/// Interpolation scheme used when looking up a time series.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
    /// Four point Lagrange interpolation, falls back to linear near the ends of the series
    Cubic,
}

/// Provides the Earth orientation corrections at a given Julian date (UTC).
pub trait EopProvider: Send + Sync + fmt::Debug {
    fn lookup(&self, jd_utc: f64, mode: Interpolation) -> EopCorrections;
}

/// A constant set of corrections, e.g. all zeros when no EOP data is available.
impl EopProvider for EopCorrections {
    fn lookup(&self, _jd_utc: f64, _mode: Interpolation) -> EopCorrections {
        *self
    }
}

/// A preloaded, chronologically sorted EOP time series.
#[derive(Clone, Debug, PartialEq)]
pub struct EopSeries {
    jd_utc: Vec<f64>,
    records: Vec<EopCorrections>,
}

impl EopSeries {
    /// Builds a series from (Julian date UTC, corrections) pairs, which must be strictly increasing in time.
    pub fn new(records: Vec<(f64, EopCorrections)>) -> Result<Self, ConfigError> {
        ensure!(
            !records.is_empty(),
            InvalidConfigSnafu {
                details: "EOP series is empty".to_string()
            }
        );
        ensure!(
            records.windows(2).all(|w| w[0].0 < w[1].0),
            InvalidConfigSnafu {
                details: "EOP series is not strictly increasing in time".to_string()
            }
        );
        let (jd_utc, records) = records.into_iter().unzip();
        Ok(Self { jd_utc, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn lagrange(&self, first: usize, jd_utc: f64) -> EopCorrections {
        let mut acc = EopCorrections::default();
        for i in first..first + 4 {
            let mut weight = 1.0;
            for j in first..first + 4 {
                if i != j {
                    weight *= (jd_utc - self.jd_utc[j]) / (self.jd_utc[i] - self.jd_utc[j]);
                }
            }
            acc = acc.combine(&self.records[i].scaled(weight), |a, b| a + b);
        }
        acc
    }
}

impl EopProvider for EopSeries {
    fn lookup(&self, jd_utc: f64, mode: Interpolation) -> EopCorrections {
        let last = self.records.len() - 1;
        if jd_utc.is_nan() || jd_utc <= self.jd_utc[0] {
            return self.records[0];
        } else if jd_utc >= self.jd_utc[last] {
            return self.records[last];
        }
        // Index of the first record strictly after the requested date
        let after = self.jd_utc.partition_point(|jd| *jd <= jd_utc);
        let before = after - 1;
        let t = (jd_utc - self.jd_utc[before]) / (self.jd_utc[after] - self.jd_utc[before]);

        match mode {
            Interpolation::Nearest => {
                if t < 0.5 {
                    self.records[before]
                } else {
                    self.records[after]
                }
            }
            Interpolation::Cubic if before >= 1 && after < last => self.lagrange(before - 1, jd_utc),
            Interpolation::Linear | Interpolation::Cubic => {
                self.records[before].lerp(&self.records[after], t)
            }
        }
    }
}

/// A point on the WGS-84 ellipsoid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeodeticSite {
    /// in degrees
    pub latitude_deg: f64,
    /// in degrees
    pub longitude_deg: f64,
    /// in km
    pub height_km: f64,
}

impl GeodeticSite {
    pub fn new(latitude_deg: f64, longitude_deg: f64, height_km: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            height_km,
        }
    }

    /// Earth fixed position of this site, in km.
    pub fn fixed_position_km(&self) -> Vector3<f64> {
        let (sin_lat, cos_lat) = self.latitude_deg.to_radians().sin_cos();
        let (sin_lon, cos_lon) = self.longitude_deg.to_radians().sin_cos();
        let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
        let c_earth = EARTH_RADIUS_KM / (1.0 - e2 * sin_lat.powi(2)).sqrt();
        let s_earth = c_earth * (1.0 - e2);
        Vector3::new(
            (c_earth + self.height_km) * cos_lat * cos_lon,
            (c_earth + self.height_km) * cos_lat * sin_lon,
            (s_earth + self.height_km) * sin_lat,
        )
    }

    /// Rotation from the Earth fixed frame to the topocentric South-East-Zenith frame of this site.
    pub fn sez_from_fixed(&self) -> Matrix3<f64> {
        r2(FRAC_PI_2 - self.latitude_deg.to_radians()) * r3(self.longitude_deg.to_radians())
    }
}

impl fmt::Display for GeodeticSite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "lat.: {:.4} deg    long.: {:.4} deg    alt.: {:.3} m",
            self.latitude_deg,
            self.longitude_deg,
            self.height_km * 1e3
        )
    }
}

/// Inertial geometry of a ground site at one epoch, derived once per observation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SiteState {
    /// Inertial position, in km
    pub position_km: Vector3<f64>,
    /// Inertial velocity, in km/s
    pub velocity_km_s: Vector3<f64>,
    /// Rotation from the inertial frame to the topocentric SEZ frame
    pub sez_from_inertial: Matrix3<f64>,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            position_km: Vector3::zeros(),
            velocity_km_s: Vector3::zeros(),
            sez_from_inertial: Matrix3::identity(),
        }
    }
}

/// The inertial to Earth fixed transformation service.
pub trait FrameTransform: Send + Sync + fmt::Debug {
    /// Rotation matrix from the inertial frame to the Earth fixed frame at the provided epoch.
    fn fixed_from_inertial(&self, epoch: Epoch) -> Matrix3<f64>;

    /// Rotation rate of the Earth at the provided epoch, in rad/s.
    fn rotation_rate_rad_s(&self, epoch: Epoch) -> f64;

    /// Computes the inertial position, velocity and SEZ rotation of the site at the provided epoch.
    fn site_state(&self, site: &GeodeticSite, epoch: Epoch) -> SiteState {
        let inertial_from_fixed = self.fixed_from_inertial(epoch).transpose();
        let position_km = inertial_from_fixed * site.fixed_position_km();
        let omega = Vector3::new(0.0, 0.0, self.rotation_rate_rad_s(epoch));
        SiteState {
            position_km,
            velocity_km_s: omega.cross(&position_km),
            sez_from_inertial: site.sez_from_fixed() * inertial_from_fixed.transpose(),
        }
    }
}

/// Earth orientation model: Greenwich apparent sidereal time with polar motion.
///
/// Precession and the nutation series are not modeled, so the inertial frame is effectively the
/// true-of-date frame of the epoch; the provider's nutation corrections feed the equation of the equinoxes.
#[derive(Clone, Debug)]
pub struct EarthOrientation {
    pub eop: Arc<dyn EopProvider>,
    pub interpolation: Interpolation,
}

impl EarthOrientation {
    pub fn new(eop: Arc<dyn EopProvider>, interpolation: Interpolation) -> Self {
        Self { eop, interpolation }
    }

    pub fn corrections(&self, epoch: Epoch) -> EopCorrections {
        self.eop.lookup(epoch.to_jde_utc_days(), self.interpolation)
    }

    /// Greenwich mean sidereal time (IAU-82) from the UT1 Julian date, in radians
    pub fn gmst_rad(jd_ut1: f64) -> f64 {
        let t = (jd_ut1 - J2000_JD) / 36_525.0;
        let gmst_s = 67_310.548_41
            + (876_600.0 * 3_600.0 + 8_640_184.812_866) * t
            + 0.093_104 * t.powi(2)
            - 6.2e-6 * t.powi(3);
        between_0_tau((gmst_s.rem_euclid(SECONDS_PER_DAY) / 240.0).to_radians())
    }

    /// Greenwich apparent sidereal time at the provided epoch, in radians
    pub fn gast_rad(&self, epoch: Epoch) -> f64 {
        let eop = self.corrections(epoch);
        let jd_ut1 = epoch.to_jde_utc_days() + eop.ut1_utc_s / SECONDS_PER_DAY;
        let obliquity = MEAN_OBLIQUITY_J2000_RAD + eop.deps_rad;
        between_0_tau(Self::gmst_rad(jd_ut1) + eop.dpsi_rad * obliquity.cos())
    }
}

impl Default for EarthOrientation {
    /// No EOP corrections
    fn default() -> Self {
        Self::new(Arc::new(EopCorrections::default()), Interpolation::Linear)
    }
}

impl FrameTransform for EarthOrientation {
    fn fixed_from_inertial(&self, epoch: Epoch) -> Matrix3<f64> {
        let eop = self.corrections(epoch);
        let polar_motion = r2(-eop.x_pole_rad) * r1(-eop.y_pole_rad);
        polar_motion * r3(self.gast_rad(epoch))
    }

    fn rotation_rate_rad_s(&self, epoch: Epoch) -> f64 {
        let eop = self.corrections(epoch);
        EARTH_ROTATION_RATE_RAD_S * (1.0 - eop.lod_s / SECONDS_PER_DAY)
    }
}
