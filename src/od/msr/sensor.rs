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

use super::{Axis, MeasurementData, MeasurementKind};
use crate::cosmic::GeodeticSite;
use crate::io::ConfigRepr;
use crate::linalg::Vector6;
use crate::od::{DcError, NoiseNotConfiguredSnafu};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;
use std::fmt;
use typed_builder::TypedBuilder;

/// Inclusive validity interval of one measurement axis, in the axis' units (km, km/s or radians).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

impl AxisBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A ground sensor: where it is, which measurements it considers valid, and how noisy they are.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(doc)]
pub struct Sensor {
    pub id: u32,
    #[serde(default)]
    #[builder(default, setter(into))]
    pub name: String,
    pub site: GeodeticSite,
    /// Measurements outside of these bounds are rejected, axes without bounds accept everything
    #[serde(default)]
    #[builder(default)]
    pub bounds: BTreeMap<Axis, AxisBounds>,
    /// One sigma noise of each axis, used to weigh the residuals
    #[serde(default)]
    #[builder(default)]
    pub noise: BTreeMap<Axis, f64>,
}

impl Sensor {
    /// Returns a copy of this sensor with the provided one sigma noise on that axis.
    pub fn with_noise(mut self, axis: Axis, sigma: f64) -> Self {
        self.noise.insert(axis, sigma);
        self
    }

    /// Returns a copy of this sensor with validity bounds on that axis.
    pub fn with_bounds(mut self, axis: Axis, bounds: AxisBounds) -> Self {
        self.bounds.insert(axis, bounds);
        self
    }

    /// One sigma noise of this axis, which must be strictly positive.
    pub fn sigma(&self, axis: Axis) -> Result<f64, DcError> {
        let sigma = self.noise.get(&axis).copied().unwrap_or(0.0);
        ensure!(
            sigma.is_finite() && sigma > 0.0,
            NoiseNotConfiguredSnafu {
                sensor_id: self.id,
                axis
            }
        );
        Ok(sigma)
    }

    /// One sigma noise of each axis of that measurement kind, padded with ones.
    pub fn sigmas(&self, kind: MeasurementKind) -> Result<Vector6<f64>, DcError> {
        let mut sigmas = Vector6::repeat(1.0);
        for (i, axis) in kind.axes().iter().enumerate() {
            sigmas[i] = self.sigma(*axis)?;
        }
        Ok(sigmas)
    }

    /// Returns whether every value of that measurement lies within this sensor's bounds.
    pub fn accepts(&self, data: &MeasurementData) -> bool {
        let values = data.values();
        data.kind()
            .axes()
            .iter()
            .enumerate()
            .all(|(i, axis)| self.bounds.get(axis).map_or(true, |b| b.contains(values[i])))
    }

    /// Keys a list of sensors by their ID.
    pub fn catalog<I: IntoIterator<Item = Sensor>>(sensors: I) -> BTreeMap<u32, Sensor> {
        sensors.into_iter().map(|s| (s.id, s)).collect()
    }
}

impl ConfigRepr for Sensor {}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sensor #{} {} ({})", self.id, self.name, self.site)
    }
}
