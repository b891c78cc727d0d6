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

use crate::cosmic::{between_0_tau, EarthOrientation, FrameTransform, StateVector, EARTH_GM_KM3_S2};
use crate::io::{duration_from_str, duration_to_str};
use crate::linalg::Vector6;
use crate::od::msr::{MeasurementData, MeasurementKind, Observation, Sensor};
use crate::od::{
    ConfigurationSnafu, DcError, InvalidStateSizeSnafu, Predictor, PropagationFailureSnafu,
    StateAdapter,
};
use crate::propagators::Propagator;
use crate::time::{Duration, Epoch};
use rand::Rng;
use rand_distr::Normal;
use rand_pcg::Pcg64Mcg;
use serde_derive::{Deserialize, Serialize};
use snafu::ResultExt;
use std::sync::Arc;
use typed_builder::TypedBuilder;

/// When the sensor is tracking, relative to the start of the simulation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    #[default]
    Continuous,
    Intermittent {
        #[serde(serialize_with = "duration_to_str", deserialize_with = "duration_from_str")]
        on: Duration,
        #[serde(serialize_with = "duration_to_str", deserialize_with = "duration_from_str")]
        off: Duration,
    },
}

impl Schedule {
    /// Returns whether the sensor is tracking `elapsed` after the start.
    pub fn is_tracking(&self, elapsed: Duration) -> bool {
        match *self {
            Self::Continuous => true,
            Self::Intermittent { on, off } => {
                let cycle_s = (on + off).to_seconds();
                if cycle_s <= 0.0 {
                    return false;
                }
                elapsed.to_seconds().rem_euclid(cycle_s) < on.to_seconds()
            }
        }
    }
}

/// Generates the observations of a known state by one sensor, using the same measurement models as the corrector.
#[derive(TypedBuilder)]
#[builder(doc)]
pub struct ObservationSimulator<'a, P: Propagator> {
    pub propagator: &'a P,
    #[builder(default = Arc::new(EarthOrientation::default()) as Arc<dyn FrameTransform>)]
    pub earth: Arc<dyn FrameTransform>,
    pub sensor: Sensor,
    pub kind: MeasurementKind,
    #[builder(default)]
    pub target_id: u32,
    #[builder(default)]
    pub schedule: Schedule,
    /// Seed of the white noise added to each axis with the sensor's one sigma; noise free when unset
    #[builder(default, setter(strip_option))]
    pub noise_seed: Option<u64>,
    /// Drop the observations outside of the sensor's bounds
    #[builder(default = false)]
    pub apply_bounds: bool,
    #[builder(default = EARTH_GM_KM3_S2)]
    pub gm_km3_s2: f64,
}

impl<'a, P: Propagator> ObservationSimulator<'a, P> {
    /// Simulates up to `count` observations every `step` from `start`, skipping the instants where the schedule is off.
    pub fn generate(
        &self,
        truth: &StateVector,
        start: Epoch,
        step: Duration,
        count: usize,
    ) -> Result<Vec<Observation>, DcError> {
        let adapter = StateAdapter::with_gm(truth.kind, self.gm_km3_s2);
        let native = match truth.len() {
            6 => adapter.to_internal(&StateAdapter::to_svector::<6>(truth)?)?,
            7 => adapter.to_internal(&StateAdapter::to_svector::<7>(truth)?)?,
            size => return InvalidStateSizeSnafu { size }.fail(),
        };
        let handle = self
            .propagator
            .init(&native, truth.epoch)
            .context(PropagationFailureSnafu { epoch: truth.epoch })?;
        let predictor = Predictor::new(self.propagator);

        let mut rng = self.noise_seed.map(|seed| Pcg64Mcg::new(seed as u128));
        let noises = match self.noise_seed {
            Some(_) => {
                let sigmas = self.sensor.sigmas(self.kind)?;
                (0..self.kind.dimension())
                    .map(|i| {
                        Normal::new(0.0, sigmas[i]).map_err(|e| {
                            ConfigurationSnafu {
                                details: format!("{} noise: {e}", self.sensor.name),
                            }
                            .build()
                        })
                    })
                    .collect::<Result<Vec<_>, DcError>>()?
            }
            None => Vec::new(),
        };

        let mut observations = Vec::with_capacity(count);
        for i in 0..count {
            let elapsed = step * (i as f64);
            if !self.schedule.is_tracking(elapsed) {
                continue;
            }
            let placeholder = MeasurementData::from_values(self.kind, &Vector6::zeros());
            let mut obs = Observation::new(self.sensor.id, self.target_id, start + elapsed, placeholder);
            obs.prepare(&self.sensor, self.earth.as_ref(), truth.epoch);

            let mut values = predictor.compute(&handle, &obs)?;
            if let Some(rng) = rng.as_mut() {
                for (j, noise) in noises.iter().enumerate() {
                    values[j] += rng.sample(noise);
                }
            }
            for (j, axis) in self.kind.axes().iter().enumerate() {
                if axis.is_wrapped_angle() {
                    values[j] = between_0_tau(values[j]);
                }
            }
            obs.data = MeasurementData::from_values(self.kind, &values);

            if self.apply_bounds && !self.sensor.accepts(&obs.data) {
                trace!("{obs} is outside of the bounds of {}", self.sensor.name);
                continue;
            }
            observations.push(obs);
        }

        debug!(
            "Simulated {} {} observations of #{} by {}",
            observations.len(),
            self.kind,
            self.target_id,
            self.sensor.name
        );
        Ok(observations)
    }
}
