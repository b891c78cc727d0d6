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

use super::jacobian::Perturbations;
use super::msr::{MeasurementKind, Observation};
use super::{ConfigurationSnafu, DcError, Prediction, Predictor};
use crate::linalg::{SMatrix, SVector, Vector6};
use crate::propagators::Propagator;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;
use std::ops::Add;
use typed_builder::TypedBuilder;

/// Which observations of the input sequence take part in the fit: every `stride`-th one from `first` to `last` (inclusive).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
#[builder(doc)]
pub struct ObservationSelection {
    #[builder(default)]
    pub first: usize,
    /// Defaults to the last observation
    #[builder(default, setter(strip_option))]
    pub last: Option<usize>,
    #[builder(default = 1)]
    pub stride: usize,
}

impl Default for ObservationSelection {
    fn default() -> Self {
        Self {
            first: 0,
            last: None,
            stride: 1,
        }
    }
}

impl ObservationSelection {
    pub fn validate(&self) -> Result<(), DcError> {
        ensure!(
            self.stride > 0,
            ConfigurationSnafu {
                details: "observation stride must be at least one"
            }
        );
        if let Some(last) = self.last {
            ensure!(
                last >= self.first,
                ConfigurationSnafu {
                    details: format!(
                        "last observation index {last} is before the first one {}",
                        self.first
                    )
                }
            );
        }
        Ok(())
    }

    /// Indices of the selected observations out of `count`.
    pub fn indices(&self, count: usize) -> Vec<usize> {
        if count == 0 || self.stride == 0 {
            return Vec::new();
        }
        let last = self.last.map_or(count - 1, |last| last.min(count - 1));
        if self.first > last {
            return Vec::new();
        }
        (self.first..=last).step_by(self.stride).collect()
    }
}

/// An observation taking part in the fit, with the index in the input sequence and the one sigma noise of each axis.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedObservation {
    pub index: usize,
    pub obs: Observation,
    pub sigmas: Vector6<f64>,
}

/// Residual statistics of one measurement kind.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct KindStatistics {
    pub count: usize,
    pub num_residuals: usize,
    /// Sum of the squared normalized residuals
    pub weighted_ssr: f64,
}

impl KindStatistics {
    pub fn rms(&self) -> f64 {
        if self.num_residuals == 0 {
            0.0
        } else {
            (self.weighted_ssr / self.num_residuals as f64).sqrt()
        }
    }
}

impl Add for KindStatistics {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            count: self.count + rhs.count,
            num_residuals: self.num_residuals + rhs.num_residuals,
            weighted_ssr: self.weighted_ssr + rhs.weighted_ssr,
        }
    }
}

/// Weighted normal equations (A^T W A) dx = (A^T W b), rebuilt at every iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalEquations<const N: usize> {
    /// A^T W A, the information matrix
    pub info: SMatrix<f64, N, N>,
    /// A^T W b
    pub normal: SVector<f64, N>,
    pub weighted_ssr: f64,
    pub num_residuals: usize,
    /// Number of observations accumulated
    pub used: usize,
    /// Input indices of the observations skipped because their partials failed
    pub skipped: Vec<usize>,
    pub by_kind: BTreeMap<MeasurementKind, KindStatistics>,
}

impl<const N: usize> NormalEquations<N> {
    pub fn zeros() -> Self {
        Self {
            info: SMatrix::zeros(),
            normal: SVector::zeros(),
            weighted_ssr: 0.0,
            num_residuals: 0,
            used: 0,
            skipped: Vec::new(),
            by_kind: BTreeMap::new(),
        }
    }

    /// Accumulates one observation, weighted by the inverse of its variance.
    pub fn add_observation(
        &mut self,
        h_tilde: &SMatrix<f64, 6, N>,
        prediction: &Prediction,
        sigmas: &Vector6<f64>,
    ) {
        let dim = prediction.dimension();
        let mut whitening = Vector6::zeros();
        for i in 0..dim {
            whitening[i] = 1.0 / sigmas[i];
        }
        let a = SMatrix::<f64, 6, 6>::from_diagonal(&whitening) * h_tilde;
        let b = prediction.normalized(sigmas);

        self.info += a.tr_mul(&a);
        self.normal += a.tr_mul(&b);

        let ssr = b.norm_squared();
        self.weighted_ssr += ssr;
        self.num_residuals += dim;
        self.used += 1;

        let stats = self.by_kind.entry(prediction.kind).or_default();
        stats.count += 1;
        stats.num_residuals += dim;
        stats.weighted_ssr += ssr;
    }

    /// Root mean square of the normalized residuals
    pub fn rms(&self) -> f64 {
        if self.num_residuals == 0 {
            0.0
        } else {
            (self.weighted_ssr / self.num_residuals as f64).sqrt()
        }
    }

    pub fn rms_by_kind(&self) -> BTreeMap<MeasurementKind, f64> {
        self.by_kind
            .iter()
            .map(|(kind, stats)| (*kind, stats.rms()))
            .collect()
    }
}

impl<const N: usize> Add for NormalEquations<N> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self.info += rhs.info;
        self.normal += rhs.normal;
        self.weighted_ssr += rhs.weighted_ssr;
        self.num_residuals += rhs.num_residuals;
        self.used += rhs.used;
        self.skipped.extend(rhs.skipped);
        for (kind, stats) in rhs.by_kind {
            let entry = self.by_kind.entry(kind).or_default();
            *entry = *entry + stats;
        }
        self
    }
}

/// Sums the weighted contributions of every active observation into the normal equations.
pub struct Accumulator<'a, P: Propagator> {
    pub predictor: Predictor<'a, P>,
    /// Skip (and count) the observations whose partials failed instead of failing the iteration
    pub skip_failed_partials: bool,
    /// Dispatch the observations across the rayon thread pool
    pub parallel: bool,
    pub log_residuals: bool,
}

impl<'a, P: Propagator> Accumulator<'a, P> {
    /// Predicts every observation from the nominal state, in order.
    pub fn predict_all(
        &self,
        handle: &P::Handle,
        observations: &[WeightedObservation],
    ) -> Vec<Result<Prediction, DcError>> {
        let predict = |wobs: &WeightedObservation| {
            let prediction = self.predictor.predict(handle, &wobs.obs);
            if self.log_residuals {
                if let Ok(prediction) = &prediction {
                    trace!("#{} {}: {prediction}", wobs.index, wobs.obs.epoch);
                }
            }
            prediction
        };

        if self.parallel {
            observations.par_iter().map(predict).collect()
        } else {
            observations.iter().map(predict).collect()
        }
    }

    /// Computes the partials of each accepted observation and accumulates them with their residuals.
    pub fn accumulate<const N: usize>(
        &self,
        perturbations: &Perturbations<P::Handle, N>,
        accepted: &[(&WeightedObservation, Prediction)],
    ) -> Result<NormalEquations<N>, DcError> {
        let contribute = |mut neq: NormalEquations<N>,
                          (wobs, prediction): &(&WeightedObservation, Prediction)|
         -> Result<NormalEquations<N>, DcError> {
            match perturbations.partials(&self.predictor, &wobs.obs, &prediction.computed) {
                Ok(h_tilde) => neq.add_observation(&h_tilde, prediction, &wobs.sigmas),
                Err(e) if self.skip_failed_partials => {
                    warn!("skipping observation #{}: {e}", wobs.index);
                    neq.skipped.push(wobs.index);
                }
                Err(e) => return Err(e),
            }
            Ok(neq)
        };

        let mut neq = if self.parallel {
            accepted
                .par_iter()
                .try_fold(NormalEquations::zeros, contribute)
                .try_reduce(NormalEquations::zeros, |a, b| Ok(a + b))?
        } else {
            accepted
                .iter()
                .try_fold(NormalEquations::zeros(), contribute)?
        };
        neq.skipped.sort_unstable();
        Ok(neq)
    }
}
