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

use crate::cosmic::AstroError;
use crate::propagators::PropagationError;
use crate::time::Epoch;
use snafu::prelude::*;

/// Conversion between the caller's state representation and the propagator's native state.
pub mod adapter;
pub use adapter::StateAdapter;

/// Measurement kinds, observation records and sensors.
pub mod msr;

/// Predicted measurements and residuals.
pub mod predictor;
pub use predictor::{Prediction, Predictor};

/// Finite difference partial derivatives of the measurements with respect to the state.
pub mod jacobian;

/// Weighted normal equations accumulated over all active observations.
pub mod accumulator;

/// Direct and SVD solvers of the normal equations.
pub mod solver;

/// The iteration controller of the differential correction.
pub mod process;

/// Generates synthetic observations from a known state.
pub mod simulator;

pub mod prelude {
    pub use super::accumulator::{NormalEquations, ObservationSelection};
    pub use super::jacobian::{Differencing, PerturbationPolicy};
    pub use super::msr::*;
    pub use super::process::*;
    pub use super::simulator::ObservationSimulator;
    pub use super::solver::{Correction, SolverStrategy};
    pub use super::*;

    pub use crate::cosmic::{EarthOrientation, FrameTransform, GeodeticSite, StateKind, StateVector};
    pub use crate::propagators::{J2Secular, Propagator, TwoBody};
    pub use crate::time::{Duration, Epoch, TimeUnits, Unit};
}

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DcError {
    #[snafu(display("state vectors must have 6 or 7 components, got {size}"))]
    InvalidStateSize { size: usize },
    #[snafu(display("unknown state representation `{repr}`"))]
    InvalidRepresentation { repr: String },
    #[snafu(display("degenerate orbit: {source}"))]
    DegenerateOrbit { source: AstroError },
    #[snafu(display("invalid configuration: {details}"))]
    ConfigurationError { details: String },
    #[snafu(display("no sensor with ID {sensor_id}"))]
    SensorNotFound { sensor_id: u32 },
    #[snafu(display("sensor {sensor_id} has no valid noise configured for {axis:?}"))]
    NoiseNotConfigured { sensor_id: u32, axis: msr::Axis },
    #[snafu(display("propagation to {epoch} failed: {source}"))]
    PropagationFailure {
        epoch: Epoch,
        source: PropagationError,
    },
    #[snafu(display("partial derivative with respect to component #{component} failed: {source}"))]
    PartialDerivativeFailure {
        component: usize,
        #[snafu(source(from(DcError, Box::new)))]
        source: Box<DcError>,
    },
    #[snafu(display("singular normal equations: {details}"))]
    SingularSystem { details: String },
    #[snafu(display("{count} residuals cannot determine {size} state components"))]
    InsufficientObservations { count: usize, size: usize },
}
