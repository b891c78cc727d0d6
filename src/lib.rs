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

/*! # nyx-dc

Batch differential correction of satellite orbits: an iterative weighted least-squares
(Gauss-Newton) estimator which refines an uncertain orbital state until it best reproduces a set
of ranges, azimuth/elevation pairs, topocentric right ascension/declination pairs or Cartesian
ephemeris points.

The partial derivatives are computed by numerically perturbing the state and re-running the
orbit propagator, so any analytic propagator implementing [`propagators::Propagator`] can be
plugged in.
*/

/// Physical constants, state vectors, orbital element conversions and Earth orientation.
pub mod cosmic;

/// The propagator interface and the built-in analytic propagators.
pub mod propagators;

/// Configuration loading and serialization helpers.
pub mod io;

/// The differential correction engine: measurement models, partials, normal equations, solvers and the iteration controller.
pub mod od;

#[macro_use]
extern crate log;
extern crate hifitime;
extern crate nalgebra as na;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
}

pub use self::cosmic::{CartesianState, StateKind, StateVector};
