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

use crate::cosmic::{AstroError, CartesianState, KeplerianElements};
use crate::time::{Duration, Epoch};
use snafu::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Analytic propagators of the native element state.
pub mod kepler;
pub use kepler::{J2Secular, TwoBody};

#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PropagationError {
    #[snafu(display("orbit decayed {elapsed} after its epoch (perigee radius {perigee_km:.3} km)"))]
    Decayed { elapsed: Duration, perigee_km: f64 },
    #[snafu(display("invalid initial state: {source}"))]
    InvalidInitialState { source: AstroError },
    #[snafu(display("propagation failed: {source}"))]
    Astro { source: AstroError },
}

/// The propagator's native state: osculating Keplerian elements at the epoch and a drag term.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NativeState {
    pub elements: KeplerianElements,
    /// Fractional rate of change of the mean motion, per day; zero when the state has no drag component.
    pub drag_term: f64,
}

impl fmt::Display for NativeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}    drag: {:.6e} /day", self.elements, self.drag_term)
    }
}

/// An orbit propagator: initialized once from a native state, then queried at any elapsed time.
///
/// The differential corrector initializes one handle for the nominal state and one per perturbed
/// state, and queries them concurrently from several threads.
pub trait Propagator: Send + Sync {
    /// Opaque, read-only propagation context produced by `init`.
    type Handle: Send + Sync;

    fn init(&self, state: &NativeState, epoch: Epoch) -> Result<Self::Handle, PropagationError>;

    /// Inertial position and velocity `elapsed` after the handle's epoch (may be negative).
    fn propagate(
        &self,
        handle: &Self::Handle,
        elapsed: Duration,
    ) -> Result<CartesianState, PropagationError>;
}

impl<P: Propagator + ?Sized> Propagator for Arc<P> {
    type Handle = P::Handle;

    fn init(&self, state: &NativeState, epoch: Epoch) -> Result<Self::Handle, PropagationError> {
        self.as_ref().init(state, epoch)
    }

    fn propagate(
        &self,
        handle: &Self::Handle,
        elapsed: Duration,
    ) -> Result<CartesianState, PropagationError> {
        self.as_ref().propagate(handle, elapsed)
    }
}
