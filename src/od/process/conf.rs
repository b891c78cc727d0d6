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

use super::RejectCriteria;
use crate::io::{maybe_duration_from_str, maybe_duration_to_str, ConfigRepr};
use crate::od::accumulator::ObservationSelection;
use crate::od::jacobian::{Differencing, PerturbationPolicy};
use crate::od::solver::{SolverStrategy, SolverTolerances};
use crate::od::{ConfigurationSnafu, DcError};
use crate::time::Duration;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;
use typed_builder::TypedBuilder;

/// When the iterations are declared converged.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum StoppingRule {
    /// The RMS changed by less than epsilon since the previous iteration, or is below epsilon
    #[default]
    RmsDelta,
    /// As `RmsDelta`, and the norm of the latest correction is below the provided bound
    RmsDeltaAndCorrection { max_correction_norm: f64 },
}

impl fmt::Display for StoppingRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RmsDelta => write!(f, "RMS delta"),
            Self::RmsDeltaAndCorrection {
                max_correction_norm,
            } => write!(f, "RMS delta and |dx| < {max_correction_norm:.3e}"),
        }
    }
}

/// When the iterations are declared diverged.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConf {
    /// Maximum number of consecutive iterations whose RMS increased
    pub max_rms_increases: usize,
    /// Corrections larger than this are considered unbounded
    pub max_correction_norm: f64,
}

impl Default for DivergenceConf {
    fn default() -> Self {
        Self {
            max_rms_increases: 3,
            max_correction_norm: 1e5,
        }
    }
}

/// What a run reports while it iterates. Each run has its own, so concurrent runs never interfere.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostics {
    /// Log the RMS and correction of each iteration at the info level
    pub log_iterations: bool,
    /// Log every residual at the trace level
    pub log_residuals: bool,
    /// Keep an `IterationRecord` of each iteration in the solution
    pub record_history: bool,
    /// Show a progress bar in batch runs
    pub progress_bar: bool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            log_iterations: true,
            log_residuals: false,
            record_history: true,
            progress_bar: false,
        }
    }
}

/// Configuration of a differential correction run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
#[builder(doc)]
pub struct DcConfig {
    /// Perturbation of each component as a fraction of its magnitude
    #[builder(default = 1e-3)]
    pub percent_change: f64,
    /// Smallest perturbation of each component, in the component's unit
    #[builder(default = 1e-7)]
    pub absolute_floor: f64,
    #[builder(default)]
    pub differencing: Differencing,
    /// Convergence threshold on the weighted RMS
    #[builder(default = 1e-4)]
    pub epsilon: f64,
    #[builder(default = 20)]
    pub max_iterations: usize,
    #[builder(default)]
    pub solver: SolverStrategy,
    /// Retry with the SVD solver when the direct solver reports a singular system
    #[builder(default = true)]
    pub fallback_to_robust: bool,
    #[builder(default = 1e-12)]
    pub pivot_tolerance: f64,
    #[builder(default = 1e-10)]
    pub singular_value_tolerance: f64,
    #[builder(default)]
    pub stopping: StoppingRule,
    #[builder(default)]
    pub divergence: DivergenceConf,
    #[builder(default)]
    pub selection: ObservationSelection,
    #[builder(default)]
    pub reject: RejectCriteria,
    /// Skip the observations whose partials fail instead of failing the run
    #[builder(default = false)]
    pub skip_failed_partials: bool,
    /// Process the observations of each iteration in parallel
    #[builder(default = true)]
    pub parallel: bool,
    /// Wall clock limit of the run
    #[serde(
        serialize_with = "maybe_duration_to_str",
        deserialize_with = "maybe_duration_from_str"
    )]
    #[builder(default, setter(strip_option))]
    pub time_limit: Option<Duration>,
    #[builder(default)]
    pub diagnostics: Diagnostics,
}

impl Default for DcConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DcConfig {
    pub fn validate(&self) -> Result<(), DcError> {
        let positive = [
            ("percent change", self.percent_change),
            ("absolute floor", self.absolute_floor),
            ("epsilon", self.epsilon),
            ("pivot tolerance", self.pivot_tolerance),
            ("singular value tolerance", self.singular_value_tolerance),
            (
                "divergence correction bound",
                self.divergence.max_correction_norm,
            ),
        ];
        for (name, value) in positive {
            ensure!(
                value.is_finite() && value > 0.0,
                ConfigurationSnafu {
                    details: format!("{name} must be strictly positive, got {value}")
                }
            );
        }
        ensure!(
            self.max_iterations > 0,
            ConfigurationSnafu {
                details: "maximum number of iterations must be strictly positive"
            }
        );
        if let StoppingRule::RmsDeltaAndCorrection {
            max_correction_norm,
        } = self.stopping
        {
            ensure!(
                max_correction_norm.is_finite() && max_correction_norm > 0.0,
                ConfigurationSnafu {
                    details: format!(
                        "stopping correction bound must be strictly positive, got {max_correction_norm}"
                    )
                }
            );
        }
        if let Some(limit) = self.time_limit {
            ensure!(
                limit > Duration::ZERO,
                ConfigurationSnafu {
                    details: format!("time limit must be positive, got {limit}")
                }
            );
        }
        self.selection.validate()?;
        self.reject.validate()
    }

    pub fn perturbation_policy(&self) -> PerturbationPolicy {
        PerturbationPolicy {
            percent_change: self.percent_change,
            absolute_floor: self.absolute_floor,
            differencing: self.differencing,
        }
    }

    pub fn solver_tolerances(&self) -> SolverTolerances {
        SolverTolerances {
            pivot: self.pivot_tolerance,
            singular_value: self.singular_value_tolerance,
        }
    }
}

impl ConfigRepr for DcConfig {}

impl fmt::Display for DcConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Iterate up to {} times until {} < {:.2e} ({} solver, {:?} differences of {:.1e} floored at {:.1e}, reject {:?})",
            self.max_iterations,
            self.stopping,
            self.epsilon,
            self.solver,
            self.differencing,
            self.percent_change,
            self.absolute_floor,
            self.reject
        )
    }
}
