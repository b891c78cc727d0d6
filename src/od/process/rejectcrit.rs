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

use crate::io::ConfigRepr;
use crate::od::{ConfigurationSnafu, DcError};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

/// Defines how to reject observations based on their pre-fit residual ratios, i.e. the RMS of
/// their normalized residuals. Rejected observations are excluded for the rest of the run.
///
/// Without rejection, a gross outlier is fitted like any other observation and biases the solution.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum RejectCriteria {
    /// Accept all observations
    #[default]
    None,
    /// Reject observations with a residual ratio greater than the provided value, starting at the provided iteration (one indexed).
    ResidualRatio { value: f64, from_iteration: usize },
    /// Reject observations with a residual ratio greater than the provided multiple of the RMS of the iteration.
    RmsMultiplier { value: f64, from_iteration: usize },
}

impl RejectCriteria {
    pub fn validate(&self) -> Result<(), DcError> {
        match *self {
            Self::None => Ok(()),
            Self::ResidualRatio { value, .. } | Self::RmsMultiplier { value, .. } => {
                ensure!(
                    value.is_finite() && value > 0.0,
                    ConfigurationSnafu {
                        details: format!("rejection threshold must be strictly positive, got {value}")
                    }
                );
                Ok(())
            }
        }
    }

    /// Returns whether an observation with that residual ratio is rejected at that iteration, given the RMS of all residuals.
    pub fn rejects(&self, iteration: usize, residual_ratio: f64, rms: f64) -> bool {
        match *self {
            Self::None => false,
            Self::ResidualRatio {
                value,
                from_iteration,
            } => iteration >= from_iteration && residual_ratio > value,
            Self::RmsMultiplier {
                value,
                from_iteration,
            } => iteration >= from_iteration && residual_ratio > value * rms,
        }
    }

    pub fn is_active(&self, iteration: usize) -> bool {
        match *self {
            Self::None => false,
            Self::ResidualRatio { from_iteration, .. }
            | Self::RmsMultiplier { from_iteration, .. } => iteration >= from_iteration,
        }
    }
}

impl ConfigRepr for RejectCriteria {}
