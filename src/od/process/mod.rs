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

use crate::cosmic::{EarthOrientation, FrameTransform, StateKind, StateVector, EARTH_GM_KM3_S2};
use crate::linalg::{DMatrix, SMatrix, SVector};
use crate::od::accumulator::{Accumulator, WeightedObservation};
use crate::od::jacobian::Perturbations;
use crate::od::msr::{MeasurementKind, Observation, Sensor};
use crate::od::solver::{solve, Correction, SolverStrategy};
use crate::od::{
    DcError, InsufficientObservationsSnafu, InvalidStateSizeSnafu, Predictor,
    PropagationFailureSnafu, SensorNotFoundSnafu, StateAdapter,
};
use crate::propagators::Propagator;
use crate::time::Epoch;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use typed_builder::TypedBuilder;

pub mod conf;
pub use conf::{DcConfig, Diagnostics, DivergenceConf, StoppingRule};
pub mod rejectcrit;
pub use rejectcrit::RejectCriteria;
pub mod solution;
pub use solution::{DcSolution, IterationRecord, Outcome};

/// Batch least squares differential corrector: iteratively corrects an initial state until the
/// weighted RMS of the observation residuals settles.
///
/// The sensors, the Earth orientation service and the propagator are shared read-only, so a single
/// corrector may process many independent objects concurrently (cf. [`DifferentialCorrector::run_batch`]).
#[derive(Clone, TypedBuilder)]
#[builder(doc)]
pub struct DifferentialCorrector<P: Propagator> {
    pub propagator: P,
    #[builder(default = Arc::new(EarthOrientation::default()) as Arc<dyn FrameTransform>)]
    pub earth: Arc<dyn FrameTransform>,
    /// Sensors keyed by their ID
    #[builder(setter(into))]
    pub sensors: Arc<BTreeMap<u32, Sensor>>,
    #[builder(default)]
    pub config: DcConfig,
    /// Gravitational parameter used to convert between Cartesian states and orbital elements
    #[builder(default = EARTH_GM_KM3_S2)]
    pub gm_km3_s2: f64,
}

/// One independent object of a batch run.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchJob {
    pub name: String,
    pub state: StateVector,
    pub observations: Vec<Observation>,
}

/// Results of one pass over the observations.
struct Pass<const N: usize> {
    rms: f64,
    rms_by_kind: BTreeMap<MeasurementKind, f64>,
    correction: Correction<N>,
    used: usize,
    skipped: usize,
    rejected: BTreeSet<usize>,
}

/// The state of a completed pass, from which a solution may be built.
#[derive(Clone)]
struct Snapshot<const N: usize> {
    x: SVector<f64, N>,
    rms: f64,
    rms_by_kind: BTreeMap<MeasurementKind, f64>,
    inverse: Option<SMatrix<f64, N, N>>,
    used: usize,
    skipped: usize,
    solver: Option<SolverStrategy>,
}

impl<const N: usize> Snapshot<N> {
    fn initial(x: SVector<f64, N>) -> Self {
        Self {
            x,
            rms: f64::NAN,
            rms_by_kind: BTreeMap::new(),
            inverse: None,
            used: 0,
            skipped: 0,
            solver: None,
        }
    }

    fn into_solution(
        self,
        kind: StateKind,
        epoch: Epoch,
        outcome: Outcome,
        iterations: usize,
        num_rejected: usize,
        history: Vec<IterationRecord>,
    ) -> DcSolution {
        DcSolution {
            state: StateVector::new(kind, epoch, self.x.as_slice().to_vec()),
            covariance: self
                .inverse
                .map(|inverse| DMatrix::from_iterator(N, N, inverse.iter().copied())),
            iterations,
            outcome,
            final_rms: self.rms,
            rms_by_kind: self.rms_by_kind,
            num_used: self.used,
            num_skipped: self.skipped,
            num_rejected,
            solver: self.solver,
            history,
        }
    }
}

impl<P: Propagator> DifferentialCorrector<P> {
    /// Corrects the initial state (6 orbital components, optionally followed by a drag term) to best fit the observations.
    ///
    /// Errors are only returned for problems detected before iterating (invalid state, configuration,
    /// sensors). Anything going wrong during the iterations is reported in the outcome of the solution.
    pub fn run(
        &self,
        initial: &StateVector,
        observations: &[Observation],
    ) -> Result<DcSolution, DcError> {
        match initial.len() {
            6 => self.run_sized::<6>(initial, observations),
            7 => self.run_sized::<7>(initial, observations),
            size => InvalidStateSizeSnafu { size }.fail(),
        }
    }

    /// Processes independent objects in parallel, returning one result per job in the same order.
    pub fn run_batch(&self, jobs: &[BatchJob]) -> Vec<Result<DcSolution, DcError>> {
        let process = |job: &BatchJob| {
            let result = self.run(&job.state, &job.observations);
            match &result {
                Ok(sol) => debug!("{}: {} after {} iterations", job.name, sol.outcome, sol.iterations),
                Err(e) => warn!("{}: {e}", job.name),
            }
            result
        };

        if self.config.diagnostics.progress_bar {
            jobs.par_iter()
                .progress_with(Self::progress_bar(jobs.len()))
                .map(process)
                .collect()
        } else {
            jobs.par_iter().map(process).collect()
        }
    }

    fn progress_bar(num_jobs: usize) -> ProgressBar {
        let pb = ProgressBar::new(num_jobs as u64);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:100.cyan/blue} {pos:>7}/{len:7} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb.set_message("differential correction");
        pb
    }

    fn run_sized<const N: usize>(
        &self,
        initial: &StateVector,
        observations: &[Observation],
    ) -> Result<DcSolution, DcError> {
        let start = Instant::now();
        let conf = &self.config;
        conf.validate()?;

        let adapter = StateAdapter::with_gm(initial.kind, self.gm_km3_s2);
        let mut x = StateAdapter::to_svector::<N>(initial)?;
        // Reject a degenerate initial orbit before doing any work
        adapter.to_internal(&x)?;
        let epoch = initial.epoch;

        let (mut active, mut num_rejected) = self.select_observations(observations, epoch)?;
        debug!(
            "Initialized with {} of {} observations ({num_rejected} outside of the sensor bounds): {conf}",
            active.len(),
            observations.len(),
        );

        let accumulator = Accumulator {
            predictor: Predictor::new(&self.propagator),
            skip_failed_partials: conf.skip_failed_partials,
            parallel: conf.parallel,
            log_residuals: conf.diagnostics.log_residuals,
        };

        let mut history: Vec<IterationRecord> = Vec::new();
        let mut prev_rms: Option<f64> = None;
        let mut rms_increases = 0;
        let mut latest = Snapshot::initial(x);
        let mut best: Option<Snapshot<N>> = None;

        for iteration in 1..=conf.max_iterations {
            if let Some(limit) = conf.time_limit {
                if iteration > 1 && start.elapsed().as_secs_f64() >= limit.to_seconds() {
                    warn!("Time limit of {limit} reached after {} iterations", iteration - 1);
                    if let Some(record) = history.last_mut() {
                        record.outcome = Some(Outcome::MaxIterationsExceeded);
                    }
                    return Ok(latest.into_solution(
                        adapter.kind,
                        epoch,
                        Outcome::MaxIterationsExceeded,
                        iteration - 1,
                        num_rejected,
                        history,
                    ));
                }
            }

            let pass = match self.pass(iteration, &adapter, &x, epoch, &active, &accumulator) {
                Ok(pass) => pass,
                Err(e) => {
                    error!("[{iteration}/{}] {e}", conf.max_iterations);
                    return Ok(latest.into_solution(
                        adapter.kind,
                        epoch,
                        Outcome::Failed(e),
                        iteration,
                        num_rejected,
                        history,
                    ));
                }
            };

            if !pass.rejected.is_empty() {
                num_rejected += pass.rejected.len();
                active.retain(|wobs| !pass.rejected.contains(&wobs.index));
            }

            let rms = pass.rms;
            let dx = pass.correction.dx;
            let dx_norm = dx.norm();
            let strategy = pass.correction.strategy;
            if conf.diagnostics.log_iterations {
                info!(
                    "[{iteration}/{}] RMS: {rms:.6}; |dx|: {dx_norm:.3e} ({strategy}, {} used, {} skipped, {num_rejected} rejected)",
                    conf.max_iterations, pass.used, pass.skipped
                );
            }

            rms_increases = match prev_rms {
                Some(prev) if rms > prev => rms_increases + 1,
                _ => 0,
            };

            latest = Snapshot {
                x,
                rms,
                rms_by_kind: pass.rms_by_kind,
                inverse: Some(pass.correction.inverse),
                used: pass.used,
                skipped: pass.skipped,
                solver: Some(strategy),
            };
            if best.as_ref().map_or(true, |best| rms <= best.rms) {
                best = Some(latest.clone());
            }

            let settled = prev_rms.map_or(false, |prev| (rms - prev).abs() < conf.epsilon)
                || rms < conf.epsilon;
            let converged = settled
                && match conf.stopping {
                    StoppingRule::RmsDelta => true,
                    StoppingRule::RmsDeltaAndCorrection {
                        max_correction_norm,
                    } => dx_norm < max_correction_norm,
                };

            let outcome = if !dx_norm.is_finite() || dx_norm > conf.divergence.max_correction_norm {
                warn!("Diverged: |dx| = {dx_norm:.3e} exceeds {:.3e}", conf.divergence.max_correction_norm);
                Some(Outcome::Diverged)
            } else if converged {
                info!("Converged in {iteration} iterations (RMS {rms:.6})");
                Some(Outcome::Converged)
            } else if rms_increases > conf.divergence.max_rms_increases {
                warn!("Diverged: RMS increased {rms_increases} times in a row");
                Some(Outcome::Diverged)
            } else {
                None
            };

            if conf.diagnostics.record_history {
                history.push(IterationRecord {
                    iteration,
                    state: x.as_slice().to_vec(),
                    rms,
                    previous_rms: prev_rms,
                    correction_norm: Some(dx_norm),
                    solver: Some(strategy),
                    used: pass.used,
                    skipped: pass.skipped,
                    rejected: num_rejected,
                    outcome: outcome.clone(),
                });
            }

            match outcome {
                Some(Outcome::Diverged) => {
                    let best = best.unwrap_or(latest);
                    return Ok(best.into_solution(
                        adapter.kind,
                        epoch,
                        Outcome::Diverged,
                        iteration,
                        num_rejected,
                        history,
                    ));
                }
                Some(outcome) => {
                    return Ok(latest.into_solution(
                        adapter.kind,
                        epoch,
                        outcome,
                        iteration,
                        num_rejected,
                        history,
                    ))
                }
                None => {
                    x += dx;
                    prev_rms = Some(rms);
                }
            }
        }

        warn!(
            "Reached the maximum of {} iterations without converging (RMS {:.6})",
            conf.max_iterations, latest.rms
        );
        if let Some(record) = history.last_mut() {
            record.outcome = Some(Outcome::MaxIterationsExceeded);
        }
        Ok(latest.into_solution(
            adapter.kind,
            epoch,
            Outcome::MaxIterationsExceeded,
            conf.max_iterations,
            num_rejected,
            history,
        ))
    }

    /// Selects the configured observations, checks their sensors and derives their site geometry.
    /// Also returns how many were discarded for lying outside of their sensor's bounds.
    fn select_observations(
        &self,
        observations: &[Observation],
        epoch: Epoch,
    ) -> Result<(Vec<WeightedObservation>, usize), DcError> {
        let mut selected = Vec::new();
        let mut out_of_bounds = 0;
        for index in self.config.selection.indices(observations.len()) {
            let obs = &observations[index];
            let sensor = self.sensors.get(&obs.sensor_id).context(SensorNotFoundSnafu {
                sensor_id: obs.sensor_id,
            })?;
            let sigmas = sensor.sigmas(obs.kind())?;
            if !sensor.accepts(&obs.data) {
                debug!("#{index} is outside of the bounds of {}: {obs}", sensor.name);
                out_of_bounds += 1;
                continue;
            }
            let mut obs = obs.clone();
            obs.prepare(sensor, self.earth.as_ref(), epoch);
            selected.push(WeightedObservation { index, obs, sigmas });
        }
        Ok((selected, out_of_bounds))
    }

    /// Predicts, edits and accumulates every active observation from the state `x`, and solves for its correction.
    fn pass<const N: usize>(
        &self,
        iteration: usize,
        adapter: &StateAdapter,
        x: &SVector<f64, N>,
        epoch: Epoch,
        active: &[WeightedObservation],
        accumulator: &Accumulator<P>,
    ) -> Result<Pass<N>, DcError> {
        let conf = &self.config;
        let native = adapter.to_internal(x)?;
        let handle = self
            .propagator
            .init(&native, epoch)
            .context(PropagationFailureSnafu { epoch })?;

        let mut skipped = 0;
        let mut predicted = Vec::with_capacity(active.len());
        for (wobs, prediction) in active.iter().zip(accumulator.predict_all(&handle, active)) {
            match prediction {
                Ok(prediction) => predicted.push((wobs, prediction)),
                Err(e) => {
                    warn!("skipping observation #{}: {e}", wobs.index);
                    skipped += 1;
                }
            }
        }

        let mut rejected = BTreeSet::new();
        if conf.reject.is_active(iteration) && !predicted.is_empty() {
            let (ssr, dim) = predicted
                .iter()
                .fold((0.0_f64, 0_usize), |(ssr, dim), (wobs, prediction)| {
                    (
                        ssr + prediction.normalized(&wobs.sigmas).norm_squared(),
                        dim + prediction.dimension(),
                    )
                });
            let prefit_rms = (ssr / dim as f64).sqrt();
            predicted.retain(|(wobs, prediction)| {
                let ratio = prediction.residual_ratio(&wobs.sigmas);
                if conf.reject.rejects(iteration, ratio, prefit_rms) {
                    debug!(
                        "rejecting #{} with residual ratio {ratio:.3} (RMS {prefit_rms:.3}): {}",
                        wobs.index, wobs.obs
                    );
                    rejected.insert(wobs.index);
                    false
                } else {
                    true
                }
            });
        }

        let perturbations = Perturbations::new(
            &self.propagator,
            adapter,
            x,
            epoch,
            &conf.perturbation_policy(),
        )?;
        let neq = accumulator.accumulate(&perturbations, &predicted)?;
        skipped += neq.skipped.len();

        ensure!(
            neq.num_residuals >= N,
            InsufficientObservationsSnafu {
                count: neq.num_residuals,
                size: N
            }
        );

        let tolerances = conf.solver_tolerances();
        let correction = match solve(&neq.info, &neq.normal, conf.solver, &tolerances) {
            Err(DcError::SingularSystem { details })
                if conf.fallback_to_robust && conf.solver == SolverStrategy::Direct =>
            {
                debug!("{details}: falling back to the {} solver", SolverStrategy::Robust);
                solve(&neq.info, &neq.normal, SolverStrategy::Robust, &tolerances)?
            }
            result => result?,
        };

        Ok(Pass {
            rms: neq.rms(),
            rms_by_kind: neq.rms_by_kind(),
            correction,
            used: neq.used,
            skipped,
            rejected,
        })
    }
}
