extern crate nyx_dc as nyx;

use super::*;
use nyx::cosmic::EARTH_GM_KM3_S2;
use nyx::cosmic::CartesianState;
use nyx::linalg::Vector3;
use nyx::od::prelude::*;
use nyx::propagators::kepler::ElementsHandle;
use nyx::propagators::{NativeState, PropagationError};
use rstest::*;

#[fixture]
fn truth() -> StateVector {
    truth_state()
}

#[fixture]
fn observations(truth: StateVector) -> Vec<Observation> {
    simulate(&truth, range_az_el_sensor(), MeasurementKind::RangeAzEl, 30, None)
}

#[rstest]
#[case(0)]
#[case(5)]
#[case(8)]
fn invalid_state_size(#[case] size: usize, observations: Vec<Observation>) {
    let state = StateVector::new(StateKind::Cartesian, epoch(), vec![7_000.0; size]);
    assert_eq!(
        corrector(DcConfig::default())
            .run(&state, &observations)
            .unwrap_err(),
        DcError::InvalidStateSize { size }
    );
}

#[rstest]
#[case("cartesian", Some(StateKind::Cartesian))]
#[case("K", Some(StateKind::Classical))]
#[case("e", Some(StateKind::Equinoctial))]
#[case("Q", None)]
#[case("polar", None)]
fn representation_codes(#[case] code: &str, #[case] expected: Option<StateKind>) {
    match (StateAdapter::from_code(code, EARTH_GM_KM3_S2), expected) {
        (Ok(adapter), Some(kind)) => assert_eq!(adapter.kind, kind),
        (Err(DcError::InvalidRepresentation { repr }), None) => assert_eq!(repr, code),
        (result, _) => panic!("unexpected {result:?} for `{code}`"),
    }
}

#[rstest]
fn invalid_configuration(truth: StateVector, observations: Vec<Observation>) {
    for conf in [
        DcConfig::builder().percent_change(0.0).build(),
        DcConfig::builder().absolute_floor(0.0).build(),
        DcConfig::builder().epsilon(-1e-4).build(),
        DcConfig::builder().max_iterations(0).build(),
    ] {
        assert!(matches!(
            corrector(conf).run(&truth, &observations),
            Err(DcError::ConfigurationError { .. })
        ));
    }
}

#[rstest]
fn degenerate_initial_orbit(observations: Vec<Observation>) {
    // No angular momentum
    let rectilinear = StateVector::cartesian(
        Vector3::new(7_000.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        epoch(),
    );
    assert!(matches!(
        corrector(DcConfig::default()).run(&rectilinear, &observations),
        Err(DcError::DegenerateOrbit { .. })
    ));

    let hyperbolic = StateVector::cartesian(
        Vector3::new(7_000.0, 0.0, 0.0),
        Vector3::new(0.0, 15.0, 0.0),
        epoch(),
    );
    assert!(matches!(
        corrector(DcConfig::default()).run(&hyperbolic, &observations),
        Err(DcError::DegenerateOrbit { .. })
    ));
}

#[rstest]
fn unknown_sensor_and_missing_noise(truth: StateVector, mut observations: Vec<Observation>) {
    let dc = corrector(DcConfig::default());

    observations[3].sensor_id = 99;
    assert_eq!(
        dc.run(&truth, &observations).unwrap_err(),
        DcError::SensorNotFound { sensor_id: 99 }
    );

    // The RA/Dec sensor has no range noise
    observations[3].sensor_id = RA_DEC_SENSOR;
    assert_eq!(
        dc.run(&truth, &observations).unwrap_err(),
        DcError::NoiseNotConfigured {
            sensor_id: RA_DEC_SENSOR,
            axis: Axis::Range
        }
    );

    // Unless that observation is not selected
    let conf = DcConfig::builder()
        .selection(ObservationSelection::builder().first(4).build())
        .build();
    let solution = corrector(conf).run(&truth, &observations).unwrap();
    assert_eq!(solution.outcome, Outcome::Converged);
    assert_eq!(solution.num_used, 26);
}

#[rstest]
fn insufficient_observations(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    let conf = DcConfig::builder()
        .selection(ObservationSelection::builder().first(10).last(10).build())
        .build();
    let solution = corrector(conf)
        .run(&perturbed(&truth, 1.0, 1e-3), &observations)
        .unwrap();
    assert_eq!(
        solution.outcome,
        Outcome::Failed(DcError::InsufficientObservations { count: 3, size: 6 })
    );
    assert!(!solution.is_converged());
    assert_eq!(solution.iterations, 1);
    // The initial state is returned as is
    assert_eq!(solution.state, perturbed(&truth, 1.0, 1e-3));
    assert!(solution.covariance.is_none());
    assert!(solution.history.is_empty());
}

#[rstest]
fn maximum_iterations(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    let initial = perturbed(&truth, 5.0, 5e-3);
    let conf = DcConfig::builder().max_iterations(2).build();
    let solution = corrector(conf).run(&initial, &observations).unwrap();

    assert_eq!(solution.outcome, Outcome::MaxIterationsExceeded);
    assert_eq!(solution.iterations, 2);
    assert_eq!(solution.history.len(), 2);
    assert_eq!(
        solution.history[1].outcome,
        Some(Outcome::MaxIterationsExceeded)
    );
    // The state of the last iteration is returned along with its covariance
    assert_eq!(solution.state.components, solution.history[1].state);
    assert!(solution.covariance.is_some());
    assert!(solution.final_rms.is_finite());
}

#[rstest]
fn time_limit(truth: StateVector, observations: Vec<Observation>) {
    let conf = DcConfig::builder()
        .time_limit(Duration::from_seconds(1e-9))
        .diagnostics(Diagnostics {
            log_iterations: false,
            ..Default::default()
        })
        .build();
    let solution = corrector(conf)
        .run(&perturbed(&truth, 5.0, 5e-3), &observations)
        .unwrap();

    assert_eq!(solution.outcome, Outcome::MaxIterationsExceeded);
    assert_eq!(solution.iterations, 1);
}

#[rstest]
fn unbounded_correction_diverges(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    let initial = perturbed(&truth, 5.0, 5e-3);
    let conf = DcConfig::builder()
        .divergence(DivergenceConf {
            max_rms_increases: 3,
            max_correction_norm: 1e-3,
        })
        .build();
    let solution = corrector(conf).run(&initial, &observations).unwrap();

    assert_eq!(solution.outcome, Outcome::Diverged);
    assert_eq!(solution.iterations, 1);
    // The best state is the only one evaluated
    assert_eq!(solution.state, initial);
    assert_eq!(solution.history[0].outcome, Some(Outcome::Diverged));
}

/// The two body propagator ignores the drag term, which is hence unobservable.
#[rstest]
fn unobservable_drag_term(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    let initial = perturbed(&truth, 1.0, 1e-3).with_drag_term(1e-3);

    let strict = DcConfig::builder().fallback_to_robust(false).build();
    let solution = corrector(strict).run(&initial, &observations).unwrap();
    assert!(
        matches!(
            solution.outcome,
            Outcome::Failed(DcError::SingularSystem { .. })
        ),
        "{}",
        solution.outcome
    );
    assert_eq!(solution.state, initial);

    let solution = corrector(DcConfig::default())
        .run(&initial, &observations)
        .unwrap();
    assert_eq!(solution.outcome, Outcome::Converged);
    assert_eq!(solution.solver, Some(SolverStrategy::Robust));
    assert_eq!(solution.state.len(), 7);
    // No correction along the unobservable direction
    assert!((solution.state.components[6] - 1e-3).abs() < 1e-9);
    assert!(solution.covariance_diagonal()[6].abs() < 1e-12);
    assert!(position_error_km(&solution.state, &truth) < 1e-3);
}

/// Two body propagation which fails beyond `horizon` for the orbits whose semi-major axis is at
/// least `sma_tol_km` away from `sma_km`.
#[derive(Copy, Clone, Debug)]
struct ShortLived {
    inner: TwoBody,
    horizon: Duration,
    sma_km: f64,
    sma_tol_km: f64,
}

impl ShortLived {
    fn new(sma_tol_km: f64) -> Self {
        Self {
            inner: TwoBody::default(),
            horizon: Duration::from_seconds(600.0),
            sma_km: 6_978.0,
            sma_tol_km,
        }
    }
}

impl Propagator for ShortLived {
    type Handle = ElementsHandle;

    fn init(&self, state: &NativeState, epoch: Epoch) -> Result<ElementsHandle, PropagationError> {
        self.inner.init(state, epoch)
    }

    fn propagate(
        &self,
        handle: &ElementsHandle,
        elapsed: Duration,
    ) -> Result<CartesianState, PropagationError> {
        if elapsed > self.horizon
            && (handle.elements.sma_km - self.sma_km).abs() >= self.sma_tol_km
        {
            return Err(PropagationError::Decayed {
                elapsed,
                perigee_km: handle.elements.periapsis_km(),
            });
        }
        self.inner.propagate(handle, elapsed)
    }
}

fn short_lived_corrector(
    sma_tol_km: f64,
    skip_failed_partials: bool,
) -> DifferentialCorrector<ShortLived> {
    DifferentialCorrector::builder()
        .propagator(ShortLived::new(sma_tol_km))
        .sensors(sensors())
        .config(
            DcConfig::builder()
                .skip_failed_partials(skip_failed_partials)
                .build(),
        )
        .build()
}

/// Only the perturbed states fail after ten minutes: their partials cannot be computed.
#[rstest]
fn failed_partials(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    let solution = short_lived_corrector(1.0, false)
        .run(&truth, &observations)
        .unwrap();
    assert!(
        matches!(
            solution.outcome,
            Outcome::Failed(DcError::PartialDerivativeFailure { .. })
        ),
        "{}",
        solution.outcome
    );
    assert!(!solution.is_converged());
    assert_eq!(solution.state, truth);
    assert!(solution.history.is_empty());

    // Unless these observations are skipped
    let solution = short_lived_corrector(1.0, true)
        .run(&truth, &observations)
        .unwrap();
    assert_eq!(solution.outcome, Outcome::Converged);
    assert_eq!(solution.num_used, 11);
    assert_eq!(solution.num_skipped, 19);
    assert_eq!(solution.num_rejected, 0);
    assert_eq!(solution.history[0].skipped, 19);
}

/// Every state fails after ten minutes: those observations are skipped, not zero filled.
#[rstest]
fn failed_nominal_predictions(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    for skip_failed_partials in [false, true] {
        let solution = short_lived_corrector(0.0, skip_failed_partials)
            .run(&perturbed(&truth, 0.5, 5e-4), &observations)
            .unwrap();
        assert_eq!(solution.outcome, Outcome::Converged);
        assert_eq!(solution.num_used, 11);
        assert_eq!(solution.num_skipped, 19);
        assert!(solution.history.iter().all(|record| record.skipped == 19));
        assert!(position_error_km(&solution.state, &truth) < 1e-3);
    }
}
