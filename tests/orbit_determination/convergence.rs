extern crate nyx_dc as nyx;
extern crate pretty_env_logger;

use super::*;
use approx::assert_relative_eq;
use nyx::od::prelude::*;
use rstest::*;

#[fixture]
fn truth() -> StateVector {
    truth_state()
}

#[fixture]
fn observations(truth: StateVector) -> Vec<Observation> {
    simulate(&truth, range_az_el_sensor(), MeasurementKind::RangeAzEl, 30, None)
}

/// Thirty noise free range/azimuth/elevation observations, one minute apart, and the default configuration.
#[rstest]
fn range_az_el_scenario(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    let conf = DcConfig::default();
    assert_eq!(conf.percent_change, 0.001);
    assert_eq!(conf.absolute_floor, 1e-7);
    assert_eq!(conf.epsilon, 1e-4);
    assert_eq!(conf.max_iterations, 20);

    let initial = perturbed(&truth, 2.0, 2e-3);
    let rmag = truth.components[..3].iter().map(|c| c * c).sum::<f64>().sqrt();
    let vmag = truth.components[3..].iter().map(|c| c * c).sum::<f64>().sqrt();
    assert!((rmag - 6_978.0).abs() < 50.0, "{rmag}");
    assert!((vmag - 7.5).abs() < 0.1, "{vmag}");

    let dc = corrector(conf);
    let solution = dc.run(&initial, &observations).unwrap();
    println!("{solution}");

    assert_eq!(solution.outcome, Outcome::Converged);
    assert!(solution.is_converged());
    assert!(solution.iterations <= 10, "{} iterations", solution.iterations);
    let err_km = position_error_km(&solution.state, &truth);
    assert!(err_km < 1e-3, "position error of {:.3} m", err_km * 1e3);

    assert_eq!(solution.state.kind, StateKind::Cartesian);
    assert_eq!(solution.state.epoch, truth.epoch);
    assert_eq!(solution.num_used, 30);
    assert_eq!(solution.num_skipped, 0);
    assert_eq!(solution.num_rejected, 0);
    assert_eq!(solution.solver, Some(SolverStrategy::Direct));

    let sigmas = solution.sigmas();
    assert_eq!(sigmas.len(), 6);
    assert!(sigmas.iter().all(|s| s.is_finite() && *s > 0.0), "{sigmas:?}");
    assert_eq!(solution.covariance_diagonal().len(), 6);

    assert_eq!(solution.history.len(), solution.iterations);
    for (i, record) in solution.history.iter().enumerate() {
        assert_eq!(record.iteration, i + 1);
        assert_eq!(record.used, 30);
    }
    assert_eq!(
        solution.history.last().unwrap().outcome,
        Some(Outcome::Converged)
    );
    assert!(solution.history[0].rms > solution.final_rms);
}

#[rstest]
#[case(StateKind::Cartesian)]
#[case(StateKind::Classical)]
#[case(StateKind::Equinoctial)]
fn state_representations(
    #[case] kind: StateKind,
    truth: StateVector,
    observations: Vec<Observation>,
) {
    let _ = pretty_env_logger::try_init();

    let initial = StateAdapter::new(StateKind::Cartesian)
        .convert(&perturbed(&truth, 1.0, 1e-3), kind)
        .unwrap();

    let solution = corrector(DcConfig::default())
        .run(&initial, &observations)
        .unwrap();

    assert_eq!(solution.outcome, Outcome::Converged, "{kind}");
    assert_eq!(solution.state.kind, kind);
    let err_km = position_error_km(&solution.state, &truth);
    assert!(err_km < 1e-3, "{kind}: position error of {:.3} m", err_km * 1e3);
}

#[rstest]
#[case(SolverStrategy::Direct, Differencing::Forward)]
#[case(SolverStrategy::Direct, Differencing::Central)]
#[case(SolverStrategy::Robust, Differencing::Forward)]
#[case(SolverStrategy::Robust, Differencing::Central)]
fn solvers_and_differencing(
    #[case] solver: SolverStrategy,
    #[case] differencing: Differencing,
    truth: StateVector,
    observations: Vec<Observation>,
) {
    let _ = pretty_env_logger::try_init();

    let conf = DcConfig::builder()
        .solver(solver)
        .differencing(differencing)
        .build();
    let solution = corrector(conf)
        .run(&perturbed(&truth, 2.0, 2e-3), &observations)
        .unwrap();

    assert_eq!(solution.outcome, Outcome::Converged);
    assert_eq!(solution.solver, Some(solver));
    assert!(solution.iterations <= 10);
    assert!(position_error_km(&solution.state, &truth) < 1e-3);
}

#[rstest]
fn correction_bound_stopping_rule(truth: StateVector, observations: Vec<Observation>) {
    let _ = pretty_env_logger::try_init();

    let conf = DcConfig::builder()
        .stopping(StoppingRule::RmsDeltaAndCorrection {
            max_correction_norm: 1e-4,
        })
        .build();
    let solution = corrector(conf)
        .run(&perturbed(&truth, 2.0, 2e-3), &observations)
        .unwrap();

    assert_eq!(solution.outcome, Outcome::Converged);
    let last = solution.history.last().unwrap();
    assert!(last.correction_norm.unwrap() < 1e-4);
    assert!(position_error_km(&solution.state, &truth) < 1e-3);
}

/// Noisy observations of two kinds from two sensors, processed in parallel and sequentially.
#[rstest]
fn noisy_multi_sensor(truth: StateVector) {
    let _ = pretty_env_logger::try_init();

    let mut observations = simulate(
        &truth,
        range_az_el_sensor(),
        MeasurementKind::RangeAzEl,
        30,
        Some(1),
    );
    observations.extend(simulate(
        &truth,
        ra_dec_sensor(),
        MeasurementKind::RaDec,
        30,
        Some(2),
    ));

    let mut solutions = Vec::new();
    for parallel in [true, false] {
        let conf = DcConfig::builder().parallel(parallel).build();
        let solution = corrector(conf)
            .run(&perturbed(&truth, 3.0, 3e-3), &observations)
            .unwrap();
        println!("{solution}");

        assert_eq!(solution.outcome, Outcome::Converged);
        assert_eq!(solution.num_used, 60);
        assert!(
            solution.final_rms > 0.6 && solution.final_rms < 1.4,
            "RMS {}",
            solution.final_rms
        );
        assert_eq!(solution.rms_by_kind.len(), 2);
        assert!(solution.rms_by_kind.contains_key(&MeasurementKind::RaDec));
        assert!(position_error_km(&solution.state, &truth) < 0.1);
        solutions.push(solution);
    }

    // Only the summation order differs
    assert_eq!(solutions[0].iterations, solutions[1].iterations);
    assert_relative_eq!(
        solutions[0].final_rms,
        solutions[1].final_rms,
        max_relative = 1e-6
    );
    assert!(position_error_km(&solutions[0].state, &solutions[1].state) < 1e-6);
}

/// Estimates the drag term along with the orbit under the secular J2 propagator.
#[test]
fn drag_term_with_j2() {
    let _ = pretty_env_logger::try_init();

    let classical = StateVector::new(
        StateKind::Classical,
        epoch(),
        vec![
            6_878.0,
            0.002,
            51.6_f64.to_radians(),
            120.0_f64.to_radians(),
            45.0_f64.to_radians(),
            0.0,
        ],
    );
    let truth = StateAdapter::new(StateKind::Classical)
        .convert(&classical, StateKind::Cartesian)
        .unwrap()
        .with_drag_term(2e-3);

    let prop = J2Secular::default();
    let sim = ObservationSimulator::builder()
        .propagator(&prop)
        .sensor(range_az_el_sensor())
        .kind(MeasurementKind::RangeAzEl)
        .build();
    let observations = sim
        .generate(&truth, truth.epoch, Duration::from_seconds(180.0), 40)
        .unwrap();

    let initial = perturbed(
        &StateVector::new(
            StateKind::Cartesian,
            truth.epoch,
            truth.components[..6].to_vec(),
        ),
        1.0,
        1e-3,
    )
    .with_drag_term(0.0);

    let dc = DifferentialCorrector::builder()
        .propagator(prop)
        .sensors(sensors())
        .build();
    let solution = dc.run(&initial, &observations).unwrap();
    println!("{solution}");

    assert_eq!(solution.outcome, Outcome::Converged);
    assert_eq!(solution.solver, Some(SolverStrategy::Direct));
    assert_eq!(solution.state.len(), 7);
    assert!(
        (solution.state.components[6] - 2e-3).abs() < 1e-6,
        "drag term {:.6e}",
        solution.state.components[6]
    );
    assert!(position_error_km(&solution.state, &truth) < 1e-3);
    assert_eq!(solution.sigmas().len(), 7);
}

/// Independent objects processed concurrently, each result in the order of the jobs.
#[test]
fn batch_of_objects() {
    let _ = pretty_env_logger::try_init();

    let truth = truth_state();
    let observations = simulate(&truth, range_az_el_sensor(), MeasurementKind::RangeAzEl, 30, None);
    let jobs = vec![
        BatchJob {
            name: "near".to_string(),
            state: perturbed(&truth, 1.0, 1e-3),
            observations: observations.clone(),
        },
        BatchJob {
            name: "invalid".to_string(),
            state: StateVector::new(StateKind::Cartesian, truth.epoch, vec![7_000.0; 4]),
            observations: observations.clone(),
        },
        BatchJob {
            name: "far".to_string(),
            state: perturbed(&truth, 5.0, 5e-3),
            observations,
        },
    ];

    let conf = DcConfig::builder()
        .diagnostics(Diagnostics {
            progress_bar: true,
            ..Default::default()
        })
        .build();
    let results = corrector(conf).run_batch(&jobs);

    assert_eq!(results.len(), 3);
    assert_eq!(
        results[1].as_ref().unwrap_err(),
        &DcError::InvalidStateSize { size: 4 }
    );
    for i in [0, 2] {
        let solution = results[i].as_ref().unwrap();
        assert_eq!(solution.outcome, Outcome::Converged, "{}", jobs[i].name);
        assert!(position_error_km(&solution.state, &truth) < 1e-3);
    }
}
