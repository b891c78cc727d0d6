extern crate nyx_dc as nyx;

use super::*;
use nyx::od::prelude::*;
use rstest::*;

const OUTLIER: usize = 29;

/// Thirty range/azimuth/elevation observations, the last of which has a range off by 5 km.
fn observations_with_outlier(truth: &StateVector, noise_seed: Option<u64>) -> Vec<Observation> {
    let mut observations = simulate(
        truth,
        range_az_el_sensor(),
        MeasurementKind::RangeAzEl,
        30,
        noise_seed,
    );
    let mut values = observations[OUTLIER].data.values();
    values[0] += 5.0;
    observations[OUTLIER].data = MeasurementData::from_values(MeasurementKind::RangeAzEl, &values);
    observations
}

#[rstest]
#[case::before_last(ObservationSelection::builder().last(OUTLIER - 1).build(), 29)]
#[case::even_only(ObservationSelection::builder().stride(2).build(), 15)]
#[case::from_first(ObservationSelection::builder().first(0).last(OUTLIER - 1).stride(1).build(), 29)]
fn outlier_excluded_by_selection(#[case] selection: ObservationSelection, #[case] used: usize) {
    let _ = pretty_env_logger::try_init();

    let truth = truth_state();
    let observations = observations_with_outlier(&truth, None);
    assert_eq!(selection.indices(observations.len()).len(), used);

    let conf = DcConfig::builder().selection(selection).build();
    let solution = corrector(conf)
        .run(&perturbed(&truth, 2.0, 2e-3), &observations)
        .unwrap();

    assert_eq!(solution.outcome, Outcome::Converged);
    assert_eq!(solution.num_used, used);
    assert_eq!(solution.num_rejected, 0);
    assert!(position_error_km(&solution.state, &truth) < 1e-3);
}

/// Without any rejection, the outlier is fitted like the other observations and biases the solution.
#[test]
fn outlier_included_biases_fit() {
    let _ = pretty_env_logger::try_init();

    let truth = truth_state();
    let observations = observations_with_outlier(&truth, None);

    let solution = corrector(DcConfig::default())
        .run(&perturbed(&truth, 2.0, 2e-3), &observations)
        .unwrap();
    println!("{solution}");

    assert!(matches!(
        solution.outcome,
        Outcome::Converged | Outcome::MaxIterationsExceeded
    ));
    assert_eq!(solution.num_used, 30);
    assert_eq!(solution.num_rejected, 0);
    assert!(solution.final_rms > 1.0, "RMS {}", solution.final_rms);
    assert!(position_error_km(&solution.state, &truth) > 1e-3);
}

/// Residual editing removes the outlier for the rest of the run.
#[rstest]
#[case(RejectCriteria::RmsMultiplier { value: 3.0, from_iteration: 2 })]
#[case(RejectCriteria::ResidualRatio { value: 100.0, from_iteration: 2 })]
fn outlier_rejected_by_residual_editing(#[case] reject: RejectCriteria) {
    let _ = pretty_env_logger::try_init();

    let truth = truth_state();
    let observations = observations_with_outlier(&truth, Some(7));

    let conf = DcConfig::builder().reject(reject).build();
    let solution = corrector(conf)
        .run(&perturbed(&truth, 2.0, 2e-3), &observations)
        .unwrap();
    println!("{solution}");

    assert_eq!(solution.outcome, Outcome::Converged);
    assert!(solution.num_rejected >= 1);
    assert_eq!(solution.num_used + solution.num_rejected, 30);
    assert!(solution.final_rms < 2.0, "RMS {}", solution.final_rms);
    assert!(position_error_km(&solution.state, &truth) < 0.1);
    // Nothing is rejected during the first iteration
    assert_eq!(solution.history[0].rejected, 0);
}

/// Observations outside of the sensor's bounds never take part in the fit.
#[test]
fn out_of_bounds_observations() {
    let _ = pretty_env_logger::try_init();

    let truth = truth_state();
    let mut observations = observations_with_outlier(&truth, None);
    // Farther than any satellite in low Earth orbit could be
    let mut values = observations[OUTLIER].data.values();
    values[0] = 50_000.0;
    observations[OUTLIER].data = MeasurementData::from_values(MeasurementKind::RangeAzEl, &values);

    let bounded =
        range_az_el_sensor().with_bounds(Axis::Range, AxisBounds::new(0.0, 40_000.0));
    let dc = DifferentialCorrector::builder()
        .propagator(TwoBody::default())
        .sensors(Sensor::catalog([bounded]))
        .build();
    let solution = dc
        .run(&perturbed(&truth, 2.0, 2e-3), &observations)
        .unwrap();

    assert_eq!(solution.outcome, Outcome::Converged);
    assert_eq!(solution.num_rejected, 1);
    assert_eq!(solution.num_used, 29);
    assert!(position_error_km(&solution.state, &truth) < 1e-3);
}
