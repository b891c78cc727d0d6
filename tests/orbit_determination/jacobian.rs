extern crate nyx_dc as nyx;

use nyx::cosmic::EARTH_GM_KM3_S2;
use nyx::linalg::{Matrix3, Matrix6, SMatrix, Vector6};
use nyx::od::jacobian::Perturbations;
use nyx::od::prelude::*;
use rstest::*;

/// Derivative of the state and of the state transition matrix under point mass gravity.
fn two_body_eom(x: &Vector6<f64>, stm: &Matrix6<f64>) -> (Vector6<f64>, Matrix6<f64>) {
    let r = x.fixed_rows::<3>(0).clone_owned();
    let rmag = r.norm();
    let accel = -EARTH_GM_KM3_S2 / rmag.powi(3) * r;

    let gravity_gradient = EARTH_GM_KM3_S2 / rmag.powi(5) * (3.0 * r * r.transpose())
        - EARTH_GM_KM3_S2 / rmag.powi(3) * Matrix3::identity();
    let mut a = Matrix6::zeros();
    a.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());
    a.fixed_view_mut::<3, 3>(3, 0).copy_from(&gravity_gradient);

    let mut dx = Vector6::zeros();
    dx.fixed_rows_mut::<3>(0).copy_from(&x.fixed_rows::<3>(3));
    dx.fixed_rows_mut::<3>(3).copy_from(&accel);
    (dx, a * stm)
}

/// Integrates the state and its transition matrix with a fixed step RK4.
fn rk4_stm(x0: &Vector6<f64>, duration_s: f64, step_s: f64) -> (Vector6<f64>, Matrix6<f64>) {
    let mut x = *x0;
    let mut stm = Matrix6::identity();
    let steps = (duration_s / step_s).round() as usize;
    for _ in 0..steps {
        let (k1x, k1p) = two_body_eom(&x, &stm);
        let (k2x, k2p) = two_body_eom(&(x + 0.5 * step_s * k1x), &(stm + 0.5 * step_s * k1p));
        let (k3x, k3p) = two_body_eom(&(x + 0.5 * step_s * k2x), &(stm + 0.5 * step_s * k2p));
        let (k4x, k4p) = two_body_eom(&(x + step_s * k3x), &(stm + step_s * k3p));
        x += step_s / 6.0 * (k1x + 2.0 * k2x + 2.0 * k3x + k4x);
        stm += step_s / 6.0 * (k1p + 2.0 * k2p + 2.0 * k3p + k4p);
    }
    (x, stm)
}

fn relative_block_error(
    fd: &SMatrix<f64, 6, 6>,
    analytic: &Matrix6<f64>,
    row: usize,
    col: usize,
) -> f64 {
    let fd_block = fd.fixed_view::<3, 3>(row, col);
    let an_block = analytic.fixed_view::<3, 3>(row, col);
    (fd_block - an_block).norm() / an_block.norm()
}

/// The finite difference partials of an ephemeris observation are the state transition matrix.
#[rstest]
#[case(Differencing::Forward, 1e-7, 1e-5)]
#[case(Differencing::Central, 1e-6, 1e-5)]
#[case::default_forward(Differencing::Forward, 1e-3, 1e-7)]
#[case::default_central(Differencing::Central, 1e-3, 1e-7)]
fn ephemeris_partials_match_two_body_stm(
    #[case] differencing: Differencing,
    #[case] percent_change: f64,
    #[case] absolute_floor: f64,
) {
    let _ = pretty_env_logger::try_init();

    let epoch = Epoch::from_gregorian_utc_at_midnight(2024, 3, 1);
    let classical = StateVector::new(
        StateKind::Classical,
        epoch,
        vec![7_500.0, 0.05, 0.8, 1.0, 0.5, 0.3],
    );
    let adapter = StateAdapter::new(StateKind::Cartesian);
    let cartesian = StateAdapter::new(StateKind::Classical)
        .convert(&classical, StateKind::Cartesian)
        .unwrap();
    let x0 = Vector6::from_column_slice(&cartesian.components);

    let elapsed_s = 900.0;
    let sensor = Sensor::builder()
        .id(1)
        .site(GeodeticSite::new(0.0, 0.0, 0.0))
        .build();
    let mut obs = Observation::new(
        1,
        0,
        epoch + Duration::from_seconds(elapsed_s),
        MeasurementData::from_values(MeasurementKind::Ephemeris, &Vector6::zeros()),
    );
    obs.prepare(&sensor, &EarthOrientation::default(), epoch);

    let prop = TwoBody::default();
    let predictor = Predictor::new(&prop);
    let handle = prop.init(&adapter.to_internal(&x0).unwrap(), epoch).unwrap();
    let nominal = predictor.compute(&handle, &obs).unwrap();

    let (x_rk4, stm) = rk4_stm(&x0, elapsed_s, 1.0);
    assert!((nominal.fixed_rows::<3>(0) - x_rk4.fixed_rows::<3>(0)).norm() < 1e-6);

    let policy = PerturbationPolicy {
        percent_change,
        absolute_floor,
        differencing,
    };
    let perturbations = Perturbations::new(&prop, &adapter, &x0, epoch, &policy).unwrap();
    let h_tilde = perturbations.partials(&predictor, &obs, &nominal).unwrap();

    for (row, col) in [(0, 0), (0, 3), (3, 0), (3, 3)] {
        let err = relative_block_error(&h_tilde, &stm, row, col);
        assert!(err < 1e-4, "{differencing:?} block ({row}, {col}): {err:.3e}\n{h_tilde}\n{stm}");
    }
}

/// With respect to the drag term, the partials of the secular J2 propagator are nil at the epoch and grow afterwards.
#[test]
fn drag_term_partials() {
    let epoch = Epoch::from_gregorian_utc_at_midnight(2024, 3, 1);
    let x0 = nyx::linalg::SVector::<f64, 7>::from_column_slice(&[
        6_878.0, 0.002, 0.9, 0.1, 0.2, 0.3, 1e-3,
    ]);
    let adapter = StateAdapter::new(StateKind::Classical);
    let prop = J2Secular::default();
    let predictor = Predictor::new(&prop);
    let handle = prop.init(&adapter.to_internal(&x0).unwrap(), epoch).unwrap();
    let policy = PerturbationPolicy {
        percent_change: 1e-3,
        absolute_floor: 1e-7,
        differencing: Differencing::Central,
    };
    let perturbations = Perturbations::new(&prop, &adapter, &x0, epoch, &policy).unwrap();

    let sensor = Sensor::builder()
        .id(1)
        .site(GeodeticSite::new(0.0, 0.0, 0.0))
        .build();
    let mut drag_sensitivity = Vec::new();
    for minutes in [0.0, 60.0, 120.0] {
        let mut obs = Observation::new(
            1,
            0,
            epoch + Duration::from_seconds(minutes * 60.0),
            MeasurementData::from_values(MeasurementKind::Ephemeris, &Vector6::zeros()),
        );
        obs.prepare(&sensor, &EarthOrientation::default(), epoch);
        let nominal = predictor.compute(&handle, &obs).unwrap();
        let h_tilde = perturbations.partials(&predictor, &obs, &nominal).unwrap();
        drag_sensitivity.push(h_tilde.column(6).fixed_rows::<3>(0).norm());
    }

    assert!(drag_sensitivity[0] < 1e-6, "{drag_sensitivity:?}");
    assert!(drag_sensitivity[1] > 1.0, "{drag_sensitivity:?}");
    assert!(drag_sensitivity[2] > drag_sensitivity[1], "{drag_sensitivity:?}");
}
