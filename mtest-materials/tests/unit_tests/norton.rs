use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use mtest::nalgebra::{DVector, DVectorView, DVectorViewMut};
use mtest_materials::norton::{integrate, von_mises_stress, NortonParameters};
use mtest_materials::{LameParameters, YoungPoisson};
use mtest_optimize::calculus::try_approximate_jacobian_fd;

fn parameters(coefficient: f64) -> NortonParameters {
    NortonParameters {
        elasticity: LameParameters::from(YoungPoisson {
            young: 200e3,
            poisson: 0.3,
        }),
        coefficient,
        exponent: 3.0,
    }
}

#[test]
fn von_mises_stress_of_uniaxial_and_shear_states() {
    let uniaxial = DVector::from_column_slice(&[-120.0, 0.0, 0.0, 0.0]);
    assert_scalar_eq!(von_mises_stress(&uniaxial), 120.0, comp = abs, tol = 1e-12);
    // Pure shear tau, stored as sqrt(2) tau
    let tau = 50.0;
    let shear = DVector::from_column_slice(&[0.0, 0.0, 0.0, tau * 2f64.sqrt(), 0.0, 0.0]);
    assert_scalar_eq!(von_mises_stress(&shear), 3f64.sqrt() * tau, comp = abs, tol = 1e-12);
}

#[test]
fn zero_coefficient_is_elastic() {
    let parameters = parameters(0.0);
    let trial = DVector::from_column_slice(&[200.0, -10.0, 5.0, 3.0, 0.0, 1.0]);
    let update = integrate(&parameters, &trial, 1.0).unwrap();
    assert_eq!(update.stress, trial);
    assert_eq!(update.equivalent_strain_increment, 0.0);
    assert_matrix_eq!(update.tangent_operator, parameters.elasticity.stiffness(6));
}

#[test]
fn equivalent_strain_increment_satisfies_implicit_flow_rule() {
    let parameters = parameters(1e-9);
    let trial = DVector::from_column_slice(&[300.0, 0.0, 0.0]);
    let dt = 2.0;
    let update = integrate(&parameters, &trial, dt).unwrap();
    let dp = update.equivalent_strain_increment;
    assert!(dp > 0.0);
    let q = von_mises_stress(&update.stress);
    assert_scalar_eq!(dp, dt * 1e-9 * q.powi(3), comp = abs, tol = 1e-14);
    // The relaxed stress stays uniaxial and below the trial stress
    assert!(update.stress[0] < 300.0);
    assert_scalar_eq!(update.stress[1], update.stress[2], comp = abs, tol = 1e-10);
}

#[test]
fn consistent_tangent_operator_matches_finite_differences() {
    let parameters = parameters(1e-11);
    let elastic = parameters.elasticity.stiffness(6);
    let strain = DVector::from_column_slice(&[1.5e-3, -2e-4, 1e-4, 4e-4, -1e-4, 2e-4]);
    let dt = 1.0;
    let update = integrate(&parameters, &(&elastic * &strain), dt).unwrap();
    assert!(update.equivalent_strain_increment > 0.0);

    let numerical = try_approximate_jacobian_fd(
        6,
        |e: DVectorView<f64>, mut s: DVectorViewMut<f64>| {
            let trial = &elastic * e.clone_owned();
            let update = integrate(&parameters, &trial, dt).ok_or("local iterations failed")?;
            s.copy_from(&update.stress);
            Ok::<(), &str>(())
        },
        &strain,
        1e-9,
    )
    .unwrap();
    let scale = update.tangent_operator.amax();
    assert_matrix_eq!(update.tangent_operator, numerical, comp = abs, tol = 1e-5 * scale);
}
