use crate::{constant, linear, ElasticStub};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use mtest::constraint::{Constraint, ImposedDrivingVariable, ImposedStress, ImposedThermodynamicForce};
use mtest::error::ConfigurationError;
use mtest::hypothesis::ModellingHypothesis;
use mtest::nalgebra::{DMatrix, DVector};
use std::f64::consts::SQRT_2;

fn behaviour() -> ElasticStub {
    ElasticStub::new(ModellingHypothesis::PlaneStrain)
}

#[test]
fn imposed_driving_variable_replaces_row() {
    let constraint = ImposedDrivingVariable::new(&behaviour(), "EYY", linear(&[(0.0, 0.0), (1.0, 1e-2)])).unwrap();
    assert_eq!(constraint.component_name(), "EYY");
    assert_eq!(constraint.component_position(), 1);
    assert_eq!(constraint.number_of_lagrange_multipliers(), 0);

    let mut k = DMatrix::from_element(4, 4, 3.0);
    let mut r = DVector::from_element(4, 1.0);
    let u0 = DVector::zeros(4);
    let u1 = DVector::from_element(4, 2e-3);
    constraint.set_values(&mut k, &mut r, &u0, &u1, 0, 0.25, 0.25, 10.0);

    let expected_row = DMatrix::from_row_slice(1, 4, &[0.0, 10.0, 0.0, 0.0]);
    assert_matrix_eq!(k.row(1).clone_owned(), expected_row, comp = float);
    // Target at t + dt = 0.5 is 5e-3
    assert_scalar_eq!(r[1], 10.0 * (2e-3 - 5e-3), comp = abs, tol = 1e-14);
    // Other rows are untouched
    assert_eq!(k[(0, 1)], 3.0);
    assert_eq!(r[0], 1.0);
}

#[test]
fn imposed_shear_strain_is_scaled_to_tensorial_convention() {
    let constraint = ImposedDrivingVariable::new(&behaviour(), "EXY", constant(1e-3)).unwrap();
    let mut k = DMatrix::identity(4, 4);
    let mut r = DVector::zeros(4);
    let u = DVector::zeros(4);
    constraint.set_values(&mut k, &mut r, &u, &u, 0, 0.0, 1.0, 1.0);
    assert_scalar_eq!(r[3], -SQRT_2 * 1e-3, comp = abs, tol = 1e-15);

    let converged = DVector::from_vec(vec![0.0, 0.0, 0.0, SQRT_2 * 1e-3]);
    assert!(constraint.check_convergence(&converged, &u, 0, 1e-12, 1e-3, 0.0, 1.0));
    assert!(!constraint.check_convergence(&u, &u, 0, 1e-12, 1e-3, 0.0, 1.0));
}

#[test]
fn imposed_thermodynamic_force_shifts_residual() {
    let constraint = ImposedThermodynamicForce::new(&behaviour(), "SXX", constant(100.0)).unwrap();
    let mut k = DMatrix::from_element(4, 4, 3.0);
    let mut r = DVector::from_element(4, 1.0);
    let u = DVector::zeros(4);
    constraint.set_values(&mut k, &mut r, &u, &u, 0, 0.0, 1.0, 10.0);
    assert_eq!(r[0], -99.0);
    assert_eq!(k, DMatrix::from_element(4, 4, 3.0));
}

#[test]
fn imposed_stress_checks_convergence_on_thermodynamic_forces() {
    let constraint = ImposedStress::new(&behaviour(), "SXX", constant(100.0)).unwrap();
    let u = DVector::zeros(4);
    let close = DVector::from_vec(vec![100.0005, 0.0, 0.0, 0.0]);
    let far = DVector::from_vec(vec![105.0, 0.0, 0.0, 0.0]);
    assert!(constraint.check_convergence(&u, &close, 0, 1e-12, 1e-3, 0.0, 1.0));
    assert!(!constraint.check_convergence(&u, &far, 0, 1e-12, 1e-3, 0.0, 1.0));

    let diagnostic = constraint.failed_criteria_diagnostic(&u, &far, 0, 1e-12, 1e-3, 0.0, 1.0);
    insta::assert_snapshot!(diagnostic, @"imposed thermodynamic force 'SXX' (error : 5e0, criterion value : 1e-3)");
}

#[test]
fn constraints_reject_components_of_other_hypotheses() {
    let result = ImposedDrivingVariable::new(&behaviour(), "EXZ", constant(0.0));
    assert!(matches!(result, Err(ConfigurationError::InvalidComponent { .. })));
    let result = ImposedThermodynamicForce::new(&behaviour(), "EXX", constant(0.0));
    assert!(matches!(result, Err(ConfigurationError::InvalidComponent { .. })));
}

#[test]
fn events_toggle_constraint_activation() {
    let mut constraint = ImposedStress::new(&behaviour(), "SXX", constant(0.0))
        .unwrap()
        .inactive()
        .with_activating_events(["Loading"])
        .with_deactivating_events(["Unloading"]);
    assert!(!constraint.is_active());
    constraint.treat_event("Unrelated");
    assert!(!constraint.is_active());
    constraint.treat_event("Loading");
    assert!(constraint.is_active());
    constraint.treat_event("Unloading");
    assert!(!constraint.is_active());
}
