use matrixcompare::assert_scalar_eq;
use mtest::behaviour::{BehaviourRegistry, StiffnessMatrixType};
use mtest::evolution::{ConstantEvolution, Evolution, LPEvolution};
use mtest::hypothesis::ModellingHypothesis;
use mtest::nalgebra::Matrix3;
use mtest::options::PredictionPolicy;
use mtest::point_study::PointStudy;
use mtest_materials::library::{
    static_loader, ISOTROPIC_ELASTICITY, LIBRARY, NORTON, ORTHOTROPIC_ELASTICITY, UMAT_ISOTROPIC_ELASTICITY,
};
use std::f64::consts::SQRT_2;
use std::rc::Rc;

fn constant(value: f64) -> Rc<dyn Evolution> {
    Rc::new(ConstantEvolution::new(value))
}

fn linear(points: &[(f64, f64)]) -> Rc<dyn Evolution> {
    Rc::new(LPEvolution::new(points.iter().copied()).unwrap())
}

fn study(interface: &str, function: &str, hypothesis: ModellingHypothesis) -> PointStudy {
    let mut study = PointStudy::new();
    study
        .load_behaviour(
            &BehaviourRegistry::default(),
            &static_loader(),
            interface,
            LIBRARY,
            function,
            hypothesis,
        )
        .unwrap();
    study
        .set_external_state_variable("Temperature", constant(293.15))
        .unwrap();
    study
}

fn set_isotropic_properties(study: &mut PointStudy, young: f64, poisson: f64) {
    study
        .set_material_property("YoungModulus", constant(young))
        .unwrap();
    study
        .set_material_property("PoissonRatio", constant(poisson))
        .unwrap();
}

/// Orthotropic elasticity whose first material axis is the global y axis.
fn rotated_orthotropic_study(e1: f64, e2: f64, nu12: f64) -> PointStudy {
    let mut study = study("generic", ORTHOTROPIC_ELASTICITY, ModellingHypothesis::Tridimensional);
    for (name, value) in [
        ("YoungModulus1", e1),
        ("YoungModulus2", e2),
        ("YoungModulus3", 80e3),
        ("PoissonRatio12", nu12),
        ("PoissonRatio23", 0.3),
        ("PoissonRatio13", 0.25),
        ("ShearModulus12", 30e3),
        ("ShearModulus23", 20e3),
        ("ShearModulus13", 25e3),
    ] {
        study.set_material_property(name, constant(value)).unwrap();
    }
    let r = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    study.set_rotation_matrix(r).unwrap();
    study
}

#[test]
fn generic_isotropic_elasticity_under_uniaxial_stress() {
    let (young, poisson) = (200e3, 0.3);
    let mut study = study("generic", ISOTROPIC_ELASTICITY, ModellingHypothesis::Tridimensional);
    set_isotropic_properties(&mut study, young, poisson);
    study
        .impose_stress("SXX", linear(&[(0.0, 0.0), (1.0, 100.0)]))
        .unwrap();
    study.set_times([0.0, 0.5, 1.0]).unwrap();

    let report = study.execute().unwrap();
    assert!(report.is_success(), "{}", report.diagnostic);
    assert_eq!(report.periods, 2);
    let last = report.last().unwrap();
    assert_eq!(last.time, 1.0);
    assert_scalar_eq!(last.driving_variables[0], 100.0 / young, comp = abs, tol = 1e-12);
    assert_scalar_eq!(last.driving_variables[1], -poisson * 100.0 / young, comp = abs, tol = 1e-12);
    assert_scalar_eq!(last.driving_variables[2], -poisson * 100.0 / young, comp = abs, tol = 1e-12);
    assert_scalar_eq!(last.thermodynamic_forces[0], 100.0, comp = abs, tol = 1e-3);
    for i in 1..6 {
        assert!(last.thermodynamic_forces[i].abs() < 1e-3);
    }
}

#[test]
fn generic_isotropic_elasticity_under_fully_imposed_stress() {
    let (young, poisson) = (200e3, 0.3);
    let mut study = study("generic", ISOTROPIC_ELASTICITY, ModellingHypothesis::Tridimensional);
    set_isotropic_properties(&mut study, young, poisson);
    study.impose_stress("SXX", constant(100.0)).unwrap();
    for component in ["SYY", "SZZ", "SXY", "SXZ", "SYZ"] {
        study.impose_stress(component, constant(0.0)).unwrap();
    }
    study.set_times([0.0, 1.0]).unwrap();

    let report = study.execute().unwrap();
    assert!(report.is_success(), "{}", report.diagnostic);
    assert_eq!(report.periods, 1);
    let last = report.last().unwrap();
    let exx = 100.0 / young;
    for (i, expected) in [exx, -poisson * exx, -poisson * exx].into_iter().enumerate() {
        let relative_error = (last.driving_variables[i] - expected).abs() / expected.abs();
        assert!(relative_error < 1e-10, "component {i}: relative error {relative_error:e}");
    }
    for i in 3..6 {
        assert_scalar_eq!(last.driving_variables[i], 0.0, comp = abs, tol = 1e-14);
    }
}

#[test]
fn generic_isotropic_elasticity_in_plane_stress() {
    let (young, poisson) = (70e3, 0.25);
    let mut study = study("generic", ISOTROPIC_ELASTICITY, ModellingHypothesis::PlaneStress);
    set_isotropic_properties(&mut study, young, poisson);
    study.impose_stress("SXX", constant(50.0)).unwrap();
    study.set_times([0.0, 1.0]).unwrap();

    let report = study.execute().unwrap();
    assert!(report.is_success(), "{}", report.diagnostic);
    let last = report.last().unwrap();
    assert_scalar_eq!(last.driving_variables[2], -poisson * 50.0 / young, comp = abs, tol = 1e-12);
    assert!(last.thermodynamic_forces[2].abs() < 1e-3);
}

#[test]
fn umat_isotropic_elasticity_under_shear() {
    let (young, poisson) = (200e3, 0.3);
    let mu = young / (2.0 * (1.0 + poisson));
    let mut study = study("umat", UMAT_ISOTROPIC_ELASTICITY, ModellingHypothesis::Tridimensional);
    set_isotropic_properties(&mut study, young, poisson);
    study
        .impose_strain("EXY", linear(&[(0.0, 0.0), (1.0, 1e-3)]))
        .unwrap();
    study.set_times([0.0, 0.25, 0.5, 1.0]).unwrap();

    let report = study.execute().unwrap();
    assert!(report.is_success(), "{}", report.diagnostic);
    let last = report.last().unwrap();
    // Stored in tensorial convention
    assert_scalar_eq!(last.driving_variables[3], SQRT_2 * 1e-3, comp = abs, tol = 1e-15);
    assert_scalar_eq!(last.thermodynamic_forces[3] / SQRT_2, 2.0 * mu * 1e-3, comp = abs, tol = 1e-6);
    for i in 0..3 {
        assert!(last.driving_variables[i].abs() < 1e-12);
    }
}

#[test]
fn orthotropic_elasticity_rotated_about_z_swaps_first_two_axes() {
    let (e1, e2, nu12) = (100e3, 50e3, 0.2);
    let mut study = rotated_orthotropic_study(e1, e2, nu12);
    study.impose_stress("SXX", constant(100.0)).unwrap();
    study.set_times([0.0, 1.0]).unwrap();

    let report = study.execute().unwrap();
    assert!(report.is_success(), "{}", report.diagnostic);
    let last = report.last().unwrap();
    assert_scalar_eq!(last.driving_variables[0], 100.0 / e2, comp = abs, tol = 1e-12);
    assert_scalar_eq!(last.driving_variables[1], -nu12 * 100.0 / e1, comp = abs, tol = 1e-12);
}

#[test]
fn orthotropic_elastic_prediction_from_material_properties_is_exact() {
    let (e1, e2, nu12) = (100e3, 50e3, 0.2);
    let mut study = rotated_orthotropic_study(e1, e2, nu12);
    study
        .options_mut()
        .set_prediction_policy(PredictionPolicy::ElasticPredictionFromMaterialProperties)
        .unwrap();
    study
        .options_mut()
        .set_stiffness_matrix_type(StiffnessMatrixType::ElasticFromMaterialProperties)
        .unwrap();
    study.impose_stress("SXX", constant(100.0)).unwrap();
    study.set_times([0.0, 1.0]).unwrap();

    let report = study.execute().unwrap();
    assert!(report.is_success(), "{}", report.diagnostic);
    // The prediction operator is the stiffness of the material in the global frame
    assert_eq!(report.iterations, 1);
    let last = report.last().unwrap();
    assert_scalar_eq!(last.driving_variables[0], 100.0 / e2, comp = abs, tol = 1e-12);
    assert_scalar_eq!(last.driving_variables[1], -nu12 * 100.0 / e1, comp = abs, tol = 1e-12);
}

#[test]
fn norton_relaxation_under_constant_strain() {
    let mut study = study("generic", NORTON, ModellingHypothesis::Tridimensional);
    set_isotropic_properties(&mut study, 200e3, 0.3);
    study
        .set_material_property("NortonCoefficient", constant(1e-11))
        .unwrap();
    study
        .set_material_property("NortonExponent", constant(3.0))
        .unwrap();
    study
        .impose_strain("EXX", linear(&[(0.0, 0.0), (1.0, 1e-3)]))
        .unwrap();
    study.set_tangent_operator_comparison(1e-7, 1e-6).unwrap();
    study.set_times((0..=20).map(f64::from)).unwrap();

    let report = study.execute().unwrap();
    assert!(report.is_success(), "{}", report.diagnostic);
    assert_eq!(report.periods, 20);
    assert_eq!(report.tangent_operator_mismatches, 0);

    let stresses: Vec<f64> = report
        .trajectory
        .iter()
        .skip(1)
        .map(|p| p.thermodynamic_forces[0])
        .collect();
    assert!(stresses.iter().all(|&s| s > 0.0));
    assert!(stresses.windows(2).all(|w| w[1] < w[0]), "{stresses:?}");

    let last = report.last().unwrap();
    // Equivalent viscoplastic strain
    assert!(last.internal_state_variables[0] > 0.0);
    // The viscoplastic strain is deviatoric
    let trace: f64 = last.internal_state_variables.iter().skip(1).take(3).sum();
    assert!(trace.abs() < 1e-12);
}
