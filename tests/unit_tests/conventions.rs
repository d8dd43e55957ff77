use matrixcompare::{assert_matrix_eq, assert_scalar_eq, prop_assert_matrix_eq};
use mtest::behaviour::{
    elastic_stiffness_from_material_properties, isotropic_elastic_stiffness, orthotropic_elastic_stiffness,
    BehaviourDescription, Symmetry,
};
use mtest::convention::{
    check_rotation_matrix, rotate_tangent_operator_to_global_frame, rotate_tangent_operator_to_material_frame,
    rotate_to_global_frame, rotate_to_material_frame, rotation_matrix_to_fortran_order, shear_factor,
    stensor_rotation_matrix, strains_from_engineering, strains_to_engineering, stresses_from_engineering,
    stresses_to_engineering, tangent_operator_from_engineering, tangent_operator_from_fortran_order,
    tangent_operator_to_engineering, tangent_operator_to_fortran_order,
};
use mtest::error::{ConfigurationError, IntegrationFailure};
use mtest::hypothesis::ModellingHypothesis;
use mtest::state::CurrentState;
use mtest::nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};
use proptest::prelude::*;
use std::f64::consts::SQRT_2;

fn stensor_strategy(n: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-10.0..10.0, n)
}

fn rotation_strategy() -> impl Strategy<Value = Matrix3<f64>> {
    [-3.0..3.0, -3.0..3.0, -3.0..3.0]
        .prop_map(|[x, y, z]| Rotation3::from_scaled_axis(Vector3::new(x, y, z)).into_inner())
}

#[test]
fn shear_factor_scales_off_diagonal_components_only() {
    assert_eq!(shear_factor(0), 1.0);
    assert_eq!(shear_factor(2), 1.0);
    assert_eq!(shear_factor(3), SQRT_2);
    assert_eq!(shear_factor(5), SQRT_2);
}

#[test]
fn engineering_strains_double_shear_components() {
    // A pure shear with eps_xy = 1e-3 is stored as sqrt(2) * 1e-3
    let mut e = vec![0.0, 0.0, 0.0, SQRT_2 * 1e-3];
    strains_to_engineering(&mut e);
    assert_scalar_eq!(e[3], 2e-3, comp = abs, tol = 1e-15);

    let mut s = vec![1.0, 2.0, 3.0, SQRT_2 * 50.0];
    stresses_to_engineering(&mut s);
    assert_eq!(&s[..3], &[1.0, 2.0, 3.0]);
    assert_scalar_eq!(s[3], 50.0, comp = abs, tol = 1e-12);
    stresses_from_engineering(&mut s);
    assert_scalar_eq!(s[3], SQRT_2 * 50.0, comp = abs, tol = 1e-12);
}

#[test]
fn engineering_tangent_operator_doubles_shear_shear_entries() {
    let mut k = DMatrix::from_element(4, 4, 1.0);
    tangent_operator_from_engineering(&mut k);
    assert_scalar_eq!(k[(0, 0)], 1.0, comp = float);
    assert_scalar_eq!(k[(0, 3)], SQRT_2, comp = float);
    assert_scalar_eq!(k[(3, 0)], SQRT_2, comp = float);
    assert_scalar_eq!(k[(3, 3)], 2.0, comp = float);
    tangent_operator_to_engineering(&mut k);
    assert_matrix_eq!(k, DMatrix::from_element(4, 4, 1.0), comp = abs, tol = 1e-14);
}

#[test]
fn fortran_order_of_tangent_operator_is_column_major() {
    let k = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    let mut buffer = [0.0; 4];
    tangent_operator_to_fortran_order(&k, &mut buffer);
    assert_eq!(buffer, [1.0, 3.0, 2.0, 4.0]);
    assert_eq!(tangent_operator_from_fortran_order(&buffer, 2), k);
}

#[test]
fn fortran_order_of_rotation_matrix_stores_transpose_by_columns() {
    let r = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
    let drot = rotation_matrix_to_fortran_order(&r);
    // DROT(i, j) = r(j, i), stored column-major: element (i, j) is at i + 3 j
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(drot[i + 3 * j], r[(j, i)]);
        }
    }
    assert_eq!(drot, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
}

#[test]
fn rotation_by_quarter_turn_swaps_normal_components() {
    // Material axis 1 is the global Y axis
    let r = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let mut s = vec![1.0, 2.0, 3.0, 0.0];
    rotate_to_material_frame(&r, &mut s);
    assert_matrix_eq!(
        DVector::from_vec(s),
        DVector::from_vec(vec![2.0, 1.0, 3.0, 0.0]),
        comp = abs,
        tol = 1e-14
    );
}

#[test]
fn rotation_leaves_one_dimensional_tensors_untouched() {
    let r = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.3).into_inner();
    let mut v = vec![1.0, 2.0, 3.0];
    rotate_to_material_frame(&r, &mut v);
    assert_eq!(v, vec![1.0, 2.0, 3.0]);
}

#[test]
fn isotropic_stiffness_is_invariant_under_rotation() {
    let r = Rotation3::from_scaled_axis(Vector3::new(0.3, -0.7, 1.1)).into_inner();
    let k = isotropic_elastic_stiffness(200e3, 0.3, 6);
    let mut rotated = k.clone();
    rotate_tangent_operator_to_global_frame(&r, &mut rotated);
    assert_matrix_eq!(rotated, k, comp = abs, tol = 1e-9);
}

#[test]
fn orthotropic_elastic_stiffness_from_material_properties_is_expressed_in_global_frame() {
    let names = [
        "YoungModulus1",
        "YoungModulus2",
        "YoungModulus3",
        "PoissonRatio12",
        "PoissonRatio23",
        "PoissonRatio13",
        "ShearModulus12",
        "ShearModulus23",
        "ShearModulus13",
    ];
    let values = [100e3, 50e3, 80e3, 0.2, 0.3, 0.25, 30e3, 20e3, 25e3];
    let description = BehaviourDescription::new("Orthotropic", ModellingHypothesis::Tridimensional)
        .with_symmetry(Symmetry::Orthotropic)
        .with_material_properties(names);
    let mut state = CurrentState::new(6, 6, 9, 0, 0);
    state.mprops1.copy_from_slice(&values);
    // Material axis 1 is the global Y axis
    state.r = Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0);

    let km = orthotropic_elastic_stiffness([100e3, 50e3, 80e3], [0.2, 0.3, 0.25], [30e3, 20e3, 25e3], 6).unwrap();
    let kg = elastic_stiffness_from_material_properties(&description, &state).unwrap();
    assert_scalar_eq!(kg[(0, 0)], km[(1, 1)], comp = abs, tol = 1e-6);
    assert_scalar_eq!(kg[(1, 1)], km[(0, 0)], comp = abs, tol = 1e-6);
    assert_scalar_eq!(kg[(2, 2)], km[(2, 2)], comp = abs, tol = 1e-6);
    assert_scalar_eq!(kg[(0, 1)], km[(1, 0)], comp = abs, tol = 1e-6);
    assert_scalar_eq!(kg[(0, 2)], km[(1, 2)], comp = abs, tol = 1e-6);
    assert_scalar_eq!(kg[(3, 3)], km[(3, 3)], comp = abs, tol = 1e-6);
    // XZ and YZ are exchanged
    assert_scalar_eq!(kg[(4, 4)], km[(5, 5)], comp = abs, tol = 1e-6);
    assert_scalar_eq!(kg[(5, 5)], km[(4, 4)], comp = abs, tol = 1e-6);

    state.r = Matrix3::identity();
    let k = elastic_stiffness_from_material_properties(&description, &state).unwrap();
    assert_matrix_eq!(k, km, comp = abs, tol = 1e-6);
}

#[test]
fn elastic_stiffness_from_material_properties_requires_elastic_constants() {
    let description = BehaviourDescription::new("Viscous", ModellingHypothesis::Tridimensional)
        .with_material_properties(["YoungModulus", "Viscosity"]);
    let mut state = CurrentState::new(6, 6, 2, 0, 0);
    state.mprops1[0] = 200e3;
    assert!(matches!(
        elastic_stiffness_from_material_properties(&description, &state),
        Err(IntegrationFailure::Unsupported(_))
    ));

    let description = BehaviourDescription::new("Elastic", ModellingHypothesis::PlaneStrain)
        .with_material_properties(["PoissonRatio", "YoungModulus"]);
    let mut state = CurrentState::new(4, 4, 2, 0, 0);
    state.mprops1.copy_from_slice(&[0.3, 200e3]);
    let k = elastic_stiffness_from_material_properties(&description, &state).unwrap();
    assert_matrix_eq!(k, isotropic_elastic_stiffness(200e3, 0.3, 4), comp = abs, tol = 1e-9);
}

#[test]
fn check_rotation_matrix_rejects_invalid_matrices() {
    let hypothesis = ModellingHypothesis::Tridimensional;
    assert!(check_rotation_matrix(&Matrix3::identity(), hypothesis).is_ok());

    let scaled = Matrix3::identity() * 2.0;
    assert!(matches!(
        check_rotation_matrix(&scaled, hypothesis),
        Err(ConfigurationError::InvalidRotationMatrix(_))
    ));

    let mut non_finite = Matrix3::identity();
    non_finite[(1, 2)] = f64::NAN;
    assert!(matches!(
        check_rotation_matrix(&non_finite, hypothesis),
        Err(ConfigurationError::InvalidRotationMatrix(_))
    ));

    // Rotations out of the plane are not allowed in two dimensions
    let about_x = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.5).into_inner();
    assert!(check_rotation_matrix(&about_x, hypothesis).is_ok());
    assert!(matches!(
        check_rotation_matrix(&about_x, ModellingHypothesis::PlaneStrain),
        Err(ConfigurationError::InvalidRotationMatrix(_))
    ));
    let about_z = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.5).into_inner();
    assert!(check_rotation_matrix(&about_z, ModellingHypothesis::PlaneStrain).is_ok());
}

proptest! {
    #[test]
    fn engineering_strains_round_trip(e in stensor_strategy(6)) {
        let mut converted = e.clone();
        strains_to_engineering(&mut converted);
        strains_from_engineering(&mut converted);
        prop_assert_matrix_eq!(DVector::from_vec(converted), DVector::from_vec(e), comp = abs, tol = 1e-12);
    }

    #[test]
    fn engineering_stresses_preserve_work(e in stensor_strategy(6), s in stensor_strategy(6)) {
        // Both conventions yield the same stress power
        let work = DVector::from_vec(e.clone()).dot(&DVector::from_vec(s.clone()));
        let (mut e_eng, mut s_eng) = (e, s);
        strains_to_engineering(&mut e_eng);
        stresses_to_engineering(&mut s_eng);
        let work_eng = DVector::from_vec(e_eng).dot(&DVector::from_vec(s_eng));
        prop_assert!((work - work_eng).abs() <= 1e-10 * (1.0 + work.abs()));
    }

    #[test]
    fn rotation_to_material_frame_and_back_is_identity(r in rotation_strategy(), v in stensor_strategy(6)) {
        let mut rotated = v.clone();
        rotate_to_material_frame(&r, &mut rotated);
        rotate_to_global_frame(&r, &mut rotated);
        prop_assert_matrix_eq!(DVector::from_vec(rotated), DVector::from_vec(v), comp = abs, tol = 1e-10);
    }

    #[test]
    fn stensor_rotation_matrix_is_orthogonal(r in rotation_strategy()) {
        let q = stensor_rotation_matrix(&r, 6);
        prop_assert_matrix_eq!(q.transpose() * &q, DMatrix::<f64>::identity(6, 6), comp = abs, tol = 1e-12);
    }

    #[test]
    fn tangent_operator_rotation_round_trip(r in rotation_strategy(), entries in stensor_strategy(36)) {
        let k = DMatrix::from_vec(6, 6, entries);
        let mut rotated = k.clone();
        rotate_tangent_operator_to_global_frame(&r, &mut rotated);
        rotate_tangent_operator_to_material_frame(&r, &mut rotated);
        prop_assert_matrix_eq!(rotated, k, comp = abs, tol = 1e-10);
    }
}

macro_rules! component_names_tests {
    ($($hypothesis:ident => [$($component:literal),*];)*) => {
        paste::paste! {
            $(
                #[test]
                fn [<component_names_ $hypothesis:snake>]() {
                    let hypothesis = ModellingHypothesis::$hypothesis;
                    let expected: Vec<&str> = vec![$($component),*];
                    let strains: Vec<String> = expected.iter().map(|c| format!("E{c}")).collect();
                    let stresses: Vec<String> = expected.iter().map(|c| format!("S{c}")).collect();
                    assert_eq!(hypothesis.driving_variable_components(), strains);
                    assert_eq!(hypothesis.thermodynamic_force_components(), stresses);
                    assert_eq!(hypothesis.stensor_size(), expected.len());
                    for (i, name) in strains.iter().enumerate() {
                        assert_eq!(hypothesis.driving_variable_component_position(name).unwrap(), i);
                    }
                    assert_eq!(hypothesis.name().parse::<ModellingHypothesis>().unwrap(), hypothesis);
                }
            )*
        }
    };
}

component_names_tests! {
    AxisymmetricalGeneralisedPlaneStrain => ["XX", "YY", "ZZ"];
    Axisymmetrical => ["XX", "YY", "ZZ", "XY"];
    PlaneStrain => ["XX", "YY", "ZZ", "XY"];
    PlaneStress => ["XX", "YY", "ZZ", "XY"];
    GeneralisedPlaneStrain => ["XX", "YY", "ZZ", "XY"];
    Tridimensional => ["XX", "YY", "ZZ", "XY", "XZ", "YZ"];
}

#[test]
fn invalid_component_names_are_rejected() {
    let hypothesis = ModellingHypothesis::PlaneStrain;
    assert!(matches!(
        hypothesis.driving_variable_component_position("EXZ"),
        Err(ConfigurationError::InvalidComponent { .. })
    ));
    assert!(hypothesis.thermodynamic_force_component_position("EXX").is_err());
    assert!(matches!(
        "PlaneStrainz".parse::<ModellingHypothesis>(),
        Err(ConfigurationError::UnknownHypothesis(_))
    ));
}
