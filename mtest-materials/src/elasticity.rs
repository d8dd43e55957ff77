//! Linear elastic routines.
use crate::interface::GenericCall;
use crate::materials::{LameParameters, OrthotropicElasticParameters, YoungPoisson};
use mtest::behaviour::generic::{GenericBehaviourData, GENERIC_BEHAVIOUR_SUCCESS};
use mtest::behaviour::umat::UMAT_SUCCESS;
use mtest::nalgebra::{DMatrix, DVector, DVectorView};
use std::os::raw::c_char;

/// Status returned when the material properties are not usable.
pub const INVALID_MATERIAL_PROPERTIES: i32 = -1;

/// Integrates $\vec \sigma_1 = \vec \sigma_0 + \mathbb{C} : \Delta \vec \epsilon$ and stores the
/// stiffness if requested.
fn integrate_linear_elasticity(call: &mut GenericCall, k: &DMatrix<f64>) -> i32 {
    if call.is_prediction() {
        call.set_stiffness(k);
        return GENERIC_BEHAVIOUR_SUCCESS;
    }
    let n = call.size();
    let de = call.strain_increment();
    let s1 = DVectorView::from_slice(call.s0, n) + k * &de;
    call.s1.copy_from_slice(s1.as_slice());
    call.iv1.copy_from_slice(call.iv0);
    let e1 = DVectorView::from_slice(call.e1, n);
    *call.stored_energy = 0.5 * s1.dot(&e1);
    if call.is_stiffness_requested() {
        call.set_stiffness(k);
    }
    GENERIC_BEHAVIOUR_SUCCESS
}

/// Isotropic linear elasticity.
///
/// Material properties: `YoungModulus`, `PoissonRatio`.
///
/// # Safety
///
/// `data` must point to a valid data block, see [`GenericBehaviourData`].
pub unsafe extern "C-unwind" fn isotropic_elasticity(data: *mut GenericBehaviourData) -> i32 {
    let mut call = GenericCall::from_raw(data);
    let &[young, poisson, ..] = call.mprops else {
        return INVALID_MATERIAL_PROPERTIES;
    };
    let k = LameParameters::from(YoungPoisson { young, poisson }).stiffness(call.size());
    integrate_linear_elasticity(&mut call, &k)
}

/// Orthotropic linear elasticity, in the material frame.
///
/// Material properties: `YoungModulus1`, `YoungModulus2`, `YoungModulus3`, `PoissonRatio12`,
/// `PoissonRatio23`, `PoissonRatio13`, `ShearModulus12`, `ShearModulus23`, `ShearModulus13`.
///
/// # Safety
///
/// `data` must point to a valid data block, see [`GenericBehaviourData`].
pub unsafe extern "C-unwind" fn orthotropic_elasticity(data: *mut GenericBehaviourData) -> i32 {
    let mut call = GenericCall::from_raw(data);
    let Some(k) = OrthotropicElasticParameters::from_slice(call.mprops).and_then(|p| p.stiffness(call.size())) else {
        return INVALID_MATERIAL_PROPERTIES;
    };
    integrate_linear_elasticity(&mut call, &k)
}

/// Isotropic linear elasticity through the legacy interface, in engineering convention.
///
/// Material properties: `YoungModulus`, `PoissonRatio`. On entry, `ddsdde[0]` holds the
/// requested stiffness code; a negative code only asks for the prediction operator.
///
/// # Safety
///
/// Pointers must refer to buffers of the sizes implied by `ntens`, `nstatv` and `nprops`.
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C-unwind" fn umat_isotropic_elasticity(
    stress: *mut f64,
    _statev: *mut f64,
    ddsdde: *mut f64,
    sse: *mut f64,
    _spd: *mut f64,
    _scd: *mut f64,
    _rpl: *mut f64,
    _ddsddt: *mut f64,
    _drplde: *mut f64,
    _drpldt: *mut f64,
    stran: *const f64,
    dstran: *const f64,
    _time: *const f64,
    _dtime: *const f64,
    _temp: *const f64,
    _dtemp: *const f64,
    _predef: *const f64,
    _dpred: *const f64,
    _cmname: *const c_char,
    _ndi: *const i32,
    _nshr: *const i32,
    ntens: *const i32,
    _nstatv: *const i32,
    props: *const f64,
    nprops: *const i32,
    _coords: *const f64,
    _drot: *const f64,
    _pnewdt: *mut f64,
    _celent: *const f64,
    _dfgrd0: *const f64,
    _dfgrd1: *const f64,
    _noel: *const i32,
    _npt: *const i32,
    _layer: *const i32,
    _kspt: *const i32,
    _kstep: *const i32,
    kinc: *mut i32,
) {
    let n = *ntens as usize;
    if *nprops < 2 {
        *kinc = INVALID_MATERIAL_PROPERTIES;
        return;
    }
    let props = std::slice::from_raw_parts(props, 2);
    let ddsdde = std::slice::from_raw_parts_mut(ddsdde, n * n);
    let stress = std::slice::from_raw_parts_mut(stress, n);
    let code = ddsdde[0] as i32;
    let k = LameParameters::from(YoungPoisson {
        young: props[0],
        poisson: props[1],
    })
    .engineering_stiffness(n);
    if code >= 0 {
        let stran = DVector::from_column_slice(std::slice::from_raw_parts(stran, n));
        let dstran = DVector::from_column_slice(std::slice::from_raw_parts(dstran, n));
        let s1 = DVector::from_column_slice(stress) + &k * &dstran;
        stress.copy_from_slice(s1.as_slice());
        *sse = 0.5 * s1.dot(&(stran + dstran));
    }
    if code != 0 {
        // Column-major storage
        ddsdde.copy_from_slice(k.as_slice());
    }
    *kinc = UMAT_SUCCESS;
}
