//! Adapter for native routines following the legacy `umat` interface of the Cast3M solver.
//!
//! Such routines exchange strains and stresses in the engineering convention, store the tangent
//! operator column by column and read the rotation matrix in Fortran order. The first external
//! state variable is always the temperature.
use crate::behaviour::{
    all_finite, call_native, elastic_stiffness_from_material_properties, Behaviour, BehaviourDescription,
    StiffnessMatrixType,
};
use crate::convention::{
    rotation_matrix_to_fortran_order, strains_to_engineering, stresses_from_engineering, stresses_to_engineering,
    tangent_operator_from_engineering, tangent_operator_from_fortran_order,
};
use crate::error::{ConfigurationError, IntegrationFailure};
use crate::hypothesis::ModellingHypothesis;
use crate::state::{BehaviourWorkSpace, CurrentState};
use nalgebra::{DMatrix, DVector};
use std::os::raw::c_char;

/// Value of `kinc` on success.
pub const UMAT_SUCCESS: i32 = 1;

pub type UmatFunction = unsafe extern "C-unwind" fn(
    stress: *mut f64,
    statev: *mut f64,
    ddsdde: *mut f64,
    sse: *mut f64,
    spd: *mut f64,
    scd: *mut f64,
    rpl: *mut f64,
    ddsddt: *mut f64,
    drplde: *mut f64,
    drpldt: *mut f64,
    stran: *const f64,
    dstran: *const f64,
    time: *const f64,
    dtime: *const f64,
    temp: *const f64,
    dtemp: *const f64,
    predef: *const f64,
    dpred: *const f64,
    cmname: *const c_char,
    ndi: *const i32,
    nshr: *const i32,
    ntens: *const i32,
    nstatv: *const i32,
    props: *const f64,
    nprops: *const i32,
    coords: *const f64,
    drot: *const f64,
    pnewdt: *mut f64,
    celent: *const f64,
    dfgrd0: *const f64,
    dfgrd1: *const f64,
    noel: *const i32,
    npt: *const i32,
    layer: *const i32,
    kspt: *const i32,
    kstep: *const i32,
    kinc: *mut i32,
);

/// The `ndi` code identifying a modelling hypothesis.
pub fn hypothesis_code(hypothesis: ModellingHypothesis) -> i32 {
    use ModellingHypothesis::*;
    match hypothesis {
        AxisymmetricalGeneralisedPlaneStrain => 14,
        Axisymmetrical => 0,
        PlaneStress => -2,
        PlaneStrain => -1,
        GeneralisedPlaneStrain => -3,
        Tridimensional => 2,
    }
}

/// Number of shear components passed as `nshr`.
fn shear_components(hypothesis: ModellingHypothesis) -> i32 {
    match hypothesis.space_dimension() {
        1 => 0,
        2 => 1,
        _ => 3,
    }
}

struct Outputs {
    stress: Vec<f64>,
    statev: Vec<f64>,
    ddsdde: Vec<f64>,
    sse: f64,
    spd: f64,
    pnewdt: f64,
}

#[derive(Clone)]
pub struct UmatBehaviour {
    description: BehaviourDescription,
    function: UmatFunction,
}

impl std::fmt::Debug for UmatBehaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UmatBehaviour")
            .field("description", &self.description)
            .field("function", &(self.function as usize as *const ()))
            .finish()
    }
}

impl UmatBehaviour {
    /// The description must declare the temperature as its first external state variable.
    pub fn new(description: BehaviourDescription, function: UmatFunction) -> Result<Self, ConfigurationError> {
        if description.external_state_variables.first().map(String::as_str) != Some("Temperature") {
            return Err(ConfigurationError::InvalidBehaviour(format!(
                "the first external state variable of umat behaviour '{}' must be the temperature",
                description.name
            )));
        }
        Ok(Self { description, function })
    }

    /// Calls the routine. `stran` and `dstran` are mechanical strains in tensorial convention,
    /// `stress` the stress at the beginning of the step in tensorial convention.
    fn call(
        &self,
        state: &CurrentState,
        stran: &DVector<f64>,
        dstran: &DVector<f64>,
        stress: &DVector<f64>,
        dt: f64,
        stiffness_code: i32,
    ) -> Result<Outputs, IntegrationFailure> {
        let n = stran.len();
        let mut stran = stran.as_slice().to_vec();
        let mut dstran = dstran.as_slice().to_vec();
        strains_to_engineering(&mut stran);
        strains_to_engineering(&mut dstran);
        let mut outputs = Outputs {
            stress: stress.as_slice().to_vec(),
            statev: state.iv0.as_slice().to_vec(),
            ddsdde: vec![0.0; n * n],
            sse: state.se0,
            spd: state.de0,
            pnewdt: f64::INFINITY,
        };
        stresses_to_engineering(&mut outputs.stress);
        outputs.ddsdde[0] = f64::from(stiffness_code);

        // Explicit marshaling of the rotation matrix: the routine reads DROT(i, j) = r(j, i)
        let drot = rotation_matrix_to_fortran_order(&state.r);
        let ndi = hypothesis_code(self.description.hypothesis);
        let nshr = shear_components(self.description.hypothesis);
        let ntens = n as i32;
        let nstatv = state.iv0.len() as i32;
        let nprops = state.mprops1.len() as i32;
        let temp = state.esv0.get(0).copied().unwrap_or(0.0);
        let dtemp = state.desv.get(0).copied().unwrap_or(0.0);
        let predef: Vec<f64> = state.esv0.iter().skip(1).copied().collect();
        let dpred: Vec<f64> = state.desv.iter().skip(1).copied().collect();
        let time = [0.0, 0.0];
        let coords = [0.0; 3];
        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let celent = 0.0;
        let cmname = [0 as c_char; 16];
        let (noel, npt, layer, kspt, kstep) = (0i32, 0i32, 0i32, 0i32, 0i32);
        let (mut scd, mut rpl, mut drpldt) = (0.0, 0.0, 0.0);
        let mut ddsddt = vec![0.0; n];
        let mut drplde = vec![0.0; n];
        let mut kinc = UMAT_SUCCESS;

        let function = self.function;
        // SAFETY: every pointer refers to a live buffer of the size implied by ntens, nstatv
        // and nprops, and the buffers outlive the call.
        call_native(|| {
            unsafe {
                function(
                    outputs.stress.as_mut_ptr(),
                    outputs.statev.as_mut_ptr(),
                    outputs.ddsdde.as_mut_ptr(),
                    &mut outputs.sse,
                    &mut outputs.spd,
                    &mut scd,
                    &mut rpl,
                    ddsddt.as_mut_ptr(),
                    drplde.as_mut_ptr(),
                    &mut drpldt,
                    stran.as_ptr(),
                    dstran.as_ptr(),
                    time.as_ptr(),
                    &dt,
                    &temp,
                    &dtemp,
                    predef.as_ptr(),
                    dpred.as_ptr(),
                    cmname.as_ptr(),
                    &ndi,
                    &nshr,
                    &ntens,
                    &nstatv,
                    state.mprops1.as_ptr(),
                    &nprops,
                    coords.as_ptr(),
                    drot.as_ptr(),
                    &mut outputs.pnewdt,
                    &celent,
                    identity.as_ptr(),
                    identity.as_ptr(),
                    &noel,
                    &npt,
                    &layer,
                    &kspt,
                    &kstep,
                    &mut kinc,
                )
            };
            kinc
        })?;
        if kinc != UMAT_SUCCESS {
            let pnewdt = outputs.pnewdt;
            return Err(IntegrationFailure::Status {
                code: kinc,
                time_step_scaling: pnewdt.is_finite().then_some(pnewdt),
            });
        }
        stresses_from_engineering(&mut outputs.stress);
        Ok(outputs)
    }

    /// Reads the tangent operator back: column-major storage, engineering convention.
    fn tangent_operator(&self, n: usize, ddsdde: &[f64]) -> DMatrix<f64> {
        let mut k = tangent_operator_from_fortran_order(ddsdde, n);
        tangent_operator_from_engineering(&mut k);
        k
    }
}

impl Behaviour for UmatBehaviour {
    fn description(&self) -> &BehaviourDescription {
        &self.description
    }

    fn compute_prediction_operator(
        &self,
        workspace: &mut BehaviourWorkSpace,
        state: &CurrentState,
        smt: StiffnessMatrixType,
    ) -> Result<(), IntegrationFailure> {
        if smt == StiffnessMatrixType::ElasticFromMaterialProperties {
            workspace.kt = elastic_stiffness_from_material_properties(&self.description, state)?;
            return Ok(());
        }
        let stran = &state.e0 - &state.e_th0;
        let dstran = DVector::zeros(stran.len());
        let outputs = self.call(state, &stran, &dstran, &state.s0, 0.0, -smt.native_code())?;
        if !all_finite(&outputs.ddsdde) {
            return Err(IntegrationFailure::NonFinite);
        }
        workspace.kt = self.tangent_operator(stran.len(), &outputs.ddsdde);
        Ok(())
    }

    fn integrate(
        &self,
        state: &mut CurrentState,
        workspace: &mut BehaviourWorkSpace,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<f64, IntegrationFailure> {
        let stran = &state.e0 - &state.e_th0;
        let dstran = (&state.e1 - &state.e_th1) - &stran;
        let outputs = self.call(state, &stran, &dstran, &state.s0, dt, smt.native_code())?;
        let requested = smt.native_code() != 0;
        if !all_finite(outputs.stress.iter().chain(outputs.statev.iter()))
            || (requested && !all_finite(&outputs.ddsdde))
            || !outputs.sse.is_finite()
            || !outputs.spd.is_finite()
        {
            return Err(IntegrationFailure::NonFinite);
        }
        match smt {
            StiffnessMatrixType::NoStiffness => {}
            StiffnessMatrixType::ElasticFromMaterialProperties => {
                workspace.k = elastic_stiffness_from_material_properties(&self.description, state)?;
            }
            _ => workspace.k = self.tangent_operator(stran.len(), &outputs.ddsdde),
        }
        state.s1.copy_from_slice(&outputs.stress);
        state.iv1.copy_from_slice(&outputs.statev);
        state.se1 = outputs.sse;
        state.de1 = outputs.spd;
        Ok(outputs.pnewdt)
    }
}
