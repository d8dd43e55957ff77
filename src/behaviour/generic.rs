//! Adapter for native routines following the generic behaviour interface.
//!
//! Routines of this interface work in the tensorial convention and in the material frame.
//! They receive a single [`GenericBehaviourData`] block and return `1` on success.
use crate::behaviour::{
    all_finite, call_native, elastic_stiffness_from_material_properties, Behaviour, BehaviourDescription,
    StiffnessMatrixType, Symmetry,
};
use crate::convention::{
    rotate_tangent_operator_to_global_frame, rotate_to_global_frame, rotate_to_material_frame,
};
use crate::error::IntegrationFailure;
use crate::state::{BehaviourWorkSpace, CurrentState};
use log::warn;
use nalgebra::{DMatrix, DVector};

/// Status returned by a routine on success.
pub const GENERIC_BEHAVIOUR_SUCCESS: i32 = 1;

/// The data block exchanged with a native routine.
///
/// Input buffers are only read by the routine. Output buffers (`thermodynamic_forces1`,
/// `internal_state_variables1`, `stiffness`, the energies and `rdt`) are scratch buffers owned
/// by the adapter. The stiffness matrix is stored row by row.
///
/// A negative `stiffness_type` asks for the prediction operator only: the routine must then
/// not integrate the behaviour.
#[repr(C)]
#[derive(Debug)]
pub struct GenericBehaviourData {
    pub dt: f64,
    pub stiffness_type: i32,
    pub ntens: u32,
    pub nprops: u32,
    pub nstatv: u32,
    pub nesv: u32,
    pub gradients0: *const f64,
    pub gradients1: *const f64,
    pub thermodynamic_forces0: *const f64,
    pub thermodynamic_forces1: *mut f64,
    pub material_properties: *const f64,
    pub internal_state_variables0: *const f64,
    pub internal_state_variables1: *mut f64,
    pub external_state_variables0: *const f64,
    pub external_state_variables_increments: *const f64,
    pub stiffness: *mut f64,
    pub stored_energy: *mut f64,
    pub dissipated_energy: *mut f64,
    /// Proposed time step scaling factor. Initialised to infinity.
    pub rdt: *mut f64,
}

pub type GenericBehaviourFunction = unsafe extern "C-unwind" fn(data: *mut GenericBehaviourData) -> i32;

/// Outputs of a native call, written to scratch buffers before being committed.
struct Outputs {
    s1: DVector<f64>,
    iv1: DVector<f64>,
    k: Vec<f64>,
    se: f64,
    de: f64,
    rdt: f64,
}

#[derive(Clone)]
pub struct GenericBehaviour {
    description: BehaviourDescription,
    function: GenericBehaviourFunction,
}

impl std::fmt::Debug for GenericBehaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericBehaviour")
            .field("description", &self.description)
            .field("function", &(self.function as usize as *const ()))
            .finish()
    }
}

impl GenericBehaviour {
    pub fn new(description: BehaviourDescription, function: GenericBehaviourFunction) -> Self {
        Self { description, function }
    }

    fn is_orthotropic(&self) -> bool {
        self.description.symmetry == Symmetry::Orthotropic
    }

    /// Calls the routine with inputs expressed in the material frame.
    ///
    /// `e0` and `e1` are mechanical strains, `s0` the stress at the beginning of the step.
    fn call(
        &self,
        state: &CurrentState,
        e0: &DVector<f64>,
        e1: &DVector<f64>,
        s0: &DVector<f64>,
        dt: f64,
        stiffness_type: i32,
    ) -> Result<Outputs, IntegrationFailure> {
        let n = e0.len();
        let mut outputs = Outputs {
            s1: s0.clone(),
            iv1: state.iv0.clone(),
            k: vec![0.0; n * n],
            se: state.se0,
            de: state.de0,
            rdt: f64::INFINITY,
        };
        let mut data = GenericBehaviourData {
            dt,
            stiffness_type,
            ntens: n as u32,
            nprops: state.mprops1.len() as u32,
            nstatv: state.iv0.len() as u32,
            nesv: state.esv0.len() as u32,
            gradients0: e0.as_ptr(),
            gradients1: e1.as_ptr(),
            thermodynamic_forces0: s0.as_ptr(),
            thermodynamic_forces1: outputs.s1.as_mut_ptr(),
            material_properties: state.mprops1.as_ptr(),
            internal_state_variables0: state.iv0.as_ptr(),
            internal_state_variables1: outputs.iv1.as_mut_ptr(),
            external_state_variables0: state.esv0.as_ptr(),
            external_state_variables_increments: state.desv.as_ptr(),
            stiffness: outputs.k.as_mut_ptr(),
            stored_energy: &mut outputs.se,
            dissipated_energy: &mut outputs.de,
            rdt: &mut outputs.rdt,
        };
        let function = self.function;
        // SAFETY: every pointer of the data block refers to a live buffer of the advertised
        // size, and the buffers outlive the call.
        let status = call_native(|| unsafe { function(&mut data) })?;
        if status != GENERIC_BEHAVIOUR_SUCCESS {
            let rdt = outputs.rdt;
            return Err(IntegrationFailure::Status {
                code: status,
                time_step_scaling: rdt.is_finite().then_some(rdt),
            });
        }
        Ok(outputs)
    }

    fn material_frame_inputs(&self, state: &CurrentState) -> (DVector<f64>, DVector<f64>, DVector<f64>) {
        let mut e0 = &state.e0 - &state.e_th0;
        let mut e1 = &state.e1 - &state.e_th1;
        let mut s0 = state.s0.clone();
        if self.is_orthotropic() {
            rotate_to_material_frame(&state.r, e0.as_mut_slice());
            rotate_to_material_frame(&state.r, e1.as_mut_slice());
            rotate_to_material_frame(&state.r, s0.as_mut_slice());
        }
        (e0, e1, s0)
    }

    fn tangent_operator_to_global_frame(&self, state: &CurrentState, k: &[f64]) -> DMatrix<f64> {
        let n = state.e0.len();
        let mut k = DMatrix::from_row_slice(n, n, k);
        if self.is_orthotropic() {
            rotate_tangent_operator_to_global_frame(&state.r, &mut k);
        }
        k
    }
}

impl Behaviour for GenericBehaviour {
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
        let (e0, _, s0) = self.material_frame_inputs(state);
        let outputs = self.call(state, &e0, &e0, &s0, 0.0, -smt.native_code())?;
        if !all_finite(&outputs.k) {
            warn!("Prediction operator of behaviour '{}' is not finite", self.description.name);
            return Err(IntegrationFailure::NonFinite);
        }
        workspace.kt = self.tangent_operator_to_global_frame(state, &outputs.k);
        Ok(())
    }

    fn integrate(
        &self,
        state: &mut CurrentState,
        workspace: &mut BehaviourWorkSpace,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<f64, IntegrationFailure> {
        let (e0, e1, s0) = self.material_frame_inputs(state);
        let mut outputs = self.call(state, &e0, &e1, &s0, dt, smt.native_code())?;
        let requested = smt.native_code() != 0;
        if !all_finite(outputs.s1.iter().chain(outputs.iv1.iter()))
            || (requested && !all_finite(&outputs.k))
            || !outputs.se.is_finite()
            || !outputs.de.is_finite()
        {
            return Err(IntegrationFailure::NonFinite);
        }
        if self.is_orthotropic() {
            rotate_to_global_frame(&state.r, outputs.s1.as_mut_slice());
        }
        match smt {
            StiffnessMatrixType::NoStiffness => {}
            StiffnessMatrixType::ElasticFromMaterialProperties => {
                workspace.k = elastic_stiffness_from_material_properties(&self.description, state)?;
            }
            _ => workspace.k = self.tangent_operator_to_global_frame(state, &outputs.k),
        }
        state.s1.copy_from(&outputs.s1);
        state.iv1.copy_from(&outputs.iv1);
        state.se1 = outputs.se;
        state.de1 = outputs.de;
        Ok(outputs.rdt)
    }
}
