//! Current states of a study and of its sub-structures.
use crate::behaviour::Behaviour;
use nalgebra::{DMatrix, DVector, Matrix3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// State of one integration point.
///
/// Values with suffix `0` are committed values at the beginning of the time step, values with
/// suffix `1` are trial values at the end of the time step and values with suffix `_1` are
/// the values at the beginning of the previous time step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub s_1: DVector<f64>,
    pub s0: DVector<f64>,
    pub s1: DVector<f64>,
    pub e0: DVector<f64>,
    pub e1: DVector<f64>,
    /// Thermal strains at the beginning and at the end of the time step.
    pub e_th0: DVector<f64>,
    pub e_th1: DVector<f64>,
    pub mprops0: DVector<f64>,
    pub mprops1: DVector<f64>,
    pub iv_1: DVector<f64>,
    pub iv0: DVector<f64>,
    pub iv1: DVector<f64>,
    pub esv0: DVector<f64>,
    pub desv: DVector<f64>,
    /// Stored and dissipated energies.
    pub se0: f64,
    pub se1: f64,
    pub de0: f64,
    pub de1: f64,
    /// Rotation matrix from the global frame to the material frame.
    pub r: Matrix3<f64>,
    pub t_ref: f64,
}

impl CurrentState {
    pub fn new(
        driving_variables_size: usize,
        thermodynamic_forces_size: usize,
        material_properties_size: usize,
        internal_state_variables_size: usize,
        external_state_variables_size: usize,
    ) -> Self {
        let zeros = |n: usize| DVector::<f64>::zeros(n);
        Self {
            s_1: zeros(thermodynamic_forces_size),
            s0: zeros(thermodynamic_forces_size),
            s1: zeros(thermodynamic_forces_size),
            e0: zeros(driving_variables_size),
            e1: zeros(driving_variables_size),
            e_th0: zeros(driving_variables_size),
            e_th1: zeros(driving_variables_size),
            mprops0: zeros(material_properties_size),
            mprops1: zeros(material_properties_size),
            iv_1: zeros(internal_state_variables_size),
            iv0: zeros(internal_state_variables_size),
            iv1: zeros(internal_state_variables_size),
            esv0: zeros(external_state_variables_size),
            desv: zeros(external_state_variables_size),
            se0: 0.0,
            se1: 0.0,
            de0: 0.0,
            de1: 0.0,
            r: Matrix3::identity(),
            t_ref: 293.15,
        }
    }

    /// Freezes the trial values as the new beginning of step values.
    pub fn commit(&mut self) {
        self.s_1.copy_from(&self.s0);
        self.s0.copy_from(&self.s1);
        self.e0.copy_from(&self.e1);
        self.e_th0.copy_from(&self.e_th1);
        self.mprops0.copy_from(&self.mprops1);
        self.iv_1.copy_from(&self.iv0);
        self.iv0.copy_from(&self.iv1);
        self.se0 = self.se1;
        self.de0 = self.de1;
    }

    /// Restores the trial values from the last committed values.
    pub fn revert(&mut self) {
        self.s1.copy_from(&self.s0);
        self.e1.copy_from(&self.e0);
        self.e_th1.copy_from(&self.e_th0);
        self.mprops1.copy_from(&self.mprops0);
        self.iv1.copy_from(&self.iv0);
        self.se1 = self.se0;
        self.de1 = self.de0;
    }
}

/// Scratch storage used by a behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourWorkSpace {
    /// Tangent operator computed by the last integration.
    pub k: DMatrix<f64>,
    /// Prediction operator.
    pub kt: DMatrix<f64>,
    /// Numerical approximation of the tangent operator.
    pub nk: DMatrix<f64>,
}

impl BehaviourWorkSpace {
    pub fn new(driving_variables_size: usize, thermodynamic_forces_size: usize) -> Self {
        let (m, n) = (thermodynamic_forces_size, driving_variables_size);
        Self {
            k: DMatrix::zeros(m, n),
            kt: DMatrix::zeros(m, n),
            nk: DMatrix::zeros(m, n),
        }
    }
}

/// State of a sub-structure: its behaviour and the states of its integration points.
#[derive(Clone)]
pub struct StructureCurrentState {
    pub behaviour: Rc<dyn Behaviour>,
    pub istates: Vec<CurrentState>,
    pub workspace: BehaviourWorkSpace,
}

impl fmt::Debug for StructureCurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructureCurrentState")
            .field("behaviour", &self.behaviour.description().name)
            .field("istates", &self.istates)
            .finish_non_exhaustive()
    }
}

impl StructureCurrentState {
    /// Allocates the states of `n` integration points.
    pub fn new(behaviour: Rc<dyn Behaviour>, n: usize) -> Self {
        let (state, workspace) = behaviour.allocate();
        Self {
            istates: vec![state; n],
            workspace,
            behaviour,
        }
    }

    pub fn commit(&mut self) {
        self.istates.iter_mut().for_each(CurrentState::commit);
    }

    pub fn revert(&mut self) {
        self.istates.iter_mut().for_each(CurrentState::revert);
    }
}

/// Stage of a study in its life cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyStage {
    Initialized,
    Prepared,
    Predicting,
    Iterating,
    Converged,
    SubStepping,
    Diverged,
    Finished,
}

/// A converged step, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub time: f64,
    pub period: usize,
    pub driving_variables: DVector<f64>,
    pub thermodynamic_forces: DVector<f64>,
    pub internal_state_variables: DVector<f64>,
    pub stored_energy: f64,
    pub dissipated_energy: f64,
}

impl TrajectoryPoint {
    pub fn from_state(time: f64, period: usize, state: &CurrentState) -> Self {
        Self {
            time,
            period,
            driving_variables: state.e0.clone(),
            thermodynamic_forces: state.s0.clone(),
            internal_state_variables: state.iv0.clone(),
            stored_energy: state.se0,
            dissipated_energy: state.de0,
        }
    }
}

/// A failed comparison of a computed value against a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub time: f64,
    pub variable: String,
    pub value: f64,
    pub reference: f64,
    pub tolerance: f64,
}

/// State of a whole study.
///
/// The unknowns `u_1`, `u0`, `u1` gather the driving variables of all sub-structures followed
/// by the Lagrange multipliers of the constraints.
#[derive(Debug, Clone)]
pub struct StudyCurrentState {
    pub structures: Vec<(String, StructureCurrentState)>,
    pub u_1: DVector<f64>,
    pub u0: DVector<f64>,
    pub u1: DVector<f64>,
    /// Value of `u1` before the last acceleration.
    pub u10: DVector<f64>,
    /// Time increment of the last converged step.
    pub dt_1: f64,
    /// Index of the current step, starting at 1.
    pub period: usize,
    pub iterations: usize,
    pub sub_steps: usize,
    pub stage: StudyStage,
    pub trajectory: Vec<TrajectoryPoint>,
    pub check_failures: Vec<CheckFailure>,
    pub tangent_operator_mismatches: usize,
    parameters: HashMap<String, f64>,
}

impl StudyCurrentState {
    pub fn new(number_of_unknowns: usize) -> Self {
        let zeros = |n: usize| DVector::<f64>::zeros(n);
        Self {
            structures: Vec::new(),
            u_1: zeros(number_of_unknowns),
            u0: zeros(number_of_unknowns),
            u1: zeros(number_of_unknowns),
            u10: zeros(number_of_unknowns),
            dt_1: 0.0,
            period: 1,
            iterations: 0,
            sub_steps: 0,
            stage: StudyStage::Initialized,
            trajectory: Vec::new(),
            check_failures: Vec::new(),
            tangent_operator_mismatches: 0,
            parameters: HashMap::new(),
        }
    }

    pub fn number_of_unknowns(&self) -> usize {
        self.u0.len()
    }

    pub fn structure(&self, name: &str) -> Option<&StructureCurrentState> {
        self.structures.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn structure_mut(&mut self, name: &str) -> Option<&mut StructureCurrentState> {
        self.structures
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: f64) {
        self.parameters.insert(name.into(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    /// Commits the trial values after a converged time step of length `dt`.
    pub fn update(&mut self, dt: f64) {
        self.u_1.copy_from(&self.u0);
        self.u0.copy_from(&self.u1);
        self.dt_1 = dt;
        self.period += 1;
        for (_, structure) in &mut self.structures {
            structure.commit();
        }
    }

    /// Restores the trial values from the last committed state.
    pub fn revert(&mut self) {
        self.u1.copy_from(&self.u0);
        self.u10.copy_from(&self.u0);
        for (_, structure) in &mut self.structures {
            structure.revert();
        }
        self.stage = StudyStage::SubStepping;
    }
}
