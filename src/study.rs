//! The interface between the nonlinear solver and the physical system it solves.
use crate::behaviour::StiffnessMatrixType;
use crate::error::IntegrationFailure;
use crate::state::{CheckFailure, StudyCurrentState, TrajectoryPoint};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Outcome of a convergence test.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ConvergenceCheck {
    pub converged: bool,
    /// Norm of the increment of the unknowns.
    pub increment_norm: f64,
    /// Norm of the residual.
    pub residual_norm: f64,
}

/// A physical system driven by the nonlinear solver.
///
/// The solver owns the control flow: it calls [`Study::prepare`] once per time step, then
/// assembles and solves until [`Study::check_convergence`] succeeds, and finally calls
/// [`Study::post_convergence`]. Failures are reported to the solver, which decides whether to
/// retry with a smaller time step; a study never retries on its own.
#[allow(clippy::too_many_arguments)]
pub trait Study {
    fn number_of_unknowns(&self) -> usize;

    /// Activates or deactivates constraints for the events occurring at time `t`.
    fn treat_events(&mut self, t: f64, t_eps: f64);

    /// Evaluates material properties and external state variables at `t` and `t + dt`.
    fn prepare(&self, scs: &mut StudyCurrentState, t: f64, dt: f64);

    /// Extrapolates the unknowns from the two last converged steps, if any.
    fn make_linear_prediction(&self, scs: &mut StudyCurrentState, dt: f64);

    /// Assembles the prediction operator and the residual at the beginning of the time step.
    fn compute_prediction_stiffness_and_residual(
        &self,
        scs: &mut StudyCurrentState,
        k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        t: f64,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<(), IntegrationFailure>;

    /// Assembles the stiffness matrix and the residual for the current estimate `u1`.
    ///
    /// Returns the time step scaling factor proposed by the behaviours.
    fn compute_stiffness_matrix_and_residual(
        &self,
        scs: &mut StudyCurrentState,
        k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        t: f64,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<f64, IntegrationFailure>;

    fn check_convergence(
        &self,
        scs: &StudyCurrentState,
        du: &DVector<f64>,
        r: &DVector<f64>,
        ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> ConvergenceCheck;

    /// Describes every criterion which is not satisfied.
    fn failed_criteria_diagnostic(
        &self,
        scs: &StudyCurrentState,
        du: &DVector<f64>,
        r: &DVector<f64>,
        ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> Vec<String>;

    /// Norm of an increment of the unknowns, used to estimate the order of convergence.
    fn error_norm(&self, du: &DVector<f64>) -> f64;

    /// Commits the converged state of the time step `[t, t + dt]`.
    ///
    /// Returns `false`, and does nothing, if the state was already committed.
    fn post_convergence(&self, scs: &mut StudyCurrentState, t: f64, dt: f64) -> bool;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyStatus {
    Success,
    /// The iteration budget was exhausted on every sub-step.
    NonConvergence,
    /// The behaviour failed, the stiffness matrix was singular or the time step became too small.
    Divergence,
}

/// Outcome of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyReport {
    pub status: StudyStatus,
    /// Empty on success.
    pub diagnostic: String,
    /// The initial state followed by every converged step.
    pub trajectory: Vec<TrajectoryPoint>,
    /// Number of converged steps.
    pub periods: usize,
    pub iterations: usize,
    pub sub_steps: usize,
    pub check_failures: Vec<CheckFailure>,
    pub tangent_operator_mismatches: usize,
}

impl StudyReport {
    pub fn is_success(&self) -> bool {
        self.status == StudyStatus::Success
    }

    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.trajectory.last()
    }
}
