//! A single material point driven by imposed strains and stresses.
use crate::behaviour::{Behaviour, BehaviourLoader, BehaviourRegistry, StiffnessMatrixType, Symmetry};
use crate::constraint::{Constraint, ImposedDrivingVariable, ImposedThermodynamicForce};
use crate::convention::{check_rotation_matrix, shear_factor};
use crate::error::{ConfigurationError, IntegrationFailure};
use crate::evolution::{ConstantEvolution, Evolution, EvolutionManager};
use crate::hypothesis::ModellingHypothesis;
use crate::options::SolverOptions;
use crate::solver::NonlinearSolver;
use crate::state::{
    BehaviourWorkSpace, CheckFailure, CurrentState, StructureCurrentState, StudyCurrentState, StudyStage,
    TrajectoryPoint,
};
use crate::study::{ConvergenceCheck, Study, StudyReport};
use log::{debug, info, warn};
use mtest_optimize::acceleration::{AccelerationAlgorithm, AccelerationAlgorithmFactory};
use mtest_optimize::calculus::{max_abs_difference, try_approximate_jacobian_fd};
use nalgebra::{DMatrix, DVector, Matrix3};
use std::rc::Rc;

/// Name of the study parameter holding the Lagrange multipliers normalisation factor.
pub const NORMALISATION_FACTOR: &str = "LagrangeMultipliersNormalisationFactor";

pub const DEFAULT_TANGENT_OPERATOR_PERTURBATION: f64 = 1e-7;
pub const DEFAULT_TANGENT_OPERATOR_COMPARISON_CRITERION: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckedVariable {
    DrivingVariable(usize),
    ThermodynamicForce(usize),
    InternalStateVariable(usize),
}

/// A comparison of a computed value against a reference evolution at every converged step.
#[derive(Debug, Clone)]
struct ReferenceCheck {
    name: String,
    variable: CheckedVariable,
    reference: Rc<dyn Evolution>,
    tolerance: f64,
}

impl ReferenceCheck {
    fn value(&self, state: &CurrentState) -> f64 {
        match self.variable {
            CheckedVariable::DrivingVariable(c) => state.e0[c] / shear_factor(c),
            CheckedVariable::ThermodynamicForce(c) => state.s0[c] / shear_factor(c),
            CheckedVariable::InternalStateVariable(i) => state.iv0[i],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TangentOperatorComparison {
    perturbation: f64,
    criterion: f64,
}

#[derive(Debug, Clone)]
struct ThermalExpansion {
    alpha: Rc<dyn Evolution>,
    reference_temperature: f64,
}

#[derive(Debug, Clone)]
struct Event {
    time: f64,
    name: String,
    fired: bool,
}

/// A study of one integration point of one behaviour.
///
/// The unknowns are the driving variables of the point. Constraints impose some components of
/// the driving variables or of the thermodynamic forces; the remaining thermodynamic forces
/// are driven to zero.
#[derive(Debug, Default)]
pub struct PointStudy {
    behaviour: Option<Rc<dyn Behaviour>>,
    evolutions: EvolutionManager,
    constraints: Vec<Box<dyn Constraint>>,
    times: Vec<f64>,
    options: SolverOptions,
    rotation: Option<Matrix3<f64>>,
    initial_driving_variables: Option<DVector<f64>>,
    initial_thermodynamic_forces: Option<DVector<f64>>,
    initial_internal_state_variables: Option<DVector<f64>>,
    acceleration: Option<Box<dyn AccelerationAlgorithm>>,
    references: Vec<ReferenceCheck>,
    tangent_operator_comparison: Option<TangentOperatorComparison>,
    thermal_expansion: Option<ThermalExpansion>,
    events: Vec<Event>,
    // Resolved by `complete_initialisation`
    material_properties: Vec<Rc<dyn Evolution>>,
    external_state_variables: Vec<Rc<dyn Evolution>>,
    temperature: Option<Rc<dyn Evolution>>,
    // Driving variables and Lagrange multipliers
    unknowns: usize,
    state: Option<StudyCurrentState>,
}

impl PointStudy {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_not_initialised(&self) -> Result<(), ConfigurationError> {
        if self.state.is_some() {
            return Err(ConfigurationError::InvalidState(
                "the study is already initialised".to_string(),
            ));
        }
        Ok(())
    }

    pub fn behaviour(&self) -> Result<&Rc<dyn Behaviour>, ConfigurationError> {
        self.behaviour
            .as_ref()
            .ok_or(ConfigurationError::MissingBehaviour)
    }

    pub fn set_behaviour(&mut self, behaviour: Rc<dyn Behaviour>) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        if self.behaviour.is_some() {
            return Err(ConfigurationError::AlreadyDefined("behaviour".to_string()));
        }
        info!(
            "Behaviour '{}' ({} hypothesis)",
            behaviour.description().name,
            behaviour.hypothesis()
        );
        self.behaviour = Some(behaviour);
        Ok(())
    }

    /// Loads the behaviour through `registry` and `loader`.
    pub fn load_behaviour(
        &mut self,
        registry: &BehaviourRegistry,
        loader: &dyn BehaviourLoader,
        interface: &str,
        library: &str,
        function: &str,
        hypothesis: ModellingHypothesis,
    ) -> eyre::Result<()> {
        let behaviour = registry.load(interface, loader, library, function, hypothesis)?;
        self.set_behaviour(behaviour)?;
        Ok(())
    }

    pub fn hypothesis(&self) -> Result<ModellingHypothesis, ConfigurationError> {
        Ok(self.behaviour()?.hypothesis())
    }

    pub fn evolutions(&self) -> &EvolutionManager {
        &self.evolutions
    }

    /// Declares the evolution of a material property.
    pub fn set_material_property(
        &mut self,
        name: impl Into<String>,
        evolution: Rc<dyn Evolution>,
    ) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        self.evolutions.add(name, evolution)
    }

    /// Declares the evolution of an external state variable.
    pub fn set_external_state_variable(
        &mut self,
        name: impl Into<String>,
        evolution: Rc<dyn Evolution>,
    ) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        self.evolutions.add(name, evolution)
    }

    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let c = constraint.component_position();
        if let Some(other) = self
            .constraints
            .iter()
            .find(|other| other.component_position() == c)
        {
            return Err(ConfigurationError::ConflictingConstraint(format!(
                "{} (already bound by '{}')",
                constraint.component_name(),
                other.component_name()
            )));
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    /// Imposes a component of the driving variables, e.g. `EXX`.
    pub fn impose_driving_variable(
        &mut self,
        component: &str,
        evolution: Rc<dyn Evolution>,
    ) -> Result<(), ConfigurationError> {
        let constraint = ImposedDrivingVariable::new(self.behaviour()?.as_ref(), component, evolution)?;
        self.add_constraint(Box::new(constraint))
    }

    /// Imposes a component of the thermodynamic forces, e.g. `SXX`.
    pub fn impose_thermodynamic_force(
        &mut self,
        component: &str,
        evolution: Rc<dyn Evolution>,
    ) -> Result<(), ConfigurationError> {
        let constraint = ImposedThermodynamicForce::new(self.behaviour()?.as_ref(), component, evolution)?;
        self.add_constraint(Box::new(constraint))
    }

    pub fn impose_strain(&mut self, component: &str, evolution: Rc<dyn Evolution>) -> Result<(), ConfigurationError> {
        self.impose_driving_variable(component, evolution)
    }

    pub fn impose_stress(&mut self, component: &str, evolution: Rc<dyn Evolution>) -> Result<(), ConfigurationError> {
        self.impose_thermodynamic_force(component, evolution)
    }

    /// Sets the boundaries of the periods. Times must be strictly increasing.
    pub fn set_times(&mut self, times: impl IntoIterator<Item = f64>) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        if !self.times.is_empty() {
            return Err(ConfigurationError::AlreadyDefined("times".to_string()));
        }
        let times: Vec<f64> = times.into_iter().collect();
        if times.len() < 2 {
            return Err(ConfigurationError::InvalidTimes("at least two times are required".to_string()));
        }
        if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ConfigurationError::InvalidTimes(
                "times must be finite and strictly increasing".to_string(),
            ));
        }
        self.times = times;
        Ok(())
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SolverOptions {
        &mut self.options
    }

    pub fn set_options(&mut self, options: SolverOptions) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        options.validate()?;
        self.options = options;
        Ok(())
    }

    /// Sets the rotation matrix from the global frame to the material frame.
    ///
    /// Only orthotropic behaviours accept a rotation matrix.
    pub fn set_rotation_matrix(&mut self, r: Matrix3<f64>) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let behaviour = self.behaviour()?;
        if behaviour.symmetry() != Symmetry::Orthotropic {
            return Err(ConfigurationError::InvalidRotationMatrix(format!(
                "behaviour '{}' is not orthotropic",
                behaviour.description().name
            )));
        }
        check_rotation_matrix(&r, behaviour.hypothesis())?;
        if self.rotation.is_some() {
            return Err(ConfigurationError::AlreadyDefined("rotation matrix".to_string()));
        }
        self.rotation = Some(r);
        Ok(())
    }

    fn check_initial_values(
        slot: &Option<DVector<f64>>,
        what: &str,
        expected: usize,
        values: &[f64],
    ) -> Result<(), ConfigurationError> {
        if slot.is_some() {
            return Err(ConfigurationError::AlreadyDefined(what.to_string()));
        }
        if values.len() != expected {
            return Err(ConfigurationError::InvalidOption {
                option: what.to_string(),
                reason: format!("expected {expected} values, got {}", values.len()),
            });
        }
        Ok(())
    }

    /// Sets the initial driving variables, in the tensorial convention.
    pub fn set_initial_driving_variables(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let n = self.behaviour()?.driving_variables_size();
        Self::check_initial_values(&self.initial_driving_variables, "initial driving variables", n, values)?;
        self.initial_driving_variables = Some(DVector::from_column_slice(values));
        Ok(())
    }

    /// Sets the initial thermodynamic forces, in the tensorial convention.
    pub fn set_initial_thermodynamic_forces(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let n = self.behaviour()?.thermodynamic_forces_size();
        Self::check_initial_values(
            &self.initial_thermodynamic_forces,
            "initial thermodynamic forces",
            n,
            values,
        )?;
        self.initial_thermodynamic_forces = Some(DVector::from_column_slice(values));
        Ok(())
    }

    pub fn set_initial_internal_state_variables(&mut self, values: &[f64]) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let n = self.behaviour()?.internal_state_variables_size();
        Self::check_initial_values(
            &self.initial_internal_state_variables,
            "initial internal state variables",
            n,
            values,
        )?;
        self.initial_internal_state_variables = Some(DVector::from_column_slice(values));
        Ok(())
    }

    pub fn set_acceleration_algorithm(
        &mut self,
        name: &str,
        factory: &AccelerationAlgorithmFactory,
    ) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        if self.acceleration.is_some() {
            return Err(ConfigurationError::AlreadyDefined("acceleration algorithm".to_string()));
        }
        self.acceleration = Some(factory.create(name)?);
        Ok(())
    }

    pub fn set_acceleration_algorithm_parameter(
        &mut self,
        parameter: &str,
        value: &str,
    ) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let acceleration = self.acceleration.as_mut().ok_or_else(|| {
            ConfigurationError::InvalidState("no acceleration algorithm defined".to_string())
        })?;
        acceleration.set_parameter(parameter, value)?;
        Ok(())
    }

    pub fn acceleration_algorithm(&self) -> Option<&dyn AccelerationAlgorithm> {
        self.acceleration.as_deref()
    }

    /// Compares `variable` against `reference` after every converged step.
    ///
    /// `variable` is a driving variable or thermodynamic force component (`EXX`, `SXY`), or an
    /// expanded internal state variable name. Strains and stresses are compared by their
    /// physical components, without the shear scaling of the tensorial convention.
    pub fn add_reference(
        &mut self,
        variable: &str,
        reference: Rc<dyn Evolution>,
        tolerance: f64,
    ) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let behaviour = self.behaviour()?;
        let hypothesis = behaviour.hypothesis();
        let checked = if let Ok(c) = hypothesis.driving_variable_component_position(variable) {
            CheckedVariable::DrivingVariable(c)
        } else if let Ok(c) = hypothesis.thermodynamic_force_component_position(variable) {
            CheckedVariable::ThermodynamicForce(c)
        } else if let Some(i) = behaviour
            .description()
            .expanded_internal_state_variable_names()
            .iter()
            .position(|n| n == variable)
        {
            CheckedVariable::InternalStateVariable(i)
        } else {
            return Err(ConfigurationError::InvalidComponent {
                name: variable.to_string(),
                hypothesis,
            });
        };
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ConfigurationError::InvalidOption {
                option: format!("tolerance of the reference for '{variable}'"),
                reason: format!("{tolerance} is not strictly positive"),
            });
        }
        self.references.push(ReferenceCheck {
            name: variable.to_string(),
            variable: checked,
            reference,
            tolerance,
        });
        Ok(())
    }

    /// Compares the consistent tangent operator against a centred finite difference
    /// approximation at every iteration.
    ///
    /// A comparison fails when the largest difference exceeds `criterion` times the largest
    /// component of the tangent operator. Failures are logged and counted, they do not stop
    /// the study.
    pub fn set_tangent_operator_comparison(
        &mut self,
        perturbation: f64,
        criterion: f64,
    ) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        for (option, value) in [("perturbation", perturbation), ("criterion", criterion)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::InvalidOption {
                    option: format!("tangent operator comparison {option}"),
                    reason: format!("{value} is not strictly positive"),
                });
            }
        }
        if self.tangent_operator_comparison.is_some() {
            return Err(ConfigurationError::AlreadyDefined("tangent operator comparison".to_string()));
        }
        self.tangent_operator_comparison = Some(TangentOperatorComparison { perturbation, criterion });
        Ok(())
    }

    /// Adds the thermal strain $\alpha(T) (T - T_{ref})$ to the diagonal components.
    ///
    /// The temperature is given by the `Temperature` evolution.
    pub fn set_thermal_expansion(
        &mut self,
        alpha: Rc<dyn Evolution>,
        reference_temperature: f64,
    ) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        if self.thermal_expansion.is_some() {
            return Err(ConfigurationError::AlreadyDefined("thermal expansion".to_string()));
        }
        self.thermal_expansion = Some(ThermalExpansion {
            alpha,
            reference_temperature,
        });
        Ok(())
    }

    /// Declares an event at time `time`. Constraints listening to it are toggled at the
    /// beginning of the first time step starting at or after `time`.
    pub fn add_event(&mut self, time: f64, name: impl Into<String>) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        if !time.is_finite() {
            return Err(ConfigurationError::InvalidTimes(format!("invalid event time {time}")));
        }
        self.events.push(Event {
            time,
            name: name.into(),
            fired: false,
        });
        Ok(())
    }

    pub fn current_state(&self) -> Option<&StudyCurrentState> {
        self.state.as_ref()
    }

    /// Resolves defaults and checks the study is complete.
    ///
    /// Called by [`PointStudy::execute`] if needed.
    pub fn complete_initialisation(&mut self) -> Result<(), ConfigurationError> {
        self.check_not_initialised()?;
        let behaviour = self.behaviour()?.clone();
        if self.times.is_empty() {
            return Err(ConfigurationError::InvalidTimes("no times defined".to_string()));
        }
        let hypothesis = behaviour.hypothesis();
        let axial_strain_free = !self.constraints.iter().any(|c| c.component_position() == 2);
        if hypothesis == ModellingHypothesis::PlaneStrain && axial_strain_free {
            debug!("Adding EZZ = 0 for the plane strain hypothesis");
            let constraint =
                ImposedDrivingVariable::new(behaviour.as_ref(), "EZZ", Rc::new(ConstantEvolution::new(0.0)))?;
            self.constraints.push(Box::new(constraint));
        }

        self.options.validate()?;
        self.options
            .resolve_stiffness_matrix_type(behaviour.default_stiffness_matrix_type());
        self.options.log_summary();

        behaviour.set_optional_material_properties_default_values(&mut self.evolutions)?;
        let resolve = |evolutions: &EvolutionManager, name: &String| {
            evolutions
                .get(name)
                .map_err(|_| ConfigurationError::MissingEvolution(name.clone()))
        };
        self.material_properties = behaviour
            .material_properties()
            .iter()
            .map(|name| resolve(&self.evolutions, name))
            .collect::<Result<_, _>>()?;
        self.external_state_variables = behaviour
            .external_state_variables()
            .iter()
            .map(|name| resolve(&self.evolutions, name))
            .collect::<Result<_, _>>()?;
        if self.thermal_expansion.is_some() {
            self.temperature = Some(resolve(&self.evolutions, &"Temperature".to_string())?);
        }

        let nd = behaviour.driving_variables_size();
        let n = nd
            + self
                .constraints
                .iter()
                .map(|c| c.number_of_lagrange_multipliers())
                .sum::<usize>();
        if let Some(acceleration) = self.acceleration.as_mut() {
            acceleration.initialize(n);
            info!("Acceleration algorithm: {}", acceleration.name());
        }

        let mut structure = StructureCurrentState::new(behaviour.clone(), 1);
        let state = &mut structure.istates[0];
        state.r = self.rotation.unwrap_or_else(Matrix3::identity);
        if let Some(thermal_expansion) = &self.thermal_expansion {
            state.t_ref = thermal_expansion.reference_temperature;
        }
        if let Some(e) = &self.initial_driving_variables {
            state.e0.copy_from(e);
            state.e1.copy_from(e);
        }
        if let Some(s) = &self.initial_thermodynamic_forces {
            state.s_1.copy_from(s);
            state.s0.copy_from(s);
            state.s1.copy_from(s);
        }
        if let Some(iv) = &self.initial_internal_state_variables {
            state.iv_1.copy_from(iv);
            state.iv0.copy_from(iv);
            state.iv1.copy_from(iv);
        }

        self.unknowns = n;
        let mut scs = StudyCurrentState::new(n);
        for u in [&mut scs.u_1, &mut scs.u0, &mut scs.u1, &mut scs.u10] {
            u.rows_mut(0, nd).copy_from(&state.e0);
        }
        scs.trajectory
            .push(TrajectoryPoint::from_state(self.times[0], 0, state));
        scs.structures.push((String::new(), structure));
        self.state = Some(scs);
        Ok(())
    }

    /// Runs the study over all periods.
    ///
    /// Configuration errors are returned as errors. Failures of the resolution itself are
    /// reported through the status of the returned report.
    pub fn execute(&mut self) -> Result<StudyReport, ConfigurationError> {
        if self.state.is_none() {
            self.complete_initialisation()?;
        }
        let mut scs = self
            .state
            .take()
            .ok_or_else(|| ConfigurationError::InvalidState("the study is not initialised".to_string()))?;
        if scs.stage != StudyStage::Initialized {
            self.state = Some(scs);
            return Err(ConfigurationError::InvalidState(
                "the study was already executed".to_string(),
            ));
        }
        let options = self.options.clone();
        let times = self.times.clone();
        let mut acceleration = self.acceleration.take();
        let outcome = {
            let acceleration = acceleration
                .as_mut()
                .map(|a| &mut **a as &mut dyn AccelerationAlgorithm);
            let mut solver = NonlinearSolver::new(&options, acceleration);
            solver.execute(self, &mut scs, &times)
        };
        self.acceleration = acceleration;
        if outcome.diagnostic.is_empty() {
            info!("Study completed in {} iterations", scs.iterations);
        } else {
            warn!("Study failed: {}", outcome.diagnostic);
        }
        let report = StudyReport {
            status: outcome.status,
            diagnostic: outcome.diagnostic,
            trajectory: scs.trajectory.clone(),
            periods: scs.trajectory.len().saturating_sub(1),
            iterations: scs.iterations,
            sub_steps: scs.sub_steps,
            check_failures: scs.check_failures.clone(),
            tangent_operator_mismatches: scs.tangent_operator_mismatches,
        };
        self.state = Some(scs);
        Ok(report)
    }

    fn driving_variables_size(scs: &StudyCurrentState) -> usize {
        scs.structures[0].1.behaviour.driving_variables_size()
    }

    fn apply_constraints(
        &self,
        scs: &StudyCurrentState,
        k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        t: f64,
        dt: f64,
        a: f64,
    ) {
        for constraint in self.constraints.iter().filter(|c| c.is_active()) {
            constraint.set_values(k, r, &scs.u0, &scs.u1, 0, t, dt, a);
        }
    }

    /// Computes the tangent operator by perturbation and compares it with `workspace.k`.
    fn compare_tangent_operator(
        &self,
        comparison: &TangentOperatorComparison,
        behaviour: &dyn Behaviour,
        state: &CurrentState,
        workspace: &mut BehaviourWorkSpace,
        dt: f64,
    ) -> Option<bool> {
        let mut trial = state.clone();
        let mut scratch = workspace.clone();
        let m = behaviour.thermodynamic_forces_size();
        let nk = try_approximate_jacobian_fd(
            m,
            |e, mut s| {
                trial.e1.copy_from(&e);
                behaviour.integrate(&mut trial, &mut scratch, dt, StiffnessMatrixType::NoStiffness)?;
                s.copy_from(&trial.s1);
                Ok::<(), IntegrationFailure>(())
            },
            &state.e1,
            comparison.perturbation,
        );
        match nk {
            Ok(nk) => {
                let error = max_abs_difference(&nk, &workspace.k);
                let scale = workspace.k.amax().max(f64::MIN_POSITIVE);
                workspace.nk = nk;
                if error > comparison.criterion * scale {
                    warn!(
                        "Tangent operator and its numerical approximation differ \
                         (error : {:e}, criterion value : {:e})",
                        error,
                        comparison.criterion * scale
                    );
                    Some(false)
                } else {
                    Some(true)
                }
            }
            Err(failure) => {
                warn!("Numerical approximation of the tangent operator failed ({failure})");
                None
            }
        }
    }
}

fn max_norm<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    values.into_iter().fold(0.0, |norm: f64, v| {
        if v.is_finite() && norm.is_finite() {
            norm.max(v.abs())
        } else {
            f64::INFINITY
        }
    })
}

/// Returns the Lagrange multipliers normalisation factor, computing it from `k` the first time.
fn normalisation_factor(scs: &mut StudyCurrentState, k: &DMatrix<f64>) -> f64 {
    if let Some(a) = scs.parameter(NORMALISATION_FACTOR) {
        return a;
    }
    let a = k.amax();
    let a = if a.is_finite() && a > 0.0 { a } else { 1.0 };
    scs.set_parameter(NORMALISATION_FACTOR, a);
    a
}

impl Study for PointStudy {
    fn number_of_unknowns(&self) -> usize {
        self.unknowns
    }

    fn treat_events(&mut self, t: f64, t_eps: f64) {
        for event in self
            .events
            .iter_mut()
            .filter(|e| !e.fired && e.time <= t + t_eps)
        {
            info!("Event '{}' at time {}", event.name, t);
            event.fired = true;
            for constraint in &mut self.constraints {
                constraint.treat_event(&event.name);
            }
        }
    }

    fn prepare(&self, scs: &mut StudyCurrentState, t: f64, dt: f64) {
        let nd = Self::driving_variables_size(scs);
        let state = &mut scs.structures[0].1.istates[0];
        state.e0.copy_from(&scs.u0.rows(0, nd));
        for (i, evolution) in self.material_properties.iter().enumerate() {
            state.mprops0[i] = evolution.value(t);
            state.mprops1[i] = evolution.value(t + dt);
        }
        for (i, evolution) in self.external_state_variables.iter().enumerate() {
            let v0 = evolution.value(t);
            state.esv0[i] = v0;
            state.desv[i] = evolution.value(t + dt) - v0;
        }
        if let (Some(thermal_expansion), Some(temperature)) = (&self.thermal_expansion, &self.temperature) {
            let alpha = &thermal_expansion.alpha;
            let t_ref = state.t_ref;
            let eth0 = alpha.value(t) * (temperature.value(t) - t_ref);
            let eth1 = alpha.value(t + dt) * (temperature.value(t + dt) - t_ref);
            for i in 0..nd.min(3) {
                state.e_th0[i] = eth0;
                state.e_th1[i] = eth1;
            }
        }
        scs.stage = StudyStage::Prepared;
    }

    fn make_linear_prediction(&self, scs: &mut StudyCurrentState, dt: f64) {
        if scs.period <= 1 || scs.dt_1 <= 0.0 {
            return;
        }
        let ratio = dt / scs.dt_1;
        let du = (&scs.u0 - &scs.u_1) * ratio;
        scs.u1 = &scs.u0 + du;
        let state = &mut scs.structures[0].1.istates[0];
        state.iv1 = &state.iv0 + (&state.iv0 - &state.iv_1) * ratio;
        state.s1 = &state.s0 + (&state.s0 - &state.s_1) * ratio;
    }

    fn compute_prediction_stiffness_and_residual(
        &self,
        scs: &mut StudyCurrentState,
        k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        t: f64,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<(), IntegrationFailure> {
        k.fill(0.0);
        r.fill(0.0);
        let nd = Self::driving_variables_size(scs);
        {
            let structure = &mut scs.structures[0].1;
            let behaviour = structure.behaviour.clone();
            let state = &mut structure.istates[0];
            state.e1.copy_from(&scs.u1.rows(0, nd));
            behaviour.compute_prediction_operator(&mut structure.workspace, state, smt)?;
            let kt = &structure.workspace.kt;
            k.view_mut((0, 0), (nd, nd)).copy_from(kt);
            // The thermal strain increment is known at the beginning of the time step
            let de_th = &state.e_th1 - &state.e_th0;
            let s = &state.s0 - kt * de_th;
            r.rows_mut(0, nd).copy_from(&s);
        }
        let a = normalisation_factor(scs, k);
        self.apply_constraints(scs, k, r, t, dt, a);
        Ok(())
    }

    fn compute_stiffness_matrix_and_residual(
        &self,
        scs: &mut StudyCurrentState,
        k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        t: f64,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<f64, IntegrationFailure> {
        k.fill(0.0);
        r.fill(0.0);
        let nd = Self::driving_variables_size(scs);
        let rdt = {
            let structure = &mut scs.structures[0].1;
            let behaviour = structure.behaviour.clone();
            let state = &mut structure.istates[0];
            state.e1.copy_from(&scs.u1.rows(0, nd));
            let rdt = behaviour.integrate(state, &mut structure.workspace, dt, smt)?;
            if let Some(comparison) = &self.tangent_operator_comparison {
                if smt == StiffnessMatrixType::ConsistentTangentOperator {
                    let workspace = &mut structure.workspace;
                    let matches = self.compare_tangent_operator(comparison, behaviour.as_ref(), state, workspace, dt);
                    if matches == Some(false) {
                        scs.tangent_operator_mismatches += 1;
                    }
                }
            }
            k.view_mut((0, 0), (nd, nd))
                .copy_from(&structure.workspace.k);
            r.rows_mut(0, nd).copy_from(&state.s1);
            rdt
        };
        let a = normalisation_factor(scs, k);
        self.apply_constraints(scs, k, r, t, dt, a);
        Ok(rdt)
    }

    fn check_convergence(
        &self,
        scs: &StudyCurrentState,
        du: &DVector<f64>,
        r: &DVector<f64>,
        ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> ConvergenceCheck {
        let nd = Self::driving_variables_size(scs);
        let ne = max_norm(du.rows(0, nd).iter());
        let se = max_norm(r.rows(0, nd).iter());
        let s1 = &scs.structures[0].1.istates[0].s1;
        let constraints_converged = self
            .constraints
            .iter()
            .filter(|c| c.is_active())
            .all(|c| c.check_convergence(&scs.u1, s1, 0, ueps, seps, t, dt));
        ConvergenceCheck {
            converged: ne < ueps && se < seps && constraints_converged,
            increment_norm: ne,
            residual_norm: se,
        }
    }

    fn failed_criteria_diagnostic(
        &self,
        scs: &StudyCurrentState,
        du: &DVector<f64>,
        r: &DVector<f64>,
        ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> Vec<String> {
        let nd = Self::driving_variables_size(scs);
        let ne = max_norm(du.rows(0, nd).iter());
        let se = max_norm(r.rows(0, nd).iter());
        let mut criteria = Vec::new();
        if !(ne < ueps) {
            criteria.push(format!(
                "test on driving variables (error : {ne:e}, criterion value : {ueps:e})"
            ));
        }
        if !(se < seps) {
            criteria.push(format!(
                "test on thermodynamic forces (error : {se:e}, criterion value : {seps:e})"
            ));
        }
        let s1 = &scs.structures[0].1.istates[0].s1;
        for constraint in self.constraints.iter().filter(|c| c.is_active()) {
            if !constraint.check_convergence(&scs.u1, s1, 0, ueps, seps, t, dt) {
                criteria.push(constraint.failed_criteria_diagnostic(&scs.u1, s1, 0, ueps, seps, t, dt));
            }
        }
        criteria
    }

    fn error_norm(&self, du: &DVector<f64>) -> f64 {
        let nd = self
            .behaviour
            .as_ref()
            .map(|b| b.driving_variables_size())
            .unwrap_or(du.len());
        max_norm(du.rows(0, nd.min(du.len())).iter())
    }

    fn post_convergence(&self, scs: &mut StudyCurrentState, t: f64, dt: f64) -> bool {
        if scs.stage == StudyStage::Converged {
            return false;
        }
        let period = scs.period;
        scs.update(dt);
        let time = t + dt;
        let state = &scs.structures[0].1.istates[0];
        scs.trajectory
            .push(TrajectoryPoint::from_state(time, period, state));
        for check in &self.references {
            let value = check.value(state);
            let reference = check.reference.value(time);
            if !((value - reference).abs() <= check.tolerance) {
                warn!(
                    "Check on '{}' failed at time {}: {} (reference {}, tolerance {})",
                    check.name, time, value, reference, check.tolerance
                );
                scs.check_failures.push(CheckFailure {
                    time,
                    variable: check.name.clone(),
                    value,
                    reference,
                    tolerance: check.tolerance,
                });
            }
        }
        scs.stage = StudyStage::Converged;
        true
    }
}
