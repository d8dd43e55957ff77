//! Scalar boundary conditions imposed on a material point.
use crate::behaviour::Behaviour;
use crate::convention::shear_factor;
use crate::error::ConfigurationError;
use crate::evolution::Evolution;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::rc::Rc;

/// A scalar boundary condition.
///
/// Constraints patch the rows of the assembled stiffness matrix and residual associated with
/// the component they bind. `pos` is the offset of the driving variables of the constrained
/// sub-structure in the vector of unknowns.
pub trait Constraint: fmt::Debug {
    /// Number of additional unknowns introduced by the constraint.
    fn number_of_lagrange_multipliers(&self) -> usize;

    /// Name of the constrained component, e.g. `SXX`.
    fn component_name(&self) -> &str;

    /// Position of the constrained component in the driving variables.
    fn component_position(&self) -> usize;

    #[allow(clippy::too_many_arguments)]
    fn set_values(
        &self,
        k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        u0: &DVector<f64>,
        u1: &DVector<f64>,
        pos: usize,
        t: f64,
        dt: f64,
        a: f64,
    );

    #[allow(clippy::too_many_arguments)]
    fn check_convergence(
        &self,
        u: &DVector<f64>,
        s: &DVector<f64>,
        pos: usize,
        ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> bool;

    #[allow(clippy::too_many_arguments)]
    fn failed_criteria_diagnostic(
        &self,
        u: &DVector<f64>,
        s: &DVector<f64>,
        pos: usize,
        ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> String;

    fn is_active(&self) -> bool;

    /// Activates or deactivates the constraint if it listens to the event.
    fn treat_event(&mut self, event: &str);
}

/// Activation state of a constraint and the events toggling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    active: bool,
    activating_events: Vec<String>,
    deactivating_events: Vec<String>,
}

impl Default for Activation {
    fn default() -> Self {
        Self {
            active: true,
            activating_events: Vec::new(),
            deactivating_events: Vec::new(),
        }
    }
}

impl Activation {
    fn treat_event(&mut self, event: &str) {
        if self.activating_events.iter().any(|e| e == event) {
            self.active = true;
        }
        if self.deactivating_events.iter().any(|e| e == event) {
            self.active = false;
        }
    }
}

macro_rules! impl_activation_builders {
    ($name:ident) => {
        impl $name {
            /// Starts inactive until one of the activating events occurs.
            pub fn inactive(mut self) -> Self {
                self.activation.active = false;
                self
            }

            pub fn with_activating_events<S: Into<String>>(mut self, events: impl IntoIterator<Item = S>) -> Self {
                self.activation
                    .activating_events
                    .extend(events.into_iter().map(Into::into));
                self
            }

            pub fn with_deactivating_events<S: Into<String>>(mut self, events: impl IntoIterator<Item = S>) -> Self {
                self.activation
                    .deactivating_events
                    .extend(events.into_iter().map(Into::into));
                self
            }
        }
    };
}

/// Imposes the value of a driving variable component (a strain).
///
/// The row of the component is replaced by $a (u_i - \bar{u}_i)$, where $a$ is the Lagrange
/// multipliers normalisation factor.
#[derive(Debug, Clone)]
pub struct ImposedDrivingVariable {
    name: String,
    c: usize,
    evolution: Rc<dyn Evolution>,
    activation: Activation,
}

impl ImposedDrivingVariable {
    pub fn new(
        behaviour: &dyn Behaviour,
        name: &str,
        evolution: Rc<dyn Evolution>,
    ) -> Result<Self, ConfigurationError> {
        let c = behaviour.hypothesis().driving_variable_component_position(name)?;
        Ok(Self {
            name: name.to_string(),
            c,
            evolution,
            activation: Activation::default(),
        })
    }

    /// Imposed value at the end of the time step, in tensorial convention.
    fn target(&self, t: f64, dt: f64) -> f64 {
        self.evolution.value(t + dt) * shear_factor(self.c)
    }
}

impl_activation_builders!(ImposedDrivingVariable);

impl Constraint for ImposedDrivingVariable {
    fn number_of_lagrange_multipliers(&self) -> usize {
        0
    }

    fn component_name(&self) -> &str {
        &self.name
    }

    fn component_position(&self) -> usize {
        self.c
    }

    fn set_values(
        &self,
        k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        _u0: &DVector<f64>,
        u1: &DVector<f64>,
        pos: usize,
        t: f64,
        dt: f64,
        a: f64,
    ) {
        let i = pos + self.c;
        k.row_mut(i).fill(0.0);
        k[(i, i)] = a;
        r[i] = a * (u1[i] - self.target(t, dt));
    }

    fn check_convergence(
        &self,
        u: &DVector<f64>,
        _s: &DVector<f64>,
        pos: usize,
        ueps: f64,
        _seps: f64,
        t: f64,
        dt: f64,
    ) -> bool {
        (u[pos + self.c] - self.target(t, dt)).abs() < ueps
    }

    fn failed_criteria_diagnostic(
        &self,
        u: &DVector<f64>,
        _s: &DVector<f64>,
        pos: usize,
        ueps: f64,
        _seps: f64,
        t: f64,
        dt: f64,
    ) -> String {
        let error = (u[pos + self.c] - self.target(t, dt)).abs();
        format!(
            "imposed driving variable '{}' (error : {:e}, criterion value : {:e})",
            self.name, error, ueps
        )
    }

    fn is_active(&self) -> bool {
        self.activation.active
    }

    fn treat_event(&mut self, event: &str) {
        self.activation.treat_event(event);
    }
}

/// Imposes the value of a thermodynamic force component (a stress).
///
/// The imposed value is subtracted from the residual row of the component.
#[derive(Debug, Clone)]
pub struct ImposedThermodynamicForce {
    name: String,
    c: usize,
    evolution: Rc<dyn Evolution>,
    activation: Activation,
}

/// Imposed stresses are the thermodynamic forces of small strain behaviours.
pub type ImposedStress = ImposedThermodynamicForce;

impl ImposedThermodynamicForce {
    pub fn new(
        behaviour: &dyn Behaviour,
        name: &str,
        evolution: Rc<dyn Evolution>,
    ) -> Result<Self, ConfigurationError> {
        let c = behaviour.hypothesis().thermodynamic_force_component_position(name)?;
        Ok(Self {
            name: name.to_string(),
            c,
            evolution,
            activation: Activation::default(),
        })
    }

    fn target(&self, t: f64, dt: f64) -> f64 {
        self.evolution.value(t + dt) * shear_factor(self.c)
    }
}

impl_activation_builders!(ImposedThermodynamicForce);

impl Constraint for ImposedThermodynamicForce {
    fn number_of_lagrange_multipliers(&self) -> usize {
        0
    }

    fn component_name(&self) -> &str {
        &self.name
    }

    fn component_position(&self) -> usize {
        self.c
    }

    fn set_values(
        &self,
        _k: &mut DMatrix<f64>,
        r: &mut DVector<f64>,
        _u0: &DVector<f64>,
        _u1: &DVector<f64>,
        pos: usize,
        t: f64,
        dt: f64,
        _a: f64,
    ) {
        r[pos + self.c] -= self.target(t, dt);
    }

    fn check_convergence(
        &self,
        _u: &DVector<f64>,
        s: &DVector<f64>,
        _pos: usize,
        _ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> bool {
        (s[self.c] - self.target(t, dt)).abs() < seps
    }

    fn failed_criteria_diagnostic(
        &self,
        _u: &DVector<f64>,
        s: &DVector<f64>,
        _pos: usize,
        _ueps: f64,
        seps: f64,
        t: f64,
        dt: f64,
    ) -> String {
        let error = (s[self.c] - self.target(t, dt)).abs();
        format!(
            "imposed thermodynamic force '{}' (error : {:e}, criterion value : {:e})",
            self.name, error, seps
        )
    }

    fn is_active(&self) -> bool {
        self.activation.active
    }

    fn treat_event(&mut self, event: &str) {
        self.activation.treat_event(event);
    }
}
