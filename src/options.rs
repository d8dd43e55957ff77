//! Options of the nonlinear solver.
use crate::behaviour::StiffnessMatrixType;
use crate::error::ConfigurationError;
use log::info;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DRIVING_VARIABLE_EPSILON: f64 = 1e-12;
pub const DEFAULT_THERMODYNAMIC_FORCE_EPSILON: f64 = 1e-3;
pub const DEFAULT_MAXIMUM_ITERATIONS: usize = 100;
pub const DEFAULT_MAXIMUM_SUB_STEPS: usize = 10;
pub const DEFAULT_MINIMAL_TIME_STEP_SCALING_FACTOR: f64 = 0.1;
pub const DEFAULT_MAXIMAL_TIME_STEP_SCALING_FACTOR: f64 = 2.0;

/// How the unknowns are initialised at the beginning of a time step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionPolicy {
    NoPrediction,
    /// Extrapolation from the two last converged steps.
    LinearPrediction,
    ElasticPrediction,
    ElasticPredictionFromMaterialProperties,
    SecantOperatorPrediction,
    TangentOperatorPrediction,
}

impl PredictionPolicy {
    /// The prediction operator requested from the behaviour, if any.
    pub fn stiffness_matrix_type(&self) -> Option<StiffnessMatrixType> {
        match self {
            PredictionPolicy::NoPrediction | PredictionPolicy::LinearPrediction => None,
            PredictionPolicy::ElasticPrediction => Some(StiffnessMatrixType::Elastic),
            PredictionPolicy::ElasticPredictionFromMaterialProperties => {
                Some(StiffnessMatrixType::ElasticFromMaterialProperties)
            }
            PredictionPolicy::SecantOperatorPrediction => Some(StiffnessMatrixType::SecantOperator),
            PredictionPolicy::TangentOperatorPrediction => Some(StiffnessMatrixType::TangentOperator),
        }
    }
}

/// When the stiffness matrix is assembled and factorised.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StiffnessUpdatingPolicy {
    /// Once for the whole study.
    Constant,
    /// At the first iteration of each time step.
    ConstantPerPeriod,
    UpdatedEachIteration,
}

/// Options of the nonlinear solver.
///
/// Unset options take their default values. Every option may only be set once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    driving_variable_epsilon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thermodynamic_force_epsilon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_sub_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction_policy: Option<PredictionPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stiffness_matrix_type: Option<StiffnessMatrixType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stiffness_updating_policy: Option<StiffnessUpdatingPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dynamic_time_step_scaling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimal_time_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximal_time_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimal_time_step_scaling_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximal_time_step_scaling_factor: Option<f64>,
}

fn set_once<T>(slot: &mut Option<T>, option: &str, value: T) -> Result<(), ConfigurationError> {
    if slot.is_some() {
        return Err(ConfigurationError::AlreadyDefined(format!("option '{option}'")));
    }
    *slot = Some(value);
    Ok(())
}

fn invalid(option: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidOption {
        option: option.to_string(),
        reason: reason.into(),
    }
}

fn check_positive(option: &str, value: f64) -> Result<(), ConfigurationError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(option, format!("{value} is not strictly positive")));
    }
    Ok(())
}

impl SolverOptions {
    pub fn set_driving_variable_epsilon(&mut self, value: f64) -> Result<(), ConfigurationError> {
        check_positive("driving_variable_epsilon", value)?;
        set_once(&mut self.driving_variable_epsilon, "driving_variable_epsilon", value)
    }

    pub fn set_thermodynamic_force_epsilon(&mut self, value: f64) -> Result<(), ConfigurationError> {
        check_positive("thermodynamic_force_epsilon", value)?;
        set_once(&mut self.thermodynamic_force_epsilon, "thermodynamic_force_epsilon", value)
    }

    pub fn set_maximum_iterations(&mut self, value: usize) -> Result<(), ConfigurationError> {
        if value == 0 {
            return Err(invalid("maximum_iterations", "must be strictly positive"));
        }
        set_once(&mut self.maximum_iterations, "maximum_iterations", value)
    }

    pub fn set_maximum_sub_steps(&mut self, value: usize) -> Result<(), ConfigurationError> {
        if value == 0 {
            return Err(invalid("maximum_sub_steps", "must be strictly positive"));
        }
        set_once(&mut self.maximum_sub_steps, "maximum_sub_steps", value)
    }

    pub fn set_prediction_policy(&mut self, value: PredictionPolicy) -> Result<(), ConfigurationError> {
        set_once(&mut self.prediction_policy, "prediction_policy", value)
    }

    pub fn set_stiffness_matrix_type(&mut self, value: StiffnessMatrixType) -> Result<(), ConfigurationError> {
        set_once(&mut self.stiffness_matrix_type, "stiffness_matrix_type", value)
    }

    pub fn set_stiffness_updating_policy(&mut self, value: StiffnessUpdatingPolicy) -> Result<(), ConfigurationError> {
        set_once(&mut self.stiffness_updating_policy, "stiffness_updating_policy", value)
    }

    pub fn set_dynamic_time_step_scaling(&mut self, value: bool) -> Result<(), ConfigurationError> {
        set_once(&mut self.dynamic_time_step_scaling, "dynamic_time_step_scaling", value)
    }

    pub fn set_minimal_time_step(&mut self, value: f64) -> Result<(), ConfigurationError> {
        check_positive("minimal_time_step", value)?;
        if let Some(max) = self.maximal_time_step {
            if value >= max {
                return Err(invalid(
                    "minimal_time_step",
                    "the minimal time step must be lower than the maximal time step",
                ));
            }
        }
        set_once(&mut self.minimal_time_step, "minimal_time_step", value)
    }

    pub fn set_maximal_time_step(&mut self, value: f64) -> Result<(), ConfigurationError> {
        check_positive("maximal_time_step", value)?;
        if let Some(min) = self.minimal_time_step {
            if value <= min {
                return Err(invalid(
                    "maximal_time_step",
                    "the maximal time step must be greater than the minimal time step",
                ));
            }
        }
        set_once(&mut self.maximal_time_step, "maximal_time_step", value)
    }

    pub fn set_minimal_time_step_scaling_factor(&mut self, value: f64) -> Result<(), ConfigurationError> {
        if !(value > 100.0 * f64::EPSILON && value < 1.0) {
            return Err(invalid(
                "minimal_time_step_scaling_factor",
                format!("{value} is not in the range ]100 eps, 1["),
            ));
        }
        set_once(
            &mut self.minimal_time_step_scaling_factor,
            "minimal_time_step_scaling_factor",
            value,
        )
    }

    pub fn set_maximal_time_step_scaling_factor(&mut self, value: f64) -> Result<(), ConfigurationError> {
        if !(value.is_finite() && value >= 1.0) {
            return Err(invalid(
                "maximal_time_step_scaling_factor",
                format!("{value} is lower than 1"),
            ));
        }
        set_once(
            &mut self.maximal_time_step_scaling_factor,
            "maximal_time_step_scaling_factor",
            value,
        )
    }

    pub fn driving_variable_epsilon(&self) -> f64 {
        self.driving_variable_epsilon
            .unwrap_or(DEFAULT_DRIVING_VARIABLE_EPSILON)
    }

    pub fn thermodynamic_force_epsilon(&self) -> f64 {
        self.thermodynamic_force_epsilon
            .unwrap_or(DEFAULT_THERMODYNAMIC_FORCE_EPSILON)
    }

    pub fn maximum_iterations(&self) -> usize {
        self.maximum_iterations.unwrap_or(DEFAULT_MAXIMUM_ITERATIONS)
    }

    pub fn maximum_sub_steps(&self) -> usize {
        self.maximum_sub_steps.unwrap_or(DEFAULT_MAXIMUM_SUB_STEPS)
    }

    pub fn prediction_policy(&self) -> PredictionPolicy {
        self.prediction_policy
            .unwrap_or(PredictionPolicy::NoPrediction)
    }

    /// The stiffness matrix type, if set. Studies fall back to the behaviour default.
    pub fn stiffness_matrix_type(&self) -> Option<StiffnessMatrixType> {
        self.stiffness_matrix_type
    }

    pub fn stiffness_updating_policy(&self) -> StiffnessUpdatingPolicy {
        self.stiffness_updating_policy
            .unwrap_or(StiffnessUpdatingPolicy::UpdatedEachIteration)
    }

    pub fn dynamic_time_step_scaling(&self) -> bool {
        self.dynamic_time_step_scaling.unwrap_or(false)
    }

    pub fn minimal_time_step(&self) -> Option<f64> {
        self.minimal_time_step
    }

    pub fn maximal_time_step(&self) -> Option<f64> {
        self.maximal_time_step
    }

    pub fn minimal_time_step_scaling_factor(&self) -> f64 {
        self.minimal_time_step_scaling_factor
            .unwrap_or(DEFAULT_MINIMAL_TIME_STEP_SCALING_FACTOR)
    }

    pub fn maximal_time_step_scaling_factor(&self) -> f64 {
        self.maximal_time_step_scaling_factor
            .unwrap_or(DEFAULT_MAXIMAL_TIME_STEP_SCALING_FACTOR)
    }

    /// Checks options which may have been deserialized without going through the setters.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut checked = SolverOptions::default();
        macro_rules! check {
            ($field:ident, $setter:ident) => {
                if let Some(value) = self.$field {
                    checked.$setter(value)?;
                }
            };
        }
        check!(driving_variable_epsilon, set_driving_variable_epsilon);
        check!(thermodynamic_force_epsilon, set_thermodynamic_force_epsilon);
        check!(maximum_iterations, set_maximum_iterations);
        check!(maximum_sub_steps, set_maximum_sub_steps);
        check!(minimal_time_step, set_minimal_time_step);
        check!(maximal_time_step, set_maximal_time_step);
        check!(minimal_time_step_scaling_factor, set_minimal_time_step_scaling_factor);
        check!(maximal_time_step_scaling_factor, set_maximal_time_step_scaling_factor);
        Ok(())
    }

    /// Sets the stiffness matrix type if the study did not choose one.
    pub(crate) fn resolve_stiffness_matrix_type(&mut self, default: StiffnessMatrixType) {
        if self.stiffness_matrix_type.is_none() {
            self.stiffness_matrix_type = Some(default);
        }
    }

    pub(crate) fn log_summary(&self) {
        info!(
            "Solver options: ueps = {:e}, seps = {:e}, {} iterations, {} sub-steps, {:?}, {:?}, {:?}, \
             dynamic time step scaling: {}",
            self.driving_variable_epsilon(),
            self.thermodynamic_force_epsilon(),
            self.maximum_iterations(),
            self.maximum_sub_steps(),
            self.prediction_policy(),
            self.stiffness_matrix_type(),
            self.stiffness_updating_policy(),
            self.dynamic_time_step_scaling()
        );
    }
}
