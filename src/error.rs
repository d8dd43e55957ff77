//! Error types shared by the study set-up and the behaviour adapters.
use crate::hypothesis::ModellingHypothesis;
use mtest_optimize::acceleration::AccelerationError;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// An error in the description of a study, surfaced at set-up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// The component name is not valid for the modelling hypothesis.
    InvalidComponent {
        name: String,
        hypothesis: ModellingHypothesis,
    },
    UnknownHypothesis(String),
    /// An option or a study input was given twice.
    AlreadyDefined(String),
    /// An option has a value outside its admissible range.
    InvalidOption { option: String, reason: String },
    UnknownEvolution(String),
    DuplicateEvolution(String),
    /// A material property or external state variable has no associated evolution.
    MissingEvolution(String),
    InvalidEvolution(String),
    /// Two constraints bind the same component.
    ConflictingConstraint(String),
    InvalidRotationMatrix(String),
    /// The behaviour description is not usable by the requested interface.
    InvalidBehaviour(String),
    /// No behaviour was given to the study.
    MissingBehaviour,
    InvalidTimes(String),
    UnknownInterface { name: String, known: Vec<String> },
    Acceleration(AccelerationError),
    /// An operation was called in the wrong stage of the study life cycle.
    InvalidState(String),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConfigurationError::InvalidComponent { name, hypothesis } => {
                write!(f, "invalid component '{name}' for modelling hypothesis '{hypothesis}'")
            }
            ConfigurationError::UnknownHypothesis(name) => write!(f, "unknown modelling hypothesis '{name}'"),
            ConfigurationError::AlreadyDefined(what) => write!(f, "{what} already defined"),
            ConfigurationError::InvalidOption { option, reason } => {
                write!(f, "invalid value for option '{option}': {reason}")
            }
            ConfigurationError::UnknownEvolution(name) => write!(f, "no evolution named '{name}'"),
            ConfigurationError::DuplicateEvolution(name) => {
                write!(f, "an evolution named '{name}' is already defined")
            }
            ConfigurationError::MissingEvolution(name) => write!(f, "no evolution defined for '{name}'"),
            ConfigurationError::InvalidEvolution(reason) => write!(f, "invalid evolution: {reason}"),
            ConfigurationError::ConflictingConstraint(component) => {
                write!(f, "component '{component}' is already constrained")
            }
            ConfigurationError::InvalidRotationMatrix(reason) => write!(f, "invalid rotation matrix: {reason}"),
            ConfigurationError::InvalidBehaviour(reason) => write!(f, "invalid behaviour: {reason}"),
            ConfigurationError::MissingBehaviour => write!(f, "no behaviour defined"),
            ConfigurationError::InvalidTimes(reason) => write!(f, "invalid times: {reason}"),
            ConfigurationError::UnknownInterface { name, known } => {
                write!(f, "unknown behaviour interface '{name}' (known interfaces: {})", known.join(", "))
            }
            ConfigurationError::Acceleration(err) => write!(f, "{err}"),
            ConfigurationError::InvalidState(reason) => write!(f, "invalid state: {reason}"),
        }
    }
}

impl Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigurationError::Acceleration(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AccelerationError> for ConfigurationError {
    fn from(err: AccelerationError) -> Self {
        ConfigurationError::Acceleration(err)
    }
}

/// The failure of a behaviour integration.
///
/// Outputs of a failed integration are never committed to the state.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationFailure {
    /// The native routine reported failure through its status code.
    Status { code: i32, time_step_scaling: Option<f64> },
    /// The native routine unwound instead of returning.
    Unwound(String),
    /// The native routine produced non-finite outputs.
    NonFinite,
    /// The behaviour cannot provide the requested operator.
    Unsupported(String),
}

impl IntegrationFailure {
    /// The time step scaling factor proposed by the behaviour alongside its failure, if any.
    pub fn time_step_scaling(&self) -> Option<f64> {
        match self {
            IntegrationFailure::Status { time_step_scaling, .. } => *time_step_scaling,
            _ => None,
        }
    }
}

impl Display for IntegrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            IntegrationFailure::Status { code, .. } => {
                write!(f, "behaviour integration failed (status {code})")
            }
            IntegrationFailure::Unwound(message) => {
                write!(f, "behaviour integration aborted: {message}")
            }
            IntegrationFailure::NonFinite => write!(f, "behaviour integration produced non-finite values"),
            IntegrationFailure::Unsupported(reason) => write!(f, "unsupported request: {reason}"),
        }
    }
}

impl Error for IntegrationFailure {}
