use itertools::Itertools;
use log::{debug, warn};
use nalgebra::DVector;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Name of the parameter controlling the first iteration at which an algorithm is applied.
pub const ACCELERATION_TRIGGER: &str = "AccelerationTrigger";
/// Name of the parameter controlling how often the `Cast3M` algorithm is applied.
pub const ACCELERATION_PERIOD: &str = "AccelerationPeriod";

const DEFAULT_TRIGGER: usize = 4;
const DEFAULT_PERIOD: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccelerationError {
    /// The parameter is not known by the algorithm.
    UnknownParameter { algorithm: String, parameter: String },
    /// The parameter was already given a value.
    ParameterAlreadyDefined { algorithm: String, parameter: String },
    /// The value could not be parsed or is out of range.
    InvalidParameterValue {
        algorithm: String,
        parameter: String,
        value: String,
        reason: String,
    },
    /// No algorithm is registered under the given name.
    UnknownAlgorithm { name: String, known: Vec<String> },
}

impl Display for AccelerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            AccelerationError::UnknownParameter { algorithm, parameter } => {
                write!(f, "{algorithm} acceleration algorithm: unknown parameter '{parameter}'")
            }
            AccelerationError::ParameterAlreadyDefined { algorithm, parameter } => {
                write!(f, "{algorithm} acceleration algorithm: parameter '{parameter}' already defined")
            }
            AccelerationError::InvalidParameterValue {
                algorithm,
                parameter,
                value,
                reason,
            } => {
                write!(
                    f,
                    "{algorithm} acceleration algorithm: invalid value '{value}' for parameter '{parameter}' ({reason})"
                )
            }
            AccelerationError::UnknownAlgorithm { name, known } => {
                write!(
                    f,
                    "unknown acceleration algorithm '{name}' (known algorithms: {})",
                    known.iter().join(", ")
                )
            }
        }
    }
}

impl Error for AccelerationError {}

/// An algorithm that corrects the current estimate of the unknowns of a Newton-Raphson
/// iteration, based on the history of previous estimates and residuals.
///
/// Implementations are updated with every iteration, but only modify the estimate once
/// their trigger iteration is reached. A degenerate history never causes an error: the
/// correction is simply skipped for that iteration.
pub trait AccelerationAlgorithm: fmt::Debug {
    fn name(&self) -> &str;

    fn set_parameter(&mut self, parameter: &str, value: &str) -> Result<(), AccelerationError>;

    /// Allocates the history buffers for a problem with `size` unknowns.
    ///
    /// Parameters that were not explicitly set receive their default values.
    fn initialize(&mut self, size: usize);

    /// Called at the beginning of each time step.
    fn pre_execution_tasks(&mut self) {}

    /// Proposes a corrected estimate `u1`.
    ///
    /// `u1` is the estimate after the Newton update, `du` the last Newton correction and `r`
    /// the residual which gave rise to it. `iteration` starts at 1.
    fn execute(
        &mut self,
        u1: &mut DVector<f64>,
        du: &DVector<f64>,
        r: &DVector<f64>,
        ueps: f64,
        seps: f64,
        iteration: usize,
    );

    /// Called once the time step has converged.
    fn post_execution_tasks(&mut self) {}
}

fn parse_parameter(algorithm: &str, parameter: &str, value: &str) -> Result<usize, AccelerationError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|err| AccelerationError::InvalidParameterValue {
            algorithm: algorithm.to_string(),
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: err.to_string(),
        })
}

fn set_trigger(algorithm: &str, trigger: &mut Option<usize>, value: &str) -> Result<(), AccelerationError> {
    if trigger.is_some() {
        return Err(AccelerationError::ParameterAlreadyDefined {
            algorithm: algorithm.to_string(),
            parameter: ACCELERATION_TRIGGER.to_string(),
        });
    }
    let v = parse_parameter(algorithm, ACCELERATION_TRIGGER, value)?;
    if v < 3 {
        return Err(AccelerationError::InvalidParameterValue {
            algorithm: algorithm.to_string(),
            parameter: ACCELERATION_TRIGGER.to_string(),
            value: value.to_string(),
            reason: "the trigger must be greater than or equal to 3".to_string(),
        });
    }
    *trigger = Some(v);
    Ok(())
}

/// Secant acceleration based on the last two iterates.
///
/// With $\Delta r = r_1 - r_0$, the correction reads
/// $$ u_1 \leftarrow u_1 - \frac{r_1 \cdot \Delta r}{\lVert \Delta r \rVert^2} (u_1 - u_0). $$
#[derive(Debug, Clone)]
pub struct SecantAccelerationAlgorithm {
    trigger: Option<usize>,
    u0: DVector<f64>,
    u1: DVector<f64>,
    r0: DVector<f64>,
    r1: DVector<f64>,
}

impl Default for SecantAccelerationAlgorithm {
    fn default() -> Self {
        Self {
            trigger: None,
            u0: DVector::zeros(0),
            u1: DVector::zeros(0),
            r0: DVector::zeros(0),
            r1: DVector::zeros(0),
        }
    }
}

impl SecantAccelerationAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) -> Option<usize> {
        self.trigger
    }
}

impl AccelerationAlgorithm for SecantAccelerationAlgorithm {
    fn name(&self) -> &str {
        "Secant"
    }

    fn set_parameter(&mut self, parameter: &str, value: &str) -> Result<(), AccelerationError> {
        match parameter {
            ACCELERATION_TRIGGER => set_trigger("Secant", &mut self.trigger, value),
            _ => Err(AccelerationError::UnknownParameter {
                algorithm: "Secant".to_string(),
                parameter: parameter.to_string(),
            }),
        }
    }

    fn initialize(&mut self, size: usize) {
        self.trigger.get_or_insert(DEFAULT_TRIGGER);
        self.u0 = DVector::zeros(size);
        self.u1 = DVector::zeros(size);
        self.r0 = DVector::zeros(size);
        self.r1 = DVector::zeros(size);
    }

    fn execute(
        &mut self,
        u1: &mut DVector<f64>,
        _du: &DVector<f64>,
        r: &DVector<f64>,
        _ueps: f64,
        seps: f64,
        iteration: usize,
    ) {
        if self.u1.len() != u1.len() {
            self.initialize(u1.len());
        }
        std::mem::swap(&mut self.u0, &mut self.u1);
        std::mem::swap(&mut self.r0, &mut self.r1);
        self.u1.copy_from(u1);
        self.r1.copy_from(r);
        let trigger = self.trigger.unwrap_or(DEFAULT_TRIGGER);
        if iteration < trigger {
            return;
        }
        let dr = &self.r1 - &self.r0;
        let nr2 = dr.norm_squared();
        if nr2 > 100.0 * f64::EPSILON * seps {
            let a = self.r1.dot(&dr) / nr2;
            u1.axpy(-a, &(&self.u1 - &self.u0), 1.0);
            debug!("Secant acceleration at iteration {}: a = {:e}", iteration, a);
        } else {
            debug!("Secant acceleration skipped at iteration {}: degenerate residual history", iteration);
        }
    }
}

/// Acceleration based on the last three iterates, following the algorithm used by the
/// Cast3M finite element solver.
///
/// The residuals $r_a, r_b, r_c$ (from oldest to newest) span an affine plane. The point of
/// this plane closest to the origin is written
/// $r_a + \alpha (r_b - r_a) + \beta (r_c - r_a)$ and the same blend is applied to the
/// estimates. When the component of $r_c - r_a$ orthogonal to $r_b - r_a$ is smaller than a
/// tenth of its component along $r_b - r_a$, the history is considered collinear and the two
/// point secant formula is applied to the two oldest samples instead.
#[derive(Debug, Clone)]
pub struct Cast3MAccelerationAlgorithm {
    trigger: Option<usize>,
    period: Option<usize>,
    // Oldest first
    u: [DVector<f64>; 3],
    r: [DVector<f64>; 3],
}

impl Default for Cast3MAccelerationAlgorithm {
    fn default() -> Self {
        Self {
            trigger: None,
            period: None,
            u: std::array::from_fn(|_| DVector::zeros(0)),
            r: std::array::from_fn(|_| DVector::zeros(0)),
        }
    }
}

impl Cast3MAccelerationAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) -> Option<usize> {
        self.trigger
    }

    pub fn period(&self) -> Option<usize> {
        self.period
    }

    fn is_active(&self, iteration: usize) -> bool {
        let trigger = self.trigger.unwrap_or(DEFAULT_TRIGGER);
        let period = self.period.unwrap_or(DEFAULT_PERIOD);
        iteration >= trigger && (iteration - trigger) % period == 0
    }
}

impl AccelerationAlgorithm for Cast3MAccelerationAlgorithm {
    fn name(&self) -> &str {
        "Cast3M"
    }

    fn set_parameter(&mut self, parameter: &str, value: &str) -> Result<(), AccelerationError> {
        match parameter {
            ACCELERATION_TRIGGER => set_trigger("Cast3M", &mut self.trigger, value),
            ACCELERATION_PERIOD => {
                if self.period.is_some() {
                    return Err(AccelerationError::ParameterAlreadyDefined {
                        algorithm: "Cast3M".to_string(),
                        parameter: parameter.to_string(),
                    });
                }
                let v = parse_parameter("Cast3M", parameter, value)?;
                if v == 0 {
                    return Err(AccelerationError::InvalidParameterValue {
                        algorithm: "Cast3M".to_string(),
                        parameter: parameter.to_string(),
                        value: value.to_string(),
                        reason: "the period must be strictly positive".to_string(),
                    });
                }
                self.period = Some(v);
                Ok(())
            }
            _ => Err(AccelerationError::UnknownParameter {
                algorithm: "Cast3M".to_string(),
                parameter: parameter.to_string(),
            }),
        }
    }

    fn initialize(&mut self, size: usize) {
        self.trigger.get_or_insert(DEFAULT_TRIGGER);
        self.period.get_or_insert(DEFAULT_PERIOD);
        self.u = [DVector::zeros(size), DVector::zeros(size), DVector::zeros(size)];
        self.r = [DVector::zeros(size), DVector::zeros(size), DVector::zeros(size)];
    }

    fn execute(
        &mut self,
        u1: &mut DVector<f64>,
        _du: &DVector<f64>,
        r: &DVector<f64>,
        _ueps: f64,
        seps: f64,
        iteration: usize,
    ) {
        if self.u[2].len() != u1.len() {
            self.initialize(u1.len());
        }
        self.u.rotate_left(1);
        self.r.rotate_left(1);
        self.u[2].copy_from(u1);
        self.r[2].copy_from(r);
        if !self.is_active(iteration) {
            return;
        }
        let [ua, ub, uc] = &self.u;
        let [ra, rb, rc] = &self.r;

        let d0 = rb - ra;
        let nr0 = d0.norm();
        if nr0 <= 100.0 * seps * f64::EPSILON {
            debug!("Cast3M acceleration skipped at iteration {}: degenerate residual history", iteration);
            return;
        }
        let n0 = &d0 / nr0;

        let d1 = rc - ra;
        let d1_n0 = d1.dot(&n0);
        let d1_orth = &d1 - &n0 * d1_n0;
        let nr1 = d1_orth.norm();

        if !(nr1 > 0.1 * d1_n0.abs()) {
            let alpha = -ra.dot(&n0) / nr0;
            u1.copy_from(ua);
            u1.axpy(alpha, &(ub - ua), 1.0);
            debug!(
                "Cast3M acceleration at iteration {}: collinear history, secant fallback (alpha = {:e})",
                iteration, alpha
            );
            return;
        }

        let n1 = &d1_orth / nr1;
        let beta = -ra.dot(&n1) / nr1;
        let alpha = (-ra.dot(&n0) - beta * d1_n0) / nr0;
        if !alpha.is_finite() || !beta.is_finite() {
            warn!("Cast3M acceleration produced non-finite coefficients, correction skipped");
            return;
        }
        u1.copy_from(ua);
        u1.axpy(alpha, &(ub - ua), 1.0);
        u1.axpy(beta, &(uc - ua), 1.0);
        debug!(
            "Cast3M acceleration at iteration {}: alpha = {:e}, beta = {:e}",
            iteration, alpha, beta
        );
    }
}

pub type AccelerationAlgorithmConstructor = fn() -> Box<dyn AccelerationAlgorithm>;

/// Maps acceleration algorithm names to their constructors.
///
/// The default factory knows the `Secant` and `Cast3M` algorithms.
#[derive(Clone)]
pub struct AccelerationAlgorithmFactory {
    constructors: HashMap<String, AccelerationAlgorithmConstructor>,
}

impl fmt::Debug for AccelerationAlgorithmFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccelerationAlgorithmFactory")
            .field("algorithms", &self.names())
            .finish()
    }
}

impl Default for AccelerationAlgorithmFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register("Secant", || Box::new(SecantAccelerationAlgorithm::new()));
        factory.register("Cast3M", || Box::new(Cast3MAccelerationAlgorithm::new()));
        factory
    }
}

impl AccelerationAlgorithmFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, constructor: AccelerationAlgorithmConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Sorted names of the registered algorithms.
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().sorted().collect()
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn AccelerationAlgorithm>, AccelerationError> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| AccelerationError::UnknownAlgorithm {
                name: name.to_string(),
                known: self.names(),
            })
    }
}
