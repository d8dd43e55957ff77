//! Norton viscoplasticity.
//!
//! The viscoplastic strain rate follows
//! $$
//! \dot{\vec \epsilon}^{vp} = A \sigma_{eq}^n \vec n, \qquad
//! \vec n = \frac{3}{2} \frac{\vec s}{\sigma_{eq}},
//! $$
//! where $\vec s$ is the deviatoric stress and $\sigma_{eq}$ the von Mises stress. The flow
//! is integrated with an implicit Euler scheme, which reduces to a scalar equation on the
//! increment of the equivalent viscoplastic strain $\Delta p$.
use crate::interface::GenericCall;
use crate::materials::{LameParameters, YoungPoisson};
use log::debug;
use mtest::behaviour::generic::{GenericBehaviourData, GENERIC_BEHAVIOUR_SUCCESS};
use mtest::nalgebra::{DMatrix, DVector, DVectorView};

/// Status returned when the local Newton iterations fail.
pub const LOCAL_NON_CONVERGENCE: i32 = 0;

/// Time step scaling factor proposed after a failure of the local iterations.
pub const FAILURE_TIME_STEP_SCALING: f64 = 0.5;

const MAXIMUM_LOCAL_ITERATIONS: usize = 100;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NortonParameters {
    pub elasticity: LameParameters,
    pub coefficient: f64,
    pub exponent: f64,
}

impl NortonParameters {
    /// Reads `YoungModulus`, `PoissonRatio`, `NortonCoefficient`, `NortonExponent`.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match *values {
            [young, poisson, coefficient, exponent, ..] => Some(Self {
                elasticity: YoungPoisson { young, poisson }.into(),
                coefficient,
                exponent,
            }),
            _ => None,
        }
    }
}

fn deviator(s: &DVector<f64>) -> DVector<f64> {
    let trace: f64 = s.iter().take(3).sum();
    let mut dev = s.clone();
    dev.iter_mut().take(3).for_each(|v| *v -= trace / 3.0);
    dev
}

/// The von Mises equivalent stress of a symmetric tensor in tensorial convention.
pub fn von_mises_stress(s: &DVector<f64>) -> f64 {
    let dev = deviator(s);
    (1.5 * dev.dot(&dev)).sqrt()
}

/// Result of the integration over a time step.
#[derive(Clone, Debug, PartialEq)]
pub struct NortonUpdate {
    pub stress: DVector<f64>,
    pub equivalent_strain_increment: f64,
    pub flow_direction: DVector<f64>,
    pub tangent_operator: DMatrix<f64>,
}

/// Solves $\Delta p - \Delta t A (q - 3 \mu \Delta p)^n = 0$ for $\Delta p \in [0, q / (3 \mu)]$.
///
/// Newton iterations are safeguarded by bisection, the residual being increasing in
/// $\Delta p$.
fn solve_equivalent_strain_increment(parameters: &NortonParameters, q: f64, dt: f64) -> Option<f64> {
    let mu = parameters.elasticity.mu;
    let (a, n) = (parameters.coefficient, parameters.exponent);
    let f = |x: f64| x - dt * a * (q - 3.0 * mu * x).max(0.0).powf(n);
    let df = |x: f64| 1.0 + 3.0 * mu * dt * a * n * (q - 3.0 * mu * x).max(0.0).powf(n - 1.0);
    let (mut lo, mut hi) = (0.0, q / (3.0 * mu));
    let tolerance = 1e-14 * hi;
    let mut x = 0.0;
    for iteration in 1..=MAXIMUM_LOCAL_ITERATIONS {
        let fx = f(x);
        if !fx.is_finite() {
            return None;
        }
        if fx > 0.0 {
            hi = x;
        } else {
            lo = x;
        }
        let newton = x - fx / df(x);
        let next = if newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
        if (next - x).abs() <= tolerance {
            debug!("Norton local iterations converged in {iteration} iterations");
            return Some(next);
        }
        x = next;
    }
    None
}

/// Integrates the behaviour from the elastic prediction of the stress `trial`.
pub fn integrate(parameters: &NortonParameters, trial: &DVector<f64>, dt: f64) -> Option<NortonUpdate> {
    let n = trial.len();
    let LameParameters { mu, lambda: _ } = parameters.elasticity;
    let elastic = parameters.elasticity.stiffness(n);
    let q = von_mises_stress(trial);
    if q <= 0.0 || parameters.coefficient <= 0.0 || dt <= 0.0 {
        return Some(NortonUpdate {
            stress: trial.clone(),
            equivalent_strain_increment: 0.0,
            flow_direction: DVector::zeros(n),
            tangent_operator: elastic,
        });
    }
    let dp = solve_equivalent_strain_increment(parameters, q, dt)?;
    let normal = deviator(trial) * (1.5 / q);
    let stress = trial - &normal * (2.0 * mu * dp);

    // Derivative of dp with respect to the trial equivalent stress
    let (a, exponent) = (parameters.coefficient, parameters.exponent);
    let g = dt * a * exponent * (q - 3.0 * mu * dp).max(0.0).powf(exponent - 1.0);
    let h = g / (1.0 + 3.0 * mu * g);
    let deviatoric_projector = DMatrix::from_fn(n, n, |i, j| {
        let identity = if i == j { 1.0 } else { 0.0 };
        let spherical = if i < 3 && j < 3 { 1.0 / 3.0 } else { 0.0 };
        identity - spherical
    });
    let nn = &normal * normal.transpose();
    let tangent_operator = elastic
        - &nn * (4.0 * mu * mu * h)
        - (deviatoric_projector * 1.5 - &nn) * (4.0 * mu * mu * dp / q);
    Some(NortonUpdate {
        stress,
        equivalent_strain_increment: dp,
        flow_direction: normal,
        tangent_operator,
    })
}

/// Norton viscoplasticity.
///
/// Material properties: `YoungModulus`, `PoissonRatio`, `NortonCoefficient`,
/// `NortonExponent`. Internal state variables: `EquivalentViscoplasticStrain` followed by the
/// `ViscoplasticStrain` tensor. The elastic stiffness is used as prediction, elastic and
/// secant operator; the consistent tangent operator is used otherwise.
///
/// # Safety
///
/// `data` must point to a valid data block, see [`GenericBehaviourData`].
pub unsafe extern "C-unwind" fn norton(data: *mut GenericBehaviourData) -> i32 {
    let mut call = GenericCall::from_raw(data);
    let n = call.size();
    let Some(parameters) = NortonParameters::from_slice(call.mprops) else {
        return crate::elasticity::INVALID_MATERIAL_PROPERTIES;
    };
    if call.iv0.len() != n + 1 {
        return crate::elasticity::INVALID_MATERIAL_PROPERTIES;
    }
    let elastic = parameters.elasticity.stiffness(n);
    if call.is_prediction() {
        call.set_stiffness(&elastic);
        return GENERIC_BEHAVIOUR_SUCCESS;
    }

    let p0 = call.iv0[0];
    let evp0 = DVectorView::from_slice(&call.iv0[1..], n).clone_owned();
    let e1 = DVectorView::from_slice(call.e1, n).clone_owned();
    let trial = &elastic * (&e1 - &evp0);
    let Some(update) = integrate(&parameters, &trial, call.dt) else {
        *call.rdt = FAILURE_TIME_STEP_SCALING;
        return LOCAL_NON_CONVERGENCE;
    };
    let devp = &update.flow_direction * update.equivalent_strain_increment;
    let evp1 = &evp0 + &devp;
    call.s1.copy_from_slice(update.stress.as_slice());
    call.iv1[0] = p0 + update.equivalent_strain_increment;
    call.iv1[1..].copy_from_slice(evp1.as_slice());
    *call.stored_energy = 0.5 * update.stress.dot(&(&e1 - &evp1));
    *call.dissipated_energy += update.stress.dot(&devp);
    match call.stiffness_type {
        0 => {}
        1 | 2 => call.set_stiffness(&elastic),
        _ => call.set_stiffness(&update.tangent_operator),
    }
    GENERIC_BEHAVIOUR_SUCCESS
}
