//! Constitutive behaviours and the adapters calling native integrators.
use crate::error::{ConfigurationError, IntegrationFailure};
use crate::evolution::EvolutionManager;
use crate::hypothesis::ModellingHypothesis;
use crate::state::{BehaviourWorkSpace, CurrentState};
use crate::convention::rotate_tangent_operator_to_global_frame;
use nalgebra::{DMatrix, Matrix3};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub mod generic;
pub mod registry;
pub mod umat;

pub use generic::GenericBehaviour;
pub use registry::{BehaviourLoader, BehaviourRegistry, EntryPoint, ResolvedBehaviour, StaticLoader};
pub use umat::UmatBehaviour;

/// The kind of stiffness matrix requested from a behaviour.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StiffnessMatrixType {
    NoStiffness,
    Elastic,
    /// Elastic stiffness built from the elastic material properties, without calling the
    /// native routine. See [`elastic_stiffness_from_material_properties`].
    ElasticFromMaterialProperties,
    SecantOperator,
    TangentOperator,
    ConsistentTangentOperator,
}

impl StiffnessMatrixType {
    /// Code passed to native routines. Prediction operators use the negated code.
    pub fn native_code(&self) -> i32 {
        match self {
            StiffnessMatrixType::NoStiffness | StiffnessMatrixType::ElasticFromMaterialProperties => 0,
            StiffnessMatrixType::Elastic => 1,
            StiffnessMatrixType::SecantOperator => 2,
            StiffnessMatrixType::TangentOperator => 3,
            StiffnessMatrixType::ConsistentTangentOperator => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symmetry {
    Isotropic,
    Orthotropic,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Scalar,
    /// A symmetric tensor, stored in tensorial convention.
    Stensor,
}

impl VariableType {
    pub fn size(&self, hypothesis: ModellingHypothesis) -> usize {
        match self {
            VariableType::Scalar => 1,
            VariableType::Stensor => hypothesis.stensor_size(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableDescription {
    pub name: String,
    pub variable_type: VariableType,
}

impl VariableDescription {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable_type: VariableType::Scalar,
        }
    }

    pub fn stensor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable_type: VariableType::Stensor,
        }
    }
}

/// Everything the solver needs to know about a behaviour, besides its entry point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviourDescription {
    pub name: String,
    pub hypothesis: ModellingHypothesis,
    pub symmetry: Symmetry,
    pub material_properties: Vec<String>,
    /// Material properties with a default value, used when the study gives none.
    pub optional_material_properties: Vec<(String, f64)>,
    pub internal_state_variables: Vec<VariableDescription>,
    pub external_state_variables: Vec<String>,
}

impl BehaviourDescription {
    pub fn new(name: impl Into<String>, hypothesis: ModellingHypothesis) -> Self {
        Self {
            name: name.into(),
            hypothesis,
            symmetry: Symmetry::Isotropic,
            material_properties: Vec::new(),
            optional_material_properties: Vec::new(),
            internal_state_variables: Vec::new(),
            external_state_variables: Vec::new(),
        }
    }

    pub fn with_symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn with_material_properties<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.material_properties = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_optional_material_property(mut self, name: impl Into<String>, default_value: f64) -> Self {
        self.optional_material_properties
            .push((name.into(), default_value));
        self
    }

    pub fn with_internal_state_variables(mut self, variables: impl IntoIterator<Item = VariableDescription>) -> Self {
        self.internal_state_variables = variables.into_iter().collect();
        self
    }

    pub fn with_external_state_variables<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.external_state_variables = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn internal_state_variables_size(&self) -> usize {
        self.internal_state_variables
            .iter()
            .map(|v| v.variable_type.size(self.hypothesis))
            .sum()
    }

    /// Names of the internal state variables, one per component.
    ///
    /// Symmetric tensors are expanded with the component suffixes of the hypothesis,
    /// e.g. `ViscoplasticStrainXX`.
    pub fn expanded_internal_state_variable_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for v in &self.internal_state_variables {
            match v.variable_type {
                VariableType::Scalar => names.push(v.name.clone()),
                VariableType::Stensor => names.extend(
                    self.hypothesis
                        .component_suffixes()
                        .iter()
                        .map(|c| format!("{}{}", v.name, c)),
                ),
            }
        }
        names
    }

    pub fn material_property_position(&self, name: &str) -> Option<usize> {
        self.material_properties.iter().position(|n| n == name)
    }

    pub fn external_state_variable_position(&self, name: &str) -> Option<usize> {
        self.external_state_variables.iter().position(|n| n == name)
    }
}

/// A constitutive behaviour, bound to a modelling hypothesis.
///
/// Driving variables (strains) and thermodynamic forces (stresses) are exchanged in the
/// tensorial convention and in the global frame. Adapters translate to whatever their native
/// routine expects.
pub trait Behaviour: fmt::Debug {
    fn description(&self) -> &BehaviourDescription;

    fn hypothesis(&self) -> ModellingHypothesis {
        self.description().hypothesis
    }

    fn symmetry(&self) -> Symmetry {
        self.description().symmetry
    }

    fn driving_variables_size(&self) -> usize {
        self.hypothesis().stensor_size()
    }

    fn thermodynamic_forces_size(&self) -> usize {
        self.hypothesis().stensor_size()
    }

    fn driving_variables_components(&self) -> Vec<String> {
        self.hypothesis().driving_variable_components()
    }

    fn thermodynamic_forces_components(&self) -> Vec<String> {
        self.hypothesis().thermodynamic_force_components()
    }

    fn material_properties(&self) -> &[String] {
        &self.description().material_properties
    }

    fn internal_state_variables_size(&self) -> usize {
        self.description().internal_state_variables_size()
    }

    fn external_state_variables(&self) -> &[String] {
        &self.description().external_state_variables
    }

    fn default_stiffness_matrix_type(&self) -> StiffnessMatrixType {
        StiffnessMatrixType::ConsistentTangentOperator
    }

    /// Declares constant evolutions for the optional material properties the study left unset.
    fn set_optional_material_properties_default_values(
        &self,
        evolutions: &mut EvolutionManager,
    ) -> Result<(), ConfigurationError> {
        for (name, value) in &self.description().optional_material_properties {
            if !evolutions.contains(name) {
                evolutions.add_constant(name.clone(), *value)?;
            }
        }
        Ok(())
    }

    /// Allocates the state of one integration point and the associated workspace.
    fn allocate(&self) -> (CurrentState, BehaviourWorkSpace) {
        let state = CurrentState::new(
            self.driving_variables_size(),
            self.thermodynamic_forces_size(),
            self.material_properties().len(),
            self.internal_state_variables_size(),
            self.external_state_variables().len(),
        );
        let workspace = BehaviourWorkSpace::new(self.driving_variables_size(), self.thermodynamic_forces_size());
        (state, workspace)
    }

    /// Computes the prediction operator at the beginning of the time step into `workspace.kt`.
    ///
    /// The state is not modified.
    fn compute_prediction_operator(
        &self,
        workspace: &mut BehaviourWorkSpace,
        state: &CurrentState,
        smt: StiffnessMatrixType,
    ) -> Result<(), IntegrationFailure>;

    /// Integrates the behaviour over a time step of length `dt`.
    ///
    /// On success, `s1`, `iv1` and the energies of the state are updated, the tangent operator
    /// of type `smt` is stored in `workspace.k`, and the time step scaling factor proposed by
    /// the behaviour is returned. A factor below one asks for a smaller time step; an
    /// infinite factor means the behaviour has no opinion. On failure, the state is left
    /// untouched.
    fn integrate(
        &self,
        state: &mut CurrentState,
        workspace: &mut BehaviourWorkSpace,
        dt: f64,
        smt: StiffnessMatrixType,
    ) -> Result<f64, IntegrationFailure>;
}

/// Isotropic elastic stiffness in tensorial convention, of size `n x n`.
pub fn isotropic_elastic_stiffness(young: f64, poisson: f64, n: usize) -> DMatrix<f64> {
    let mu = young / (2.0 * (1.0 + poisson));
    let lambda = young * poisson / ((1.0 + poisson) * (1.0 - 2.0 * poisson));
    let mut k = DMatrix::zeros(n, n);
    for i in 0..n.min(3) {
        for j in 0..n.min(3) {
            k[(i, j)] = lambda;
        }
    }
    for i in 0..n {
        k[(i, i)] += 2.0 * mu;
    }
    k
}

/// Orthotropic elastic stiffness in tensorial convention and in the material frame, of size
/// `n x n`.
///
/// `poisson` holds $\nu_{12}$, $\nu_{23}$, $\nu_{13}$ and `shear` holds $G_{12}$, $G_{23}$,
/// $G_{13}$. Returns `None` if the compliance of the normal components is singular.
pub fn orthotropic_elastic_stiffness(
    young: [f64; 3],
    poisson: [f64; 3],
    shear: [f64; 3],
    n: usize,
) -> Option<DMatrix<f64>> {
    let [e1, e2, e3] = young;
    let [nu12, nu23, nu13] = poisson;
    #[rustfmt::skip]
    let compliance = Matrix3::new(
        1.0 / e1, -nu12 / e1, -nu13 / e1,
        -nu12 / e1, 1.0 / e2, -nu23 / e2,
        -nu13 / e1, -nu23 / e2, 1.0 / e3,
    );
    let normal = compliance.try_inverse()?;
    let [g12, g23, g13] = shear;
    // Shear components are stored in the order XY, XZ, YZ
    let shear = [g12, g13, g23];
    let mut k = DMatrix::zeros(n, n);
    let m = n.min(3);
    k.view_mut((0, 0), (m, m))
        .copy_from(&normal.view((0, 0), (m, m)));
    for i in 3..n {
        k[(i, i)] = 2.0 * shear[i - 3];
    }
    Some(k)
}

const ORTHOTROPIC_ELASTIC_PROPERTIES: [&str; 9] = [
    "YoungModulus1",
    "YoungModulus2",
    "YoungModulus3",
    "PoissonRatio12",
    "PoissonRatio23",
    "PoissonRatio13",
    "ShearModulus12",
    "ShearModulus23",
    "ShearModulus13",
];

fn material_properties_by_name<const N: usize>(
    description: &BehaviourDescription,
    mprops: &[f64],
    names: [&str; N],
) -> Result<[f64; N], IntegrationFailure> {
    let mut values = [0.0; N];
    for (value, name) in values.iter_mut().zip(names) {
        let position = description
            .material_property_position(name)
            .filter(|&i| i < mprops.len())
            .ok_or_else(|| {
                IntegrationFailure::Unsupported(format!(
                    "behaviour '{}' does not declare the '{}' material property",
                    description.name, name
                ))
            })?;
        *value = mprops[position];
    }
    Ok(values)
}

/// Builds the elastic stiffness of a behaviour from its material properties at the end of
/// the time step.
///
/// Isotropic behaviours must declare `YoungModulus` and `PoissonRatio`. Orthotropic
/// behaviours must declare `YoungModulus1`, `YoungModulus2`, `YoungModulus3`,
/// `PoissonRatio12`, `PoissonRatio23`, `PoissonRatio13`, `ShearModulus12`, `ShearModulus23`
/// and `ShearModulus13`; their stiffness is rotated from the material frame to the global
/// frame with the rotation matrix of the state.
pub fn elastic_stiffness_from_material_properties(
    description: &BehaviourDescription,
    state: &CurrentState,
) -> Result<DMatrix<f64>, IntegrationFailure> {
    let n = description.hypothesis.stensor_size();
    let mprops = state.mprops1.as_slice();
    match description.symmetry {
        Symmetry::Isotropic => {
            let [young, poisson] = material_properties_by_name(description, mprops, ["YoungModulus", "PoissonRatio"])?;
            Ok(isotropic_elastic_stiffness(young, poisson, n))
        }
        Symmetry::Orthotropic => {
            let p = material_properties_by_name(description, mprops, ORTHOTROPIC_ELASTIC_PROPERTIES)?;
            let mut k = orthotropic_elastic_stiffness([p[0], p[1], p[2]], [p[3], p[4], p[5]], [p[6], p[7], p[8]], n)
                .ok_or_else(|| {
                    IntegrationFailure::Unsupported(format!(
                        "the orthotropic elastic constants of behaviour '{}' are singular",
                        description.name
                    ))
                })?;
            rotate_tangent_operator_to_global_frame(&state.r, &mut k);
            Ok(k)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "native routine unwound".to_string()
    }
}

/// Calls a native routine, turning an unwinding foreign call into an [`IntegrationFailure`].
pub(crate) fn call_native(call: impl FnOnce() -> i32) -> Result<i32, IntegrationFailure> {
    catch_unwind(AssertUnwindSafe(call)).map_err(|payload| IntegrationFailure::Unwound(panic_message(&*payload)))
}

pub(crate) fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}
