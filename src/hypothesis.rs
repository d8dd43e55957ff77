use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A geometric and kinematic simplification of the material point problem.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModellingHypothesis {
    AxisymmetricalGeneralisedPlaneStrain,
    Axisymmetrical,
    PlaneStrain,
    PlaneStress,
    GeneralisedPlaneStrain,
    Tridimensional,
}

const COMPONENTS_1D: [&str; 3] = ["XX", "YY", "ZZ"];
const COMPONENTS_2D: [&str; 4] = ["XX", "YY", "ZZ", "XY"];
const COMPONENTS_3D: [&str; 6] = ["XX", "YY", "ZZ", "XY", "XZ", "YZ"];

impl ModellingHypothesis {
    pub const ALL: [ModellingHypothesis; 6] = [
        ModellingHypothesis::AxisymmetricalGeneralisedPlaneStrain,
        ModellingHypothesis::Axisymmetrical,
        ModellingHypothesis::PlaneStrain,
        ModellingHypothesis::PlaneStress,
        ModellingHypothesis::GeneralisedPlaneStrain,
        ModellingHypothesis::Tridimensional,
    ];

    pub fn name(&self) -> &'static str {
        use ModellingHypothesis::*;
        match self {
            AxisymmetricalGeneralisedPlaneStrain => "AxisymmetricalGeneralisedPlaneStrain",
            Axisymmetrical => "Axisymmetrical",
            PlaneStrain => "PlaneStrain",
            PlaneStress => "PlaneStress",
            GeneralisedPlaneStrain => "GeneralisedPlaneStrain",
            Tridimensional => "Tridimensional",
        }
    }

    pub fn space_dimension(&self) -> usize {
        use ModellingHypothesis::*;
        match self {
            AxisymmetricalGeneralisedPlaneStrain => 1,
            Axisymmetrical | PlaneStrain | PlaneStress | GeneralisedPlaneStrain => 2,
            Tridimensional => 3,
        }
    }

    /// Number of components of a symmetric tensor.
    pub fn stensor_size(&self) -> usize {
        self.component_suffixes().len()
    }

    /// Component suffixes in storage order.
    pub fn component_suffixes(&self) -> &'static [&'static str] {
        match self.space_dimension() {
            1 => &COMPONENTS_1D,
            2 => &COMPONENTS_2D,
            _ => &COMPONENTS_3D,
        }
    }

    /// Names of the strain components, e.g. `EXX`.
    pub fn driving_variable_components(&self) -> Vec<String> {
        self.component_suffixes().iter().map(|c| format!("E{c}")).collect()
    }

    /// Names of the stress components, e.g. `SXX`.
    pub fn thermodynamic_force_components(&self) -> Vec<String> {
        self.component_suffixes().iter().map(|c| format!("S{c}")).collect()
    }

    /// Position of a strain component, given by name (`EXY`).
    pub fn driving_variable_component_position(&self, name: &str) -> Result<usize, ConfigurationError> {
        self.component_position(name, 'E')
    }

    /// Position of a stress component, given by name (`SXY`).
    pub fn thermodynamic_force_component_position(&self, name: &str) -> Result<usize, ConfigurationError> {
        self.component_position(name, 'S')
    }

    fn component_position(&self, name: &str, prefix: char) -> Result<usize, ConfigurationError> {
        name.strip_prefix(prefix)
            .and_then(|suffix| self.component_suffixes().iter().position(|c| *c == suffix))
            .ok_or_else(|| ConfigurationError::InvalidComponent {
                name: name.to_string(),
                hypothesis: *self,
            })
    }
}

impl fmt::Display for ModellingHypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModellingHypothesis {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|h| h.name() == s)
            .ok_or_else(|| ConfigurationError::UnknownHypothesis(s.to_string()))
    }
}
