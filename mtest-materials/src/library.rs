//! Descriptions of the routines of this crate, as a behaviour library would export them.
use crate::elasticity::{isotropic_elasticity, orthotropic_elasticity, umat_isotropic_elasticity};
use crate::norton::norton;
use mtest::behaviour::{
    BehaviourDescription, EntryPoint, ResolvedBehaviour, StaticLoader, Symmetry, VariableDescription,
};
use mtest::hypothesis::ModellingHypothesis;

/// Name under which the routines are registered.
pub const LIBRARY: &str = "libMTestMaterials";

pub const ISOTROPIC_ELASTICITY: &str = "IsotropicElasticity";
pub const ORTHOTROPIC_ELASTICITY: &str = "OrthotropicElasticity";
pub const NORTON: &str = "Norton";
pub const UMAT_ISOTROPIC_ELASTICITY: &str = "umatisotropicelasticity";

pub fn isotropic_elasticity_behaviour(hypothesis: ModellingHypothesis) -> ResolvedBehaviour {
    ResolvedBehaviour {
        description: BehaviourDescription::new(ISOTROPIC_ELASTICITY, hypothesis)
            .with_material_properties(["YoungModulus", "PoissonRatio"])
            .with_external_state_variables(["Temperature"]),
        entry_point: EntryPoint::Generic(isotropic_elasticity),
    }
}

pub fn orthotropic_elasticity_behaviour(hypothesis: ModellingHypothesis) -> ResolvedBehaviour {
    ResolvedBehaviour {
        description: BehaviourDescription::new(ORTHOTROPIC_ELASTICITY, hypothesis)
            .with_symmetry(Symmetry::Orthotropic)
            .with_material_properties([
                "YoungModulus1",
                "YoungModulus2",
                "YoungModulus3",
                "PoissonRatio12",
                "PoissonRatio23",
                "PoissonRatio13",
                "ShearModulus12",
                "ShearModulus23",
                "ShearModulus13",
            ])
            .with_external_state_variables(["Temperature"]),
        entry_point: EntryPoint::Generic(orthotropic_elasticity),
    }
}

/// The Norton coefficient defaults to zero, which makes the behaviour elastic.
pub fn norton_behaviour(hypothesis: ModellingHypothesis) -> ResolvedBehaviour {
    ResolvedBehaviour {
        description: BehaviourDescription::new(NORTON, hypothesis)
            .with_material_properties(["YoungModulus", "PoissonRatio", "NortonCoefficient", "NortonExponent"])
            .with_optional_material_property("NortonCoefficient", 0.0)
            .with_optional_material_property("NortonExponent", 1.0)
            .with_internal_state_variables([
                VariableDescription::scalar("EquivalentViscoplasticStrain"),
                VariableDescription::stensor("ViscoplasticStrain"),
            ])
            .with_external_state_variables(["Temperature"]),
        entry_point: EntryPoint::Generic(norton),
    }
}

pub fn umat_isotropic_elasticity_behaviour(hypothesis: ModellingHypothesis) -> ResolvedBehaviour {
    ResolvedBehaviour {
        description: BehaviourDescription::new(UMAT_ISOTROPIC_ELASTICITY, hypothesis)
            .with_material_properties(["YoungModulus", "PoissonRatio"])
            .with_external_state_variables(["Temperature"]),
        entry_point: EntryPoint::Umat(umat_isotropic_elasticity),
    }
}

/// Registers every routine of this crate under [`LIBRARY`], for every modelling hypothesis.
pub fn register(loader: &mut StaticLoader) {
    let behaviours: [(&str, fn(ModellingHypothesis) -> ResolvedBehaviour); 4] = [
        (ISOTROPIC_ELASTICITY, isotropic_elasticity_behaviour),
        (ORTHOTROPIC_ELASTICITY, orthotropic_elasticity_behaviour),
        (NORTON, norton_behaviour),
        (UMAT_ISOTROPIC_ELASTICITY, umat_isotropic_elasticity_behaviour),
    ];
    for hypothesis in ModellingHypothesis::ALL {
        for (function, behaviour) in behaviours {
            loader.register(LIBRARY, function, behaviour(hypothesis));
        }
    }
}

pub fn static_loader() -> StaticLoader {
    let mut loader = StaticLoader::new();
    register(&mut loader);
    loader
}
