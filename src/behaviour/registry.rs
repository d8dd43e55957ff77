//! Resolution of behaviours from a library, a function name and an interface name.
use crate::behaviour::generic::{GenericBehaviour, GenericBehaviourFunction};
use crate::behaviour::umat::{UmatBehaviour, UmatFunction};
use crate::behaviour::{Behaviour, BehaviourDescription};
use crate::error::ConfigurationError;
use crate::hypothesis::ModellingHypothesis;
use eyre::{eyre, WrapErr};
use itertools::Itertools;
use log::info;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A native entry point, tagged with the interface it follows.
#[derive(Copy, Clone)]
pub enum EntryPoint {
    Generic(GenericBehaviourFunction),
    Umat(UmatFunction),
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::Generic(function) => write!(f, "Generic({:p})", *function as usize as *const ()),
            EntryPoint::Umat(function) => write!(f, "Umat({:p})", *function as usize as *const ()),
        }
    }
}

/// A behaviour as resolved by a [`BehaviourLoader`].
#[derive(Debug, Clone)]
pub struct ResolvedBehaviour {
    pub description: BehaviourDescription,
    pub entry_point: EntryPoint,
}

/// Resolves a function of a behaviour library for a modelling hypothesis.
///
/// Loading shared libraries and reading the metadata exported alongside each function is the
/// job of implementors.
pub trait BehaviourLoader {
    fn load(&self, library: &str, function: &str, hypothesis: ModellingHypothesis) -> eyre::Result<ResolvedBehaviour>;
}

/// A loader for routines linked into the executable.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    entries: HashMap<(String, String, ModellingHypothesis), ResolvedBehaviour>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, library: impl Into<String>, function: impl Into<String>, behaviour: ResolvedBehaviour) {
        let key = (library.into(), function.into(), behaviour.description.hypothesis);
        self.entries.insert(key, behaviour);
    }
}

impl BehaviourLoader for StaticLoader {
    fn load(&self, library: &str, function: &str, hypothesis: ModellingHypothesis) -> eyre::Result<ResolvedBehaviour> {
        self.entries
            .get(&(library.to_string(), function.to_string(), hypothesis))
            .cloned()
            .ok_or_else(|| eyre!("no function '{function}' for hypothesis '{hypothesis}' in library '{library}'"))
    }
}

pub type BehaviourConstructor = fn(ResolvedBehaviour) -> eyre::Result<Rc<dyn Behaviour>>;

fn make_generic_behaviour(resolved: ResolvedBehaviour) -> eyre::Result<Rc<dyn Behaviour>> {
    match resolved.entry_point {
        EntryPoint::Generic(function) => Ok(Rc::new(GenericBehaviour::new(resolved.description, function))),
        other => Err(eyre!("entry point {other:?} does not follow the generic interface")),
    }
}

fn make_umat_behaviour(resolved: ResolvedBehaviour) -> eyre::Result<Rc<dyn Behaviour>> {
    match resolved.entry_point {
        EntryPoint::Umat(function) => Ok(Rc::new(UmatBehaviour::new(resolved.description, function)?)),
        other => Err(eyre!("entry point {other:?} does not follow the umat interface")),
    }
}

/// Maps interface names to behaviour constructors.
///
/// The default registry knows the `generic` interface and the `umat` interface, the latter
/// also registered as `castem`.
#[derive(Clone)]
pub struct BehaviourRegistry {
    constructors: HashMap<String, BehaviourConstructor>,
}

impl fmt::Debug for BehaviourRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviourRegistry")
            .field("interfaces", &self.interfaces())
            .finish()
    }
}

impl Default for BehaviourRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("generic", make_generic_behaviour);
        registry.register("umat", make_umat_behaviour);
        registry.register("castem", make_umat_behaviour);
        registry
    }
}

impl BehaviourRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, interface: impl Into<String>, constructor: BehaviourConstructor) {
        self.constructors.insert(interface.into(), constructor);
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.constructors.keys().cloned().sorted().collect()
    }

    /// Resolves `function` in `library` with `loader` and wraps it in the adapter registered
    /// for `interface`.
    pub fn load(
        &self,
        interface: &str,
        loader: &dyn BehaviourLoader,
        library: &str,
        function: &str,
        hypothesis: ModellingHypothesis,
    ) -> eyre::Result<Rc<dyn Behaviour>> {
        let constructor = self
            .constructors
            .get(interface)
            .ok_or_else(|| ConfigurationError::UnknownInterface {
                name: interface.to_string(),
                known: self.interfaces(),
            })?;
        let resolved = loader
            .load(library, function, hypothesis)
            .wrap_err_with(|| format!("failed to load behaviour '{function}' from library '{library}'"))?;
        let behaviour = constructor(resolved)
            .wrap_err_with(|| format!("failed to build behaviour '{function}' with interface '{interface}'"))?;
        info!(
            "Loaded behaviour '{}' ({} interface, {} hypothesis)",
            function, interface, hypothesis
        );
        Ok(behaviour)
    }
}
