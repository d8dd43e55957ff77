//! Time-parametrized scalar signals.
use crate::error::ConfigurationError;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub trait Evolution: fmt::Debug {
    /// Value of the evolution at time `t`.
    fn value(&self, t: f64) -> f64;

    fn is_constant(&self) -> bool;
}

/// An evolution with a single value.
///
/// The value may be replaced between two solves, never while an iteration is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantEvolution {
    value: Cell<f64>,
}

impl ConstantEvolution {
    pub fn new(value: f64) -> Self {
        Self { value: Cell::new(value) }
    }

    pub fn set_value(&self, value: f64) {
        self.value.set(value);
    }
}

impl Evolution for ConstantEvolution {
    fn value(&self, _t: f64) -> f64 {
        self.value.get()
    }

    fn is_constant(&self) -> bool {
        true
    }
}

/// A piecewise linear evolution.
///
/// Outside of the range of times, the first or last value is used.
#[derive(Debug, Clone, PartialEq)]
pub struct LPEvolution {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl LPEvolution {
    /// Builds the evolution from `(time, value)` pairs given in strictly increasing time order.
    pub fn new(points: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, ConfigurationError> {
        let (times, values): (Vec<_>, Vec<_>) = points.into_iter().unzip();
        if times.is_empty() {
            return Err(ConfigurationError::InvalidEvolution(
                "a piecewise linear evolution needs at least one point".to_string(),
            ));
        }
        if times.iter().chain(values.iter()).any(|v| !v.is_finite()) {
            return Err(ConfigurationError::InvalidEvolution("non-finite value".to_string()));
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ConfigurationError::InvalidEvolution(
                "times must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { times, values })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }
}

impl Evolution for LPEvolution {
    fn value(&self, t: f64) -> f64 {
        let n = self.times.len();
        if n == 1 || t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[n - 1] {
            return self.values[n - 1];
        }
        // First index with times[i] > t, within 1..n
        let i = self.times.partition_point(|&ti| ti <= t);
        let (t0, t1) = (self.times[i - 1], self.times[i]);
        let (v0, v1) = (self.values[i - 1], self.values[i]);
        v0 + (v1 - v0) * (t - t0) / (t1 - t0)
    }

    fn is_constant(&self) -> bool {
        self.values.windows(2).all(|w| w[0] == w[1])
    }
}

/// An evolution computed by an external function of time.
pub struct FunctionEvolution {
    function: Box<dyn Fn(f64) -> f64>,
}

impl FunctionEvolution {
    pub fn new(function: impl Fn(f64) -> f64 + 'static) -> Self {
        Self {
            function: Box::new(function),
        }
    }
}

impl fmt::Debug for FunctionEvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEvolution").finish_non_exhaustive()
    }
}

impl Evolution for FunctionEvolution {
    fn value(&self, t: f64) -> f64 {
        (self.function)(t)
    }

    fn is_constant(&self) -> bool {
        false
    }
}

/// Named evolutions shared by a study and its constraints.
#[derive(Debug, Clone, Default)]
pub struct EvolutionManager {
    evolutions: HashMap<String, Rc<dyn Evolution>>,
}

impl EvolutionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, evolution: Rc<dyn Evolution>) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.evolutions.contains_key(&name) {
            return Err(ConfigurationError::DuplicateEvolution(name));
        }
        self.evolutions.insert(name, evolution);
        Ok(())
    }

    /// Adds a constant evolution and returns a handle which allows replacing its value.
    pub fn add_constant(
        &mut self,
        name: impl Into<String>,
        value: f64,
    ) -> Result<Rc<ConstantEvolution>, ConfigurationError> {
        let evolution = Rc::new(ConstantEvolution::new(value));
        self.add(name, evolution.clone())?;
        Ok(evolution)
    }

    pub fn add_linear(
        &mut self,
        name: impl Into<String>,
        points: impl IntoIterator<Item = (f64, f64)>,
    ) -> Result<(), ConfigurationError> {
        self.add(name, Rc::new(LPEvolution::new(points)?))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.evolutions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Rc<dyn Evolution>, ConfigurationError> {
        self.evolutions
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownEvolution(name.to_string()))
    }

    /// Evaluates the named evolutions at time `t`, in order.
    pub fn evaluate<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
        t: f64,
    ) -> Result<Vec<f64>, ConfigurationError> {
        names
            .into_iter()
            .map(|name| self.get(name).map(|ev| ev.value(t)))
            .collect()
    }
}
