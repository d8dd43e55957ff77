use matrixcompare::assert_scalar_eq;
use mtest::error::ConfigurationError;
use mtest::evolution::{ConstantEvolution, Evolution, EvolutionManager, FunctionEvolution, LPEvolution};
use proptest::prelude::*;
use std::rc::Rc;

#[test]
fn lp_evolution_interpolates_linearly() {
    let evolution = LPEvolution::new([(0.0, 0.0), (1.0, 10.0), (3.0, 0.0)]).unwrap();
    assert_scalar_eq!(evolution.value(0.5), 5.0, comp = float);
    assert_scalar_eq!(evolution.value(1.0), 10.0, comp = float);
    assert_scalar_eq!(evolution.value(2.0), 5.0, comp = float);
    assert_eq!(evolution.times(), &[0.0, 1.0, 3.0]);
    assert!(!evolution.is_constant());
}

#[test]
fn lp_evolution_is_constant_outside_of_its_range() {
    let evolution = LPEvolution::new([(1.0, 2.0), (2.0, 4.0)]).unwrap();
    assert_eq!(evolution.value(-5.0), 2.0);
    assert_eq!(evolution.value(100.0), 4.0);

    let single = LPEvolution::new([(1.0, 7.0)]).unwrap();
    assert_eq!(single.value(0.0), 7.0);
    assert_eq!(single.value(3.0), 7.0);
    assert!(single.is_constant());
}

#[test]
fn lp_evolution_rejects_invalid_points() {
    assert!(matches!(
        LPEvolution::new(Vec::<(f64, f64)>::new()),
        Err(ConfigurationError::InvalidEvolution(_))
    ));
    assert!(matches!(
        LPEvolution::new([(0.0, 1.0), (0.0, 2.0)]),
        Err(ConfigurationError::InvalidEvolution(_))
    ));
    assert!(matches!(
        LPEvolution::new([(1.0, 1.0), (0.0, 2.0)]),
        Err(ConfigurationError::InvalidEvolution(_))
    ));
    assert!(matches!(
        LPEvolution::new([(0.0, f64::NAN)]),
        Err(ConfigurationError::InvalidEvolution(_))
    ));
}

#[test]
fn constant_evolution_value_can_be_replaced() {
    let evolution = ConstantEvolution::new(3.0);
    assert!(evolution.is_constant());
    assert_eq!(evolution.value(12.0), 3.0);
    evolution.set_value(-1.0);
    assert_eq!(evolution.value(0.0), -1.0);
}

#[test]
fn function_evolution_evaluates_closure() {
    let evolution = FunctionEvolution::new(|t| 2.0 * t + 1.0);
    assert_eq!(evolution.value(3.0), 7.0);
    assert!(!evolution.is_constant());
}

#[test]
fn evolution_manager_stores_named_evolutions() {
    let mut manager = EvolutionManager::new();
    let handle = manager.add_constant("Temperature", 293.15).unwrap();
    manager.add_linear("YoungModulus", [(0.0, 100.0), (1.0, 200.0)]).unwrap();
    manager
        .add("PoissonRatio", Rc::new(ConstantEvolution::new(0.3)))
        .unwrap();

    assert!(manager.contains("Temperature"));
    assert!(!manager.contains("temperature"));

    let names = vec!["YoungModulus".to_string(), "Temperature".to_string()];
    assert_eq!(manager.evaluate(&names, 0.5).unwrap(), vec![150.0, 293.15]);

    // Replacing the value through the handle is visible to users of the manager
    handle.set_value(300.0);
    assert_eq!(manager.get("Temperature").unwrap().value(0.0), 300.0);
}

#[test]
fn evolution_manager_rejects_duplicate_and_unknown_names() {
    let mut manager = EvolutionManager::new();
    manager.add_constant("A", 1.0).unwrap();
    assert_eq!(
        manager.add_constant("A", 2.0).unwrap_err(),
        ConfigurationError::DuplicateEvolution("A".to_string())
    );
    assert_eq!(
        manager.get("B").unwrap_err(),
        ConfigurationError::UnknownEvolution("B".to_string())
    );
    let names = vec!["A".to_string(), "B".to_string()];
    assert!(manager.evaluate(&names, 0.0).is_err());
}

proptest! {
    #[test]
    fn lp_evolution_stays_within_bounds_of_its_values(
        values in proptest::collection::vec(-100.0..100.0, 2..8),
        t in -1.0..10.0
    ) {
        let points = values.iter().enumerate().map(|(i, v)| (i as f64, *v));
        let evolution = LPEvolution::new(points).unwrap();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let value = evolution.value(t);
        prop_assert!(value >= min - 1e-12 && value <= max + 1e-12);
    }
}
