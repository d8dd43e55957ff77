//! Driver for material point tests of constitutive behaviours.
//!
//! A [`PointStudy`](point_study::PointStudy) drives a single integration point of a
//! [`Behaviour`](behaviour::Behaviour) through a history of imposed strains and stresses,
//! solving for the unknown components with Newton-Raphson iterations.
pub mod behaviour;
pub mod constraint;
pub mod convention;
pub mod error;
pub mod evolution;
pub mod hypothesis;
pub mod options;
pub mod point_study;
pub mod solver;
pub mod state;
pub mod study;

pub mod optimize {
    pub use mtest_optimize::*;
}

pub extern crate nalgebra;
