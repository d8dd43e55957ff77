//! Constitutive routines exposed through the native behaviour interfaces of `mtest`.
//!
//! The routines are plain `extern "C-unwind"` functions, as a behaviour library would export
//! them. [`library::static_loader`] registers all of them for use with a
//! [`BehaviourRegistry`](mtest::behaviour::BehaviourRegistry).
pub mod elasticity;
pub mod library;
pub mod materials;
pub mod norton;

mod interface;

pub use materials::{LameParameters, OrthotropicElasticParameters, YoungPoisson};
