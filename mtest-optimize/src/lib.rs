/// Convergence acceleration algorithms for Newton-Raphson iterations
pub mod acceleration;
/// Numerical differentiation helpers
pub mod calculus;
