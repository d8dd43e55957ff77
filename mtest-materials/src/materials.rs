use mtest::behaviour::orthotropic_elastic_stiffness;
use mtest::nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LameParameters {
    pub mu: f64,
    pub lambda: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YoungPoisson {
    pub young: f64,
    pub poisson: f64,
}

impl From<YoungPoisson> for LameParameters {
    fn from(params: YoungPoisson) -> Self {
        let YoungPoisson { young, poisson } = params;
        let mu = 0.5 * young / (1.0 + poisson);
        let lambda = 2.0 * mu * poisson / (1.0 - 2.0 * poisson);
        Self { mu, lambda }
    }
}

impl LameParameters {
    /// The isotropic elastic stiffness for symmetric tensors of size `n`, in tensorial
    /// convention:
    /// $$
    /// \vec \sigma = 2 \mu \vec \epsilon + \lambda \operatorname{tr}(\vec \epsilon) \vec I.
    /// $$
    pub fn stiffness(&self, n: usize) -> DMatrix<f64> {
        let LameParameters { mu, lambda } = *self;
        DMatrix::from_fn(n, n, |i, j| {
            let volumetric = if i < 3 && j < 3 { lambda } else { 0.0 };
            let deviatoric = if i == j { 2.0 * mu } else { 0.0 };
            volumetric + deviatoric
        })
    }

    /// Same as [`LameParameters::stiffness`], in engineering convention.
    pub fn engineering_stiffness(&self, n: usize) -> DMatrix<f64> {
        let mut k = self.stiffness(n);
        for i in 3..n {
            k[(i, i)] = self.mu;
        }
        k
    }
}

/// Elastic constants of an orthotropic material, in the material frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrthotropicElasticParameters {
    pub young: [f64; 3],
    /// $\nu_{12}$, $\nu_{23}$ and $\nu_{13}$.
    pub poisson: [f64; 3],
    /// $G_{12}$, $G_{23}$ and $G_{13}$.
    pub shear: [f64; 3],
}

impl OrthotropicElasticParameters {
    /// Reads the parameters in the order `E1 E2 E3 nu12 nu23 nu13 G12 G23 G13`.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match *values {
            [e1, e2, e3, nu12, nu23, nu13, g12, g23, g13, ..] => Some(Self {
                young: [e1, e2, e3],
                poisson: [nu12, nu23, nu13],
                shear: [g12, g23, g13],
            }),
            _ => None,
        }
    }

    /// The stiffness for symmetric tensors of size `n`, in tensorial convention.
    ///
    /// Returns `None` if the normal compliance block is singular.
    pub fn stiffness(&self, n: usize) -> Option<DMatrix<f64>> {
        orthotropic_elastic_stiffness(self.young, self.poisson, self.shear, n)
    }
}
