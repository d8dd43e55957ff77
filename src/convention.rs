//! Translations between the storage conventions of symmetric tensors.
//!
//! The solver stores symmetric tensors as vectors in the tensorial (Mandel) convention:
//! the off-diagonal components, stored at indices 3 and above, are scaled by $\sqrt{2}$.
//! Legacy behaviour interfaces use the engineering convention instead, where shear strains
//! are doubled ($\gamma_{ij} = 2 \varepsilon_{ij}$) and shear stresses are stored as is.
use crate::error::ConfigurationError;
use crate::hypothesis::ModellingHypothesis;
use nalgebra::{DMatrix, Matrix3};
use std::f64::consts::SQRT_2;

/// Scaling between the tensorial and the plain value of the component at index `i`.
pub fn shear_factor(i: usize) -> f64 {
    if i >= 3 {
        SQRT_2
    } else {
        1.0
    }
}

fn scale_shear_components(v: &mut [f64], factor: f64) {
    v.iter_mut().skip(3).for_each(|vi| *vi *= factor);
}

/// Converts strains from the tensorial convention to the engineering convention.
pub fn strains_to_engineering(e: &mut [f64]) {
    scale_shear_components(e, SQRT_2);
}

pub fn strains_from_engineering(e: &mut [f64]) {
    scale_shear_components(e, 1.0 / SQRT_2);
}

/// Converts stresses from the tensorial convention to the engineering convention.
pub fn stresses_to_engineering(s: &mut [f64]) {
    scale_shear_components(s, 1.0 / SQRT_2);
}

pub fn stresses_from_engineering(s: &mut [f64]) {
    scale_shear_components(s, SQRT_2);
}

/// Converts a tangent operator from the engineering convention to the tensorial convention.
///
/// Every shear row and every shear column is multiplied by $\sqrt{2}$, so that shear-shear
/// entries are doubled.
pub fn tangent_operator_from_engineering(k: &mut DMatrix<f64>) {
    scale_tangent_operator(k, SQRT_2);
}

pub fn tangent_operator_to_engineering(k: &mut DMatrix<f64>) {
    scale_tangent_operator(k, 1.0 / SQRT_2);
}

fn scale_tangent_operator(k: &mut DMatrix<f64>, factor: f64) {
    for i in 3..k.nrows() {
        k.row_mut(i).scale_mut(factor);
    }
    for j in 3..k.ncols() {
        k.column_mut(j).scale_mut(factor);
    }
}

/// Builds the symmetric matrix represented by a tensorial vector of size 3, 4 or 6.
pub fn stensor_to_matrix(v: &[f64]) -> Matrix3<f64> {
    let mut m = Matrix3::from_diagonal(&nalgebra::Vector3::new(v[0], v[1], v[2]));
    if v.len() >= 4 {
        m[(0, 1)] = v[3] / SQRT_2;
        m[(1, 0)] = v[3] / SQRT_2;
    }
    if v.len() >= 6 {
        m[(0, 2)] = v[4] / SQRT_2;
        m[(2, 0)] = v[4] / SQRT_2;
        m[(1, 2)] = v[5] / SQRT_2;
        m[(2, 1)] = v[5] / SQRT_2;
    }
    m
}

/// Stores the symmetric part of `m` in tensorial convention, using `out.len()` components.
pub fn matrix_to_stensor(m: &Matrix3<f64>, out: &mut [f64]) {
    out[0] = m[(0, 0)];
    out[1] = m[(1, 1)];
    out[2] = m[(2, 2)];
    if out.len() >= 4 {
        out[3] = SQRT_2 * 0.5 * (m[(0, 1)] + m[(1, 0)]);
    }
    if out.len() >= 6 {
        out[4] = SQRT_2 * 0.5 * (m[(0, 2)] + m[(2, 0)]);
        out[5] = SQRT_2 * 0.5 * (m[(1, 2)] + m[(2, 1)]);
    }
}

/// Applies $T \mapsto r T r^T$ to a symmetric tensor stored in tensorial convention.
///
/// Tensors of size 3 are left untouched. Tensors of size 4 are only meaningful for
/// rotations about the third axis.
pub fn rotate_stensor(r: &Matrix3<f64>, v: &mut [f64]) {
    if v.len() <= 3 {
        return;
    }
    let m = stensor_to_matrix(v);
    matrix_to_stensor(&(r * m * r.transpose()), v);
}

/// Expresses a symmetric tensor given in the global frame in the material frame.
///
/// Row $i$ of `r` holds the material axis $i$ expressed in the global frame.
pub fn rotate_to_material_frame(r: &Matrix3<f64>, v: &mut [f64]) {
    rotate_stensor(r, v);
}

/// Expresses a symmetric tensor given in the material frame in the global frame.
pub fn rotate_to_global_frame(r: &Matrix3<f64>, v: &mut [f64]) {
    rotate_stensor(&r.transpose(), v);
}

/// The matrix $Q$ such that rotating a tensorial vector $v$ of the given size yields $Q v$.
///
/// In the tensorial convention $Q$ is orthogonal.
pub fn stensor_rotation_matrix(r: &Matrix3<f64>, size: usize) -> DMatrix<f64> {
    let mut q = DMatrix::identity(size, size);
    if size <= 3 {
        return q;
    }
    let mut e = vec![0.0; size];
    for k in 0..size {
        e.iter_mut().for_each(|ei| *ei = 0.0);
        e[k] = 1.0;
        rotate_stensor(r, &mut e);
        q.column_mut(k).copy_from_slice(&e);
    }
    q
}

/// Rotates a tangent operator computed in the material frame to the global frame.
///
/// With $Q$ the tensorial rotation matrix associated with `r`, $K_g = Q^T K_m Q$.
pub fn rotate_tangent_operator_to_global_frame(r: &Matrix3<f64>, k: &mut DMatrix<f64>) {
    if k.nrows() <= 3 {
        return;
    }
    let q = stensor_rotation_matrix(r, k.nrows());
    let rotated = q.transpose() * &*k * &q;
    k.copy_from(&rotated);
}

pub fn rotate_tangent_operator_to_material_frame(r: &Matrix3<f64>, k: &mut DMatrix<f64>) {
    if k.nrows() <= 3 {
        return;
    }
    let q = stensor_rotation_matrix(r, k.nrows());
    let rotated = &q * &*k * q.transpose();
    k.copy_from(&rotated);
}

/// Checks that `r` is a rotation matrix compatible with the modelling hypothesis.
///
/// Columns must be orthonormal within a tolerance of $100 \epsilon$. For two dimensional
/// hypotheses, `r` must be a rotation about the third axis.
pub fn check_rotation_matrix(r: &Matrix3<f64>, hypothesis: ModellingHypothesis) -> Result<(), ConfigurationError> {
    let tolerance = 100.0 * f64::EPSILON;
    if r.iter().any(|v| !v.is_finite()) {
        return Err(ConfigurationError::InvalidRotationMatrix(
            "non-finite component".to_string(),
        ));
    }
    for i in 0..3 {
        for j in i..3 {
            let expected = if i == j { 1.0 } else { 0.0 };
            let dot = r.column(i).dot(&r.column(j));
            if (dot - expected).abs() > tolerance {
                return Err(ConfigurationError::InvalidRotationMatrix(format!(
                    "columns {i} and {j} are not orthonormal"
                )));
            }
        }
    }
    if hypothesis.space_dimension() == 2 {
        let off_plane = [r[(0, 2)], r[(1, 2)], r[(2, 0)], r[(2, 1)], r[(2, 2)] - 1.0];
        if off_plane.iter().any(|v| v.abs() > tolerance) {
            return Err(ConfigurationError::InvalidRotationMatrix(format!(
                "only rotations about the third axis are allowed for the '{hypothesis}' hypothesis"
            )));
        }
    }
    Ok(())
}

/// Marshals a rotation matrix for legacy interfaces.
///
/// The routine reads the buffer as a Fortran (column-major) array `DROT` and expects
/// `DROT(i, j) = r(j, i)`: the transposed matrix is stored, column by column.
pub fn rotation_matrix_to_fortran_order(r: &Matrix3<f64>) -> [f64; 9] {
    let mut drot = [0.0; 9];
    for i in 0..3 {
        for j in 0..3 {
            drot[i + 3 * j] = r[(j, i)];
        }
    }
    drot
}

/// Reads an `n x n` tangent operator from a Fortran (column-major) buffer.
pub fn tangent_operator_from_fortran_order(buffer: &[f64], n: usize) -> DMatrix<f64> {
    DMatrix::from_column_slice(n, n, &buffer[..n * n])
}

/// Stores a tangent operator in a Fortran (column-major) buffer.
pub fn tangent_operator_to_fortran_order(k: &DMatrix<f64>, buffer: &mut [f64]) {
    let n = k.nrows();
    for j in 0..k.ncols() {
        for i in 0..n {
            buffer[i + n * j] = k[(i, j)];
        }
    }
}
