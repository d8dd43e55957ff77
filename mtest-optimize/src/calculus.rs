use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};

/// Approximates the Jacobian of the function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$
/// with central finite differences.
///
/// The Jacobian matrix is the $m \times n$ matrix whose entries are given by
/// $$ J_{ij} := \pd{f_i}{x_j}.$$
///
/// The evaluation of `f` may fail, in which case the first error is returned.
pub fn try_approximate_jacobian_fd<E>(
    m: usize,
    f: impl FnMut(DVectorView<f64>, DVectorViewMut<f64>) -> Result<(), E>,
    x: &DVector<f64>,
    h: f64,
) -> Result<DMatrix<f64>, E> {
    let mut jacobian = DMatrix::zeros(m, x.len());
    try_approximate_jacobian_fd_into(DMatrixViewMut::from(&mut jacobian), f, x, h)?;
    Ok(jacobian)
}

/// Same as [`try_approximate_jacobian_fd`], but stores the result in the provided output matrix.
pub fn try_approximate_jacobian_fd_into<E>(
    mut j: DMatrixViewMut<f64>,
    mut f: impl FnMut(DVectorView<f64>, DVectorViewMut<f64>) -> Result<(), E>,
    x: &DVector<f64>,
    h: f64,
) -> Result<(), E> {
    let m = j.nrows();
    let n = x.len();
    assert_eq!(n, j.ncols());

    let mut x = x.clone();
    // Buffers to hold f(x + e_i h) and f(x - e_i h)
    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    for i in 0..n {
        // df_dxi ~ (f(x + h e_i) - f(x - h e_i)) / (2 h)
        let xi = x[i];
        x[i] = xi + h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_plus))?;
        x[i] = xi - h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus))?;
        x[i] = xi;

        let mut df_dxi = j.column_mut(i);
        df_dxi.copy_from(&f_plus);
        df_dxi -= &f_minus;
        df_dxi /= 2.0 * h;
    }
    Ok(())
}

/// Returns the largest absolute entry-wise difference between two matrices of equal shape.
pub fn max_abs_difference(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    assert_eq!(a.shape(), b.shape());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
