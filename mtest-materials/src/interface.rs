//! Safe views over the arguments received by the native routines.
use mtest::behaviour::generic::GenericBehaviourData;
use mtest::nalgebra::{DMatrix, DVector, DVectorView};
use std::slice;

/// The generic data block, seen as slices.
pub(crate) struct GenericCall<'a> {
    pub dt: f64,
    pub stiffness_type: i32,
    pub e0: &'a [f64],
    pub e1: &'a [f64],
    pub s0: &'a [f64],
    pub s1: &'a mut [f64],
    pub mprops: &'a [f64],
    pub iv0: &'a [f64],
    pub iv1: &'a mut [f64],
    pub k: &'a mut [f64],
    pub stored_energy: &'a mut f64,
    pub dissipated_energy: &'a mut f64,
    pub rdt: &'a mut f64,
}

unsafe fn view<'a>(ptr: *const f64, len: usize) -> &'a [f64] {
    if len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, len)
    }
}

unsafe fn view_mut<'a>(ptr: *mut f64, len: usize) -> &'a mut [f64] {
    if len == 0 {
        &mut []
    } else {
        slice::from_raw_parts_mut(ptr, len)
    }
}

impl<'a> GenericCall<'a> {
    /// # Safety
    ///
    /// `data` must point to a valid data block whose buffers have the advertised sizes and
    /// whose output buffers do not alias any other buffer.
    pub unsafe fn from_raw(data: *mut GenericBehaviourData) -> GenericCall<'a> {
        let data = &mut *data;
        let n = data.ntens as usize;
        let nprops = data.nprops as usize;
        let nstatv = data.nstatv as usize;
        GenericCall {
            dt: data.dt,
            stiffness_type: data.stiffness_type,
            e0: view(data.gradients0, n),
            e1: view(data.gradients1, n),
            s0: view(data.thermodynamic_forces0, n),
            s1: view_mut(data.thermodynamic_forces1, n),
            mprops: view(data.material_properties, nprops),
            iv0: view(data.internal_state_variables0, nstatv),
            iv1: view_mut(data.internal_state_variables1, nstatv),
            k: view_mut(data.stiffness, n * n),
            stored_energy: &mut *data.stored_energy,
            dissipated_energy: &mut *data.dissipated_energy,
            rdt: &mut *data.rdt,
        }
    }

    pub fn size(&self) -> usize {
        self.e0.len()
    }

    /// Only the prediction operator is requested.
    pub fn is_prediction(&self) -> bool {
        self.stiffness_type < 0
    }

    pub fn is_stiffness_requested(&self) -> bool {
        self.stiffness_type != 0
    }

    pub fn strain_increment(&self) -> DVector<f64> {
        DVectorView::from_slice(self.e1, self.e1.len()) - DVectorView::from_slice(self.e0, self.e0.len())
    }

    /// Stores `k` row by row.
    pub fn set_stiffness(&mut self, k: &DMatrix<f64>) {
        let n = self.size();
        for i in 0..n {
            for j in 0..n {
                self.k[i * n + j] = k[(i, j)];
            }
        }
    }
}
