//! Common average reference: subtract the mean across channels at each
//! time point.
//!
//! `data`: [T, C]  →  `data[t, c] -= mean(data[t, :])`
use ndarray::{Array2, Axis};

pub fn average_reference_inplace(data: &mut Array2<f64>) {
    let Some(means) = data.mean_axis(Axis(1)) else {
        return;
    };
    for mut col in data.columns_mut() {
        col -= &means;
    }
}
