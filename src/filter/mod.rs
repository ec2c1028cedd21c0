//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc bandpass / bandstop design.
//! - [`apply`]: overlap-add zero-phase convolution along the time axis.

pub mod apply;
pub mod design;

pub use apply::apply_fir_zero_phase;
pub use design::{design_bandpass, design_bandstop, firwin, hamming, numtaps};
