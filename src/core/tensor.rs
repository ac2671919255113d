use ndarray::Array4;
use num_complex::Complex32;

use crate::{
    core::dsp::ComplexSpectrogram,
    error::{Result, StemError},
};

/// Frequency bins the model sees; the Nyquist bin is never fed or predicted.
pub const MODEL_BINS: usize = 3072;
/// Time frames per model call.
pub const SEGMENT_FRAMES: usize = 256;
pub const TENSOR_SHAPE: [usize; 4] = [1, 4, MODEL_BINS, SEGMENT_FRAMES];

/// `[1, 4, 3072, 256]`, channels L.re, L.im, R.re, R.im.
pub type TensorFrame = Array4<f32>;

const L_RE: usize = 0;
const L_IM: usize = 1;
const R_RE: usize = 2;
const R_IM: usize = 3;

/// Number of 256-frame segments once `frames` is zero-padded to a multiple
/// of 256 (never fewer than one).
pub fn segment_count(frames: usize) -> usize {
    frames.div_ceil(SEGMENT_FRAMES).max(1)
}

pub fn check_shape(tensor: &TensorFrame) -> Result<()> {
    if tensor.shape() != TENSOR_SHAPE {
        return Err(StemError::Inference(format!(
            "tensor shape {:?}, expected {:?}",
            tensor.shape(),
            TENSOR_SHAPE
        )));
    }
    Ok(())
}

/// Pack frames `start..start + 256` of both channels. Frames past the end of
/// the spectrogram are left at zero.
pub fn pack_segment(
    left: &ComplexSpectrogram,
    right: &ComplexSpectrogram,
    start: usize,
) -> TensorFrame {
    let mut tensor = TensorFrame::zeros(TENSOR_SHAPE);
    let frames = left.num_frames().min(right.num_frames());
    let end = (start + SEGMENT_FRAMES).min(frames);

    for fr in start..end {
        let t = fr - start;
        let l = left.frame(fr);
        let r = right.frame(fr);
        for f in 0..MODEL_BINS {
            tensor[[0, L_RE, f, t]] = l[f].re;
            tensor[[0, L_IM, f, t]] = l[f].im;
            tensor[[0, R_RE, f, t]] = r[f].re;
            tensor[[0, R_IM, f, t]] = r[f].im;
        }
    }
    tensor
}

/// Write a model response back into frames `start..` of the output
/// spectrograms. Frames past their end are dropped; the Nyquist column is
/// not touched.
pub fn unpack_segment(
    tensor: &TensorFrame,
    left: &mut ComplexSpectrogram,
    right: &mut ComplexSpectrogram,
    start: usize,
) {
    let frames = left.num_frames().min(right.num_frames());
    let end = (start + SEGMENT_FRAMES).min(frames);

    for fr in start..end {
        let t = fr - start;
        for f in 0..MODEL_BINS {
            left.bins[[fr, f]] = Complex32::new(tensor[[0, L_RE, f, t]], tensor[[0, L_IM, f, t]]);
            right.bins[[fr, f]] = Complex32::new(tensor[[0, R_RE, f, t]], tensor[[0, R_IM, f, t]]);
        }
    }
}
