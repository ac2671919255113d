use ndarray::{Array2, ArrayView1};
use num_complex::Complex32;
use once_cell::sync::Lazy;

use crate::core::fft::{self, FFT_SIZE};

pub const HOP_LENGTH: usize = 1024;
/// Non-negative frequency bins of a real 6144-point transform.
pub const NUM_BINS: usize = FFT_SIZE / 2 + 1; // 3073
/// Center padding applied around each chunk before analysis.
pub const CENTER_PAD: usize = FFT_SIZE / 2;

const ENERGY_FLOOR: f32 = 1e-8;

static HANN_WINDOW: Lazy<Vec<f32>> = Lazy::new(|| compute_hann(FFT_SIZE));

/// Periodic Hann window, `0.5·(1 − cos(2π·i/n))`.
fn compute_hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            (0.5 * (1.0 - phase.cos())) as f32
        })
        .collect()
}

pub fn hann_window() -> &'static [f32] {
    &HANN_WINDOW
}

/// Complex STFT of one channel: rows are frames, columns are bins 0..=3072.
#[derive(Clone, Debug)]
pub struct ComplexSpectrogram {
    pub bins: Array2<Complex32>,
}

impl ComplexSpectrogram {
    pub fn zeros(frames: usize) -> Self {
        Self {
            bins: Array2::zeros((frames, NUM_BINS)),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.bins.nrows()
    }

    pub fn frame(&self, index: usize) -> ArrayView1<'_, Complex32> {
        self.bins.row(index)
    }
}

/// Deinterleave to `[L, R]` pairs. Mono is duplicated; channels past the
/// second are dropped.
pub fn to_planar_stereo(interleaved: &[f32], channels: u16) -> Vec<[f32; 2]> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.iter().map(|&x| [x, x]).collect(),
        n => interleaved
            .chunks_exact(n as usize)
            .map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

pub fn frame_count(len: usize) -> usize {
    if len < FFT_SIZE {
        0
    } else {
        (len - FFT_SIZE) / HOP_LENGTH + 1
    }
}

/// Surround `signal` with `pad` zeros on each side.
pub fn pad_center(signal: &[f32], pad: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; signal.len() + 2 * pad];
    out[pad..pad + signal.len()].copy_from_slice(signal);
    out
}

/// Inverse of [`pad_center`]: keep `len` samples starting at `pad`.
pub fn trim_center(mut padded: Vec<f32>, pad: usize, len: usize) -> Vec<f32> {
    padded.truncate(pad + len);
    padded.drain(..pad.min(padded.len()));
    padded.resize(len, 0.0);
    padded
}

/// Hann-windowed STFT at hop 1024, starting at sample 0.
pub fn stft(signal: &[f32]) -> ComplexSpectrogram {
    let window = hann_window();
    let frames = frame_count(signal.len());
    let mut spec = ComplexSpectrogram::zeros(frames);
    let mut buf = vec![Complex32::new(0.0, 0.0); FFT_SIZE];

    for (fr, mut row) in spec.bins.outer_iter_mut().enumerate() {
        let start = fr * HOP_LENGTH;
        for (i, slot) in buf.iter_mut().enumerate() {
            let x = signal.get(start + i).copied().unwrap_or(0.0);
            *slot = Complex32::new(x * window[i], 0.0);
        }

        fft::forward_in_place(&mut buf);

        for (dst, src) in row.iter_mut().zip(&buf[..NUM_BINS]) {
            *dst = *src;
        }
    }

    spec
}

/// Overlap-add inverse STFT normalised by accumulated window energy.
/// Samples whose energy stays below 1e-8 are left unnormalised.
pub fn istft(spec: &ComplexSpectrogram, output_len: usize) -> Vec<f32> {
    let window = hann_window();
    let mut out = vec![0.0f32; output_len];
    let mut energy = vec![0.0f32; output_len];
    let mut buf = vec![Complex32::new(0.0, 0.0); FFT_SIZE];

    for (fr, row) in spec.bins.outer_iter().enumerate() {
        for (dst, src) in buf[..NUM_BINS].iter_mut().zip(row.iter()) {
            *dst = *src;
        }
        // DC and Nyquist are real under conjugate symmetry
        buf[0].im = 0.0;
        buf[NUM_BINS - 1].im = 0.0;
        for k in 1..NUM_BINS - 1 {
            buf[FFT_SIZE - k] = buf[k].conj();
        }

        fft::inverse_in_place(&mut buf);

        let start = fr * HOP_LENGTH;
        if start >= output_len {
            continue;
        }
        let span = (output_len - start).min(FFT_SIZE);
        for i in 0..span {
            let w = window[i];
            out[start + i] += buf[i].re * w;
            energy[start + i] += w * w;
        }
    }

    for (sample, &e) in out.iter_mut().zip(&energy) {
        if e > ENERGY_FLOOR {
            *sample /= e;
        }
    }

    out
}
