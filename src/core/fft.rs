//! Fixed-size 6144-point FFT.
//!
//! 6144 = 3 × 2048: the input is decimated into three interleaved
//! subsequences, each transformed by an iterative radix-2 FFT, and the
//! results are recombined with `W_6144` twiddles and a 3-point DFT.
//! Forward angles follow the `-2π·k/N` convention.

use num_complex::Complex32;
use once_cell::sync::Lazy;

pub const FFT_SIZE: usize = 6144;

const RADIX: usize = 3;
const SUB_LEN: usize = FFT_SIZE / RADIX; // 2048
const SUB_BITS: u32 = SUB_LEN.trailing_zeros();

struct Plan {
    bit_reverse: Vec<usize>,
    /// `W_2048^j` for j in 0..1024.
    sub_twiddles: Vec<Complex32>,
    /// `(W_6144^k, W_6144^2k)` for k in 0..2048.
    outer_twiddles: Vec<(Complex32, Complex32)>,
    /// Primitive cube root of unity and its square.
    w3: Complex32,
    w3_sq: Complex32,
}

static PLAN: Lazy<Plan> = Lazy::new(|| {
    let bit_reverse = (0..SUB_LEN)
        .map(|i| i.reverse_bits() >> (usize::BITS - SUB_BITS))
        .collect();

    let sub_twiddles = (0..SUB_LEN / 2).map(|j| twiddle(j, SUB_LEN)).collect();

    let outer_twiddles = (0..SUB_LEN)
        .map(|k| (twiddle(k, FFT_SIZE), twiddle(2 * k, FFT_SIZE)))
        .collect();

    let w3 = twiddle(1, RADIX);
    Plan {
        bit_reverse,
        sub_twiddles,
        outer_twiddles,
        w3,
        w3_sq: w3 * w3,
    }
});

/// `exp(-2πi·k/n)`, evaluated in f64.
fn twiddle(k: usize, n: usize) -> Complex32 {
    let angle = -2.0 * std::f64::consts::PI * k as f64 / n as f64;
    Complex32::new(angle.cos() as f32, angle.sin() as f32)
}

/// Forward transform. `data` must hold exactly [`FFT_SIZE`] values.
pub fn forward(mut data: Vec<Complex32>) -> Vec<Complex32> {
    assert_eq!(data.len(), FFT_SIZE, "fft::forward needs {FFT_SIZE} points");
    forward_in_place(&mut data);
    data
}

/// Inverse transform, scaled by `1/N`. `data` must hold exactly [`FFT_SIZE`] values.
pub fn inverse(mut data: Vec<Complex32>) -> Vec<Complex32> {
    assert_eq!(data.len(), FFT_SIZE, "fft::inverse needs {FFT_SIZE} points");
    inverse_in_place(&mut data);
    data
}

pub(crate) fn forward_in_place(data: &mut [Complex32]) {
    debug_assert_eq!(data.len(), FFT_SIZE);
    let plan = &*PLAN;

    // sub[n1][n2] = x[3·n2 + n1]
    let mut sub = vec![Complex32::new(0.0, 0.0); FFT_SIZE];
    for (n1, lane) in sub.chunks_exact_mut(SUB_LEN).enumerate() {
        for (n2, slot) in lane.iter_mut().enumerate() {
            *slot = data[RADIX * n2 + n1];
        }
        radix2_in_place(lane, plan);
    }

    let (y0, rest) = sub.split_at(SUB_LEN);
    let (y1, y2) = rest.split_at(SUB_LEN);

    for k in 0..SUB_LEN {
        let (tw1, tw2) = plan.outer_twiddles[k];
        let z0 = y0[k];
        let z1 = y1[k] * tw1;
        let z2 = y2[k] * tw2;

        data[k] = z0 + z1 + z2;
        data[SUB_LEN + k] = z0 + z1 * plan.w3 + z2 * plan.w3_sq;
        data[2 * SUB_LEN + k] = z0 + z1 * plan.w3_sq + z2 * plan.w3;
    }
}

/// Conjugate, run forward, conjugate and scale.
pub(crate) fn inverse_in_place(data: &mut [Complex32]) {
    for v in data.iter_mut() {
        *v = v.conj();
    }
    forward_in_place(data);
    let scale = 1.0 / FFT_SIZE as f32;
    for v in data.iter_mut() {
        *v = v.conj() * scale;
    }
}

fn radix2_in_place(buf: &mut [Complex32], plan: &Plan) {
    for (i, &j) in plan.bit_reverse.iter().enumerate() {
        if j > i {
            buf.swap(i, j);
        }
    }

    let mut size = 2;
    while size <= SUB_LEN {
        let half = size / 2;
        let stride = SUB_LEN / size;
        for block in buf.chunks_exact_mut(size) {
            let (even, odd) = block.split_at_mut(half);
            for j in 0..half {
                let t = odd[j] * plan.sub_twiddles[j * stride];
                odd[j] = even[j] - t;
                even[j] += t;
            }
        }
        size *= 2;
    }
}
