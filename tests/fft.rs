use std::f64::consts::PI;

use num_complex::{Complex32, Complex64};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rustfft::FftPlanner;
use vocal_split_core::core::fft::{forward, inverse, FFT_SIZE};

fn random_signal(seed: u64) -> Vec<Complex32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..FFT_SIZE)
        .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect()
}

/// O(N²) reference in double precision.
fn naive_dft(input: &[Complex32]) -> Vec<Complex64> {
    let n = input.len();
    let table: Vec<Complex64> = (0..n)
        .map(|j| Complex64::from_polar(1.0, -2.0 * PI * j as f64 / n as f64))
        .collect();
    (0..n)
        .map(|k| {
            input.iter().enumerate().fold(Complex64::new(0.0, 0.0), |acc, (t, x)| {
                let x = Complex64::new(x.re as f64, x.im as f64);
                acc + x * table[(k * t) % n]
            })
        })
        .collect()
}

fn relative_rms(actual: &[Complex32], expected: &[Complex64]) -> f64 {
    let (mut err, mut norm) = (0.0f64, 0.0f64);
    for (a, e) in actual.iter().zip(expected) {
        let a = Complex64::new(a.re as f64, a.im as f64);
        err += (a - e).norm_sqr();
        norm += e.norm_sqr();
    }
    (err / norm.max(f64::MIN_POSITIVE)).sqrt()
}

#[test]
fn inverse_undoes_forward() {
    let x = random_signal(7);
    let back = inverse(forward(x.clone()));

    let expected: Vec<Complex64> = x
        .iter()
        .map(|c| Complex64::new(c.re as f64, c.im as f64))
        .collect();
    let err = relative_rms(&back, &expected);
    assert!(err < 1e-5, "round trip relative error {err}");
}

#[test]
fn forward_matches_naive_dft() {
    let x = random_signal(42);
    let expected = naive_dft(&x);
    let err = relative_rms(&forward(x), &expected);
    assert!(err < 1e-5, "relative error vs DFT {err}");
}

#[test]
fn impulse_yields_pure_phase_ramp() {
    let shift = 5usize;
    let mut x = vec![Complex32::new(0.0, 0.0); FFT_SIZE];
    x[shift] = Complex32::new(1.0, 0.0);

    let spectrum = forward(x);
    for (k, bin) in spectrum.iter().enumerate() {
        let angle = -2.0 * PI * ((k * shift) % FFT_SIZE) as f64 / FFT_SIZE as f64;
        assert!((bin.re as f64 - angle.cos()).abs() < 1e-5, "bin {k} re {}", bin.re);
        assert!((bin.im as f64 - angle.sin()).abs() < 1e-5, "bin {k} im {}", bin.im);
    }
}

#[test]
fn agrees_with_rustfft() {
    let x = random_signal(1234);
    let mut reference = x.clone();
    FftPlanner::<f32>::new()
        .plan_fft_forward(FFT_SIZE)
        .process(&mut reference);

    let ours = forward(x);
    let expected: Vec<Complex64> = reference
        .iter()
        .map(|c| Complex64::new(c.re as f64, c.im as f64))
        .collect();
    let err = relative_rms(&ours, &expected);
    assert!(err < 1e-5, "relative error vs rustfft {err}");
}

#[test]
fn real_input_has_hermitian_spectrum() {
    let mut rng = StdRng::seed_from_u64(3);
    let x: Vec<Complex32> = (0..FFT_SIZE)
        .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), 0.0))
        .collect();
    let spectrum = forward(x);

    assert!(spectrum[0].im.abs() < 1e-3);
    assert!(spectrum[FFT_SIZE / 2].im.abs() < 1e-3);
    for k in 1..FFT_SIZE / 2 {
        let mirror = spectrum[FFT_SIZE - k].conj();
        assert!((spectrum[k] - mirror).norm() < 1e-3, "bin {k}");
    }
}

#[test]
#[should_panic]
fn rejects_wrong_length() {
    let _ = forward(vec![Complex32::new(0.0, 0.0); 4096]);
}
