//! 1-D signal processing for gaze traces: Savitzky-Golay smoothing, endpoint
//! detrending, Welch power spectral density and spectral entropy.

use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::matrix::{cholesky_decompose, solve_cholesky};
use crate::stats::shannon_entropy_bits;

/// Default Welch segment length (samples).
pub const WELCH_SEGMENT: usize = 256;

/// Savitzky-Golay smoothing.
///
/// Each output point is the value at that point of the order-`order`
/// polynomial least-squares fitted over a `window`-sample neighbourhood.
/// Near the edges the first/last full window is used and the polynomial is
/// evaluated off-centre. Returns `None` if the window is even, not larger
/// than the order, or longer than the series.
pub fn savgol_filter(data: &[f64], window: usize, order: usize) -> Option<Vec<f64>> {
    let n = data.len();
    if window % 2 == 0 || order >= window || n < window {
        return None;
    }

    let half = window / 2;
    let terms = order + 1;

    // Design matrix over centred offsets -half..=half
    let mut design = vec![0.0; window * terms];
    for row in 0..window {
        let t = row as f64 - half as f64;
        let mut power = 1.0;
        for col in 0..terms {
            design[row * terms + col] = power;
            power *= t;
        }
    }

    let mut normal = vec![0.0; terms * terms];
    for i in 0..terms {
        for j in 0..terms {
            normal[i * terms + j] = (0..window)
                .map(|row| design[row * terms + i] * design[row * terms + j])
                .sum();
        }
    }
    let l = cholesky_decompose(&normal, terms)?;

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let center = i.clamp(half, n - 1 - half);
        let segment = &data[center - half..=center + half];

        let mut rhs = vec![0.0; terms];
        for (row, &y) in segment.iter().enumerate() {
            for (col, r) in rhs.iter_mut().enumerate() {
                *r += design[row * terms + col] * y;
            }
        }
        let coeffs = solve_cholesky(&l, &rhs, terms);

        let t = i as f64 - center as f64;
        let mut value = 0.0;
        let mut power = 1.0;
        for c in &coeffs {
            value += c * power;
            power *= t;
        }
        out.push(value);
    }

    if out.iter().all(|v| v.is_finite()) {
        Some(out)
    } else {
        None
    }
}

/// Subtract the straight line joining the first and last sample.
pub fn detrend_endpoints(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let first = data[0];
    let last = data[n - 1];
    let step = (last - first) / (n - 1) as f64;
    data.iter()
        .enumerate()
        .map(|(i, &v)| v - (first + step * i as f64))
        .collect()
}

/// One-sided power spectral density estimate.
#[derive(Debug, Clone, Default)]
pub struct PowerSpectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
}

impl PowerSpectrum {
    /// Frequency of the largest PSD bin (first one on ties).
    pub fn dominant_frequency(&self) -> f64 {
        let mut best_idx = 0;
        let mut best = f64::NEG_INFINITY;
        for (i, &p) in self.power.iter().enumerate() {
            if p > best {
                best = p;
                best_idx = i;
            }
        }
        self.frequencies.get(best_idx).copied().unwrap_or(0.0)
    }

    /// Shannon entropy (bits) of the normalised PSD.
    pub fn spectral_entropy(&self) -> f64 {
        shannon_entropy_bits(&self.power)
    }
}

/// Welch's averaged periodogram: periodic Hann window, 50 % overlap,
/// per-segment mean removal, density scaling.
pub fn welch_psd(data: &[f64], fs: f64) -> Option<PowerSpectrum> {
    if !(fs.is_finite() && fs > 0.0) {
        return None;
    }
    let n = data.len();
    let nperseg = n.min(WELCH_SEGMENT);
    if nperseg < 2 {
        return None;
    }
    let noverlap = nperseg / 2;
    let step = nperseg - noverlap;
    let segments = (n - nperseg) / step + 1;

    let window: Vec<f64> = (0..nperseg)
        .map(|k| 0.5 - 0.5 * (2.0 * PI * k as f64 / nperseg as f64).cos())
        .collect();
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    if window_power <= 0.0 {
        return None;
    }
    let scale = 1.0 / (fs * window_power);

    let bins = nperseg / 2 + 1;
    let mut power = vec![0.0; bins];

    let fft = FftPlanner::<f64>::new().plan_fft_forward(nperseg);
    let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

    for s in 0..segments {
        let segment = &data[s * step..s * step + nperseg];
        let seg_mean = segment.iter().sum::<f64>() / nperseg as f64;
        for ((slot, v), w) in buffer.iter_mut().zip(segment).zip(&window) {
            *slot = Complex::new((v - seg_mean) * w, 0.0);
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);

        for (k, (p, bin)) in power.iter_mut().zip(&buffer).enumerate() {
            let mut bin_power = bin.norm_sqr() * scale;
            // one-sided: fold negative frequencies except DC and Nyquist
            let is_nyquist = nperseg % 2 == 0 && k == bins - 1;
            if k != 0 && !is_nyquist {
                bin_power *= 2.0;
            }
            *p += bin_power;
        }
    }

    for p in power.iter_mut() {
        *p /= segments as f64;
    }

    let frequencies = (0..bins).map(|k| k as f64 * fs / nperseg as f64).collect();

    Some(PowerSpectrum { frequencies, power })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_savgol_preserves_cubic() {
        let data: Vec<f64> = (0..20)
            .map(|i| {
                let t = i as f64;
                0.5 * t * t * t - 2.0 * t + 1.0
            })
            .collect();
        let smoothed = savgol_filter(&data, 7, 3).unwrap();
        for (a, b) in data.iter().zip(smoothed.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_savgol_reduces_noise() {
        let data: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let smoothed = savgol_filter(&data, 5, 2).unwrap();
        let max_interior = smoothed[5..45].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(max_interior < 1.0);
    }

    #[test]
    fn test_savgol_rejects_short_series() {
        assert!(savgol_filter(&[1.0, 2.0, 3.0], 7, 3).is_none());
        assert!(savgol_filter(&[1.0; 10], 6, 2).is_none());
        assert!(savgol_filter(&[1.0; 10], 5, 5).is_none());
    }

    #[test]
    fn test_detrend_endpoints() {
        let data = vec![0.0, 1.0, 2.0, 3.0];
        let d = detrend_endpoints(&data);
        assert!(d.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_welch_finds_sine_frequency() {
        let fs = 60.0;
        let freq = 5.0;
        let data: Vec<f64> = (0..600)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect();
        let psd = welch_psd(&data, fs).unwrap();
        assert_eq!(psd.frequencies.len(), WELCH_SEGMENT / 2 + 1);
        let dominant = psd.dominant_frequency();
        assert!((dominant - freq).abs() <= fs / WELCH_SEGMENT as f64, "dominant={dominant}");
    }

    #[test]
    fn test_welch_matches_direct_dft() {
        let fs = 60.0;
        let data: Vec<f64> = (0..100)
            .map(|i| {
                let t = i as f64 / fs;
                (2.0 * PI * 3.0 * t).sin() + 0.4 * (2.0 * PI * 11.0 * t).cos() + 0.01 * i as f64
            })
            .collect();
        let psd = welch_psd(&data, fs).unwrap();

        // single segment: the whole series
        let n = data.len();
        let window: Vec<f64> = (0..n).map(|k| 0.5 - 0.5 * (2.0 * PI * k as f64 / n as f64).cos()).collect();
        let scale = 1.0 / (fs * window.iter().map(|w| w * w).sum::<f64>());
        let mean = data.iter().sum::<f64>() / n as f64;
        for k in 0..=n / 2 {
            let (mut re, mut im) = (0.0, 0.0);
            for (t, (v, w)) in data.iter().zip(&window).enumerate() {
                let angle = -2.0 * PI * (k * t) as f64 / n as f64;
                re += (v - mean) * w * angle.cos();
                im += (v - mean) * w * angle.sin();
            }
            let factor = if k == 0 || k == n / 2 { 1.0 } else { 2.0 };
            let expected = (re * re + im * im) * scale * factor;
            assert!((psd.power[k] - expected).abs() < 1e-9 * expected.max(1.0), "bin {k}");
        }
    }

    #[test]
    fn test_welch_short_series_uses_full_length() {
        let data: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin()).collect();
        let psd = welch_psd(&data, 30.0).unwrap();
        assert_eq!(psd.power.len(), 21);
    }

    #[test]
    fn test_welch_rejects_bad_rate() {
        assert!(welch_psd(&[1.0, 2.0, 3.0], 0.0).is_none());
        assert!(welch_psd(&[1.0, 2.0, 3.0], f64::NAN).is_none());
    }

    #[test]
    fn test_flat_signal_entropy_is_zero() {
        let psd = welch_psd(&[2.0; 64], 60.0).unwrap();
        assert_eq!(psd.spectral_entropy(), 0.0);
    }
}
