//! Initial parameter estimates.
//!
//! Levenberg–Marquardt only finds the nearest minimum, so the frequency guess
//! must land within a fraction of a fringe of the truth. It comes from the
//! peak of a zero-padded discrete Fourier spectrum of the mean-subtracted data.

use std::f64::consts::{SQRT_2, TAU};

use tracing::trace;

use crate::model::{DecayModel, OscillationParams};

/// Zero-padding factor of the spectrum grid.
const PADDING: f64 = 4.0;

/// Samples per envelope segment, at least.
const MIN_SEGMENT: usize = 4;

/// Estimate all five parameters from `(t, y)`.
///
/// Assumes `t` strictly increasing with at least two points.
pub fn initial_guess(model: DecayModel, t: &[f64], y: &[f64]) -> OscillationParams {
    let n = y.len() as f64;
    let offset = y.iter().sum::<f64>() / n;
    let centred: Vec<f64> = y.iter().map(|v| v - offset).collect();

    let (f, phi) = spectral_peak(t, &centred);
    let (a, decay) = envelope_guess(model, t, &centred);

    let guess = OscillationParams {
        a,
        f,
        phi,
        offset,
        decay,
    };
    trace!(?guess, %model, "initial guess");
    guess
}

/// `(frequency, phase)` of the strongest spectral component.
pub(crate) fn spectral_peak(t: &[f64], centred: &[f64]) -> (f64, f64) {
    let span = t[t.len() - 1] - t[0];
    let dt = span / (t.len() - 1) as f64;
    let step = 1.0 / (PADDING * span);
    let nyquist = 0.5 / dt;
    let bins = (nyquist / step).floor().max(1.0) as usize;

    let dft = |f: f64| -> (f64, f64) {
        let mut re = 0.0;
        let mut im = 0.0;
        for (&t, &v) in t.iter().zip(centred) {
            let (s, c) = (TAU * f * t).sin_cos();
            re += v * c;
            im -= v * s;
        }
        (re, im)
    };

    let power: Vec<f64> = (0..=bins)
        .map(|k| {
            let (re, im) = dft(k as f64 * step);
            re * re + im * im
        })
        .collect();

    // skip DC, which the mean subtraction leaves near zero anyway
    let peak = (1..power.len())
        .max_by(|&i, &j| power[i].total_cmp(&power[j]))
        .unwrap_or(1);

    // parabolic interpolation between neighbouring bins
    let mut f = peak as f64 * step;
    if peak + 1 < power.len() {
        let (l, c, r) = (power[peak - 1], power[peak], power[peak + 1]);
        let denom = l - 2.0 * c + r;
        if denom.abs() > f64::EPSILON * c.abs() {
            let shift = (0.5 * (l - r) / denom).clamp(-0.5, 0.5);
            f += shift * step;
        }
    }

    // Σ a·cos(2πft + φ)·e^{-2πift} ≈ (a·N/2)·e^{iφ}
    let (re, im) = dft(f);
    (f, im.atan2(re))
}

/// `(amplitude, decay)` from a log-linear regression of segment amplitudes.
pub(crate) fn envelope_guess(model: DecayModel, t: &[f64], centred: &[f64]) -> (f64, f64) {
    let span = t[t.len() - 1] - t[0];
    let fallback_decay = 1.0 / span;
    let max_dev = centred.iter().fold(0.0f64, |m, v| m.max(v.abs()));

    let segments = (centred.len() / MIN_SEGMENT).clamp(1, 6);
    if segments < 2 {
        return (max_dev, fallback_decay);
    }
    let len = centred.len() / segments;

    let mut xs = Vec::with_capacity(segments);
    let mut ys = Vec::with_capacity(segments);
    for s in 0..segments {
        let chunk = &centred[s * len..(s + 1) * len];
        let rms = (chunk.iter().map(|v| v * v).sum::<f64>() / len as f64).sqrt();
        if rms <= 0.0 {
            continue;
        }
        let mid = t[s * len + len / 2];
        let x = match model {
            DecayModel::Exponential => mid,
            DecayModel::Gaussian => mid * mid,
        };
        xs.push(x);
        // cosine rms is amplitude / √2
        ys.push((rms * SQRT_2).ln());
    }
    if xs.len() < 2 {
        return (max_dev, fallback_decay);
    }

    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = xs.iter().map(|x| x * x).sum();
    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return (max_dev, fallback_decay);
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    let decay = match model {
        DecayModel::Exponential if slope < 0.0 => -slope,
        DecayModel::Gaussian if slope < 0.0 => (-slope).sqrt(),
        _ => fallback_decay,
    };
    let a = intercept.exp();
    let a = if a.is_finite() && a > 0.0 {
        a.min(4.0 * max_dev)
    } else {
        max_dev
    };
    (a, decay)
}
