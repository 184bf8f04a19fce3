//! Decaying-oscillation models.
//!
//! Both models share five parameters, in this order:
//!
//! | index | name | unit (with `t` in ns) |
//! |-------|------|------|
//! | 0 | `a` | signal |
//! | 1 | `f` | 1/ns (GHz) |
//! | 2 | `phi` | rad |
//! | 3 | `offset` | signal |
//! | 4 | `decay` | 1/ns |

use std::f64::consts::{PI, TAU};
use std::fmt;

use nalgebra::Vector5;
use serde::{Deserialize, Serialize};

/// Number of model parameters.
pub const NUM_PARAMS: usize = 5;

/// Parameter names, in vector order.
pub const PARAM_NAMES: [&str; NUM_PARAMS] = ["a", "f", "phi", "offset", "decay"];

/// Envelope of the oscillation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayModel {
    /// `a·e^{-t·decay}·cos(2πft + phi) + offset`
    Exponential,
    /// `a·e^{-(t·decay)²}·cos(2πft + phi) + offset`
    Gaussian,
}

impl DecayModel {
    /// Evaluate the model at `t`.
    pub fn eval(self, t: f64, p: &OscillationParams) -> f64 {
        p.a * self.envelope(t, p.decay) * (TAU * p.f * t + p.phi).cos() + p.offset
    }

    /// Evaluate the model on every point of `t`.
    pub fn curve(self, t: &[f64], p: &OscillationParams) -> Vec<f64> {
        t.iter().map(|&t| self.eval(t, p)).collect()
    }

    fn envelope(self, t: f64, decay: f64) -> f64 {
        match self {
            DecayModel::Exponential => (-t * decay).exp(),
            DecayModel::Gaussian => (-(t * decay).powi(2)).exp(),
        }
    }

    /// Partial derivatives with respect to `[a, f, phi, offset, decay]`.
    pub(crate) fn gradient(self, t: f64, p: &OscillationParams) -> Vector5<f64> {
        let env = self.envelope(t, p.decay);
        let (s, c) = (TAU * p.f * t + p.phi).sin_cos();
        let d_env = match self {
            DecayModel::Exponential => -t * env,
            DecayModel::Gaussian => -2.0 * t * t * p.decay * env,
        };
        Vector5::new(
            env * c,
            -p.a * env * s * TAU * t,
            -p.a * env * s,
            1.0,
            p.a * c * d_env,
        )
    }
}

impl fmt::Display for DecayModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecayModel::Exponential => write!(f, "exponential"),
            DecayModel::Gaussian => write!(f, "gaussian"),
        }
    }
}

/// Parameters of a decaying oscillation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OscillationParams {
    /// Amplitude.
    pub a: f64,
    /// Frequency.
    pub f: f64,
    /// Phase in radians.
    pub phi: f64,
    /// Baseline.
    pub offset: f64,
    /// Decay rate.
    pub decay: f64,
}

impl OscillationParams {
    pub(crate) fn to_vector(self) -> Vector5<f64> {
        Vector5::new(self.a, self.f, self.phi, self.offset, self.decay)
    }

    pub(crate) fn from_vector(v: &Vector5<f64>) -> Self {
        Self {
            a: v[0],
            f: v[1],
            phi: v[2],
            offset: v[3],
            decay: v[4],
        }
    }

    /// Canonical form: `a >= 0`, `f >= 0`, `decay >= 0` (Gaussian only, where
    /// the sign is meaningless) and `phi` in `(-π, π]`. The curve is unchanged.
    pub(crate) fn canonicalize(&mut self, model: DecayModel) {
        if self.f < 0.0 {
            self.f = -self.f;
            self.phi = -self.phi;
        }
        if self.a < 0.0 {
            self.a = -self.a;
            self.phi += PI;
        }
        if model == DecayModel::Gaussian && self.decay < 0.0 {
            self.decay = -self.decay;
        }
        self.phi = wrap_phase(self.phi);
    }
}

/// Wrap into `(-π, π]`.
pub(crate) fn wrap_phase(phi: f64) -> f64 {
    let wrapped = (phi + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// `a·e^{-t·decay}·cos(2πft + phi) + offset`
pub fn oscillation_decay_exp(t: f64, a: f64, f: f64, phi: f64, offset: f64, decay: f64) -> f64 {
    DecayModel::Exponential.eval(
        t,
        &OscillationParams {
            a,
            f,
            phi,
            offset,
            decay,
        },
    )
}

/// `a·e^{-(t·decay)²}·cos(2πft + phi) + offset`
pub fn oscillation_decay_gaussian(
    t: f64,
    a: f64,
    f: f64,
    phi: f64,
    offset: f64,
    decay: f64,
) -> f64 {
    DecayModel::Gaussian.eval(
        t,
        &OscillationParams {
            a,
            f,
            phi,
            offset,
            decay,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn params() -> OscillationParams {
        OscillationParams {
            a: 0.4,
            f: 0.005,
            phi: 0.3,
            offset: 0.5,
            decay: 1.0 / 2000.0,
        }
    }

    #[test]
    fn test_model_values() {
        let p = params();
        assert_relative_eq!(DecayModel::Exponential.eval(0.0, &p), 0.4 * 0.3f64.cos() + 0.5);
        let t = 2000.0;
        let cos = (TAU * 0.005 * t + 0.3).cos();
        assert_relative_eq!(
            oscillation_decay_exp(t, p.a, p.f, p.phi, p.offset, p.decay),
            0.4 * (-1.0f64).exp() * cos + 0.5
        );
        assert_relative_eq!(
            oscillation_decay_gaussian(t, p.a, p.f, p.phi, p.offset, p.decay),
            0.4 * (-1.0f64).exp() * cos + 0.5
        );
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let p = params();
        for model in [DecayModel::Exponential, DecayModel::Gaussian] {
            for &t in &[16.0, 733.0, 4100.0] {
                let g = model.gradient(t, &p);
                let v = p.to_vector();
                for i in 0..NUM_PARAMS {
                    let h = 1e-7 * v[i].abs().max(1e-6);
                    let mut up = v;
                    let mut down = v;
                    up[i] += h;
                    down[i] -= h;
                    let numeric = (model.eval(t, &OscillationParams::from_vector(&up))
                        - model.eval(t, &OscillationParams::from_vector(&down)))
                        / (2.0 * h);
                    assert_relative_eq!(g[i], numeric, epsilon = 1e-5, max_relative = 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_canonicalize_flips_signs() {
        let mut p = OscillationParams {
            a: -0.4,
            f: -0.005,
            phi: 0.3,
            offset: 0.5,
            decay: -0.001,
        };
        let t: Vec<f64> = (0..50).map(|i| i as f64 * 37.0).collect();
        let before = DecayModel::Gaussian.curve(&t, &p);
        p.canonicalize(DecayModel::Gaussian);
        assert!(p.a > 0.0 && p.f > 0.0 && p.decay > 0.0);
        assert!(p.phi > -PI && p.phi <= PI);
        for (after, b) in DecayModel::Gaussian.curve(&t, &p).iter().zip(&before) {
            assert_relative_eq!(after, b, epsilon = 1e-12);
        }
    }

    proptest! {
        #[test]
        fn prop_wrap_phase_in_range(phi in -100.0f64..100.0) {
            let w = wrap_phase(phi);
            prop_assert!(w > -PI - 1e-12 && w <= PI + 1e-12);
            prop_assert!(((w - phi) / TAU - ((w - phi) / TAU).round()).abs() < 1e-9);
        }
    }
}
