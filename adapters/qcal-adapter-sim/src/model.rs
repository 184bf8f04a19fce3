//! Physical model of a simulated transmon: drive detuning, dephasing and
//! readout.

use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Shape of the dephasing envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dephasing {
    /// `exp(-t / T2*)`, Markovian noise.
    Exponential,
    /// `exp(-(t / T2*)^2)`, quasi-static noise.
    Gaussian,
}

/// Ground truth of one simulated qubit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QubitModel {
    /// Qubit frequency minus drive frequency at the flux sweet spot, in Hz.
    pub detuning_hz: f64,
    /// Dephasing time in ns.
    pub t2_star_ns: f64,
    /// Envelope of the dephasing decay.
    pub dephasing: Dephasing,
    /// Flux line element driving this qubit.
    pub flux_element: Option<String>,
    /// Flux offset of the sweet spot in volts.
    pub sweet_spot_v: f64,
    /// Frequency drop away from the sweet spot, in Hz/V².
    pub flux_curvature_hz_per_v2: f64,
    /// P(read 0 | 0).
    pub readout_fidelity_0: f64,
    /// P(read 1 | 1).
    pub readout_fidelity_1: f64,
    /// Demodulated IQ centre of the ground state, in volts.
    pub iq_ground: Complex64,
    /// Demodulated IQ centre of the excited state, in volts.
    pub iq_excited: Complex64,
    /// Standard deviation of the IQ blobs, in volts.
    pub iq_sigma: f64,
}

impl Default for QubitModel {
    fn default() -> Self {
        Self {
            detuning_hz: 250e3,
            t2_star_ns: 3_000.0,
            dephasing: Dephasing::Exponential,
            flux_element: None,
            sweet_spot_v: 0.0,
            flux_curvature_hz_per_v2: 0.0,
            readout_fidelity_0: 0.97,
            readout_fidelity_1: 0.93,
            iq_ground: Complex64::new(-2e-4, 1e-4),
            iq_excited: Complex64::new(3e-4, -1e-4),
            iq_sigma: 1e-4,
        }
    }
}

impl QubitModel {
    /// Detuning from the drive at the given flux offset.
    pub fn detuning_at(&self, flux_v: f64) -> f64 {
        let dv = flux_v - self.sweet_spot_v;
        self.detuning_hz - self.flux_curvature_hz_per_v2 * dv * dv
    }

    /// Coherence left after idling `t_ns`.
    pub fn coherence(&self, t_ns: f64) -> f64 {
        if self.t2_star_ns <= 0.0 {
            return 0.0;
        }
        let x = t_ns / self.t2_star_ns;
        match self.dephasing {
            Dephasing::Exponential => (-x).exp(),
            Dephasing::Gaussian => (-x * x).exp(),
        }
    }

    /// Readout with assignment errors: the state the discriminator reports.
    pub fn assign(&self, state: u8, rng: &mut impl Rng) -> u8 {
        let correct = if state == 0 {
            self.readout_fidelity_0
        } else {
            self.readout_fidelity_1
        };
        if rng.r#gen::<f64>() < correct {
            state
        } else {
            1 - state
        }
    }

    /// Demodulated I quadrature of one shot.
    pub fn sample_i(&self, state: u8, rng: &mut impl Rng) -> f64 {
        let centre = if state == 0 {
            self.iq_ground
        } else {
            self.iq_excited
        };
        centre.re + self.iq_sigma * standard_normal(rng)
    }
}

/// Ground truth of the whole simulated chip.
///
/// Qubits without an entry behave like `default`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    /// Per-qubit models.
    pub qubits: BTreeMap<String, QubitModel>,
    /// Model for qubits not listed.
    pub default: QubitModel,
}

impl Device {
    /// Add a qubit model.
    pub fn with_qubit(mut self, name: impl Into<String>, model: QubitModel) -> Self {
        self.qubits.insert(name.into(), model);
        self
    }

    /// Model of `qubit`.
    pub fn model(&self, qubit: &str) -> &QubitModel {
        self.qubits.get(qubit).unwrap_or(&self.default)
    }

    /// Flux element of `qubit`, `<qubit>.z` unless the model names one.
    pub fn flux_element(&self, qubit: &str) -> String {
        self.model(qubit)
            .flux_element
            .clone()
            .unwrap_or_else(|| format!("{qubit}.z"))
    }
}

/// Box–Muller draw from N(0, 1).
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Bloch vector in the drive's rotating frame. Ground state is `+z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bloch {
    /// x component.
    pub x: f64,
    /// y component.
    pub y: f64,
    /// z component.
    pub z: f64,
}

impl Bloch {
    /// Computational basis state.
    pub fn basis(state: u8) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: if state == 0 { 1.0 } else { -1.0 },
        }
    }

    /// Rotate by `angle` about the equatorial axis at azimuth `axis` (radians).
    pub fn rotate_equatorial(&mut self, axis: f64, angle: f64) {
        let (ny, nx) = axis.sin_cos();
        let (s, c) = angle.sin_cos();
        let dot = nx * self.x + ny * self.y;
        // Rodrigues: v c + (n × v) s + n (n·v)(1 - c), with n_z = 0
        let cross_x = ny * self.z;
        let cross_y = -nx * self.z;
        let cross_z = nx * self.y - ny * self.x;
        let x = self.x * c + cross_x * s + nx * dot * (1.0 - c);
        let y = self.y * c + cross_y * s + ny * dot * (1.0 - c);
        let z = self.z * c + cross_z * s;
        *self = Self { x, y, z };
    }

    /// Free precession by `angle` about z, shrinking the transverse part by `coherence`.
    pub fn precess(&mut self, angle: f64, coherence: f64) {
        let (s, c) = angle.sin_cos();
        let x = (self.x * c - self.y * s) * coherence;
        let y = (self.x * s + self.y * c) * coherence;
        self.x = x;
        self.y = y;
    }

    /// Probability of finding the qubit excited.
    pub fn excited_probability(&self) -> f64 {
        ((1.0 - self.z) / 2.0).clamp(0.0, 1.0)
    }
}

/// Rotation `(axis offset, angle)` for a named single-qubit pulse.
///
/// Names follow the usual convention: `x90`, `x180`, `-x90`, `y90`, `y180`,
/// `-y90`. Any other name is not a gate the simulator can emulate.
pub fn named_rotation(pulse: &str) -> Option<(f64, f64)> {
    let (negative, rest) = match pulse.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, pulse),
    };
    let axis = match rest.chars().next()? {
        'x' => 0.0,
        'y' => FRAC_PI_2,
        _ => return None,
    };
    let angle = match &rest[1..] {
        "90" => FRAC_PI_2,
        "180" => PI,
        _ => return None,
    };
    Some((axis, if negative { -angle } else { angle }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_two_x90_make_a_pi_pulse() {
        let mut b = Bloch::basis(0);
        b.rotate_equatorial(0.0, FRAC_PI_2);
        assert_relative_eq!(b.y, -1.0, epsilon = 1e-12);
        b.rotate_equatorial(0.0, FRAC_PI_2);
        assert_relative_eq!(b.excited_probability(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ramsey_fringe() {
        // P_e = (1 + C cos(theta - phi)) / 2
        let model = QubitModel::default();
        for &(theta, phi) in &[(0.3, 0.0), (1.0, 2.5), (4.0, -1.0)] {
            let mut b = Bloch::basis(0);
            b.rotate_equatorial(0.0, FRAC_PI_2);
            let c = model.coherence(500.0);
            b.precess(theta, c);
            b.rotate_equatorial(phi, FRAC_PI_2);
            let expected = 0.5 * (1.0 + c * (theta - phi).cos());
            assert_relative_eq!(b.excited_probability(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_coherence_envelopes() {
        let mut model = QubitModel {
            t2_star_ns: 1000.0,
            ..QubitModel::default()
        };
        assert_relative_eq!(model.coherence(1000.0), (-1.0f64).exp());
        model.dephasing = Dephasing::Gaussian;
        assert_relative_eq!(model.coherence(2000.0), (-4.0f64).exp());
    }

    #[test]
    fn test_flux_detuning() {
        let model = QubitModel {
            detuning_hz: 1e6,
            sweet_spot_v: 0.1,
            flux_curvature_hz_per_v2: 1e9,
            ..QubitModel::default()
        };
        assert_relative_eq!(model.detuning_at(0.1), 1e6);
        assert_relative_eq!(model.detuning_at(0.2), 1e6 - 1e7);
    }

    #[test]
    fn test_named_rotation() {
        assert_eq!(named_rotation("x90"), Some((0.0, FRAC_PI_2)));
        assert_eq!(named_rotation("-y180"), Some((FRAC_PI_2, -PI)));
        assert_eq!(named_rotation("readout"), None);
        assert_eq!(named_rotation("x45"), None);
    }

    #[test]
    fn test_device_fallback() {
        let device = Device::default().with_qubit(
            "q1",
            QubitModel {
                flux_element: Some("flux_line_1".into()),
                ..QubitModel::default()
            },
        );
        assert_eq!(device.flux_element("q1"), "flux_line_1");
        assert_eq!(device.flux_element("q2"), "q2.z");
        assert_eq!(device.model("q2"), &device.default);
    }

    #[test]
    fn test_assignment_fidelity() {
        let model = QubitModel::default();
        let mut rng = SmallRng::seed_from_u64(7);
        let ones = (0..20_000).filter(|_| model.assign(1, &mut rng) == 1).count();
        let frac = ones as f64 / 20_000.0;
        assert!((frac - 0.93).abs() < 0.01, "got {frac}");
    }
}
