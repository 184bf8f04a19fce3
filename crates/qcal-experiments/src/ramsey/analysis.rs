//! Fit of the Ramsey fringes and the derived qubit parameters.
//!
//! The fit runs in nanoseconds: `f` comes out in GHz and `decay` in 1/ns.
//! The observed fringe frequency is `|Δ_qubit - detuning|`, so with the
//! virtual detuning larger than the true one the qubit sits at
//! `detuning - f` above the drive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use qcal_fit::{DecayModel, OscillationFit, fit_oscillation_decay};
use qcal_state::{Machine, Outcome};

use crate::dataset::Dataset;
use crate::error::ExperimentResult;

/// Fit record of one qubit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamseyFit {
    /// Fringe amplitude.
    pub a: f64,
    /// Fringe frequency in GHz.
    pub f: f64,
    /// Fringe phase in radians.
    pub phi: f64,
    /// Fringe offset.
    pub offset: f64,
    /// Envelope decay rate in 1/ns.
    pub decay_rate: f64,
    /// Variance of `decay_rate`.
    pub decay_decay: f64,
    /// Fringe frequency in Hz.
    pub freq_offset: f64,
    /// T2* in seconds.
    pub decay: f64,
    /// One-sigma error of T2* in seconds.
    pub decay_error: f64,
    /// Whether the fringe frequency is below twice the virtual detuning.
    pub within_detuning: bool,
}

impl RamseyFit {
    /// Derive the record from a converged fit.
    pub fn from_fit(fit: &OscillationFit, detuning_hz: f64) -> Self {
        let p = fit.params;
        let decay_decay = fit.decay_variance();
        let tau = 1.0 / p.decay;
        let tau_error = tau * decay_decay.max(0.0).sqrt() / p.decay;
        let freq_offset = 1e9 * p.f;
        Self {
            a: p.a,
            f: p.f,
            phi: p.phi,
            offset: p.offset,
            decay_rate: p.decay,
            decay_decay,
            freq_offset,
            decay: 1e-9 * tau,
            decay_error: 1e-9 * tau_error,
            within_detuning: freq_offset < 2.0 * detuning_hz,
        }
    }

    /// Qubit frequency minus drive frequency implied by the fringe, in Hz.
    pub fn frequency_shift(&self, detuning_hz: f64) -> f64 {
        self.freq_offset - detuning_hz
    }

    /// Reason this fit must not be written back, if any.
    fn rejection(&self) -> Option<String> {
        if !(self.decay_rate.is_finite() && self.decay_rate > 0.0) {
            return Some(format!("non-physical decay rate {:e} /ns", self.decay_rate));
        }
        if !self.within_detuning {
            return Some(format!(
                "fringe at {:.3} MHz is outside twice the detuning",
                self.freq_offset / 1e6
            ));
        }
        None
    }
}

/// Outcome of the fit of one qubit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QubitFit {
    /// Converged and physical.
    Fitted(RamseyFit),
    /// Fit failed or was rejected.
    Failed {
        /// What went wrong.
        reason: String,
        /// The rejected record, when the fit itself converged.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fit: Option<RamseyFit>,
    },
}

impl QubitFit {
    /// The accepted record.
    pub fn fitted(&self) -> Option<&RamseyFit> {
        match self {
            QubitFit::Fitted(fit) => Some(fit),
            QubitFit::Failed { .. } => None,
        }
    }

    /// Any record, accepted or not.
    pub fn record(&self) -> Option<&RamseyFit> {
        match self {
            QubitFit::Fitted(fit) => Some(fit),
            QubitFit::Failed { fit, .. } => fit.as_ref(),
        }
    }
}

/// Fits of every qubit of a dataset under one decay model.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Envelope used.
    pub model: DecayModel,
    /// Virtual detuning in Hz.
    pub detuning_hz: f64,
    /// Fit per qubit, in dataset order.
    pub fits: Vec<(String, QubitFit)>,
    /// Fitted curve on the dataset time axis, for converged fits.
    pub curves: BTreeMap<String, Vec<f64>>,
}

impl Analysis {
    /// Fit of `qubit`.
    pub fn fit(&self, qubit: &str) -> Option<&QubitFit> {
        self.fits.iter().find(|(q, _)| q == qubit).map(|(_, fit)| fit)
    }

    /// Fit results as stored in the node record.
    pub fn to_json(&self) -> ExperimentResult<serde_json::Value> {
        let map: BTreeMap<&str, &QubitFit> =
            self.fits.iter().map(|(q, fit)| (q.as_str(), fit)).collect();
        Ok(serde_json::to_value(map)?)
    }

    /// Console summary, two lines per qubit.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(2 * self.fits.len());
        for (qubit, fit) in &self.fits {
            match fit.record() {
                Some(r) => {
                    lines.push(format!(
                        "Frequency offset for qubit {qubit} : {:.2} MHz",
                        r.freq_offset / 1e6
                    ));
                    lines.push(format!("T2* for qubit {qubit} : {:.2} us", 1e6 * r.decay));
                }
                None => lines.push(format!("Fit failed for qubit {qubit}")),
            }
            if let QubitFit::Failed { reason, .. } = fit {
                lines.push(format!("  rejected: {reason}"));
            }
        }
        lines
    }
}

/// Fit every qubit row of `dataset`.
///
/// A qubit whose fit fails or is rejected is recorded as failed; the other
/// qubits are still fitted.
pub fn analyze(dataset: &Dataset, detuning_hz: f64, model: DecayModel) -> Analysis {
    let t = dataset.time_ns.to_vec();
    let mut fits = Vec::with_capacity(dataset.qubits.len());
    let mut curves = BTreeMap::new();

    for (qubit, row) in dataset.qubits.iter().zip(dataset.data.rows()) {
        let y = row.to_vec();
        let fit = match fit_oscillation_decay(model, &t, &y) {
            Ok(fit) => {
                debug!(
                    "{} fit of {} converged after {} iterations (rms {:.3e})",
                    model, qubit, fit.iterations, fit.residual_rms
                );
                curves.insert(qubit.clone(), fit.curve(&t));
                let record = RamseyFit::from_fit(&fit, detuning_hz);
                match record.rejection() {
                    None => QubitFit::Fitted(record),
                    Some(reason) => {
                        warn!("Rejecting {} fit of {}: {}", model, qubit, reason);
                        QubitFit::Failed {
                            reason,
                            fit: Some(record),
                        }
                    }
                }
            }
            Err(e) => {
                warn!("{} fit of {} failed: {}", model, qubit, e);
                QubitFit::Failed {
                    reason: e.to_string(),
                    fit: None,
                }
            }
        };
        fits.push((qubit.clone(), fit));
    }

    Analysis {
        model,
        detuning_hz,
        fits,
        curves,
    }
}

/// Write accepted fits back to the machine.
///
/// The drive intermediate frequency moves by `-(freq_offset - detuning)` and
/// `T2ramsey` takes T2*. Returns the outcome of every fitted qubit.
pub fn update_machine(
    machine: &mut Machine,
    analysis: &Analysis,
) -> ExperimentResult<BTreeMap<String, Outcome>> {
    let mut outcomes = BTreeMap::new();
    for (qubit, fit) in &analysis.fits {
        let outcome = match fit.fitted() {
            Some(record) => {
                let q = machine.qubit_mut(qubit)?;
                let shift = record.frequency_shift(analysis.detuning_hz);
                q.xy.intermediate_frequency -= shift;
                q.t2ramsey = Some(record.decay);
                debug!(
                    "{}: intermediate frequency {:.0} Hz (shift {:+.0} Hz), T2* {:.3e} s",
                    qubit, q.xy.intermediate_frequency, -shift, record.decay
                );
                Outcome::Successful
            }
            None => Outcome::Failed,
        };
        outcomes.insert(qubit.clone(), outcome);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Variable;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};
    use qcal_fit::OscillationParams;

    const DETUNING: f64 = 5e6;

    fn dataset(rows: &[OscillationParams], model: DecayModel) -> Dataset {
        let t: Vec<f64> = (4..1250).map(|c| 4.0 * c as f64).collect();
        let mut data = Array2::zeros((rows.len(), t.len()));
        for (mut row, p) in data.rows_mut().into_iter().zip(rows) {
            row.assign(&Array1::from(model.curve(&t, p)));
        }
        let qubits = (1..=rows.len()).map(|i| format!("qD{i}")).collect();
        Dataset::new(qubits, Array1::from(t), Variable::State, data).unwrap()
    }

    fn fringe(f_ghz: f64, decay: f64) -> OscillationParams {
        OscillationParams {
            a: -0.45,
            f: f_ghz,
            phi: 0.2,
            offset: 0.5,
            decay,
        }
    }

    #[test]
    fn test_derived_quantities() {
        let ds = dataset(&[fringe(0.0048, 1.0 / 2500.0)], DecayModel::Exponential);
        let analysis = analyze(&ds, DETUNING, DecayModel::Exponential);
        let fit = analysis.fit("qD1").unwrap().fitted().unwrap();

        assert_relative_eq!(fit.freq_offset, 4.8e6, max_relative = 1e-4);
        assert_relative_eq!(fit.decay, 2.5e-6, max_relative = 1e-3);
        assert!(fit.within_detuning);
        assert!(fit.decay_error >= 0.0);
        assert!(analysis.curves.contains_key("qD1"));
    }

    #[test]
    fn test_gaussian_model() {
        let ds = dataset(&[fringe(0.0051, 1.0 / 3000.0)], DecayModel::Gaussian);
        let analysis = analyze(&ds, DETUNING, DecayModel::Gaussian);
        let fit = analysis.fit("qD1").unwrap().fitted().unwrap();
        assert_relative_eq!(fit.decay, 3e-6, max_relative = 1e-3);
    }

    #[test]
    fn test_fringe_outside_detuning_is_rejected() {
        let ds = dataset(&[fringe(0.011, 1.0 / 2500.0)], DecayModel::Exponential);
        let analysis = analyze(&ds, DETUNING, DecayModel::Exponential);
        let fit = analysis.fit("qD1").unwrap();
        assert!(fit.fitted().is_none());
        assert!(fit.record().is_some());
    }

    #[test]
    fn test_failed_fit_does_not_abort() {
        let mut ds = dataset(
            &[fringe(0.0048, 1.0 / 2500.0), fringe(0.0048, 1.0 / 2500.0)],
            DecayModel::Exponential,
        );
        ds.data[[1, 10]] = f64::NAN;
        let analysis = analyze(&ds, DETUNING, DecayModel::Exponential);
        assert!(analysis.fit("qD1").unwrap().fitted().is_some());
        assert!(matches!(
            analysis.fit("qD2").unwrap(),
            QubitFit::Failed { fit: None, .. }
        ));
        let lines = analysis.report_lines();
        assert_eq!(lines[0], "Frequency offset for qubit qD1 : 4.80 MHz");
        assert_eq!(lines[1], "T2* for qubit qD1 : 2.50 us");
        assert_eq!(lines[2], "Fit failed for qubit qD2");
    }

    #[test]
    fn test_update_machine() {
        let mut machine = Machine::example();
        let before = machine.qubit("qD1").unwrap().xy.intermediate_frequency;
        let mut ds = dataset(
            &[fringe(0.0048, 1.0 / 2500.0), fringe(0.0048, 1.0 / 2500.0)],
            DecayModel::Exponential,
        );
        ds.data[[1, 0]] = f64::INFINITY;

        let analysis = analyze(&ds, DETUNING, DecayModel::Exponential);
        let outcomes = update_machine(&mut machine, &analysis).unwrap();

        assert_eq!(outcomes["qD1"], Outcome::Successful);
        assert_eq!(outcomes["qD2"], Outcome::Failed);
        let q1 = machine.qubit("qD1").unwrap();
        // fringe 0.2 MHz below the detuning: qubit is 0.2 MHz above the drive
        assert_relative_eq!(q1.xy.intermediate_frequency, before + 0.2e6, epsilon = 100.0);
        assert_relative_eq!(q1.t2ramsey.unwrap(), 2.5e-6, max_relative = 1e-3);
        assert!(machine.qubit("qD2").unwrap().t2ramsey.is_none());
    }

    #[test]
    fn test_fit_results_json() {
        let ds = dataset(&[fringe(0.0048, 1.0 / 2500.0)], DecayModel::Exponential);
        let json = analyze(&ds, DETUNING, DecayModel::Exponential).to_json().unwrap();
        assert_eq!(json["qD1"]["status"], "fitted");
        assert!(json["qD1"]["freq_offset"].as_f64().unwrap() > 4.7e6);
    }
}
